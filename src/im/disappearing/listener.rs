//! 阅后即焚配置监听器回调接口

use async_trait::async_trait;

/// 配置变更监听器
#[async_trait]
pub trait DisappearingConfigListener: Send + Sync {
    /// 配置发生变更，参数为新配置的 JSON 字符串
    async fn on_config_changed(&self, conversation_id: String, config_json: String);

    /// 会话被删除，配置随之移除
    async fn on_config_removed(&self, conversation_id: String);
}

/// 空实现（默认监听器）
pub struct EmptyDisappearingConfigListener;

#[async_trait]
impl DisappearingConfigListener for EmptyDisappearingConfigListener {
    async fn on_config_changed(&self, _conversation_id: String, _config_json: String) {
        // 默认不做任何处理
    }

    async fn on_config_removed(&self, _conversation_id: String) {
        // 默认不做任何处理
    }
}
