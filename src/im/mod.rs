pub mod db;
pub mod disappearing;

// 重新导出阅后即焚配置相关类型
pub use disappearing::{
    ConfigError, ConversationId, DisappearingConfig, DisappearingConfigService,
    DisappearingServiceConfig,
};
