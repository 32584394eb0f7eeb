//! 阅后即焚配置的同步 DTO 与结果类型

use crate::im::disappearing::error::ConfigError;
use crate::im::disappearing::models::{ConversationId, DisappearingConfig};
use serde::{Deserialize, Serialize};

/// 同步管道收到的配置变更（可直接从协议消息反序列化）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisappearingConfigUpdate {
    #[serde(rename = "conversationID")]
    pub conversation_id: String,
    pub enabled: bool,
    #[serde(rename = "durationSeconds")]
    pub duration_seconds: u32,
    #[serde(rename = "timerVersion")]
    pub timer_version: u32,
}

impl DisappearingConfigUpdate {
    /// 校验并转换为配置值
    pub fn into_config(self) -> Result<DisappearingConfig, ConfigError> {
        DisappearingConfig::create(
            ConversationId::new(self.conversation_id)?,
            self.enabled,
            self.duration_seconds,
            self.timer_version,
        )
    }
}

/// 存储层写入结果，`current` 为落库后重新读取的配置（带行 ID）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// 首次写入
    Inserted { current: DisappearingConfig },
    /// 覆盖了旧配置
    Replaced {
        previous: DisappearingConfig,
        current: DisappearingConfig,
    },
}

impl StoreOutcome {
    pub fn into_parts(self) -> (Option<DisappearingConfig>, DisappearingConfig) {
        match self {
            StoreOutcome::Inserted { current } => (None, current),
            StoreOutcome::Replaced { previous, current } => (Some(previous), current),
        }
    }
}

/// 应用远端更新的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied {
        previous: Option<DisappearingConfig>,
        current: DisappearingConfig,
    },
    /// 旧版本或重复版本，未修改本地状态
    Ignored(ConfigError),
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied { .. })
    }
}
