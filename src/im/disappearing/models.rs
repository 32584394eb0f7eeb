//! 阅后即焚配置模型
//!
//! `DisappearingConfig` 是不可变值类型：没有 setter，所有“修改”都返回新实例，
//! 旧实例（可能被缓存持有，或用于对比新旧配置）保持不变。

use crate::im::disappearing::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 最长时长：4 周
pub const MAX_DURATION_SECONDS: u32 = 4 * 7 * 24 * 60 * 60;

/// 供 UI 使用的预设时长（升序）：30秒、5分钟、1小时、8小时、1天、1周、4周
pub const PRESET_DURATIONS_SECONDS: [u32; 7] = [
    30,
    5 * 60,
    60 * 60,
    8 * 60 * 60,
    24 * 60 * 60,
    7 * 24 * 60 * 60,
    MAX_DURATION_SECONDS,
];

/// 会话 ID（非空）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Result<Self, ConfigError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ConfigError::MissingConversationId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ConversationId {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ConversationId> for String {
    fn from(id: ConversationId) -> Self {
        id.0
    }
}

/// 同版本但内容不同时的处理策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TieBreakPolicy {
    /// 保留本地（按重复投递处理）
    #[default]
    KeepCurrent,
    /// 以收到的为准
    PreferIncoming,
}

/// 会话的阅后即焚配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DisappearingConfigRecord")]
pub struct DisappearingConfig {
    /// 存储行 ID，仅从数据库恢复的实例才有
    #[serde(rename = "rowID", skip_serializing_if = "Option::is_none")]
    row_id: Option<i64>,
    #[serde(rename = "conversationID")]
    conversation_id: ConversationId,
    #[serde(rename = "enabled")]
    enabled: bool,
    #[serde(rename = "durationSeconds")]
    duration_seconds: u32,
    #[serde(rename = "timerVersion")]
    timer_version: u32,
}

/// 反序列化中间结构，经校验后转换为 `DisappearingConfig`
#[derive(Deserialize)]
struct DisappearingConfigRecord {
    #[serde(rename = "rowID", default)]
    row_id: Option<i64>,
    #[serde(rename = "conversationID")]
    conversation_id: ConversationId,
    enabled: bool,
    #[serde(rename = "durationSeconds")]
    duration_seconds: u32,
    #[serde(rename = "timerVersion")]
    timer_version: u32,
}

impl TryFrom<DisappearingConfigRecord> for DisappearingConfig {
    type Error = ConfigError;

    fn try_from(r: DisappearingConfigRecord) -> Result<Self, Self::Error> {
        validate_duration(r.duration_seconds)?;
        Ok(Self {
            row_id: r.row_id,
            conversation_id: r.conversation_id,
            enabled: r.enabled,
            duration_seconds: r.duration_seconds,
            timer_version: r.timer_version,
        })
    }
}

fn validate_duration(duration_seconds: u32) -> Result<(), ConfigError> {
    if duration_seconds > MAX_DURATION_SECONDS {
        return Err(ConfigError::InvalidDuration {
            duration_seconds,
            max: MAX_DURATION_SECONDS,
        });
    }
    Ok(())
}

impl DisappearingConfig {
    /// 创建配置，时长超过上限时返回 `InvalidDuration`
    pub fn create(
        conversation_id: ConversationId,
        enabled: bool,
        duration_seconds: u32,
        timer_version: u32,
    ) -> Result<Self, ConfigError> {
        validate_duration(duration_seconds)?;
        Ok(Self {
            row_id: None,
            conversation_id,
            enabled,
            duration_seconds,
            timer_version,
        })
    }

    /// 从存储恢复配置。持久化数据可能由旧版本写入，同样需要校验
    pub fn restore(
        row_id: i64,
        conversation_id: ConversationId,
        enabled: bool,
        duration_seconds: u32,
        timer_version: u32,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::create(conversation_id, enabled, duration_seconds, timer_version)?;
        config.row_id = Some(row_id);
        Ok(config)
    }

    /// 会话首次需要配置时的初始状态（关闭、0 秒、版本 0）
    pub fn new_disabled(conversation_id: ConversationId) -> Self {
        Self {
            row_id: None,
            conversation_id,
            enabled: false,
            duration_seconds: 0,
            timer_version: 0,
        }
    }

    pub fn row_id(&self) -> Option<i64> {
        self.row_id
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn duration_seconds(&self) -> u32 {
        self.duration_seconds
    }

    pub fn timer_version(&self) -> u32 {
        self.timer_version
    }

    /// 发起变更的一方使用的下一个版本号
    pub fn next_version(&self) -> u32 {
        self.timer_version.saturating_add(1)
    }

    /// 切换开关，保留原有时长
    pub fn with_enabled(&self, enabled: bool, timer_version: u32) -> Self {
        Self {
            enabled,
            timer_version,
            ..self.clone()
        }
    }

    /// 修改时长，保留开关状态
    pub fn with_duration(&self, duration_seconds: u32, timer_version: u32) -> Result<Self, ConfigError> {
        validate_duration(duration_seconds)?;
        Ok(Self {
            duration_seconds,
            timer_version,
            ..self.clone()
        })
    }

    /// 同时开启并设置时长，避免出现两个中间状态
    pub fn with_enabled_and_duration(
        &self,
        duration_seconds: u32,
        timer_version: u32,
    ) -> Result<Self, ConfigError> {
        validate_duration(duration_seconds)?;
        Ok(Self {
            enabled: true,
            duration_seconds,
            timer_version,
            ..self.clone()
        })
    }

    /// 内容（开关、时长）是否与另一个配置不同
    pub fn has_changed_from(&self, other: &Self) -> bool {
        self.enabled != other.enabled || self.duration_seconds != other.duration_seconds
    }

    /// 判断是否接受收到的配置（按版本号后写者胜）
    pub fn check_incoming(&self, incoming: &Self, policy: TieBreakPolicy) -> Result<(), ConfigError> {
        if incoming.conversation_id != self.conversation_id {
            return Err(ConfigError::ConversationMismatch {
                expected: self.conversation_id.to_string(),
                actual: incoming.conversation_id.to_string(),
            });
        }
        if incoming.timer_version < self.timer_version {
            return Err(ConfigError::StaleVersion {
                current: self.timer_version,
                incoming: incoming.timer_version,
            });
        }
        if incoming.timer_version == self.timer_version {
            let accept = policy == TieBreakPolicy::PreferIncoming && incoming.has_changed_from(self);
            if !accept {
                return Err(ConfigError::DuplicateVersion {
                    version: incoming.timer_version,
                });
            }
        }
        Ok(())
    }
}

/// 阅后即焚配置服务的配置
#[derive(Debug, Clone)]
pub struct DisappearingServiceConfig {
    /// 数据库路径（SQLite），可以是：
    /// - 相对路径：如 "configs.db" 会转换为 "sqlite://configs.db?mode=rwc"
    /// - 完整URL：如 "sqlite::memory:" 直接使用
    pub db_path: String,
    /// 连接池大小
    pub max_connections: u32,
    /// 同版本冲突策略
    pub tie_break: TieBreakPolicy,
}

impl Default for DisappearingServiceConfig {
    fn default() -> Self {
        Self {
            db_path: "disappearing.db".to_string(),
            max_connections: 5,
            tie_break: TieBreakPolicy::default(),
        }
    }
}
