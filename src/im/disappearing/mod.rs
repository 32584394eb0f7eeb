//! 阅后即焚配置模块
//!
//! 会话级的“消息自动删除”设置：开关、时长与用于多端冲突合并的版本号

pub mod dao;
pub mod error;
pub mod listener;
pub mod models;
pub mod service;
pub mod types;

// 重新导出主要类型和函数
pub use dao::{DisappearingConfigDao, DisappearingConfigStore};
pub use error::ConfigError;
pub use listener::{DisappearingConfigListener, EmptyDisappearingConfigListener};
pub use models::{
    ConversationId, DisappearingConfig, DisappearingServiceConfig, TieBreakPolicy,
    MAX_DURATION_SECONDS, PRESET_DURATIONS_SECONDS,
};
pub use service::DisappearingConfigService;
pub use types::{ApplyOutcome, DisappearingConfigUpdate, StoreOutcome};
