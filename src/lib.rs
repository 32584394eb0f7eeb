pub mod im;

// 重新导出常用类型和函数，方便外部使用
pub use im::{
    db::create_sqlite_pool_with_migration,
    disappearing::{
        ApplyOutcome, ConfigError, ConversationId, DisappearingConfig, DisappearingConfigService,
        DisappearingConfigStore, DisappearingConfigUpdate, DisappearingServiceConfig,
        TieBreakPolicy, MAX_DURATION_SECONDS, PRESET_DURATIONS_SECONDS,
    },
};
