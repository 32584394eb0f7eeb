//! 阅后即焚配置数据访问层（DAO）
//!
//! 按会话 ID 存取配置。写入采用“比较版本再替换”的方式，
//! 即使两个写入并发，存储中的版本也不会回退。

use crate::im::disappearing::error::ConfigError;
use crate::im::disappearing::models::{ConversationId, DisappearingConfig, TieBreakPolicy};
use crate::im::disappearing::types::StoreOutcome;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, warn};

/// 配置持久化接口
#[async_trait]
pub trait DisappearingConfigStore: Send + Sync {
    /// 按会话 ID 查询，None 表示从未配置过
    async fn fetch(&self, conversation_id: &ConversationId) -> Result<Option<DisappearingConfig>>;

    /// 查询全部配置
    async fn fetch_all(&self) -> Result<Vec<DisappearingConfig>>;

    /// 写入或替换配置；旧版本或重复版本返回 `ConfigError`
    async fn store(&self, config: &DisappearingConfig, policy: TieBreakPolicy) -> Result<StoreOutcome>;

    /// 删除会话的配置，返回是否存在
    async fn delete(&self, conversation_id: &ConversationId) -> Result<bool>;
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, conversation_id, enabled, duration_seconds, timer_version
    FROM disappearing_messages_configuration
"#;

// 只有版本更新时才覆盖
const UPSERT_NEWER: &str = r#"
    INSERT INTO disappearing_messages_configuration (
        conversation_id, enabled, duration_seconds, timer_version
    ) VALUES (?, ?, ?, ?)
    ON CONFLICT(conversation_id) DO UPDATE SET
        enabled = excluded.enabled,
        duration_seconds = excluded.duration_seconds,
        timer_version = excluded.timer_version
    WHERE excluded.timer_version > disappearing_messages_configuration.timer_version
"#;

// 同版本内容不同也覆盖
const UPSERT_NEWER_OR_DIFFERENT: &str = r#"
    INSERT INTO disappearing_messages_configuration (
        conversation_id, enabled, duration_seconds, timer_version
    ) VALUES (?, ?, ?, ?)
    ON CONFLICT(conversation_id) DO UPDATE SET
        enabled = excluded.enabled,
        duration_seconds = excluded.duration_seconds,
        timer_version = excluded.timer_version
    WHERE excluded.timer_version > disappearing_messages_configuration.timer_version
       OR (excluded.timer_version = disappearing_messages_configuration.timer_version
           AND (excluded.enabled != disappearing_messages_configuration.enabled
                OR excluded.duration_seconds != disappearing_messages_configuration.duration_seconds))
"#;

/// 阅后即焚配置 DAO（基于 sqlx）
pub struct DisappearingConfigDao {
    db: Pool<Sqlite>,
}

impl DisappearingConfigDao {
    /// 创建新的配置 DAO
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// 将数据库行恢复为配置（经过校验）
    fn row_to_config(row: &SqliteRow) -> Result<DisappearingConfig> {
        let row_id: i64 = row.try_get("id")?;
        let conversation_id: String = row.try_get("conversation_id")?;
        let enabled: i64 = row.try_get("enabled")?;
        let duration: i64 = row.try_get("duration_seconds")?;
        let version: i64 = row.try_get("timer_version")?;

        let duration_seconds = u32::try_from(duration)
            .with_context(|| format!("会话 {} 的时长超出范围: {}", conversation_id, duration))?;
        let timer_version = u32::try_from(version)
            .with_context(|| format!("会话 {} 的版本号超出范围: {}", conversation_id, version))?;
        let id = ConversationId::new(conversation_id)?;

        let config = DisappearingConfig::restore(row_id, id, enabled != 0, duration_seconds, timer_version)
            .with_context(|| format!("恢复阅后即焚配置失败，行ID: {}", row_id))?;
        Ok(config)
    }

    async fn fetch_with<'e, E>(executor: E, conversation_id: &ConversationId) -> Result<Option<DisappearingConfig>>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let sql = format!("{} WHERE conversation_id = ?", SELECT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(conversation_id.as_str())
            .fetch_optional(executor)
            .await
            .context("查询阅后即焚配置失败")?;

        row.as_ref().map(Self::row_to_config).transpose()
    }
}

#[async_trait]
impl DisappearingConfigStore for DisappearingConfigDao {
    async fn fetch(&self, conversation_id: &ConversationId) -> Result<Option<DisappearingConfig>> {
        let config = Self::fetch_with(&self.db, conversation_id).await?;
        debug!(
            "[DisappearingDAO] 查询会话 {} 的配置: {}",
            conversation_id,
            if config.is_some() { "已存在" } else { "未配置" }
        );
        Ok(config)
    }

    async fn fetch_all(&self) -> Result<Vec<DisappearingConfig>> {
        let sql = format!("{} ORDER BY conversation_id", SELECT_COLUMNS);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.db)
            .await
            .context("查询阅后即焚配置列表失败")?;

        let configs = rows
            .iter()
            .map(Self::row_to_config)
            .collect::<Result<Vec<_>>>()?;
        debug!("[DisappearingDAO] 获取配置列表，共 {} 条", configs.len());
        Ok(configs)
    }

    async fn store(&self, config: &DisappearingConfig, policy: TieBreakPolicy) -> Result<StoreOutcome> {
        let conversation_id = config.conversation_id();
        // IMMEDIATE 在读取前即取得写锁，同一会话的写入串行执行
        let mut tx = self
            .db
            .begin_with("BEGIN IMMEDIATE")
            .await
            .context("开启事务失败")?;

        let previous = Self::fetch_with(&mut *tx, conversation_id).await?;
        if let Some(current) = &previous {
            current.check_incoming(config, policy)?;
        }

        let sql = match policy {
            TieBreakPolicy::KeepCurrent => UPSERT_NEWER,
            TieBreakPolicy::PreferIncoming => UPSERT_NEWER_OR_DIFFERENT,
        };
        let result = sqlx::query(sql)
            .bind(conversation_id.as_str())
            .bind(if config.enabled() { 1 } else { 0 })
            .bind(i64::from(config.duration_seconds()))
            .bind(i64::from(config.timer_version()))
            .execute(&mut *tx)
            .await
            .context("写入阅后即焚配置失败")?;

        if result.rows_affected() == 0 {
            // 条件更新未命中：以最新行重新判定拒绝原因
            let latest = Self::fetch_with(&mut *tx, conversation_id).await?;
            tx.rollback().await.context("回滚事务失败")?;
            warn!(
                "[DisappearingDAO] 会话 {} 写入被并发更新拒绝，版本: {}",
                conversation_id,
                config.timer_version()
            );
            let err = match latest {
                Some(latest) => match latest.check_incoming(config, policy) {
                    Err(e) => e,
                    Ok(()) => ConfigError::StaleVersion {
                        current: latest.timer_version(),
                        incoming: config.timer_version(),
                    },
                },
                None => ConfigError::StaleVersion {
                    current: 0,
                    incoming: config.timer_version(),
                },
            };
            return Err(err.into());
        }

        let current = Self::fetch_with(&mut *tx, conversation_id)
            .await?
            .context("写入后未找到阅后即焚配置")?;
        tx.commit().await.context("提交事务失败")?;

        info!(
            "[DisappearingDAO] 保存会话 {} 的配置: enabled={}, duration={}s, version={}",
            conversation_id,
            config.enabled(),
            config.duration_seconds(),
            config.timer_version()
        );
        Ok(match previous {
            Some(previous) => StoreOutcome::Replaced { previous, current },
            None => StoreOutcome::Inserted { current },
        })
    }

    async fn delete(&self, conversation_id: &ConversationId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM disappearing_messages_configuration WHERE conversation_id = ?
            "#,
        )
        .bind(conversation_id.as_str())
        .execute(&self.db)
        .await
        .context("删除阅后即焚配置失败")?;

        let removed = result.rows_affected() > 0;
        info!(
            "[DisappearingDAO] 删除会话 {} 的配置，是否存在: {}",
            conversation_id, removed
        );
        Ok(removed)
    }
}
