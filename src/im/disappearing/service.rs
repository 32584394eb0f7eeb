//! 阅后即焚配置服务层
//!
//! 本地修改（计算下一个版本号后写入）与远端同步（按版本号后写者胜）的入口。
//! 旧版本、重复版本的远端更新只记录日志，不作为失败返回。

use crate::im::db::{create_sqlite_pool_with_migration, normalize_db_url};
use crate::im::disappearing::dao::{DisappearingConfigDao, DisappearingConfigStore};
use crate::im::disappearing::error::ConfigError;
use crate::im::disappearing::listener::{DisappearingConfigListener, EmptyDisappearingConfigListener};
use crate::im::disappearing::models::{ConversationId, DisappearingConfig, DisappearingServiceConfig};
use crate::im::disappearing::types::{ApplyOutcome, DisappearingConfigUpdate};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 阅后即焚配置服务
pub struct DisappearingConfigService {
    config: DisappearingServiceConfig,
    /// 配置存储
    store: Arc<dyn DisappearingConfigStore>,
    /// 配置监听器
    listener: Arc<dyn DisappearingConfigListener>,
}

impl DisappearingConfigService {
    /// 创建服务（使用默认空监听器）
    pub async fn new(config: DisappearingServiceConfig) -> Result<Self> {
        Self::with_listener(config, Arc::new(EmptyDisappearingConfigListener)).await
    }

    /// 创建服务（带自定义监听器，内部创建连接池）
    pub async fn with_listener(
        config: DisappearingServiceConfig,
        listener: Arc<dyn DisappearingConfigListener>,
    ) -> Result<Self> {
        let db_url = normalize_db_url(&config.db_path);
        info!("[DisappearingSvc] 创建配置服务，SQLite数据库: {}", db_url);

        let pool = create_sqlite_pool_with_migration(&db_url, config.max_connections).await?;
        let store = Arc::new(DisappearingConfigDao::new(pool));
        Ok(Self::with_store(config, store, listener))
    }

    /// 创建服务（使用共享存储）
    pub fn with_store(
        config: DisappearingServiceConfig,
        store: Arc<dyn DisappearingConfigStore>,
        listener: Arc<dyn DisappearingConfigListener>,
    ) -> Self {
        Self {
            config,
            store,
            listener,
        }
    }

    /// 查询配置，未配置时返回关闭状态的默认值（不落库）
    pub async fn fetch_or_default(&self, conversation_id: &ConversationId) -> Result<DisappearingConfig> {
        Ok(self
            .store
            .fetch(conversation_id)
            .await?
            .unwrap_or_else(|| DisappearingConfig::new_disabled(conversation_id.clone())))
    }

    /// 会话首次需要配置时创建并落库
    pub async fn ensure_config(&self, conversation_id: &ConversationId) -> Result<DisappearingConfig> {
        if let Some(existing) = self.store.fetch(conversation_id).await? {
            return Ok(existing);
        }

        let initial = DisappearingConfig::new_disabled(conversation_id.clone());
        match self.store.store(&initial, self.config.tie_break).await {
            Ok(_) => info!("[DisappearingSvc] 会话 {} 创建初始配置", conversation_id),
            Err(e) if is_ignorable(&e) => {
                debug!("[DisappearingSvc] 会话 {} 的配置已被并发创建", conversation_id)
            }
            Err(e) => return Err(e),
        }
        self.store
            .fetch(conversation_id)
            .await?
            .context("创建后未找到阅后即焚配置")
    }

    /// 列出所有已配置的会话
    pub async fn list_configs(&self) -> Result<Vec<DisappearingConfig>> {
        self.store.fetch_all().await
    }

    /// 本地开启或关闭，保留原有时长
    pub async fn set_enabled(&self, conversation_id: &ConversationId, enabled: bool) -> Result<DisappearingConfig> {
        let current = self.fetch_or_default(conversation_id).await?;
        if current.enabled() == enabled {
            debug!("[DisappearingSvc] 会话 {} 开关未变化，跳过", conversation_id);
            return Ok(current);
        }
        let updated = current.with_enabled(enabled, current.next_version());
        self.commit_local(&current, updated).await
    }

    /// 本地修改时长，保留开关状态
    pub async fn set_duration(
        &self,
        conversation_id: &ConversationId,
        duration_seconds: u32,
    ) -> Result<DisappearingConfig> {
        let current = self.fetch_or_default(conversation_id).await?;
        if current.duration_seconds() == duration_seconds {
            debug!("[DisappearingSvc] 会话 {} 时长未变化，跳过", conversation_id);
            return Ok(current);
        }
        let updated = current.with_duration(duration_seconds, current.next_version())?;
        self.commit_local(&current, updated).await
    }

    /// 本地开启并设置时长（一次变更）
    pub async fn enable_with_duration(
        &self,
        conversation_id: &ConversationId,
        duration_seconds: u32,
    ) -> Result<DisappearingConfig> {
        let current = self.fetch_or_default(conversation_id).await?;
        let updated = current.with_enabled_and_duration(duration_seconds, current.next_version())?;
        if !updated.has_changed_from(&current) {
            debug!("[DisappearingSvc] 会话 {} 配置未变化，跳过", conversation_id);
            return Ok(current);
        }
        self.commit_local(&current, updated).await
    }

    async fn commit_local(
        &self,
        previous: &DisappearingConfig,
        updated: DisappearingConfig,
    ) -> Result<DisappearingConfig> {
        let stored = self
            .store
            .store(&updated, self.config.tie_break)
            .await
            .with_context(|| format!("保存会话 {} 的本地修改失败", updated.conversation_id()))?;
        let (_, updated) = stored.into_parts();

        info!(
            "[DisappearingSvc] 本地修改会话 {}: enabled {} -> {}, duration {}s -> {}s, version {} -> {}",
            updated.conversation_id(),
            previous.enabled(),
            updated.enabled(),
            previous.duration_seconds(),
            updated.duration_seconds(),
            previous.timer_version(),
            updated.timer_version()
        );
        self.notify_changed(&updated).await;
        Ok(updated)
    }

    /// 应用远端更新
    pub async fn apply_remote(&self, update: DisappearingConfigUpdate) -> Result<ApplyOutcome> {
        let incoming = update.into_config()?;
        let conversation_id = incoming.conversation_id().clone();

        match self.store.store(&incoming, self.config.tie_break).await {
            Ok(outcome) => {
                let (previous, current) = outcome.into_parts();
                let changed = previous
                    .as_ref()
                    .map_or(true, |p| current.has_changed_from(p));
                info!(
                    "[DisappearingSvc] 应用远端更新，会话: {}, version: {}, 内容变化: {}",
                    conversation_id,
                    current.timer_version(),
                    changed
                );
                if changed {
                    self.notify_changed(&current).await;
                }
                Ok(ApplyOutcome::Applied { previous, current })
            }
            Err(e) => match e.downcast::<ConfigError>() {
                Ok(reason) if reason.is_ignorable() => {
                    warn!(
                        "[DisappearingSvc] 忽略远端更新，会话: {}, 原因: {}",
                        conversation_id, reason
                    );
                    Ok(ApplyOutcome::Ignored(reason))
                }
                Ok(reason) => Err(reason.into()),
                Err(e) => Err(e),
            },
        }
    }

    /// 会话被删除时移除配置
    pub async fn remove_conversation(&self, conversation_id: &ConversationId) -> Result<bool> {
        let removed = self.store.delete(conversation_id).await?;
        if removed {
            self.listener
                .on_config_removed(conversation_id.to_string())
                .await;
        }
        Ok(removed)
    }

    async fn notify_changed(&self, config: &DisappearingConfig) {
        match serde_json::to_string(config) {
            Ok(json) => {
                self.listener
                    .on_config_changed(config.conversation_id().to_string(), json)
                    .await
            }
            Err(e) => warn!("[DisappearingSvc] 序列化配置失败: {}", e),
        }
    }
}

fn is_ignorable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ConfigError>()
        .is_some_and(ConfigError::is_ignorable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::disappearing::models::{TieBreakPolicy, MAX_DURATION_SECONDS};
    use async_trait::async_trait;
    use std::sync::Once;
    use tokio::sync::Mutex;

    static INIT_LOGGER: Once = Once::new();

    fn init_test_logger() {
        INIT_LOGGER.call_once(|| {
            use tracing_subscriber::prelude::*;
            use tracing_subscriber::EnvFilter;

            let filter_layer = EnvFilter::new("info,disappearing_messages_rust=debug");

            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_test_writer();

            tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt_layer)
                .init();
        });
    }

    #[derive(Default)]
    struct RecordingListener {
        changed: Mutex<Vec<(String, String)>>,
        removed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DisappearingConfigListener for RecordingListener {
        async fn on_config_changed(&self, conversation_id: String, config_json: String) {
            self.changed.lock().await.push((conversation_id, config_json));
        }
        async fn on_config_removed(&self, conversation_id: String) {
            self.removed.lock().await.push(conversation_id);
        }
    }

    async fn memory_service(tie_break: TieBreakPolicy) -> (DisappearingConfigService, Arc<RecordingListener>) {
        init_test_logger();
        let config = DisappearingServiceConfig {
            db_path: "sqlite::memory:".to_string(),
            max_connections: 1,
            tie_break,
        };
        let listener = Arc::new(RecordingListener::default());
        let service = DisappearingConfigService::with_listener(config, listener.clone())
            .await
            .unwrap();
        (service, listener)
    }

    fn conv(id: &str) -> ConversationId {
        ConversationId::new(id).unwrap()
    }

    fn update(id: &str, enabled: bool, duration: u32, version: u32) -> DisappearingConfigUpdate {
        DisappearingConfigUpdate {
            conversation_id: id.to_string(),
            enabled,
            duration_seconds: duration,
            timer_version: version,
        }
    }

    #[tokio::test]
    async fn test_fetch_or_default_does_not_persist() {
        let (service, _) = memory_service(TieBreakPolicy::KeepCurrent).await;
        let c = service.fetch_or_default(&conv("c1")).await.unwrap();
        assert!(!c.enabled());
        assert_eq!(c.timer_version(), 0);
        assert!(service.list_configs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_config_creates_once() {
        let (service, _) = memory_service(TieBreakPolicy::KeepCurrent).await;
        let first = service.ensure_config(&conv("c1")).await.unwrap();
        let second = service.ensure_config(&conv("c1")).await.unwrap();
        assert_eq!(first, second);
        assert!(first.row_id().is_some());
        assert_eq!(service.list_configs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_local_edits_bump_version() {
        let (service, listener) = memory_service(TieBreakPolicy::KeepCurrent).await;
        let id = conv("c1");

        let c = service.enable_with_duration(&id, 3600).await.unwrap();
        assert!(c.enabled());
        assert_eq!(c.timer_version(), 1);

        let c = service.set_enabled(&id, false).await.unwrap();
        assert!(!c.enabled());
        assert_eq!(c.duration_seconds(), 3600);
        assert_eq!(c.timer_version(), 2);

        let c = service.set_duration(&id, 60).await.unwrap();
        assert!(!c.enabled());
        assert_eq!(c.duration_seconds(), 60);
        assert_eq!(c.timer_version(), 3);

        // 无变化时不写入、不升级版本
        let c = service.set_duration(&id, 60).await.unwrap();
        assert_eq!(c.timer_version(), 3);

        assert_eq!(listener.changed.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn test_local_invalid_duration_is_error() {
        let (service, _) = memory_service(TieBreakPolicy::KeepCurrent).await;
        let err = service
            .set_duration(&conv("c1"), MAX_DURATION_SECONDS + 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InvalidDuration { .. })
        ));
        assert!(service.list_configs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_updates_last_writer_wins() {
        let (service, listener) = memory_service(TieBreakPolicy::KeepCurrent).await;

        let outcome = service.apply_remote(update("c1", false, 0, 3)).await.unwrap();
        assert!(outcome.is_applied());

        let outcome = service.apply_remote(update("c1", true, 604_800, 4)).await.unwrap();
        match outcome {
            ApplyOutcome::Applied { previous, current } => {
                assert_eq!(previous.unwrap().timer_version(), 3);
                assert_eq!(current.duration_seconds(), 604_800);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let outcome = service.apply_remote(update("c1", true, 3600, 2)).await.unwrap();
        assert_eq!(
            outcome,
            ApplyOutcome::Ignored(ConfigError::StaleVersion { current: 4, incoming: 2 })
        );

        let outcome = service.apply_remote(update("c1", true, 604_800, 4)).await.unwrap();
        assert_eq!(
            outcome,
            ApplyOutcome::Ignored(ConfigError::DuplicateVersion { version: 4 })
        );

        let current = service.fetch_or_default(&conv("c1")).await.unwrap();
        assert_eq!(current.timer_version(), 4);
        assert_eq!(current.duration_seconds(), 604_800);
        assert!(current.enabled());

        // 首次插入 + 一次内容变化
        assert_eq!(listener.changed.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_remote_invalid_update_is_error() {
        let (service, _) = memory_service(TieBreakPolicy::KeepCurrent).await;
        let err = service
            .apply_remote(update("c1", true, MAX_DURATION_SECONDS + 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InvalidDuration { .. })
        ));

        let err = service.apply_remote(update("", true, 30, 1)).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::MissingConversationId)
        );
    }

    #[tokio::test]
    async fn test_remote_tie_with_prefer_incoming() {
        let (service, _) = memory_service(TieBreakPolicy::PreferIncoming).await;
        service.apply_remote(update("c1", true, 604_800, 4)).await.unwrap();
        let outcome = service.apply_remote(update("c1", true, 3600, 4)).await.unwrap();
        assert!(outcome.is_applied());
        let current = service.fetch_or_default(&conv("c1")).await.unwrap();
        assert_eq!(current.duration_seconds(), 3600);
    }

    #[tokio::test]
    async fn test_remove_conversation() {
        let (service, listener) = memory_service(TieBreakPolicy::KeepCurrent).await;
        let id = conv("c1");
        service.ensure_config(&id).await.unwrap();

        assert!(service.remove_conversation(&id).await.unwrap());
        assert!(!service.remove_conversation(&id).await.unwrap());
        assert_eq!(*listener.removed.lock().await, vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn test_returned_config_matches_persisted() {
        let (service, _) = memory_service(TieBreakPolicy::KeepCurrent).await;
        let id = conv("c1");

        let local = service.enable_with_duration(&id, 3600).await.unwrap();
        assert!(local.row_id().is_some());
        assert_eq!(local, service.fetch_or_default(&id).await.unwrap());

        let outcome = service.apply_remote(update("c1", true, 60, 5)).await.unwrap();
        match outcome {
            ApplyOutcome::Applied { previous, current } => {
                assert_eq!(previous, Some(local));
                assert_eq!(current, service.fetch_or_default(&id).await.unwrap());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let outcome = service.apply_remote(update("c2", false, 0, 1)).await.unwrap();
        match outcome {
            ApplyOutcome::Applied { previous, current } => {
                assert!(previous.is_none());
                assert!(current.row_id().is_some());
                assert_eq!(current, service.fetch_or_default(&conv("c2")).await.unwrap());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
