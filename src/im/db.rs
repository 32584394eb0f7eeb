//! SQLite 数据库工具：统一创建连接池并执行 sqlx 迁移
//!
//! 约定：本 crate 根目录下存在 `migrations/` 目录，存放所有迁移 SQL 文件。
//! 通过 `sqlx::migrate!()` 自动管理 schema 升级。

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// 等待写锁的最长时间
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// 创建 SQLite 连接池并执行所有未执行的迁移
///
/// 内存数据库（`sqlite::memory:`）每个连接都是独立的库，调用方应传入 `max_connections = 1`，
/// 这里也会关闭空闲回收，避免连接被回收后数据丢失。
pub async fn create_sqlite_pool_with_migration(db_url: &str, max_connections: u32) -> Result<Pool<Sqlite>> {
    let mut options = SqlitePoolOptions::new().max_connections(max_connections.max(1));
    if db_url.contains(":memory:") {
        options = options
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    let connect_options = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("无效的数据库地址: {}", db_url))?
        .busy_timeout(BUSY_TIMEOUT);

    let pool = options
        .connect_with(connect_options)
        .await
        .with_context(|| format!("连接SQLite数据库失败: {}", db_url))?;

    // 从 `migrations/` 目录读取迁移并执行
    sqlx::migrate!().run(&pool).await.context("执行数据库迁移失败")?;

    info!("[DB] 数据库已就绪: {}", db_url);
    Ok(pool)
}

/// 规范化数据库路径：
/// - 完整URL：如 "sqlite://configs.db" 直接使用
/// - 其他路径：如 "configs.db" 转换为 "sqlite://configs.db?mode=rwc"
pub fn normalize_db_url(db_path: &str) -> String {
    if db_path.starts_with("sqlite:") {
        db_path.to_string()
    } else {
        format!("sqlite://{}?mode=rwc", db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_db_url() {
        assert_eq!(normalize_db_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(normalize_db_url("sqlite://a.db"), "sqlite://a.db");
        assert_eq!(normalize_db_url("configs.db"), "sqlite://configs.db?mode=rwc");
        assert_eq!(
            normalize_db_url("/tmp/configs.db"),
            "sqlite:///tmp/configs.db?mode=rwc"
        );
    }
}
