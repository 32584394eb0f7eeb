//! 阅后即焚配置 CLI
//!
//! 针对本地 SQLite 数据库查看、修改会话的阅后即焚配置，并可模拟远端同步更新

use anyhow::Result;
use clap::{Parser, Subcommand};
use disappearing_messages_rust::im::disappearing::{
    ApplyOutcome, ConversationId, DisappearingConfigListener, DisappearingConfigService,
    DisappearingConfigUpdate, DisappearingServiceConfig, TieBreakPolicy, MAX_DURATION_SECONDS,
    PRESET_DURATIONS_SECONDS,
};
use std::sync::Arc;
use tracing::info;

/// 阅后即焚配置 CLI
#[derive(Parser, Debug)]
#[command(name = "disappearing-cli")]
#[command(about = "阅后即焚配置 CLI - 查看和修改会话的消息自动删除设置", long_about = None)]
struct Args {
    /// 数据库路径（默认: disappearing.db）
    #[arg(long, default_value = "disappearing.db")]
    db: String,

    /// 同版本内容不同时以远端为准
    #[arg(long, default_value_t = false)]
    prefer_incoming: bool,

    /// 日志级别（默认: info,disappearing_messages_rust=debug）
    #[arg(long, default_value = "info,disappearing_messages_rust=debug")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 查看会话配置
    Show { conversation_id: String },
    /// 列出所有配置
    List,
    /// 开启（可同时指定时长，单位秒）
    Enable {
        conversation_id: String,
        #[arg(short, long)]
        duration: Option<u32>,
    },
    /// 关闭（保留时长）
    Disable { conversation_id: String },
    /// 修改时长（保留开关状态）
    SetDuration { conversation_id: String, duration: u32 },
    /// 模拟远端同步更新
    Apply {
        conversation_id: String,
        #[arg(long)]
        enabled: bool,
        #[arg(long)]
        duration: u32,
        #[arg(long)]
        version: u32,
    },
    /// 删除会话配置
    Delete { conversation_id: String },
    /// 显示预设时长
    Presets,
}

/// 初始化日志
fn init_logger(log_level: &str) {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .init();
}

/// 输出配置变更
struct CliListener;

#[async_trait::async_trait]
impl DisappearingConfigListener for CliListener {
    async fn on_config_changed(&self, conversation_id: String, config_json: String) {
        info!("[CLI] 🔄 配置变更 {}: {}", conversation_id, config_json);
    }

    async fn on_config_removed(&self, conversation_id: String) {
        info!("[CLI] 🗑️ 配置删除: {}", conversation_id);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level);

    let config = DisappearingServiceConfig {
        db_path: args.db.clone(),
        tie_break: if args.prefer_incoming {
            TieBreakPolicy::PreferIncoming
        } else {
            TieBreakPolicy::KeepCurrent
        },
        ..Default::default()
    };
    let service = DisappearingConfigService::with_listener(config, Arc::new(CliListener)).await?;

    match args.command {
        Command::Show { conversation_id } => {
            let id = ConversationId::new(conversation_id)?;
            let c = service.fetch_or_default(&id).await?;
            println!("{}", serde_json::to_string_pretty(&c)?);
        }
        Command::List => {
            for c in service.list_configs().await? {
                println!("{}", serde_json::to_string(&c)?);
            }
        }
        Command::Enable {
            conversation_id,
            duration,
        } => {
            let id = ConversationId::new(conversation_id)?;
            let c = match duration {
                Some(secs) => service.enable_with_duration(&id, secs).await?,
                None => service.set_enabled(&id, true).await?,
            };
            println!("{}", serde_json::to_string(&c)?);
        }
        Command::Disable { conversation_id } => {
            let id = ConversationId::new(conversation_id)?;
            let c = service.set_enabled(&id, false).await?;
            println!("{}", serde_json::to_string(&c)?);
        }
        Command::SetDuration {
            conversation_id,
            duration,
        } => {
            let id = ConversationId::new(conversation_id)?;
            let c = service.set_duration(&id, duration).await?;
            println!("{}", serde_json::to_string(&c)?);
        }
        Command::Apply {
            conversation_id,
            enabled,
            duration,
            version,
        } => {
            let update = DisappearingConfigUpdate {
                conversation_id,
                enabled,
                duration_seconds: duration,
                timer_version: version,
            };
            match service.apply_remote(update).await? {
                ApplyOutcome::Applied { current, .. } => {
                    println!("applied: {}", serde_json::to_string(&current)?)
                }
                ApplyOutcome::Ignored(reason) => println!("ignored: {}", reason),
            }
        }
        Command::Delete { conversation_id } => {
            let id = ConversationId::new(conversation_id)?;
            let removed = service.remove_conversation(&id).await?;
            println!("removed: {}", removed);
        }
        Command::Presets => {
            for secs in PRESET_DURATIONS_SECONDS {
                println!("{}", secs);
            }
            println!("max: {}", MAX_DURATION_SECONDS);
        }
    }

    Ok(())
}
