//! historyd - workflow history service daemon

use clap::Parser;
use history_daemon::{shutdown_signal, DaemonConfig, HistoryNode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// historyd CLI
#[derive(Parser)]
#[command(name = "historyd")]
#[command(about = "Workflow history service daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "HISTORY_CONFIG")]
    config: Option<String>,

    /// Shard to acquire
    #[arg(short, long, env = "HISTORY_SHARD_ID")]
    shard_id: Option<u32>,

    /// Owner identity recorded in the shard row
    #[arg(short, long, env = "HISTORY_OWNER")]
    owner: Option<String>,

    /// Log level
    #[arg(long, env = "HISTORY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "HISTORY_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = DaemonConfig::load(cli.config.as_deref())?;
    if let Some(shard_id) = cli.shard_id {
        config.shard_id = shard_id;
    }
    if let Some(owner) = cli.owner {
        config.owner = owner;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let node = HistoryNode::start(&config).await?;
    let mut closed = node.engine().shard().closed_signal();

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = closed.wait_for(|closed| *closed) => {
            tracing::error!(shard_id = config.shard_id, "Shard closed underneath the node");
        }
    }

    node.shutdown().await;
    Ok(())
}
