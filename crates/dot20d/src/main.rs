//! dot-20 indexer daemon
//!
//! Single long-running process: load configuration from the environment,
//! verify the connected chain's identity, resolve the start block from the
//! persisted cursor, then hand off to the runner loop.

use anyhow::{anyhow, Context};
use dot20_core::PROTOCOL;
use dot20_engine::SqliteDot20Engine;
use dot20_indexer::{Config, Error, RemarkSource, Runner, SidecarClient, RECONNECT_DELAY};
use dot20_storage_sqlite::{Database, IndexerStatusStore};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config = Config::from_env()?;
    let _log_guard = init_tracing(&config)?;

    let client = SidecarClient::new(&config.url, config.ss58_prefix)?;
    let chain = connect_checked(&client, &config.chain).await?;
    info!("connected to {} (chain: {})", config.url, chain);

    let db = Database::open(&config.database)
        .with_context(|| format!("opening database {}", config.database.display()))?;

    let status = IndexerStatusStore::new(db.conn()).get(PROTOCOL)?;
    let start_block = match status {
        Some(row) => row.indexer_height + 1,
        None => config
            .start_block
            .ok_or_else(|| anyhow!("START_BLOCK must be set when no indexer cursor exists"))?,
    };
    info!("start block: {}", start_block);

    let engine = SqliteDot20Engine::new(config.ss58_prefix);
    let mut runner = Runner::new(client, engine, db, start_block, config.delay_blocks);
    runner.run().await?;
    Ok(())
}

/// Wait out transport failures with a fixed backoff, but abort immediately
/// when the node reports a different chain than configured.
async fn connect_checked(client: &SidecarClient, expected: &str) -> anyhow::Result<String> {
    loop {
        match client.chain_name().await {
            Ok(chain) if chain == expected => return Ok(chain),
            Ok(chain) => {
                return Err(Error::Chain(format!(
                    "the connected node is not {} (reports {})",
                    expected, chain
                ))
                .into())
            }
            Err(e) => {
                warn!("connect failed: {}, retrying", e);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

/// Stderr output plus a rolling log file per `ROTATION`/`RENTENTION`.
fn init_tracing(config: &Config) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let rotation = if config.rotation_days == 0 {
        tracing_appender::rolling::Rotation::NEVER
    } else {
        tracing_appender::rolling::Rotation::DAILY
    };
    let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix("dot20d")
        .filename_suffix("log")
        .max_log_files((config.retention_weeks * 7).max(1) as usize)
        .build("logs")?;
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}
