use csv_json_migrator::config::MigrationConfig;
use csv_json_migrator::infrastructure::storage;
use csv_json_migrator::run_migration;
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & Logging Setup
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "csv_json_migrator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MigrationConfig::from_env();
    info!(
        "🚀 Starting CSV -> JSON migration: s3://{}/{} (threshold={}MB, chunk={} rows)",
        config.source_bucket,
        config.source_prefix,
        config.size_threshold / 1024 / 1024,
        config.chunk_rows
    );

    // 2. Storage clients (credentials must already be valid)
    let (source, destination) = storage::setup_storage(&config).await;

    // 3. Run the batch
    let report = run_migration(&config, source, destination).await?;

    info!(
        "👋 Migration finished: {} completed, {} skipped, {} failed",
        report.completed(),
        report.skipped(),
        report.failed()
    );
    Ok(())
}
