pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::MigrationConfig;
use crate::error::MigrationError;
use crate::services::lister::ObjectLister;
use crate::services::pipeline::{BatchReport, TransferPipeline};
use crate::services::scratch::ensure_directory;
use crate::services::storage::StorageService;
use std::sync::Arc;

/// Runs one migration batch: prepare scratch directories, list the source
/// prefix, then push every descriptor through the pipeline.
///
/// Only scratch preparation and listing are fatal; per-object failures are
/// reported in the returned [`BatchReport`].
pub async fn run_migration(
    config: &MigrationConfig,
    source: Arc<dyn StorageService>,
    destination: Arc<dyn StorageService>,
) -> Result<BatchReport, MigrationError> {
    for dir in [&config.scratch.raw_dir, &config.scratch.converted_dir] {
        ensure_directory(dir).map_err(|e| MigrationError::Scratch {
            path: dir.clone(),
            source: e,
        })?;
    }

    let descriptors = ObjectLister::new(source.clone())
        .list(&config.source_prefix)
        .await?;

    let pipeline = TransferPipeline::from_config(config, source, destination);
    Ok(pipeline.run(&descriptors).await)
}
