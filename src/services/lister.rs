use crate::error::MigrationError;
use crate::models::{ObjectSummary, TransferDescriptor, file_name_of, is_plain_file_name};
use crate::services::storage::StorageService;
use std::sync::Arc;

/// Prefix of macOS resource-fork and other hidden scratch files
pub const HIDDEN_FILE_MARKER: &str = "._";

pub struct ObjectLister {
    storage: Arc<dyn StorageService>,
}

impl ObjectLister {
    pub fn new(storage: Arc<dyn StorageService>) -> Self {
        Self { storage }
    }

    /// Lists every data object under `prefix` as a transfer descriptor.
    ///
    /// Hidden files, folder placeholders, and names that are not a plain file
    /// name are dropped. A listing failure is fatal for the run.
    pub async fn list(&self, prefix: &str) -> Result<Vec<TransferDescriptor>, MigrationError> {
        let bucket = self.storage.bucket().to_string();
        let objects =
            self.storage
                .list_objects(prefix)
                .await
                .map_err(|source| MigrationError::Listing {
                    bucket: bucket.clone(),
                    prefix: prefix.to_string(),
                    source,
                })?;

        let total = objects.len();
        let descriptors: Vec<TransferDescriptor> = objects
            .into_iter()
            .filter(is_data_object)
            .map(|summary| TransferDescriptor::from_summary(&bucket, summary))
            .collect();

        tracing::info!(
            "📋 Listed {} objects under s3://{}/{} ({} skipped)",
            descriptors.len(),
            bucket,
            prefix,
            total - descriptors.len()
        );

        Ok(descriptors)
    }
}

fn is_data_object(summary: &ObjectSummary) -> bool {
    let file_name = file_name_of(&summary.key);
    if file_name.is_empty() || summary.key.ends_with('/') {
        tracing::debug!("Skipping folder placeholder: {}", summary.key);
        return false;
    }
    if file_name.starts_with(HIDDEN_FILE_MARKER) {
        tracing::debug!("Skipping hidden file: {}", summary.key);
        return false;
    }
    if !is_plain_file_name(file_name) {
        tracing::warn!("Skipping key with unusable file name: {}", summary.key);
        return false;
    }
    true
}
