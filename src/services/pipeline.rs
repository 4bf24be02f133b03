use crate::config::{DestinationLayout, MigrationConfig, ScratchPaths};
use crate::error::MigrationError;
use crate::models::{TransferDescriptor, is_plain_file_name};
use crate::services::converter::{ConversionReport, CsvConverter};
use crate::services::scratch::{Removal, ScratchFile};
use crate::services::storage::StorageService;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Progress of one descriptor through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Listed,
    Downloaded,
    Converted,
    JsonUploaded,
    RawUploaded,
    CleanedUp,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferStage::Listed => "listed",
            TransferStage::Downloaded => "downloaded",
            TransferStage::Converted => "converted",
            TransferStage::JsonUploaded => "json uploaded",
            TransferStage::RawUploaded => "raw uploaded",
            TransferStage::CleanedUp => "cleaned up",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptyName,
    Folder,
    /// `.`, `..`, or another name that is not a single file name
    UnusableName,
}

#[derive(Debug)]
pub struct CompletedTransfer {
    pub object_key: String,
    pub json_key: String,
    pub raw_key: String,
    pub conversion: ConversionReport,
    pub json_hash: String,
    pub raw_hash: String,
    /// False when a scratch file could not be removed after the uploads
    pub cleaned_up: bool,
}

#[derive(Debug)]
pub enum TransferOutcome {
    Completed(CompletedTransfer),
    Skipped {
        object_key: String,
        reason: SkipReason,
    },
    Failed {
        object_key: String,
        /// Last stage reached before the error
        reached: TransferStage,
        error: MigrationError,
    },
}

impl TransferOutcome {
    pub fn object_key(&self) -> &str {
        match self {
            TransferOutcome::Completed(done) => &done.object_key,
            TransferOutcome::Skipped { object_key, .. } => object_key,
            TransferOutcome::Failed { object_key, .. } => object_key,
        }
    }
}

/// Outcomes of one batch, in processing order
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<TransferOutcome>,
}

impl BatchReport {
    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, TransferOutcome::Completed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TransferOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TransferOutcome::Failed { .. }))
    }

    fn count(&self, predicate: impl Fn(&TransferOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(o)).count()
    }
}

/// Download → convert → upload JSON → upload raw → clean up, one descriptor
/// at a time.
pub struct TransferPipeline {
    source: Arc<dyn StorageService>,
    destination: Arc<dyn StorageService>,
    converter: CsvConverter,
    scratch: ScratchPaths,
    layout: DestinationLayout,
}

impl TransferPipeline {
    pub fn new(
        source: Arc<dyn StorageService>,
        destination: Arc<dyn StorageService>,
        converter: CsvConverter,
        scratch: ScratchPaths,
        layout: DestinationLayout,
    ) -> Self {
        Self {
            source,
            destination,
            converter,
            scratch,
            layout,
        }
    }

    pub fn from_config(
        config: &MigrationConfig,
        source: Arc<dyn StorageService>,
        destination: Arc<dyn StorageService>,
    ) -> Self {
        Self::new(
            source,
            destination,
            CsvConverter::from_config(config),
            config.scratch.clone(),
            config.destination.clone(),
        )
    }

    /// Processes every descriptor sequentially. A failed descriptor never stops
    /// the batch.
    pub async fn run(&self, descriptors: &[TransferDescriptor]) -> BatchReport {
        let mut report = BatchReport::default();

        for (index, descriptor) in descriptors.iter().enumerate() {
            info!(
                "📦 [{}/{}] {}",
                index + 1,
                descriptors.len(),
                descriptor.full_path
            );
            report.outcomes.push(self.process(descriptor).await);
        }

        for outcome in &report.outcomes {
            if let TransferOutcome::Failed { reached, .. } = outcome {
                warn!("Not migrated: {} (stopped after {})", outcome.object_key(), reached);
            }
        }

        info!(
            "🏁 Batch finished: {} completed, {} skipped, {} failed",
            report.completed(),
            report.skipped(),
            report.failed()
        );
        report
    }

    pub async fn process(&self, descriptor: &TransferDescriptor) -> TransferOutcome {
        if let Some(reason) = skip_reason(descriptor) {
            info!("Skipping {} ({:?})", descriptor.object_key, reason);
            return TransferOutcome::Skipped {
                object_key: descriptor.object_key.clone(),
                reason,
            };
        }

        let mut reached = TransferStage::Listed;
        match self.transfer(descriptor, &mut reached).await {
            Ok(done) => TransferOutcome::Completed(done),
            Err(error) => {
                error!(
                    "❌ Error processing {} (after {}): {}",
                    descriptor.object_key, reached, error
                );
                TransferOutcome::Failed {
                    object_key: descriptor.object_key.clone(),
                    reached,
                    error,
                }
            }
        }
    }

    async fn transfer(
        &self,
        descriptor: &TransferDescriptor,
        reached: &mut TransferStage,
    ) -> Result<CompletedTransfer, MigrationError> {
        let file_name = descriptor.file_name.as_str();

        let raw_file = ScratchFile::new(self.scratch.raw_file(file_name));
        let written = self
            .source
            .download_to_path(&descriptor.object_key, raw_file.path())
            .await
            .map_err(MigrationError::Download)?;
        if written != descriptor.size_bytes {
            warn!(
                "Downloaded {} bytes for {}, listing reported {}",
                written, descriptor.object_key, descriptor.size_bytes
            );
        }
        *reached = TransferStage::Downloaded;
        info!("⬇️  Downloaded file: {}", descriptor.object_key);

        let json_file = ScratchFile::new(self.scratch.json_file(file_name));
        let conversion = self
            .converter
            .convert_blocking(
                raw_file.path().to_path_buf(),
                descriptor.size_bytes,
                json_file.path().to_path_buf(),
            )
            .await?;
        *reached = TransferStage::Converted;

        let json_key = self.layout.json_key(file_name);
        let json_upload = self
            .destination
            .upload_from_path(&json_key, json_file.path())
            .await
            .map_err(MigrationError::Upload)?;
        *reached = TransferStage::JsonUploaded;
        info!(
            "⬆️  Uploaded JSON: {} -> {} (sha256 {})",
            json_file.path().display(),
            json_upload.s3_key,
            json_upload.hash
        );

        let raw_key = self.layout.raw_key(file_name);
        let raw_upload = self
            .destination
            .upload_from_path(&raw_key, raw_file.path())
            .await
            .map_err(MigrationError::Upload)?;
        *reached = TransferStage::RawUploaded;
        info!(
            "⬆️  Uploaded Raw File: {} -> {} (sha256 {})",
            raw_file.path().display(),
            raw_upload.s3_key,
            raw_upload.hash
        );

        let cleaned_up = [raw_file.release(), json_file.release()]
            .iter()
            .all(|removal| !matches!(removal, Removal::Failed { .. }));
        if cleaned_up {
            *reached = TransferStage::CleanedUp;
        } else {
            warn!(
                "🧹 Scratch files for {} were not fully removed",
                descriptor.object_key
            );
        }

        Ok(CompletedTransfer {
            object_key: descriptor.object_key.clone(),
            json_key,
            raw_key,
            conversion,
            json_hash: json_upload.hash,
            raw_hash: raw_upload.hash,
            cleaned_up,
        })
    }
}

fn skip_reason(descriptor: &TransferDescriptor) -> Option<SkipReason> {
    if descriptor.file_name.is_empty() {
        Some(SkipReason::EmptyName)
    } else if descriptor.is_folder() {
        Some(SkipReason::Folder)
    } else if !is_plain_file_name(&descriptor.file_name) {
        Some(SkipReason::UnusableName)
    } else {
        None
    }
}
