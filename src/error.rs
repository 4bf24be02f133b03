use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV file has no header row")]
    MissingHeader,

    #[error("Row {row}: expected {expected} fields, saw {found}")]
    TooManyFields {
        row: u64,
        expected: usize,
        found: usize,
    },

    #[error("Conversion task failed: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Listing s3://{bucket}/{prefix} failed: {source:#}")]
    Listing {
        bucket: String,
        prefix: String,
        source: anyhow::Error,
    },

    #[error("Failed to prepare scratch directory {}: {source}", path.display())]
    Scratch {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Download failed: {0:#}")]
    Download(anyhow::Error),

    #[error("Conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Upload failed: {0:#}")]
    Upload(anyhow::Error),
}
