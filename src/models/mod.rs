use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// One entry returned by an object listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Describes one source object to download, convert, and re-upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferDescriptor {
    pub bucket: String,
    pub file_name: String,
    pub object_key: String,
    pub full_path: String,
    pub size_bytes: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

impl TransferDescriptor {
    pub fn from_summary(bucket: &str, summary: ObjectSummary) -> Self {
        let file_name = file_name_of(&summary.key).to_string();
        Self {
            bucket: bucket.to_string(),
            full_path: format!("s3://{}/{}", bucket, summary.key),
            file_name,
            object_key: summary.key,
            size_bytes: summary.size.max(0) as u64,
            last_modified: summary.last_modified,
        }
    }

    /// Folder placeholders have keys ending in `/` and no file name.
    pub fn is_folder(&self) -> bool {
        self.object_key.ends_with('/') || self.file_name.ends_with('/')
    }
}

/// Last `/`-separated segment of an object key; empty for folder keys.
pub fn file_name_of(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or_default()
}

/// Whether `name` can be joined onto a scratch directory as one file: a single
/// normal path component, so not `.`, `..`, or anything containing a separator.
pub fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
