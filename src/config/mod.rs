use std::env;
use std::path::PathBuf;

/// Files at or below this size are converted in one pass (1 GiB)
pub const DEFAULT_SIZE_THRESHOLD: u64 = 1024 * 1024 * 1024;

/// Rows per chunk for the streaming conversion strategy
pub const DEFAULT_CHUNK_ROWS: usize = 100_000;

const DEFAULT_BUCKET: &str = "fortuna-merged-arl";
const DEFAULT_RAW_PREFIX: &str = "3334/rawfiles/";
const DEFAULT_JSON_PREFIX: &str = "3334/convertedjson/";

/// Local staging directories shared by every descriptor in a run.
///
/// File names inside them are derived from the object's file name, so two
/// objects with the same name (or two concurrent runs) will overwrite each
/// other's scratch files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchPaths {
    /// Raw downloads land here
    pub raw_dir: PathBuf,
    /// Converted `.json` files land here
    pub converted_dir: PathBuf,
}

impl ScratchPaths {
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            raw_dir: root.join("raw_files"),
            converted_dir: root.join("converted_json"),
        }
    }

    pub fn raw_file(&self, file_name: &str) -> PathBuf {
        self.raw_dir.join(file_name)
    }

    pub fn json_file(&self, file_name: &str) -> PathBuf {
        self.converted_dir.join(format!("{}.json", file_name))
    }
}

/// Where converted and raw artifacts are written in the destination store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationLayout {
    pub bucket: String,
    pub raw_prefix: String,
    pub json_prefix: String,
}

impl DestinationLayout {
    pub fn raw_key(&self, file_name: &str) -> String {
        format!("{}{}", self.raw_prefix, file_name)
    }

    pub fn json_key(&self, file_name: &str) -> String {
        format!("{}{}.json", self.json_prefix, file_name)
    }
}

/// Settings for one migration run
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Bucket the CSV objects are listed and downloaded from
    pub source_bucket: String,

    /// Prefix scoping the source listing
    pub source_prefix: String,

    /// Destination bucket and prefixes
    pub destination: DestinationLayout,

    /// Local staging directories
    pub scratch: ScratchPaths,

    /// Size in bytes above which conversion switches to chunked streaming
    pub size_threshold: u64,

    /// Rows per chunk when streaming
    pub chunk_rows: usize,

    /// Named AWS profile to load credentials from (e.g. an SSO profile)
    pub aws_profile: Option<String>,

    /// Region override; otherwise resolved by the AWS provider chain
    pub aws_region: Option<String>,

    /// Custom S3 endpoint (MinIO and friends)
    pub endpoint_url: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            source_bucket: DEFAULT_BUCKET.to_string(),
            source_prefix: DEFAULT_RAW_PREFIX.to_string(),
            destination: DestinationLayout {
                bucket: DEFAULT_BUCKET.to_string(),
                raw_prefix: DEFAULT_RAW_PREFIX.to_string(),
                json_prefix: DEFAULT_JSON_PREFIX.to_string(),
            },
            scratch: ScratchPaths::under(env::temp_dir().join("filestemp")),
            size_threshold: DEFAULT_SIZE_THRESHOLD,
            chunk_rows: DEFAULT_CHUNK_ROWS,
            aws_profile: None,
            aws_region: None,
            endpoint_url: None,
            access_key: None,
            secret_key: None,
        }
    }
}

impl MigrationConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        let source_bucket = env::var("SOURCE_BUCKET").unwrap_or(default.source_bucket);

        Self {
            source_prefix: env::var("SOURCE_PREFIX").unwrap_or(default.source_prefix),

            destination: DestinationLayout {
                bucket: env::var("DESTINATION_BUCKET").unwrap_or_else(|_| source_bucket.clone()),
                raw_prefix: env::var("DESTINATION_RAW_PREFIX")
                    .unwrap_or(default.destination.raw_prefix),
                json_prefix: env::var("DESTINATION_JSON_PREFIX")
                    .unwrap_or(default.destination.json_prefix),
            },

            scratch: env::var("SCRATCH_ROOT")
                .map(ScratchPaths::under)
                .unwrap_or(default.scratch),

            size_threshold: env::var("CONVERSION_SIZE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.size_threshold),

            chunk_rows: env::var("CONVERSION_CHUNK_ROWS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|rows| *rows > 0)
                .unwrap_or(default.chunk_rows),

            aws_profile: env::var("AWS_PROFILE").ok().filter(|v| !v.is_empty()),
            aws_region: env::var("AWS_REGION").ok().filter(|v| !v.is_empty()),
            endpoint_url: env::var("S3_ENDPOINT").ok().filter(|v| !v.is_empty()),
            access_key: env::var("S3_ACCESS_KEY").ok(),
            secret_key: env::var("S3_SECRET_KEY").ok(),

            source_bucket,
        }
    }
}
