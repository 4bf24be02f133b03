use async_trait::async_trait;
use csv_json_migrator::config::{DestinationLayout, MigrationConfig, ScratchPaths};
use csv_json_migrator::error::MigrationError;
use csv_json_migrator::models::{ObjectSummary, TransferDescriptor};
use csv_json_migrator::run_migration;
use csv_json_migrator::services::converter::ConversionStrategy;
use csv_json_migrator::services::lister::ObjectLister;
use csv_json_migrator::services::pipeline::{
    SkipReason, TransferOutcome, TransferPipeline, TransferStage,
};
use csv_json_migrator::services::storage::{StorageService, UploadResult};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const GIB: i64 = 1024 * 1024 * 1024;

#[derive(Default)]
struct MockStorageService {
    bucket: String,
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    listed_sizes: HashMap<String, i64>,
    failing_downloads: HashSet<String>,
    failing_uploads: HashSet<String>,
    fail_listing: bool,
    downloads: Mutex<Vec<String>>,
}

impl MockStorageService {
    fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            ..Default::default()
        }
    }

    fn with_file(self, key: &str, data: &[u8]) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
        self
    }

    /// Pretend the listing reports `size` bytes for `key`
    fn with_listed_size(mut self, key: &str, size: i64) -> Self {
        self.listed_sizes.insert(key.to_string(), size);
        self
    }

    fn failing_download(mut self, key: &str) -> Self {
        self.failing_downloads.insert(key.to_string());
        self
    }

    fn failing_upload(mut self, key: &str) -> Self {
        self.failing_uploads.insert(key.to_string());
        self
    }

    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }

    fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_objects(&self, prefix: &str) -> anyhow::Result<Vec<ObjectSummary>> {
        if self.fail_listing {
            return Err(anyhow::anyhow!("ExpiredToken: credentials have expired"));
        }
        let files = self.files.lock().unwrap();
        Ok(files
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, data)| ObjectSummary {
                key: key.clone(),
                size: self
                    .listed_sizes
                    .get(key)
                    .copied()
                    .unwrap_or(data.len() as i64),
                last_modified: None,
            })
            .collect())
    }

    async fn download_to_path(&self, key: &str, path: &Path) -> anyhow::Result<u64> {
        self.downloads.lock().unwrap().push(key.to_string());
        if self.failing_downloads.contains(key) {
            return Err(anyhow::anyhow!("connection reset while downloading {}", key));
        }
        let data = self
            .get(key)
            .ok_or_else(|| anyhow::anyhow!("Key not found"))?;
        tokio::fs::write(path, &data).await?;
        Ok(data.len() as u64)
    }

    async fn upload_from_path(&self, key: &str, path: &Path) -> anyhow::Result<UploadResult> {
        if self.failing_uploads.contains(key) {
            return Err(anyhow::anyhow!("AccessDenied for {}", key));
        }
        let data = tokio::fs::read(path).await?;
        let result = UploadResult {
            hash: sha256_hex(&data),
            size: data.len() as i64,
            s3_key: key.to_string(),
        };
        self.files.lock().unwrap().insert(key.to_string(), data);
        Ok(result)
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn test_config(scratch_root: &Path) -> MigrationConfig {
    MigrationConfig {
        source_bucket: "source-bucket".to_string(),
        source_prefix: "data/3334/rawfiles/".to_string(),
        destination: DestinationLayout {
            bucket: "dest-bucket".to_string(),
            raw_prefix: "3334/rawfiles/".to_string(),
            json_prefix: "3334/convertedjson/".to_string(),
        },
        scratch: ScratchPaths::under(scratch_root),
        ..MigrationConfig::default()
    }
}

fn dir_is_empty(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

fn json_lines(data: &[u8]) -> Vec<Value> {
    String::from_utf8(data.to_vec())
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_hidden_file_skipped_and_report_migrated() {
    let scratch = TempDir::new().unwrap();
    let config = test_config(scratch.path());
    let csv = b"region,units,price\nnorth,10,2.5\nsouth,7,3\n";

    let source = Arc::new(
        MockStorageService::new("source-bucket")
            .with_file("data/3334/rawfiles/report1.csv", csv)
            .with_listed_size("data/3334/rawfiles/report1.csv", 500 * 1024 * 1024)
            .with_file("data/3334/rawfiles/._tmp.csv", b"junk"),
    );
    let destination = Arc::new(MockStorageService::new("dest-bucket"));

    let report = run_migration(&config, source.clone(), destination.clone())
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.completed(), 1);
    assert_eq!(source.downloads(), vec!["data/3334/rawfiles/report1.csv"]);

    match &report.outcomes[0] {
        TransferOutcome::Completed(done) => {
            assert_eq!(done.conversion.strategy, ConversionStrategy::WholeFile);
            assert_eq!(done.conversion.rows, 2);
            assert_eq!(done.json_key, "3334/convertedjson/report1.csv.json");
            assert_eq!(done.raw_key, "3334/rawfiles/report1.csv");
            assert_eq!(done.raw_hash, sha256_hex(csv));
            assert!(done.cleaned_up);
        }
        other => panic!("expected completion, got {:?}", other),
    }

    assert_eq!(
        destination.keys(),
        vec![
            "3334/convertedjson/report1.csv.json".to_string(),
            "3334/rawfiles/report1.csv".to_string(),
        ]
    );
    assert_eq!(destination.get("3334/rawfiles/report1.csv").unwrap(), csv);

    let lines = json_lines(&destination.get("3334/convertedjson/report1.csv.json").unwrap());
    assert_eq!(lines.len(), 2);
    for line in &lines {
        let keys: Vec<&String> = line.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 3);
        for column in ["region", "units", "price"] {
            assert!(line.get(column).is_some());
        }
    }
    assert_eq!(
        lines[0],
        serde_json::json!({"region": "north", "units": 10, "price": 2.5})
    );

    assert!(dir_is_empty(&config.scratch.raw_dir));
    assert!(dir_is_empty(&config.scratch.converted_dir));
}

#[tokio::test]
async fn test_large_file_uses_row_chunks() {
    let scratch = TempDir::new().unwrap();
    let config = test_config(scratch.path());

    let total_rows = 250_000usize;
    let mut csv = String::from("id,value\n");
    for i in 0..total_rows {
        csv.push_str(&format!("{},v{}\n", i, i));
    }

    let key = "data/3334/rawfiles/big.csv";
    let source = Arc::new(
        MockStorageService::new("source-bucket")
            .with_file(key, csv.as_bytes())
            .with_listed_size(key, 2 * GIB),
    );
    let destination = Arc::new(MockStorageService::new("dest-bucket"));

    let report = run_migration(&config, source, destination.clone())
        .await
        .unwrap();

    let TransferOutcome::Completed(done) = &report.outcomes[0] else {
        panic!("expected completion, got {:?}", report.outcomes[0]);
    };
    assert_eq!(
        done.conversion.strategy,
        ConversionStrategy::Chunked {
            chunk_rows: 100_000
        }
    );
    assert_eq!(done.conversion.chunks, total_rows.div_ceil(100_000) as u64);
    assert_eq!(done.conversion.rows, total_rows as u64);

    let lines = json_lines(&destination.get("3334/convertedjson/big.csv.json").unwrap());
    assert_eq!(lines.len(), total_rows);
    for index in [0usize, 99_999, 100_000, 199_999, 200_000, total_rows - 1] {
        assert_eq!(lines[index]["id"], Value::from(index as i64));
    }
}

#[tokio::test]
async fn test_failures_are_isolated_and_cleaned_up() {
    let scratch = TempDir::new().unwrap();
    let config = test_config(scratch.path());

    let source = Arc::new(
        MockStorageService::new("source-bucket")
            .with_file("data/3334/rawfiles/a.csv", b"x\n1\n")
            .with_file("data/3334/rawfiles/b.csv", b"x\n2\n")
            .with_file("data/3334/rawfiles/c.csv", b"x,y\n1,2\n1,2,3\n")
            .with_file("data/3334/rawfiles/d.csv", b"x\n4\n")
            .with_file("data/3334/rawfiles/e.csv", b"x\n5\n")
            .failing_download("data/3334/rawfiles/b.csv"),
    );
    let destination = Arc::new(
        MockStorageService::new("dest-bucket").failing_upload("3334/rawfiles/e.csv"),
    );

    let report = run_migration(&config, source, destination.clone())
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 5);
    assert_eq!(report.completed(), 2);
    assert_eq!(report.failed(), 3);

    let failures: Vec<(&str, TransferStage)> = report
        .outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            TransferOutcome::Failed {
                object_key,
                reached,
                ..
            } => Some((object_key.as_str(), *reached)),
            _ => None,
        })
        .collect();
    assert_eq!(
        failures,
        vec![
            ("data/3334/rawfiles/b.csv", TransferStage::Listed),
            ("data/3334/rawfiles/c.csv", TransferStage::Downloaded),
            ("data/3334/rawfiles/e.csv", TransferStage::JsonUploaded),
        ]
    );

    assert!(matches!(
        &report.outcomes[1],
        TransferOutcome::Failed {
            error: MigrationError::Download(_),
            ..
        }
    ));
    assert!(matches!(
        &report.outcomes[2],
        TransferOutcome::Failed {
            error: MigrationError::Conversion(_),
            ..
        }
    ));
    assert!(matches!(
        &report.outcomes[4],
        TransferOutcome::Failed {
            error: MigrationError::Upload(_),
            ..
        }
    ));

    assert!(destination.get("3334/rawfiles/a.csv").is_some());
    assert!(destination.get("3334/rawfiles/d.csv").is_some());
    assert!(destination.get("3334/convertedjson/c.csv.json").is_none());

    assert!(dir_is_empty(&config.scratch.raw_dir));
    assert!(dir_is_empty(&config.scratch.converted_dir));
}

#[tokio::test]
async fn test_folder_and_empty_name_descriptors_are_skipped() {
    let scratch = TempDir::new().unwrap();
    let config = test_config(scratch.path());
    std::fs::create_dir_all(&config.scratch.raw_dir).unwrap();
    std::fs::create_dir_all(&config.scratch.converted_dir).unwrap();

    let source = Arc::new(MockStorageService::new("source-bucket"));
    let destination = Arc::new(MockStorageService::new("dest-bucket"));
    let pipeline = TransferPipeline::from_config(&config, source.clone(), destination.clone());

    let empty_name = TransferDescriptor {
        bucket: "source-bucket".to_string(),
        file_name: String::new(),
        object_key: "data/3334/rawfiles/".to_string(),
        full_path: "s3://source-bucket/data/3334/rawfiles/".to_string(),
        size_bytes: 0,
        last_modified: None,
    };
    let folder = TransferDescriptor {
        file_name: "nested".to_string(),
        object_key: "data/3334/rawfiles/nested/".to_string(),
        full_path: "s3://source-bucket/data/3334/rawfiles/nested/".to_string(),
        ..empty_name.clone()
    };

    let report = pipeline.run(&[empty_name, folder]).await;

    assert_eq!(report.skipped(), 2);
    assert!(matches!(
        report.outcomes[0],
        TransferOutcome::Skipped {
            reason: SkipReason::EmptyName,
            ..
        }
    ));
    assert!(matches!(
        report.outcomes[1],
        TransferOutcome::Skipped {
            reason: SkipReason::Folder,
            ..
        }
    ));
    assert!(source.downloads().is_empty());
    assert!(destination.keys().is_empty());
}

#[tokio::test]
async fn test_dot_segment_keys_never_touch_scratch_root() {
    let scratch = TempDir::new().unwrap();
    let config = test_config(scratch.path());
    let keep = scratch.path().join("keep.txt");
    std::fs::write(&keep, "keep").unwrap();

    let source = Arc::new(
        MockStorageService::new("source-bucket")
            .with_file("data/3334/rawfiles/..", b"x\n1\n")
            .with_file("data/3334/rawfiles/.", b"x\n1\n")
            .with_file("data/3334/rawfiles/report1.csv", b"x\n1\n"),
    );
    let destination = Arc::new(MockStorageService::new("dest-bucket"));

    let report = run_migration(&config, source.clone(), destination.clone())
        .await
        .unwrap();

    assert_eq!(report.completed(), 1);
    assert_eq!(report.failed(), 0);
    assert_eq!(source.downloads(), vec!["data/3334/rawfiles/report1.csv"]);
    assert!(keep.exists());
    assert!(config.scratch.raw_dir.is_dir());
    assert!(config.scratch.converted_dir.is_dir());

    let pipeline = TransferPipeline::from_config(&config, source.clone(), destination);
    let parent = TransferDescriptor {
        bucket: "source-bucket".to_string(),
        file_name: "..".to_string(),
        object_key: "data/3334/rawfiles/..".to_string(),
        full_path: "s3://source-bucket/data/3334/rawfiles/..".to_string(),
        size_bytes: 4,
        last_modified: None,
    };
    let outcome = pipeline.process(&parent).await;

    assert!(matches!(
        outcome,
        TransferOutcome::Skipped {
            reason: SkipReason::UnusableName,
            ..
        }
    ));
    assert_eq!(outcome.object_key(), "data/3334/rawfiles/..");
    assert_eq!(source.downloads().len(), 1);
    assert!(keep.exists());
    assert!(config.scratch.raw_dir.is_dir());
}

#[tokio::test]
async fn test_lister_filters_non_data_entries() {
    let source = Arc::new(
        MockStorageService::new("source-bucket")
            .with_file("data/3334/rawfiles/", b"")
            .with_file("data/3334/rawfiles/._hidden.csv", b"x")
            .with_file("data/3334/rawfiles/sub/._deep.csv", b"x")
            .with_file("data/3334/rawfiles/sub/", b"")
            .with_file("data/3334/rawfiles/sub/kept.csv", b"x\n1\n")
            .with_file("data/3334/rawfiles/report1.csv", b"x\n1\n")
            .with_file("data/other/outside.csv", b"x\n1\n"),
    );

    let descriptors = ObjectLister::new(source)
        .list("data/3334/rawfiles/")
        .await
        .unwrap();

    let names: Vec<&str> = descriptors.iter().map(|d| d.file_name.as_str()).collect();
    assert_eq!(names, vec!["report1.csv", "kept.csv"]);
    assert!(descriptors.iter().all(|d| !d.file_name.starts_with("._")));
    assert_eq!(
        descriptors[0].full_path,
        "s3://source-bucket/data/3334/rawfiles/report1.csv"
    );
    assert_eq!(descriptors[0].bucket, "source-bucket");
    assert_eq!(descriptors[0].size_bytes, 4);
}

#[tokio::test]
async fn test_listing_failure_is_fatal() {
    let scratch = TempDir::new().unwrap();
    let config = test_config(scratch.path());
    let source = Arc::new(MockStorageService {
        fail_listing: true,
        ..MockStorageService::new("source-bucket")
    });
    let destination = Arc::new(MockStorageService::new("dest-bucket"));

    let err = run_migration(&config, source.clone(), destination)
        .await
        .unwrap_err();

    assert!(matches!(err, MigrationError::Listing { .. }));
    assert!(err.to_string().contains("ExpiredToken"));
    assert!(source.downloads().is_empty());
}

#[tokio::test]
async fn test_same_bucket_round_trip() {
    let scratch = TempDir::new().unwrap();
    let mut config = test_config(scratch.path());
    config.source_prefix = "3334/rawfiles/".to_string();

    let store = Arc::new(
        MockStorageService::new("fortuna")
            .with_file("3334/rawfiles/orders.csv", b"order,qty\nA1,3\nA2,4\n"),
    );

    let report = run_migration(&config, store.clone(), store.clone())
        .await
        .unwrap();

    assert_eq!(report.completed(), 1);
    assert_eq!(
        store.get("3334/rawfiles/orders.csv").unwrap(),
        b"order,qty\nA1,3\nA2,4\n"
    );
    let lines = json_lines(&store.get("3334/convertedjson/orders.csv.json").unwrap());
    assert_eq!(lines[1], serde_json::json!({"order": "A2", "qty": 4}));
}
