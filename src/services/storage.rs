use crate::models::ObjectSummary;
use crate::utils::hash::calculate_file_hash;
use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

/// Files larger than this are sent with a multipart upload
pub const MULTIPART_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Part size for multipart uploads
pub const MULTIPART_CHUNK_SIZE: usize = 10 * 1024 * 1024;

pub struct UploadResult {
    pub hash: String,
    pub size: i64,
    pub s3_key: String,
}

/// Object store bound to a single bucket.
#[async_trait]
pub trait StorageService: Send + Sync {
    fn bucket(&self) -> &str;

    /// Every object under `prefix`, following continuation tokens until exhausted.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectSummary>>;

    /// Streams an object into a local file, returning the number of bytes written.
    async fn download_to_path(&self, key: &str, path: &Path) -> Result<u64>;

    async fn upload_from_path(&self, key: &str, path: &Path) -> Result<UploadResult>;
}

pub struct S3StorageService {
    client: Client,
    bucket: String,
}

impl S3StorageService {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    async fn upload_stream_with_hash<R>(&self, key: &str, reader: R) -> Result<UploadResult>
    where
        R: AsyncRead + Unpin + Send,
    {
        let multipart_upload_res = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;

        let upload_id = multipart_upload_res
            .upload_id()
            .ok_or_else(|| anyhow::anyhow!("No upload ID"))?
            .to_string();

        match self.upload_parts(key, &upload_id, reader).await {
            Ok(result) => Ok(result),
            Err(e) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(
                        "Failed to abort multipart upload {} for {}: {:?}",
                        upload_id,
                        key,
                        abort_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn upload_parts<R>(&self, key: &str, upload_id: &str, mut reader: R) -> Result<UploadResult>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut chunk_index = 1;
        let mut completed_parts = Vec::new();
        let mut hasher = Sha256::new();
        let mut total_size = 0;

        let mut buffer = vec![0u8; MULTIPART_CHUNK_SIZE];

        loop {
            let mut n = 0;
            while n < MULTIPART_CHUNK_SIZE {
                let read = reader.read(&mut buffer[n..]).await?;
                if read == 0 {
                    break;
                }
                hasher.update(&buffer[n..n + read]);
                n += read;
            }

            if n == 0 {
                break;
            }

            total_size += n as i64;
            let body = ByteStream::from(buffer[..n].to_vec());
            let upload_part_res = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .body(body)
                .part_number(chunk_index)
                .send()
                .await?;

            completed_parts.push(
                CompletedPart::builder()
                    .e_tag(upload_part_res.e_tag().unwrap_or_default())
                    .part_number(chunk_index)
                    .build(),
            );

            tracing::debug!("Uploaded part {} of {} ({} bytes)", chunk_index, key, n);
            chunk_index += 1;
        }

        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await?;

        Ok(UploadResult {
            hash: hex::encode(hasher.finalize()),
            size: total_size,
            s3_key: key.to_string(),
        })
    }
}

#[async_trait]
impl StorageService for S3StorageService {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectSummary>> {
        let mut objects = Vec::new();
        let mut continuation_token = None;

        loop {
            let res = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token)
                .send()
                .await?;

            if let Some(contents) = res.contents {
                for object in contents {
                    if let Some(key) = object.key {
                        let last_modified = object.last_modified.map(|d| {
                            chrono::DateTime::from_timestamp(d.secs(), d.subsec_nanos())
                                .unwrap_or_default()
                        });
                        objects.push(ObjectSummary {
                            key,
                            size: object.size.unwrap_or(0),
                            last_modified,
                        });
                    }
                }
            }

            if res.is_truncated.unwrap_or(false) {
                continuation_token = res.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(objects)
    }

    async fn download_to_path(&self, key: &str, path: &Path) -> Result<u64> {
        let res = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;

        let mut file = tokio::fs::File::create(path).await?;
        let mut body = res.body.into_async_read();
        let written = tokio::io::copy(&mut body, &mut file).await?;
        file.flush().await?;

        Ok(written)
    }

    async fn upload_from_path(&self, key: &str, path: &Path) -> Result<UploadResult> {
        let size = tokio::fs::metadata(path).await?.len();

        if size > MULTIPART_THRESHOLD {
            let file = tokio::fs::File::open(path).await?;
            return self.upload_stream_with_hash(key, file).await;
        }

        let hash = calculate_file_hash(path).await?;
        let body = ByteStream::from_path(path).await?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await?;

        Ok(UploadResult {
            hash,
            size: size as i64,
            s3_key: key.to_string(),
        })
    }
}
