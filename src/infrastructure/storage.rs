use crate::config::MigrationConfig;
use crate::services::storage::S3StorageService;
use aws_sdk_s3::config::{Credentials, Region};
use std::sync::Arc;
use tracing::info;

/// Builds the S3 client shared by the source and destination services.
///
/// Credentials come from the standard AWS provider chain (optionally pinned to
/// a named profile). When a custom endpoint is configured together with an
/// access key pair, static credentials and path-style addressing are used.
pub async fn setup_client(config: &MigrationConfig) -> aws_sdk_s3::Client {
    let mut loader = aws_config::from_env();

    if let Some(profile) = &config.aws_profile {
        info!("🔑 Using AWS profile '{}'", profile);
        loader = loader.profile_name(profile);
    }

    if let Some(region) = &config.aws_region {
        loader = loader.region(Region::new(region.clone()));
    }

    if let Some(endpoint_url) = &config.endpoint_url {
        info!("☁️  S3 endpoint override: {}", endpoint_url);
        loader = loader.endpoint_url(endpoint_url);

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "static",
            ));
        }
    }

    let aws_config = loader.load().await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(config.endpoint_url.is_some())
        .build();

    aws_sdk_s3::Client::from_conf(s3_config)
}

/// Source and destination services over one client.
pub async fn setup_storage(
    config: &MigrationConfig,
) -> (Arc<S3StorageService>, Arc<S3StorageService>) {
    let client = setup_client(config).await;

    info!(
        "☁️  Source: s3://{}/{} -> Destination bucket: {}",
        config.source_bucket, config.source_prefix, config.destination.bucket
    );

    (
        Arc::new(S3StorageService::new(
            client.clone(),
            config.source_bucket.clone(),
        )),
        Arc::new(S3StorageService::new(
            client,
            config.destination.bucket.clone(),
        )),
    )
}
