//! Object stores that receive purge backups.

use anyhow::{Context, Result};
use object_store::{ObjectStore, aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory};
use std::sync::Arc;
use url::Url;

use crate::config::BackupConfig;

/// Create the backup object store from configuration
pub fn create_object_store(backup_config: &BackupConfig) -> Result<Arc<dyn ObjectStore>> {
    create_object_store_from_dsn(&backup_config.dsn)
}

/// Extract the filesystem path from a storage DSN.
///
/// `file:///.data` is the relative directory `.data`, `file:///tmp/data` the
/// absolute `/tmp/data`. Other schemes are returned unchanged.
///
/// ```
/// use common::storage::storage_dsn_to_path;
///
/// assert_eq!(storage_dsn_to_path("file:///.data/backups").unwrap(), ".data/backups");
/// assert_eq!(storage_dsn_to_path("file:///tmp/data").unwrap(), "/tmp/data");
/// assert_eq!(storage_dsn_to_path("memory://").unwrap(), "memory://");
/// ```
pub fn storage_dsn_to_path(dsn: &str) -> Result<String> {
    let url = parse_dsn(dsn)?;

    match url.scheme() {
        "file" => {
            let path = url.path();
            if path.is_empty() || path == "/" {
                anyhow::bail!("File DSN must specify a path: file:///path/to/backups");
            }
            let path = path.strip_prefix('/').filter(|p| p.starts_with('.')).unwrap_or(path);
            Ok(path.to_string())
        }
        "memory" | "s3" => Ok(dsn.to_string()),
        scheme => anyhow::bail!("Unsupported storage scheme: {scheme}. Supported: file, memory, s3"),
    }
}

/// Create an object store from a DSN string.
///
/// Local directories are created when missing.
pub fn create_object_store_from_dsn(dsn: &str) -> Result<Arc<dyn ObjectStore>> {
    let url = parse_dsn(dsn)?;

    match url.scheme() {
        "file" => {
            let path = storage_dsn_to_path(dsn)?;
            std::fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create backup directory {path}"))?;
            Ok(Arc::new(LocalFileSystem::new_with_prefix(&path)?))
        }
        "memory" => Ok(Arc::new(InMemory::new())),
        "s3" => {
            let builder = create_s3_builder_from_dsn(&url)?;
            Ok(Arc::new(builder.build()?))
        }
        scheme => anyhow::bail!("Unsupported storage scheme: {scheme}. Supported: file, memory, s3"),
    }
}

fn parse_dsn(dsn: &str) -> Result<Url> {
    Url::parse(dsn).map_err(|e| anyhow::anyhow!("Invalid storage DSN '{}': {}", dsn, e))
}

/// Create an S3 builder from a DSN
/// DSN format: s3://[access_key:secret_key@]host[:port]/bucket
pub fn create_s3_builder_from_dsn(dsn: &Url) -> Result<AmazonS3Builder> {
    let host = dsn
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("Missing S3 host in DSN"))?;
    let port = dsn.port();
    let bucket = dsn.path().trim_start_matches('/');

    if bucket.is_empty() {
        anyhow::bail!("S3 DSN must specify a bucket: s3://host/bucket");
    }

    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_region("us-east-1");

    let access_key = dsn.username();
    if !access_key.is_empty() {
        builder = builder
            .with_access_key_id(access_key)
            .with_secret_access_key(dsn.password().unwrap_or(""));
    }

    // S3-compatible services (MinIO etc.) need an explicit path-style endpoint
    if !host.contains("amazonaws.com") {
        let scheme = if port == Some(443) { "https" } else { "http" };
        let endpoint = match port {
            Some(p) => format!("{scheme}://{host}:{p}"),
            None => format!("{scheme}://{host}"),
        };
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(true)
            .with_virtual_hosted_style_request(false);
    }

    Ok(builder)
}
