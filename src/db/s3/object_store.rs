use std::future::Future;
use std::path::Path;

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use log::info;
use regex::Regex;

use crate::db::sam::monthly_extract_archive::FILE_PREFIX;
use crate::errors::SamError;
use crate::interval::month::Month;

pub const DEFAULT_REGION: &str = "us-east-1";
pub const PAGE_SIZE: i32 = 1000;

/// One page of a bucket listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub keys: Vec<String>,
    pub is_truncated: bool,
    pub next_marker: Option<String>,
}

/// The two primitives the pipeline needs from a remote object store.
pub trait ObjectStore {
    fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        marker: Option<&str>,
        max_keys: i32,
    ) -> impl Future<Output = Result<ListPage, SamError>> + Send;

    fn upload(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
    ) -> impl Future<Output = Result<(), SamError>> + Send;
}

pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(access_key: &str, secret_key: &str, region: &str) -> S3Store {
        let credentials = Credentials::new(access_key, secret_key, None, None, "sam-monthly");
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials)
            .build();
        S3Store {
            client: Client::from_conf(config),
        }
    }
}

impl ObjectStore for S3Store {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        marker: Option<&str>,
        max_keys: i32,
    ) -> Result<ListPage, SamError> {
        let mut request = self
            .client
            .list_objects()
            .bucket(bucket)
            .max_keys(max_keys);
        if let Some(prefix) = prefix {
            request = request.prefix(prefix);
        }
        if let Some(marker) = marker {
            request = request.marker(marker);
        }
        let response = request.send().await.map_err(|e| {
            SamError::RemoteStore(format!(
                "An error occurred attempting to access S3: {}",
                DisplayErrorContext(&e)
            ))
        })?;
        Ok(ListPage {
            keys: response
                .contents()
                .iter()
                .filter_map(|o| o.key().map(str::to_string))
                .collect(),
            is_truncated: response.is_truncated().unwrap_or(false),
            next_marker: response.next_marker().map(str::to_string),
        })
    }

    async fn upload(&self, bucket: &str, key: &str, path: &Path) -> Result<(), SamError> {
        let body = ByteStream::from_path(path).await.map_err(|e| {
            SamError::RemoteStore(format!(
                "Attempt to upload file to S3 failed, cannot read {}: {}",
                path.display(),
                e
            ))
        })?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                SamError::RemoteStore(format!(
                    "Attempt to upload file to S3 failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }
}

/// Where the monthly files are archived: a bucket, an optional key prefix and
/// an optional fixed key name for uploads.
pub struct RemoteArchive<S> {
    pub store: S,
    pub bucket: String,
    pub prefix: Option<String>,
    pub key_name: Option<String>,
}

impl<S: ObjectStore> RemoteArchive<S> {
    /// Regex matching any file published for `month`.  Not anchored, so keys
    /// under the prefix match too.
    pub fn month_pattern(month: &Month) -> Result<Regex, SamError> {
        Regex::new(&format!(r"{}{}\d\d\.ZIP", FILE_PREFIX, month.yyyymm()))
            .map_err(|e| SamError::Unexpected(e.to_string()))
    }

    /// Return the first key in listing order that holds a file for `month`.
    /// Pages are requested until a match shows up or the listing runs out.
    pub async fn find_month(&self, month: &Month) -> Result<Option<String>, SamError> {
        info!(
            "Checking for monthly file matching pattern '{}{}\\d\\d.ZIP' in the S3 bucket: {} with prefix {}",
            FILE_PREFIX,
            month.yyyymm(),
            self.bucket,
            self.prefix.as_deref().unwrap_or("(root)")
        );
        let pattern = Self::month_pattern(month)?;
        let mut marker: Option<String> = None;
        loop {
            let page = self
                .store
                .list_page(
                    &self.bucket,
                    self.prefix.as_deref(),
                    marker.as_deref(),
                    PAGE_SIZE,
                )
                .await?;
            if let Some(key) = page.keys.iter().find(|k| pattern.is_match(k)) {
                return Ok(Some(key.clone()));
            }
            if !page.is_truncated {
                return Ok(None);
            }
            // ListObjects only returns NextMarker when a delimiter is set
            marker = match page.next_marker.or_else(|| page.keys.last().cloned()) {
                Some(next) => Some(next),
                None => {
                    return Err(SamError::RemoteStore(format!(
                        "S3 listing of bucket {} is truncated but gives no marker to continue from",
                        self.bucket
                    )))
                }
            };
        }
    }

    /// The key to upload `local` under, e.g. "sam/SAM_PUBLIC_MONTHLY_20240103.ZIP".
    /// An explicit key name replaces the file name but still goes under the prefix.
    pub fn key_for(&self, local: &Path) -> Result<String, SamError> {
        let name = match &self.key_name {
            Some(name) => name.clone(),
            None => local
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    SamError::Unexpected(format!("{} has no file name", local.display()))
                })?,
        };
        Ok(match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), name),
            None => name,
        })
    }

    pub async fn publish(&self, local: &Path) -> Result<String, SamError> {
        let key = self.key_for(local)?;
        info!("Begin copy file to URL: s3://{}/{}", self.bucket, key);
        self.store.upload(&self.bucket, &key, local).await?;
        info!("Copied file to S3");
        Ok(key)
    }
}
