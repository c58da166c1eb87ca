use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;

use super::{BlobReader, BlobStat, BlobStore};
use crate::error::{Error, Result};
use crate::pathspec;

/// Blob store backed by an S3-compatible object store (MinIO, AWS, ...).
///
/// Keys are flat object names; "subtree" deletes translate to prefix
/// deletes over `key/`.
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    base: String,
}

impl S3BlobStore {
    pub async fn new(
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        base_prefix: &str,
        use_tls: bool,
    ) -> Result<Self> {
        let scheme = if use_tls { "https" } else { "http" };
        let endpoint_url = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("{scheme}://{endpoint}")
        };

        let credentials = Credentials::new(access_key, secret_key, None, None, "stevedore");
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint_url)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(config),
            bucket: bucket.to_string(),
            base: base_prefix.trim_matches('/').to_string(),
        })
    }

    fn object_key(&self, key: &str) -> Result<String> {
        let key = key.trim_start_matches('/');
        pathspec::validate_path(key)?;
        if self.base.is_empty() {
            Ok(key.to_string())
        } else {
            Ok(format!("{}/{}", self.base, key))
        }
    }

    fn strip_base<'a>(&self, key: &'a str) -> &'a str {
        if self.base.is_empty() {
            key
        } else {
            key.strip_prefix(&self.base)
                .map(|k| k.trim_start_matches('/'))
                .unwrap_or(key)
        }
    }

    async fn list_object_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = &continuation {
                req = req.continuation_token(token);
            }

            let resp = req.send().await.map_err(|e| {
                Error::storage(prefix, std::io::Error::other(e.to_string()))
            })?;

            for obj in resp.contents() {
                if let Some(key) = obj.key() {
                    keys.push(key.to_string());
                }
            }

            match resp.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        key: &str,
        mut reader: Box<dyn AsyncRead + Send + Unpin>,
        size: i64,
    ) -> Result<()> {
        let object_key = self.object_key(key)?;

        let mut body = Vec::with_capacity(size.max(0) as usize);
        reader
            .read_to_end(&mut body)
            .await
            .map_err(|e| Error::storage(key, e))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| Error::storage(key, std::io::Error::other(e.to_string())))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<BlobReader> {
        let object_key = self.object_key(key)?;

        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_no_such_key() {
                    Error::NotFound(key.to_string())
                } else {
                    Error::storage(key, std::io::Error::other(service.to_string()))
                }
            })?;

        let size = resp.content_length().unwrap_or(0);
        Ok(BlobReader::Stream {
            stream: Box::new(resp.body.into_async_read()),
            size,
        })
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let object_key = self.object_key(key)?;

        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service = e.into_service_error();
                if service.is_not_found() {
                    Ok(false)
                } else {
                    Err(Error::storage(key, std::io::Error::other(service.to_string())))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let object_key = self.object_key(key)?;

        // Remove the key itself plus everything under it, so version and
        // app subtree deletes behave like the local backend.
        let mut targets = self.list_object_keys(&format!("{object_key}/")).await?;
        targets.push(object_key);

        for chunk in targets.chunks(1000) {
            let identifiers: Vec<ObjectIdentifier> = chunk
                .iter()
                .filter_map(|k| ObjectIdentifier::builder().key(k).build().ok())
                .collect();
            if identifiers.is_empty() {
                continue;
            }
            let delete = Delete::builder()
                .set_objects(Some(identifiers))
                .build()
                .map_err(|e| Error::storage(key, std::io::Error::other(e.to_string())))?;

            if let Err(e) = self
                .client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
            {
                warn!(key, error = %e, "batch delete failed");
                return Err(Error::storage(key, std::io::Error::other(e.to_string())));
            }
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let object_prefix = if prefix.is_empty() {
            if self.base.is_empty() {
                String::new()
            } else {
                format!("{}/", self.base)
            }
        } else {
            format!("{}/", self.object_key(prefix)?)
        };
        let keys = self.list_object_keys(&object_prefix).await?;
        Ok(keys
            .iter()
            .map(|k| self.strip_base(k).to_string())
            .collect())
    }

    async fn stat(&self, key: &str) -> Result<BlobStat> {
        let object_key = self.object_key(key)?;

        let resp = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_not_found() {
                    Error::NotFound(key.to_string())
                } else {
                    Error::storage(key, std::io::Error::other(service.to_string()))
                }
            })?;

        Ok(BlobStat {
            size: resp.content_length().unwrap_or(0),
            modified_unix: resp.last_modified().map(|t| t.secs()).unwrap_or(0),
            is_dir: key.ends_with('/'),
        })
    }
}
