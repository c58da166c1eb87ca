use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::io::AsyncRead;

use super::BlobStore;
use crate::error::{Error, Result};
use crate::manifest::{MANIFEST_FILE, Manifest};

/// Manages artifact versions on top of a blob store: manifest read/write,
/// version enumeration, and subtree deletes.
///
/// Blob keys follow `{project}/{app}/{version}/{path}`, with the manifest
/// at `{project}/{app}/{version}/meta.yaml`.
#[derive(Clone)]
pub struct ArtifactManager {
    store: Arc<dyn BlobStore>,
}

impl ArtifactManager {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    pub fn version_key(project: &str, app: &str, version: &str) -> String {
        format!("{project}/{app}/{version}")
    }

    pub fn manifest_key(project: &str, app: &str, version: &str) -> String {
        format!("{project}/{app}/{version}/{MANIFEST_FILE}")
    }

    pub fn file_key(project: &str, app: &str, version: &str, path: &str) -> String {
        format!("{project}/{app}/{version}/{path}")
    }

    /// Writes the serialized manifest for a version. This is the commit
    /// point: it must happen after every file of the version is stored.
    pub async fn store_manifest(
        &self,
        project: &str,
        app: &str,
        version: &str,
        manifest_bytes: Vec<u8>,
    ) -> Result<()> {
        let key = Self::manifest_key(project, app, version);
        let size = manifest_bytes.len() as i64;
        let reader: Box<dyn AsyncRead + Send + Unpin> =
            Box::new(std::io::Cursor::new(manifest_bytes));
        self.store.put(&key, reader, size).await
    }

    /// Reads and parses the manifest for a version. A missing manifest
    /// means the version does not exist for readers.
    pub async fn get_manifest(&self, project: &str, app: &str, version: &str) -> Result<Manifest> {
        let key = Self::manifest_key(project, app, version);
        let reader = self.store.get(&key).await.map_err(|e| match e {
            Error::NotFound(_) => Error::NotFound(format!("{project}/{app}/{version}")),
            other => other,
        })?;
        let data = reader.read_to_end().await.map_err(|e| Error::storage(&key, e))?;
        Manifest::parse(&data)
    }

    /// Returns true if the version's manifest exists.
    pub async fn manifest_exists(&self, project: &str, app: &str, version: &str) -> Result<bool> {
        self.store
            .exists(&Self::manifest_key(project, app, version))
            .await
    }

    pub async fn delete_version(&self, project: &str, app: &str, version: &str) -> Result<()> {
        self.store
            .delete(&Self::version_key(project, app, version))
            .await
    }

    pub async fn delete_app(&self, project: &str, app: &str) -> Result<()> {
        self.store.delete(&format!("{project}/{app}")).await
    }

    pub async fn delete_project(&self, project: &str) -> Result<()> {
        self.store.delete(project).await
    }

    /// Lists version directory names found under `{project}/{app}/`,
    /// whether or not they carry a manifest.
    pub async fn list_versions(&self, project: &str, app: &str) -> Result<Vec<String>> {
        let prefix = format!("{project}/{app}");
        let entries = self.store.list(&prefix).await?;

        let mut versions = BTreeSet::new();
        for entry in entries {
            let Some(rest) = entry
                .strip_prefix(&prefix)
                .map(|r| r.trim_start_matches('/'))
            else {
                continue;
            };
            if let Some(version) = rest.split('/').next() {
                if !version.is_empty() {
                    versions.insert(version.to_string());
                }
            }
        }
        Ok(versions.into_iter().collect())
    }
}
