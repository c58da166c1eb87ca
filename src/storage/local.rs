use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::AsyncRead;
use walkdir::WalkDir;

use super::{BlobReader, BlobStat, BlobStore};
use crate::error::{Error, Result};
use crate::pathspec;

/// Blob store rooted at a directory on the local filesystem.
pub struct LocalBlobStore {
    base: PathBuf,
}

impl LocalBlobStore {
    pub async fn new(base: &Path) -> Result<Self> {
        fs::create_dir_all(base)
            .await
            .map_err(|e| Error::storage(base.to_string_lossy(), e))?;
        Ok(Self {
            base: base.to_path_buf(),
        })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn full_path(&self, key: &str) -> Result<PathBuf> {
        let key = key.trim_start_matches('/');
        pathspec::validate_path(key)?;
        Ok(self.base.join(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(
        &self,
        key: &str,
        mut reader: Box<dyn AsyncRead + Send + Unpin>,
        _size: i64,
    ) -> Result<()> {
        let path = self.full_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage(key, e))?;
        }

        let mut file = File::create(&path)
            .await
            .map_err(|e| Error::storage(key, e))?;
        tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| Error::storage(key, e))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<BlobReader> {
        let path = self.full_path(key)?;
        let file = File::open(&path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::NotFound(key.to_string())
            } else {
                Error::storage(key, e)
            }
        })?;
        let size = file
            .metadata()
            .await
            .map_err(|e| Error::storage(key, e))?
            .len() as i64;
        Ok(BlobReader::File { file, size })
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.full_path(key)?;
        match fs::metadata(&path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::storage(key, e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.full_path(key)?;
        let meta = match fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::storage(key, e)),
        };

        let result = if meta.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(key, e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        // An empty prefix enumerates the whole store.
        let root = if prefix.is_empty() {
            self.base.clone()
        } else {
            self.full_path(prefix)?
        };
        if !root.exists() {
            return Ok(Vec::new());
        }

        let base = self.base.clone();
        // walkdir is synchronous; the subtree walk runs on a blocking thread.
        let entries = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            for entry in WalkDir::new(&root).follow_links(false) {
                let entry = entry.map_err(|e| {
                    std::io::Error::other(format!("walk failed: {e}"))
                })?;
                if entry.path() == root {
                    continue;
                }
                if let Ok(rel) = entry.path().strip_prefix(&base) {
                    out.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
            Ok::<_, std::io::Error>(out)
        })
        .await
        .map_err(|e| Error::storage(prefix, std::io::Error::other(e)))?
        .map_err(|e| Error::storage(prefix, e))?;

        Ok(entries)
    }

    async fn stat(&self, key: &str) -> Result<BlobStat> {
        let path = self.full_path(key)?;
        let meta = fs::metadata(&path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::NotFound(key.to_string())
            } else {
                Error::storage(key, e)
            }
        })?;

        let modified_unix = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Ok(BlobStat {
            size: meta.len() as i64,
            modified_unix,
            is_dir: meta.is_dir(),
        })
    }

    fn is_local(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (TempDir, LocalBlobStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path()).await.unwrap();
        (dir, store)
    }

    fn reader(data: &[u8]) -> Box<dyn AsyncRead + Send + Unpin> {
        Box::new(std::io::Cursor::new(data.to_vec()))
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let (_dir, store) = store().await;
        store
            .put("p1/a1/v1/a.txt", reader(b"hello"), 5)
            .await
            .unwrap();

        assert!(store.exists("p1/a1/v1/a.txt").await.unwrap());
        let blob = store.get("p1/a1/v1/a.txt").await.unwrap();
        assert_eq!(blob.size(), 5);
        assert_eq!(blob.read_to_end().await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let (_dir, store) = store().await;
        store.put("k/f.bin", reader(b"one"), 3).await.unwrap();
        store.put("k/f.bin", reader(b"twotwo"), 6).await.unwrap();

        let blob = store.get("k/f.bin").await.unwrap();
        assert_eq!(blob.read_to_end().await.unwrap(), b"twotwo");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_dir, store) = store().await;
        assert!(matches!(
            store.get("absent/key").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_subtree() {
        let (_dir, store) = store().await;
        store.put("p1/a1/v1/a.txt", reader(b"a"), 1).await.unwrap();
        store
            .put("p1/a1/v1/sub/b.txt", reader(b"b"), 1)
            .await
            .unwrap();

        store.delete("p1/a1/v1").await.unwrap();
        assert!(!store.exists("p1/a1/v1/a.txt").await.unwrap());
        assert!(!store.exists("p1/a1/v1").await.unwrap());

        // Deleting again is not an error.
        store.delete("p1/a1/v1").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_walks_subtree() {
        let (_dir, store) = store().await;
        store.put("p1/a1/v1/a.txt", reader(b"a"), 1).await.unwrap();
        store
            .put("p1/a1/v2/sub/b.txt", reader(b"b"), 1)
            .await
            .unwrap();

        let mut entries = store.list("p1/a1").await.unwrap();
        entries.sort();
        assert!(entries.contains(&"p1/a1/v1/a.txt".to_string()));
        assert!(entries.contains(&"p1/a1/v2/sub/b.txt".to_string()));
        assert!(entries.contains(&"p1/a1/v1".to_string()));
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let (_dir, store) = store().await;
        assert!(store.get("../outside").await.is_err());
        assert!(store.put("a/../../x", reader(b"x"), 1).await.is_err());
    }

    #[tokio::test]
    async fn test_stat() {
        let (_dir, store) = store().await;
        store.put("p/f.bin", reader(b"12345"), 5).await.unwrap();

        let stat = store.stat("p/f.bin").await.unwrap();
        assert_eq!(stat.size, 5);
        assert!(!stat.is_dir);

        let dir_stat = store.stat("p").await.unwrap();
        assert!(dir_stat.is_dir);
    }

    #[tokio::test]
    async fn test_seek_start() {
        let (_dir, store) = store().await;
        store.put("p/f.bin", reader(b"0123456789"), 10).await.unwrap();

        let mut blob = store.get("p/f.bin").await.unwrap();
        assert!(blob.seek_start(6).await.unwrap());
        assert_eq!(blob.read_to_end().await.unwrap(), b"6789");
    }
}
