//! Streaming SHA-256 content digests.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

const READ_BUF_SIZE: usize = 64 * 1024;

/// Result of probing a local file against an expected digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileCheck {
    pub exists: bool,
    pub matches: bool,
    pub size: i64,
}

/// Computes the SHA-256 digest of everything the reader yields.
/// Returns the lowercase hex digest and the number of bytes consumed.
pub async fn digest_reader<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<(String, i64)> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    let mut size: i64 = 0;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as i64;
    }

    Ok((hex::encode(hasher.finalize()), size))
}

/// Computes the SHA-256 digest of a file on disk.
pub async fn digest_file(path: &Path) -> std::io::Result<(String, i64)> {
    let file = File::open(path).await?;
    digest_reader(BufReader::new(file)).await
}

/// Computes the SHA-256 digest of an in-memory buffer.
pub fn digest_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Checks whether a local file exists and matches the expected digest.
/// A missing file is not an error; it reports `exists: false`.
pub async fn file_matches(path: &Path, expected_hex: &str) -> std::io::Result<FileCheck> {
    match tokio::fs::metadata(path).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(FileCheck {
                exists: false,
                matches: false,
                size: 0,
            });
        }
        Err(e) => return Err(e),
    }

    let (actual, size) = digest_file(path).await?;
    Ok(FileCheck {
        exists: true,
        matches: actual == expected_hex,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // sha256("hello")
    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[tokio::test]
    async fn test_digest_bytes_known_vector() {
        assert_eq!(digest_bytes(b"hello"), HELLO_SHA256);
    }

    #[tokio::test]
    async fn test_digest_file_matches_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello.txt");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let (digest, size) = digest_file(&path).await.unwrap();
        assert_eq!(digest, HELLO_SHA256);
        assert_eq!(size, 5);
    }

    #[tokio::test]
    async fn test_digest_write_then_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blob.bin");
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        tokio::fs::write(&path, &data).await.unwrap();

        let (digest, size) = digest_file(&path).await.unwrap();
        assert_eq!(digest, digest_bytes(&data));
        assert_eq!(size, data.len() as i64);
    }

    #[tokio::test]
    async fn test_file_matches_missing_file() {
        let dir = TempDir::new().unwrap();
        let check = file_matches(&dir.path().join("absent"), HELLO_SHA256)
            .await
            .unwrap();
        assert_eq!(
            check,
            FileCheck {
                exists: false,
                matches: false,
                size: 0
            }
        );
    }

    #[tokio::test]
    async fn test_file_matches_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello.txt");
        tokio::fs::write(&path, b"goodbye").await.unwrap();

        let check = file_matches(&path, HELLO_SHA256).await.unwrap();
        assert!(check.exists);
        assert!(!check.matches);
        assert_eq!(check.size, 7);
    }
}
