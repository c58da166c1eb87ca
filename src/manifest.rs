//! The per-version manifest (`meta.yaml`).
//!
//! The manifest is the authoritative file list for a version and doubles
//! as its commit marker in the blob store: a version without a readable
//! manifest does not exist for readers.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::digest;
use crate::error::{Error, Result};
use crate::pathspec;

/// File name of the manifest inside a version directory.
pub const MANIFEST_FILE: &str = "meta.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub project: String,
    pub app: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
    #[serde(default)]
    pub build_time: String,
    #[serde(default)]
    pub builder: String,
    #[serde(default)]
    pub files: Vec<ManifestFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub path: String,
    pub sha256: String,
    pub size: i64,
}

impl Manifest {
    /// Serializes to YAML, stamping `build_time` with the current wall clock.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut stamped = self.clone();
        stamped.build_time = Utc::now().to_rfc3339();
        Ok(serde_yaml::to_string(&stamped)?.into_bytes())
    }

    /// Parses a manifest from YAML bytes. Required keys must be present;
    /// unknown keys are ignored.
    pub fn parse(data: &[u8]) -> Result<Manifest> {
        let manifest: Manifest = serde_yaml::from_slice(data)?;
        for file in &manifest.files {
            pathspec::validate_path(&file.path)?;
        }
        Ok(manifest)
    }

    pub fn total_size(&self) -> i64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Walks `base` and builds a manifest of every regular file whose
/// tree-relative path is not ignored. Paths are forward-slash normalized.
pub async fn generate(
    project: &str,
    app: &str,
    version: &str,
    base: &Path,
    ignore: &[String],
    builder: &str,
    git_commit: Option<String>,
) -> Result<Manifest> {
    let mut files = Vec::new();

    for entry in WalkDir::new(base).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            Error::Validation(format!("failed to walk {}: {e}", base.display()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(base)
            .map_err(|e| Error::Validation(format!("failed to relativize path: {e}")))?;
        let rel = rel.to_string_lossy().replace('\\', "/");

        if pathspec::should_ignore(&rel, ignore) {
            continue;
        }
        pathspec::validate_path(&rel)?;

        let (sha256, size) = digest::digest_file(entry.path())
            .await
            .map_err(|e| Error::transfer(rel.clone(), e.into()))?;

        files.push(ManifestFile {
            path: rel,
            sha256,
            size,
        });
    }

    Ok(Manifest {
        project: project.to_string(),
        app: app.to_string(),
        version: version.to_string(),
        git_commit,
        build_time: Utc::now().to_rfc3339(),
        builder: builder.to_string(),
        files,
    })
}
