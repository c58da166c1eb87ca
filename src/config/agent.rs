use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::pathspec;

pub const DEFAULT_CONCURRENCY: usize = 50;

const GLOBAL_CONFIG_PATH: &str = "/etc/stevedore/config.yml";
const LOCAL_CONFIG_FILE: &str = ".stevedore.yml";

/// On-disk agent configuration (YAML), all fields optional per file.
/// Values merge global < local < CLI overrides.
#[derive(Debug, Clone, Default, Deserialize)]
struct AgentConfigFile {
    #[serde(default)]
    server_url: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    app: Option<String>,
    #[serde(default)]
    ignore: Option<Vec<String>>,
    #[serde(default)]
    retain_versions: Option<i64>,
    #[serde(default)]
    concurrency: Option<usize>,
}

/// CLI overrides, highest priority in the merge.
#[derive(Debug, Clone, Default)]
pub struct AgentOverrides {
    pub server_url: Option<String>,
    pub token: Option<String>,
    pub project: Option<String>,
    pub app: Option<String>,
    pub ignore: Vec<String>,
    pub concurrency: Option<usize>,
}

/// The effective agent configuration after merging all sources.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub server_url: String,
    pub token: String,
    pub project: Option<String>,
    pub app: Option<String>,
    pub ignore: Vec<String>,
    pub retain_versions: Option<i64>,
    pub concurrency: usize,
}

impl AgentConfig {
    /// Loads and merges configuration: global file, then the local file
    /// (explicit path or `.stevedore.yml` in the working directory), then
    /// CLI overrides. Both files are optional as long as the merge ends
    /// with a server URL and token.
    pub fn load(config_path: Option<&Path>, overrides: &AgentOverrides) -> Result<AgentConfig> {
        let global = load_file(Path::new(GLOBAL_CONFIG_PATH)).ok();
        let local_path: PathBuf = match config_path {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(LOCAL_CONFIG_FILE),
        };
        let local = load_file(&local_path).ok();

        merge(global, local, overrides)
    }

    pub fn masked_token(&self) -> String {
        crate::auth::mask_token(&self.token)
    }
}

fn load_file(path: &Path) -> Result<AgentConfigFile> {
    let data = fs::read_to_string(path)?;
    let config: AgentConfigFile =
        serde_yaml::from_str(&data).map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
    Ok(config)
}

/// Strips whitespace and an accidental "Bearer " prefix from a configured
/// token value.
fn clean_token(token: &str) -> String {
    let token = token.trim();
    let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
    token.chars().filter(|c| !c.is_whitespace()).collect()
}

fn merge(
    global: Option<AgentConfigFile>,
    local: Option<AgentConfigFile>,
    overrides: &AgentOverrides,
) -> Result<AgentConfig> {
    let global = global.unwrap_or_default();
    let local = local.unwrap_or_default();

    let pick = |g: &Option<String>, l: &Option<String>, o: &Option<String>| {
        o.clone()
            .filter(|s| !s.is_empty())
            .or_else(|| l.clone().filter(|s| !s.is_empty()))
            .or_else(|| g.clone().filter(|s| !s.is_empty()))
    };

    let server_url = pick(&global.server_url, &local.server_url, &overrides.server_url)
        .map(|url| url.trim_end_matches('/').to_string())
        .ok_or_else(|| Error::Config("server_url is required".to_string()))?;

    let token = pick(&global.token, &local.token, &overrides.token)
        .map(|t| clean_token(&t))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::Config("token is required".to_string()))?;

    let ignore = merge_ignore_patterns(
        global.ignore.as_deref().unwrap_or_default(),
        local.ignore.as_deref().unwrap_or_default(),
        &overrides.ignore,
    );
    pathspec::validate_patterns(&ignore)?;

    let concurrency = overrides
        .concurrency
        .or(local.concurrency)
        .or(global.concurrency)
        .filter(|c| *c > 0)
        .unwrap_or(DEFAULT_CONCURRENCY);

    Ok(AgentConfig {
        server_url,
        token,
        project: pick(&global.project, &local.project, &overrides.project),
        app: pick(&global.app, &local.app, &overrides.app),
        ignore,
        retain_versions: local.retain_versions.or(global.retain_versions),
        concurrency,
    })
}

/// Merges ignore patterns in priority order global < local < CLI,
/// deduplicating while keeping the last occurrence of each pattern.
fn merge_ignore_patterns(global: &[String], local: &[String], cli: &[String]) -> Vec<String> {
    let all: Vec<&String> = global.iter().chain(local).chain(cli).collect();

    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for pattern in all.iter().rev() {
        if seen.insert(pattern.as_str()) {
            result.push((*pattern).clone());
        }
    }
    result.reverse();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_merge_priority() {
        let global = AgentConfigFile {
            server_url: Some("http://global".to_string()),
            token: Some("stv_global".to_string()),
            project: Some("gproj".to_string()),
            ..Default::default()
        };
        let local = AgentConfigFile {
            server_url: Some("http://local/".to_string()),
            ..Default::default()
        };
        let overrides = AgentOverrides {
            project: Some("cliproj".to_string()),
            ..Default::default()
        };

        let merged = merge(Some(global), Some(local), &overrides).unwrap();
        assert_eq!(merged.server_url, "http://local");
        assert_eq!(merged.token, "stv_global");
        assert_eq!(merged.project.as_deref(), Some("cliproj"));
        assert_eq!(merged.concurrency, DEFAULT_CONCURRENCY);
    }

    #[test]
    fn test_merge_requires_server_url_and_token() {
        assert!(merge(None, None, &AgentOverrides::default()).is_err());

        let overrides = AgentOverrides {
            server_url: Some("http://x".to_string()),
            token: Some("stv_tok".to_string()),
            ..Default::default()
        };
        let merged = merge(None, None, &overrides).unwrap();
        assert_eq!(merged.server_url, "http://x");
    }

    #[test]
    fn test_clean_token() {
        assert_eq!(clean_token(" Bearer stv_abc\n"), "stv_abc");
        assert_eq!(clean_token("stv _ abc"), "stv_abc");
    }

    #[test]
    fn test_ignore_merge_dedup_keeps_last() {
        let merged = merge_ignore_patterns(
            &strings(&["*.log", "tmp/"]),
            &strings(&["node_modules/**", "*.log"]),
            &strings(&["dist/"]),
        );
        assert_eq!(
            merged,
            strings(&["tmp/", "node_modules/**", "*.log", "dist/"])
        );
    }

    #[test]
    fn test_invalid_ignore_pattern_rejected() {
        let overrides = AgentOverrides {
            server_url: Some("http://x".to_string()),
            token: Some("stv_tok".to_string()),
            ignore: strings(&["[unclosed"]),
            ..Default::default()
        };
        assert!(merge(None, None, &overrides).is_err());
    }

    #[test]
    fn test_concurrency_zero_falls_back_to_default() {
        let overrides = AgentOverrides {
            server_url: Some("http://x".to_string()),
            token: Some("stv_tok".to_string()),
            concurrency: Some(0),
            ..Default::default()
        };
        let merged = merge(None, None, &overrides).unwrap();
        assert_eq!(merged.concurrency, DEFAULT_CONCURRENCY);
    }
}
