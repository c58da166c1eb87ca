//! Path validation and ignore-pattern matching.
//!
//! Both operations are pure string functions over tree-relative,
//! forward-slash paths. No filesystem access happens here.

use glob::{MatchOptions, Pattern};

use crate::error::{Error, Result};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Validates a tree-relative path for storage use.
///
/// Rejects empty paths, absolute paths, paths whose lexically cleaned
/// form escapes the tree root, and paths containing NUL bytes.
pub fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::InvalidPath("path is empty".to_string()));
    }
    if path.contains('\0') {
        return Err(Error::InvalidPath("path contains NUL byte".to_string()));
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(Error::InvalidPath(format!("path is absolute: {path}")));
    }
    let cleaned = lexical_clean(&path.replace('\\', "/"));
    if cleaned == ".." || cleaned.starts_with("../") {
        return Err(Error::InvalidPath(format!(
            "path escapes the tree root: {path}"
        )));
    }
    Ok(())
}

/// Validates a single path segment used as a project, app, or version
/// name: non-empty, no separators, no NUL, not a dot component.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidPath("name is empty".to_string()));
    }
    if name == "." || name == ".." {
        return Err(Error::InvalidPath(format!("invalid name: {name}")));
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(Error::InvalidPath(format!(
            "name contains invalid characters: {name}"
        )));
    }
    Ok(())
}

/// Lexically resolves `.` and `..` segments without touching the filesystem.
/// A result starting with `..` means the path escapes its root.
fn lexical_clean(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(out.last(), None | Some(&"..")) {
                    out.push("..");
                } else {
                    out.pop();
                }
            }
            s => out.push(s),
        }
    }
    out.join("/")
}

/// Checks patterns for glob syntax errors up front, so config loading can
/// fail fast instead of silently never matching.
pub fn validate_patterns(patterns: &[String]) -> Result<()> {
    for pattern in patterns {
        for segment in pattern.trim_end_matches('/').split('/') {
            if segment == "**" {
                continue;
            }
            Pattern::new(segment)
                .map_err(|e| Error::Validation(format!("invalid pattern {pattern}: {e}")))?;
        }
    }
    Ok(())
}

/// Returns true if `relative_path` matches any of the ignore patterns.
///
/// Supported forms:
/// - `dir/` matches the directory and everything beneath it
/// - a bare name (no `/`) matches files or directories of that name at
///   any depth
/// - `**` matches any number of path segments, including none
/// - `*`, `?`, `[...]` are single-segment wildcards
/// - a pattern matching any ancestor directory ignores the whole subtree
pub fn should_ignore(relative_path: &str, patterns: &[String]) -> bool {
    let path = relative_path.replace('\\', "/");
    let path = path.trim_start_matches("./");

    for pattern in patterns {
        let pattern = pattern.replace('\\', "/");

        if let Some(dir) = pattern.strip_suffix('/') {
            if path == dir || path.starts_with(&format!("{dir}/")) {
                return true;
            }
            continue;
        }

        // Bare names apply at any depth: matching a segment means the file
        // itself or one of its ancestor directories carries that name.
        if !pattern.contains('/') {
            if path.split('/').any(|seg| segment_matches(&pattern, seg)) {
                return true;
            }
            continue;
        }

        if glob_match(&pattern, path) {
            return true;
        }

        // A pattern naming a directory ignores everything beneath it.
        let mut ancestor = path;
        while let Some(idx) = ancestor.rfind('/') {
            ancestor = &ancestor[..idx];
            if glob_match(&pattern, ancestor) {
                return true;
            }
        }
    }
    false
}

fn glob_match(pattern: &str, path: &str) -> bool {
    if pattern == path {
        return true;
    }
    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let path_segments: Vec<&str> = path.split('/').collect();
    match_segments(&pattern_segments, &path_segments)
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.first() {
        None => path.is_empty(),
        Some(&"**") => {
            // `**` consumes zero or more whole segments.
            if match_segments(&pattern[1..], path) {
                return true;
            }
            if path.is_empty() {
                return false;
            }
            match_segments(pattern, &path[1..])
        }
        Some(segment) => {
            let Some(first) = path.first() else {
                return false;
            };
            segment_matches(segment, first) && match_segments(&pattern[1..], &path[1..])
        }
    }
}

fn segment_matches(pattern: &str, segment: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(p) => p.matches_with(segment, MATCH_OPTIONS),
        // Unparseable segment falls back to a literal comparison.
        Err(_) => pattern == segment,
    }
}
