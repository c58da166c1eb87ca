use std::fmt;

use serde::{Deserialize, Serialize};

/// Permissions represents a bitmask of granted token permissions.
///
/// `admin` subsumes every other permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(u8);

impl Permissions {
    pub const PULL: Permissions = Permissions(1 << 0);
    pub const PUSH: Permissions = Permissions(1 << 1);
    pub const PROMOTE: Permissions = Permissions(1 << 2);
    pub const ADMIN: Permissions = Permissions(1 << 3);

    pub const fn new(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if the required permission is granted, either directly
    /// or via `admin`.
    #[must_use]
    pub const fn has(self, required: Permissions) -> bool {
        self.0 & Self::ADMIN.0 != 0 || self.0 & required.0 == required.0
    }

    #[must_use]
    pub const fn union(self, other: Permissions) -> Permissions {
        Permissions(self.0 | other.0)
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Converts a permission name to its bitmask value.
    pub fn parse(s: &str) -> Option<Permissions> {
        match s.trim() {
            "pull" => Some(Self::PULL),
            "push" => Some(Self::PUSH),
            "promote" => Some(Self::PROMOTE),
            "admin" => Some(Self::ADMIN),
            _ => None,
        }
    }

    /// Parses a comma-separated permission list, e.g. `"pull,push"`.
    pub fn parse_list(s: &str) -> Option<Permissions> {
        let mut result = Permissions::default();
        for part in s.split(',').filter(|p| !p.trim().is_empty()) {
            result = result.union(Self::parse(part)?);
        }
        Some(result)
    }

    #[must_use]
    pub fn to_strings(self) -> Vec<&'static str> {
        let mut perms = Vec::new();
        if self.0 & Self::PULL.0 != 0 {
            perms.push("pull");
        }
        if self.0 & Self::PUSH.0 != 0 {
            perms.push("push");
        }
        if self.0 & Self::PROMOTE.0 != 0 {
            perms.push("promote");
        }
        if self.0 & Self::ADMIN.0 != 0 {
            perms.push("admin");
        }
        perms
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_strings().join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_subsumes_all() {
        let admin = Permissions::ADMIN;
        assert!(admin.has(Permissions::PULL));
        assert!(admin.has(Permissions::PUSH));
        assert!(admin.has(Permissions::PROMOTE));
        assert!(admin.has(Permissions::ADMIN));
    }

    #[test]
    fn test_has_requires_grant() {
        let p = Permissions::PULL.union(Permissions::PUSH);
        assert!(p.has(Permissions::PULL));
        assert!(p.has(Permissions::PUSH));
        assert!(!p.has(Permissions::PROMOTE));
        assert!(!p.has(Permissions::ADMIN));
    }

    #[test]
    fn test_parse_list_round_trip() {
        let p = Permissions::parse_list("pull,push,promote").unwrap();
        assert_eq!(p.to_strings(), vec!["pull", "push", "promote"]);
        assert_eq!(Permissions::parse_list(&p.to_string()).unwrap(), p);
    }

    #[test]
    fn test_parse_list_rejects_unknown() {
        assert!(Permissions::parse_list("pull,fly").is_none());
    }
}
