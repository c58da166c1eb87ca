use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::warn;

use super::token::{TokenGenerator, mask_token, parse_token};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Permissions, Token};

const ENTRY_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
const LIST_CACHE_TTL: Duration = Duration::from_secs(60);

/// The validated identity behind an API token.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub token_id: String,
    pub name: Option<String>,
    pub project_id: Option<i64>,
    pub app_id: Option<i64>,
    pub permissions: Permissions,
}

struct CachedEntry {
    info: TokenInfo,
    expires_at: Instant,
}

struct TokenListCache {
    tokens: Vec<Token>,
    loaded_at: Instant,
}

/// Authenticates bearer tokens against the store.
///
/// Verified tokens are cached per raw-token string with a short TTL, and
/// the candidate token list itself is cached so the hot path neither hits
/// the database nor re-runs the slow hash. Both caches are invalidated on
/// token create/revoke.
pub struct TokenAuthenticator {
    store: Arc<dyn Store>,
    generator: TokenGenerator,
    entries: RwLock<HashMap<String, CachedEntry>>,
    list: RwLock<Option<TokenListCache>>,
}

impl TokenAuthenticator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            generator: TokenGenerator::new(),
            entries: RwLock::new(HashMap::new()),
            list: RwLock::new(None),
        }
    }

    /// Validates a raw token, consulting the caches first.
    pub fn authenticate(&self, raw_token: &str) -> Result<TokenInfo> {
        let (lookup, _secret) = parse_token(raw_token).map_err(|_| Error::Unauthorized)?;

        if let Some(info) = self.cached_entry(raw_token) {
            return Ok(info);
        }

        let candidates = self.candidates(&lookup)?;
        for token in candidates {
            if !self
                .generator
                .verify(raw_token, &token.token_hash)
                .unwrap_or(false)
            {
                continue;
            }

            if let Some(expires_at) = token.expires_at {
                if expires_at < Utc::now() {
                    return Err(Error::TokenExpired);
                }
            }

            let info = TokenInfo {
                token_id: token.id.clone(),
                name: token.name.clone(),
                project_id: token.project_id,
                app_id: token.app_id,
                permissions: token.permissions,
            };

            if let Err(e) = self.store.update_token_last_used(&token.id) {
                warn!("Failed to update token last_used_at: {e}");
            }
            self.insert_entry(raw_token, info.clone());
            return Ok(info);
        }

        warn!("Rejected token {}", mask_token(raw_token));
        Err(Error::Unauthorized)
    }

    /// Drops both caches. Called on token create/revoke.
    pub fn invalidate(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        *self.list.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn cached_entry(&self, raw_token: &str) -> Option<TokenInfo> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get(raw_token)?;
        if entry.expires_at < Instant::now() {
            return None;
        }
        Some(entry.info.clone())
    }

    fn insert_entry(&self, raw_token: &str, info: TokenInfo) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        // Expired leftovers go on the same pass to bound the map.
        let now = Instant::now();
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(
            raw_token.to_string(),
            CachedEntry {
                info,
                expires_at: now + ENTRY_CACHE_TTL,
            },
        );
    }

    /// Tokens matching the lookup prefix, from the cached full list when
    /// fresh, reloading it from the store otherwise.
    fn candidates(&self, lookup: &str) -> Result<Vec<Token>> {
        {
            let list = self.list.read().unwrap_or_else(|e| e.into_inner());
            if let Some(cache) = list.as_ref() {
                if cache.loaded_at.elapsed() < LIST_CACHE_TTL {
                    let hits: Vec<Token> = cache
                        .tokens
                        .iter()
                        .filter(|t| t.token_lookup == lookup)
                        .cloned()
                        .collect();
                    if !hits.is_empty() {
                        return Ok(hits);
                    }
                    // A token created after the list was cached still has
                    // to authenticate; fall through to a direct fetch.
                    return Ok(self
                        .store
                        .get_token_by_lookup(lookup)?
                        .into_iter()
                        .collect());
                }
            }
        }

        let tokens = self.store.list_tokens()?;
        let hits: Vec<Token> = tokens
            .iter()
            .filter(|t| t.token_lookup == lookup)
            .cloned()
            .collect();

        let mut list = self.list.write().unwrap_or_else(|e| e.into_inner());
        *list = Some(TokenListCache {
            tokens,
            loaded_at: Instant::now(),
        });
        Ok(hits)
    }
}
