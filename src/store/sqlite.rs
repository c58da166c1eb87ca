use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<Version> {
    Ok(Version {
        id: row.get(0)?,
        app_id: row.get(1)?,
        hash: row.get(2)?,
        is_published: row.get::<_, i64>(3)? != 0,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<Token> {
    let permissions: String = row.get(6)?;
    Ok(Token {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        name: row.get(3)?,
        project_id: row.get(4)?,
        app_id: row.get(5)?,
        permissions: Permissions::parse_list(&permissions).unwrap_or_else(|| {
            tracing::error!("Invalid permission list in database: '{}'", permissions);
            Permissions::default()
        }),
        created_at: parse_datetime(&row.get::<_, String>(7)?),
        expires_at: row
            .get::<_, Option<String>>(8)?
            .map(|s| parse_datetime(&s)),
        last_used_at: row
            .get::<_, Option<String>>(9)?
            .map(|s| parse_datetime(&s)),
    })
}

fn webhook_from_row(row: &Row<'_>) -> rusqlite::Result<Webhook> {
    let event_types: String = row.get(2)?;
    let headers: Option<String> = row.get(4)?;
    Ok(Webhook {
        id: row.get(0)?,
        name: row.get(1)?,
        event_types: serde_json::from_str(&event_types).unwrap_or_default(),
        url: row.get(3)?,
        headers: headers.and_then(|h| serde_json::from_str::<HashMap<String, String>>(&h).ok()),
        enabled: row.get::<_, i64>(5)? != 0,
        project_id: row.get(6)?,
        app_id: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    let metadata: Option<String> = row.get(6)?;
    Ok(AuditEntry {
        id: row.get(0)?,
        operation: row.get(1)?,
        project_id: row.get(2)?,
        app_id: row.get(3)?,
        version: row.get(4)?,
        agent_id: row.get(5)?,
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        created_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

const VERSION_COLS: &str = "id, app_id, hash, is_published, created_at";
const TOKEN_COLS: &str =
    "id, token_hash, token_lookup, name, project_id, app_id, permissions, created_at, expires_at, last_used_at";
const WEBHOOK_COLS: &str =
    "id, name, event_types, url, headers, enabled, project_id, app_id, created_at";
const AUDIT_COLS: &str =
    "id, operation, project_id, app_id, version_hash, agent_id, metadata, created_at";

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // Project operations

    fn create_or_get_project(&self, name: &str) -> Result<Project> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO projects (name, created_at) VALUES (?1, ?2)
             ON CONFLICT(name) DO NOTHING",
            params![name, format_datetime(&Utc::now())],
        )?;
        conn.query_row(
            "SELECT id, name, created_at FROM projects WHERE name = ?1",
            params![name],
            |row| {
                Ok(Project {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: parse_datetime(&row.get::<_, String>(2)?),
                })
            },
        )
        .map_err(Error::from)
    }

    fn get_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        self.conn()
            .query_row(
                "SELECT id, name, created_at FROM projects WHERE name = ?1",
                params![name],
                |row| {
                    Ok(Project {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: parse_datetime(&row.get::<_, String>(2)?),
                    })
                },
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_projects(&self, limit: i64, offset: i64) -> Result<Vec<Project>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, created_at FROM projects
             ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![limit, offset], |row| {
            Ok(Project {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: parse_datetime(&row.get::<_, String>(2)?),
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_project(&self, name: &str) -> Result<bool> {
        let changed = self
            .conn()
            .execute("DELETE FROM projects WHERE name = ?1", params![name])?;
        Ok(changed > 0)
    }

    // App operations

    fn create_or_get_app(&self, project_id: i64, name: &str) -> Result<App> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO apps (project_id, name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(project_id, name) DO NOTHING",
            params![project_id, name, format_datetime(&Utc::now())],
        )?;
        conn.query_row(
            "SELECT id, project_id, name, created_at FROM apps
             WHERE project_id = ?1 AND name = ?2",
            params![project_id, name],
            |row| {
                Ok(App {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    name: row.get(2)?,
                    created_at: parse_datetime(&row.get::<_, String>(3)?),
                })
            },
        )
        .map_err(Error::from)
    }

    fn get_app_by_name(&self, project_id: i64, name: &str) -> Result<Option<App>> {
        self.conn()
            .query_row(
                "SELECT id, project_id, name, created_at FROM apps
                 WHERE project_id = ?1 AND name = ?2",
                params![project_id, name],
                |row| {
                    Ok(App {
                        id: row.get(0)?,
                        project_id: row.get(1)?,
                        name: row.get(2)?,
                        created_at: parse_datetime(&row.get::<_, String>(3)?),
                    })
                },
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_apps(&self, project_id: i64, limit: i64, offset: i64) -> Result<Vec<App>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, name, created_at FROM apps
             WHERE project_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![project_id, limit, offset], |row| {
            Ok(App {
                id: row.get(0)?,
                project_id: row.get(1)?,
                name: row.get(2)?,
                created_at: parse_datetime(&row.get::<_, String>(3)?),
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_app(&self, project_id: i64, name: &str) -> Result<bool> {
        let changed = self.conn().execute(
            "DELETE FROM apps WHERE project_id = ?1 AND name = ?2",
            params![project_id, name],
        )?;
        Ok(changed > 0)
    }

    // Version operations

    fn create_version(&self, app_id: i64, hash: &str) -> Result<Version> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO versions (app_id, hash, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(app_id, hash) DO NOTHING",
            params![app_id, hash, format_datetime(&Utc::now())],
        )?;
        conn.query_row(
            &format!("SELECT {VERSION_COLS} FROM versions WHERE app_id = ?1 AND hash = ?2"),
            params![app_id, hash],
            version_from_row,
        )
        .map_err(Error::from)
    }

    fn get_version(&self, app_id: i64, hash: &str) -> Result<Option<Version>> {
        self.conn()
            .query_row(
                &format!("SELECT {VERSION_COLS} FROM versions WHERE app_id = ?1 AND hash = ?2"),
                params![app_id, hash],
                version_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_versions_by_app(&self, app_id: i64, limit: i64, offset: i64) -> Result<Vec<Version>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {VERSION_COLS} FROM versions WHERE app_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt.query_map(params![app_id, limit, offset], version_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_version(&self, app_id: i64, hash: &str) -> Result<bool> {
        let changed = self.conn().execute(
            "DELETE FROM versions WHERE app_id = ?1 AND hash = ?2",
            params![app_id, hash],
        )?;
        Ok(changed > 0)
    }

    fn count_versions_by_app(&self, app_id: i64) -> Result<i64> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM versions WHERE app_id = ?1",
                params![app_id],
                |row| row.get(0),
            )
            .map_err(Error::from)
    }

    fn oldest_versions(&self, app_id: i64, n: i64) -> Result<Vec<Version>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {VERSION_COLS} FROM versions WHERE app_id = ?1
             ORDER BY created_at ASC, id ASC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![app_id, n], version_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn set_published(&self, app_id: i64, hash: &str, published: bool) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE versions SET is_published = ?1 WHERE app_id = ?2 AND hash = ?3",
            params![published as i64, app_id, hash],
        )?;
        Ok(changed > 0)
    }

    fn unpublish_all(&self, app_id: i64) -> Result<()> {
        self.conn().execute(
            "UPDATE versions SET is_published = 0 WHERE app_id = ?1",
            params![app_id],
        )?;
        Ok(())
    }

    fn get_latest_published(&self, app_id: i64) -> Result<Option<Version>> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {VERSION_COLS} FROM versions
                     WHERE app_id = ?1 AND is_published = 1
                     ORDER BY created_at DESC, id DESC LIMIT 1"
                ),
                params![app_id],
                version_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    // Token operations

    fn create_token(&self, token: &Token) -> Result<()> {
        self.conn().execute(
            "INSERT INTO tokens (id, token_hash, token_lookup, name, project_id, app_id,
                                 permissions, created_at, expires_at, last_used_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                token.id,
                token.token_hash,
                token.token_lookup,
                token.name,
                token.project_id,
                token.app_id,
                token.permissions.to_string(),
                format_datetime(&token.created_at),
                token.expires_at.as_ref().map(format_datetime),
                token.last_used_at.as_ref().map(format_datetime),
            ],
        )?;
        Ok(())
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
        self.conn()
            .query_row(
                &format!("SELECT {TOKEN_COLS} FROM tokens WHERE token_lookup = ?1"),
                params![lookup],
                token_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_tokens(&self) -> Result<Vec<Token>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TOKEN_COLS} FROM tokens ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map([], token_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_token(&self, id: &str) -> Result<bool> {
        let changed = self
            .conn()
            .execute("DELETE FROM tokens WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn update_token_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    fn has_admin_token(&self) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM tokens
             WHERE (',' || permissions || ',') LIKE '%,admin,%'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // Webhook operations

    fn create_webhook(
        &self,
        name: &str,
        event_types: &[String],
        url: &str,
        headers: Option<&HashMap<String, String>>,
        enabled: bool,
        project_id: Option<i64>,
        app_id: Option<i64>,
    ) -> Result<Webhook> {
        let event_types_json = serde_json::to_string(event_types)
            .map_err(|e| Error::Validation(format!("invalid event types: {e}")))?;
        let headers_json = headers
            .map(|h| serde_json::to_string(h))
            .transpose()
            .map_err(|e| Error::Validation(format!("invalid headers: {e}")))?;

        let conn = self.conn();
        conn.execute(
            "INSERT INTO webhooks (name, event_types, url, headers, enabled,
                                   project_id, app_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                name,
                event_types_json,
                url,
                headers_json,
                enabled as i64,
                project_id,
                app_id,
                format_datetime(&Utc::now()),
            ],
        )?;
        let id = conn.last_insert_rowid();
        conn.query_row(
            &format!("SELECT {WEBHOOK_COLS} FROM webhooks WHERE id = ?1"),
            params![id],
            webhook_from_row,
        )
        .map_err(Error::from)
    }

    fn list_webhooks(&self) -> Result<Vec<Webhook>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {WEBHOOK_COLS} FROM webhooks ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map([], webhook_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn get_webhook(&self, id: i64) -> Result<Option<Webhook>> {
        self.conn()
            .query_row(
                &format!("SELECT {WEBHOOK_COLS} FROM webhooks WHERE id = ?1"),
                params![id],
                webhook_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn update_webhook(
        &self,
        id: i64,
        name: &str,
        event_types: &[String],
        url: &str,
        headers: Option<&HashMap<String, String>>,
        enabled: bool,
        project_id: Option<i64>,
        app_id: Option<i64>,
    ) -> Result<bool> {
        let event_types_json = serde_json::to_string(event_types)
            .map_err(|e| Error::Validation(format!("invalid event types: {e}")))?;
        let headers_json = headers
            .map(|h| serde_json::to_string(h))
            .transpose()
            .map_err(|e| Error::Validation(format!("invalid headers: {e}")))?;

        let changed = self.conn().execute(
            "UPDATE webhooks SET name = ?1, event_types = ?2, url = ?3, headers = ?4,
                                 enabled = ?5, project_id = ?6, app_id = ?7
             WHERE id = ?8",
            params![
                name,
                event_types_json,
                url,
                headers_json,
                enabled as i64,
                project_id,
                app_id,
                id,
            ],
        )?;
        Ok(changed > 0)
    }

    fn set_webhook_enabled(&self, id: i64, enabled: bool) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE webhooks SET enabled = ?1 WHERE id = ?2",
            params![enabled as i64, id],
        )?;
        Ok(changed > 0)
    }

    fn delete_webhook(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn()
            .execute("DELETE FROM webhooks WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn find_webhooks_for_event(
        &self,
        event: &str,
        project_id: Option<i64>,
        app_id: Option<i64>,
    ) -> Result<Vec<Webhook>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {WEBHOOK_COLS} FROM webhooks
             WHERE enabled = 1
               AND (project_id IS NULL OR project_id = ?1)
               AND (app_id IS NULL OR app_id = ?2)
             ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map(params![project_id, app_id], webhook_from_row)?;
        let webhooks = rows.collect::<std::result::Result<Vec<_>, _>>()?;

        // Event-type subscription is a JSON array; filter in process.
        Ok(webhooks
            .into_iter()
            .filter(|w| w.event_types.iter().any(|t| t == event))
            .collect())
    }

    // Audit operations

    fn create_audit_entry(
        &self,
        operation: &str,
        project_id: Option<i64>,
        app_id: Option<i64>,
        version: Option<&str>,
        agent_id: Option<&str>,
        metadata: Option<&Value>,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO audit_log (operation, project_id, app_id, version_hash,
                                    agent_id, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                operation,
                project_id,
                app_id,
                version,
                agent_id,
                metadata.map(|m| m.to_string()),
                format_datetime(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    fn list_audit_entries(
        &self,
        filter: &AuditFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditEntry>> {
        let (clause, mut binds) = audit_filter_clause(filter);
        binds.push(Box::new(limit));
        binds.push(Box::new(offset));

        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {AUDIT_COLS} FROM audit_log {clause}
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        ))?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(binds.iter().map(|b| b.as_ref())),
            audit_from_row,
        )?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn count_audit_entries(&self, filter: &AuditFilter) -> Result<i64> {
        let (clause, binds) = audit_filter_clause(filter);
        self.conn()
            .query_row(
                &format!("SELECT COUNT(*) FROM audit_log {clause}"),
                rusqlite::params_from_iter(binds.iter().map(|b| b.as_ref())),
                |row| row.get(0),
            )
            .map_err(Error::from)
    }

    fn delete_audit_entries_older_than(&self, days: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(days);
        let deleted = self.conn().execute(
            "DELETE FROM audit_log WHERE created_at < ?1",
            params![format_datetime(&cutoff)],
        )?;
        Ok(deleted)
    }

    // Config operations

    fn get_config(&self, key: &str) -> Result<Option<String>> {
        self.conn()
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(Error::from)
    }

    fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO config (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                            updated_at = excluded.updated_at",
            params![key, value, format_datetime(&Utc::now())],
        )?;
        Ok(())
    }

    fn get_all_config(&self) -> Result<Vec<(String, String)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key, value FROM config ORDER BY key")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

fn audit_filter_clause(filter: &AuditFilter) -> (String, Vec<Box<dyn rusqlite::types::ToSql>>) {
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(op) = &filter.operation {
        clauses.push("operation = ?");
        binds.push(Box::new(op.clone()));
    }
    if let Some(project_id) = filter.project_id {
        clauses.push("project_id = ?");
        binds.push(Box::new(project_id));
    }
    if let Some(app_id) = filter.app_id {
        clauses.push("app_id = ?");
        binds.push(Box::new(app_id));
    }

    if clauses.is_empty() {
        (String::new(), binds)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), binds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.initialize().unwrap();
        store
    }

    fn test_token(id: &str, lookup: &str, perms: Permissions) -> Token {
        Token {
            id: id.to_string(),
            token_hash: "$argon2id$test".to_string(),
            token_lookup: lookup.to_string(),
            name: None,
            project_id: None,
            app_id: None,
            permissions: perms,
            created_at: Utc::now(),
            expires_at: None,
            last_used_at: None,
        }
    }

    #[test]
    fn test_create_or_get_project_is_idempotent() {
        let store = store();
        let a = store.create_or_get_project("p1").unwrap();
        let b = store.create_or_get_project("p1").unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.list_projects(10, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_project_cascades() {
        let store = store();
        let project = store.create_or_get_project("p1").unwrap();
        let app = store.create_or_get_app(project.id, "a1").unwrap();
        store.create_version(app.id, "v1").unwrap();

        assert!(store.delete_project("p1").unwrap());
        assert!(store.get_app_by_name(project.id, "a1").unwrap().is_none());
        assert_eq!(store.count_versions_by_app(app.id).unwrap(), 0);
    }

    #[test]
    fn test_version_ordering_for_retention() {
        let store = store();
        let project = store.create_or_get_project("p1").unwrap();
        let app = store.create_or_get_app(project.id, "a1").unwrap();
        for v in ["v1", "v2", "v3", "v4", "v5"] {
            store.create_version(app.id, v).unwrap();
        }

        // Oldest-first selects push order even when timestamps tie.
        let oldest = store.oldest_versions(app.id, 2).unwrap();
        let hashes: Vec<&str> = oldest.iter().map(|v| v.hash.as_str()).collect();
        assert_eq!(hashes, vec!["v1", "v2"]);

        let newest = store.list_versions_by_app(app.id, 10, 0).unwrap();
        let hashes: Vec<&str> = newest.iter().map(|v| v.hash.as_str()).collect();
        assert_eq!(hashes, vec!["v5", "v4", "v3", "v2", "v1"]);
    }

    #[test]
    fn test_create_version_idempotent() {
        let store = store();
        let project = store.create_or_get_project("p1").unwrap();
        let app = store.create_or_get_app(project.id, "a1").unwrap();
        let a = store.create_version(app.id, "v1").unwrap();
        let b = store.create_version(app.id, "v1").unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.count_versions_by_app(app.id).unwrap(), 1);
    }

    #[test]
    fn test_publish_single_assignment() {
        let store = store();
        let project = store.create_or_get_project("p1").unwrap();
        let app = store.create_or_get_app(project.id, "a1").unwrap();
        store.create_version(app.id, "v1").unwrap();
        store.create_version(app.id, "v2").unwrap();

        assert!(store.get_latest_published(app.id).unwrap().is_none());

        store.unpublish_all(app.id).unwrap();
        assert!(store.set_published(app.id, "v1", true).unwrap());
        assert_eq!(
            store.get_latest_published(app.id).unwrap().unwrap().hash,
            "v1"
        );

        store.unpublish_all(app.id).unwrap();
        assert!(store.set_published(app.id, "v2", true).unwrap());
        let published: Vec<Version> = store
            .list_versions_by_app(app.id, 10, 0)
            .unwrap()
            .into_iter()
            .filter(|v| v.is_published)
            .collect();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].hash, "v2");
    }

    #[test]
    fn test_set_published_missing_version() {
        let store = store();
        let project = store.create_or_get_project("p1").unwrap();
        let app = store.create_or_get_app(project.id, "a1").unwrap();
        assert!(!store.set_published(app.id, "ghost", true).unwrap());
    }

    #[test]
    fn test_token_lookup_and_revoke() {
        let store = store();
        store
            .create_token(&test_token("t1", "abcd1234", Permissions::PULL))
            .unwrap();

        let token = store.get_token_by_lookup("abcd1234").unwrap().unwrap();
        assert_eq!(token.id, "t1");
        assert!(token.permissions.has(Permissions::PULL));
        assert!(!token.permissions.has(Permissions::PUSH));

        assert!(store.delete_token("t1").unwrap());
        assert!(store.get_token_by_lookup("abcd1234").unwrap().is_none());
    }

    #[test]
    fn test_has_admin_token() {
        let store = store();
        assert!(!store.has_admin_token().unwrap());
        store
            .create_token(&test_token("t1", "aaaa1111", Permissions::PULL))
            .unwrap();
        assert!(!store.has_admin_token().unwrap());
        store
            .create_token(&test_token("t2", "bbbb2222", Permissions::ADMIN))
            .unwrap();
        assert!(store.has_admin_token().unwrap());
    }

    #[test]
    fn test_webhook_scope_matching() {
        let store = store();
        let project = store.create_or_get_project("p1").unwrap();
        let app = store.create_or_get_app(project.id, "a1").unwrap();

        let push = vec!["push".to_string()];
        store
            .create_webhook("global", &push, "http://x/global", None, true, None, None)
            .unwrap();
        store
            .create_webhook(
                "project",
                &push,
                "http://x/project",
                None,
                true,
                Some(project.id),
                None,
            )
            .unwrap();
        store
            .create_webhook(
                "app",
                &push,
                "http://x/app",
                None,
                true,
                Some(project.id),
                Some(app.id),
            )
            .unwrap();
        store
            .create_webhook("disabled", &push, "http://x/off", None, false, None, None)
            .unwrap();
        store
            .create_webhook(
                "other-event",
                &["publish".to_string()],
                "http://x/pub",
                None,
                true,
                None,
                None,
            )
            .unwrap();

        let hits = store
            .find_webhooks_for_event("push", Some(project.id), Some(app.id))
            .unwrap();
        let mut names: Vec<&str> = hits.iter().map(|w| w.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["app", "global", "project"]);

        // Scoped hooks do not fire for other projects.
        let other = store.create_or_get_project("p2").unwrap();
        let hits = store
            .find_webhooks_for_event("push", Some(other.id), None)
            .unwrap();
        let names: Vec<&str> = hits.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["global"]);
    }

    #[test]
    fn test_webhook_update_and_toggle() {
        let store = store();
        let webhook = store
            .create_webhook(
                "ci",
                &["push".to_string()],
                "http://x/old",
                None,
                true,
                None,
                None,
            )
            .unwrap();

        let mut headers = HashMap::new();
        headers.insert("X-Secret".to_string(), "s".to_string());
        assert!(
            store
                .update_webhook(
                    webhook.id,
                    "ci",
                    &["push".to_string(), "publish".to_string()],
                    "http://x/new",
                    Some(&headers),
                    true,
                    None,
                    None,
                )
                .unwrap()
        );

        let updated = store.get_webhook(webhook.id).unwrap().unwrap();
        assert_eq!(updated.url, "http://x/new");
        assert_eq!(updated.event_types, vec!["push", "publish"]);
        assert_eq!(updated.headers.unwrap()["X-Secret"], "s");

        assert!(store.set_webhook_enabled(webhook.id, false).unwrap());
        assert!(
            store
                .find_webhooks_for_event("push", None, None)
                .unwrap()
                .is_empty()
        );

        assert!(!store.update_webhook(999, "x", &[], "u", None, true, None, None).unwrap());
    }

    #[test]
    fn test_audit_filters_and_trim() {
        let store = store();
        let project = store.create_or_get_project("p1").unwrap();
        store
            .create_audit_entry(
                "push",
                Some(project.id),
                None,
                Some("v1"),
                Some("host-1.2.3.4"),
                Some(&serde_json::json!({"file_count": 2})),
            )
            .unwrap();
        store
            .create_audit_entry("pull", Some(project.id), None, Some("v1"), None, None)
            .unwrap();

        let filter = AuditFilter {
            operation: Some("push".to_string()),
            ..Default::default()
        };
        let entries = store.list_audit_entries(&filter, 10, 0).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, "push");
        assert_eq!(entries[0].metadata.as_ref().unwrap()["file_count"], 2);
        assert_eq!(store.count_audit_entries(&AuditFilter::default()).unwrap(), 2);

        // Nothing is old enough to trim.
        assert_eq!(store.delete_audit_entries_older_than(1).unwrap(), 0);
        // A zero-day cutoff removes everything.
        assert_eq!(store.delete_audit_entries_older_than(0).unwrap(), 2);
    }

    #[test]
    fn test_config_round_trip() {
        let store = store();
        assert!(store.get_config("version_retention_limit").unwrap().is_none());
        store.set_config("version_retention_limit", "10").unwrap();
        store.set_config("version_retention_limit", "3").unwrap();
        assert_eq!(
            store.get_config("version_retention_limit").unwrap().unwrap(),
            "3"
        );
        assert_eq!(store.get_all_config().unwrap().len(), 1);
    }
}
