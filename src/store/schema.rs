pub const SCHEMA: &str = r#"
-- Projects are named namespaces, created on first reference
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Apps are deployables within a project
CREATE TABLE IF NOT EXISTS apps (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),

    UNIQUE(project_id, name)
);

-- Versions are immutable snapshots; hash is chosen by the pusher.
-- At most one version per app carries is_published = 1.
CREATE TABLE IF NOT EXISTS versions (
    id INTEGER PRIMARY KEY,
    app_id INTEGER NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
    hash TEXT NOT NULL,
    is_published INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),

    UNIQUE(app_id, hash)
);

-- Tokens store only the slow hash; the plain value is shown once.
-- Scope narrows global -> project -> app via the nullable foreign keys.
CREATE TABLE IF NOT EXISTS tokens (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,          -- argon2id hash with embedded salt
    token_lookup TEXT NOT NULL,        -- short prefix for candidate lookup
    name TEXT,
    project_id INTEGER REFERENCES projects(id) ON DELETE CASCADE,
    app_id INTEGER REFERENCES apps(id) ON DELETE CASCADE,
    permissions TEXT NOT NULL,         -- comma-separated: pull,push,promote,admin
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    expires_at TEXT,                   -- NULL = never
    last_used_at TEXT
);

-- Outbound webhooks; scope matches events within project/app or unscoped
CREATE TABLE IF NOT EXISTS webhooks (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    event_types TEXT NOT NULL,         -- JSON array of event type names
    url TEXT NOT NULL,
    headers TEXT,                      -- JSON object of extra request headers
    enabled INTEGER NOT NULL DEFAULT 1,
    project_id INTEGER REFERENCES projects(id) ON DELETE CASCADE,
    app_id INTEGER REFERENCES apps(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Append-only audit log. Deliberately no foreign keys: entries outlive
-- the projects and apps they reference.
CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY,
    operation TEXT NOT NULL,
    project_id INTEGER,
    app_id INTEGER,
    version_hash TEXT,
    agent_id TEXT,
    metadata TEXT,                     -- JSON object
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Key/value server configuration
CREATE TABLE IF NOT EXISTS config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_apps_project ON apps(project_id);
CREATE INDEX IF NOT EXISTS idx_versions_app ON versions(app_id);
CREATE INDEX IF NOT EXISTS idx_versions_published ON versions(app_id, is_published);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_lookup ON tokens(token_lookup);
CREATE INDEX IF NOT EXISTS idx_webhooks_scope ON webhooks(project_id, app_id);
CREATE INDEX IF NOT EXISTS idx_audit_created ON audit_log(created_at);
CREATE INDEX IF NOT EXISTS idx_audit_operation ON audit_log(operation);
"#;
