//! SQL migration definitions for the embedding cache database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as one batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: embedding_cache",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Chunk embeddings, one row per (content hash, embedding model)
CREATE TABLE IF NOT EXISTS embedding_cache (
    id             TEXT PRIMARY KEY,
    content_hash   TEXT NOT NULL,
    model_id       TEXT NOT NULL,
    dimensions     INTEGER NOT NULL,
    embedding_json TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    UNIQUE(content_hash, model_id)
);

CREATE INDEX IF NOT EXISTS idx_embedding_cache_model ON embedding_cache(model_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
