//! libSQL-backed cache of chunk embeddings.

use std::path::Path;

use bcorag_shared::{BcoRagError, Result};
use chrono::Utc;
use libsql::{Connection, Database, params};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::migrations;

/// SHA-256 of a chunk's text, hex encoded. Used as the cache key.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Embedding cache handle wrapping a libSQL database.
pub struct EmbeddingCache {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl EmbeddingCache {
    /// Open or create a cache database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BcoRagError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| BcoRagError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| BcoRagError::Storage(e.to_string()))?;

        let cache = Self { db, conn };
        cache.run_migrations().await?;
        Ok(cache)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        BcoRagError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Look up a cached embedding.
    pub async fn get_embedding(&self, content_hash: &str, model_id: &str) -> Result<Option<Vec<f32>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT embedding_json FROM embedding_cache
                 WHERE content_hash = ?1 AND model_id = ?2",
                params![content_hash, model_id],
            )
            .await
            .map_err(|e| BcoRagError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let json: String = row
                    .get(0)
                    .map_err(|e| BcoRagError::Storage(e.to_string()))?;
                let embedding: Vec<f32> = serde_json::from_str(&json).map_err(|e| {
                    BcoRagError::Storage(format!("corrupt cached embedding {content_hash}: {e}"))
                })?;
                Ok(Some(embedding))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(BcoRagError::Storage(e.to_string())),
        }
    }

    /// Store an embedding (upserts).
    pub async fn set_embedding(
        &self,
        content_hash: &str,
        model_id: &str,
        embedding: &[f32],
    ) -> Result<()> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let json = serde_json::to_string(embedding)
            .map_err(|e| BcoRagError::Storage(format!("failed to encode embedding: {e}")))?;
        let dimensions = embedding.len() as i64;

        self.conn
            .execute(
                "INSERT INTO embedding_cache (id, content_hash, model_id, dimensions, embedding_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(content_hash, model_id) DO UPDATE SET
                   dimensions = excluded.dimensions,
                   embedding_json = excluded.embedding_json,
                   created_at = excluded.created_at",
                params![id.as_str(), content_hash, model_id, dimensions, json.as_str(), now.as_str()],
            )
            .await
            .map_err(|e| BcoRagError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Number of cached embeddings for a model.
    pub async fn count(&self, model_id: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM embedding_cache WHERE model_id = ?1",
                params![model_id],
            )
            .await
            .map_err(|e| BcoRagError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map(|n| n.max(0) as u64)
                .map_err(|e| BcoRagError::Storage(e.to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(BcoRagError::Storage(e.to_string())),
        }
    }
}
