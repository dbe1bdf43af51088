use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{merge_document, DocumentMirror, MirrorError};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS documents (
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        data TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (collection, id)
    );

    CREATE INDEX IF NOT EXISTS idx_documents_updated_at ON documents(updated_at);
"#;

/// SQLite-backed document mirror storing each document as a JSON string.
pub struct SqliteDocumentMirror {
    conn: Mutex<Connection>,
}

impl SqliteDocumentMirror {
    /// Opens (or creates) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, MirrorError> {
        let conn = Connection::open(path).map_err(|e| MirrorError::Database(e.to_string()))?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, MirrorError> {
        let conn = Connection::open_in_memory().map_err(|e| MirrorError::Database(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, MirrorError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| MirrorError::Database(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn read(
        conn: &Connection,
        collection: &str,
        id: &str,
    ) -> Result<Option<serde_json::Value>, MirrorError> {
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM documents WHERE collection = ? AND id = ?",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| MirrorError::Database(e.to_string()))?;

        data.map(|json| {
            serde_json::from_str(&json).map_err(|e| MirrorError::Serialization(e.to_string()))
        })
        .transpose()
    }

    /// Number of documents in `collection`.
    pub fn count(&self, collection: &str) -> Result<i64, MirrorError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?",
            params![collection],
            |row| row.get(0),
        )
        .map_err(|e| MirrorError::Database(e.to_string()))
    }
}

impl DocumentMirror for SqliteDocumentMirror {
    fn create_document(
        &self,
        collection: &str,
        id: &str,
        document: &serde_json::Value,
    ) -> Result<(), MirrorError> {
        let conn = self.conn.lock().unwrap();
        let data =
            serde_json::to_string(document).map_err(|e| MirrorError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT OR REPLACE INTO documents (collection, id, data, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            params![collection, id, data, now, now],
        )
        .map_err(|e| MirrorError::Database(e.to_string()))?;

        Ok(())
    }

    fn update_document(
        &self,
        collection: &str,
        id: &str,
        patch: &serde_json::Value,
    ) -> Result<(), MirrorError> {
        let conn = self.conn.lock().unwrap();
        let mut document = Self::read(&conn, collection, id)?.ok_or_else(|| MirrorError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;

        merge_document(&mut document, patch);
        let data =
            serde_json::to_string(&document).map_err(|e| MirrorError::Serialization(e.to_string()))?;

        conn.execute(
            "UPDATE documents SET data = ?, updated_at = ? WHERE collection = ? AND id = ?",
            params![data, Utc::now().to_rfc3339(), collection, id],
        )
        .map_err(|e| MirrorError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<serde_json::Value>, MirrorError> {
        let conn = self.conn.lock().unwrap();
        Self::read(&conn, collection, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_and_get() {
        let mirror = SqliteDocumentMirror::in_memory().unwrap();
        mirror
            .create_document("batch_jobs", "job-1", &json!({"status": "pending"}))
            .unwrap();

        let doc = mirror.get_document("batch_jobs", "job-1").unwrap().unwrap();
        assert_eq!(doc["status"], "pending");
        assert!(mirror.get_document("batch_jobs", "job-2").unwrap().is_none());
        assert!(mirror.get_document("other", "job-1").unwrap().is_none());
    }

    #[test]
    fn test_update_merges() {
        let mirror = SqliteDocumentMirror::in_memory().unwrap();
        mirror
            .create_document("batch_jobs", "job-1", &json!({"status": "pending", "job_type": "archive"}))
            .unwrap();
        mirror
            .update_document("batch_jobs", "job-1", &json!({"status": "completed"}))
            .unwrap();

        let doc = mirror.get_document("batch_jobs", "job-1").unwrap().unwrap();
        assert_eq!(doc["status"], "completed");
        assert_eq!(doc["job_type"], "archive");
    }

    #[test]
    fn test_update_missing_document() {
        let mirror = SqliteDocumentMirror::in_memory().unwrap();
        let err = mirror
            .update_document("batch_jobs", "ghost", &json!({"status": "running"}))
            .unwrap_err();
        assert!(matches!(err, MirrorError::NotFound { .. }));
    }

    #[test]
    fn test_file_backed_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirror.db");

        {
            let mirror = SqliteDocumentMirror::new(&path).unwrap();
            mirror
                .create_document("batch_jobs", "job-1", &json!({"status": "running"}))
                .unwrap();
        }

        let reopened = SqliteDocumentMirror::new(&path).unwrap();
        assert_eq!(reopened.count("batch_jobs").unwrap(), 1);
    }
}
