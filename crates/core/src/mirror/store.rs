use thiserror::Error;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },
}

/// Document store the orchestrator mirrors job records into.
pub trait DocumentMirror: Send + Sync {
    /// Stores a new document, replacing any existing one with the same id.
    fn create_document(
        &self,
        collection: &str,
        id: &str,
        document: &serde_json::Value,
    ) -> Result<(), MirrorError>;

    /// Merges the top-level fields of `patch` into an existing document.
    fn update_document(
        &self,
        collection: &str,
        id: &str,
        patch: &serde_json::Value,
    ) -> Result<(), MirrorError>;

    fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<serde_json::Value>, MirrorError>;
}

/// Shallow merge: top-level keys of `patch` overwrite those of `document`.
///
/// A non-object patch replaces the document entirely.
pub fn merge_document(document: &mut serde_json::Value, patch: &serde_json::Value) {
    match (document.as_object_mut(), patch.as_object()) {
        (Some(target), Some(fields)) => {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }
        _ => *document = patch.clone(),
    }
}
