//! In-memory document mirror for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::mirror::{merge_document, DocumentMirror, MirrorError};

/// Mock implementation of the DocumentMirror trait.
///
/// Stores documents in a map and counts writes. A failing mirror rejects every
/// operation with a database error.
#[derive(Debug, Default)]
pub struct MockMirror {
    documents: Mutex<HashMap<(String, String), serde_json::Value>>,
    creates: AtomicUsize,
    updates: AtomicUsize,
    failing: bool,
}

impl MockMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub fn document(&self, collection: &str, id: &str) -> Option<serde_json::Value> {
        self.documents
            .lock()
            .unwrap()
            .get(&(collection.to_string(), id.to_string()))
            .cloned()
    }

    pub fn document_count(&self) -> usize {
        self.documents.lock().unwrap().len()
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), MirrorError> {
        if self.failing {
            return Err(MirrorError::Database("mock mirror failure".to_string()));
        }
        Ok(())
    }
}

impl DocumentMirror for MockMirror {
    fn create_document(
        &self,
        collection: &str,
        id: &str,
        document: &serde_json::Value,
    ) -> Result<(), MirrorError> {
        self.check()?;
        self.documents
            .lock()
            .unwrap()
            .insert((collection.to_string(), id.to_string()), document.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn update_document(
        &self,
        collection: &str,
        id: &str,
        patch: &serde_json::Value,
    ) -> Result<(), MirrorError> {
        self.check()?;
        let mut documents = self.documents.lock().unwrap();
        let document = documents
            .get_mut(&(collection.to_string(), id.to_string()))
            .ok_or_else(|| MirrorError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        merge_document(document, patch);
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<serde_json::Value>, MirrorError> {
        self.check()?;
        Ok(self.document(collection, id))
    }
}
