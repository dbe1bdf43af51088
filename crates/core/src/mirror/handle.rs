use tokio::sync::mpsc;

/// A queued mirror mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorOp {
    Create {
        collection: String,
        id: String,
        document: serde_json::Value,
    },
    Update {
        collection: String,
        id: String,
        patch: serde_json::Value,
    },
}

impl MirrorOp {
    pub fn create(collection: &str, id: &str, document: serde_json::Value) -> Self {
        MirrorOp::Create {
            collection: collection.to_string(),
            id: id.to_string(),
            document,
        }
    }

    pub fn update(collection: &str, id: &str, patch: serde_json::Value) -> Self {
        MirrorOp::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            patch,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            MirrorOp::Create { id, .. } | MirrorOp::Update { id, .. } => id,
        }
    }
}

/// Cheaply cloneable sender of mirror mutations.
#[derive(Debug, Clone)]
pub struct MirrorHandle {
    tx: mpsc::Sender<MirrorOp>,
}

impl MirrorHandle {
    pub fn new(tx: mpsc::Sender<MirrorOp>) -> Self {
        Self { tx }
    }

    /// Queues `op`, waiting for buffer space. A closed writer is logged.
    pub async fn record(&self, op: MirrorOp) {
        if let Err(e) = self.tx.send(op).await {
            tracing::error!("Failed to queue mirror write for {}: writer closed", e.0.id());
        }
    }

    /// Queues `op` without waiting. Returns false, after logging, when the
    /// buffer is full or the writer is gone.
    pub fn try_record(&self, op: MirrorOp) -> bool {
        match self.tx.try_send(op) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Dropped mirror write: {}", e);
                false
            }
        }
    }
}
