use std::sync::Arc;

use tokio::sync::mpsc;

use super::{DocumentMirror, MirrorHandle, MirrorOp};

/// Background task applying queued mutations to the document store.
pub struct MirrorWriter {
    rx: mpsc::Receiver<MirrorOp>,
    store: Arc<dyn DocumentMirror>,
}

impl MirrorWriter {
    pub fn new(rx: mpsc::Receiver<MirrorOp>, store: Arc<dyn DocumentMirror>) -> Self {
        Self { rx, store }
    }

    /// Applies mutations until every handle is dropped.
    ///
    /// Store failures are logged and skipped.
    pub async fn run(mut self) {
        tracing::info!("Mirror writer started");

        while let Some(op) = self.rx.recv().await {
            let result = match &op {
                MirrorOp::Create {
                    collection,
                    id,
                    document,
                } => self.store.create_document(collection, id, document),
                MirrorOp::Update {
                    collection,
                    id,
                    patch,
                } => self.store.update_document(collection, id, patch),
            };

            if let Err(e) = result {
                tracing::warn!("Failed to mirror document {}: {}", op.id(), e);
            }
        }

        tracing::info!("Mirror writer shutting down");
    }
}

/// Creates a connected handle and writer.
///
/// Spawn the writer with `tokio::spawn(writer.run())`; it exits once all
/// clones of the handle are dropped.
pub fn create_mirror_system(
    store: Arc<dyn DocumentMirror>,
    buffer_size: usize,
) -> (MirrorHandle, MirrorWriter) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    (MirrorHandle::new(tx), MirrorWriter::new(rx, store))
}
