//! Best-effort mirroring of job records into a document store.
//!
//! The orchestrator never waits on the store: mutations are queued through a
//! [`MirrorHandle`] and written by a background [`MirrorWriter`].

mod handle;
mod sqlite;
mod store;
mod writer;

pub use handle::*;
pub use sqlite::*;
pub use store::*;
pub use writer::*;

/// Collection holding one document per batch job.
pub const JOBS_COLLECTION: &str = "batch_jobs";
