//! Splits a job's task list into fixed-size chunks.
//!
//! Chunk boundaries are the checkpoints where pause, cancellation and memory
//! pressure are evaluated.

/// Splits `tasks` into groups of `chunk_size`, preserving order.
///
/// The last group may be shorter. A `chunk_size` of 0 is treated as 1.
pub fn chunk<T: Clone>(tasks: &[T], chunk_size: usize) -> Vec<Vec<T>> {
    tasks
        .chunks(chunk_size.max(1))
        .map(|group| group.to_vec())
        .collect()
}
