use std::ops::Range;

use crate::config::VECTOR_STEP;

/// Computes the half-open element range owned by `thread_index`.
///
/// The buffer is split into `thread_count` equal chunks, the last one
/// absorbing the division remainder. Each range is then shortened to a whole
/// number of [`VECTOR_STEP`]s, so up to 15 elements at the tail of every
/// chunk are left untouched. Chunks smaller than one step come back empty.
///
/// Ranges for distinct indices never overlap and are ordered by index.
///
/// # Panics
///
/// Panics if `thread_count` is 0 or `thread_index >= thread_count`.
#[inline]
pub fn partition_range(
    thread_index: usize,
    thread_count: usize,
    total_elements: usize,
) -> Range<usize> {
    assert!(thread_count > 0, "Thread count must be greater than 0");
    assert!(
        thread_index < thread_count,
        "Thread ID {} out of bounds (max: {})",
        thread_index,
        thread_count - 1
    );

    let chunk = total_elements / thread_count;
    let start = thread_index * chunk;
    let end = if thread_index == thread_count - 1 {
        total_elements
    } else {
        start + chunk
    };
    let end = start + ((end - start) / VECTOR_STEP) * VECTOR_STEP;

    start..end
}

/// All ranges for a run, indexed by thread id.
pub fn partition_all(thread_count: usize, total_elements: usize) -> Vec<Range<usize>> {
    (0..thread_count)
        .map(|id| partition_range(id, thread_count, total_elements))
        .collect()
}
