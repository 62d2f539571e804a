//! # nt-bandwidth - Multi-Threaded Non-Temporal Memory Bandwidth Stress
//!
//! Measures the sustained read/write bandwidth a set of worker threads can
//! push through main memory. One large 32-byte aligned buffer is split into
//! disjoint ranges, one per thread, and every worker repeatedly sweeps its
//! range with AVX2 loads and non-temporal (cache-bypassing) stores.
//!
//! ## Key Features
//!
//! - **Segmented Access**: each worker has exclusive access to its own range of the buffer
//! - **No Locks**: ranges are carved out of one `&mut [u64]`, so the borrow checker proves disjointness
//! - **Non-Temporal Stores**: `_mm256_stream_si256` keeps the traffic out of the cache hierarchy
//! - **Cooperative Cancellation**: a shared token stops workers at the next pass boundary
//!
//! ## Usage Pattern
//!
//! ```rust,no_run
//! use nt_bandwidth::{BenchConfig, CancelToken, Metrics, run};
//!
//! let config = BenchConfig::with_threads(4);
//! let report = run(&config, &CancelToken::new()).unwrap();
//!
//! print!("{}", Metrics::from(&report));
//! ```
//!
//! ## Memory Layout
//!
//! ```text
//! Thread 0: [start0 .. end0) gap | Thread 1: [start1 .. end1) gap | ... | Thread N-1: [.. end) tail
//! ```
//!
//! Each range is rounded down to a whole number of 16-element steps, so a
//! few elements at the end of each chunk may never be touched.


pub mod bench;
pub mod cancel;
pub mod config;
pub mod kernel;
pub mod partition;
pub mod report;
pub mod timer;
pub mod worker;

use std::{
    alloc::{self, Layout},
    ops::Range,
    ptr::NonNull,
};

use anyhow::{Context, bail};
use rayon::prelude::*;

pub use bench::{BenchReport, run, run_on};
pub use cancel::{CancelToken, Supervisor};
pub use config::{BenchConfig, resolve_thread_count};
pub use kernel::{Kernel, StreamWidth};
pub use partition::{partition_all, partition_range};
pub use report::Metrics;
pub use timer::TimingStats;

/// A fixed-length, 32-byte aligned buffer of `u64` shared by all workers.
///
/// The allocation is made once in [`SharedBuffer::new`] and never resized.
/// Workers never see the buffer itself; they receive a [`LocalRange`] from
/// [`SharedBuffer::split_local`], which hands out non-overlapping mutable
/// sub-slices.
///
/// ## Memory Layout
///
/// ```text
/// base (32-byte aligned)
/// |
/// [ e0 e1 e2 ... e15 | e16 ... e31 | ... | e(len-1) ]
/// ```
pub struct SharedBuffer {
    /// Start of the allocation. Always aligned to [`config::BUFFER_ALIGN`].
    ptr: NonNull<u64>,

    /// Number of `u64` elements in the allocation.
    len: usize,

    /// Layout used for both allocation and deallocation.
    layout: Layout,
}

// SAFETY: SharedBuffer owns its allocation exclusively, like a Vec<u64>.
// All access goes through &self / &mut self, so the usual borrow rules apply.
unsafe impl Send for SharedBuffer {}
unsafe impl Sync for SharedBuffer {}

/// A worker's exclusive view of its part of the [`SharedBuffer`].
///
/// The range is computed by [`partition_range`], so its length is always a
/// multiple of [`config::VECTOR_STEP`]. It may be empty.
#[derive(Debug)]
pub struct LocalRange<'a> {
    /// The thread this range belongs to.
    pub(crate) thread_id: usize,

    /// Position of `data` inside the whole buffer.
    pub(crate) range: Range<usize>,

    /// The elements this worker may read and write.
    pub(crate) data: &'a mut [u64],
}

impl SharedBuffer {
    /// Allocates `len` aligned elements, all set to `fill`.
    ///
    /// # Errors
    ///
    /// Returns an error if `len` is 0 or the byte size overflows a [`Layout`].
    ///
    /// # Aborts
    ///
    /// An allocator failure is fatal and goes through
    /// [`alloc::handle_alloc_error`]; there is no way to run without the buffer.
    pub fn new(len: usize, fill: u64) -> anyhow::Result<Self> {
        if len == 0 {
            bail!("shared buffer must hold at least one element");
        }

        let bytes = len
            .checked_mul(std::mem::size_of::<u64>())
            .context("shared buffer size overflows usize")?;
        let layout = Layout::from_size_align(bytes, config::BUFFER_ALIGN)
            .with_context(|| format!("invalid layout for {} byte buffer", bytes))?;

        // Zeroed so the memory is initialized before any slice is formed.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw as *mut u64) else {
            alloc::handle_alloc_error(layout);
        };

        tracing::debug!(bytes, align = config::BUFFER_ALIGN, "allocated shared buffer");

        let mut buffer = Self { ptr, len, layout };
        buffer.fill(fill);
        Ok(buffer)
    }

    /// Number of elements in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; a zero-length buffer cannot be built.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the buffer in bytes.
    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u64] {
        // SAFETY: ptr is valid and initialized for len elements.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u64] {
        // SAFETY: ptr is valid and initialized for len elements, and &mut self
        // guarantees no other reference exists.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Sets every element to `value`, in parallel.
    pub fn fill(&mut self, value: u64) {
        const FILL_CHUNK: usize = 1 << 16;

        self.as_mut_slice()
            .par_chunks_mut(FILL_CHUNK)
            .for_each(|chunk| chunk.fill(value));

        tracing::debug!(elements = self.len, value, "filled shared buffer");
    }

    /// Splits the buffer into one [`LocalRange`] per thread.
    ///
    /// The returned vector is indexed by thread id. Elements that fall
    /// between ranges (rounding leftovers) belong to nobody.
    ///
    /// # Panics
    ///
    /// Panics if `thread_count` is 0.
    pub fn split_local(&mut self, thread_count: usize) -> Vec<LocalRange<'_>> {
        let ranges = partition_all(thread_count, self.len);
        let mut locals = Vec::with_capacity(ranges.len());

        let mut rest: &mut [u64] = self.as_mut_slice();
        let mut offset = 0;

        for (thread_id, range) in ranges.into_iter().enumerate() {
            let (_, tail) = std::mem::take(&mut rest).split_at_mut(range.start - offset);
            let (data, tail) = tail.split_at_mut(range.len());
            rest = tail;
            offset = range.end;

            locals.push(LocalRange {
                thread_id,
                range,
                data,
            });
        }

        locals
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr was allocated in `new` with exactly this layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr() as *mut u8, self.layout) };
    }
}

impl LocalRange<'_> {
    /// The thread this range belongs to.
    #[inline]
    pub fn thread_id(&self) -> usize {
        self.thread_id
    }

    /// Position of this range inside the whole buffer.
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Widest non-temporal store the start of this range allows.
    #[inline]
    pub fn stream_width(&self) -> StreamWidth {
        StreamWidth::for_ptr(self.data.as_ptr())
    }
}
