//! Build-time constants and run configuration.

/// Total capacity of the shared buffer in bytes (1 GiB).
pub const BUFFER_BYTES: usize = 1 << 30;

/// Number of full sweeps each worker makes over its range.
pub const PASSES: usize = 20;

/// Elements handled per kernel step: four AVX2 vectors of four `u64` lanes.
pub const VECTOR_STEP: usize = 16;

/// Alignment of the shared buffer, as required by `_mm256_load_si256`.
pub const BUFFER_ALIGN: usize = 32;

/// Value every element holds before the workers start.
pub const FILL_VALUE: u64 = 1;

/// Lane value of the synthetic pattern stored at offset 0 of each step.
pub const PATTERN: u64 = 0xDEAD_BEEF;

/// Bytes credited to a worker per step: 4 loads + 4 stores of 4 lanes each.
pub const BYTES_PER_STEP: u64 = (std::mem::size_of::<u64>() * 32) as u64;

/// Parameters of a single benchmark run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchConfig {
    /// Capacity of the shared buffer in bytes.
    pub buffer_bytes: usize,
    /// Sweeps per worker.
    pub passes: usize,
    /// Number of workers, at least 1.
    pub thread_count: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            buffer_bytes: BUFFER_BYTES,
            passes: PASSES,
            thread_count: 1,
        }
    }
}

impl BenchConfig {
    /// Default configuration with the given thread count, clamped to 1.
    pub fn with_threads(thread_count: usize) -> Self {
        Self {
            thread_count: thread_count.max(1),
            ..Self::default()
        }
    }

    /// Number of `u64` elements in the shared buffer.
    #[inline]
    pub fn buffer_elements(&self) -> usize {
        self.buffer_bytes / std::mem::size_of::<u64>()
    }
}

/// Turns the raw thread-count input into a usable value.
///
/// Missing, unparsable and non-positive inputs all fall back to a single
/// thread with a warning; this never fails.
pub fn resolve_thread_count(raw: Option<&str>) -> usize {
    let Some(raw) = raw else {
        tracing::warn!("no thread count given, defaulting to 1");
        return 1;
    };

    match raw.trim().parse::<i64>() {
        Ok(n) if n >= 1 => match usize::try_from(n) {
            Ok(n) => n,
            Err(_) => {
                tracing::warn!(value = raw, "thread count does not fit in usize, defaulting to 1");
                1
            }
        },
        Ok(n) => {
            tracing::warn!(value = n, "thread count must be at least 1, defaulting to 1");
            1
        }
        Err(err) => {
            tracing::warn!(value = raw, error = %err, "invalid thread count, defaulting to 1");
            1
        }
    }
}
