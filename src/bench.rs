//! Runs the workers and reduces their results.

use std::{
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;

use crate::{
    LocalRange, SharedBuffer,
    cancel::CancelToken,
    config::{BenchConfig, FILL_VALUE},
    kernel::{Kernel, StreamWidth},
    timer::TimingStats,
    worker::{WorkerSlot, run_worker},
};

const BYTES_PER_GIB: f64 = (1u64 << 30) as f64;

/// Outcome of one benchmark run.
#[derive(Debug, Clone)]
pub struct BenchReport {
    /// Capacity of the shared buffer in bytes.
    pub buffer_bytes: usize,
    pub thread_count: usize,
    /// Kernel that ran the sweeps.
    pub kernel: Kernel,
    /// Bytes credited per worker, indexed by thread id.
    pub bytes_per_thread: Vec<u64>,
    /// Sum of `bytes_per_thread`.
    pub total_bytes: u64,
    /// Wall-clock time from the first spawn to the last join.
    pub elapsed: Duration,
    /// Workers whose range starts off a 32-byte boundary and therefore
    /// streams in 16- or 8-byte stores. Always empty for the portable kernel.
    pub narrow_stream_workers: Vec<usize>,
    /// Whether the token was cancelled before the run finished.
    pub cancelled: bool,
    pub timing: TimingStats,
}

impl BenchReport {
    /// Total data moved, in GiB.
    #[inline]
    pub fn total_gb(&self) -> f64 {
        self.total_bytes as f64 / BYTES_PER_GIB
    }

    /// Buffer capacity, in GiB.
    #[inline]
    pub fn buffer_gb(&self) -> f64 {
        self.buffer_bytes as f64 / BYTES_PER_GIB
    }

    #[inline]
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// Throughput in GiB/s, or 0 when no time elapsed.
    #[inline]
    pub fn throughput_gbps(&self) -> f64 {
        let secs = self.elapsed_secs();
        if secs > 0.0 { self.total_gb() / secs } else { 0.0 }
    }
}

/// Allocates the buffer described by `config` and runs the benchmark on it.
pub fn run(config: &BenchConfig, token: &CancelToken) -> anyhow::Result<BenchReport> {
    let mut buffer = SharedBuffer::new(config.buffer_elements(), FILL_VALUE)
        .context("failed to set up the shared buffer")?;

    run_on(
        &mut buffer,
        config.thread_count,
        config.passes,
        Kernel::detect(),
        token,
    )
}

/// Runs `thread_count` workers over an existing buffer.
///
/// Exactly `thread_count` threads are spawned, even when some of them get an
/// empty range. Counters are reduced only after every worker has been
/// joined; a panicking worker is re-raised here.
///
/// # Panics
///
/// Panics if `thread_count` is 0.
pub fn run_on(
    buffer: &mut SharedBuffer,
    thread_count: usize,
    passes: usize,
    kernel: Kernel,
    token: &CancelToken,
) -> anyhow::Result<BenchReport> {
    assert!(thread_count > 0, "Number of threads must be greater than 0");

    let buffer_bytes = buffer.size_bytes();
    let mut slots = vec![WorkerSlot::default(); thread_count];

    tracing::info!(
        thread_count,
        passes,
        buffer_bytes,
        kernel = kernel.name(),
        "starting workers"
    );

    let locals = buffer.split_local(thread_count);

    let narrow_stream_workers = match kernel {
        Kernel::Avx2 => narrow_stream_workers(&locals),
        Kernel::Portable => Vec::new(),
    };
    if !narrow_stream_workers.is_empty() {
        tracing::warn!(
            workers = ?narrow_stream_workers,
            "ranges start off the 32-byte boundary, these workers stream in 16/8-byte stores"
        );
    }

    let (init_timestamp, completion_timestamp) = thread::scope(|s| -> anyhow::Result<_> {
        let start = Instant::now();

        let mut handles = Vec::with_capacity(thread_count);
        for (local, slot) in locals.into_iter().zip(slots.iter_mut()) {
            let handle = thread::Builder::new()
                .name(format!("worker-{}", local.thread_id()))
                .spawn_scoped(s, move || run_worker(local, passes, kernel, token, slot))
                .context("failed to spawn worker thread")?;
            handles.push(handle);
        }

        for handle in handles {
            if let Err(panic) = handle.join() {
                std::panic::resume_unwind(panic);
            }
        }

        Ok((start, Instant::now()))
    })?;

    let bytes_per_thread: Vec<u64> = slots.iter().map(|slot| slot.bytes_processed).collect();
    let bytes_per_pass: Vec<u64> = slots.iter().map(|slot| slot.bytes_per_pass).collect();
    let total_bytes = bytes_per_thread.iter().sum();
    let elapsed = completion_timestamp.duration_since(init_timestamp);

    let report = BenchReport {
        buffer_bytes,
        thread_count,
        kernel,
        bytes_per_thread,
        total_bytes,
        elapsed,
        narrow_stream_workers,
        cancelled: !token.is_running(),
        timing: TimingStats {
            init_timestamp,
            completion_timestamp,
            pass_times_per_thread: slots.into_iter().map(|slot| slot.pass_times).collect(),
            bytes_per_pass,
        },
    };

    tracing::info!(
        total_bytes = report.total_bytes,
        elapsed = ?report.elapsed,
        throughput_gbps = report.throughput_gbps(),
        cancelled = report.cancelled,
        "all workers joined"
    );

    Ok(report)
}

/// Thread ids of non-empty ranges that cannot use full-width streaming stores.
pub(crate) fn narrow_stream_workers(locals: &[LocalRange<'_>]) -> Vec<usize> {
    locals
        .iter()
        .filter(|local| !local.is_empty() && local.stream_width() != StreamWidth::Ymm)
        .map(|local| local.thread_id())
        .collect()
}
