use std::time::{Duration, Instant};

use crate::{
    LocalRange,
    cancel::CancelToken,
    config::{BYTES_PER_STEP, VECTOR_STEP},
    kernel::Kernel,
};

/// Upper bound on the up-front allocation for pass timings.
const MAX_RESERVED_PASSES: usize = 1024;

/// Everything one worker produces. Owned by that worker until it is joined.
#[derive(Debug, Default, Clone)]
pub struct WorkerSlot {
    /// Bytes credited by the kernel across all completed passes.
    pub bytes_processed: u64,
    /// Bytes one full pass over the range credits.
    pub bytes_per_pass: u64,
    /// Duration of every completed pass, in order.
    pub pass_times: Vec<Duration>,
}

/// Sweeps `local` up to `passes` times, stopping early once `token` is
/// cancelled. Results go into `slot`, which is reset first.
///
/// An empty range still runs its passes and records zero bytes.
pub fn run_worker(
    local: LocalRange<'_>,
    passes: usize,
    kernel: Kernel,
    token: &CancelToken,
    slot: &mut WorkerSlot,
) {
    let LocalRange {
        thread_id,
        range,
        data,
    } = local;

    slot.bytes_processed = 0;
    slot.bytes_per_pass = (data.len() / VECTOR_STEP) as u64 * BYTES_PER_STEP;
    slot.pass_times.clear();
    slot.pass_times.reserve(passes.min(MAX_RESERVED_PASSES));

    tracing::debug!(thread_id, ?range, kernel = kernel.name(), "worker started");

    for _ in 0..passes {
        if !token.is_running() {
            tracing::debug!(thread_id, completed = slot.pass_times.len(), "worker cancelled");
            break;
        }

        let pass_start = Instant::now();
        slot.bytes_processed += kernel.sweep(data);
        slot.pass_times.push(pass_start.elapsed());
    }

    tracing::debug!(
        thread_id,
        bytes = slot.bytes_processed,
        passes = slot.pass_times.len(),
        "worker finished"
    );
}
