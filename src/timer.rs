//! Per-pass timings and the rates derived from them.

use std::{
    fmt,
    time::{Duration, Instant},
};

const BYTES_PER_GIB: f64 = (1u64 << 30) as f64;

/// Timings of every pass of every worker in one run.
#[derive(Debug, Clone)]
pub struct TimingStats {
    /// Taken right before the first worker was spawned.
    pub init_timestamp: Instant,
    /// Taken right after the last worker was joined.
    pub completion_timestamp: Instant,
    /// `[thread_id][pass]` durations. Shorter rows mean the worker was cancelled.
    pub pass_times_per_thread: Vec<Vec<Duration>>,
    /// Bytes one pass of each thread credits; 0 for empty ranges.
    pub bytes_per_pass: Vec<u64>,
}

/// Spread of one worker's pass times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassSummary {
    pub passes: usize,
    pub fastest: Duration,
    pub mean: Duration,
    pub slowest: Duration,
    pub bytes_per_pass: u64,
}

impl PassSummary {
    /// GiB/s of the fastest pass.
    pub fn peak_gbps(&self) -> f64 {
        gbps(self.bytes_per_pass, self.fastest)
    }

    /// GiB/s of an average pass.
    pub fn mean_gbps(&self) -> f64 {
        gbps(self.bytes_per_pass, self.mean)
    }
}

impl TimingStats {
    #[inline]
    pub fn total_runtime(&self) -> Duration {
        self.completion_timestamp.duration_since(self.init_timestamp)
    }

    /// Passes completed by `thread_id`; 0 for unknown threads.
    #[inline]
    pub fn thread_pass_count(&self, thread_id: usize) -> usize {
        self.pass_times_per_thread
            .get(thread_id)
            .map_or(0, Vec::len)
    }

    /// Fastest, mean and slowest pass of one worker, `None` if it ran no pass.
    pub fn thread_summary(&self, thread_id: usize) -> Option<PassSummary> {
        let times = self.pass_times_per_thread.get(thread_id)?;
        let fastest = times.iter().min().copied()?;
        let slowest = times.iter().max().copied()?;
        let total: Duration = times.iter().sum();

        Some(PassSummary {
            passes: times.len(),
            fastest,
            mean: total / times.len() as u32,
            slowest,
            bytes_per_pass: self.bytes_per_pass.get(thread_id).copied().unwrap_or(0),
        })
    }

    /// Combined rate of pass `pass` across all workers that completed it.
    ///
    /// Workers run their passes concurrently but not in lockstep, so the
    /// slowest worker's pass time stands in for the wall time of the round.
    pub fn pass_gbps(&self, pass: usize) -> Option<f64> {
        let mut bytes = 0;
        let mut slowest = Duration::ZERO;

        for (thread_id, times) in self.pass_times_per_thread.iter().enumerate() {
            if let Some(&time) = times.get(pass) {
                bytes += self.bytes_per_pass.get(thread_id).copied().unwrap_or(0);
                slowest = slowest.max(time);
            }
        }

        (slowest > Duration::ZERO).then(|| gbps(bytes, slowest))
    }

    fn max_passes(&self) -> usize {
        self.pass_times_per_thread
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Display for TimingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.max_passes() == 0 {
            return writeln!(f, "No passes completed.");
        }

        writeln!(
            f,
            "\nPer-thread passes (parallel phase {:.3} ms)",
            to_ms(self.total_runtime())
        )?;
        writeln!(
            f,
            "{:>6} {:>10} {:>6} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "thread", "MiB/pass", "passes", "min ms", "mean ms", "max ms", "peak GB/s", "mean GB/s"
        )?;
        for thread_id in 0..self.pass_times_per_thread.len() {
            match self.thread_summary(thread_id) {
                Some(s) => writeln!(
                    f,
                    "{:>6} {:>10.2} {:>6} {:>10.3} {:>10.3} {:>10.3} {:>10.2} {:>10.2}",
                    thread_id,
                    s.bytes_per_pass as f64 / (1 << 20) as f64,
                    s.passes,
                    to_ms(s.fastest),
                    to_ms(s.mean),
                    to_ms(s.slowest),
                    s.peak_gbps(),
                    s.mean_gbps(),
                )?,
                None => writeln!(f, "{:>6} {:>10} {:>6}", thread_id, "-", 0)?,
            }
        }

        writeln!(f, "\nPer-pass aggregate")?;
        writeln!(f, "{:>6} {:>10} {:>10}", "pass", "workers", "GB/s")?;
        for pass in 0..self.max_passes() {
            let workers = self
                .pass_times_per_thread
                .iter()
                .filter(|times| times.len() > pass)
                .count();
            match self.pass_gbps(pass) {
                Some(rate) => writeln!(f, "{:>6} {:>10} {:>10.2}", pass, workers, rate)?,
                None => writeln!(f, "{:>6} {:>10} {:>10}", pass, workers, "-")?,
            }
        }

        Ok(())
    }
}

fn gbps(bytes: u64, time: Duration) -> f64 {
    let secs = time.as_secs_f64();
    if secs > 0.0 { bytes as f64 / BYTES_PER_GIB / secs } else { 0.0 }
}

fn to_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1_000.0
}
