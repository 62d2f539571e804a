use std::thread;

use nt_bandwidth::{CancelToken, Kernel, Metrics, SharedBuffer, config, run_on};

// Benchmark configuration
const BUFFER_BYTES: usize = 256 * 1024 * 1024;
const PASSES: usize = 10;

fn thread_counts() -> Vec<usize> {
    let max = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    let mut counts: Vec<usize> = std::iter::successors(Some(1usize), |n| Some(n * 2))
        .take_while(|&n| n < max)
        .collect();
    counts.push(max);
    counts
}

fn main() {
    let mut buffer = SharedBuffer::new(BUFFER_BYTES / 8, config::FILL_VALUE)
        .expect("failed to allocate benchmark buffer");
    let kernel = Kernel::detect();

    println!("Thread Sweep Benchmark");
    println!("======================");
    println!("Kernel: {}", kernel.name());
    println!("Passes: {}", PASSES);

    let mut best = (0usize, 0.0f64);
    for thread_count in thread_counts() {
        buffer.fill(config::FILL_VALUE);

        let report = run_on(
            &mut buffer,
            thread_count,
            PASSES,
            kernel,
            &CancelToken::new(),
        )
        .expect("benchmark run failed");

        print!("{}", Metrics::from(&report));
        if report.throughput_gbps() > best.1 {
            best = (thread_count, report.throughput_gbps());
        }
    }

    println!(
        "\nPeak throughput: {:.2} GB/s with {} threads",
        best.1, best.0
    );
}
