use std::time::Instant;

use nt_bandwidth::{
    CancelToken, Kernel, SharedBuffer, config,
    worker::{WorkerSlot, run_worker},
};

fn main() {
    println!("Non-temporal stress driven by a rayon scope");
    println!("============================================\n");

    // Configuration
    const NUM_THREADS: usize = 4;
    const BUFFER_ELEMENTS: usize = 32 * 1024 * 1024;
    const PASSES: usize = 10;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(NUM_THREADS)
        .build()
        .expect("failed to build rayon pool");

    let mut buffer = SharedBuffer::new(BUFFER_ELEMENTS, config::FILL_VALUE)
        .expect("failed to allocate shared buffer");
    let kernel = Kernel::detect();
    let token = CancelToken::new();
    let mut slots = vec![WorkerSlot::default(); NUM_THREADS];

    println!("Configuration:");
    println!("  Threads: {}", NUM_THREADS);
    println!("  Buffer: {} MiB", BUFFER_ELEMENTS * 8 / (1024 * 1024));
    println!("  Passes: {}", PASSES);
    println!("  Kernel: {}\n", kernel.name());

    let locals = buffer.split_local(NUM_THREADS);
    let start_time = Instant::now();

    // Each rayon task owns one range and one slot, like the plain-thread runner.
    pool.scope(|scope| {
        for (local, slot) in locals.into_iter().zip(slots.iter_mut()) {
            let token = &token;
            scope.spawn(move |_| run_worker(local, PASSES, kernel, token, slot));
        }
    });

    let elapsed = start_time.elapsed();

    for (thread_id, slot) in slots.iter().enumerate() {
        println!(
            "  Thread {}: {:.2} GB in {} passes",
            thread_id,
            slot.bytes_processed as f64 / (1u64 << 30) as f64,
            slot.pass_times.len()
        );
    }

    let total_bytes: u64 = slots.iter().map(|slot| slot.bytes_processed).sum();
    let total_gb = total_bytes as f64 / (1u64 << 30) as f64;
    println!("\nTotal: {:.2} GB in {:.2} s", total_gb, elapsed.as_secs_f64());
    println!("Throughput: {:.2} GB/s", total_gb / elapsed.as_secs_f64());
}
