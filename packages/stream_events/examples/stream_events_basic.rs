//! Demonstrates timing work and ordering two queues with events.
//!
//! Run with: `cargo run --example stream_events_basic`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use stream_events::{EventTable, HostQueue};
use tracing::Level;

fn main() {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    let table = EventTable::new();
    let producer = HostQueue::builder().name("producer").build();
    let consumer = HostQueue::builder().name("consumer").build();

    let start = table.create_default().unwrap();
    let produced = table.create_default().unwrap();

    let value = Arc::new(AtomicU64::new(0));

    table.record(start, &producer).unwrap();
    producer
        .enqueue_work({
            let value = Arc::clone(&value);
            move || {
                thread::sleep(Duration::from_millis(20));
                value.store(42, Ordering::Release);
            }
        })
        .unwrap();
    table.record(produced, &producer).unwrap();

    // The consumer runs its work only after the producer's work has completed.
    table.stream_wait(produced, &consumer).unwrap();
    consumer
        .enqueue_work({
            let value = Arc::clone(&value);
            move || println!("consumer sees {}", value.load(Ordering::Acquire))
        })
        .unwrap();

    consumer.finish().unwrap();
    table.synchronize(produced).unwrap();

    let millis = table.elapsed_time(start, produced).unwrap();
    println!("producer work took {millis:.2} ms");

    table.destroy(start).unwrap();
    table.destroy(produced).unwrap();
}
