//! # Alt Engine overhead — selecting across many channels
//!
//! **Real-world scenario**: a single worker fanning in from many upstream
//! channels via `read_from_any`, measuring the posting/arbitration overhead
//! on top of the rendezvous cost already measured in `rendezvous.rs`.
pub use crossbeam_utils::thread::scope;
pub use test::Bencher;

use csp::alt::read_from_any;
use csp::channel::Channel;
use csp::priority::Priority;

const FAN_IN: usize = 16;
const ITERATIONS: usize = 2_000;

#[bench]
fn read_from_any_first_priority(b: &mut Bencher) {
    let channels: Vec<Channel<i32>> = (0..FAN_IN).map(|_| Channel::new()).collect();
    let last = channels.last().unwrap().clone();

    scope(|s| {
        let stop = std::sync::atomic::AtomicBool::new(false);
        s.spawn(|_| {
            while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                let _ = last.write(0, Some(std::time::Duration::from_millis(5)));
            }
        });

        b.iter(|| {
            for _ in 0..ITERATIONS {
                let _ = test::black_box(read_from_any(
                    &channels,
                    Priority::First,
                    Some(std::time::Duration::from_millis(50)),
                    None,
                ));
            }
        });

        stop.store(true, std::sync::atomic::Ordering::Relaxed);
    })
    .unwrap();
}

#[bench]
fn single_channel_read_baseline(b: &mut Bencher) {
    let channel: Channel<i32> = Channel::new();
    let stop = std::sync::atomic::AtomicBool::new(false);

    scope(|s| {
        let writer = channel.clone();
        s.spawn(|_| {
            while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                let _ = writer.write(0, Some(std::time::Duration::from_millis(5)));
            }
        });

        b.iter(|| {
            for _ in 0..ITERATIONS {
                let _ = test::black_box(channel.read(Some(std::time::Duration::from_millis(50))));
            }
        });

        stop.store(true, std::sync::atomic::Ordering::Relaxed);
    })
    .unwrap();
}
