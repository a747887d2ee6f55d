//! # Rendezvous throughput — one writer, one reader
//!
//! **Real-world scenario**: a producer and a consumer handing off values
//! one at a time through an unbuffered channel, each blocking until the
//! other shows up.
//!
//! Compares this crate's mutex-and-condvar rendezvous `Channel` against
//! `crossbeam_channel`'s zero-capacity channel and `std::sync::mpsc`'s
//! synchronous channel, both of which solve the identical problem.
pub use crossbeam_channel::bounded as crossbeam_bounded;
pub use crossbeam_utils::thread::scope;
pub use std::sync::mpsc::sync_channel as std_sync_channel;
pub use test::Bencher;

pub use csp::channel::Channel;

pub const TOTAL_MESSAGES: usize = 20_000;

#[bench]
fn csp_rendezvous(b: &mut Bencher) {
    let channel: Channel<i32> = Channel::new();

    let (start_tx, start_rx) = crossbeam_bounded::<()>(0);
    let (done_tx, done_rx) = crossbeam_bounded::<()>(0);

    scope(|s| {
        let writer = channel.clone();
        s.spawn(move |_| {
            while start_rx.recv().is_ok() {
                for i in 0..TOTAL_MESSAGES {
                    writer.write(i as i32, None).unwrap();
                }
                done_tx.send(()).unwrap();
            }
        });

        b.iter(|| {
            start_tx.send(()).unwrap();
            for _ in 0..TOTAL_MESSAGES {
                test::black_box(channel.read(None).unwrap());
            }
            done_rx.recv().unwrap();
        });

        drop(start_tx);
    })
    .unwrap();
}

#[bench]
fn crossbeam(b: &mut Bencher) {
    let (tx, rx) = crossbeam_bounded::<i32>(0);

    let (start_tx, start_rx) = crossbeam_bounded::<()>(0);
    let (done_tx, done_rx) = crossbeam_bounded::<()>(0);

    scope(|s| {
        s.spawn(|_| {
            while start_rx.recv().is_ok() {
                for i in 0..TOTAL_MESSAGES {
                    tx.send(i as i32).unwrap();
                }
                done_tx.send(()).unwrap();
            }
        });

        b.iter(|| {
            start_tx.send(()).unwrap();
            for _ in 0..TOTAL_MESSAGES {
                test::black_box(rx.recv().unwrap());
            }
            done_rx.recv().unwrap();
        });

        drop(start_tx);
    })
    .unwrap();
}

#[bench]
fn std_sync(b: &mut Bencher) {
    let (tx, rx) = std_sync_channel::<i32>(0);

    let (start_tx, start_rx) = crossbeam_bounded::<()>(0);
    let (done_tx, done_rx) = crossbeam_bounded::<()>(0);

    scope(|s| {
        s.spawn(|_| {
            while start_rx.recv().is_ok() {
                for i in 0..TOTAL_MESSAGES {
                    tx.send(i as i32).unwrap();
                }
                done_tx.send(()).unwrap();
            }
        });

        b.iter(|| {
            start_tx.send(()).unwrap();
            for _ in 0..TOTAL_MESSAGES {
                test::black_box(rx.recv().unwrap());
            }
            done_rx.recv().unwrap();
        });

        drop(start_tx);
    })
    .unwrap();
}
