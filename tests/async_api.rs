//! Coverage for the `async` feature's `Future` surface on top of the same
//! blocking engine exercised in `scenarios.rs`.
#![cfg(feature = "async")]

use std::time::Duration;

use csp::alt::{read_from_any_future, read_or_write_any_future, write_to_any_future};
use csp::channel::Channel;
use csp::completer::Completer;
use csp::error::CspError;
use csp::priority::Priority;

#[tokio::test]
async fn completer_future_resolves_once_the_result_is_set() {
    let completer: std::sync::Arc<Completer<i32>> = std::sync::Arc::new(Completer::new());
    let writer = completer.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        writer.set_result(Ok(7));
    });
    assert_eq!(completer.future().await, Ok(7));
}

#[tokio::test]
async fn completer_future_observes_cancellation() {
    let completer: Completer<i32> = Completer::new();
    completer.set_cancelled();
    assert_eq!(completer.future().await, Err(CspError::Cancelled));
}

#[tokio::test]
async fn two_tasks_rendezvous_through_blocking_channel_on_a_multi_thread_runtime() {
    // `Channel::read`/`Channel::write` block the calling thread; on a
    // multi-threaded runtime that is safe as long as each blocking call
    // gets its own worker, which `rt-multi-thread` provides.
    let channel: Channel<i32> = Channel::new();
    let reader = {
        let channel = channel.clone();
        tokio::task::spawn_blocking(move || channel.read(Some(Duration::from_secs(2))))
    };
    tokio::task::spawn_blocking({
        let channel = channel.clone();
        move || channel.write(99, Some(Duration::from_secs(2)))
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(reader.await.unwrap().unwrap(), 99);
}

#[tokio::test]
async fn read_future_and_write_future_rendezvous_on_a_single_threaded_runtime() {
    // Two concurrent alts driven purely by `.await`, never blocking a pool
    // thread: this is the scenario `Channel::read`/`write` cannot serve on
    // a capped/single-thread executor.
    let channel: Channel<i32> = Channel::new();
    let writer = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.write_future(5, Some(Duration::from_secs(2))).await })
    };
    let value = channel.read_future(Some(Duration::from_secs(2))).await.unwrap();
    assert_eq!(value, 5);
    writer.await.unwrap().unwrap();
}

#[tokio::test]
async fn read_future_times_out_when_nothing_arrives() {
    let channel: Channel<i32> = Channel::new();
    let err = channel.read_future(Some(Duration::from_millis(20))).await.unwrap_err();
    assert_eq!(err, CspError::Timeout);
    assert_eq!(channel.probe().pending_readers, 0);
}

#[tokio::test]
async fn dropping_a_read_future_early_purges_the_pending_entry() {
    // `read_future` posts the request synchronously when called, before the
    // future is ever polled, so dropping it unpolled must still purge the
    // now-stale queue entry.
    let channel: Channel<i32> = Channel::new();
    assert_eq!(channel.probe().pending_readers, 0);
    drop(channel.read_future(Some(Duration::from_secs(2))));
    assert_eq!(channel.probe().pending_readers, 0);
}

#[tokio::test]
async fn read_from_any_future_picks_whichever_channel_is_ready() {
    let a: Channel<i32> = Channel::new();
    let b: Channel<i32> = Channel::new();
    let channels = vec![a.clone(), b.clone()];
    b.write(3, None).unwrap();
    let (index, value) = read_from_any_future(&channels, Priority::First, None, None)
        .unwrap()
        .await
        .unwrap();
    assert_eq!(index, 1);
    assert_eq!(value, 3);
}

#[tokio::test]
async fn write_to_any_future_picks_whichever_channel_is_ready() {
    let a: Channel<i32> = Channel::new();
    let b: Channel<i32> = Channel::new();
    let channels = vec![a.clone(), b.clone()];
    let reader = {
        let b = b.clone();
        tokio::task::spawn_blocking(move || b.read(Some(Duration::from_secs(2))))
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let index = write_to_any_future(&channels, vec![1, 2], Priority::First, None, None)
        .unwrap()
        .await
        .unwrap();
    assert_eq!(index, 1);
    assert_eq!(reader.await.unwrap().unwrap(), 2);
}

#[tokio::test]
async fn read_or_write_any_future_mixes_heterogeneous_types() {
    let ints: Channel<i32> = Channel::new();
    let strings: Channel<String> = Channel::new();
    let writer = {
        let strings = strings.clone();
        tokio::task::spawn_blocking(move || strings.write("async hi".to_string(), None))
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let candidates = vec![csp::request::read(&ints), csp::request::read(&strings)];
    let outcome = read_or_write_any_future(candidates, Priority::First, None)
        .unwrap()
        .await
        .unwrap();
    let (index, _channel, value) = outcome.into_read::<String>();
    assert_eq!(index, 1);
    assert_eq!(value, "async hi");
    writer.await.unwrap().unwrap();
}
