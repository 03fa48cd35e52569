//! Cancellation Tests
//!
//! disable/stop while an utterance is in flight, and completions that arrive
//! after the slot was taken away from them.

use super::*;
use busvoice_core::{PlaybackState, Priority};

#[tokio::test]
async fn late_completion_after_disable_is_ignored() {
    let (sink, mut gate) = GatedSink::new();
    let sink = Arc::new(sink);
    let ctl = start(sink.clone());
    let mut events = ctl.subscribe();
    ctl.enable().await.unwrap();

    let a = ctl
        .enqueue("Bus 42 departing", Priority::High, Language::English)
        .await
        .unwrap()
        .unwrap();
    let (_, done) = next_utterance(&mut gate).await;
    ctl.enqueue("Next stop: Market", Priority::Low, Language::English)
        .await
        .unwrap();

    ctl.disable().await.unwrap();
    assert_eq!(sink.stops.load(Ordering::SeqCst), 1);
    let snapshot = ctl.snapshot();
    assert!(!snapshot.enabled);
    assert_eq!(snapshot.state, PlaybackState::Idle);
    assert_eq!(snapshot.queued, 0);
    assert_eq!(ctl.current_announcement_text(), "");

    let cancelled = wait_for(&mut events, |e| matches!(e, DispatchEvent::Cancelled { .. })).await;
    assert_eq!(cancelled, DispatchEvent::Cancelled { id: a });
    let cleared = wait_for(&mut events, |e| matches!(e, DispatchEvent::QueueCleared { .. })).await;
    assert_eq!(cleared, DispatchEvent::QueueCleared { dropped: 1 });

    // The engine reports completion only now; the dispatcher may already
    // have dropped the pending call
    let _ = done.send(Ok(()));
    wait_for(&mut events, |e| {
        matches!(e, DispatchEvent::StaleCallbackIgnored { .. })
    })
    .await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    let later = drain_events(&mut events);
    assert!(
        !later
            .iter()
            .any(|e| matches!(e, DispatchEvent::Started { .. } | DispatchEvent::Completed { .. })),
        "unexpected events after stale completion: {later:?}"
    );
    assert!(gate.try_recv().is_err());
    assert_eq!(ctl.snapshot().queued, 0);
    assert_eq!(ctl.state(), PlaybackState::Idle);
    ctl.shutdown().await.unwrap();
}

#[tokio::test]
async fn disable_while_idle_only_clears_and_drops_new_requests() {
    let (sink, mut gate) = GatedSink::new();
    let sink = Arc::new(sink);
    let ctl = start(sink.clone());
    ctl.enable().await.unwrap();
    ctl.disable().await.unwrap();

    assert_eq!(sink.stops.load(Ordering::SeqCst), 0);
    let dropped = ctl
        .enqueue("Bus 7 arriving", Priority::High, Language::English)
        .await
        .unwrap();
    assert_eq!(dropped, None);
    assert_eq!(ctl.snapshot().queued, 0);
    assert!(timeout(Duration::from_millis(30), gate.recv()).await.is_err());
    ctl.shutdown().await.unwrap();
}

#[tokio::test]
async fn stop_clears_queue_but_stays_enabled() {
    let (sink, mut gate) = GatedSink::new();
    let sink = Arc::new(sink);
    let ctl = start(sink.clone());
    let mut events = ctl.subscribe();
    ctl.enable().await.unwrap();

    ctl.enqueue("A", Priority::Medium, Language::English)
        .await
        .unwrap();
    let (_, stale_done) = next_utterance(&mut gate).await;
    ctl.enqueue("B", Priority::Medium, Language::English)
        .await
        .unwrap();
    ctl.enqueue("C", Priority::Low, Language::English)
        .await
        .unwrap();

    ctl.stop().await.unwrap();
    assert_eq!(sink.stops.load(Ordering::SeqCst), 1);
    assert!(ctl.is_enabled());
    assert_eq!(ctl.snapshot().queued, 0);
    let cleared = wait_for(&mut events, |e| matches!(e, DispatchEvent::QueueCleared { .. })).await;
    assert_eq!(cleared, DispatchEvent::QueueCleared { dropped: 2 });

    // New announcements still play
    ctl.enqueue("D", Priority::Low, Language::English)
        .await
        .unwrap();
    let (utterance, done) = next_utterance(&mut gate).await;
    assert_eq!(utterance.text, "D");

    // A's late completion must not end D
    let _ = stale_done.send(Ok(()));
    wait_for(&mut events, |e| {
        matches!(e, DispatchEvent::StaleCallbackIgnored { .. })
    })
    .await;
    assert_eq!(ctl.current_announcement_text(), "D");

    done.send(Ok(())).unwrap();
    wait_for(&mut events, |e| matches!(e, DispatchEvent::Completed { .. })).await;
    ctl.shutdown().await.unwrap();
}

#[tokio::test]
async fn superseded_utterance_is_dropped_when_sink_ignores_stop() {
    let (sink, mut gate) = GatedSink::new();
    let sink = Arc::new(sink);
    let ctl = start(sink.clone());
    ctl.enable().await.unwrap();

    ctl.enqueue("Bus 9 delayed", Priority::High, Language::English)
        .await
        .unwrap();
    let (_, mut pending) = next_utterance(&mut gate).await;

    ctl.stop().await.unwrap();
    assert_eq!(sink.stops.load(Ordering::SeqCst), 1);
    timeout(Duration::from_secs(2), pending.closed())
        .await
        .expect("pending speak dropped after stop");
    ctl.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_closes_the_dispatcher() {
    let (sink, mut gate) = GatedSink::new();
    let sink = Arc::new(sink);
    let ctl = start(sink.clone());
    ctl.enable().await.unwrap();
    ctl.enqueue("last call", Priority::High, Language::English)
        .await
        .unwrap();
    let _pending = next_utterance(&mut gate).await;

    ctl.shutdown().await.unwrap();
    assert_eq!(sink.stops.load(Ordering::SeqCst), 1);
    assert!(matches!(
        ctl.enqueue("too late", Priority::High, Language::English).await,
        Err(BusVoiceError::DispatcherClosed)
    ));
    // Idempotent
    ctl.shutdown().await.unwrap();
}
