use super::subscriber::{BACKLOG_WARN_STEP, Subscriber};
use crate::utils::DeliveryError;
use bytes::Bytes;
use std::collections::HashSet;
use tokio::sync::mpsc;

#[test]
fn test_subscriber_new() {
    let (tx, _rx) = mpsc::unbounded_channel::<Bytes>();
    let subscriber = Subscriber::new(tx);
    assert!(!subscriber.id().is_nil());
    assert!(subscriber.to_string().starts_with("client-"));
}

#[test]
fn clones_are_equal_and_distinct_handles_are_not() {
    let (tx, _rx) = mpsc::unbounded_channel::<Bytes>();
    let a = Subscriber::new(tx.clone());
    let b = Subscriber::new(tx);

    assert_eq!(a, a.clone());
    assert_ne!(a, b);

    let set: HashSet<Subscriber> = [a.clone(), a.clone(), b].into_iter().collect();
    assert_eq!(set.len(), 2);
}

#[test]
fn send_frame_reaches_channel() {
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    let subscriber = Subscriber::new(tx);

    subscriber.send_frame(Bytes::from_static(b"MSG t 2\n{}")).unwrap();
    assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"MSG t 2\n{}"));
}

#[test]
fn send_frame_fails_once_receiver_is_gone() {
    let (tx, rx) = mpsc::unbounded_channel::<Bytes>();
    let subscriber = Subscriber::new(tx);
    drop(rx);

    assert!(subscriber.is_closed());
    match subscriber.send_frame(Bytes::from_static(b"x")) {
        Err(DeliveryError::Closed(id)) => assert_eq!(id, subscriber.id()),
        other => panic!("expected Closed, got {other:?}"),
    }
}

#[test]
fn pending_counts_unwritten_frames() {
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    let subscriber = Subscriber::new(tx);
    let backlog = subscriber.backlog();

    for _ in 0..3 {
        subscriber.send_frame(Bytes::from_static(b"MSG t 0\n")).unwrap();
    }
    assert_eq!(subscriber.pending(), 3);
    assert_eq!(subscriber.clone().pending(), 3);

    rx.try_recv().unwrap();
    backlog.written();
    assert_eq!(subscriber.pending(), 2);
}

#[test]
fn pending_keeps_growing_while_peer_is_not_reading() {
    let (tx, _rx) = mpsc::unbounded_channel::<Bytes>();
    let subscriber = Subscriber::new(tx);

    for _ in 0..BACKLOG_WARN_STEP + 1 {
        subscriber.send_frame(Bytes::from_static(b"x")).unwrap();
    }
    assert_eq!(subscriber.pending(), BACKLOG_WARN_STEP + 1);
}

#[test]
fn failed_send_is_not_counted_as_pending() {
    let (tx, rx) = mpsc::unbounded_channel::<Bytes>();
    let subscriber = Subscriber::new(tx);
    drop(rx);

    assert!(subscriber.send_frame(Bytes::from_static(b"x")).is_err());
    assert_eq!(subscriber.pending(), 0);
    subscriber.backlog().written();
    assert_eq!(subscriber.pending(), 0);
}
