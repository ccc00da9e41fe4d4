//! Controller driven through its intent channel

use std::sync::Arc;
use std::time::Duration;

use pagewise::engine::sim::SimulatedPdf;
use pagewise::gesture::GestureRouter;
use pagewise::navigation::{Intent, ReaderController, ReaderSnapshot, ReaderStatus};
use pagewise::source::SourceInput;
use pagewise::ReaderConfig;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

async fn wait_for(
    snapshots: &mut watch::Receiver<ReaderSnapshot>,
    predicate: impl FnMut(&ReaderSnapshot) -> bool,
) -> ReaderSnapshot {
    timeout(Duration::from_secs(5), snapshots.wait_for(predicate))
        .await
        .expect("snapshot did not arrive in time")
        .expect("controller stopped")
        .clone()
}

#[tokio::test]
async fn test_intents_drive_published_snapshots() {
    pagewise::telemetry::init_tracing("pagewise=debug");

    let renderer = Arc::new(SimulatedPdf::new(5));
    let controller = ReaderController::paged(Arc::clone(&renderer), ReaderConfig::default());
    let initial = controller.snapshot();

    let (intents, intents_rx) = mpsc::channel(16);
    let (snapshots_tx, mut snapshots) = watch::channel(initial);
    let task = tokio::spawn(controller.run(intents_rx, snapshots_tx));

    intents
        .send(Intent::Open(SourceInput::remote(
            "https://example.com/manuals/printer.pdf",
        )))
        .await
        .unwrap();
    let ready = wait_for(&mut snapshots, |s| s.status == ReaderStatus::Ready).await;
    assert_eq!(ready.total_positions, 5);

    // One swipe left is exactly one page forward
    let mut router = GestureRouter::default();
    router.touch_start(300.0);
    intents.send(router.touch_end(200.0).unwrap()).await.unwrap();
    let moved = wait_for(&mut snapshots, |s| s.current_position == 2).await;
    assert_eq!(moved.status, ReaderStatus::Ready);

    router.touch_start(300.0);
    assert!(router.touch_end(280.0).is_none());

    intents.send(Intent::GoTo(5)).await.unwrap();
    wait_for(&mut snapshots, |s| s.current_position == 5).await;

    drop(intents);
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

    assert_eq!(snapshots.borrow().status, ReaderStatus::Empty);
    assert_eq!(renderer.open_handles(), 0);
}

#[tokio::test]
async fn test_rejected_open_keeps_running() {
    let renderer = Arc::new(SimulatedPdf::new(2));
    let controller = ReaderController::paged(Arc::clone(&renderer), ReaderConfig::default());

    let (intents, intents_rx) = mpsc::channel(4);
    let (snapshots_tx, mut snapshots) = watch::channel(controller.snapshot());
    let task = tokio::spawn(controller.run(intents_rx, snapshots_tx));

    intents
        .send(Intent::Open(SourceInput::remote("file:///etc/passwd")))
        .await
        .unwrap();
    intents
        .send(Intent::Open(SourceInput::remote("https://example.com/a.pdf")))
        .await
        .unwrap();

    let ready = wait_for(&mut snapshots, |s| s.status == ReaderStatus::Ready).await;
    assert!(ready.error_message.is_none());

    drop(intents);
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
}
