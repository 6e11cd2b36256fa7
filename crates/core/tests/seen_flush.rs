mod common;

use std::time::Duration;

use common::{Harness, fast_config, image, listing};
use swipefeed_core::app::pipeline::FeedPipeline;
use swipefeed_core::app::seen::SeenFlusher;
use swipefeed_core::domain::model::{FeedTarget, Viewer};

#[tokio::test(start_paused = true)]
async fn seen_batch_waits_for_quiet_period() {
    let h = Harness::new();
    let flusher = SeenFlusher::new(h.seen.clone(), Duration::from_secs(3));

    flusher.enqueue("u1", "r:memes", "p1");
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(h.seen.batches().is_empty());

    flusher.enqueue("u1", "r:memes", "p2");
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(h.seen.batches().is_empty(), "timer is reset by each new id");

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(
        h.seen.batches(),
        vec![vec!["p1".to_string(), "p2".to_string()]]
    );
    assert_eq!(flusher.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn duplicate_ids_are_sent_once() {
    let h = Harness::new();
    let flusher = SeenFlusher::new(h.seen.clone(), Duration::from_secs(3));

    flusher.enqueue("u1", "r:memes", "p1");
    flusher.enqueue("u1", "r:memes", "p1");
    flusher.enqueue("u1", "u:someone", "p1");
    assert_eq!(flusher.pending_count(), 2);

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(h.seen.batches().len(), 2);
    assert_eq!(h.seen.inner.seen_records("u1", "r:memes").len(), 1);
    assert_eq!(h.seen.inner.seen_records("u1", "u:someone").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn pipeline_flushes_after_debounce() {
    let h = Harness::new();
    let memes = FeedTarget::subreddit("memes");
    h.source.page(
        &memes,
        None,
        listing(
            vec![image("p1"), image("p2"), image("p3"), image("p4"), image("p5")],
            Some("c1"),
        ),
    );
    let pipeline = FeedPipeline::new(
        &h.context(),
        Viewer::SignedIn("u1".into()),
        fast_config(),
    );
    pipeline.start(memes.clone()).await;
    pipeline.advance(1).await;

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.seen.batches().is_empty());

    tokio::time::sleep(Duration::from_secs(3)).await;
    let records = h.seen.inner.seen_records("u1", &memes.feed_key());
    let ids: Vec<_> = records.into_iter().map(|r| r.post_id).collect();
    assert_eq!(ids, vec!["p1", "p2"]);
    assert_eq!(pipeline.pending_seen(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_pipeline_sends_pending_ids() {
    let h = Harness::new();
    let memes = FeedTarget::subreddit("memes");
    h.source
        .page(&memes, None, listing(vec![image("p1")], None));
    let pipeline = FeedPipeline::new(
        &h.context(),
        Viewer::SignedIn("u1".into()),
        fast_config(),
    );
    pipeline.start(memes.clone()).await;
    drop(pipeline);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.seen.inner.seen_records("u1", &memes.feed_key()).len(), 1);
}
