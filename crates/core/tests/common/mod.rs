#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use swipefeed_core::app::context::ViewerContext;
use swipefeed_core::app::pipeline::PipelineConfig;
use swipefeed_core::domain::model::{FeedTarget, Listing, ListingQuery, MediaKind, Post};
use swipefeed_core::error::{SourceError, StoreError};
use swipefeed_core::infra::local_file::MemoryLocalState;
use swipefeed_core::infra::memory_store::MemoryStore;
use swipefeed_core::ports::clock::Clock;
use swipefeed_core::ports::content::ContentSource;
use swipefeed_core::ports::random::RandomSource;
use swipefeed_core::ports::store::{LikeStore, SeenStore};
use tokio::sync::Notify;

pub fn post(id: &str, media: MediaKind) -> Post {
    Post {
        id: id.to_string(),
        title: format!("post {id}"),
        author: "tester".to_string(),
        subreddit: "memes".to_string(),
        permalink: format!("/r/memes/comments/{id}"),
        created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        score: 1,
        nsfw: false,
        media,
    }
}

pub fn image(id: &str) -> Post {
    post(
        id,
        MediaKind::Image {
            url: format!("https://i.example/{id}.jpg"),
        },
    )
}

pub fn video(id: &str) -> Post {
    post(
        id,
        MediaKind::Video {
            url: format!("https://v.example/{id}.mp4"),
            poster: None,
        },
    )
}

pub fn text(id: &str) -> Post {
    post(
        id,
        MediaKind::Text {
            body: "words".to_string(),
        },
    )
}

pub fn listing(posts: Vec<Post>, after: Option<&str>) -> Listing {
    Listing {
        posts,
        after: after.map(str::to_string),
    }
}

pub fn ids(posts: &[Post]) -> Vec<String> {
    posts.iter().map(|p| p.id.clone()).collect()
}

type PageKey = (String, Option<String>);

/// Content source answering from per-(feed, cursor) queues. The last queued
/// response for a key repeats once the queue would run dry.
#[derive(Default)]
pub struct ScriptedSource {
    pages: Mutex<HashMap<PageKey, VecDeque<Result<Listing, SourceError>>>>,
    calls: AtomicUsize,
    requested: Mutex<Vec<PageKey>>,
    hold: Mutex<Option<Arc<Notify>>>,
    pub entered: Notify,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(
        &self,
        target: &FeedTarget,
        after: Option<&str>,
        response: Result<Listing, SourceError>,
    ) {
        self.pages
            .lock()
            .unwrap()
            .entry((target.feed_key(), after.map(str::to_string)))
            .or_default()
            .push_back(response);
    }

    pub fn page(&self, target: &FeedTarget, after: Option<&str>, listing: Listing) {
        self.respond(target, after, Ok(listing));
    }

    /// The next request blocks until the returned gate is notified.
    pub fn hold_next(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<PageKey> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ContentSource for ScriptedSource {
    async fn fetch_listing(
        &self,
        target: &FeedTarget,
        query: &ListingQuery,
    ) -> Result<Listing, SourceError> {
        let key = (target.feed_key(), query.after.clone());
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(key.clone());

        let gate = self.hold.lock().unwrap().take();
        self.entered.notify_one();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut pages = self.pages.lock().unwrap();
        match pages.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Err(SourceError::Unavailable(format!("unscripted page {key:?}"))),
        }
    }
}

pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicI64::new(start_ms),
        })
    }

    pub fn advance_ms(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Clock for ManualClock {
    async fn now_epoch_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

pub struct FixedRng(pub f64);

#[async_trait::async_trait]
impl RandomSource for FixedRng {
    async fn next_f64(&self) -> f64 {
        self.0
    }
}

/// Seen store that records every batch and can be switched to fail.
#[derive(Default)]
pub struct RecordingSeenStore {
    pub inner: MemoryStore,
    pub batches: Mutex<Vec<Vec<String>>>,
    pub fail: std::sync::atomic::AtomicBool,
}

impl RecordingSeenStore {
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl SeenStore for RecordingSeenStore {
    async fn list_seen_ids(
        &self,
        user_id: &str,
        feed_key: &str,
    ) -> Result<HashSet<String>, StoreError> {
        self.inner.list_seen_ids(user_id, feed_key).await
    }

    async fn upsert_seen_batch(
        &self,
        user_id: &str,
        feed_key: &str,
        post_ids: &[String],
    ) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("seen store down".into()));
        }
        self.batches.lock().unwrap().push(post_ids.to_vec());
        self.inner.upsert_seen_batch(user_id, feed_key, post_ids).await
    }
}

pub struct Harness {
    pub source: Arc<ScriptedSource>,
    pub likes: Arc<MemoryStore>,
    pub seen: Arc<RecordingSeenStore>,
    pub local: Arc<MemoryLocalState>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            source: ScriptedSource::new(),
            likes: Arc::new(MemoryStore::new()),
            seen: Arc::new(RecordingSeenStore::default()),
            local: Arc::new(MemoryLocalState::new()),
            clock: ManualClock::new(1_000_000),
        }
    }

    pub fn context(&self) -> ViewerContext {
        ViewerContext {
            source: self.source.clone(),
            likes: self.likes.clone(),
            seen: self.seen.clone(),
            local: self.local.clone(),
            clock: self.clock.clone(),
            rng: Arc::new(FixedRng(0.5)),
        }
    }
}

/// No retry sleeps, default everything else.
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        retry_base: Duration::ZERO,
        retry_max: Duration::ZERO,
        ..PipelineConfig::default()
    }
}

pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
