//! Feed pipeline: fetches pages for one
//! target, keeps displayable and unseen
//! posts, tracks the active post and
//! records seen ids.
//!
//! The pipeline is a cheap cloneable
//! handle. State lives behind a mutex
//! that is never held across an await;
//! a busy flag drops overlapping fetches
//! and a session generation rejects
//! responses that arrive after `start`
//! switched targets.
use std::collections::HashSet;
use std::sync::{
  Arc,
  Mutex,
  MutexGuard,
  PoisonError
};
use std::time::Duration;

use tracing::{
  debug,
  info,
  warn
};

use crate::app::anonymous::AnonymousState;
use crate::app::context::ViewerContext;
use crate::app::seen::SeenFlusher;
use crate::domain::backoff::compute_retry_delay;
use crate::domain::model::{
  FeedTarget,
  Listing,
  ListingQuery,
  ListingSort,
  Post,
  Viewer
};
use crate::error::{
  PipelineError,
  SourceError
};
use crate::ports::clock::Clock;
use crate::ports::content::ContentSource;
use crate::ports::random::RandomSource;
use crate::ports::store::SeenStore;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
  pub page_limit:          u32,
  pub prefetch_threshold:  usize,
  pub retry_attempts:      u32,
  pub retry_base:          Duration,
  pub retry_max:           Duration,
  pub jitter_fraction:     f64,
  pub rate_limit_cooldown: Duration,
  pub seen_flush_debounce: Duration,
  pub sort:                ListingSort,
  pub include_nsfw:        bool
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      page_limit:          25,
      prefetch_threshold:  3,
      retry_attempts:      3,
      retry_base: Duration::from_secs(1),
      retry_max:  Duration::from_secs(8),
      jitter_fraction:     0.2,
      rate_limit_cooldown:
        Duration::from_secs(300),
      seen_flush_debounce:
        Duration::from_secs(3),
      sort:                ListingSort::Hot,
      include_nsfw:        false
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedPhase {
  Idle,
  Fetching,
  Ready,
  Exhausted,
  /// Upstream kept refusing; fetches
  /// are suppressed until `until_ms`.
  Throttled {
    until_ms: i64
  },
  /// Retries ran out. Loaded posts are
  /// kept and the next fetch retries.
  Failed(PipelineError)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
  /// Posts appended by this call; zero
  /// after a malformed page.
  Appended(usize),
  /// Another fetch is in flight; this
  /// call was dropped.
  Busy,
  Exhausted,
  Throttled {
    until_ms: i64
  },
  Failed(PipelineError),
  /// The target changed while the
  /// request was outstanding.
  Stale,
  /// No target has been started.
  Idle
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvanceOutcome {
  pub active_index: usize,
  pub moved:        bool,
  pub newly_seen:   bool,
  pub prefetch:     Option<FetchOutcome>
}

/// Owned copy of the pipeline state for
/// rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSnapshot {
  pub target:       Option<FeedTarget>,
  pub posts:        Vec<Post>,
  pub active_index: usize,
  pub phase:        FeedPhase,
  pub seen_count:   usize,
  pub has_more:     bool,
  /// Set by a malformed or failed page,
  /// cleared by the next good one.
  pub last_error:   Option<PipelineError>
}

struct FeedState {
  viewer:          Viewer,
  target:          Option<FeedTarget>,
  generation:      u64,
  posts:           Vec<Post>,
  loaded_ids:      HashSet<String>,
  seen:            HashSet<String>,
  cursor:          Option<String>,
  active:          usize,
  phase:           FeedPhase,
  busy:            bool,
  exhausted:       bool,
  last_error:      Option<PipelineError>,
  /// Upstream-wide; survives `start`.
  throttled_until: Option<i64>
}

impl FeedState {
  fn new(viewer: Viewer) -> Self {
    Self {
      viewer,
      target: None,
      generation: 0,
      posts: Vec::new(),
      loaded_ids: HashSet::new(),
      seen: HashSet::new(),
      cursor: None,
      active: 0,
      phase: FeedPhase::Idle,
      busy: false,
      exhausted: false,
      last_error: None,
      throttled_until: None
    }
  }

  fn reset_for(
    &mut self,
    target: FeedTarget
  ) {
    self.generation += 1;
    self.target = Some(target);
    self.posts.clear();
    self.loaded_ids.clear();
    self.seen.clear();
    self.cursor = None;
    self.active = 0;
    self.phase = FeedPhase::Idle;
    self.busy = false;
    self.exhausted = false;
    self.last_error = None;
  }

  /// Returns the cooldown end when
  /// fetches are still suppressed at
  /// `now_ms`, reporting it as the
  /// phase. An expired cooldown is
  /// cleared.
  fn active_cooldown(
    &mut self,
    now_ms: i64
  ) -> Option<i64> {
    let until_ms =
      self.throttled_until?;

    if now_ms >= until_ms {
      self.throttled_until = None;
      return None;
    }

    self.phase =
      FeedPhase::Throttled { until_ms };

    Some(until_ms)
  }

  /// Keeps displayable posts that are
  /// neither seen nor already loaded.
  fn append_page(
    &mut self,
    listing: Listing
  ) -> usize {
    let mut kept = 0;

    for post in listing.posts {
      if !post.media.is_displayable()
        || self.seen.contains(&post.id)
      {
        continue;
      }

      if !self
        .loaded_ids
        .insert(post.id.clone())
      {
        continue;
      }

      self.posts.push(post);
      kept += 1;
    }

    kept
  }
}

struct PipelineShared {
  source:     Arc<dyn ContentSource>,
  seen_store: Arc<dyn SeenStore>,
  anonymous:  AnonymousState,
  clock:      Arc<dyn Clock>,
  rng:        Arc<dyn RandomSource>,
  flusher:    SeenFlusher,
  config:     PipelineConfig,
  state:      Mutex<FeedState>
}

impl Drop for PipelineShared {
  fn drop(&mut self) {
    self.flusher.flush_in_background();
  }
}

#[derive(Clone)]
pub struct FeedPipeline {
  shared: Arc<PipelineShared>
}

/// A post that just became active and
/// has not been recorded yet.
struct SeenMark {
  viewer:   Viewer,
  feed_key: String,
  post_id:  String
}

impl FeedPipeline {
  pub fn new(
    ctx: &ViewerContext,
    viewer: Viewer,
    config: PipelineConfig
  ) -> Self {
    let flusher = SeenFlusher::new(
      Arc::clone(&ctx.seen),
      config.seen_flush_debounce
    );

    Self {
      shared: Arc::new(PipelineShared {
        source: Arc::clone(&ctx.source),
        seen_store: Arc::clone(&ctx.seen),
        anonymous: AnonymousState::new(
          Arc::clone(&ctx.local)
        ),
        clock: Arc::clone(&ctx.clock),
        rng: Arc::clone(&ctx.rng),
        flusher,
        config,
        state: Mutex::new(FeedState::new(
          viewer
        ))
      })
    }
  }

  fn lock(
    &self
  ) -> MutexGuard<'_, FeedState> {
    self
      .shared
      .state
      .lock()
      .unwrap_or_else(
        PoisonError::into_inner
      )
  }

  /// Sign-in/out event. Pending seen ids
  /// of the previous viewer are sent;
  /// the new viewer applies from the
  /// next `start`.
  pub fn set_viewer(
    &self,
    viewer: Viewer
  ) {
    let mut guard = self.lock();

    if guard.viewer != viewer {
      self
        .shared
        .flusher
        .flush_in_background();
      guard.viewer = viewer;
    }
  }

  pub fn viewer(&self) -> Viewer {
    self.lock().viewer.clone()
  }

  /// Drops everything loaded so far,
  /// loads the seen set for the target
  /// and fetches the first page. The
  /// seen set is in place before any
  /// post of the new session is
  /// exposed.
  ///
  /// A second `start` for the target
  /// already being loaded is dropped as
  /// `Busy`. A running upstream cooldown
  /// carries over to the new target.
  pub async fn start(
    &self,
    target: FeedTarget
  ) -> FetchOutcome {
    let (viewer, feed_key, generation) = {
      let mut guard = self.lock();

      if guard.busy
        && guard.target.as_ref()
          == Some(&target)
      {
        debug!(target = %target, "feed already loading, dropping start");
        return FetchOutcome::Busy;
      }

      if guard.target.as_ref()
        != Some(&target)
      {
        self
          .shared
          .flusher
          .flush_in_background();
      }

      guard.reset_for(target.clone());
      guard.busy = true;
      guard.phase = FeedPhase::Fetching;

      (
        guard.viewer.clone(),
        target.feed_key(),
        guard.generation
      )
    };

    info!(target = %target, feed_key = %feed_key, "feed start");

    self
      .load_seen_ids(
        viewer.user_id(),
        &feed_key
      )
      .await;

    let now_ms = self
      .shared
      .clock
      .now_epoch_ms()
      .await;

    {
      let mut guard = self.lock();

      if guard.generation != generation {
        return FetchOutcome::Stale;
      }

      if let Some(until_ms) =
        guard.active_cooldown(now_ms)
      {
        info!(target = %target, until_ms, "upstream cooling down, first page deferred");
        guard.busy = false;
        return FetchOutcome::Throttled {
          until_ms
        };
      }
    }

    self
      .run_fetch(generation, target, None)
      .await
  }

  /// Replaces the in-memory seen set
  /// with the authoritative one: the
  /// store for signed-in viewers, local
  /// state otherwise. Store failures
  /// degrade to an empty set. Returns
  /// the number of ids loaded.
  pub async fn load_seen_ids(
    &self,
    user_id: Option<&str>,
    feed_key: &str
  ) -> usize {
    let generation =
      self.lock().generation;

    let ids = match user_id {
      | Some(user_id) => {
        match self
          .shared
          .seen_store
          .list_seen_ids(user_id, feed_key)
          .await
        {
          | Ok(ids) => ids,
          | Err(e) => {
            warn!(feed_key, error = %e, "seen ids unavailable, continuing without");
            HashSet::new()
          }
        }
      }
      | None => {
        self
          .shared
          .anonymous
          .seen_ids(feed_key)
      }
    };

    let mut guard = self.lock();

    if guard.generation != generation {
      debug!(feed_key, "discarding seen ids for a replaced session");
      return 0;
    }

    let count = ids.len();
    guard.seen = ids;
    debug!(feed_key, count, "seen ids loaded");
    count
  }

  /// Requests pages after the current
  /// cursor until at least one post
  /// survives filtering or the cursor
  /// runs out.
  pub async fn fetch_next_page(
    &self
  ) -> FetchOutcome {
    let now_ms = self
      .shared
      .clock
      .now_epoch_ms()
      .await;

    let (generation, target, cursor) = {
      let mut guard = self.lock();

      let Some(target) =
        guard.target.clone()
      else {
        return FetchOutcome::Idle;
      };

      if guard.busy {
        debug!(target = %target, "fetch already in flight, dropping trigger");
        return FetchOutcome::Busy;
      }

      if guard.exhausted {
        return FetchOutcome::Exhausted;
      }

      if let Some(until_ms) =
        guard.active_cooldown(now_ms)
      {
        return FetchOutcome::Throttled {
          until_ms
        };
      }

      guard.busy = true;
      guard.phase = FeedPhase::Fetching;

      (
        guard.generation,
        target,
        guard.cursor.clone()
      )
    };

    self
      .run_fetch(generation, target, cursor)
      .await
  }

  /// Page loop shared by `start` and
  /// `fetch_next_page`. The caller has
  /// already claimed the busy flag for
  /// `generation`.
  async fn run_fetch(
    &self,
    generation: u64,
    target: FeedTarget,
    mut cursor: Option<String>
  ) -> FetchOutcome {
    let mut appended = 0;

    loop {
      let result = self
        .fetch_with_retry(
          &target,
          cursor.clone(),
          generation
        )
        .await;

      let now_ms = self
        .shared
        .clock
        .now_epoch_ms()
        .await;

      let mut guard = self.lock();

      if guard.generation != generation {
        debug!(target = %target, "rejecting stale listing response");
        return FetchOutcome::Stale;
      }

      match result {
        | Ok(listing) => {
          let next = listing.after.clone();
          let raw = listing.posts.len();
          let was_empty =
            guard.posts.is_empty();
          let kept =
            guard.append_page(listing);

          appended += kept;
          guard.cursor = next.clone();
          guard.last_error = None;

          debug!(target = %target, raw, kept, has_more = next.is_some(), "page applied");

          let first_mark =
            if was_empty && kept > 0 {
              self.mark_active(&mut guard)
            } else {
              None
            };

          if next.is_none() {
            guard.exhausted = true;
          }

          if appended > 0 || next.is_none()
          {
            guard.busy = false;
            guard.phase = if guard.exhausted
            {
              FeedPhase::Exhausted
            } else {
              FeedPhase::Ready
            };

            drop(guard);

            if let Some(mark) = first_mark {
              self.record_seen(mark);
            }

            return if appended > 0 {
              FetchOutcome::Appended(
                appended
              )
            } else {
              FetchOutcome::Exhausted
            };
          }

          debug!(target = %target, "page filtered out entirely, reading ahead");
          cursor = next;
        }
        | Err(SourceError::Malformed(
          msg
        )) => {
          warn!(target = %target, error = %msg, "malformed page treated as empty");
          guard.busy = false;
          guard.phase = FeedPhase::Ready;
          guard.last_error = Some(
            PipelineError::MalformedResponse(
              msg
            )
          );
          return FetchOutcome::Appended(
            appended
          );
        }
        | Err(SourceError::NotFound(
          msg
        )) => {
          warn!(target = %target, error = %msg, "feed not found, nothing more to load");
          guard.busy = false;
          guard.exhausted = true;
          guard.phase = FeedPhase::Exhausted;
          return FetchOutcome::Exhausted;
        }
        | Err(SourceError::RateLimited {
          retry_after_secs
        }) => {
          let cooldown = self
            .shared
            .config
            .rate_limit_cooldown
            .as_millis()
            as i64;
          let hinted = retry_after_secs
            .unwrap_or(0)
            .saturating_mul(1000)
            as i64;
          let until_ms =
            now_ms + cooldown.max(hinted);

          warn!(target = %target, until_ms, "upstream throttling, cooling down");
          guard.busy = false;
          guard.throttled_until =
            Some(until_ms);
          guard.phase =
            FeedPhase::Throttled { until_ms };
          return FetchOutcome::Throttled {
            until_ms
          };
        }
        | Err(SourceError::Unavailable(
          msg
        )) => {
          let err =
            PipelineError::UpstreamUnavailable(
              msg
            );
          warn!(target = %target, error = %err, loaded = guard.posts.len(), "fetch failed after retries");
          guard.busy = false;
          guard.phase =
            FeedPhase::Failed(err.clone());
          guard.last_error =
            Some(err.clone());
          return FetchOutcome::Failed(err);
        }
      }
    }
  }

  /// Retries unavailable and throttled
  /// responses with exponential
  /// backoff. Other errors, and sessions
  /// replaced mid-retry, return
  /// immediately.
  async fn fetch_with_retry(
    &self,
    target: &FeedTarget,
    after: Option<String>,
    generation: u64
  ) -> Result<Listing, SourceError> {
    let config = &self.shared.config;

    let query = ListingQuery {
      sort: config.sort,
      limit: config.page_limit,
      after,
      include_nsfw: config.include_nsfw
    };

    let attempts =
      config.retry_attempts.max(1);
    let mut attempt = 0;

    loop {
      let result = self
        .shared
        .source
        .fetch_listing(target, &query)
        .await;

      let retryable = matches!(
        result,
        Err(SourceError::Unavailable(_))
          | Err(
            SourceError::RateLimited { .. }
          )
      );

      attempt += 1;

      if !retryable
        || attempt >= attempts
        || self.lock().generation
          != generation
      {
        return result;
      }

      let rand =
        self.shared.rng.next_f64().await;

      let delay = compute_retry_delay(
        config.retry_base,
        attempt - 1,
        config.retry_max,
        config.jitter_fraction,
        rand
      );

      if let Err(e) = &result {
        debug!(target = %target, attempt, delay_ms = delay.total.as_millis() as u64, error = %e, "retrying listing fetch");
      }

      tokio::time::sleep(delay.total)
        .await;
    }
  }

  /// Moves the active post by one step,
  /// clamped to the loaded range. The
  /// post that becomes active is
  /// recorded as seen once; nearing the
  /// end of the loaded list reads the
  /// next page ahead.
  pub async fn advance(
    &self,
    direction: i32
  ) -> AdvanceOutcome {
    let (outcome, mark, prefetch) = {
      let mut guard = self.lock();
      let len = guard.posts.len();

      if len == 0 {
        return AdvanceOutcome {
          active_index: 0,
          moved:        false,
          newly_seen:   false,
          prefetch:     None
        };
      }

      let current =
        guard.active.min(len - 1);

      let next = match direction.signum()
      {
        | 1 => (current + 1).min(len - 1),
        | -1 => current.saturating_sub(1),
        | _ => current
      };

      let moved = next != current;
      guard.active = next;

      let mark = if moved {
        self.mark_active(&mut guard)
      } else {
        None
      };

      let near_end = next
        + self
          .shared
          .config
          .prefetch_threshold
        >= len;
      let prefetch =
        near_end && !guard.exhausted;

      (
        AdvanceOutcome {
          active_index: next,
          moved,
          newly_seen: mark.is_some(),
          prefetch: None
        },
        mark,
        prefetch
      )
    };

    if let Some(mark) = mark {
      self.record_seen(mark);
    }

    if prefetch {
      return AdvanceOutcome {
        prefetch: Some(
          self.fetch_next_page().await
        ),
        ..outcome
      };
    }

    outcome
  }

  /// Adds the active post to the
  /// in-memory seen set, returning what
  /// still needs to be recorded outside
  /// the lock.
  fn mark_active(
    &self,
    guard: &mut FeedState
  ) -> Option<SeenMark> {
    let post_id = guard
      .posts
      .get(guard.active)?
      .id
      .clone();

    if !guard.seen.insert(post_id.clone())
    {
      return None;
    }

    let feed_key =
      guard.target.as_ref()?.feed_key();

    Some(SeenMark {
      viewer: guard.viewer.clone(),
      feed_key,
      post_id
    })
  }

  fn record_seen(&self, mark: SeenMark) {
    match mark.viewer.user_id() {
      | Some(user_id) => {
        self.shared.flusher.enqueue(
          user_id,
          &mark.feed_key,
          &mark.post_id
        )
      }
      | None => {
        self.shared.anonymous.add_seen(
          &mark.feed_key,
          std::slice::from_ref(
            &mark.post_id
          )
        )
      }
    }
  }

  /// Sends the accumulated seen batch
  /// now and waits for the store.
  pub async fn flush_seen_batch(
    &self
  ) -> Result<usize, PipelineError> {
    self.shared.flusher.flush_now().await
  }

  pub fn pending_seen(&self) -> usize {
    self.shared.flusher.pending_count()
  }

  /// Leaves the feed: pending seen ids
  /// are sent without waiting and any
  /// in-flight response will be
  /// rejected.
  pub fn teardown(&self) {
    self
      .shared
      .flusher
      .flush_in_background();

    let mut guard = self.lock();
    guard.generation += 1;
    guard.target = None;
    guard.busy = false;
    guard.phase = FeedPhase::Idle;
  }

  pub fn phase(&self) -> FeedPhase {
    self.lock().phase.clone()
  }

  pub fn active_post(
    &self
  ) -> Option<Post> {
    let guard = self.lock();
    guard.posts.get(guard.active).cloned()
  }

  pub fn posts(&self) -> Vec<Post> {
    self.lock().posts.clone()
  }

  pub fn snapshot(&self) -> FeedSnapshot {
    let guard = self.lock();

    FeedSnapshot {
      target:       guard.target.clone(),
      posts:        guard.posts.clone(),
      active_index: guard.active,
      phase:        guard.phase.clone(),
      seen_count:   guard.seen.len(),
      has_more:     !guard.exhausted,
      last_error:   guard
        .last_error
        .clone()
    }
  }
}
