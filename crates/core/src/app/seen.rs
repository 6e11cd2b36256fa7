//! Debounced batching of seen ids for
//! signed-in viewers.
//!
//! Every enqueue cancels the pending
//! timer and arms a new one; the batch
//! is written once the viewer has been
//! idle for the debounce window.
//! Teardown sends whatever is pending
//! without waiting for the result.
use std::sync::{
  Arc,
  Mutex,
  MutexGuard,
  PoisonError
};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{
  debug,
  warn
};

use crate::error::PipelineError;
use crate::ports::store::SeenStore;

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingBatch {
  user_id:  String,
  feed_key: String,
  post_ids: Vec<String>
}

#[derive(Default)]
struct FlushState {
  pending: Vec<PendingBatch>,
  timer:   Option<JoinHandle<()>>
}

#[derive(Clone)]
pub struct SeenFlusher {
  store:    Arc<dyn SeenStore>,
  debounce: Duration,
  state:    Arc<Mutex<FlushState>>
}

impl SeenFlusher {
  pub fn new(
    store: Arc<dyn SeenStore>,
    debounce: Duration
  ) -> Self {
    Self {
      store,
      debounce,
      state: Arc::new(Mutex::new(
        FlushState::default()
      ))
    }
  }

  fn lock(
    &self
  ) -> MutexGuard<'_, FlushState> {
    self
      .state
      .lock()
      .unwrap_or_else(
        PoisonError::into_inner
      )
  }

  pub fn pending_count(&self) -> usize {
    self
      .lock()
      .pending
      .iter()
      .map(|b| b.post_ids.len())
      .sum()
  }

  pub fn enqueue(
    &self,
    user_id: &str,
    feed_key: &str,
    post_id: &str
  ) {
    let mut guard = self.lock();

    push_ids(
      &mut guard.pending,
      user_id,
      feed_key,
      std::iter::once(post_id.to_string())
    );

    if let Some(timer) = guard.timer.take()
    {
      timer.abort();
    }

    let Ok(handle) =
      tokio::runtime::Handle::try_current()
    else {
      warn!("no async runtime, seen batch waits for an explicit flush");
      return;
    };

    let flusher = self.clone();
    let debounce = self.debounce;

    guard.timer =
      Some(handle.spawn(async move {
        tokio::time::sleep(debounce).await;

        if let Err(e) =
          flusher.flush_now().await
        {
          warn!(error = %e, "debounced seen flush failed");
        }
      }));
  }

  /// Writes every pending batch and
  /// waits for the store.
  ///
  /// Ids from failed batches are
  /// re-queued for the next flush; no
  /// timer is armed for them.
  pub async fn flush_now(
    &self
  ) -> Result<usize, PipelineError> {
    let batches = {
      let mut guard = self.lock();
      guard.timer = None;
      std::mem::take(&mut guard.pending)
    };

    let mut written = 0;
    let mut first_error = None;

    for batch in batches {
      match self
        .store
        .upsert_seen_batch(
          &batch.user_id,
          &batch.feed_key,
          &batch.post_ids
        )
        .await
      {
        | Ok(()) => {
          debug!(feed_key = %batch.feed_key, count = batch.post_ids.len(), "seen batch written");
          written += batch.post_ids.len();
        }
        | Err(e) => {
          warn!(feed_key = %batch.feed_key, count = batch.post_ids.len(), error = %e, "seen batch write failed");

          let mut guard = self.lock();

          push_ids(
            &mut guard.pending,
            &batch.user_id,
            &batch.feed_key,
            batch.post_ids.into_iter()
          );

          first_error.get_or_insert(
            PipelineError::from(e)
          );
        }
      }
    }

    match first_error {
      | Some(e) => Err(e),
      | None => Ok(written)
    }
  }

  /// Fire-and-forget send of everything
  /// pending. Never blocks the caller.
  pub fn flush_in_background(&self) {
    let batches = {
      let mut guard = self.lock();

      if let Some(timer) =
        guard.timer.take()
      {
        timer.abort();
      }

      std::mem::take(&mut guard.pending)
    };

    if batches.is_empty() {
      return;
    }

    let Ok(handle) =
      tokio::runtime::Handle::try_current()
    else {
      warn!(batches = batches.len(), "no async runtime, dropping seen batch on teardown");
      return;
    };

    let store = Arc::clone(&self.store);

    handle.spawn(async move {
      for batch in batches {
        if let Err(e) = store
          .upsert_seen_batch(
            &batch.user_id,
            &batch.feed_key,
            &batch.post_ids
          )
          .await
        {
          warn!(feed_key = %batch.feed_key, error = %e, "teardown seen batch lost");
        }
      }
    });
  }
}

fn push_ids(
  pending: &mut Vec<PendingBatch>,
  user_id: &str,
  feed_key: &str,
  ids: impl Iterator<Item = String>
) {
  let idx = match pending.iter().position(
    |b| {
      b.user_id == user_id
        && b.feed_key == feed_key
    }
  ) {
    | Some(idx) => idx,
    | None => {
      pending.push(PendingBatch {
        user_id:  user_id.to_string(),
        feed_key: feed_key.to_string(),
        post_ids: Vec::new()
      });
      pending.len() - 1
    }
  };

  let batch = &mut pending[idx];

  for id in ids {
    if !batch.post_ids.contains(&id) {
      batch.post_ids.push(id);
    }
  }
}
