//! Liked-post set shared by every view.
//! Local state answers immediately; the
//! likes store is written behind it for
//! signed-in viewers.
use std::collections::{
  HashMap,
  HashSet
};
use std::sync::{
  Arc,
  Mutex,
  MutexGuard,
  PoisonError
};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{
  debug,
  warn
};

use crate::app::anonymous::AnonymousState;
use crate::app::context::ViewerContext;
use crate::domain::model::{
  Post,
  Viewer
};
use crate::error::PipelineError;
use crate::ports::store::LikeStore;

struct LikeState {
  viewer: Viewer,
  ids:    HashSet<String>,
  /// Newest first.
  posts:  Vec<Post>,
  /// Tail of the write chain per post
  /// id. A write starts only after the
  /// previous one for the same post has
  /// finished.
  writes: HashMap<String, WriteLink>,
  seq:    u64
}

struct WriteLink {
  seq:  u64,
  done: oneshot::Receiver<()>
}

/// Remote write queued behind the
/// previous one for the same post.
struct ChainedWrite {
  user_id:  String,
  seq:      u64,
  previous: Option<oneshot::Receiver<()>>
}

/// Result of a toggle. `write` is the
/// spawned store call for signed-in
/// viewers; dropping it does not cancel
/// the write.
#[derive(Debug)]
pub struct Toggle {
  pub liked: bool,
  pub write: Option<JoinHandle<()>>
}

#[derive(Clone)]
pub struct LikeController {
  store:     Arc<dyn LikeStore>,
  anonymous: AnonymousState,
  state:     Arc<Mutex<LikeState>>
}

impl LikeController {
  pub fn new(ctx: &ViewerContext) -> Self {
    Self {
      store: Arc::clone(&ctx.likes),
      anonymous: AnonymousState::new(
        Arc::clone(&ctx.local)
      ),
      state: Arc::new(Mutex::new(
        LikeState {
          viewer: Viewer::Anonymous,
          ids:    HashSet::new(),
          posts:  Vec::new(),
          writes: HashMap::new(),
          seq:    0
        }
      ))
    }
  }

  fn lock(
    &self
  ) -> MutexGuard<'_, LikeState> {
    lock_state(&self.state)
  }

  /// Loads the like set for `viewer`,
  /// replacing whatever was cached.
  /// Signed-in viewers read the store;
  /// anonymous viewers read local state.
  /// A store failure leaves an empty set
  /// and is returned to the caller.
  pub async fn load(
    &self,
    viewer: Viewer
  ) -> Result<usize, PipelineError> {
    let (posts, result) =
      match viewer.user_id() {
        | Some(user_id) => {
          match self
            .store
            .list_likes(user_id)
            .await
          {
            | Ok(posts) => (posts, Ok(())),
            | Err(e) => {
              warn!(error = %e, "likes unavailable, starting empty");
              (
                Vec::new(),
                Err(PipelineError::from(e))
              )
            }
          }
        }
        | None => {
          (self.anonymous.likes(), Ok(()))
        }
      };

    let mut guard = self.lock();
    guard.ids = posts
      .iter()
      .map(|p| p.id.clone())
      .collect();
    guard.posts = posts;
    guard.viewer = viewer;

    let count = guard.posts.len();
    debug!(count, "likes loaded");
    result.map(|()| count)
  }

  pub fn viewer(&self) -> Viewer {
    self.lock().viewer.clone()
  }

  pub fn is_liked(
    &self,
    post_id: &str
  ) -> bool {
    self.lock().ids.contains(post_id)
  }

  pub fn liked_posts(&self) -> Vec<Post> {
    self.lock().posts.clone()
  }

  /// Flips the like state of `post` in
  /// memory right away, then persists
  /// it. Writes for the same post reach
  /// the store in toggle order.
  ///
  /// A failed store write is logged and
  /// the local state is kept; the next
  /// `load` brings the set back in line
  /// with the store.
  pub fn toggle_like(
    &self,
    post: &Post
  ) -> Toggle {
    let Ok(runtime) =
      tokio::runtime::Handle::try_current()
    else {
      let (liked, _) =
        self.flip(post, None);

      if self.viewer().user_id().is_some()
      {
        warn!(post_id = %post.id, "no async runtime, like not persisted");
      }

      return Toggle {
        liked,
        write: None
      };
    };

    let (done_tx, done_rx) =
      oneshot::channel();

    let (liked, chained) =
      self.flip(post, Some(done_rx));

    let Some(ChainedWrite {
      user_id,
      seq,
      previous
    }) = chained
    else {
      return Toggle {
        liked,
        write: None
      };
    };

    let store = Arc::clone(&self.store);
    let state = Arc::clone(&self.state);
    let post = post.clone();

    let write = runtime.spawn(async move {
      if let Some(previous) = previous {
        // Err only means the previous
        // writer is gone; either way it
        // no longer runs.
        let _ = previous.await;
      }

      let result = if liked {
        store
          .upsert_like(&user_id, &post)
          .await
      } else {
        store
          .delete_like(&user_id, &post.id)
          .await
      };

      match result {
        | Ok(()) => {
          debug!(post_id = %post.id, liked, "like persisted")
        }
        | Err(e) => {
          warn!(post_id = %post.id, liked, error = %e, "like write failed")
        }
      }

      let _ = done_tx.send(());

      let mut guard = lock_state(&state);

      if guard
        .writes
        .get(&post.id)
        .is_some_and(|link| link.seq == seq)
      {
        guard.writes.remove(&post.id);
      }
    });

    Toggle {
      liked,
      write: Some(write)
    }
  }

  /// Applies the optimistic update. For
  /// signed-in viewers `done` becomes the
  /// new tail of the post's write chain.
  fn flip(
    &self,
    post: &Post,
    done: Option<oneshot::Receiver<()>>
  ) -> (bool, Option<ChainedWrite>) {
    let mut guard = self.lock();

    let liked = if guard.ids.remove(&post.id)
    {
      guard
        .posts
        .retain(|p| p.id != post.id);
      false
    } else {
      guard.ids.insert(post.id.clone());
      guard.posts.insert(0, post.clone());
      true
    };

    let Some(user_id) = guard
      .viewer
      .user_id()
      .map(str::to_string)
    else {
      self
        .anonymous
        .save_likes(&guard.posts);
      return (liked, None);
    };

    let Some(done) = done else {
      return (liked, None);
    };

    guard.seq += 1;
    let seq = guard.seq;

    let previous = guard
      .writes
      .insert(post.id.clone(), WriteLink {
        seq,
        done
      })
      .map(|link| link.done);

    (
      liked,
      Some(ChainedWrite {
        user_id,
        seq,
        previous
      })
    )
  }
}

fn lock_state(
  state: &Mutex<LikeState>
) -> MutexGuard<'_, LikeState> {
  state
    .lock()
    .unwrap_or_else(PoisonError::into_inner)
}
