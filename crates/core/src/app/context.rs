use std::sync::Arc;

use crate::ports::clock::Clock;
use crate::ports::content::ContentSource;
use crate::ports::local::LocalState;
use crate::ports::random::RandomSource;
use crate::ports::store::{
  LikeStore,
  SeenStore
};

/// Collaborators shared by the feed
/// pipeline and the like controller.
#[derive(Clone)]
pub struct ViewerContext {
  pub source: Arc<dyn ContentSource>,
  pub likes:  Arc<dyn LikeStore>,
  pub seen:   Arc<dyn SeenStore>,
  pub local:  Arc<dyn LocalState>,
  pub clock:  Arc<dyn Clock>,
  pub rng:    Arc<dyn RandomSource>
}
