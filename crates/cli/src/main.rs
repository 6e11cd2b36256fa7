use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{
  Context,
  Result,
  anyhow,
  bail
};
use clap::{
  Parser,
  Subcommand
};
use swipefeed_core::app::context::ViewerContext;
use swipefeed_core::app::likes::LikeController;
use swipefeed_core::app::pipeline::{
  FeedPhase,
  FeedPipeline,
  FetchOutcome,
  PipelineConfig
};
use swipefeed_core::domain::model::{
  FeedTarget,
  ListingQuery,
  ListingSort,
  Post,
  Viewer
};
use swipefeed_core::infra::api_store::ApiStore;
use swipefeed_core::infra::http_source::HttpContentSource;
use swipefeed_core::infra::local_file::FileLocalState;
use swipefeed_core::infra::random::MutexRng;
use swipefeed_core::infra::system_clock::SystemClock;
use swipefeed_core::ports::content::ContentSource;
use tracing_subscriber::EnvFilter;

const USER_AGENT: &str =
  concat!("swipefeed-cli/", env!("CARGO_PKG_VERSION"));

/// Pages searched by `like` before
/// giving up on a post id.
const LIKE_SEARCH_PAGES: usize = 4;

#[derive(Parser)]
#[command(
  author,
  version,
  about = "swipefeed headless client"
)]

struct Args {
  /// Base URL of the swipefeed server.
  #[arg(
    long,
    env = "SWIPEFEED_SERVER",
    default_value = "http://127.0.0.1:8787"
  )]
  server: String,

  /// Signed-in user id. Anonymous
  /// when absent.
  #[arg(long, env = "SWIPEFEED_USER")]
  user: Option<String>,

  /// Local state file for anonymous
  /// likes and seen ids.
  #[arg(
    long,
    env = "SWIPEFEED_STATE",
    default_value = ".swipefeed/state.json"
  )]
  state: PathBuf,

  #[command(subcommand)]
  command: Command
}

#[derive(Subcommand)]

enum Command {
  /// Swipe through a feed, printing
  /// each post as it becomes active.
  Browse {
    /// `r/name`, `u/name` or a bare
    /// subreddit name.
    target: String,
    #[arg(long, default_value_t = 10)]
    count:  usize,
    #[arg(long, default_value = "hot")]
    sort:   String,
    #[arg(long)]
    nsfw:   bool
  },
  /// List liked posts, newest first.
  Likes,
  /// Like a post found in the first
  /// pages of a feed.
  Like {
    target:  String,
    post_id: String
  },
  /// Remove a like.
  Unlike {
    post_id: String
  }
}

#[tokio::main]

async fn main() -> Result<()> {
  init_tracing();

  let args = Args::parse();

  let viewer = match args
    .user
    .as_deref()
    .map(str::trim)
    .filter(|u| !u.is_empty())
  {
    | Some(user) => {
      Viewer::SignedIn(user.to_string())
    }
    | None => Viewer::Anonymous
  };

  let ctx = build_context(&args)?;

  match args.command {
    | Command::Browse {
      target,
      count,
      sort,
      nsfw
    } => {
      let target = parse_target(&target)?;

      let sort = ListingSort::parse(&sort)
        .ok_or_else(|| {
          anyhow!("unknown sort '{sort}'")
        })?;

      browse(
        &ctx,
        viewer,
        target,
        count,
        PipelineConfig {
          sort,
          include_nsfw: nsfw,
          ..PipelineConfig::default()
        }
      )
      .await?;
    }
    | Command::Likes => {
      let likes = LikeController::new(&ctx);

      likes
        .load(viewer)
        .await
        .context("loading likes")?;

      let posts = likes.liked_posts();

      if posts.is_empty() {
        println!("no likes yet");
      }

      for post in posts {
        print_post(&post);
      }
    }
    | Command::Like {
      target,
      post_id
    } => {
      let target = parse_target(&target)?;

      let likes = LikeController::new(&ctx);

      likes
        .load(viewer)
        .await
        .context("loading likes")?;

      if likes.is_liked(&post_id) {
        println!("already liked: {post_id}");
        return Ok(());
      }

      let post = find_post(
        ctx.source.as_ref(),
        &target,
        &post_id
      )
      .await?;

      finish_toggle(&likes, &post).await?;
      println!("liked: {}", post.title);
    }
    | Command::Unlike {
      post_id
    } => {
      let likes = LikeController::new(&ctx);

      likes
        .load(viewer)
        .await
        .context("loading likes")?;

      let post = likes
        .liked_posts()
        .into_iter()
        .find(|p| p.id == post_id)
        .ok_or_else(|| {
          anyhow!("not liked: {post_id}")
        })?;

      finish_toggle(&likes, &post).await?;
      println!("unliked: {}", post.title);
    }
  }

  Ok(())
}

fn init_tracing() {
  let filter =
    EnvFilter::try_from_default_env()
      .unwrap_or_else(|_| {
        EnvFilter::new("warn")
      });

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();
}

fn build_context(
  args: &Args
) -> Result<ViewerContext> {
  let source = HttpContentSource::new(
    args.server.clone(),
    USER_AGENT
  )
  .context("building listing client")?;

  let store = Arc::new(
    ApiStore::new(&args.server, USER_AGENT)
      .context("building store client")?
  );

  let local = FileLocalState::open(
    &args.state
  );

  Ok(ViewerContext {
    source: Arc::new(source),
    likes:  store.clone(),
    seen:   store,
    local:  Arc::new(local),
    clock:  Arc::new(SystemClock),
    rng:    Arc::new(MutexRng::new())
  })
}

fn parse_target(
  raw: &str
) -> Result<FeedTarget> {
  FeedTarget::parse(raw).ok_or_else(|| {
    anyhow!(
      "invalid feed target '{raw}' \
       (expected r/name or u/name)"
    )
  })
}

async fn browse(
  ctx: &ViewerContext,
  viewer: Viewer,
  target: FeedTarget,
  count: usize,
  config: PipelineConfig
) -> Result<()> {
  let pipeline =
    FeedPipeline::new(ctx, viewer, config);

  println!("feed {target}");

  match pipeline.start(target).await {
    | FetchOutcome::Failed(e) => {
      bail!("first page failed: {e}")
    }
    | FetchOutcome::Throttled {
      until_ms
    } => {
      bail!(
        "upstream throttled until \
         {until_ms}"
      )
    }
    | outcome => {
      tracing::debug!(?outcome, "feed started")
    }
  }

  if let Some(post) = pipeline.active_post() {
    print_post(&post);
  }

  for _ in 1..count {
    let step = pipeline.advance(1).await;

    if !step.moved {
      // At the end; keep going only if
      // the read-ahead brought more.
      match step.prefetch {
        | Some(FetchOutcome::Appended(n))
          if n > 0 =>
        {
          continue;
        }
        | _ => break
      }
    }

    if let Some(post) = pipeline.active_post() {
      print_post(&post);
    }
  }

  let snapshot = pipeline.snapshot();

  match &snapshot.phase {
    | FeedPhase::Exhausted => {
      println!("-- end of feed --")
    }
    | FeedPhase::Throttled {
      until_ms
    } => {
      println!(
        "-- throttled until {until_ms} --"
      )
    }
    | FeedPhase::Failed(e) => {
      println!("-- fetch failed: {e} --")
    }
    | _ => {}
  }

  // The process exits right after, so
  // wait for the batch instead of
  // leaving it to teardown.
  if let Err(e) =
    pipeline.flush_seen_batch().await
  {
    eprintln!(
      "warning: seen ids not saved: {e}"
    );
  }

  println!(
    "{} shown, {} seen in this feed",
    snapshot
      .posts
      .len()
      .min(snapshot.active_index + 1),
    snapshot.seen_count
  );

  pipeline.teardown();

  Ok(())
}

async fn find_post(
  source: &dyn ContentSource,
  target: &FeedTarget,
  post_id: &str
) -> Result<Post> {
  let mut query = ListingQuery {
    sort:         ListingSort::Hot,
    limit:        100,
    after:        None,
    include_nsfw: true
  };

  for _ in 0..LIKE_SEARCH_PAGES {
    let listing = source
      .fetch_listing(target, &query)
      .await
      .with_context(|| {
        format!("fetching {target}")
      })?;

    if let Some(post) = listing
      .posts
      .into_iter()
      .find(|p| p.id == post_id)
    {
      return Ok(post);
    }

    match listing.after {
      | Some(after) => {
        query.after = Some(after)
      }
      | None => break
    }
  }

  bail!("post {post_id} not found in {target}")
}

async fn finish_toggle(
  likes: &LikeController,
  post: &Post
) -> Result<()> {
  let toggle = likes.toggle_like(post);

  if let Some(write) = toggle.write {
    write
      .await
      .context("like write task")?;
  }

  Ok(())
}

fn print_post(post: &Post) {
  println!(
    "[{}] {} ({}) u/{} {}",
    post.media.label(),
    post.title,
    post.id,
    post.author,
    post.permalink
  );
}
