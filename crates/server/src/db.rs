use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{
  AtomicI64,
  Ordering
};
use std::time::Duration;

use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{
  Pool,
  Postgres,
  Row,
  Sqlite
};
use swipefeed_core::domain::model::Post;
use swipefeed_core::error::StoreError;
use swipefeed_core::ports::store::{
  LikeStore,
  SeenStore
};
use tracing::{
  debug,
  info,
  warn
};

use crate::config::{
  ConfigError,
  SeenConfig,
  ServerConfig,
  SqlDialect,
  validate_schema_name
};
use crate::errors::map_db_error;

/// Likes and seen ids over whichever pool
/// the config selected.
#[derive(Clone)]

pub struct SqlStore {
  sqlite:   Option<Pool<Sqlite>>,
  postgres: Option<Pool<Postgres>>,
  last_ms:  Arc<AtomicI64>
}

pub async fn connect_db(
  config: &ServerConfig,
  config_path: &Path
) -> Result<SqlStore, ConfigError> {
  match config.dialect()? {
    | SqlDialect::Sqlite => {
      let base_dir = config_path
        .parent()
        .ok_or_else(|| {
          ConfigError::Invalid(
            "config path has no parent"
              .into()
          )
        })?;

      let path =
        config.sqlite_path(base_dir);

      let options =
        SqliteConnectOptions::new()
          .filename(&path)
          .create_if_missing(true);

      let pool =
        sqlx::SqlitePool::connect_with(
          options
        )
        .await
        .map_err(|e| {
          ConfigError::Invalid(format!(
            "sqlite connect failed: {e}"
          ))
        })?;

      info!(
        path = %path.display(),
        "sqlite store connected"
      );

      Ok(SqlStore::sqlite(pool))
    }
    | SqlDialect::Postgres => {
      let pg = config
        .postgres
        .as_ref()
        .ok_or_else(|| {
          ConfigError::Invalid(
            "postgres section missing"
              .into()
          )
        })?;

      let schema =
        validate_schema_name(
          &pg.schema
        )?;

      let url = format!(
        "postgres://{}:{}@{}:{}/{}?\
         sslmode={}",
        pg.user,
        pg.password,
        pg.host,
        pg.port,
        pg.database,
        pg.ssl_mode
      );

      let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(set_search_path(
          schema.clone()
        ))
        .connect(&url)
        .await
        .map_err(|e| {
          ConfigError::Invalid(format!(
            "postgres connect failed: \
             {e}"
          ))
        })?;

      info!(
        host = %pg.host,
        schema = %schema,
        "postgres store connected"
      );

      Ok(SqlStore::postgres(pool))
    }
  }
}

#[allow(clippy::type_complexity)]
pub fn set_search_path(
  schema: String
) -> impl Fn(
  &mut sqlx::PgConnection,
  sqlx::pool::PoolConnectionMetadata
) -> std::pin::Pin<
  Box<
    dyn std::future::Future<
        Output = Result<
          (),
          sqlx::Error
        >
      > + Send
      + '_
  >
> {
  let schema_name = schema;

  move |conn, _meta| {
    let schema_copy =
      schema_name.clone();

    Box::pin(async move {
      let schema_ident =
        quote_ident(&schema_copy);

      let create_stmt = format!(
        "CREATE SCHEMA IF NOT EXISTS \
         {schema_ident}"
      );

      sqlx::query(&create_stmt)
        .execute(&mut *conn)
        .await?;

      let search_stmt = format!(
        "SET search_path TO \
         {schema_ident}"
      );

      sqlx::query(&search_stmt)
        .execute(&mut *conn)
        .await?;

      Ok(())
    })
  }
}

pub fn quote_ident(
  name: &str
) -> String {
  format!(
    "\"{}\"",
    name.replace('"', "\"\"")
  )
}

fn pool_missing() -> StoreError {
  StoreError::Unavailable(
    "database pool missing".into()
  )
}

fn decode_post(
  raw: &str
) -> Option<Post> {
  match serde_json::from_str(raw) {
    | Ok(post) => Some(post),
    | Err(e) => {
      warn!(
        error = %e,
        "skipping undecodable like \
         snapshot"
      );
      None
    }
  }
}

impl SqlStore {
  pub fn sqlite(
    pool: Pool<Sqlite>
  ) -> Self {
    Self {
      sqlite:   Some(pool),
      postgres: None,
      last_ms:  Arc::new(AtomicI64::new(
        0
      ))
    }
  }

  pub fn postgres(
    pool: Pool<Postgres>
  ) -> Self {
    Self {
      sqlite:   None,
      postgres: Some(pool),
      last_ms:  Arc::new(AtomicI64::new(
        0
      ))
    }
  }

  pub fn sqlite_pool(
    &self
  ) -> Option<&Pool<Sqlite>> {
    self.sqlite.as_ref()
  }

  pub fn postgres_pool(
    &self
  ) -> Option<&Pool<Postgres>> {
    self.postgres.as_ref()
  }

  /// Wall-clock millis, strictly
  /// increasing within this process so
  /// likes written in the same
  /// millisecond still order newest
  /// first.
  fn stamp_ms(&self) -> i64 {
    let now = Utc::now().timestamp_millis();

    let mut prev =
      self.last_ms.load(Ordering::SeqCst);

    loop {
      let next = now.max(prev + 1);

      match self.last_ms.compare_exchange(
        prev,
        next,
        Ordering::SeqCst,
        Ordering::SeqCst
      ) {
        | Ok(_) => return next,
        | Err(actual) => prev = actual
      }
    }
  }

  pub async fn ping(
    &self
  ) -> Result<(), StoreError> {
    if let Some(pool) = &self.postgres {
      sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| map_db_error(&e))?;

      return Ok(());
    }

    let pool = self
      .sqlite
      .as_ref()
      .ok_or_else(pool_missing)?;

    sqlx::query("SELECT 1")
      .execute(pool)
      .await
      .map_err(|e| map_db_error(&e))?;

    Ok(())
  }

  /// Deletes seen rows recorded before
  /// `cutoff_ms`.
  pub async fn prune_seen_before(
    &self,
    cutoff_ms: i64
  ) -> Result<u64, StoreError> {
    if let Some(pool) = &self.postgres {
      let rows = sqlx::query(
        "DELETE FROM seen_posts WHERE \
         created_at_ms < $1"
      )
      .bind(cutoff_ms)
      .execute(pool)
      .await
      .map_err(|e| map_db_error(&e))?
      .rows_affected();

      return Ok(rows);
    }

    let pool = self
      .sqlite
      .as_ref()
      .ok_or_else(pool_missing)?;

    let rows = sqlx::query(
      "DELETE FROM seen_posts WHERE \
       created_at_ms < ?1"
    )
    .bind(cutoff_ms)
    .execute(pool)
    .await
    .map_err(|e| map_db_error(&e))?
    .rows_affected();

    Ok(rows)
  }

  async fn insert_seen(
    &self,
    user_id: &str,
    feed_key: &str,
    post_id: &str,
    now_ms: i64
  ) -> Result<(), sqlx::Error> {
    if let Some(pool) = &self.postgres {
      sqlx::query(
        "INSERT INTO seen_posts \
         (user_id, feed_key, post_id, \
         created_at_ms) VALUES ($1, $2, \
         $3, $4) ON CONFLICT (user_id, \
         feed_key, post_id) DO NOTHING"
      )
      .bind(user_id)
      .bind(feed_key)
      .bind(post_id)
      .bind(now_ms)
      .execute(pool)
      .await?;

      return Ok(());
    }

    let pool = self
      .sqlite
      .as_ref()
      .ok_or(sqlx::Error::PoolClosed)?;

    sqlx::query(
      "INSERT INTO seen_posts (user_id, \
       feed_key, post_id, created_at_ms) \
       VALUES (?1, ?2, ?3, ?4) ON \
       CONFLICT(user_id, feed_key, \
       post_id) DO NOTHING"
    )
    .bind(user_id)
    .bind(feed_key)
    .bind(post_id)
    .bind(now_ms)
    .execute(pool)
    .await?;

    Ok(())
  }
}

#[async_trait::async_trait]
impl LikeStore for SqlStore {
  async fn list_likes(
    &self,
    user_id: &str
  ) -> Result<Vec<Post>, StoreError> {
    let rows: Vec<String> = if let Some(pool) =
      &self.postgres
    {
      sqlx::query(
        "SELECT post_json FROM likes \
         WHERE user_id = $1 ORDER BY \
         created_at_ms DESC"
      )
      .bind(user_id)
      .fetch_all(pool)
      .await
      .map_err(|e| map_db_error(&e))?
      .into_iter()
      .map(|row| row.try_get::<String, _>("post_json"))
      .collect::<Result<Vec<_>, _>>()
      .map_err(|e| map_db_error(&e))?
    } else {
      let pool = self
        .sqlite
        .as_ref()
        .ok_or_else(pool_missing)?;

      sqlx::query(
        "SELECT post_json FROM likes \
         WHERE user_id = ?1 ORDER BY \
         created_at_ms DESC"
      )
      .bind(user_id)
      .fetch_all(pool)
      .await
      .map_err(|e| map_db_error(&e))?
      .into_iter()
      .map(|row| row.try_get::<String, _>("post_json"))
      .collect::<Result<Vec<_>, _>>()
      .map_err(|e| map_db_error(&e))?
    };

    Ok(
      rows
        .iter()
        .filter_map(|raw| decode_post(raw))
        .collect()
    )
  }

  async fn upsert_like(
    &self,
    user_id: &str,
    post: &Post
  ) -> Result<(), StoreError> {
    let post_json =
      serde_json::to_string(post)
        .map_err(|e| {
          StoreError::Rejected(
            e.to_string()
          )
        })?;

    let now_ms = self.stamp_ms();

    if let Some(pool) = &self.postgres {
      sqlx::query(
        "INSERT INTO likes (user_id, \
         post_id, post_json, \
         created_at_ms) VALUES ($1, $2, \
         $3, $4) ON CONFLICT (user_id, \
         post_id) DO UPDATE SET \
         post_json = EXCLUDED.post_json, \
         created_at_ms = \
         EXCLUDED.created_at_ms"
      )
      .bind(user_id)
      .bind(&post.id)
      .bind(&post_json)
      .bind(now_ms)
      .execute(pool)
      .await
      .map_err(|e| map_db_error(&e))?;

      return Ok(());
    }

    let pool = self
      .sqlite
      .as_ref()
      .ok_or_else(pool_missing)?;

    sqlx::query(
      "INSERT INTO likes (user_id, \
       post_id, post_json, \
       created_at_ms) VALUES (?1, ?2, \
       ?3, ?4) ON CONFLICT(user_id, \
       post_id) DO UPDATE SET post_json \
       = excluded.post_json, \
       created_at_ms = \
       excluded.created_at_ms"
    )
    .bind(user_id)
    .bind(&post.id)
    .bind(&post_json)
    .bind(now_ms)
    .execute(pool)
    .await
    .map_err(|e| map_db_error(&e))?;

    Ok(())
  }

  async fn delete_like(
    &self,
    user_id: &str,
    post_id: &str
  ) -> Result<(), StoreError> {
    let rows = if let Some(pool) =
      &self.postgres
    {
      sqlx::query(
        "DELETE FROM likes WHERE user_id \
         = $1 AND post_id = $2"
      )
      .bind(user_id)
      .bind(post_id)
      .execute(pool)
      .await
      .map_err(|e| map_db_error(&e))?
      .rows_affected()
    } else {
      let pool = self
        .sqlite
        .as_ref()
        .ok_or_else(pool_missing)?;

      sqlx::query(
        "DELETE FROM likes WHERE user_id \
         = ?1 AND post_id = ?2"
      )
      .bind(user_id)
      .bind(post_id)
      .execute(pool)
      .await
      .map_err(|e| map_db_error(&e))?
      .rows_affected()
    };

    debug!(
      user_id,
      post_id,
      rows,
      "like removed"
    );

    Ok(())
  }
}

#[async_trait::async_trait]
impl SeenStore for SqlStore {
  async fn list_seen_ids(
    &self,
    user_id: &str,
    feed_key: &str
  ) -> Result<HashSet<String>, StoreError>
  {
    let ids = if let Some(pool) =
      &self.postgres
    {
      sqlx::query(
        "SELECT post_id FROM seen_posts \
         WHERE user_id = $1 AND \
         feed_key = $2"
      )
      .bind(user_id)
      .bind(feed_key)
      .fetch_all(pool)
      .await
      .map_err(|e| map_db_error(&e))?
      .into_iter()
      .map(|row| row.try_get::<String, _>("post_id"))
      .collect::<Result<HashSet<_>, _>>()
      .map_err(|e| map_db_error(&e))?
    } else {
      let pool = self
        .sqlite
        .as_ref()
        .ok_or_else(pool_missing)?;

      sqlx::query(
        "SELECT post_id FROM seen_posts \
         WHERE user_id = ?1 AND \
         feed_key = ?2"
      )
      .bind(user_id)
      .bind(feed_key)
      .fetch_all(pool)
      .await
      .map_err(|e| map_db_error(&e))?
      .into_iter()
      .map(|row| row.try_get::<String, _>("post_id"))
      .collect::<Result<HashSet<_>, _>>()
      .map_err(|e| map_db_error(&e))?
    };

    Ok(ids)
  }

  /// Each id is written on its own; a
  /// failing id is counted and the rest
  /// continue. Only a batch where every
  /// id failed is reported as an error.
  async fn upsert_seen_batch(
    &self,
    user_id: &str,
    feed_key: &str,
    post_ids: &[String]
  ) -> Result<(), StoreError> {
    if post_ids.is_empty() {
      return Ok(());
    }

    let now_ms = Utc::now().timestamp_millis();

    let mut failed = 0usize;
    let mut last_error = None;

    for post_id in post_ids {
      if let Err(e) = self
        .insert_seen(
          user_id, feed_key, post_id,
          now_ms
        )
        .await
      {
        failed += 1;
        warn!(
          user_id,
          feed_key,
          post_id = %post_id,
          error = %e,
          "seen insert failed"
        );
        last_error = Some(e);
      }
    }

    if let Some(e) = last_error
      && failed == post_ids.len()
    {
      return Err(map_db_error(&e));
    }

    if failed > 0 {
      warn!(
        user_id,
        feed_key,
        failed,
        total = post_ids.len(),
        "seen batch partially written"
      );
    }

    Ok(())
  }
}

/// Prunes once now and then every
/// `prune_interval_seconds`. Does nothing
/// without a retention window.
pub fn spawn_seen_pruner(
  store: SqlStore,
  config: &SeenConfig
) -> Option<tokio::task::JoinHandle<()>>
{
  let retention = config.retention()?;

  let interval = Duration::from_secs(
    config.prune_interval_seconds.max(60)
  );

  let retention_ms =
    i64::try_from(retention.as_millis())
      .unwrap_or(i64::MAX);

  info!(
    retention_days = ?config.retention_days,
    interval_secs = interval.as_secs(),
    "seen retention enabled"
  );

  Some(tokio::spawn(async move {
    let mut ticker =
      tokio::time::interval(interval);

    loop {
      ticker.tick().await;

      let cutoff = Utc::now()
        .timestamp_millis()
        .saturating_sub(retention_ms);

      match store
        .prune_seen_before(cutoff)
        .await
      {
        | Ok(0) => {}
        | Ok(rows) => {
          info!(rows, "pruned seen rows")
        }
        | Err(e) => {
          warn!(
            error = %e,
            "seen prune failed"
          )
        }
      }
    }
  }))
}
