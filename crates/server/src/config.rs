use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]

pub enum ConfigError {
  #[error("config IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("config parse error: {0}")]
  Parse(#[from] toml::de::Error),
  #[error("config invalid: {0}")]
  Invalid(String)
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]

pub enum SqlDialect {
  Sqlite,
  Postgres
}

#[derive(Debug, Deserialize)]

pub struct ServerConfig {
  pub app:        AppConfig,
  pub http:       HttpConfig,
  pub database:   DatabaseConfig,
  pub sqlite:     SqliteConfig,
  pub postgres:   Option<PostgresConfig>,
  pub logging:    LoggingConfig,
  #[serde(default)]
  pub upstream:   UpstreamConfig,
  #[serde(default)]
  pub cache:      CacheConfig,
  #[serde(default)]
  pub rate_limit: RateLimitConfig,
  #[serde(default)]
  pub seen:       SeenConfig
}

#[derive(Debug, Deserialize)]

pub struct AppConfig {
  pub name: String
}

#[derive(Debug, Deserialize)]

pub struct HttpConfig {
  pub host: String,
  pub port: u16
}

#[derive(Debug, Deserialize)]

pub struct DatabaseConfig {
  pub dialect: String
}

#[derive(Debug, Deserialize)]

pub struct SqliteConfig {
  pub path: String
}

#[derive(Debug, Deserialize)]

pub struct PostgresConfig {
  pub host:     String,
  pub port:     u16,
  pub database: String,
  pub user:     String,
  pub password: String,
  pub ssl_mode: String,
  pub schema:   String
}

#[derive(Debug, Deserialize)]

pub struct LoggingConfig {
  pub level: Option<String>
}

#[derive(Debug, Deserialize)]
#[serde(default)]

pub struct UpstreamConfig {
  pub base_url:        String,
  pub user_agent:      String,
  pub timeout_seconds: u64
}

impl Default for UpstreamConfig {
  fn default() -> Self {
    Self {
      base_url:        "https://www.reddit.com".into(),
      user_agent:      "swipefeed/0.1".into(),
      timeout_seconds: 15
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(default)]

pub struct CacheConfig {
  pub ttl_seconds: u64,
  pub capacity:    usize
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_seconds: 300,
      capacity:    256
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(default)]

pub struct RateLimitConfig {
  pub window_seconds: u64,
  pub max_requests:   usize
}

impl Default for RateLimitConfig {
  fn default() -> Self {
    Self {
      window_seconds: 60,
      max_requests:   30
    }
  }
}

/// Seen rows are kept forever unless
/// `retention_days` is set.
#[derive(Debug, Deserialize)]
#[serde(default)]

pub struct SeenConfig {
  pub retention_days:         Option<u32>,
  pub prune_interval_seconds: u64
}

impl Default for SeenConfig {
  fn default() -> Self {
    Self {
      retention_days:         None,
      prune_interval_seconds: 3600
    }
  }
}

impl SeenConfig {
  pub fn retention(
    &self
  ) -> Option<Duration> {
    self.retention_days.map(|days| {
      Duration::from_secs(
        u64::from(days) * 86_400
      )
    })
  }
}

impl ServerConfig {
  pub async fn load(
    path: &Path
  ) -> Result<Self, ConfigError> {
    let base_dir = path
      .parent()
      .ok_or_else(|| {
        ConfigError::Invalid(
          "config path has no parent"
            .into()
        )
      })?;

    let schema_path = base_dir
      .join("schemas")
      .join("server.schema.json");

    let schema =
      load_schema(&schema_path).await?;

    let content =
      tokio::fs::read_to_string(path)
        .await?;

    Self::parse(
      &schema,
      &content,
      &path.display().to_string()
    )
  }

  pub fn parse(
    schema: &str,
    content: &str,
    name: &str
  ) -> Result<Self, ConfigError> {
    validate_toml(
      schema, content, name
    )?;

    let config: ServerConfig =
      toml::from_str(content)?;

    Ok(config)
  }

  pub fn dialect(
    &self
  ) -> Result<SqlDialect, ConfigError>
  {
    match self
      .database
      .dialect
      .trim()
      .to_lowercase()
      .as_str()
    {
      | "sqlite" => {
        Ok(SqlDialect::Sqlite)
      }
      | "postgres" => {
        Ok(SqlDialect::Postgres)
      }
      | other => {
        Err(ConfigError::Invalid(
          format!(
            "invalid database.dialect \
             '{other}'"
          )
        ))
      }
    }
  }

  pub fn sqlite_path(
    &self,
    base_dir: &Path
  ) -> PathBuf {
    let raw = self.sqlite.path.trim();

    if raw.is_empty() {
      return base_dir
        .join("swipefeed.sqlite");
    }

    base_dir.join(raw)
  }
}

async fn load_schema(
  path: &Path
) -> Result<String, ConfigError> {
  let content =
    tokio::fs::read_to_string(path)
      .await
      .map_err(|_| {
        ConfigError::Invalid(format!(
          "schema not found at {}",
          path.display()
        ))
      })?;

  Ok(content)
}

fn validate_toml(
  schema: &str,
  toml_input: &str,
  name: &str
) -> Result<(), ConfigError> {
  let schema_json: serde_json::Value =
    serde_json::from_str(schema)
      .map_err(|e| {
        ConfigError::Invalid(format!(
          "schema parse error: {e}"
        ))
      })?;

  let compiled =
    jsonschema::validator_for(
      &schema_json
    )
    .map_err(|e| {
      ConfigError::Invalid(format!(
        "schema compile error: {e}"
      ))
    })?;

  let toml_value: toml::Value =
    toml::from_str(toml_input)
      .map_err(|e| {
        ConfigError::Invalid(format!(
          "{name}: {e}"
        ))
      })?;

  let json_value =
    serde_json::to_value(toml_value)
      .map_err(|e| {
        ConfigError::Invalid(
          e.to_string()
        )
      })?;

  let mut errors =
    compiled.iter_errors(&json_value);

  if let Some(err) = errors.next() {
    let mut messages =
      vec![err.to_string()];

    for e in errors.take(4) {
      messages.push(e.to_string());
    }

    return Err(ConfigError::Invalid(
      format!(
        "schema validation failed for \
         {name}: {}",
        messages.join("; ")
      )
    ));
  }

  Ok(())
}

pub(crate) fn validate_schema_name(
  raw: &str
) -> Result<String, ConfigError> {
  let trimmed = raw.trim();

  if trimmed.is_empty() {
    return Err(ConfigError::Invalid(
      "postgres schema cannot be empty"
        .into()
    ));
  }

  if !trimmed.chars().all(|c| {
    c.is_ascii_alphanumeric()
      || c == '_'
  }) {
    return Err(ConfigError::Invalid(
      format!(
        "invalid postgres schema \
         '{trimmed}': only \
         alphanumeric and '_' allowed"
      )
    ));
  }

  Ok(trimmed.to_string())
}
