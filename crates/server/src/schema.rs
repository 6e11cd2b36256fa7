use std::path::Path;

use sqlx::{Pool, Postgres, Sqlite};
use tokio::fs;
use tracing::info;

use crate::config::{ConfigError, ServerConfig, SqlDialect, validate_schema_name};
use crate::db::{SqlStore, quote_ident};

/// Applies `res/sql/<dialect>/schema.sql` next to the config file. Every
/// statement is idempotent so this runs on each start.
pub async fn apply_server_schema(
    config: &ServerConfig,
    store: &SqlStore,
    config_path: &Path,
) -> Result<(), ConfigError> {
    let base_dir = config_path
        .parent()
        .ok_or_else(|| ConfigError::Invalid("config path has no parent".into()))?;
    match config.dialect()? {
        SqlDialect::Sqlite => {
            let pool = store
                .sqlite_pool()
                .ok_or_else(|| ConfigError::Invalid("sqlite pool missing".into()))?;
            let content = read_schema(&base_dir.join("sql").join("sqlite").join("schema.sql")).await?;
            execute_schema_sqlite(pool, &content).await?;
        }
        SqlDialect::Postgres => {
            let pool = store
                .postgres_pool()
                .ok_or_else(|| ConfigError::Invalid("postgres pool missing".into()))?;
            let pg = config
                .postgres
                .as_ref()
                .ok_or_else(|| ConfigError::Invalid("postgres section missing".into()))?;
            let schema = validate_schema_name(&pg.schema)?;
            let content =
                read_schema(&base_dir.join("sql").join("postgres").join("schema.sql")).await?;
            execute_schema_postgres(pool, &content, &schema).await?;
        }
    }
    info!("server schema applied");
    Ok(())
}

async fn read_schema(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path)
        .await
        .map_err(|_| ConfigError::Invalid(format!("schema not found at {}", path.display())))
}

fn statements(content: &str) -> impl Iterator<Item = &str> {
    content.split(';').map(str::trim).filter(|s| !s.is_empty())
}

pub async fn execute_schema_sqlite(pool: &Pool<Sqlite>, content: &str) -> Result<(), ConfigError> {
    for stmt in statements(content) {
        sqlx::query(stmt)
            .execute(pool)
            .await
            .map_err(|e| ConfigError::Invalid(format!("schema apply error: {e}")))?;
    }
    Ok(())
}

async fn execute_schema_postgres(
    pool: &Pool<Postgres>,
    content: &str,
    schema: &str,
) -> Result<(), ConfigError> {
    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| ConfigError::Invalid(format!("schema apply error: {e}")))?;
    let search_stmt = format!("SET search_path TO {}", quote_ident(schema));
    sqlx::query(&search_stmt)
        .execute(&mut *conn)
        .await
        .map_err(|e| ConfigError::Invalid(format!("schema apply error: {e}")))?;

    for stmt in statements(content) {
        sqlx::query(stmt)
            .execute(&mut *conn)
            .await
            .map_err(|e| ConfigError::Invalid(format!("schema apply error: {e}")))?;
    }
    Ok(())
}
