use tracing_subscriber::EnvFilter;

use crate::config::{ConfigError, ServerConfig};

/// `RUST_LOG` wins over `[logging] level` when both are set.
pub fn init_tracing(config: &ServerConfig) -> Result<(), ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let level = config
                .logging
                .level
                .as_deref()
                .unwrap_or("info")
                .trim()
                .to_string();
            EnvFilter::try_new(level)
                .map_err(|e| ConfigError::Invalid(format!("invalid logging.level: {e}")))?
        }
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}
