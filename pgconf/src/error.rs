use thiserror::Error;

use crate::config::ENV_PREFIX;

/// Failures while building a [`crate::config::ConnectionConfig`] from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(String),

    #[error("invalid port {value:?}: {reason}")]
    InvalidPort { value: String, reason: String },

    #[error("invalid environment: {0}")]
    Env(#[source] envy::Error),
}

impl From<envy::Error> for ConfigError {
    fn from(err: envy::Error) -> Self {
        match err {
            envy::Error::MissingValue(field) => {
                ConfigError::Missing(format!("{}{}", ENV_PREFIX, field.to_uppercase()))
            }
            other => ConfigError::Env(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid glob pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

/// Errors raised by the database collaborators.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("pool error: {0}")]
    Pool(#[from] bb8::RunError<tokio_postgres::Error>),

    #[error("migration error: {0}")]
    Migration(#[from] refinery::Error),
}
