use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use once_cell::sync::OnceCell;
use redact::Secret;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ConfigError;

pub const ENV_PREFIX: &str = "POSTGRES_";

/// Compiled entity definitions, relative to the project root.
pub const ENTITY_GLOBS: &[&str] = &["dist/src/modules/**/entities/*.entity.js"];

/// Compiled migrations bundle, relative to the project root.
pub const MIGRATION_GLOBS: &[&str] = &["dist/src/db/migrations.js"];

/// Migration sources, only read by tooling.
pub const MIGRATIONS_DIR: &str = "src/db/migrations";

// Applies pending schema changes on every startup. Unsafe outside development.
pub const SYNCHRONIZE: bool = true;

static CONFIG: OnceCell<ConnectionConfig> = OnceCell::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Postgres,
}

/// A TCP port in 1..=65535.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Port(u16);

impl Port {
    pub fn get(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for Port {
    type Error = ConfigError;

    fn try_from(port: u16) -> Result<Self, Self::Error> {
        if port == 0 {
            return Err(ConfigError::InvalidPort {
                value: port.to_string(),
                reason: "port must be between 1 and 65535".to_string(),
            });
        }
        Ok(Port(port))
    }
}

impl FromStr for Port {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let port = s
            .trim()
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidPort {
                value: s.to_string(),
                reason: e.to_string(),
            })?;
        Port::try_from(port).map_err(|_| ConfigError::InvalidPort {
            value: s.to_string(),
            reason: "port must be between 1 and 65535".to_string(),
        })
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Variables as found in the environment, before validation.
///
/// Only the port is required here. Anything else left unset is passed on as
/// absent and the client decides what to do about it at connect time.
#[derive(Deserialize)]
struct RawEnv {
    #[serde(default)]
    host: Option<String>,
    port: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    database: Option<String>,
}

/// How to reach the database and where its schema artifacts live.
#[derive(Clone, Debug, Serialize)]
pub struct ConnectionConfig {
    engine: Engine,
    host: Option<String>,
    port: Port,
    username: Option<String>,
    #[serde(serialize_with = "redacted")]
    password: Option<Secret<String>>,
    database: Option<String>,
    entities: Vec<String>,
    migrations: Vec<String>,
    migrations_dir: PathBuf,
    synchronize: bool,
}

fn redacted<S: Serializer>(
    password: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match password {
        Some(_) => serializer.serialize_str("[REDACTED]"),
        None => serializer.serialize_none(),
    }
}

impl ConnectionConfig {
    fn from_raw(raw: RawEnv) -> Result<Self, ConfigError> {
        Ok(ConnectionConfig {
            engine: Engine::Postgres,
            host: raw.host,
            port: raw.port.parse()?,
            username: raw.user,
            password: raw.password.map(Secret::new),
            database: raw.database,
            entities: ENTITY_GLOBS.iter().map(|s| s.to_string()).collect(),
            migrations: MIGRATION_GLOBS.iter().map(|s| s.to_string()).collect(),
            migrations_dir: PathBuf::from(MIGRATIONS_DIR),
            synchronize: SYNCHRONIZE,
        })
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> Port {
        self.port
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&Secret<String>> {
        self.password.as_ref()
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    pub fn migrations(&self) -> &[String] {
        &self.migrations
    }

    /// Relative to the project root.
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    pub fn synchronize(&self) -> bool {
        self.synchronize
    }

    /// Connection URL with the password masked, for logs. Unset parts are left out.
    pub fn connection_url(&self) -> String {
        let credentials = match (&self.username, &self.password) {
            (Some(user), Some(_)) => format!("{}:***@", user),
            (Some(user), None) => format!("{}@", user),
            (None, Some(_)) => ":***@".to_string(),
            (None, None) => String::new(),
        };
        let database = self
            .database
            .as_deref()
            .map(|db| format!("/{}", db))
            .unwrap_or_default();
        format!(
            "postgres://{}{}:{}{}",
            credentials,
            self.host.as_deref().unwrap_or_default(),
            self.port,
            database
        )
    }
}

impl PartialEq for ConnectionConfig {
    fn eq(&self, other: &Self) -> bool {
        let secret = |p: &Option<Secret<String>>| p.as_ref().map(|s| s.expose_secret().clone());
        self.engine == other.engine
            && self.host == other.host
            && self.port == other.port
            && self.username == other.username
            && secret(&self.password) == secret(&other.password)
            && self.database == other.database
            && self.entities == other.entities
            && self.migrations == other.migrations
            && self.migrations_dir == other.migrations_dir
            && self.synchronize == other.synchronize
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "url:            {}", self.connection_url())?;
        writeln!(f, "entities:       {}", self.entities.join(", "))?;
        writeln!(f, "migrations:     {}", self.migrations.join(", "))?;
        writeln!(f, "migrations dir: {}", self.migrations_dir.display())?;
        write!(f, "synchronize:    {}", self.synchronize)
    }
}

/// Build the config from explicit `(name, value)` pairs.
///
/// Only `POSTGRES_*` names are considered, everything else is ignored.
pub fn build_config_from<I>(vars: I) -> Result<ConnectionConfig, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let raw = envy::prefixed(ENV_PREFIX).from_iter::<_, RawEnv>(vars)?;
    ConnectionConfig::from_raw(raw)
}

/// Build the config from the process environment. Re-reads it on every call.
pub fn build_config() -> Result<ConnectionConfig, ConfigError> {
    build_config_from(std::env::vars())
}

/// The process-wide config, built on first access.
pub fn config() -> Result<&'static ConnectionConfig, ConfigError> {
    CONFIG.get_or_try_init(build_config)
}

/// Load `./.env` (or the first one found in a parent directory).
///
/// Returns `Ok(None)` when there is no such file.
pub fn load_dotenv() -> Result<Option<PathBuf>, dotenvy::Error> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn load_dotenv_from(path: &Path) -> Result<PathBuf, dotenvy::Error> {
    dotenvy::from_path(path)?;
    Ok(path.to_path_buf())
}
