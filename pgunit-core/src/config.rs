//! Connection settings
//!
//! `PgConfig` is loaded once at startup from TOML or `PG_*` environment
//! variables and turned into sqlx connect options. TLS is never negotiated.

use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use log::LevelFilter;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::ConnectOptions;
use tracing::debug;

use crate::error::{Error, Result};

const DEFAULT_PORT: u16 = 5432;
const DEFAULT_SCHEMA: &str = "public";
const DEFAULT_MAX_OPEN_CONNECTIONS: u32 = 10;

/// Settings needed to reach one PostgreSQL database.
///
/// Supplied once at startup and read-only afterwards.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PgConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub db_name: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Zero means no limit
    #[serde(default = "default_max_open_connections")]
    pub max_open_connections: u32,
    /// Zero means connections are never recycled
    #[serde(default)]
    pub connection_max_lifetime_ms: u64,
    #[serde(default)]
    pub log_mode: bool,
    /// Kept for completeness; connections are always opened with `sslmode=disable`
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

fn default_max_open_connections() -> u32 {
    DEFAULT_MAX_OPEN_CONNECTIONS
}

fn default_ssl_mode() -> String {
    "disable".to_string()
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            db_name: String::new(),
            schema: default_schema(),
            user: String::new(),
            password: String::new(),
            max_open_connections: DEFAULT_MAX_OPEN_CONNECTIONS,
            connection_max_lifetime_ms: 0,
            log_mode: false,
            ssl_mode: default_ssl_mode(),
        }
    }
}

impl fmt::Debug for PgConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db_name", &self.db_name)
            .field("schema", &self.schema)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("max_open_connections", &self.max_open_connections)
            .field("connection_max_lifetime_ms", &self.connection_max_lifetime_ms)
            .field("log_mode", &self.log_mode)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

impl PgConfig {
    /// Parse a config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
        debug!("loaded postgres config from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Build a config from `PG_*` environment variables.
    ///
    /// A `.env` file in the current directory is loaded first if present;
    /// variables already set in the environment win.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("loaded .env from {}", path.display());
        }

        let defaults = Self::default();
        let config = Self {
            host: env::var("PG_HOST").unwrap_or(defaults.host),
            port: parse_var("PG_PORT")?.unwrap_or(defaults.port),
            db_name: env::var("PG_DATABASE").unwrap_or_default(),
            schema: env::var("PG_SCHEMA").unwrap_or(defaults.schema),
            user: env::var("PG_USER").unwrap_or_default(),
            password: env::var("PG_PASSWORD").unwrap_or_default(),
            max_open_connections: parse_var("PG_MAX_OPEN_CONNECTIONS")?
                .unwrap_or(defaults.max_open_connections),
            connection_max_lifetime_ms: parse_var("PG_CONN_MAX_LIFETIME_MS")?.unwrap_or(0),
            log_mode: parse_var("PG_LOG_MODE")?.unwrap_or(false),
            ssl_mode: env::var("PG_SSL_MODE").unwrap_or(defaults.ssl_mode),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configs that can never produce a usable connection
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("host must not be empty"));
        }
        if self.db_name.trim().is_empty() {
            return Err(Error::config("db_name must not be empty"));
        }
        if self.user.trim().is_empty() {
            return Err(Error::config("user must not be empty"));
        }
        Ok(())
    }

    /// Pool size limit handed to sqlx
    pub fn pool_max_connections(&self) -> u32 {
        match self.max_open_connections {
            0 => u32::MAX,
            n => n,
        }
    }

    /// Maximum lifetime of a pooled connection, `None` when unlimited
    pub fn connection_max_lifetime(&self) -> Option<Duration> {
        match self.connection_max_lifetime_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Connection options for sqlx.
    ///
    /// SSL is always disabled whatever `ssl_mode` says. `log_mode` switches
    /// statement logging on at info level.
    pub fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.db_name)
            .options([("search_path", self.schema.as_str())])
            .ssl_mode(PgSslMode::Disable);

        if self.log_mode {
            options.log_statements(LevelFilter::Info)
        } else {
            options.disable_statement_logging()
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::config(format!("{name} has invalid value '{raw}'"))),
        Err(_) => Ok(None),
    }
}
