//! Configuration loaded from the process environment.
//!
//! Built once at startup and passed down explicitly; nothing in the
//! workspace reads the environment after `main` has constructed the config.
//! Every loader has a `*_from_lookup` twin taking a lookup function so tests
//! can supply values without mutating process-wide state.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::models::StatementKind;

const DEFAULT_DB_PORT: u16 = 3306;
const DEFAULT_POOL_SIZE: u32 = 10;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_FALLBACK_PATH: &str = "data/fallback.json";

/// Database connection parameters.
#[derive(Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub host: Option<String>,
    pub user: Option<String>,
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
    pub database: Option<String>,
    pub port: u16,
    /// Upper bound for pooled connections.
    pub pool_size: u32,
    /// Whether a saturated pool waits for a free connection or fails at once.
    pub wait_for_connections: bool,
    pub connect_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: None,
            user: None,
            password: None,
            database: None,
            port: DEFAULT_DB_PORT,
            pool_size: DEFAULT_POOL_SIZE,
            wait_for_connections: true,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

// Hand-written so the password never reaches a log line.
impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("port", &self.port)
            .field("pool_size", &self.pool_size)
            .field("wait_for_connections", &self.wait_for_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl DbConfig {
    /// Reads `DB_*` variables from the process environment.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads `DB_*` variables through `lookup`.
    ///
    /// Empty or whitespace-only values are treated as absent.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(lookup(key));
        Ok(Self {
            host: get("DB_HOST"),
            user: get("DB_USER"),
            password: get("DB_PASSWORD"),
            database: get("DB_NAME"),
            port: parse_or("DB_PORT", get("DB_PORT"), DEFAULT_DB_PORT)?,
            pool_size: parse_or("DB_POOL_SIZE", get("DB_POOL_SIZE"), DEFAULT_POOL_SIZE)?,
            wait_for_connections: parse_bool_or(
                "DB_WAIT_FOR_CONNECTIONS",
                get("DB_WAIT_FOR_CONNECTIONS"),
                true,
            )?,
            connect_timeout_secs: parse_or(
                "DB_CONNECT_TIMEOUT_SECS",
                get("DB_CONNECT_TIMEOUT_SECS"),
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?,
        })
    }

    /// True when host, user and database name are all present.
    pub fn is_configured(&self) -> bool {
        self.host.is_some() && self.user.is_some() && self.database.is_some()
    }
}

/// How the gateway obtains a connection for each call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionMode {
    /// A dedicated connection opened and closed around every statement.
    #[default]
    PerCall,
    /// Connections borrowed from a bounded pool.
    Pooled,
}

impl FromStr for ConnectionMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-call" | "per_call" | "percall" => Ok(ConnectionMode::PerCall),
            "pooled" | "pool" => Ok(ConnectionMode::Pooled),
            other => Err(AppError::Config(format!("unknown connection mode: {other}"))),
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMode::PerCall => write!(f, "per-call"),
            ConnectionMode::Pooled => write!(f, "pooled"),
        }
    }
}

/// What to do when a statement cannot be served by the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegradeMode {
    /// Answer with the fallback dataset.
    Fallback,
    /// Surface the error to the caller.
    Fail,
}

impl FromStr for DegradeMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fallback" => Ok(DegradeMode::Fallback),
            "fail" => Ok(DegradeMode::Fail),
            other => Err(AppError::Config(format!("unknown degrade mode: {other}"))),
        }
    }
}

/// Degrade behaviour per statement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradePolicy {
    pub reads: DegradeMode,
    pub writes: DegradeMode,
}

impl Default for DegradePolicy {
    /// Reads fall back, writes fail: a write that did not happen is never
    /// reported as one that did.
    fn default() -> Self {
        Self {
            reads: DegradeMode::Fallback,
            writes: DegradeMode::Fail,
        }
    }
}

impl DegradePolicy {
    /// Every failure answered from the fallback dataset.
    pub fn lenient() -> Self {
        Self {
            reads: DegradeMode::Fallback,
            writes: DegradeMode::Fallback,
        }
    }

    /// Every failure surfaced.
    pub fn strict() -> Self {
        Self {
            reads: DegradeMode::Fail,
            writes: DegradeMode::Fail,
        }
    }

    pub fn mode_for(&self, kind: StatementKind) -> DegradeMode {
        match kind {
            StatementKind::Read => self.reads,
            StatementKind::Write => self.writes,
        }
    }
}

/// Gateway settings besides the raw connection parameters.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub db: DbConfig,
    pub connection_mode: ConnectionMode,
    pub degrade: DegradePolicy,
    pub fallback_path: PathBuf,
}

impl GatewayConfig {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db = DbConfig::from_lookup(&lookup)?;
        let get = |key: &str| non_empty(lookup(key));

        let connection_mode = match get("GATEWAY_CONNECTION_MODE") {
            Some(v) => v.parse()?,
            None => ConnectionMode::default(),
        };

        let defaults = DegradePolicy::default();
        let degrade = DegradePolicy {
            reads: match get("GATEWAY_DEGRADE_READS") {
                Some(v) => v.parse()?,
                None => defaults.reads,
            },
            writes: match get("GATEWAY_DEGRADE_WRITES") {
                Some(v) => v.parse()?,
                None => defaults.writes,
            },
        };

        let fallback_path = get("FALLBACK_DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FALLBACK_PATH));

        Ok(Self {
            db,
            connection_mode,
            degrade,
            fallback_path,
        })
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub gateway: GatewayConfig,
}

impl AppConfig {
    /// Loads the configuration for the named service from the environment.
    pub fn load_with_service(service_name: &str) -> AppResult<Self> {
        Self::from_lookup(service_name, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(service_name: &str, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let gateway = GatewayConfig::from_lookup(&lookup)?;
        let host = non_empty(lookup("SERVER_HOST")).unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or("SERVER_PORT", non_empty(lookup("SERVER_PORT")), 8080)?;
        Ok(Self {
            service_name: service_name.to_string(),
            host,
            port,
            gateway,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> AppResult<T> {
    match value {
        Some(v) => v
            .parse()
            .map_err(|_| AppError::Config(format!("{key} has invalid value: {v}"))),
        None => Ok(default),
    }
}

fn parse_bool_or(key: &str, value: Option<String>, default: bool) -> AppResult<bool> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(AppError::Config(format!("{key} has invalid value: {other}"))),
    }
}
