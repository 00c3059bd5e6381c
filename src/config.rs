//! Database configuration.
//!
//! Connection URLs may carry pool options and the `writable` flag as query
//! parameters; [`DatabaseConfig::parse`] extracts the keys this layer owns
//! and leaves everything else for the driver.

use std::collections::HashMap;
use url::Url;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Connection pool configuration options.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PoolOptions {
    /// Maximum connections in the pool (default: 1; SQLite serializes
    /// writers, so larger pools only pay off for read-mostly workloads)
    pub max_connections: Option<u32>,
    /// Minimum connections in the pool (default: 1)
    pub min_connections: Option<u32>,
    /// Idle timeout in seconds (default: 600)
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Whether to test connections before use (default: true)
    pub test_before_acquire: Option<bool>,
}

impl PoolOptions {
    pub fn max_connections_or_default(&self) -> u32 {
        self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS)
    }

    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    pub fn idle_timeout_or_default(&self) -> u64 {
        self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS)
    }

    pub fn acquire_timeout_or_default(&self) -> u64 {
        self.acquire_timeout_secs
            .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS)
    }

    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }
}

/// Configuration for one database.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DatabaseConfig {
    /// Connection string handed to the driver, with this layer's query
    /// parameters stripped.
    pub connection_string: String,
    /// Whether write operations are allowed. Writable SQLite databases are
    /// created when missing; read-only ones are opened as-is.
    pub writable: bool,
    pub pool_options: PoolOptions,
}

impl DatabaseConfig {
    /// Query parameter keys this layer extracts from the URL.
    const OPTION_KEYS: &'static [&'static str] = &[
        "writable",
        "max_connections",
        "min_connections",
        "idle_timeout",
        "acquire_timeout",
        "test_before_acquire",
    ];

    pub fn new(connection_string: impl Into<String>, writable: bool) -> Self {
        Self {
            connection_string: connection_string.into(),
            writable,
            pool_options: PoolOptions::default(),
        }
    }

    /// Parse a database URL.
    ///
    /// # Format
    ///
    /// - `sqlite:path/to/db.sqlite` - read-only connection
    /// - `sqlite:path/to/db.sqlite?writable=true` - writable connection
    /// - `sqlite::memory:?writable=true&max_connections=4` - pool options
    ///
    /// Unrecognized query parameters stay on the connection string for the
    /// driver to interpret.
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut url = Url::parse(s).map_err(|e| format!("invalid database URL '{s}': {e}"))?;

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        let mut options: HashMap<String, String> = HashMap::new();
        let mut retained: Vec<(String, String)> = Vec::new();
        for (key, value) in pairs {
            if Self::OPTION_KEYS.contains(&key.as_str()) {
                options.insert(key, value);
            } else {
                retained.push((key, value));
            }
        }

        let writable = match options.get("writable") {
            Some(value) => value
                .parse::<bool>()
                .map_err(|_| format!("invalid writable value '{value}', expected true or false"))?,
            None => false,
        };

        let pool_options = PoolOptions {
            max_connections: parse_option(&options, "max_connections")?,
            min_connections: parse_option(&options, "min_connections")?,
            idle_timeout_secs: parse_option(&options, "idle_timeout")?,
            acquire_timeout_secs: parse_option(&options, "acquire_timeout")?,
            test_before_acquire: parse_option(&options, "test_before_acquire")?,
        };

        if retained.is_empty() {
            url.set_query(None);
        } else {
            let mut serializer = url.query_pairs_mut();
            serializer.clear();
            for (key, value) in &retained {
                serializer.append_pair(key, value);
            }
            drop(serializer);
        }

        Ok(Self {
            connection_string: url.to_string(),
            writable,
            pool_options,
        })
    }
}

fn parse_option<T: std::str::FromStr>(
    options: &HashMap<String, String>,
    key: &str,
) -> Result<Option<T>, String> {
    match options.get(key) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| format!("invalid value '{value}' for option '{key}'")),
        None => Ok(None),
    }
}
