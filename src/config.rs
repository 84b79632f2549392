//! Resolver configuration.
//!
//! Settings come from, in increasing priority: built-in defaults, a TOML file,
//! and command-line overrides. A minimal file looks like this:
//!
//! ```toml
//! [resolver]
//! timeout_ms = 2000
//! max_hops = 20
//! follow_aliases = false
//! root_servers = ["198.41.0.4", "170.247.170.2"]
//!
//! [logging]
//! level = "debug"
//! ```

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// IPv4 addresses of the thirteen root name servers, `a` through `m`.
pub const ROOT_SERVERS: [Ipv4Addr; 13] = [
    Ipv4Addr::new(198, 41, 0, 4),
    Ipv4Addr::new(170, 247, 170, 2),
    Ipv4Addr::new(192, 33, 4, 12),
    Ipv4Addr::new(199, 7, 91, 13),
    Ipv4Addr::new(192, 203, 230, 10),
    Ipv4Addr::new(192, 5, 5, 241),
    Ipv4Addr::new(192, 112, 36, 4),
    Ipv4Addr::new(198, 97, 190, 53),
    Ipv4Addr::new(192, 36, 148, 17),
    Ipv4Addr::new(192, 58, 128, 30),
    Ipv4Addr::new(193, 0, 14, 129),
    Ipv4Addr::new(199, 7, 83, 42),
    Ipv4Addr::new(202, 12, 27, 33),
];

/// File picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "resolve.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    FileRead(String, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub resolver: ResolverConfig,
    pub logging: LoggingConfig,
}

/// Everything the resolver and its transport need.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Per-exchange timeout in milliseconds.
    pub timeout_ms: u64,

    /// Destination port for queries.
    pub port: u16,

    /// Resolution steps allowed in one top-level lookup, nested lookups included.
    pub max_hops: usize,

    /// Re-resolve CNAME targets instead of failing with an alias error.
    pub follow_aliases: bool,

    /// Initial candidate list, also the restart point for glue-less referrals.
    pub root_servers: Vec<Ipv4Addr>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            port: 53,
            max_hops: 30,
            follow_aliases: true,
            root_servers: ROOT_SERVERS.to_vec(),
        }
    }
}

impl ResolverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Values given on the command line; `None` leaves the file or default value alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub timeout_ms: Option<u64>,
    pub port: Option<u16>,
    pub max_hops: Option<usize>,
    pub follow_aliases: Option<bool>,
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration from file or use defaults
    ///
    /// Priority order:
    /// 1. Explicitly provided path
    /// 2. resolve.toml in current directory
    /// 3. Default configuration
    ///
    /// Command-line overrides are applied on top and the result is validated.
    pub fn load(path: Option<&str>, cli_overrides: CliOverrides) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = path {
            Self::from_file(path)?
        } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
            Self::from_file(DEFAULT_CONFIG_FILE)?
        } else {
            Self::default()
        };

        config.apply_cli_overrides(cli_overrides);
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn apply_cli_overrides(&mut self, overrides: CliOverrides) {
        if let Some(timeout_ms) = overrides.timeout_ms {
            self.resolver.timeout_ms = timeout_ms;
        }
        if let Some(port) = overrides.port {
            self.resolver.port = port;
        }
        if let Some(max_hops) = overrides.max_hops {
            self.resolver.max_hops = max_hops;
        }
        if let Some(follow) = overrides.follow_aliases {
            self.resolver.follow_aliases = follow;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolver.root_servers.is_empty() {
            return Err(ConfigError::Validation(
                "No root servers configured".to_string(),
            ));
        }
        if self.resolver.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "Timeout cannot be 0".to_string(),
            ));
        }
        if self.resolver.port == 0 {
            return Err(ConfigError::Validation("Port cannot be 0".to_string()));
        }
        if self.resolver.max_hops == 0 {
            return Err(ConfigError::Validation(
                "Hop budget cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}
