use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;

use crate::cache::DEFAULT_TTL;
use crate::fetcher::SiriusConfig;

pub const DEFAULT_BASE_URL: &str = "https://sirius.fit.cvut.cz/api/v1";
pub const DEFAULT_TOKEN_URL: &str = "https://auth.fit.cvut.cz/oauth/token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String },
    Missing(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { var, value } => write!(f, "invalid value for {var}: {value:?}"),
            ConfigError::Missing(var) => write!(f, "missing required variable {var}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub metrics_port: Option<u16>,
    pub tz: Tz,
    pub cache_ttl: Duration,
    pub sirius: SiriusConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind = lookup("FREEROOMS_BIND").unwrap_or_else(|| "127.0.0.1".into());
        let port = parse_or(&lookup, "FREEROOMS_PORT", 8090)?;
        let metrics_port = parse_opt(&lookup, "FREEROOMS_METRICS_PORT")?;
        let tz = parse_or(&lookup, "FREEROOMS_TZ", chrono_tz::CET)?;
        let cache_ttl = parse_opt(&lookup, "FREEROOMS_CACHE_TTL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TTL);
        let timeout = Duration::from_secs(parse_or(&lookup, "SIRIUS_TIMEOUT_SECS", 30)?);

        let sirius = SiriusConfig {
            base_url: lookup("SIRIUS_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            token_url: lookup("SIRIUS_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.into()),
            client_id: lookup("SIRIUS_CLIENT_ID").ok_or(ConfigError::Missing("SIRIUS_CLIENT_ID"))?,
            client_secret: lookup("SIRIUS_CLIENT_SECRET")
                .ok_or(ConfigError::Missing("SIRIUS_CLIENT_SECRET"))?,
            timeout,
        };

        Ok(Self {
            bind,
            port,
            metrics_port,
            tz,
            cache_ttl,
            sirius,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse_opt<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    Ok(parse_opt(lookup, var)?.unwrap_or(default))
}
