//! Gateway configuration.
//!
//! Every setting comes from the environment, after a `.env` file in the
//! working directory has been merged in (existing variables win).
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | GATEHOUSE_ADDR | 0.0.0.0:3000 | listen address |
//! | CDN_BASE | (empty) | CDN base path, passed through to handlers |
//! | WECHAT_APPID | (empty) | identity-provider app id |
//! | WECHAT_SECRET | (empty) | identity-provider secret |
//! | WECHAT_TIMEOUT_SECS | 8 | client timeout for the token exchange |
//! | ACCESS_LOG_MAX_BODY | 4096 | bytes of each body kept in the access log |
//! | LOG_LEVEL | info | default filter when `RUST_LOG` is unset |
//! | LOG_JSON | false | emit JSON lines instead of text |
//! | LOG_DIR | (unset) | also write daily-rolling files here |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    /// Not used by the middleware itself.
    pub cdn: String,
    pub identity_provider: IdentityProviderConfig,
    pub access_log: AccessLogConfig,
    pub log: LogConfig,
}

/// Credentials for the external identity provider. Only the user-lookup
/// collaborator's token exchange uses these; the gate never does.
#[derive(Clone, Debug)]
pub struct IdentityProviderConfig {
    pub app_id: String,
    pub secret: String,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct AccessLogConfig {
    /// Longest rendering of a request or response body kept in a log record.
    pub max_body_bytes: usize,
}

#[derive(Clone, Debug)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn from_env() -> Result<Self, Error> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let addr = parse_or(&get, "GATEHOUSE_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?;
        let timeout_secs = parse_or(&get, "WECHAT_TIMEOUT_SECS", 8u64)?;

        Ok(Self {
            addr,
            cdn: get("CDN_BASE").unwrap_or_default(),
            identity_provider: IdentityProviderConfig {
                app_id: get("WECHAT_APPID").unwrap_or_default(),
                secret: get("WECHAT_SECRET").unwrap_or_default(),
                timeout: Duration::from_secs(timeout_secs),
            },
            access_log: AccessLogConfig {
                max_body_bytes: parse_or(&get, "ACCESS_LOG_MAX_BODY", AccessLogConfig::default().max_body_bytes)?,
            },
            log: LogConfig {
                level: get("LOG_LEVEL").unwrap_or_else(|| "info".into()),
                json: parse_or(&get, "LOG_JSON", false)?,
                dir: get("LOG_DIR").filter(|d| !d.is_empty()).map(PathBuf::from),
            },
        })
    }
}

impl IdentityProviderConfig {
    /// HTTP client for calls to the identity provider.
    pub fn http_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::config(format!("identity provider client: {e}")))
    }
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self { max_body_bytes: 4096 }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".into(), json: false, dir: None }
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("{key}={raw:?}: {e}"))),
        None => Ok(default),
    }
}
