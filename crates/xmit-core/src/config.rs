//! Process configuration, read once at startup from the environment.

use xmit_types::{Result, XmitError};

use crate::keyfile;

/// Default discovery base, overridden by `XMIT_URL`.
pub const DEFAULT_SERVICE_URL: &str = "https://xmit.co";

/// Default transfer concurrency for both directions.
pub const DEFAULT_PARALLELISM: usize = 3;

/// Everything the commands need from the process environment.
///
/// Constructed once at entry and passed down explicitly; nothing in the core
/// reads environment variables after this point.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub key: Option<String>,
    pub upload_parallelism: usize,
    pub download_parallelism: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            base_url: std::env::var("XMIT_URL")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_SERVICE_URL.to_string()),
            key: find_key(),
            upload_parallelism: parallelism_from_env("UPLOAD_PARALLELISM")?,
            download_parallelism: parallelism_from_env("DOWNLOAD_PARALLELISM")?,
        })
    }

    /// The key, or a configuration error pointing the user at key
    /// management.
    pub fn require_key(&self, management_url: Option<&str>) -> Result<&str> {
        match self.key.as_deref() {
            Some(key) => Ok(key),
            None => {
                let mut message =
                    "no API key found; set XMIT_KEY or run 'xmit set-key'".to_string();
                if let Some(url) = management_url {
                    message.push_str(&format!(" (keys are managed at {url})"));
                }
                Err(XmitError::Config(message))
            }
        }
    }
}

/// `XMIT_KEY` wins over the key file; empty values count as unset.
fn find_key() -> Option<String> {
    std::env::var("XMIT_KEY")
        .ok()
        .filter(|k| !k.is_empty())
        .or_else(keyfile::load)
}

fn parallelism_from_env(name: &str) -> Result<usize> {
    match std::env::var(name) {
        Err(_) => Ok(DEFAULT_PARALLELISM),
        Ok(value) if value.is_empty() => Ok(DEFAULT_PARALLELISM),
        Ok(value) => {
            let n: usize = value
                .parse()
                .map_err(|_| XmitError::Config(format!("{name} must be an integer, got '{value}'")))?;
            if n == 0 {
                return Err(XmitError::Config(format!("{name} must be at least 1")));
            }
            Ok(n)
        }
    }
}
