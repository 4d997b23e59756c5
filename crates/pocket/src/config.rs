//! Configuration loading for Pocket sync
//!
//! Credentials are read from an auth file (default `auth.json`) with a
//! fallback to environment variables:
//! - `POCKET_CONSUMER_KEY`
//! - `POCKET_ACCESS_TOKEN`
//!
//! Sync tuning lives in `~/.config/pocket-sync/settings.json`.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::sync::RetryPolicy;
use crate::sync::retry::duration_millis;

/// Settings filename in the pocket-sync config directory
const SETTINGS_FILE: &str = "settings.json";

/// Auth file used when none is given
pub const DEFAULT_AUTH_FILE: &str = "auth.json";

/// Access-token material for Pocket, plus optional export destination keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub consumer_key: String,
    pub access_token: String,
    pub username: Option<String>,
    pub karakeep_token: Option<String>,
    pub karakeep_url: Option<String>,
}

/// On-disk auth file format
#[derive(Debug, Default, Deserialize)]
struct AuthFile {
    pocket_consumer_key: Option<String>,
    pocket_access_token: Option<String>,
    pocket_username: Option<String>,
    karakeep_token: Option<String>,
    karakeep_url: Option<String>,
}

impl Credentials {
    /// Load credentials from `path`, or from the environment if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let file: AuthFile = config::load_json_file(path)
                .map_err(|e| Error::AuthMissing(format!("{e:#}")))?;
            return Self::from_auth_file(file, path);
        }

        Self::from_env().ok_or_else(|| {
            Error::AuthMissing(format!(
                "no auth file at {} and POCKET_CONSUMER_KEY / POCKET_ACCESS_TOKEN are not set; run `pocket-sync auth` first",
                path.display()
            ))
        })
    }

    /// Parse credentials from the JSON contents of an auth file
    pub fn from_json(json: &str) -> Result<Self> {
        let file: AuthFile = serde_json::from_str(json)
            .map_err(|e| Error::AuthMissing(format!("invalid auth JSON: {e}")))?;
        Self::from_auth_file(file, Path::new("<inline>"))
    }

    fn from_auth_file(file: AuthFile, path: &Path) -> Result<Self> {
        let required = |value: Option<String>, key: &str| {
            value.filter(|v| !v.trim().is_empty()).ok_or_else(|| {
                Error::AuthMissing(format!("missing '{key}' in auth file: {}", path.display()))
            })
        };

        Ok(Self {
            consumer_key: required(file.pocket_consumer_key, "pocket_consumer_key")?,
            access_token: required(file.pocket_access_token, "pocket_access_token")?,
            username: file.pocket_username,
            karakeep_token: file.karakeep_token.filter(|t| !t.is_empty()),
            karakeep_url: file.karakeep_url.filter(|u| !u.is_empty()),
        })
    }

    /// Load credentials from environment variables
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let consumer_key = lookup("POCKET_CONSUMER_KEY").filter(|v| !v.is_empty())?;
        let access_token = lookup("POCKET_ACCESS_TOKEN").filter(|v| !v.is_empty())?;
        Some(Self {
            consumer_key,
            access_token,
            username: None,
            karakeep_token: None,
            karakeep_url: None,
        })
    }

    /// The Karakeep API token, required for the karakeep export format
    pub fn require_karakeep_token(&self) -> Result<&str> {
        self.karakeep_token
            .as_deref()
            .ok_or_else(|| Error::AuthMissing("missing 'karakeep_token' in auth file".to_string()))
    }

    /// Write the Pocket keys into `path`, keeping any other keys already there
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let mut data = if path.exists() {
            config::load_json_file::<serde_json::Map<String, serde_json::Value>>(path)?
        } else {
            serde_json::Map::new()
        };

        data.insert("pocket_consumer_key".into(), self.consumer_key.clone().into());
        data.insert("pocket_access_token".into(), self.access_token.clone().into());
        if let Some(username) = &self.username {
            data.insert("pocket_username".into(), username.clone().into());
        }

        config::save_json_file(path, &data)
            .with_context(|| format!("Failed to save credentials to {}", path.display()))
    }
}

/// Tuning for fetch runs
///
/// Durations are stored as integer milliseconds. Missing keys take defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Items requested per page
    pub page_size: usize,
    /// Pause between page requests
    #[serde(with = "duration_millis")]
    pub page_delay: Duration,
    /// Upper bound on each HTTP call
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: 50,
            page_delay: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncSettings {
    /// Load settings from the config directory, or defaults if none are saved
    pub fn load() -> anyhow::Result<Self> {
        if config::config_exists(SETTINGS_FILE) {
            return config::load_json(SETTINGS_FILE);
        }
        Ok(Self::default())
    }

    /// Load settings from a specific file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        config::load_json_file(path)
    }
}
