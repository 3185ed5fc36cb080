//! Sync settings shared by every front end.
//!
//! Settings come from a JSON file (or host defaults) and can be overridden
//! with `SIPSYNC_*` environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::sync::{EngineConfig, SchedulerConfig};
use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

pub const ENV_REMOTE_URL: &str = "SIPSYNC_REMOTE_URL";
pub const ENV_AUTH_TOKEN: &str = "SIPSYNC_AUTH_TOKEN";
pub const ENV_SYNC_INTERVAL_SECS: &str = "SIPSYNC_SYNC_INTERVAL_SECS";
pub const ENV_RETRY_COOLDOWN_SECS: &str = "SIPSYNC_RETRY_COOLDOWN_SECS";
pub const ENV_SUBMIT_TIMEOUT_SECS: &str = "SIPSYNC_SUBMIT_TIMEOUT_SECS";

/// Tunables for the remote store, engine and scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    pub remote_base_url: Option<String>,
    pub auth_token: Option<String>,
    pub sync_interval_secs: u64,
    pub retry_cooldown_secs: u64,
    pub submit_timeout_secs: u64,
    pub success_display_secs: u64,
    pub reconnect_debounce_ms: u64,
    pub probe_interval_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            remote_base_url: None,
            auth_token: None,
            sync_interval_secs: 60,
            retry_cooldown_secs: 30,
            submit_timeout_secs: 15,
            success_display_secs: 3,
            reconnect_debounce_ms: 750,
            probe_interval_secs: 15,
        }
    }
}

impl SyncSettings {
    /// Overlay values from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary key lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = normalize_text_option(lookup(ENV_REMOTE_URL)) {
            self.remote_base_url = Some(url);
        }
        if let Some(token) = normalize_text_option(lookup(ENV_AUTH_TOKEN)) {
            self.auth_token = Some(token);
        }
        if let Some(value) = lookup(ENV_SYNC_INTERVAL_SECS) {
            self.sync_interval_secs = parse_u64(ENV_SYNC_INTERVAL_SECS, &value)?;
        }
        if let Some(value) = lookup(ENV_RETRY_COOLDOWN_SECS) {
            self.retry_cooldown_secs = parse_u64(ENV_RETRY_COOLDOWN_SECS, &value)?;
        }
        if let Some(value) = lookup(ENV_SUBMIT_TIMEOUT_SECS) {
            self.submit_timeout_secs = parse_u64(ENV_SUBMIT_TIMEOUT_SECS, &value)?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(url) = normalize_text_option(self.remote_base_url.clone()) {
            if !is_http_url(&url) {
                return Err(Error::InvalidInput(
                    "remote_base_url must include http:// or https://".into(),
                ));
            }
        }

        for (field, value) in [
            ("sync_interval_secs", self.sync_interval_secs),
            ("submit_timeout_secs", self.submit_timeout_secs),
            ("probe_interval_secs", self.probe_interval_secs),
        ] {
            if value == 0 {
                return Err(Error::InvalidInput(format!("{field} must be greater than 0")));
            }
        }

        Ok(())
    }

    /// Remote base URL with surrounding whitespace and trailing slashes removed.
    pub fn remote_base_url(&self) -> Option<String> {
        normalize_text_option(self.remote_base_url.clone())
            .map(|url| url.trim_end_matches('/').to_string())
    }

    pub const fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }

    pub const fn success_display(&self) -> Duration {
        Duration::from_secs(self.success_display_secs)
    }

    pub const fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub const fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            submit_timeout: self.submit_timeout(),
            retry_cooldown: Duration::from_secs(self.retry_cooldown_secs),
        }
    }

    pub const fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_secs(self.sync_interval_secs),
            reconnect_debounce: Duration::from_millis(self.reconnect_debounce_ms),
        }
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("{key} must be a whole number, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn partial_json_uses_defaults() {
        let settings: SyncSettings =
            serde_json::from_str(r#"{"remote_base_url":"https://api.example.com/","sync_interval_secs":120}"#)
                .unwrap();

        assert_eq!(settings.sync_interval_secs, 120);
        assert_eq!(settings.retry_cooldown_secs, 30);
        assert_eq!(
            settings.remote_base_url().as_deref(),
            Some("https://api.example.com")
        );
        assert_eq!(
            settings.scheduler_config(),
            SchedulerConfig {
                interval: Duration::from_secs(120),
                reconnect_debounce: Duration::from_millis(750),
            }
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<SyncSettings>(r#"{"sync_every":5}"#).is_err());
    }

    #[test]
    fn overrides_replace_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_REMOTE_URL, " https://staging.example.com "),
            (ENV_RETRY_COOLDOWN_SECS, "5"),
            (ENV_AUTH_TOKEN, "   "),
        ]);
        let settings = SyncSettings {
            auth_token: Some("from-file".into()),
            ..SyncSettings::default()
        }
        .with_overrides(|key| env.get(key).map(ToString::to_string))
        .unwrap();

        assert_eq!(
            settings.remote_base_url.as_deref(),
            Some("https://staging.example.com")
        );
        assert_eq!(settings.auth_token.as_deref(), Some("from-file"));
        assert_eq!(settings.engine_config().retry_cooldown, Duration::from_secs(5));
    }

    #[test]
    fn malformed_override_is_an_error() {
        let result = SyncSettings::default().with_overrides(|key| {
            (key == ENV_SUBMIT_TIMEOUT_SECS).then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(SyncSettings::default().validate().is_ok());

        let bad_url = SyncSettings {
            remote_base_url: Some("ftp://example.com".into()),
            ..SyncSettings::default()
        };
        assert!(bad_url.validate().is_err());

        let zero_interval = SyncSettings {
            sync_interval_secs: 0,
            ..SyncSettings::default()
        };
        assert!(zero_interval.validate().is_err());
    }
}
