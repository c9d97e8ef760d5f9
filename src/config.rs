use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::model::EntryId;
use crate::{
    DEFAULT_DEBOUNCE_DELAY_MS, DEFAULT_MAX_FAILED_ATTEMPTS, DEFAULT_NOTIFICATION_DURATION_MS,
    DEFAULT_UPDATE_INTERVAL_MS, DEFAULT_VISIBILITY_RESTORE_DELAY_MS,
};

const ID_PLACEHOLDER: &str = "{id}";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid config field '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("could not parse config: {0}")]
    Parse(String),
}

/// Page theme. Read by the host shell when it picks its stylesheet; the
/// markup rendered here is theme-neutral.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

/// Relative endpoint templates; `{id}` is replaced by the entry id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub update_status: String,
    pub attachments: String,
    pub uploads: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            update_status: "update-status/{id}".into(),
            attachments: "api/entry/{id}/attachments".into(),
            uploads: "uploads/".into(),
        }
    }
}

impl Endpoints {
    #[must_use]
    pub fn update_status_path(&self, entry_id: EntryId) -> String {
        self.update_status.replace(ID_PLACEHOLDER, &entry_id.to_string())
    }

    #[must_use]
    pub fn attachments_path(&self, entry_id: EntryId) -> String {
        self.attachments.replace(ID_PLACEHOLDER, &entry_id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub update_interval_ms: u64,
    pub max_failed_attempts: u32,
    pub debounce_delay_ms: u64,
    pub debug_mode: bool,
    /// Passed through to the host shell.
    pub theme_mode: ThemeMode,
    pub notification_duration_ms: u64,
    pub visibility_restore_delay_ms: u64,
    pub base_url: String,
    pub endpoints: Endpoints,
    /// Selectors of overlay regions re-guarded after DOM mutations.
    pub protected_regions: Vec<String>,
    pub auto_update: bool,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            debounce_delay_ms: DEFAULT_DEBOUNCE_DELAY_MS,
            debug_mode: false,
            theme_mode: ThemeMode::default(),
            notification_duration_ms: DEFAULT_NOTIFICATION_DURATION_MS,
            visibility_restore_delay_ms: DEFAULT_VISIBILITY_RESTORE_DELAY_MS,
            base_url: "http://localhost/".into(),
            endpoints: Endpoints::default(),
            protected_regions: vec![".modal".into()],
            auto_update: true,
        }
    }
}

impl PanelConfig {
    /// Parse the JSON blob a page embeds; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.update_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "update_interval_ms",
                reason: "must be > 0".into(),
            });
        }
        if self.max_failed_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "max_failed_attempts",
                reason: "must be > 0".into(),
            });
        }
        if self.debounce_delay_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "debounce_delay_ms",
                reason: "must be > 0".into(),
            });
        }
        if self.notification_duration_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "notification_duration_ms",
                reason: "must be > 0".into(),
            });
        }
        if !self.endpoints.update_status.contains(ID_PLACEHOLDER) {
            return Err(ConfigError::Invalid {
                field: "endpoints.update_status",
                reason: format!("template must contain {ID_PLACEHOLDER}"),
            });
        }
        if !self.endpoints.attachments.contains(ID_PLACEHOLDER) {
            return Err(ConfigError::Invalid {
                field: "endpoints.attachments",
                reason: format!("template must contain {ID_PLACEHOLDER}"),
            });
        }
        self.base()?;
        Ok(())
    }

    /// Base URL treated as a directory, so relative paths append to it.
    pub fn base(&self) -> Result<Url, ConfigError> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw).map_err(|e| ConfigError::Invalid {
            field: "base_url",
            reason: e.to_string(),
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Invalid {
                field: "base_url",
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        Ok(url)
    }

    pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
        self.base()?
            .join(path.trim_start_matches('/'))
            .map_err(|e| ConfigError::Invalid {
                field: "endpoints",
                reason: e.to_string(),
            })
    }

    /// Image source prefix for the report gallery, relative to the page.
    #[must_use]
    pub fn uploads_prefix(&self) -> String {
        let mut prefix = self.endpoints.uploads.clone();
        if !prefix.starts_with('/') {
            prefix.insert(0, '/');
        }
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_panel_constants() {
        let config = PanelConfig::default();
        assert_eq!(config.update_interval_ms, 30_000);
        assert_eq!(config.max_failed_attempts, 3);
        assert_eq!(config.debounce_delay_ms, 50);
        assert!(!config.debug_mode);
        assert_eq!(config.theme_mode, ThemeMode::Light);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_missing_fields() {
        let config =
            PanelConfig::from_json(r#"{"update_interval_ms": 60000, "theme_mode": "dark"}"#)
                .unwrap();
        assert_eq!(config.update_interval_ms, 60_000);
        assert_eq!(config.theme_mode, ThemeMode::Dark);
        assert_eq!(config.max_failed_attempts, 3);
        assert_eq!(config.protected_regions, vec![".modal".to_string()]);
    }

    #[test]
    fn test_from_json_rejects_bad_input() {
        assert!(matches!(
            PanelConfig::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            PanelConfig::from_json(r#"{"update_interval_ms": 0}"#),
            Err(ConfigError::Invalid {
                field: "update_interval_ms",
                ..
            })
        ));
    }

    #[test]
    fn test_endpoint_template_requires_placeholder() {
        let config = PanelConfig {
            endpoints: Endpoints {
                update_status: "update-status".into(),
                ..Endpoints::default()
            },
            ..PanelConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "endpoints.update_status",
                ..
            })
        ));
    }

    #[test]
    fn test_base_url_must_be_http() {
        let config = PanelConfig {
            base_url: "ftp://files.example.com".into(),
            ..PanelConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_appends_to_base_directory() {
        let config = PanelConfig {
            base_url: "https://example.com/panel".into(),
            ..PanelConfig::default()
        };
        let url = config
            .resolve(&config.endpoints.update_status_path(EntryId(42)))
            .unwrap();
        assert_eq!(url.as_str(), "https://example.com/panel/update-status/42");

        let url = config
            .resolve(&config.endpoints.attachments_path(EntryId(7)))
            .unwrap();
        assert_eq!(url.as_str(), "https://example.com/panel/api/entry/7/attachments");
    }

    #[test]
    fn test_uploads_prefix_is_rooted() {
        let config = PanelConfig::default();
        assert_eq!(config.uploads_prefix(), "/uploads/");

        let custom = PanelConfig {
            endpoints: Endpoints {
                uploads: "/media/files".into(),
                ..Endpoints::default()
            },
            ..PanelConfig::default()
        };
        assert_eq!(custom.uploads_prefix(), "/media/files/");
    }
}
