//! consentd configuration
//!
//! Loaded from TOML at startup, falls back to defaults if no config file exists.

use consentd_core::{xdm, Consents, Error, Result};
use consentd_engine::{ServiceConfig, CONSENT_PREFERENCES, DATASTORE_NAME};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentdConfig {
    /// Where the consent record is persisted.
    pub store: StoreConfig,
    /// Mailbox and event channel sizing.
    pub service: ServiceSection,
    /// Default consents in XDM shape: `[defaults.consents.collect] val = "y"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory for the file store. `~/` is expanded.
    pub dir: String,
    /// Store name; one JSON file per name.
    pub name: String,
    /// Key of the consent record inside the store.
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    pub mailbox_capacity: usize,
    pub event_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: "~/.consentd".into(),
            name: DATASTORE_NAME.into(),
            key: CONSENT_PREFERENCES.into(),
        }
    }
}

impl Default for ServiceSection {
    fn default() -> Self {
        let defaults = ServiceConfig::default();
        Self {
            mailbox_capacity: defaults.mailbox_capacity,
            event_capacity: defaults.event_capacity,
        }
    }
}

impl ConsentdConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::parse(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {} - using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {} - using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigError(e.to_string()))
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Configured defaults, `None` when the section is absent.
    pub fn default_consents(&self) -> Option<Consents> {
        self.defaults.as_ref().map(xdm::from_event_data)
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            mailbox_capacity: self.service.mailbox_capacity,
            event_capacity: self.service.event_capacity,
        }
    }

    pub fn store_dir(&self) -> PathBuf {
        expand_tilde(&self.store.dir)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use consentd_core::ConsentValue;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = ConsentdConfig::parse("").unwrap();
        assert_eq!(config.store.name, DATASTORE_NAME);
        assert_eq!(config.store.key, CONSENT_PREFERENCES);
        assert_eq!(config.service.mailbox_capacity, 1024);
        assert!(config.default_consents().is_none());
    }

    #[test]
    fn defaults_section_decodes_as_xdm() {
        let config = ConsentdConfig::parse(
            r#"
            [defaults.consents.collect]
            val = "y"

            [defaults.consents.personalize.content]
            val = "n"

            [defaults.consents.adID]
            val = "bogus"
            "#,
        )
        .unwrap();
        let defaults = config.default_consents().unwrap();
        assert_eq!(defaults.len(), 2);
        assert_eq!(defaults.get("collect"), Some(ConsentValue::Yes));
        assert_eq!(defaults.get("personalize.content"), Some(ConsentValue::No));
    }

    #[test]
    fn dump_parses_back() {
        let toml = ConsentdConfig::default().to_toml();
        let back = ConsentdConfig::parse(&toml).unwrap();
        assert_eq!(back.store.dir, "~/.consentd");
        assert!(back.defaults.is_none());
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let err = ConsentdConfig::parse("[store\ndir = 1").unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn missing_file_falls_back() {
        let config = ConsentdConfig::load(Path::new("/nonexistent/consentd.toml"));
        assert_eq!(config.store.name, DATASTORE_NAME);
    }

    #[test]
    fn tilde_expansion() {
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(expand_tilde("~/x"), PathBuf::from(home).join("x"));
        }
    }
}
