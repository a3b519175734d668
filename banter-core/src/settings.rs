//! Engine-wide settings, loaded from a TOML config file
//!
//! Individual module settings are the module's own business (the generic
//! key/value store is there for that); this covers the system-wide knobs:
//! the active locale, the plugin and phrase-pool directories, and the
//! channel filters.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use banter_plugin_api::Locale;

use crate::error::EngineError;

/// System-wide settings.
///
/// Unknown keys and unrecognized values are fatal at load time; a config
/// that parses is a config the engine fully understood.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Active response locale; `any` is not a valid system locale
    locale: Locale,
    /// Directory swept for module libraries
    #[serde(rename = "plugins")]
    plugin_path: PathBuf,
    /// Root directory for phrase-pool files
    #[serde(rename = "abstracts")]
    abstract_path: PathBuf,
    /// Channels the engine responds in; empty means all
    channels: Vec<String>,
    /// Channels the engine never speaks in during broadcasts
    silent: Vec<String>,
    /// Plugin names that may never be enabled
    noplugin: Vec<String>,
    /// Minimum random response delay, seconds
    min_random_delay: u64,
    /// Maximum random response delay, seconds
    max_random_delay: u64,

    /// Ad-hoc string values set at runtime by modules; not configurable
    #[serde(skip)]
    values: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            locale: Locale::En,
            plugin_path: PathBuf::from("./plugins"),
            abstract_path: PathBuf::from("./abstracts"),
            channels: Vec::new(),
            silent: Vec::new(),
            noplugin: Vec::new(),
            min_random_delay: 2,
            max_random_delay: 4,
            values: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, EngineError> {
        let settings: Self =
            toml::from_str(content).map_err(|e| EngineError::Config(e.to_string()))?;
        if settings.locale == Locale::Any {
            return Err(EngineError::Config(
                "locale cannot be set to \"any\"".to_string(),
            ));
        }
        Ok(settings)
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Switch the active locale. `Any` is rejected.
    pub fn set_locale(&mut self, locale: Locale) -> bool {
        if locale == Locale::Any {
            return false;
        }
        self.locale = locale;
        true
    }

    pub fn plugin_path(&self) -> &Path {
        &self.plugin_path
    }

    pub fn abstract_path(&self) -> &Path {
        &self.abstract_path
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Whether the engine responds in this channel. An empty channel list
    /// allows everything.
    pub fn is_channel_allowed(&self, channel: &str) -> bool {
        self.channels.is_empty() || self.channels.iter().any(|c| c == channel)
    }

    /// Whether broadcasts skip this channel.
    pub fn is_channel_silent(&self, channel: &str) -> bool {
        self.silent.iter().any(|c| c == channel)
    }

    /// Whether a plugin of this name may be enabled.
    pub fn is_plugin_allowed(&self, plugin: &str) -> bool {
        !self.noplugin.iter().any(|p| p == plugin)
    }

    pub fn min_random_delay(&self) -> u64 {
        self.min_random_delay
    }

    pub fn max_random_delay(&self) -> u64 {
        self.max_random_delay
    }

    /// Store an ad-hoc string value, scoped process-wide.
    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    /// Read back an ad-hoc string value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Log the full settings state.
    pub fn dump(&self) {
        tracing::info!("--Settings");
        tracing::info!(locale = self.locale.code(), "  locale");
        tracing::info!(path = %self.plugin_path.display(), "  plugin path");
        tracing::info!(path = %self.abstract_path.display(), "  abstract path");
        tracing::info!(
            min = self.min_random_delay,
            max = self.max_random_delay,
            "  random delay"
        );
        tracing::info!(channels = ?self.channels, silent = ?self.silent, "  channels");
        tracing::info!(noplugin = ?self.noplugin, "  disallowed plugins");
        tracing::info!(values = ?self.values, "  user values");
    }
}
