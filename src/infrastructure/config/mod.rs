//! Configuration management

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::application::errors::ConfigError;

/// Bot configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub server: ServerConfig,
    pub identity: IdentityConfig,
    #[serde(default)]
    pub channels: Vec<String>,
    /// Plugin allow-list; absent means every plugin
    #[serde(default)]
    pub plugins: Option<Vec<String>>,
    /// Per-plugin settings, keyed by plugin name
    #[serde(default)]
    pub plugin_config: BTreeMap<String, PluginSettings>,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct IdentityConfig {
    pub nick: String,
    pub user: String,
    pub realname: String,
}

/// Opaque settings section handed to a plugin's init callback
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PluginSettings(BTreeMap<String, serde_yaml::Value>);

impl PluginSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_yaml::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn raw(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(serde_yaml::Value::as_str)
    }

    /// Deserialize the value under `key`, if present
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.0
            .get(key)
            .map(|v| {
                serde_yaml::from_value(v.clone())
                    .map_err(|e| ConfigError::InvalidValue(format!("{}: {}", key, e)))
            })
            .transpose()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn default_port() -> u16 {
    6667
}

fn default_reconnect_delay() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        let mut plugin_config = BTreeMap::new();
        plugin_config.insert(
            "urls".to_string(),
            PluginSettings::new().with("database", "./history.db"),
        );

        Self {
            server: ServerConfig {
                host: "irc.libera.chat".to_string(),
                port: 6697,
                tls: true,
                password: None,
            },
            identity: IdentityConfig {
                nick: "voidbot".to_string(),
                user: "voidbot".to_string(),
                realname: "voidbot".to_string(),
            },
            channels: vec!["#voidptr".to_string()],
            plugins: Some(vec!["commands".to_string(), "urls".to_string()]),
            plugin_config,
            reconnect_delay_secs: default_reconnect_delay(),
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.display().to_string())
            } else {
                ConfigError::Parse(format!("Failed to read config: {}", e))
            }
        })?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))
    }

    /// Check required fields. An empty plugin allow-list is allowed but logged.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::MissingField("server.host".to_string()));
        }
        for (field, value) in [
            ("identity.nick", &self.identity.nick),
            ("identity.user", &self.identity.user),
            ("identity.realname", &self.identity.realname),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(field.to_string()));
            }
        }
        if self.plugins.as_ref().is_some_and(Vec::is_empty) {
            tracing::warn!("You have no plugins enabled. This bot will do nothing.");
        }
        Ok(())
    }

    /// Settings section for `plugin`, empty if not configured
    pub fn plugin_settings(&self, plugin: &str) -> PluginSettings {
        self.plugin_config.get(plugin).cloned().unwrap_or_default()
    }

    /// Write the default configuration to `path` as YAML
    pub fn write_sample(path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let yaml = serde_yaml::to_string(&Config::default())
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path.as_ref(), yaml)
            .map_err(|e| ConfigError::InvalidValue(format!("Failed to write {}: {}", path.as_ref().display(), e)))
    }
}

#[cfg(test)]
mod tests;
