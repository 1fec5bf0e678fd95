use anyhow::{Context, Result};
use dirs::home_dir;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::controller::Controller;
use crate::fleet::FleetObserver;
use crate::location::FleetScope;
use crate::types::Credentials;

/// Configuration data stored in ~/.hx3.yml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    #[serde(default)]
    pub last_refresh: i64,
    /// Restrict polling to a single location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    /// Restrict polling to a single controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_id: Option<String>,
}

impl Config {
    pub fn scope(&self) -> FleetScope {
        FleetScope {
            location_id: self.location_id.clone(),
            controller_id: self.controller_id.clone(),
        }
    }

    /// Overwrites the token state, keeping the scope settings.
    pub fn apply_credentials(&mut self, credentials: &Credentials) {
        self.email = credentials.email.clone();
        self.token = credentials.token.clone();
        self.access_token = credentials.access_token.clone();
        self.refresh_token = credentials.refresh_token.clone();
        self.ttl = credentials.ttl;
        self.last_refresh = credentials.last_refresh;
    }
}

impl From<&Credentials> for Config {
    fn from(credentials: &Credentials) -> Self {
        let mut config = Config::default();
        config.apply_credentials(credentials);
        config
    }
}

impl From<&Config> for Credentials {
    fn from(config: &Config) -> Self {
        Self {
            email: config.email.clone(),
            token: config.token.clone(),
            access_token: config.access_token.clone(),
            refresh_token: config.refresh_token.clone(),
            ttl: config.ttl,
            last_refresh: config.last_refresh,
        }
    }
}

/// Get the path to the configuration file (~/.hx3.yml)
pub fn get_config_path() -> Result<PathBuf> {
    let home = home_dir().context("Failed to determine home directory")?;
    Ok(home.join(".hx3.yml"))
}

/// Load configuration from ~/.hx3.yml
pub fn load_config() -> Result<Config> {
    load_config_from(&get_config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "Not logged in. Please run 'hx3 login' first."
        ));
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    if config.token.is_none() && config.access_token.is_none() {
        return Err(anyhow::anyhow!(
            "Configuration incomplete. Please run 'hx3 login' first."
        ));
    }

    debug!("Loaded configuration for: {}", config.email);
    Ok(config)
}

/// Save configuration to ~/.hx3.yml
pub fn save_config(config: &Config) -> Result<()> {
    save_config_to(&get_config_path()?, config)
}

pub fn save_config_to(path: &Path, config: &Config) -> Result<()> {
    let content = serde_yaml::to_string(config).context("Failed to serialize configuration")?;

    fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    debug!("Saved configuration for: {}", config.email);
    Ok(())
}

/// Clear the configuration file (logout)
pub fn clear_config() -> Result<()> {
    clear_config_at(&get_config_path()?)
}

pub fn clear_config_at(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        debug!("Configuration file cleared");
    } else {
        warn!("Configuration file does not exist, nothing to clear");
    }

    Ok(())
}

/// Writes refreshed tokens back to the config file after each polling cycle.
pub struct ConfigPersister {
    path: PathBuf,
    config: Mutex<Config>,
}

impl ConfigPersister {
    pub fn new(path: PathBuf, config: Config) -> Self {
        Self {
            path,
            config: Mutex::new(config),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> Config {
        match self.config.lock() {
            Ok(config) => config.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl FleetObserver for ConfigPersister {
    fn on_session_persisted(&self, credentials: &Credentials) {
        let mut config = match self.config.lock() {
            Ok(config) => config,
            Err(poisoned) => poisoned.into_inner(),
        };
        if Credentials::from(&*config) == *credentials {
            return;
        }
        // Remember the tokens only once they are on disk.
        let mut updated = config.clone();
        updated.apply_credentials(credentials);
        match save_config_to(&self.path, &updated) {
            Ok(()) => *config = updated,
            Err(e) => warn!("Failed to persist refreshed tokens: {:#}", e),
        }
    }

    fn on_topology_changed(&self, controllers: &[Controller]) {
        debug!("Now tracking {} controllers", controllers.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_config() -> Config {
        Config {
            email: "test@example.com".to_string(),
            token: Some("token123".to_string()),
            access_token: Some("access123".to_string()),
            refresh_token: Some("refresh456".to_string()),
            ttl: Some(3600),
            last_refresh: 1_700_000_000,
            location_id: Some("loc1".to_string()),
            controller_id: None,
        }
    }

    #[test]
    fn test_config_conversion() {
        let config = sample_config();

        let credentials = Credentials::from(&config);
        assert_eq!(credentials.email, "test@example.com");
        assert_eq!(credentials.access_token.as_deref(), Some("access123"));
        assert_eq!(credentials.last_refresh, 1_700_000_000);

        let back = Config::from(&credentials);
        assert_eq!(back.refresh_token, config.refresh_token);
        assert_eq!(back.location_id, None);
    }

    #[test]
    fn test_config_serialization() {
        let config = sample_config();

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("email: test@example.com"));
        assert!(yaml.contains("access_token: access123"));
        assert!(yaml.contains("location_id: loc1"));
        assert!(!yaml.contains("controller_id"));

        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_scope() {
        let scope = sample_config().scope();
        assert_eq!(scope.location_id.as_deref(), Some("loc1"));
        assert_eq!(scope.controller_id, None);
    }

    #[test]
    fn test_save_load_clear() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hx3.yml");

        assert!(load_config_from(&path).is_err());

        save_config_to(&path, &sample_config()).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), sample_config());

        clear_config_at(&path).unwrap();
        assert!(!path.exists());
        clear_config_at(&path).unwrap();
    }

    #[test]
    fn test_load_rejects_config_without_tokens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hx3.yml");
        fs::write(&path, "email: test@example.com\n").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("Configuration incomplete"));
    }

    #[test]
    fn test_persister_writes_new_tokens_and_keeps_scope() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hx3.yml");
        let persister = ConfigPersister::new(path.clone(), sample_config());

        let mut credentials = Credentials::from(&sample_config());
        credentials.access_token = Some("access789".to_string());
        credentials.last_refresh = 1_700_000_500;
        persister.on_session_persisted(&credentials);

        let saved = load_config_from(&path).unwrap();
        assert_eq!(saved.access_token.as_deref(), Some("access789"));
        assert_eq!(saved.last_refresh, 1_700_000_500);
        assert_eq!(saved.location_id.as_deref(), Some("loc1"));
        assert_eq!(persister.config(), saved);
    }

    #[test]
    fn test_persister_skips_unchanged_tokens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hx3.yml");
        let persister = ConfigPersister::new(path.clone(), sample_config());

        persister.on_session_persisted(&Credentials::from(&sample_config()));

        assert!(!path.exists());
    }

    #[test]
    fn test_persister_retries_after_failed_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("hx3.yml");
        let persister = ConfigPersister::new(path.clone(), sample_config());

        let mut credentials = Credentials::from(&sample_config());
        credentials.access_token = Some("access789".to_string());
        persister.on_session_persisted(&credentials);
        assert!(!path.exists());
        assert_eq!(persister.config(), sample_config());

        fs::create_dir(dir.path().join("missing")).unwrap();
        persister.on_session_persisted(&credentials);

        let saved = load_config_from(&path).unwrap();
        assert_eq!(saved.access_token.as_deref(), Some("access789"));
    }
}
