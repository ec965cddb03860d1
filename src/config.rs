//! Service configuration stored as TOML
//!
//! The file lives under the user's config directory unless a path is given on
//! the command line. A missing file is written out with defaults so the daemon
//! always starts, and every section falls back to its defaults when absent.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::controller::ControllerSettings;
use crate::vibrator::actuator::RejectedPair;
use crate::vibrator::catalog::{default_effects, EffectInfo};
use crate::vibrator::policy::ArbitrationConfig;
use crate::vibrator::types::DEFAULT_MAX_DURATION_MS;

const CONFIG_DIR: &str = "vibration-controller";
const CONFIG_FILE: &str = "config.toml";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct LimitsConfig {
    /// Longest accepted time based vibration
    #[serde(default = "default_max_duration")]
    pub max_duration_ms: i64,
    /// Capacity of the controller's command queue
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

fn default_max_duration() -> i64 {
    DEFAULT_MAX_DURATION_MS
}

fn default_command_buffer() -> usize {
    64
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_duration_ms: default_max_duration(),
            command_buffer: default_command_buffer(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PermissionConfig {
    /// Whether callers may start and stop vibrations at all
    #[serde(default = "default_granted")]
    pub vibrate_granted: bool,
}

fn default_granted() -> bool {
    true
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            vibrate_granted: default_granted(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ActuatorConfig {
    /// Effect/usage pairs the hardware refuses to play
    #[serde(default)]
    pub rejected: Vec<RejectedPair>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub arbitration: ArbitrationConfig,
    #[serde(default)]
    pub permission: PermissionConfig,
    #[serde(default)]
    pub actuator: ActuatorConfig,
    #[serde(default = "default_effects")]
    pub effects: Vec<EffectInfo>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            limits: LimitsConfig::default(),
            arbitration: ArbitrationConfig::default(),
            permission: PermissionConfig::default(),
            actuator: ActuatorConfig::default(),
            effects: default_effects(),
        }
    }
}

impl ServiceConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ServiceConfig =
            toml::from_str(content).map_err(|e| eyre!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| eyre!("Failed to serialize config: {}", e))
    }

    fn validate(&self) -> Result<()> {
        if self.limits.max_duration_ms <= 0 {
            return Err(eyre!(
                "limits.max_duration_ms must be positive, got {}",
                self.limits.max_duration_ms
            ));
        }
        if self.limits.command_buffer == 0 {
            return Err(eyre!("limits.command_buffer must be at least 1"));
        }
        if self.effects.is_empty() {
            warn!("Config registers no effects, every preset request will be rejected");
        }
        Ok(())
    }

    /// Loads the config at `path`, writing the defaults first when it is missing
    pub async fn load_or_create(path: &Path) -> Result<Self> {
        ensure_default_config(path).await?;

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

        let config = Self::from_toml_str(&content)?;
        info!(
            "Loaded config from {} ({} effects)",
            path.display(),
            config.effects.len()
        );
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }

        tokio::fs::write(path, self.to_toml_string()?)
            .await
            .map_err(|e| eyre!("Failed to write config file: {}", e))?;

        debug!("Config written to {}", path.display());
        Ok(())
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            max_duration_ms: self.limits.max_duration_ms,
            command_buffer: self.limits.command_buffer,
            vibrate_permission_granted: self.permission.vibrate_granted,
        }
    }
}

pub async fn ensure_default_config(path: &Path) -> Result<()> {
    let exists = tokio::fs::try_exists(path)
        .await
        .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?;

    if !exists {
        info!("Creating default configuration at {}", path.display());
        ServiceConfig::default().save(path).await?;
    }

    Ok(())
}

pub fn default_config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| {
        warn!("Could not determine config directory, using current directory");
        PathBuf::from(".")
    });
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    path
}
