//! Proxy configuration management

use anyhow::{Context, Result, anyhow};
use protocol::{IdentificationRecord, TopologyAddress};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub proxy: ProxySettings,
    #[serde(default)]
    pub usb: UsbSettings,
    /// Identification strings sent while announcing
    #[serde(default)]
    pub identity: IdentificationRecord,
    #[serde(default)]
    pub announce: AnnounceSettings,
    #[serde(default)]
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub hid: HidSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySettings {
    pub log_level: String,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Device to talk to, as BUSNUM-PORTNUMS (e.g. "2-1.4")
    #[serde(default)]
    pub port: Option<TopologyAddress>,
    /// Reset the device at the end of every run that does not announce
    #[serde(default)]
    pub reset_on_exit: bool,
    #[serde(default = "UsbSettings::default_control_timeout")]
    pub control_timeout_ms: u64,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            port: None,
            reset_on_exit: false,
            control_timeout_ms: Self::default_control_timeout(),
        }
    }
}

impl UsbSettings {
    fn default_control_timeout() -> u64 {
        1000
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnounceSettings {
    /// Ask AOAv2 devices to route audio to the accessory
    #[serde(default)]
    pub audio: bool,
}

/// Forwarding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Hold back external input until the accessory has sent something
    #[serde(default)]
    pub wait_for_first_byte: bool,
    /// Forward over a TCP connection to this localhost port instead of stdio
    #[serde(default)]
    pub connect_port: Option<u16>,
    /// Upper bound of one wait, and the bulk IN transfer timeout
    #[serde(default = "BridgeSettings::default_idle_timeout")]
    pub idle_timeout_ms: u64,
    /// Bulk OUT transfer timeout (0 = wait forever)
    #[serde(default)]
    pub write_timeout_ms: u64,
    /// How long outstanding transfers may take to finish on shutdown
    #[serde(default = "BridgeSettings::default_drain_timeout")]
    pub drain_timeout_ms: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            wait_for_first_byte: false,
            connect_port: None,
            idle_timeout_ms: Self::default_idle_timeout(),
            write_timeout_ms: 0,
            drain_timeout_ms: Self::default_drain_timeout(),
        }
    }
}

impl BridgeSettings {
    fn default_idle_timeout() -> u64 {
        1000
    }

    fn default_drain_timeout() -> u64 {
        1000
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HidSettings {
    /// Pause between registering the descriptor and sending reports
    #[serde(default = "HidSettings::default_settle_delay")]
    pub settle_delay_ms: u64,
}

impl Default for HidSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: Self::default_settle_delay(),
        }
    }
}

impl HidSettings {
    fn default_settle_delay() -> u64 {
        100
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl ProxyConfig {
    /// Load configuration from the specified path, or from the first
    /// standard location that exists
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => Self::find_existing(&Self::standard_paths())
                .ok_or_else(|| anyhow!("No configuration file found"))?,
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: ProxyConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

        tracing::debug!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load the first existing file among `candidates`
    ///
    /// Only a missing file falls back to defaults; a file that exists but
    /// cannot be read, parsed or validated is an error.
    pub fn load_first(candidates: &[PathBuf]) -> Result<Self> {
        match Self::find_existing(candidates) {
            Some(path) => Self::load(Some(path)),
            None => Ok(Self::default()),
        }
    }

    /// Load from the standard locations, or defaults if there is no file
    pub fn load_or_default() -> Result<Self> {
        Self::load_first(&Self::standard_paths())
    }

    /// Standard locations, in search order
    pub fn standard_paths() -> Vec<PathBuf> {
        vec![
            Self::default_path(),
            PathBuf::from("/etc/aoa-proxy/proxy.toml"),
        ]
    }

    fn find_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
        candidates.iter().find(|p| p.exists()).cloned()
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("aoa-proxy").join("proxy.toml")
        } else {
            PathBuf::from(".config/aoa-proxy/proxy.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.proxy.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.proxy.log_level,
                valid_levels.join(", ")
            ));
        }

        self.identity
            .validate()
            .context("Invalid identification string")?;

        if self.bridge.idle_timeout_ms == 0 {
            return Err(anyhow!("bridge.idle_timeout_ms must be greater than 0"));
        }

        if self.bridge.connect_port == Some(0) {
            return Err(anyhow!("bridge.connect_port must be between 1 and 65535"));
        }

        Ok(())
    }

    /// The device address, which every action needs
    pub fn topology(&self) -> Result<&TopologyAddress> {
        self.usb
            .port
            .as_ref()
            .ok_or_else(|| anyhow!("port is required (e.g. --port 2-1.4)"))
    }
}

/// Load a configuration file, expanding a leading `~`
pub fn load_config(path: &str) -> Result<ProxyConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    ProxyConfig::load(Some(path_buf))
}
