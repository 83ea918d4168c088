//! Gadget configuration management

use crate::hid::HidOptions;
use anyhow::{Context, Result, anyhow};
use protocol::LinkSpeed;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Largest accepted report, in bytes
pub const MAX_REPORT_LENGTH: usize = 1024;

/// Upper bound on isochronous transfers in flight
pub const MAX_AUDIO_TRANSFERS: usize = 32;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GadgetConfig {
    #[serde(default)]
    pub gadget: GadgetSettings,
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default)]
    pub hid: HidSettings,
    /// Simulated host used by the binary
    #[serde(default)]
    pub simulation: SimulationSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GadgetSettings {
    #[serde(default = "GadgetSettings::default_log_level")]
    pub log_level: String,
    /// Link speed reported by the loopback transport
    #[serde(default)]
    pub link_speed: LinkSpeed,
}

impl Default for GadgetSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            link_speed: LinkSpeed::default(),
        }
    }
}

impl GadgetSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Isochronous transfers kept in flight
    #[serde(default = "AudioSettings::default_transfers")]
    pub transfers: usize,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            transfers: Self::default_transfers(),
        }
    }
}

impl AudioSettings {
    fn default_transfers() -> usize {
        4
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HidSettings {
    /// Largest report accepted by a write
    #[serde(default = "HidSettings::default_report_length")]
    pub report_length: usize,
    /// Byte capacity of each report queue
    #[serde(default = "HidSettings::default_queue_capacity")]
    pub queue_capacity: usize,
    /// Arm a dedicated interrupt OUT endpoint for inbound reports
    #[serde(default)]
    pub out_endpoint: bool,
    /// Interrupt OUT transfers kept in flight
    #[serde(default = "HidSettings::default_out_transfers")]
    pub out_transfers: usize,
}

impl Default for HidSettings {
    fn default() -> Self {
        Self {
            report_length: Self::default_report_length(),
            queue_capacity: Self::default_queue_capacity(),
            out_endpoint: false,
            out_transfers: Self::default_out_transfers(),
        }
    }
}

impl HidSettings {
    fn default_report_length() -> usize {
        MAX_REPORT_LENGTH
    }

    fn default_queue_capacity() -> usize {
        4 * MAX_REPORT_LENGTH
    }

    fn default_out_transfers() -> usize {
        4
    }

    pub fn options(&self) -> HidOptions {
        HidOptions {
            max_report: self.report_length,
            queue_capacity: self.queue_capacity,
        }
    }

    /// Interrupt OUT pool size, when the endpoint is enabled
    pub fn out_pool(&self) -> Option<usize> {
        self.out_endpoint.then_some(self.out_transfers)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Run time in seconds (0 = until Ctrl-C)
    #[serde(default)]
    pub duration_secs: u64,
    /// Interval between host SET_REPORT requests
    #[serde(default = "SimulationSettings::default_report_interval")]
    pub report_interval_ms: u64,
    /// Frequency of the generated playback tone
    #[serde(default = "SimulationSettings::default_tone")]
    pub tone_hz: u32,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            duration_secs: 0,
            report_interval_ms: Self::default_report_interval(),
            tone_hz: Self::default_tone(),
        }
    }
}

impl SimulationSettings {
    fn default_report_interval() -> u64 {
        250
    }

    fn default_tone() -> u32 {
        440
    }
}

impl GadgetConfig {
    /// Load configuration from file
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/accessory-gadget/gadget.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: GadgetConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

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
            config_dir.join("accessory-gadget").join("gadget.toml")
        } else {
            PathBuf::from(".config/accessory-gadget/gadget.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.gadget.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.gadget.log_level,
                valid_levels.join(", ")
            ));
        }

        if !(1..=MAX_AUDIO_TRANSFERS).contains(&self.audio.transfers) {
            return Err(anyhow!(
                "Invalid audio.transfers {}, must be 1-{}",
                self.audio.transfers,
                MAX_AUDIO_TRANSFERS
            ));
        }

        let hid = &self.hid;
        if hid.report_length == 0 || hid.report_length > MAX_REPORT_LENGTH {
            return Err(anyhow!(
                "Invalid hid.report_length {}, must be 1-{}",
                hid.report_length,
                MAX_REPORT_LENGTH
            ));
        }
        if hid.queue_capacity < hid.report_length {
            return Err(anyhow!(
                "hid.queue_capacity {} is smaller than hid.report_length {}",
                hid.queue_capacity,
                hid.report_length
            ));
        }
        if hid.out_endpoint && !(1..=MAX_AUDIO_TRANSFERS).contains(&hid.out_transfers) {
            return Err(anyhow!(
                "Invalid hid.out_transfers {}, must be 1-{}",
                hid.out_transfers,
                MAX_AUDIO_TRANSFERS
            ));
        }

        Ok(())
    }
}

/// Load configuration from a path that may start with `~`
pub fn load_config(path: &str) -> Result<GadgetConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    GadgetConfig::load(Some(path_buf))
}
