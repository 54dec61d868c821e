use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::devices::handle::{BY_ID_DIR, PS3_PREFIX};
use crate::devices::{CombinedPaths, DeviceHandle, DeviceKind, LoopSettings};
use crate::rotary::{EncoderLines, SamplerSettings};

const CONFIG_DIR: &str = "matrix-input";
const CONFIG_FILE: &str = "config.toml";

const MAX_LINE: u8 = 31;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Line {0} is used more than once")]
    DuplicateLine(u8),

    #[error("Line {0} is out of range (max 31)")]
    LineOutOfRange(u8),

    #[error("Device {name}: {reason}")]
    Device { name: String, reason: String },
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(default)]
pub struct AppConfig {
    pub rotary: RotaryConfig,
    pub devices: DevicesConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct RotaryConfig {
    pub clk_pin: u8,
    pub dt_pin: u8,
    pub sw_pin: u8,
    pub power_pin: Option<u8>,
    pub settle_ms: u64,
    pub refresh_ms: u64,
    /// Program and arguments run when the power switch is pressed
    pub power_command: Option<Vec<String>>,
}

impl Default for RotaryConfig {
    fn default() -> Self {
        let defaults = SamplerSettings::default();
        Self {
            clk_pin: defaults.lines.clk,
            dt_pin: defaults.lines.dt,
            sw_pin: defaults.lines.switch,
            power_pin: defaults.lines.power,
            settle_ms: defaults.settle.as_millis() as u64,
            refresh_ms: 1000,
            power_command: None,
        }
    }
}

impl RotaryConfig {
    pub fn sampler_settings(&self) -> SamplerSettings {
        SamplerSettings {
            lines: EncoderLines {
                clk: self.clk_pin,
                dt: self.dt_pin,
                switch: self.sw_pin,
                power: self.power_pin,
            },
            settle: Duration::from_millis(self.settle_ms),
        }
    }

    pub fn refresh(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        let lines = [self.clk_pin, self.dt_pin, self.sw_pin]
            .into_iter()
            .chain(self.power_pin);
        for line in lines {
            if line > MAX_LINE {
                return Err(ConfigError::LineOutOfRange(line));
            }
            if !seen.insert(line) {
                return Err(ConfigError::DuplicateLine(line));
            }
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct DevicesConfig {
    pub by_id_dir: PathBuf,
    pub combined_prefix: String,
    pub max_connect_tries: u32,
    pub retry_interval_ms: u64,
    pub poll_interval_us: u64,
    #[serde(rename = "device")]
    pub entries: Vec<DeviceEntry>,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        let defaults = LoopSettings::default();
        Self {
            by_id_dir: PathBuf::from(BY_ID_DIR),
            combined_prefix: PS3_PREFIX.to_string(),
            max_connect_tries: defaults.max_connect_tries,
            retry_interval_ms: defaults.retry_interval.as_millis() as u64,
            poll_interval_us: defaults.poll_interval.as_micros() as u64,
            entries: Vec::new(),
        }
    }
}

impl DevicesConfig {
    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            max_connect_tries: self.max_connect_tries,
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            poll_interval: Duration::from_micros(self.poll_interval_us),
        }
    }

    /// Builds and opens a handle for one entry; a missing node only leaves
    /// the handle not found
    pub fn open(&self, entry: &DeviceEntry) -> Result<DeviceHandle, ConfigError> {
        entry.validate()?;
        let mut handle = DeviceHandle::new();
        match (entry.kind, &entry.path, entry.number, &entry.pairing) {
            (DeviceKind::CombinedController, _, _, Some(pairing)) => {
                handle.open_combined(CombinedPaths::from_identity(
                    &self.by_id_dir,
                    &self.combined_prefix,
                    pairing,
                ));
            }
            (kind, Some(path), _, _) => handle.open_path(path, kind),
            (DeviceKind::Keyboard, None, Some(n), _) => handle.open_keyboard(n),
            (DeviceKind::Joystick, None, Some(n), _) => handle.open_joystick(n),
            _ => {
                return Err(ConfigError::Device {
                    name: entry.name.clone(),
                    reason: "no usable locator".to_string(),
                })
            }
        }
        debug!("Configured {} as {}", entry.name, entry.kind);
        Ok(handle)
    }
}

/// One `[[devices.device]]` table
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct DeviceEntry {
    pub name: String,
    pub kind: DeviceKind,
    /// Direct or by-id path (keyboard, joystick)
    pub path: Option<PathBuf>,
    /// `eventN` / `jsN` number (keyboard, joystick)
    pub number: Option<u32>,
    /// Pairing identity (combined controller)
    pub pairing: Option<String>,
    #[serde(default)]
    pub rumble: bool,
}

impl DeviceEntry {
    fn validate(&self) -> Result<(), ConfigError> {
        let reason = match self.kind {
            DeviceKind::CombinedController if self.pairing.is_none() => {
                Some("combined controller needs `pairing`")
            }
            DeviceKind::Keyboard | DeviceKind::Joystick
                if self.path.is_none() && self.number.is_none() =>
            {
                Some("needs `path` or `number`")
            }
            DeviceKind::Keyboard | DeviceKind::Joystick if self.rumble => {
                Some("rumble is only supported on combined controllers")
            }
            _ => None,
        };
        match reason {
            Some(reason) => Err(ConfigError::Device {
                name: self.name.clone(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rotary.validate()?;
        self.devices
            .entries
            .iter()
            .try_for_each(DeviceEntry::validate)
    }

    /// Loads an explicit path, or the default location if present
    ///
    /// A missing default file yields the defaults; an explicit path must be
    /// readable and valid.
    pub async fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let Some(path) = Self::default_path() else {
                    warn!("No config directory, using defaults");
                    return Ok(Self::default());
                };
                if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    warn!("No config file at {}, using defaults", path.display());
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
        let config = Self::from_toml(&content, &path)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_encoder_board() {
        let config = AppConfig::default();
        let settings = config.rotary.sampler_settings();
        assert_eq!(settings.lines.clk, 25);
        assert_eq!(settings.lines.dt, 9);
        assert_eq!(settings.lines.switch, 10);
        assert_eq!(settings.lines.power, Some(3));
        assert_eq!(config.rotary.refresh(), Duration::from_secs(1));
        assert_eq!(config.devices.loop_settings().max_connect_tries, 5);
    }

    #[test]
    fn duplicate_lines_are_rejected() {
        let rotary = RotaryConfig {
            dt_pin: 25,
            ..RotaryConfig::default()
        };
        assert!(matches!(
            rotary.validate(),
            Err(ConfigError::DuplicateLine(25))
        ));
    }

    #[test]
    fn keyboard_without_locator_is_rejected() {
        let entry = DeviceEntry {
            name: "kb".into(),
            kind: DeviceKind::Keyboard,
            path: None,
            number: None,
            pairing: None,
            rumble: false,
        };
        assert!(matches!(entry.validate(), Err(ConfigError::Device { .. })));
    }

    #[test]
    fn combined_entry_opens_pairing_paths() {
        let devices = DevicesConfig {
            by_id_dir: PathBuf::from("/nonexistent/by-id"),
            ..DevicesConfig::default()
        };
        let entry = DeviceEntry {
            name: "pad".into(),
            kind: DeviceKind::CombinedController,
            path: None,
            number: None,
            pairing: Some("00:11:22:33:44:55".into()),
            rumble: true,
        };
        let handle = devices.open(&entry).unwrap();
        assert_eq!(handle.kind(), Some(DeviceKind::CombinedController));
        assert!(!handle.is_found());
        assert_eq!(
            handle.paths()[1],
            Path::new("/nonexistent/by-id/PLAYSTATION_R_3_Controller__00:11:22:33:44:55_js")
        );
    }
}
