use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::modem::{ModemModel, ModemPorts};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported config version {0}")]
    Version(u32),
    #[error("unknown modem model {0:?}")]
    Model(String),
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("invalid config TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelitConfigInput {
    pub version: u32,
    pub presence: PresenceConfigInput,
    pub modem: ModemConfigInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PresenceConfigInput {
    pub device_dir: Option<PathBuf>,
    pub mux_device: Option<String>,
    pub aux_device: Option<String>,
    pub detect_delay_ms: Option<u64>,
    pub open_delay_ms: Option<u64>,
    pub close_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModemConfigInput {
    pub model: Option<String>,
}

/// Where the multiplexer creates its device nodes and how long to let it
/// settle around them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceConfig {
    pub device_dir: PathBuf,
    /// Watched node; also the modem (data) channel.
    pub mux_device: String,
    pub aux_device: String,
    /// Wait after a device event before re-checking existence.
    pub detect_delay: Duration,
    /// Wait for the multiplexer to open a fresh device.
    pub open_delay: Duration,
    /// Wait for the multiplexer to close a vanished device.
    pub close_delay: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            device_dir: PathBuf::from("/dev"),
            mux_device: "ttyMUX1".into(),
            aux_device: "ttyMUX2".into(),
            detect_delay: Duration::from_millis(3000),
            open_delay: Duration::from_millis(1000),
            close_delay: Duration::from_millis(3000),
        }
    }
}

impl PresenceConfig {
    pub fn device_path(&self) -> PathBuf {
        self.device_dir.join(&self.mux_device)
    }

    pub fn ports(&self) -> ModemPorts {
        ModemPorts::in_dir(&self.device_dir, &self.mux_device, &self.aux_device)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModemConfig {
    pub model: ModemModel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelitConfig {
    pub version: u32,
    pub presence: PresenceConfig,
    pub modem: ModemConfig,
}

impl Default for TelitConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            presence: PresenceConfig::default(),
            modem: ModemConfig::default(),
        }
    }
}

fn non_empty(field: &'static str, value: Option<String>, default: String) -> Result<String, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Err(ConfigError::Empty(field)),
        Some(v) => Ok(v.trim().to_string()),
    }
}

impl TelitConfigInput {
    pub fn resolve(self) -> Result<TelitConfig, ConfigError> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(ConfigError::Version(version));
        }

        let defaults = PresenceConfig::default();
        let millis = |v: Option<u64>, d: Duration| v.map(Duration::from_millis).unwrap_or(d);
        let p = self.presence;
        let presence = PresenceConfig {
            device_dir: p.device_dir.unwrap_or(defaults.device_dir),
            mux_device: non_empty("presence.mux_device", p.mux_device, defaults.mux_device)?,
            aux_device: non_empty("presence.aux_device", p.aux_device, defaults.aux_device)?,
            detect_delay: millis(p.detect_delay_ms, defaults.detect_delay),
            open_delay: millis(p.open_delay_ms, defaults.open_delay),
            close_delay: millis(p.close_delay_ms, defaults.close_delay),
        };

        let model = match self.modem.model {
            None => ModemModel::default(),
            Some(name) => name
                .trim()
                .parse()
                .map_err(|_| ConfigError::Model(name.clone()))?,
        };

        Ok(TelitConfig {
            version,
            presence,
            modem: ModemConfig { model },
        })
    }
}

impl TelitConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(TelitConfig::default());
        }
        let parsed: TelitConfigInput = toml::from_str(input)?;
        parsed.resolve()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_toml_config_full() {
        let toml = r#"
            version = 1

            [presence]
            device_dir = "/tmp/mux"
            mux_device = "ttyGSM1"
            detect_delay_ms = 100
            open_delay_ms = 20
            close_delay_ms = 30

            [modem]
            model = "le910v2"
        "#;

        let cfg = TelitConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.version, CONFIG_VERSION);
        assert_eq!(cfg.presence.device_path(), PathBuf::from("/tmp/mux/ttyGSM1"));
        assert_eq!(cfg.presence.aux_device, "ttyMUX2", "unset fields keep defaults");
        assert_eq!(cfg.presence.detect_delay, Duration::from_millis(100));
        assert_eq!(cfg.presence.open_delay, Duration::from_millis(20));
        assert_eq!(cfg.presence.close_delay, Duration::from_millis(30));
        assert_eq!(cfg.modem.model, ModemModel::Le910v2);
        assert_eq!(cfg.presence.ports().aux, PathBuf::from("/tmp/mux/ttyMUX2"));
    }

    #[test]
    fn empty_input_is_default() {
        let cfg = TelitConfig::from_toml_str("  \n").unwrap();
        assert_eq!(cfg, TelitConfig::default());
        assert_eq!(cfg.presence.device_path(), PathBuf::from("/dev/ttyMUX1"));
        assert_eq!(cfg.modem.model, ModemModel::TelitSerial);
    }

    #[test]
    fn rejects_unknown_version_and_model() {
        assert!(matches!(
            TelitConfig::from_toml_str("version = 2"),
            Err(ConfigError::Version(2))
        ));
        assert!(matches!(
            TelitConfig::from_toml_str("[modem]\nmodel = \"he910\""),
            Err(ConfigError::Model(_))
        ));
        assert!(matches!(
            TelitConfig::from_toml_str("[presence]\nmux_device = \" \""),
            Err(ConfigError::Empty("presence.mux_device"))
        ));
        assert!(matches!(
            TelitConfig::from_toml_str("presence = 3"),
            Err(ConfigError::Toml(_))
        ));
    }
}
