use std::fs;
use std::path::{Path, PathBuf};

use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};

use crate::address::validate_port;
use crate::error::{Error, Result};
use crate::transfer::DEFAULT_PORT;

const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "lan";
const APP_NAME: &str = "lan_transfer";
const CONFIG_FILE: &str = "config.json";

/// Persisted operator settings, one block per role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub receiver_port: u16,
    pub receive_dir: PathBuf,
    pub sender_port: u16,
    /// Fixed peer to announce to; `None` means LAN traversal.
    pub announce_target: Option<String>,
    pub sender_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let receive_dir = UserDirs::new()
            .map(|dirs| {
                dirs.download_dir()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| dirs.home_dir().to_path_buf())
            })
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            receiver_port: DEFAULT_PORT,
            receive_dir,
            sender_port: DEFAULT_PORT,
            announce_target: None,
            sender_file: None,
        }
    }
}

impl AppConfig {
    fn get_config_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load config from the platform config dir or return defaults.
    pub fn load() -> Self {
        match Self::get_config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load config from `path`; a missing or malformed file yields defaults.
    pub fn load_from(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Self::default(),
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring malformed config {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Save config to the platform config dir.
    pub fn save(&self) -> Result<()> {
        match Self::get_config_path() {
            Some(path) => self.save_to(&path),
            None => {
                tracing::warn!("No config directory available, settings not saved");
                Ok(())
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::resource(format!("creating {}", parent.display()), e))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::InvalidFormat(format!("serializing config: {}", e)))?;
        fs::write(path, json)
            .map_err(|e| Error::resource(format!("writing {}", path.display()), e))
    }

    pub fn receiver_settings(&self) -> ReceiverSettings {
        ReceiverSettings {
            port: self.receiver_port.to_string(),
            dest_dir: self.receive_dir.display().to_string(),
            announce_target: self.announce_target.clone().unwrap_or_default(),
        }
    }

    pub fn sender_settings(&self) -> SenderSettings {
        SenderSettings {
            port: self.sender_port.to_string(),
        }
    }
}

/// Receiver inputs as typed by the operator. Validated on start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverSettings {
    pub port: String,
    pub dest_dir: String,
    /// Empty for LAN traversal.
    pub announce_target: String,
}

/// Sender discovery inputs as typed by the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderSettings {
    pub port: String,
}

/// One outbound file, as typed by the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendRequest {
    pub target_ip: String,
    pub port: String,
    pub file_path: String,
}

/// Ports derived from one configured base port `P`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortLayout {
    base: u16,
}

impl PortLayout {
    /// Fails when `P + 2` does not fit in a port number.
    pub fn new(base: u16) -> Result<Self> {
        if base.checked_add(2).is_none() {
            return Err(Error::PortOutOfRange(base));
        }
        Ok(Self { base })
    }

    /// Validate an operator-supplied port string.
    pub fn parse(s: &str) -> Result<Self> {
        Self::new(validate_port(s)?)
    }

    /// TCP file transfer.
    pub fn transfer(&self) -> u16 {
        self.base
    }

    /// UDP announce and collect.
    pub fn discovery(&self) -> u16 {
        self.base + 1
    }

    /// UDP out-of-band stop signal.
    pub fn stop_signal(&self) -> u16 {
        self.base + 2
    }
}
