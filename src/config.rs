//! Process configuration
//!
//! Settings come from an optional TOML file (by default
//! `~/.config/spacemouse-driver/config.toml`) and are then overridden by the
//! command line. None of this reaches the publish cycle; its timing and scaling
//! constants are fixed in [`crate::joystick`].

use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::service::DEFAULT_STREAM_BUFFER;

pub const DEFAULT_DEVICE: &str = "/dev/input/by-id/usb-3Dconnexion_SpaceMouse_Pro-event-mouse";

const CONFIG_DIR: &str = "spacemouse-driver";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("No SpaceMouse info file given (use --spacemouse-info-file or info_file in the config)")]
    MissingInfoFile,

    #[error("Invalid log level '{0}'")]
    InvalidLogLevel(String),
}

/// Evdev based driver for 3Dconnexion SpaceMouse
#[derive(Parser, Debug, Default)]
#[command(name = "spacemouse-driver", version)]
pub struct Cli {
    /// SpaceMouse info file (required unless set in the config file)
    #[arg(long)]
    pub spacemouse_info_file: Option<PathBuf>,

    /// The SpaceMouse device node to open
    #[arg(long)]
    pub device: Option<PathBuf>,

    /// Wait for SIGTERM or SIGINT instead of Enter on stdin
    #[arg(long)]
    pub wait_signal: bool,

    /// Alternative config file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DriverConfig {
    pub device: PathBuf,
    pub info_file: Option<PathBuf>,
    pub log_level: String,
    /// Packets queued per subscriber before new ones are dropped
    pub stream_buffer: usize,
    pub wait_signal: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
            info_file: None,
            log_level: "info".to_string(),
            stream_buffer: DEFAULT_STREAM_BUFFER,
            wait_signal: false,
        }
    }
}

impl DriverConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from `path`, or from the default location when `path` is `None`.
    ///
    /// An explicitly given file must exist; a missing default file just yields
    /// the defaults.
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }

    /// Command line values win over the file
    pub fn apply_cli(mut self, cli: &Cli) -> Self {
        if let Some(device) = &cli.device {
            self.device = device.clone();
        }
        if let Some(info_file) = &cli.spacemouse_info_file {
            self.info_file = Some(info_file.clone());
        }
        self.wait_signal |= cli.wait_signal;
        self
    }

    pub fn info_file(&self) -> Result<&Path, ConfigError> {
        self.info_file.as_deref().ok_or(ConfigError::MissingInfoFile)
    }

    pub fn log_level(&self) -> Result<Level, ConfigError> {
        Level::from_str(&self.log_level)
            .map_err(|_| ConfigError::InvalidLogLevel(self.log_level.clone()))
    }
}
