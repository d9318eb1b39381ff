//! Static device metadata
//!
//! Loaded once from the joystick info file and attached verbatim to every
//! published header. The publish cycle treats [`DeviceInfo`] as opaque.
//!
//! ```toml
//! [device]
//! name = "spacemouse"
//! manufacturer = "3Dconnexion"
//! model = "SpaceMouse Pro"
//! serial_number = "ABC123"
//! description = "6 DOF mouse"
//!
//! [joystick]
//! axis_count = 6
//! button_count = 4
//! hat_count = 0
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::joystick::{AXIS_COUNT, BUTTON_COUNT};

#[derive(Debug, thiserror::Error)]
pub enum InfoError {
    #[error("Failed to read info file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse info file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Info file declares {declared} {what}, device provides {expected}")]
    CapabilityMismatch {
        what: &'static str,
        declared: usize,
        expected: usize,
    },
}

/// Identity of the physical device
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub description: String,
}

impl DeviceInfo {
    /// Flat attribute map advertised to the transport layer for discovery.
    /// Empty fields are left out.
    pub fn service_attributes(&self) -> BTreeMap<String, String> {
        [
            ("device", &self.name),
            ("manufacturer", &self.manufacturer),
            ("model", &self.model),
            ("serial_number", &self.serial_number),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct JoystickCapabilities {
    #[serde(default = "default_axis_count")]
    pub axis_count: usize,
    #[serde(default = "default_button_count")]
    pub button_count: usize,
    #[serde(default)]
    pub hat_count: usize,
}

impl Default for JoystickCapabilities {
    fn default() -> Self {
        Self {
            axis_count: AXIS_COUNT,
            button_count: BUTTON_COUNT,
            hat_count: 0,
        }
    }
}

fn default_axis_count() -> usize {
    AXIS_COUNT
}

fn default_button_count() -> usize {
    BUTTON_COUNT
}

/// Contents of the joystick info file
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct JoystickInfo {
    #[serde(rename = "device")]
    pub device_info: DeviceInfo,
    #[serde(default, rename = "joystick")]
    pub capabilities: JoystickCapabilities,
}

impl JoystickInfo {
    pub fn from_toml_str(content: &str) -> Result<Self, InfoError> {
        let info: JoystickInfo = toml::from_str(content)?;
        info.validate()?;
        Ok(info)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, InfoError> {
        let path = path.as_ref();
        debug!("Loading joystick info from {}", path.display());

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| InfoError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let info = Self::from_toml_str(&content)?;

        info!(
            "Loaded joystick info for '{}' ({} {})",
            info.device_info.name, info.device_info.manufacturer, info.device_info.model
        );
        Ok(info)
    }

    // The state arrays are fixed-size; an info file promising more is wrong
    fn validate(&self) -> Result<(), InfoError> {
        let checks = [
            ("axes", self.capabilities.axis_count, AXIS_COUNT),
            ("buttons", self.capabilities.button_count, BUTTON_COUNT),
            ("hats", self.capabilities.hat_count, 0),
        ];
        for (what, declared, expected) in checks {
            if declared != expected {
                return Err(InfoError::CapabilityMismatch {
                    what,
                    declared,
                    expected,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: &str = r#"
[device]
name = "spacemouse"
manufacturer = "3Dconnexion"
model = "SpaceMouse Pro"
serial_number = "ABC123"

[joystick]
axis_count = 6
button_count = 4
hat_count = 0
"#;

    #[test]
    fn parses_full_info_file() {
        let info = JoystickInfo::from_toml_str(INFO).unwrap();
        assert_eq!(info.device_info.name, "spacemouse");
        assert_eq!(info.device_info.model, "SpaceMouse Pro");
        assert_eq!(info.device_info.description, "");
        assert_eq!(info.capabilities, JoystickCapabilities::default());
    }

    #[test]
    fn capabilities_default_when_omitted() {
        let info = JoystickInfo::from_toml_str("[device]\nname = \"sm\"\n").unwrap();
        assert_eq!(info.capabilities.axis_count, 6);
        assert_eq!(info.capabilities.button_count, 4);
        assert_eq!(info.capabilities.hat_count, 0);
    }

    #[test]
    fn rejects_mismatched_capabilities() {
        let content = "[device]\nname = \"sm\"\n[joystick]\nbutton_count = 15\n";
        match JoystickInfo::from_toml_str(content) {
            Err(InfoError::CapabilityMismatch {
                what,
                declared,
                expected,
            }) => {
                assert_eq!(what, "buttons");
                assert_eq!(declared, 15);
                assert_eq!(expected, 4);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn rejects_missing_device_section() {
        assert!(matches!(
            JoystickInfo::from_toml_str("[joystick]\naxis_count = 6\n"),
            Err(InfoError::Parse(_))
        ));
    }

    #[test]
    fn attributes_skip_empty_fields() {
        let info = JoystickInfo::from_toml_str(INFO).unwrap();
        let attributes = info.device_info.service_attributes();
        assert_eq!(attributes.get("device").map(String::as_str), Some("spacemouse"));
        assert_eq!(attributes.get("serial_number").map(String::as_str), Some("ABC123"));
        assert!(!attributes.contains_key("description"));
        assert_eq!(attributes.len(), 4);
    }

    #[tokio::test]
    async fn load_reports_missing_file() {
        let result = JoystickInfo::load("/nonexistent/spacemouse-info.toml").await;
        assert!(matches!(result, Err(InfoError::Read { .. })));
    }
}
