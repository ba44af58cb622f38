use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::ArmSide;
use crate::error::ConfigError;
use crate::hal::{ArmAddress, ArmConfig, CameraSettings, CameraSource, DEFAULT_ARM_PORT};

pub const DEFAULT_LEFT_ARM_HOST: &str = "169.254.128.18";
pub const DEFAULT_RIGHT_ARM_HOST: &str = "169.254.128.19";

/// Recorder configuration file format.
///
/// Every field has a default, so a partial file only overrides what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub dataset_path: PathBuf,
    pub dataset_name: String,
    pub robot_type: String,
    pub fps: u32,
    pub arms: Vec<ArmConfig>,
    pub cameras: Vec<CameraSource>,
    pub camera_settings: CameraSettings,
    /// How long `stop_recording` waits for the loop task
    pub stop_timeout_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("./lerobot_data"),
            dataset_name: "arm_dataset".to_string(),
            robot_type: "realman_dual_arm".to_string(),
            fps: 30,
            arms: vec![
                ArmConfig {
                    side: ArmSide::Left,
                    address: ArmAddress::new(DEFAULT_LEFT_ARM_HOST, DEFAULT_ARM_PORT),
                },
                ArmConfig {
                    side: ArmSide::Right,
                    address: ArmAddress::new(DEFAULT_RIGHT_ARM_HOST, DEFAULT_ARM_PORT),
                },
            ],
            cameras: Vec::new(),
            camera_settings: CameraSettings::default(),
            stop_timeout_ms: 2000,
        }
    }
}

impl RecorderConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fps == 0 {
            return Err(ConfigError::Invalid("fps must be greater than 0".to_string()));
        }
        if self.arms.is_empty() {
            return Err(ConfigError::Invalid("at least one arm must be configured".to_string()));
        }
        if self.dataset_name.trim().is_empty() {
            return Err(ConfigError::Invalid("dataset_name must not be empty".to_string()));
        }
        if self.stop_timeout_ms == 0 {
            return Err(ConfigError::Invalid("stop_timeout_ms must be greater than 0".to_string()));
        }
        for side in ArmSide::ALL {
            if self.arms.iter().filter(|a| a.side == side).count() > 1 {
                return Err(ConfigError::Invalid(format!("{side} arm configured twice")));
            }
        }
        Ok(())
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Replace the address of one side, adding the arm if it was not configured
    pub fn set_arm(&mut self, side: ArmSide, address: ArmAddress) {
        match self.arms.iter_mut().find(|a| a.side == side) {
            Some(arm) => arm.address = address,
            None => self.arms.push(ArmConfig { side, address }),
        }
    }

    pub fn remove_arm(&mut self, side: ArmSide) {
        self.arms.retain(|a| a.side != side);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = RecorderConfig::default();
        assert_eq!(config.fps, 30);
        assert_eq!(config.arms.len(), 2);
        assert_eq!(config.arms[0].address.to_string(), "169.254.128.18:8080");
        assert_eq!(config.stop_timeout(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = RecorderConfig::from_json(json!({
            "dataset_name": "pick_place",
            "fps": 10,
            "cameras": [0, "/dev/video2"]
        }))
        .unwrap();

        assert_eq!(config.dataset_name, "pick_place");
        assert_eq!(config.fps, 10);
        assert_eq!(config.robot_type, "realman_dual_arm");
        assert_eq!(
            config.cameras,
            vec![CameraSource::Index(0), CameraSource::Path("/dev/video2".to_string())]
        );
    }

    #[test]
    fn test_arm_port_defaults_to_8080() {
        let config = RecorderConfig::from_json(json!({
            "arms": [{"side": "left", "address": {"host": "10.0.0.5"}}]
        }))
        .unwrap();
        assert_eq!(config.arms[0].address.port, 8080);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(RecorderConfig::from_json(json!({"fps": 0})).is_err());
        assert!(RecorderConfig::from_json(json!({"arms": []})).is_err());
        assert!(RecorderConfig::from_json(json!({"dataset_name": " "})).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recorder.json");
        std::fs::write(&path, r#"{"robot_type": "single_arm", "stop_timeout_ms": 500}"#).unwrap();

        let config = RecorderConfig::from_file(&path).unwrap();
        assert_eq!(config.robot_type, "single_arm");
        assert_eq!(config.stop_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_set_and_remove_arm() {
        let mut config = RecorderConfig::default();
        config.set_arm(ArmSide::Right, ArmAddress::new("10.0.0.2", 9000));
        assert_eq!(config.arms[1].address.port, 9000);

        config.remove_arm(ArmSide::Left);
        assert_eq!(config.arms.len(), 1);
        assert_eq!(config.arms[0].side, ArmSide::Right);
    }
}
