use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::core::ArmSide;
use crate::error::DeviceError;

pub const DEFAULT_ARM_PORT: u16 = 8080;

/// Network address of one arm controller
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArmAddress {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_ARM_PORT
}

impl ArmAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse the host as an IP address
    pub fn ip(&self) -> Result<IpAddr, DeviceError> {
        self.host.parse().map_err(|_| DeviceError::Connection {
            address: self.to_string(),
            reason: format!("invalid IP address '{}'", self.host),
        })
    }
}

impl fmt::Display for ArmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One arm to connect, bound to a logical side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmConfig {
    pub side: ArmSide,
    pub address: ArmAddress,
}

/// End-effector pose: position in meters, fixed-axis XYZ euler angles in radians
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: [f64; 3],
    pub euler: [f64; 3],
}

impl Pose {
    /// Build from the driver's flat `[x, y, z, rx, ry, rz]` layout.
    ///
    /// Short inputs are padded with zeros.
    pub fn from_flat(values: &[f64]) -> Self {
        let mut flat = [0.0; 6];
        for (dst, src) in flat.iter_mut().zip(values) {
            *dst = *src;
        }
        Self {
            position: [flat[0], flat[1], flat[2]],
            euler: [flat[3], flat[4], flat[5]],
        }
    }

    /// Orientation as a unit quaternion `[w, x, y, z]`
    pub fn quaternion(&self) -> [f64; 4] {
        let [rx, ry, rz] = self.euler;
        let (sr, cr) = (rx * 0.5).sin_cos();
        let (sp, cp) = (ry * 0.5).sin_cos();
        let (sy, cy) = (rz * 0.5).sin_cos();

        [
            cr * cp * cy + sr * sp * sy,
            sr * cp * cy - cr * sp * sy,
            cr * sp * cy + sr * cp * sy,
            cr * cp * sy - sr * sp * cy,
        ]
    }
}

/// Current arm state as reported by the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmState {
    /// Joint angles in degrees
    pub joint: Vec<f64>,
    pub pose: Pose,
}

impl ArmState {
    pub fn joint_radians(&self) -> Vec<f64> {
        self.joint.iter().map(|deg| deg.to_radians()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GripperState {
    pub position: f64,
}

/// Controller firmware and library versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmSoftwareInfo {
    /// Arm model as reported by the controller
    pub product_version: String,
    pub algorithm_version: String,
    pub control_version: String,
    pub dynamics_version: String,
    pub planning_version: String,
}

/// Result of polling one arm for one tick
#[derive(Debug, Clone, PartialEq)]
pub struct ArmSample {
    pub state: ArmState,
    /// Gripper reads fail independently of the arm; the arm sample is kept
    pub gripper: Result<GripperState, DeviceError>,
    /// Seconds since the UNIX epoch, taken when the read completed
    pub timestamp: f64,
}

/// Where a camera is opened from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CameraSource {
    Index(u32),
    Path(String),
}

impl CameraSource {
    /// Channel name used in `observation.camera_<name>`.
    ///
    /// Device paths use their final component (`/dev/video2` -> `video2`),
    /// numeric indices become `cam<N>`.
    pub fn channel_name(&self) -> String {
        match self {
            CameraSource::Index(i) => format!("cam{i}"),
            CameraSource::Path(path) => path
                .rsplit('/')
                .find(|part| !part.is_empty())
                .unwrap_or(path.as_str())
                .to_string(),
        }
    }
}

impl FromStr for CameraSource {
    type Err = std::convert::Infallible;

    /// Numeric strings are indices, anything else a device path
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<u32>() {
            Ok(index) => CameraSource::Index(index),
            Err(_) => CameraSource::Path(s.to_string()),
        })
    }
}

impl fmt::Display for CameraSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraSource::Index(i) => write!(f, "{i}"),
            CameraSource::Path(p) => f.write_str(p),
        }
    }
}

/// Target capture format for a camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pose_from_flat_pads_short_input() {
        let pose = Pose::from_flat(&[0.1, 0.2]);
        assert_eq!(pose.position, [0.1, 0.2, 0.0]);
        assert_eq!(pose.euler, [0.0; 3]);
    }

    #[test]
    fn test_identity_quaternion() {
        let pose = Pose::default();
        assert_eq!(pose.quaternion(), [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_yaw_quaternion() {
        let pose = Pose {
            position: [0.0; 3],
            euler: [0.0, 0.0, std::f64::consts::FRAC_PI_2],
        };
        let [w, x, y, z] = pose.quaternion();
        let half = std::f64::consts::FRAC_1_SQRT_2;
        assert!((w - half).abs() < 1e-12);
        assert!(x.abs() < 1e-12);
        assert!(y.abs() < 1e-12);
        assert!((z - half).abs() < 1e-12);
    }

    #[test]
    fn test_camera_source_parsing_and_names() {
        let index: CameraSource = "1".parse().unwrap();
        assert_eq!(index, CameraSource::Index(1));
        assert_eq!(index.channel_name(), "cam1");

        let path: CameraSource = "/dev/video2".parse().unwrap();
        assert_eq!(path.channel_name(), "video2");
    }

    #[test]
    fn test_invalid_ip_is_connection_error() {
        let address = ArmAddress::new("not-an-ip", 8080);
        assert!(matches!(address.ip(), Err(DeviceError::Connection { .. })));
        assert!(ArmAddress::new("169.254.128.18", 8080).ip().is_ok());
    }
}
