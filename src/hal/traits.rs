use async_trait::async_trait;

use super::types::{
    ArmAddress, ArmSoftwareInfo, ArmState, CameraSettings, CameraSource, GripperState,
};
use crate::core::ImageBuffer;
use crate::error::DeviceError;

/// Session with one arm controller.
///
/// A handle is owned by exactly one caller at a time and is never entered
/// from two tasks concurrently.
#[async_trait]
pub trait ArmDriver: Send {
    /// Identifier used in logs (usually the controller address)
    fn id(&self) -> &str;

    /// Current joint angles (degrees) and end-effector pose
    async fn read_state(&mut self) -> Result<ArmState, DeviceError>;

    async fn read_gripper(&mut self) -> Result<GripperState, DeviceError>;

    async fn software_info(&mut self) -> Result<ArmSoftwareInfo, DeviceError>;

    /// Joint-space move, joints in degrees. Passed through to the controller.
    async fn move_to(&mut self, joints: &[f64], speed: u32, blocking: bool) -> Result<(), DeviceError>;

    async fn disconnect(&mut self) -> Result<(), DeviceError>;
}

/// Opens arm sessions
#[async_trait]
pub trait ArmConnector: Send + Sync {
    async fn connect(&self, address: &ArmAddress) -> Result<Box<dyn ArmDriver>, DeviceError>;
}

/// An opened camera capture
#[async_trait]
pub trait CameraDriver: Send {
    fn id(&self) -> &str;

    /// Apply target resolution and frame rate
    async fn configure(&mut self, settings: &CameraSettings) -> Result<(), DeviceError>;

    async fn read_frame(&mut self) -> Result<ImageBuffer, DeviceError>;

    async fn close(&mut self) -> Result<(), DeviceError>;
}

/// Opens camera captures
#[async_trait]
pub trait CameraConnector: Send + Sync {
    async fn open(&self, source: &CameraSource) -> Result<Box<dyn CameraDriver>, DeviceError>;
}
