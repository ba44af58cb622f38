pub mod mock;
pub mod pool;
pub mod traits;
pub mod types;

pub use pool::{ArmReadings, CameraReadings, DevicePool};
pub use traits::{ArmConnector, ArmDriver, CameraConnector, CameraDriver};
pub use types::{
    ArmAddress, ArmConfig, ArmSample, ArmSoftwareInfo, ArmState, CameraSettings, CameraSource, GripperState, Pose,
    DEFAULT_ARM_PORT,
};
