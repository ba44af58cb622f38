pub mod arm;
pub mod camera;

pub use arm::{ArmFaults, SimulatedArm, SimulatedArmConnector, SIMULATED_FAULT_CODE};
pub use camera::{CameraFaults, SimulatedCamera, SimulatedCameraConnector};
