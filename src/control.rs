//! Direct arm commands outside of a recording session.

use crate::core::ArmSide;
use crate::error::{RecorderError, RecorderResult};
use crate::hal::{ArmAddress, ArmConfig, ArmConnector, ArmSoftwareInfo, ArmState, DevicePool};

/// Joints a move command must name
pub const ARM_JOINTS: usize = 7;

pub const DEFAULT_MOVE_SPEED: u32 = 20;

/// Unit of the angles passed to [`ArmController::set_joint_states`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AngleUnit {
    #[default]
    Radians,
    Degrees,
}

impl AngleUnit {
    fn to_degrees(self, angle: f64) -> f64 {
        match self {
            AngleUnit::Radians => angle.to_degrees(),
            AngleUnit::Degrees => angle,
        }
    }
}

/// Reads and commands connected arms.
///
/// Commands go to the driver unchanged apart from unit conversion; there is
/// no planning or limit checking here.
pub struct ArmController {
    pool: DevicePool,
}

impl ArmController {
    pub async fn connect(connector: &dyn ArmConnector, arms: &[ArmConfig]) -> RecorderResult<Self> {
        let mut pool = DevicePool::new();
        pool.connect_arms(connector, arms).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: DevicePool) -> Self {
        Self { pool }
    }

    pub fn connected_arms(&self) -> Vec<ArmSide> {
        self.pool.connected_arms()
    }

    pub async fn read_state(&mut self, side: ArmSide) -> RecorderResult<ArmState> {
        self.pool
            .arm_mut(side)?
            .read_state()
            .await
            .map_err(RecorderError::Device)
    }

    /// Controller model and software versions
    pub async fn software_info(&mut self, side: ArmSide) -> RecorderResult<ArmSoftwareInfo> {
        self.pool
            .arm_mut(side)?
            .software_info()
            .await
            .map_err(RecorderError::Device)
    }

    pub fn address(&self, side: ArmSide) -> Option<&ArmAddress> {
        self.pool.arm_address(side)
    }

    /// Current joint angles in radians
    pub async fn read_joint_states(&mut self, side: ArmSide) -> RecorderResult<Vec<f64>> {
        Ok(self.read_state(side).await?.joint_radians())
    }

    /// Joint-space move to exactly [`ARM_JOINTS`] angles
    pub async fn set_joint_states(
        &mut self,
        side: ArmSide,
        angles: &[f64],
        unit: AngleUnit,
        speed: u32,
        blocking: bool,
    ) -> RecorderResult<()> {
        if angles.len() != ARM_JOINTS {
            return Err(RecorderError::InvalidArgument(format!(
                "expected {ARM_JOINTS} joint angles, got {}",
                angles.len()
            )));
        }

        let degrees: Vec<f64> = angles.iter().map(|a| unit.to_degrees(*a)).collect();
        tracing::info!("Moving {} arm to {:?} deg at speed {}", side, degrees, speed);

        self.pool
            .arm_mut(side)?
            .move_to(&degrees, speed, blocking)
            .await
            .map_err(RecorderError::Device)
    }

    pub async fn disconnect(mut self) {
        self.pool.disconnect_all().await;
    }
}
