//! Turns one tick's raw device readings into frame contents.

use crate::core::{ArmSide, FeatureKey, FrameData};
use crate::hal::{ArmReadings, ArmSample, CameraReadings, DevicePool};

/// What went wrong during one tick. A clean tick has no failed arms and no
/// camera misses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub failed_arms: Vec<ArmSide>,
    pub camera_misses: usize,
}

impl TickReport {
    pub fn is_degraded(&self) -> bool {
        !self.failed_arms.is_empty() || self.camera_misses > 0
    }
}

/// Build frame contents from arm and camera readings.
///
/// Joints are converted to radians. Until teleoperation commands are
/// captured, `action.*` mirrors the observed state and `state.<side>_arm`
/// mirrors the joints. A side whose read failed contributes no keys.
pub fn translate(arms: ArmReadings, cameras: CameraReadings) -> (FrameData, TickReport) {
    let mut data = FrameData::new();
    let mut report = TickReport::default();

    for (side, reading) in arms {
        match reading {
            Ok(sample) => insert_arm(&mut data, side, &sample),
            Err(e) => {
                tracing::warn!("Failed to read {} arm: {}", side, e);
                report.failed_arms.push(side);
            }
        }
    }

    for (name, image) in cameras {
        match image {
            Some(image) => data.insert_image(FeatureKey::camera(name), image),
            None => report.camera_misses += 1,
        }
    }

    (data, report)
}

/// Poll the whole pool once and translate the result
pub async fn capture(pool: &mut DevicePool) -> (FrameData, TickReport) {
    let arms = pool.read_arms_parallel().await;
    let cameras = pool.read_cameras().await;
    translate(arms, cameras)
}

fn insert_arm(data: &mut FrameData, side: ArmSide, sample: &ArmSample) {
    let joints = sample.state.joint_radians();
    let pose = &sample.state.pose;

    data.insert_observation(FeatureKey::ObservationArm(side), joints.clone());
    data.insert_observation(FeatureKey::ObservationEefPos(side), pose.position.to_vec());
    data.insert_observation(FeatureKey::ObservationEefEuler(side), pose.euler.to_vec());
    data.insert_action(FeatureKey::ActionArm(side), joints.clone());
    data.insert_state(FeatureKey::StateArm(side), joints);

    if let Ok(gripper) = &sample.gripper {
        data.insert_observation(FeatureKey::ObservationGripper(side), gripper.position);
        data.insert_action(FeatureKey::ActionGripper(side), gripper.position);
    }
}
