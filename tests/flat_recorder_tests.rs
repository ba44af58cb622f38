use anyhow::Result;
use std::time::Duration;

use arm_recorder::core::ArmSide;
use arm_recorder::engine::LoopState;
use arm_recorder::hal::mock::{SimulatedArmConnector, SIMULATED_FAULT_CODE};
use arm_recorder::hal::{ArmAddress, ArmConfig};
use arm_recorder::recorder::flat::{FlatRecording, GripperEntry};
use arm_recorder::FlatRecorder;

const ARM1_HOST: &str = "192.168.1.18";
const ARM2_HOST: &str = "192.168.1.19";

fn arms() -> Vec<ArmConfig> {
    vec![
        ArmConfig {
            side: ArmSide::Left,
            address: ArmAddress::new(ARM1_HOST, 8080),
        },
        ArmConfig {
            side: ArmSide::Right,
            address: ArmAddress::new(ARM2_HOST, 8080),
        },
    ]
}

#[tokio::test]
async fn test_failed_arm_is_reported_in_its_entry() -> Result<()> {
    let connector = SimulatedArmConnector::new();
    connector.faults_for(ARM2_HOST).fail_next_reads(1);

    let mut recorder = FlatRecorder::new(30, Duration::from_secs(2));
    recorder.connect(&connector, &arms()).await?;

    let report = recorder.record_frame().await?;
    assert_eq!(report.failed_arms, vec![ArmSide::Right]);
    recorder.record_frame().await?;

    let recording = recorder.recording().expect("recording available");
    assert_eq!(recording.metadata.num_frames, 2);

    let first = &recording.frames[0];
    assert_eq!(first.frame_number, 0);
    let arm1 = first.arm1.as_ref().expect("arm1 entry");
    assert!(arm1.error.is_none());
    assert_eq!(arm1.joint_states.as_ref().map(|j| j.angles_deg.len()), Some(7));

    let arm2 = first.arm2.as_ref().expect("arm2 entry");
    assert!(arm2.error.is_some());
    assert!(arm2.joint_states.is_none());
    assert!(arm2.end_effector_pose.is_none());

    let second = &recording.frames[1];
    assert_eq!(second.frame_number, 1);
    assert!(second.arm2.as_ref().and_then(|e| e.error.as_ref()).is_none());

    recorder.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_gripper_failure_keeps_driver_code() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let connector = SimulatedArmConnector::new();
    connector.faults_for(ARM1_HOST).set_no_gripper(true);

    let mut recorder = FlatRecorder::new(30, Duration::from_secs(2));
    recorder.connect(&connector, &arms()).await?;
    recorder.record_frame().await?;

    let frame = &recorder.recording().expect("recording available").frames[0];
    let arm1 = frame.arm1.as_ref().expect("arm1 entry");
    // The arm itself was read fine
    assert!(arm1.error.is_none());
    assert!(arm1.joint_states.is_some());
    assert_eq!(
        arm1.gripper_state,
        Some(GripperEntry::Error {
            error: format!("Error code: {SIMULATED_FAULT_CODE}")
        })
    );
    assert!(matches!(
        frame.arm2.as_ref().and_then(|e| e.gripper_state.as_ref()),
        Some(GripperEntry::State(_))
    ));

    let path = recorder.save_data(Some(&dir.path().join("gripper.json")))?;
    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(raw["frames"][0]["arm1"]["gripper_state"]["error"], "Error code: -1");
    assert!(raw["frames"][0]["arm2"]["gripper_state"]["position"].is_number());

    Ok(())
}

#[tokio::test]
async fn test_single_arm_frames_omit_the_other() -> Result<()> {
    let connector = SimulatedArmConnector::new();
    let mut recorder = FlatRecorder::new(30, Duration::from_secs(2));
    recorder.connect(&connector, &arms()[..1]).await?;

    recorder.record_frame().await?;
    let frame = &recorder.recording().expect("recording available").frames[0];
    assert!(frame.arm1.is_some());
    assert!(frame.arm2.is_none());

    Ok(())
}

#[tokio::test]
async fn test_background_run_and_save() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let connector = SimulatedArmConnector::new();
    let mut recorder = FlatRecorder::new(20, Duration::from_secs(2));
    recorder.connect(&connector, &arms()).await?;

    // Step 1: record for a short while
    recorder.start_recording()?;
    assert_eq!(recorder.state(), LoopState::Running);
    assert!(recorder.recording().is_none());
    tokio::time::sleep(Duration::from_millis(300)).await;
    recorder.stop_recording().await?;
    assert_eq!(recorder.state(), LoopState::Idle);

    let recording = recorder.recording().expect("recording available");
    assert!(recording.frames.len() >= 4);
    assert_eq!(recording.metadata.num_frames, recording.frames.len());
    assert!(recording.metadata.start_time.is_some());
    assert!(recording.metadata.end_time.is_some());
    assert!(recording.metadata.duration.unwrap_or(0.0) > 0.25);

    // Step 2: save and parse back
    let output = dir.path().join("session.json");
    let path = recorder.save_data(Some(&output))?;
    assert_eq!(path, output);

    let loaded: FlatRecording = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(loaded.metadata.fps, 20);
    assert_eq!(loaded.frames.len(), recording.frames.len());
    for (i, frame) in loaded.frames.iter().enumerate() {
        assert_eq!(frame.frame_number, i as u64);
    }

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    let arm1 = &raw["frames"][0]["arm1"];
    assert!(arm1["joint_states"]["angles_rad"].is_array());
    assert!(arm1["end_effector_pose"]["orientation_quaternion"]["w"].is_number());

    recorder.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_save_while_running_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let connector = SimulatedArmConnector::new();
    let mut recorder = FlatRecorder::new(30, Duration::from_secs(2));
    recorder.connect(&connector, &arms()).await?;

    recorder.start_recording()?;
    let err = recorder
        .save_data(Some(&dir.path().join("early.json")))
        .unwrap_err();
    assert!(err.is_invalid_state());

    recorder.disconnect().await?;
    assert_eq!(recorder.state(), LoopState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_arm_fails_connect() -> Result<()> {
    let connector = SimulatedArmConnector::new().with_unreachable(ARM2_HOST);
    let mut recorder = FlatRecorder::new(30, Duration::from_secs(2));

    assert!(recorder.connect(&connector, &arms()).await.is_err());
    assert!(recorder.start_recording().unwrap_err().is_invalid_state());
    Ok(())
}
