use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use arm_recorder::config::{RecorderConfig, DEFAULT_LEFT_ARM_HOST, DEFAULT_RIGHT_ARM_HOST};
use arm_recorder::core::{ArmSide, FeatureKey};
use arm_recorder::engine::LoopState;
use arm_recorder::hal::mock::{SimulatedArmConnector, SimulatedCameraConnector};
use arm_recorder::hal::{ArmAddress, CameraSettings, CameraSource};
use arm_recorder::error::StoreResult;
use arm_recorder::store::{
    ColumnarWriter, DatasetInfo, DatasetLayout, EpisodeStore, EpisodeTable,
};
use arm_recorder::{DatasetRecorder, RecorderError, StoreError};

fn test_config(dir: &Path) -> RecorderConfig {
    RecorderConfig {
        dataset_path: dir.to_path_buf(),
        dataset_name: "test_dataset".to_string(),
        fps: 10,
        ..RecorderConfig::default()
    }
}

async fn connected_recorder(
    config: RecorderConfig,
    arms: &SimulatedArmConnector,
) -> Result<DatasetRecorder> {
    let mut recorder = DatasetRecorder::new(config)?;
    recorder.connect(arms, &SimulatedCameraConnector::new()).await?;
    Ok(recorder)
}

#[tokio::test]
async fn test_three_tick_episode() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let arms = SimulatedArmConnector::new();
    let mut recorder = connected_recorder(test_config(dir.path()), &arms).await?;

    assert_eq!(recorder.start_episode("pick", 0)?, 0);
    for tick in 0..3 {
        if tick > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let report = recorder.record_frame().await?;
        assert!(!report.is_degraded());
    }

    let stats = recorder.end_episode()?;
    assert_eq!(stats.num_frames, 3);
    assert!(
        (stats.duration - 0.2).abs() <= 0.1,
        "duration was {}",
        stats.duration
    );

    recorder.save_dataset_info()?;
    let info: DatasetInfo =
        serde_json::from_str(&std::fs::read_to_string(recorder.layout().info_path())?)?;
    assert_eq!(info.num_episodes, 1);
    assert_eq!(info.total_frames, 3);
    assert_eq!(info.name, "test_dataset");
    assert_eq!(info.version, "3.0");

    let log = recorder.store().read_episode_log()?;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].length, 3);
    assert_eq!(log[0].task, "pick");

    recorder.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_frames_carry_both_arms() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let arms = SimulatedArmConnector::new();
    let mut recorder = connected_recorder(test_config(dir.path()), &arms).await?;

    recorder.start_episode("pick", 0)?;
    recorder.record_frame().await?;

    let episode = recorder.current_episode().expect("open episode");
    let frame = &episode.frames()[0];
    for side in ArmSide::ALL {
        for key in FeatureKey::arm_keys(side) {
            assert!(frame.get(&key).is_some(), "missing {key}");
        }
    }
    assert!(frame.image_keys.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_invalid_arm2_address_fails_connect() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = test_config(dir.path());
    config.set_arm(ArmSide::Right, ArmAddress::new("not-an-address", 8080));

    let mut recorder = DatasetRecorder::new(config)?;
    let err = assert_err!(
        recorder
            .connect(&SimulatedArmConnector::new(), &SimulatedCameraConnector::new())
            .await
    );

    assert!(matches!(err, RecorderError::Connection(_)));
    assert!(!recorder.is_connected());
    assert!(recorder.open_episode_index().is_none());
    assert!(recorder.episodes().is_empty());

    // No episode can be opened without devices, and no index is consumed
    assert!(recorder.start_episode("pick", 0).unwrap_err().is_invalid_state());
    assert!(recorder.open_episode_index().is_none());
    assert!(recorder.end_episode().unwrap_err().is_invalid_state());

    recorder.save_dataset_info()?;
    let info = recorder.store().load_dataset_info()?;
    assert_eq!(info.num_episodes, 0);
    assert!(recorder.store().read_episode_log()?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_unreachable_arm_fails_connect() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let arms = SimulatedArmConnector::new().with_unreachable(DEFAULT_RIGHT_ARM_HOST);

    let mut recorder = DatasetRecorder::new(test_config(dir.path()))?;
    let result = recorder.connect(&arms, &SimulatedCameraConnector::new()).await;

    assert!(matches!(result, Err(RecorderError::Connection(_))));
    assert!(!recorder.is_connected());
    Ok(())
}

#[tokio::test]
async fn test_episode_indices_are_never_reused() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let arms = SimulatedArmConnector::new();
    let mut recorder = connected_recorder(test_config(dir.path()), &arms).await?;

    // An empty first episode still consumes index 0
    assert_eq!(recorder.start_episode("pick", 0)?, 0);
    let first = recorder.end_episode()?;
    assert_eq!(first.num_frames, 0);
    assert_eq!(first.fps, 0.0);

    assert_eq!(recorder.start_episode("pick", 0)?, 1);
    recorder.record_frame().await?;
    recorder.end_episode()?;

    let indices: Vec<_> = recorder
        .episodes()
        .iter()
        .map(|e| e.episode_index())
        .collect();
    assert_eq!(indices, vec![0, 1]);

    let logged: Vec<_> = recorder
        .store()
        .read_episode_log()?
        .into_iter()
        .map(|e| e.episode_index)
        .collect();
    assert_eq!(logged, vec![0, 1]);

    Ok(())
}

#[tokio::test]
async fn test_sequencing_errors() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let arms = SimulatedArmConnector::new();
    let mut recorder = connected_recorder(test_config(dir.path()), &arms).await?;

    assert!(recorder.end_episode().unwrap_err().is_invalid_state());
    assert!(recorder.record_frame().await.unwrap_err().is_invalid_state());
    assert!(recorder.start_recording().unwrap_err().is_invalid_state());

    recorder.start_episode("pick", 0)?;
    assert!(recorder.start_episode("place", 1).unwrap_err().is_invalid_state());

    recorder.start_recording()?;
    assert!(recorder.start_recording().unwrap_err().is_invalid_state());
    assert!(recorder.end_episode().unwrap_err().is_invalid_state());
    assert!(recorder.record_frame().await.unwrap_err().is_invalid_state());

    recorder.stop_recording().await?;
    // Stopping twice is harmless
    assert_ok!(recorder.stop_recording().await);
    recorder.end_episode()?;

    Ok(())
}

#[tokio::test]
async fn test_background_recording() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let arms = SimulatedArmConnector::new();
    let mut recorder = connected_recorder(test_config(dir.path()), &arms).await?;

    recorder.start_episode("pick", 0)?;
    recorder.start_recording()?;
    assert_eq!(recorder.state(), LoopState::Running);
    // The loop task owns the episode while running
    assert!(recorder.current_episode().is_none());

    tokio::time::sleep(Duration::from_millis(350)).await;
    recorder.stop_recording().await?;
    assert_eq!(recorder.state(), LoopState::Idle);

    let frames = recorder.current_episode().map(|e| e.len()).unwrap_or(0);
    assert!(frames >= 3, "only {frames} frames recorded");
    assert_eq!(recorder.metrics().ticks(), frames as u64);

    let stats = recorder.end_episode()?;
    assert_eq!(stats.num_frames, frames);
    assert!(recorder.episodes()[0].is_finalized());

    Ok(())
}

#[tokio::test]
async fn test_stop_timeout_leaves_recorder_stopping() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let arms = SimulatedArmConnector::new();
    arms.faults_for(DEFAULT_LEFT_ARM_HOST)
        .set_read_delay(Duration::from_millis(500));

    let mut config = test_config(dir.path());
    config.stop_timeout_ms = 50;
    let mut recorder = connected_recorder(config, &arms).await?;

    recorder.start_episode("pick", 0)?;
    recorder.start_recording()?;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = recorder.stop_recording().await.unwrap_err();
    assert!(matches!(err, RecorderError::StopTimeout(_)));
    assert_eq!(recorder.state(), LoopState::Stopping);
    assert!(recorder.end_episode().unwrap_err().is_invalid_state());

    tokio::time::sleep(Duration::from_millis(600)).await;
    recorder.stop_recording().await?;
    assert_eq!(recorder.state(), LoopState::Idle);
    assert_eq!(recorder.end_episode()?.num_frames, 1);

    Ok(())
}

#[tokio::test]
async fn test_abort_persists_open_episode() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let arms = SimulatedArmConnector::new();
    let mut recorder = connected_recorder(test_config(dir.path()), &arms).await?;

    recorder.start_episode("pick", 0)?;
    recorder.start_recording()?;
    tokio::time::sleep(Duration::from_millis(150)).await;

    recorder.abort().await?;
    assert_eq!(recorder.state(), LoopState::Idle);
    assert!(recorder.open_episode_index().is_none());
    assert_eq!(recorder.episodes().len(), 1);

    let info = recorder.store().load_dataset_info()?;
    assert_eq!(info.num_episodes, 1);
    assert_eq!(info.total_frames, recorder.episodes()[0].len());

    recorder.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_degraded_frame_omits_failed_side() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let arms = SimulatedArmConnector::new();
    let mut recorder = connected_recorder(test_config(dir.path()), &arms).await?;

    recorder.start_episode("pick", 0)?;
    arms.faults_for(DEFAULT_RIGHT_ARM_HOST).fail_next_reads(1);
    let report = recorder.record_frame().await?;
    assert_eq!(report.failed_arms, vec![ArmSide::Right]);
    recorder.record_frame().await?;

    let episode = recorder.current_episode().expect("open episode");
    assert_eq!(episode.len(), 2);
    assert!(episode.frames()[0].has_side(ArmSide::Left));
    assert!(!episode.frames()[0].has_side(ArmSide::Right));
    assert!(episode.frames()[1].has_side(ArmSide::Right));
    assert_eq!(recorder.metrics().degraded_ticks(), 1);

    Ok(())
}

#[tokio::test]
async fn test_missing_gripper_omits_gripper_keys() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let arms = SimulatedArmConnector::new();
    arms.faults_for(DEFAULT_LEFT_ARM_HOST).set_no_gripper(true);
    let mut recorder = connected_recorder(test_config(dir.path()), &arms).await?;

    recorder.start_episode("pick", 0)?;
    recorder.record_frame().await?;

    let frame = &recorder.current_episode().expect("open episode").frames()[0];
    assert!(frame.get(&FeatureKey::ObservationArm(ArmSide::Left)).is_some());
    assert!(frame.get(&FeatureKey::ObservationGripper(ArmSide::Left)).is_none());
    assert!(frame.get(&FeatureKey::ObservationGripper(ArmSide::Right)).is_some());

    Ok(())
}

#[tokio::test]
async fn test_camera_channels_are_recorded_but_not_tabulated() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = test_config(dir.path());
    config.cameras = vec![CameraSource::Index(0), CameraSource::Path("/dev/video2".to_string())];
    config.camera_settings = CameraSettings {
        width: 8,
        height: 6,
        fps: 10,
    };

    let cameras = SimulatedCameraConnector::new();
    cameras
        .faults_for(&CameraSource::Path("/dev/video2".to_string()))
        .set_fail_configure(true);

    let mut recorder = DatasetRecorder::new(config)?;
    let live = recorder
        .connect(&SimulatedArmConnector::new(), &cameras)
        .await?;
    assert_eq!(live, 1);

    recorder.start_episode("pick", 0)?;
    recorder.record_frame().await?;
    {
        let frame = &recorder.current_episode().expect("open episode").frames()[0];
        assert_eq!(frame.image_keys, vec![FeatureKey::camera("cam0")]);
    }
    recorder.end_episode()?;

    let log = recorder.store().read_episode_log()?;
    assert_eq!(log.len(), 1);

    #[cfg(feature = "parquet")]
    {
        let path = recorder.layout().episode_data_path(0, "parquet");
        let table = arm_recorder::store::read_table(&path)?;
        assert!(table.column("observation.camera_cam0").is_none());
        assert!(table.column("observation.state.left_arm").is_some());
    }

    Ok(())
}

#[cfg(feature = "parquet")]
#[tokio::test]
async fn test_default_store_writes_parquet() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let arms = SimulatedArmConnector::new();
    let mut recorder = connected_recorder(test_config(dir.path()), &arms).await?;

    recorder.start_episode("pick", 0)?;
    recorder.record_frame().await?;
    recorder.end_episode()?;

    let path = recorder.layout().episode_data_path(0, "parquet");
    assert!(path.is_file());
    assert!(!recorder.layout().episode_data_path(0, "json").exists());
    assert_eq!(arm_recorder::store::read_table(&path)?.num_rows(), 1);

    Ok(())
}

/// Columnar writer whose every write fails with a fatal error
struct BrokenWriter;

impl ColumnarWriter for BrokenWriter {
    fn extension(&self) -> &'static str {
        "parquet"
    }

    fn write(&self, _table: &EpisodeTable, _path: &Path) -> StoreResult<()> {
        Err(StoreError::Columnar("disk full".to_string()))
    }
}

fn recorder_with_writer(
    config: RecorderConfig,
    writer: Option<Box<dyn ColumnarWriter>>,
) -> Result<DatasetRecorder> {
    let layout = DatasetLayout::new(&config.dataset_path, &config.dataset_name);
    Ok(DatasetRecorder::with_store(
        config,
        EpisodeStore::with_writer(layout, writer),
    )?)
}

#[tokio::test]
async fn test_failed_save_still_writes_dataset_info() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut recorder = recorder_with_writer(test_config(dir.path()), Some(Box::new(BrokenWriter)))?;
    recorder
        .connect(&SimulatedArmConnector::new(), &SimulatedCameraConnector::new())
        .await?;

    recorder.start_episode("pick", 0)?;
    recorder.start_recording()?;
    tokio::time::sleep(Duration::from_millis(150)).await;

    let err = recorder.finish_episode().await.unwrap_err();
    assert!(matches!(err, RecorderError::Store(StoreError::Columnar(_))));

    // The episode is kept and counted even though its data file failed
    assert_eq!(recorder.state(), LoopState::Idle);
    assert!(recorder.open_episode_index().is_none());
    let info = recorder.store().load_dataset_info()?;
    assert_eq!(info.num_episodes, 1);
    assert_eq!(info.total_frames, recorder.episodes()[0].len());

    Ok(())
}

#[tokio::test]
async fn test_stop_timeout_on_finish_still_writes_dataset_info() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let arms = SimulatedArmConnector::new();
    arms.faults_for(DEFAULT_LEFT_ARM_HOST)
        .set_read_delay(Duration::from_millis(500));

    let mut config = test_config(dir.path());
    config.stop_timeout_ms = 50;
    let mut recorder = connected_recorder(config, &arms).await?;

    recorder.start_episode("pick", 0)?;
    recorder.start_recording()?;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = recorder.finish_episode().await.unwrap_err();
    assert!(matches!(err, RecorderError::StopTimeout(_)));
    assert!(recorder.layout().info_path().is_file());

    Ok(())
}

#[tokio::test]
async fn test_json_fallback_carries_episode_metadata() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = test_config(dir.path());
    config.robot_type = "bench_arms".to_string();
    let mut recorder = recorder_with_writer(config, None)?;
    recorder
        .connect(&SimulatedArmConnector::new(), &SimulatedCameraConnector::new())
        .await?;

    recorder.start_episode("pick", 0)?;
    recorder.record_frame().await?;
    let stats = assert_ok!(recorder.finish_episode().await);
    assert_eq!(stats.num_frames, 1);

    let path = recorder.layout().episode_data_path(0, "json");
    let doc: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    assert_eq!(doc["metadata"]["robot_type"], "bench_arms");
    assert_eq!(doc["metadata"]["fps"], 10);

    Ok(())
}
