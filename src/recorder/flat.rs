//! Single-document JSON recordings, the format used before datasets existed.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::driver::LoopDriver;
use crate::core::{now_secs, ArmSide};
use crate::engine::{LoopState, TickReport, TickSink};
use crate::error::{DeviceError, RecorderError, RecorderResult};
use crate::hal::{ArmConfig, ArmConnector, ArmSample, DevicePool, GripperState};
use crate::observability::LoopMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointStates {
    pub angles_deg: Vec<f64>,
    pub angles_rad: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndEffectorPose {
    pub position: Position,
    pub orientation_euler: EulerAngles,
    pub orientation_quaternion: Quaternion,
}

/// Gripper slot of an arm entry: the reading, or the driver failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GripperEntry {
    State(GripperState),
    Error { error: String },
}

impl From<Result<GripperState, DeviceError>> for GripperEntry {
    fn from(reading: Result<GripperState, DeviceError>) -> Self {
        match reading {
            Ok(state) => GripperEntry::State(state),
            Err(e) => GripperEntry::Error {
                error: legacy_error(&e),
            },
        }
    }
}

/// Driver failures are written as `Error code: N` in this format
fn legacy_error(error: &DeviceError) -> String {
    match error.code() {
        Some(code) => format!("Error code: {code}"),
        None => error.to_string(),
    }
}

/// One arm's reading inside a flat frame.
///
/// A failed read keeps the entry with `error` set and the state fields null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmEntry {
    pub joint_states: Option<JointStates>,
    pub end_effector_pose: Option<EndEffectorPose>,
    pub gripper_state: Option<GripperEntry>,
    pub error: Option<String>,
    pub timestamp: f64,
}

impl ArmEntry {
    fn from_reading(reading: Result<ArmSample, DeviceError>) -> Self {
        match reading {
            Ok(sample) => {
                let pose = sample.state.pose;
                let [w, x, y, z] = pose.quaternion();
                Self {
                    joint_states: Some(JointStates {
                        angles_rad: sample.state.joint_radians(),
                        angles_deg: sample.state.joint,
                    }),
                    end_effector_pose: Some(EndEffectorPose {
                        position: Position {
                            x: pose.position[0],
                            y: pose.position[1],
                            z: pose.position[2],
                        },
                        orientation_euler: EulerAngles {
                            rx: pose.euler[0],
                            ry: pose.euler[1],
                            rz: pose.euler[2],
                        },
                        orientation_quaternion: Quaternion { w, x, y, z },
                    }),
                    gripper_state: Some(sample.gripper.into()),
                    error: None,
                    timestamp: sample.timestamp,
                }
            }
            Err(e) => Self {
                joint_states: None,
                end_effector_pose: None,
                gripper_state: None,
                error: Some(e.to_string()),
                timestamp: now_secs(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatFrame {
    pub frame_number: u64,
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arm1: Option<ArmEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arm2: Option<ArmEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatMetadata {
    pub fps: u32,
    pub start_time: Option<DateTime<Local>>,
    pub end_time: Option<DateTime<Local>>,
    pub duration: Option<f64>,
    pub num_frames: usize,
}

/// The whole flat document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRecording {
    pub metadata: FlatMetadata,
    pub frames: Vec<FlatFrame>,
}

impl FlatRecording {
    pub fn new(fps: u32) -> Self {
        Self {
            metadata: FlatMetadata {
                fps,
                start_time: None,
                end_time: None,
                duration: None,
                num_frames: 0,
            },
            frames: Vec::new(),
        }
    }
}

#[async_trait]
impl TickSink for FlatRecording {
    async fn record_tick(&mut self, pool: &mut DevicePool) -> RecorderResult<TickReport> {
        let timestamp = now_secs();
        let readings = pool.read_arms_parallel().await;

        let mut frame = FlatFrame {
            frame_number: self.frames.len() as u64,
            timestamp,
            arm1: None,
            arm2: None,
        };
        let mut report = TickReport::default();

        for (side, reading) in readings {
            if let Err(e) = &reading {
                tracing::warn!("Failed to read {} arm: {}", side, e);
                report.failed_arms.push(side);
            }
            let entry = Some(ArmEntry::from_reading(reading));
            match side {
                ArmSide::Left => frame.arm1 = entry,
                ArmSide::Right => frame.arm2 = entry,
            }
        }

        self.frames.push(frame);
        self.metadata.num_frames = self.frames.len();
        Ok(report)
    }
}

/// Records arm state into one JSON document
pub struct FlatRecorder {
    fps: u32,
    stop_timeout: Duration,
    driver: LoopDriver<FlatRecording>,
    started: Option<Instant>,
}

impl FlatRecorder {
    pub fn new(fps: u32, stop_timeout: Duration) -> Self {
        let mut driver = LoopDriver::new();
        driver.set_sink(FlatRecording::new(fps));
        Self {
            fps,
            stop_timeout,
            driver,
            started: None,
        }
    }

    /// Connect every configured arm. Fails if any arm cannot be reached.
    pub async fn connect(&mut self, connector: &dyn ArmConnector, arms: &[ArmConfig]) -> RecorderResult<()> {
        let mut pool = DevicePool::new();
        pool.connect_arms(connector, arms).await?;
        self.driver.set_pool(pool);
        Ok(())
    }

    pub async fn record_frame(&mut self) -> RecorderResult<TickReport> {
        self.driver.tick().await
    }

    pub fn start_recording(&mut self) -> RecorderResult<()> {
        if let Some(recording) = self.driver.sink_mut() {
            recording.metadata.start_time = Some(Local::now());
        }
        self.driver.start(self.fps as f64)?;
        self.started = Some(Instant::now());
        tracing::info!("Recording started at {} FPS", self.fps);
        Ok(())
    }

    pub async fn stop_recording(&mut self) -> RecorderResult<()> {
        if self.driver.state().is_idle() {
            return Ok(());
        }

        let frames = self.driver.stop(self.stop_timeout).await?;
        let duration = self.started.take().map(|s| s.elapsed().as_secs_f64());

        if let Some(recording) = self.driver.sink_mut() {
            recording.metadata.end_time = Some(Local::now());
            recording.metadata.duration = duration;
            recording.metadata.num_frames = recording.frames.len();
        }

        let duration = duration.unwrap_or(0.0);
        let fps = if duration > 0.0 {
            frames as f64 / duration
        } else {
            0.0
        };
        tracing::info!(
            "Recording stopped: {} frames in {:.2}s ({:.2} FPS)",
            frames,
            duration,
            fps
        );
        Ok(())
    }

    /// Write the document as pretty JSON.
    ///
    /// Without `output` the file is `arm_recording_<YYYYmmdd_HHMMSS>.json` in
    /// the working directory.
    pub fn save_data(&self, output: Option<&Path>) -> RecorderResult<PathBuf> {
        let path = match output {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(default_file_name(Local::now())),
        };

        let recording = self
            .recording()
            .ok_or_else(|| RecorderError::invalid_state("stop recording before saving"))?;
        fs::write(&path, serde_json::to_string_pretty(recording)?)?;

        let size_mb = fs::metadata(&path)?.len() as f64 / (1024.0 * 1024.0);
        tracing::info!("Saved {} ({:.2} MB)", path.display(), size_mb);
        Ok(path)
    }

    pub async fn disconnect(&mut self) -> RecorderResult<()> {
        self.stop_recording().await?;
        if let Some(mut pool) = self.driver.take_pool() {
            pool.disconnect_all().await;
        }
        Ok(())
    }

    /// The recorded document, unless the loop task currently owns it
    pub fn recording(&self) -> Option<&FlatRecording> {
        self.driver.sink()
    }

    pub fn state(&self) -> LoopState {
        self.driver.state()
    }

    pub fn metrics(&self) -> Arc<LoopMetrics> {
        self.driver.metrics()
    }
}

pub fn default_file_name(now: DateTime<Local>) -> String {
    format!("arm_recording_{}.json", now.format("%Y%m%d_%H%M%S"))
}
