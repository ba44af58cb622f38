use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{FeatureKey, FeatureMap, Frame, FrameData};
use crate::error::{RecorderError, RecorderResult};

/// Wall-clock time in seconds since the UNIX epoch
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// A bounded recording of one task instance.
///
/// Frames are appended in order while the episode is open. Once
/// [`Episode::finalize`] has been called the episode is closed and no longer
/// accepts frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    episode_index: usize,
    task: String,
    task_index: i64,
    start_time: DateTime<Local>,
    end_time: Option<DateTime<Local>>,
    duration: f64,
    frames: Vec<Frame>,
    metadata: BTreeMap<String, serde_json::Value>,
}

/// Summary statistics reported when an episode ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeStats {
    pub episode_index: usize,
    pub task: String,
    pub num_frames: usize,
    pub duration: f64,
    pub start_time: DateTime<Local>,
    pub end_time: Option<DateTime<Local>>,
    pub fps: f64,
}

impl Episode {
    pub fn new(episode_index: usize, task: impl Into<String>, task_index: i64) -> Self {
        Self {
            episode_index,
            task: task.into(),
            task_index,
            start_time: Local::now(),
            end_time: None,
            duration: 0.0,
            frames: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn episode_index(&self) -> usize {
        self.episode_index
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn task_index(&self) -> i64 {
        self.task_index
    }

    pub fn start_time(&self) -> DateTime<Local> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Local>> {
        self.end_time
    }

    /// Zero until the episode is finalized
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Append a frame stamped with the current time.
    ///
    /// Keys are not validated here.
    pub fn add_frame(
        &mut self,
        observation: FeatureMap,
        action: FeatureMap,
        state: FeatureMap,
        image_keys: Vec<FeatureKey>,
    ) -> RecorderResult<&Frame> {
        if self.is_finalized() {
            return Err(RecorderError::invalid_state(format!(
                "episode {} is finalized and cannot accept frames",
                self.episode_index
            )));
        }

        let index = self.frames.len() as u64;
        self.frames.push(Frame {
            timestamp: now_secs(),
            index,
            observation,
            action,
            state,
            image_keys,
        });

        // Just pushed
        Ok(&self.frames[self.frames.len() - 1])
    }

    pub fn add_frame_data(&mut self, data: FrameData) -> RecorderResult<&Frame> {
        self.add_frame(data.observation, data.action, data.state, data.image_keys)
    }

    /// Close the episode, fixing `end_time` and `duration`.
    ///
    /// Duration spans the first to the last frame timestamp and is zero with
    /// fewer than two frames. Finalizing twice is an error.
    pub fn finalize(&mut self) -> RecorderResult<()> {
        if self.is_finalized() {
            return Err(RecorderError::invalid_state(format!(
                "episode {} is already finalized",
                self.episode_index
            )));
        }

        self.end_time = Some(Local::now());
        self.duration = match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) if self.frames.len() >= 2 => last.timestamp - first.timestamp,
            _ => 0.0,
        };
        Ok(())
    }

    pub fn stats(&self) -> EpisodeStats {
        let num_frames = self.frames.len();
        EpisodeStats {
            episode_index: self.episode_index,
            task: self.task.clone(),
            num_frames,
            duration: self.duration,
            start_time: self.start_time,
            end_time: self.end_time,
            fps: if self.duration > 0.0 {
                num_frames as f64 / self.duration
            } else {
                0.0
            },
        }
    }

    /// Full nested document, image pixels excluded
    pub fn to_document(&self) -> serde_json::Value {
        serde_json::json!({
            "episode_index": self.episode_index,
            "task": self.task,
            "task_index": self.task_index,
            "start_time": self.start_time,
            "end_time": self.end_time,
            "duration": self.duration,
            "num_frames": self.frames.len(),
            "metadata": self.metadata,
            "frames": self.frames,
        })
    }

    /// Drop pixel buffers from every frame, keeping shapes and keys
    pub fn release_images(&mut self) {
        for frame in &mut self.frames {
            for key in &frame.image_keys {
                if let Some(super::Value::Image(image)) = frame.observation.get_mut(key) {
                    image.data = Default::default();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ArmSide;
    use std::thread::sleep;
    use std::time::Duration;

    fn frame_data(gripper: f64) -> FrameData {
        let mut data = FrameData::new();
        data.insert_observation(FeatureKey::ObservationGripper(ArmSide::Left), gripper);
        data
    }

    #[test]
    fn test_indices_are_sequential() {
        let mut episode = Episode::new(0, "pick", 0);
        for i in 0..5 {
            episode.add_frame_data(frame_data(i as f64)).unwrap();
        }

        for (i, frame) in episode.frames().iter().enumerate() {
            assert_eq!(frame.index, i as u64);
        }
    }

    #[test]
    fn test_finalize_duration_spans_frames() {
        let mut episode = Episode::new(3, "place", 1);
        episode.add_frame_data(frame_data(0.0)).unwrap();
        sleep(Duration::from_millis(20));
        episode.add_frame_data(frame_data(1.0)).unwrap();
        episode.finalize().unwrap();

        let frames = episode.frames();
        assert_eq!(episode.duration(), frames[1].timestamp - frames[0].timestamp);
        assert!(episode.duration() > 0.0);
        assert!(episode.end_time().is_some());
    }

    #[test]
    fn test_single_frame_has_zero_duration_and_fps() {
        let mut episode = Episode::new(0, "pick", 0);
        episode.add_frame_data(frame_data(0.0)).unwrap();
        episode.finalize().unwrap();

        let stats = episode.stats();
        assert_eq!(stats.duration, 0.0);
        assert_eq!(stats.fps, 0.0);
        assert_eq!(stats.num_frames, 1);
    }

    #[test]
    fn test_finalize_twice_is_invalid_state() {
        let mut episode = Episode::new(0, "pick", 0);
        episode.finalize().unwrap();

        let err = episode.finalize().unwrap_err();
        assert!(err.is_invalid_state());
    }

    #[test]
    fn test_finalized_episode_rejects_frames() {
        let mut episode = Episode::new(0, "pick", 0);
        episode.finalize().unwrap();

        assert!(episode.add_frame_data(frame_data(0.0)).is_err());
    }

    #[test]
    fn test_document_has_frames_and_counts() {
        let mut episode = Episode::new(2, "wipe", 4);
        episode.add_frame_data(frame_data(0.5)).unwrap();
        episode.finalize().unwrap();

        let doc = episode.to_document();
        assert_eq!(doc["episode_index"], 2);
        assert_eq!(doc["task_index"], 4);
        assert_eq!(doc["num_frames"], 1);
        assert_eq!(
            doc["frames"][0]["observation"]["observation.state.left_gripper"],
            0.5
        );
    }
}
