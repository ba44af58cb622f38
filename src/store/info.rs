use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::core::Episode;

pub const DATASET_VERSION: &str = "3.0";
pub const CODEBASE_VERSION: &str = "0.1.0";

/// Dataset-level metadata written to `meta/info.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub name: String,
    pub robot_type: String,
    pub fps: u32,
    pub created_at: DateTime<Local>,
    pub version: String,
    pub codebase_version: String,
    #[serde(default)]
    pub num_episodes: usize,
    #[serde(default)]
    pub total_frames: usize,
}

impl DatasetInfo {
    pub fn new(name: impl Into<String>, robot_type: impl Into<String>, fps: u32) -> Self {
        Self {
            name: name.into(),
            robot_type: robot_type.into(),
            fps,
            created_at: Local::now(),
            version: DATASET_VERSION.to_string(),
            codebase_version: CODEBASE_VERSION.to_string(),
            num_episodes: 0,
            total_frames: 0,
        }
    }

    /// Recompute the counts from the completed episodes
    pub fn recount<'a>(&mut self, episodes: impl IntoIterator<Item = &'a Episode>) {
        let (num_episodes, total_frames) = episodes
            .into_iter()
            .fold((0, 0), |(n, total), episode| (n + 1, total + episode.len()));
        self.num_episodes = num_episodes;
        self.total_frames = total_frames;
    }
}
