use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::FeatureKey;

/// Episodes per `chunk-XXX` directory
pub const EPISODES_PER_CHUNK: usize = 1000;

/// On-disk layout of one dataset:
///
/// ```text
/// <root>/meta/info.json
/// <root>/meta/episodes.jsonl
/// <root>/data/chunk-000/episode_000000.parquet
/// <root>/videos/chunk-000/episode_000000_<image-key>.mp4
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetLayout {
    root: PathBuf,
}

impl DatasetLayout {
    pub fn new(dataset_path: impl AsRef<Path>, name: &str) -> Self {
        Self {
            root: dataset_path.as_ref().join(name),
        }
    }

    /// Create `meta/`, `data/chunk-000/` and `videos/chunk-000/`
    pub fn create(&self) -> io::Result<()> {
        fs::create_dir_all(self.meta_dir())?;
        fs::create_dir_all(self.data_dir(0))?;
        fs::create_dir_all(self.video_dir(0))?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.root.join("meta")
    }

    pub fn info_path(&self) -> PathBuf {
        self.meta_dir().join("info.json")
    }

    pub fn episodes_log_path(&self) -> PathBuf {
        self.meta_dir().join("episodes.jsonl")
    }

    pub fn chunk_of(episode_index: usize) -> usize {
        episode_index / EPISODES_PER_CHUNK
    }

    pub fn data_dir(&self, chunk: usize) -> PathBuf {
        self.root.join("data").join(format!("chunk-{chunk:03}"))
    }

    pub fn video_dir(&self, chunk: usize) -> PathBuf {
        self.root.join("videos").join(format!("chunk-{chunk:03}"))
    }

    /// Data file for an episode, `extension` without the dot
    pub fn episode_data_path(&self, episode_index: usize, extension: &str) -> PathBuf {
        self.data_dir(Self::chunk_of(episode_index))
            .join(format!("episode_{episode_index:06}.{extension}"))
    }

    /// Where an encoded video for one image channel belongs
    pub fn video_path(&self, episode_index: usize, image_key: &FeatureKey) -> PathBuf {
        self.video_dir(Self::chunk_of(episode_index))
            .join(format!("episode_{episode_index:06}_{image_key}.mp4"))
    }
}
