use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use super::columnar::{default_writer, ColumnarWriter};
use super::info::DatasetInfo;
use super::layout::DatasetLayout;
use super::table::EpisodeTable;
use crate::core::Episode;
use crate::error::{StoreError, StoreResult};

/// How an episode ended up on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredFormat {
    Columnar,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEpisode {
    pub path: PathBuf,
    pub format: StoredFormat,
}

/// One line of `meta/episodes.jsonl`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeLogEntry {
    pub episode_index: usize,
    pub task: String,
    pub task_index: i64,
    pub length: usize,
    pub start_time: DateTime<Local>,
    pub end_time: Option<DateTime<Local>>,
    pub duration: f64,
}

impl From<&Episode> for EpisodeLogEntry {
    fn from(episode: &Episode) -> Self {
        Self {
            episode_index: episode.episode_index(),
            task: episode.task().to_string(),
            task_index: episode.task_index(),
            length: episode.len(),
            start_time: episode.start_time(),
            end_time: episode.end_time(),
            duration: episode.duration(),
        }
    }
}

/// Persists finalized episodes and dataset metadata
pub struct EpisodeStore {
    layout: DatasetLayout,
    writer: Option<Box<dyn ColumnarWriter>>,
}

impl EpisodeStore {
    /// Store using the compiled-in columnar writer, if any
    pub fn new(layout: DatasetLayout) -> Self {
        Self::with_writer(layout, default_writer())
    }

    pub fn with_writer(layout: DatasetLayout, writer: Option<Box<dyn ColumnarWriter>>) -> Self {
        Self { layout, writer }
    }

    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    pub fn has_columnar_writer(&self) -> bool {
        self.writer.is_some()
    }

    /// Write the episode's data file and append its line to the episode log.
    ///
    /// Falls back to a JSON document when no columnar writer is available.
    pub fn save(&self, episode: &Episode) -> StoreResult<StoredEpisode> {
        let chunk = DatasetLayout::chunk_of(episode.episode_index());
        fs::create_dir_all(self.layout.data_dir(chunk))?;

        let stored = match &self.writer {
            Some(writer) => {
                let table = EpisodeTable::from_episode(episode)?;
                let path = self
                    .layout
                    .episode_data_path(episode.episode_index(), writer.extension());
                match writer.write(&table, &path) {
                    Ok(()) => StoredEpisode {
                        path,
                        format: StoredFormat::Columnar,
                    },
                    Err(StoreError::WriterUnavailable(reason)) => {
                        tracing::warn!("Columnar writer unavailable ({}), saving JSON", reason);
                        self.save_json(episode)?
                    }
                    Err(e) => return Err(e),
                }
            }
            None => {
                tracing::warn!("Built without columnar support, saving JSON");
                self.save_json(episode)?
            }
        };

        tracing::info!("Saved episode data: {}", stored.path.display());
        self.append_episode_log(episode)?;
        Ok(stored)
    }

    fn save_json(&self, episode: &Episode) -> StoreResult<StoredEpisode> {
        let path = self.layout.episode_data_path(episode.episode_index(), "json");
        let json = serde_json::to_string_pretty(&episode.to_document())?;
        fs::write(&path, json)?;

        Ok(StoredEpisode {
            path,
            format: StoredFormat::Json,
        })
    }

    fn append_episode_log(&self, episode: &Episode) -> StoreResult<()> {
        let line = serde_json::to_string(&EpisodeLogEntry::from(episode))?;
        fs::create_dir_all(self.layout.meta_dir())?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.layout.episodes_log_path())?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Parse `meta/episodes.jsonl`; a missing log is empty
    pub fn read_episode_log(&self) -> StoreResult<Vec<EpisodeLogEntry>> {
        let path = self.layout.episodes_log_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        fs::read_to_string(&path)?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect()
    }

    pub fn save_dataset_info(&self, info: &DatasetInfo) -> StoreResult<PathBuf> {
        fs::create_dir_all(self.layout.meta_dir())?;
        let path = self.layout.info_path();
        fs::write(&path, serde_json::to_string_pretty(info)?)?;

        tracing::info!("Saved dataset info: {}", path.display());
        Ok(path)
    }

    pub fn load_dataset_info(&self) -> StoreResult<DatasetInfo> {
        let json = fs::read_to_string(self.layout.info_path())?;
        Ok(serde_json::from_str(&json)?)
    }
}
