use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use super::driver::LoopDriver;
use crate::config::RecorderConfig;
use crate::core::{Episode, EpisodeStats};
use crate::engine::{LoopState, TickReport};
use crate::error::{RecorderError, RecorderResult};
use crate::hal::{ArmConnector, CameraConnector, DevicePool};
use crate::observability::LoopMetrics;
use crate::store::{DatasetInfo, DatasetLayout, EpisodeStore};

/// Records episodes into a LeRobot-style dataset directory.
///
/// Typical use: `connect`, then for each episode `start_episode`,
/// `start_recording`, `stop_recording`, `end_episode`, and finally
/// `save_dataset_info` and `disconnect`.
pub struct DatasetRecorder {
    config: RecorderConfig,
    store: EpisodeStore,
    info: DatasetInfo,
    driver: LoopDriver<Episode>,
    /// Index of the open episode; the episode itself may be inside the loop task
    open_episode: Option<usize>,
    next_episode_index: usize,
    episodes: Vec<Episode>,
}

impl DatasetRecorder {
    /// Validate the configuration and create the dataset directory tree
    pub fn new(config: RecorderConfig) -> RecorderResult<Self> {
        let layout = DatasetLayout::new(&config.dataset_path, &config.dataset_name);
        Self::with_store(config, EpisodeStore::new(layout))
    }

    pub fn with_store(config: RecorderConfig, store: EpisodeStore) -> RecorderResult<Self> {
        config.validate()?;
        store.layout().create()?;

        let info = DatasetInfo::new(&config.dataset_name, &config.robot_type, config.fps);
        tracing::info!(
            "Dataset {} at {}",
            config.dataset_name,
            store.layout().root().display()
        );

        Ok(Self {
            config,
            store,
            info,
            driver: LoopDriver::new(),
            open_episode: None,
            next_episode_index: 0,
            episodes: Vec::new(),
        })
    }

    /// Connect the configured arms (all required) and cameras (best effort).
    ///
    /// Returns the number of live cameras.
    pub async fn connect(
        &mut self,
        arms: &dyn ArmConnector,
        cameras: &dyn CameraConnector,
    ) -> RecorderResult<usize> {
        if self.driver.pool().is_some() {
            return Err(RecorderError::invalid_state("already connected"));
        }
        if !self.driver.state().is_idle() {
            return Err(RecorderError::invalid_state("recording loop still owns the devices"));
        }

        let mut pool = DevicePool::new();
        pool.connect_arms(arms, &self.config.arms).await?;

        let live_cameras = if self.config.cameras.is_empty() {
            0
        } else {
            pool.connect_cameras(cameras, &self.config.cameras, &self.config.camera_settings)
                .await
        };

        tracing::info!(
            "Connected {} arm(s) and {} of {} camera(s)",
            pool.connected_arms().len(),
            live_cameras,
            self.config.cameras.len()
        );
        self.driver.set_pool(pool);
        Ok(live_cameras)
    }

    pub fn is_connected(&self) -> bool {
        self.driver
            .pool()
            .map(|pool| !pool.connected_arms().is_empty())
            .unwrap_or(false)
    }

    /// Open a new episode. Indices are never reused, even for empty episodes.
    pub fn start_episode(&mut self, task: impl Into<String>, task_index: i64) -> RecorderResult<usize> {
        if let Some(open) = self.open_episode {
            return Err(RecorderError::invalid_state(format!(
                "episode {open} is still open"
            )));
        }
        if !self.is_connected() {
            return Err(RecorderError::invalid_state("no devices connected"));
        }

        let index = self.next_episode_index;
        let mut episode = Episode::new(index, task, task_index);
        episode.set_metadata("robot_type", json!(self.config.robot_type));
        episode.set_metadata("fps", json!(self.config.fps));
        tracing::info!("Started episode {}: {}", index, episode.task());

        self.next_episode_index += 1;
        self.open_episode = Some(index);
        self.driver.set_sink(episode);
        Ok(index)
    }

    /// Poll the devices once and append the frame to the open episode
    pub async fn record_frame(&mut self) -> RecorderResult<TickReport> {
        self.ensure_open_episode()?;
        self.driver.tick().await
    }

    /// Start the background loop at the configured rate
    pub fn start_recording(&mut self) -> RecorderResult<()> {
        self.ensure_open_episode()?;
        self.driver.start(self.config.fps as f64)?;
        tracing::info!("Recording started at {} FPS", self.config.fps);
        Ok(())
    }

    /// Stop the background loop and take the episode back. No-op when idle.
    pub async fn stop_recording(&mut self) -> RecorderResult<()> {
        let was_running = !self.driver.state().is_idle();
        let result = self.driver.stop(self.config.stop_timeout()).await;

        if was_running && self.driver.state().is_idle() && self.driver.sink().is_none() {
            // The loop task was lost together with its episode
            tracing::error!("Open episode was lost with the recording loop");
            self.open_episode = None;
        }

        let frames = result?;
        if was_running {
            tracing::info!("Recording stopped after {} frames", frames);
        }
        Ok(())
    }

    /// Finalize and persist the open episode
    pub fn end_episode(&mut self) -> RecorderResult<EpisodeStats> {
        self.ensure_open_episode()?;
        if !self.driver.state().is_idle() {
            return Err(RecorderError::invalid_state(
                "stop recording before ending the episode",
            ));
        }

        let mut episode = self
            .driver
            .take_sink()
            .ok_or_else(|| RecorderError::invalid_state("no active episode"))?;
        self.open_episode = None;

        episode.finalize()?;
        let stats = episode.stats();
        tracing::info!(
            "Episode {} complete: task={} frames={} duration={:.2}s fps={:.2}",
            stats.episode_index,
            stats.task,
            stats.num_frames,
            stats.duration,
            stats.fps
        );

        let saved = self.store.save(&episode);
        episode.release_images();
        self.episodes.push(episode);
        saved?;

        Ok(stats)
    }

    /// Stop the loop and end the open episode.
    ///
    /// If either step fails the abort path still runs, so whatever was
    /// recorded and the dataset info reach the disk. The first error is returned.
    pub async fn finish_episode(&mut self) -> RecorderResult<EpisodeStats> {
        let result = match self.stop_recording().await {
            Ok(()) => self.end_episode(),
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            tracing::error!("Failed to finish episode {:?}: {}", self.open_episode, e);
            if let Err(abort_err) = self.abort().await {
                tracing::error!("Cleanup after failed episode also failed: {}", abort_err);
            }
        }
        result
    }

    /// Write `meta/info.json` with counts recomputed from the completed episodes
    pub fn save_dataset_info(&mut self) -> RecorderResult<PathBuf> {
        self.info.recount(&self.episodes);
        Ok(self.store.save_dataset_info(&self.info)?)
    }

    /// Stop any running loop, then release every device
    pub async fn disconnect(&mut self) -> RecorderResult<()> {
        self.stop_recording().await?;
        if let Some(mut pool) = self.driver.take_pool() {
            tracing::info!("Disconnecting devices");
            pool.disconnect_all().await;
        }
        Ok(())
    }

    /// Interrupt path: stop the loop, persist the open episode and write the
    /// dataset info. Every step runs; the first error is returned.
    pub async fn abort(&mut self) -> RecorderResult<()> {
        let mut first_error = None;

        if let Err(e) = self.stop_recording().await {
            tracing::error!("Failed to stop recording: {}", e);
            first_error.get_or_insert(e);
        }

        if self.open_episode.is_some() && self.driver.state().is_idle() {
            if let Err(e) = self.end_episode() {
                tracing::error!("Failed to save interrupted episode: {}", e);
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = self.save_dataset_info() {
            tracing::error!("Failed to save dataset info: {}", e);
            first_error.get_or_insert(e);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn state(&self) -> LoopState {
        self.driver.state()
    }

    /// Completed episodes, oldest first
    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    /// The open episode, unless the loop task currently owns it
    pub fn current_episode(&self) -> Option<&Episode> {
        self.driver.sink()
    }

    pub fn open_episode_index(&self) -> Option<usize> {
        self.open_episode
    }

    pub fn metrics(&self) -> Arc<LoopMetrics> {
        self.driver.metrics()
    }

    pub fn info(&self) -> &DatasetInfo {
        &self.info
    }

    pub fn store(&self) -> &EpisodeStore {
        &self.store
    }

    pub fn layout(&self) -> &DatasetLayout {
        self.store.layout()
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    fn ensure_open_episode(&self) -> RecorderResult<()> {
        match self.open_episode {
            Some(_) => Ok(()),
            None => Err(RecorderError::invalid_state("no active episode")),
        }
    }
}
