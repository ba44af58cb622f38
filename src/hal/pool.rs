use std::collections::BTreeMap;

use super::traits::{ArmConnector, ArmDriver, CameraConnector, CameraDriver};
use super::types::{ArmAddress, ArmConfig, ArmSample, CameraSettings, CameraSource};
use crate::core::{now_secs, ArmSide, ImageBuffer};
use crate::error::{DeviceError, RecorderError, RecorderResult};

struct ArmChannel {
    side: ArmSide,
    address: ArmAddress,
    driver: Box<dyn ArmDriver>,
    connected: bool,
}

struct CameraChannel {
    name: String,
    source: CameraSource,
    driver: Box<dyn CameraDriver>,
    connected: bool,
}

/// Per-arm results of one polling tick
pub type ArmReadings = BTreeMap<ArmSide, Result<ArmSample, DeviceError>>;

/// Per-camera results of one polling tick; `None` marks a missed frame
pub type CameraReadings = BTreeMap<String, Option<ImageBuffer>>;

/// Connected arms and cameras.
///
/// Each arm has its own driver handle so the two arms can be polled
/// concurrently without sharing a handle. Channels whose `connected` flag is
/// cleared are skipped by every read.
#[derive(Default)]
pub struct DevicePool {
    left: Option<ArmChannel>,
    right: Option<ArmChannel>,
    cameras: Vec<CameraChannel>,
}

impl DevicePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect every configured arm. Any failure fails the whole call.
    ///
    /// Arms connected before the failure are released again so the pool is
    /// never left partially connected.
    pub async fn connect_arms(
        &mut self,
        connector: &dyn ArmConnector,
        configs: &[ArmConfig],
    ) -> RecorderResult<()> {
        if configs.is_empty() {
            return Err(RecorderError::InvalidArgument(
                "at least one arm must be configured".to_string(),
            ));
        }

        for config in configs {
            if self.slot(config.side).is_some() {
                return Err(RecorderError::InvalidArgument(format!(
                    "{} arm configured twice",
                    config.side
                )));
            }

            tracing::info!("Connecting to {} arm at {}", config.side, config.address);
            match connector.connect(&config.address).await {
                Ok(driver) => {
                    tracing::info!("Connected to {} arm ({})", config.side, driver.id());
                    *self.slot_mut(config.side) = Some(ArmChannel {
                        side: config.side,
                        address: config.address.clone(),
                        driver,
                        connected: true,
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to connect to {} arm: {}", config.side, e);
                    self.release_arms().await;
                    return Err(RecorderError::Connection(e));
                }
            }
        }

        Ok(())
    }

    /// Open, configure and warm up each camera.
    ///
    /// Cameras are best-effort: a camera that fails any step is logged and
    /// left out of the pool. Returns the number of live cameras.
    pub async fn connect_cameras(
        &mut self,
        connector: &dyn CameraConnector,
        sources: &[CameraSource],
        settings: &CameraSettings,
    ) -> usize {
        for source in sources {
            let name = source.channel_name();
            if self.cameras.iter().any(|c| c.name == name) {
                tracing::warn!("Skipping camera {}: channel name {} already in use", source, name);
                continue;
            }

            match open_camera(connector, source, settings).await {
                Ok(driver) => {
                    tracing::info!("Camera {} ready as camera_{}", source, name);
                    self.cameras.push(CameraChannel {
                        name,
                        source: source.clone(),
                        driver,
                        connected: true,
                    });
                }
                Err(e) => {
                    tracing::warn!("Camera {} unavailable, recording without it: {}", source, e);
                }
            }
        }

        self.cameras.iter().filter(|c| c.connected).count()
    }

    /// Poll every connected arm concurrently.
    ///
    /// Waits for all reads; a failure on one arm never cancels the other.
    pub async fn read_arms_parallel(&mut self) -> ArmReadings {
        let (left, right) = tokio::join!(
            read_arm(self.left.as_mut()),
            read_arm(self.right.as_mut())
        );

        left.into_iter().chain(right).collect()
    }

    /// Poll every connected camera in turn
    pub async fn read_cameras(&mut self) -> CameraReadings {
        let mut readings = CameraReadings::new();
        let mut failed = Vec::new();

        for camera in self.cameras.iter_mut().filter(|c| c.connected) {
            match camera.driver.read_frame().await {
                Ok(image) => {
                    readings.insert(camera.name.clone(), Some(image));
                }
                Err(e) => {
                    failed.push(format!("{} ({})", camera.name, e));
                    readings.insert(camera.name.clone(), None);
                }
            }
        }

        if !failed.is_empty() {
            tracing::warn!("Camera read failed this tick: {}", failed.join(", "));
        }

        readings
    }

    /// Release every handle. Always runs to completion.
    pub async fn disconnect_all(&mut self) {
        self.release_arms().await;

        for camera in self.cameras.iter_mut().filter(|c| c.connected) {
            if let Err(e) = camera.driver.close().await {
                tracing::warn!("Failed to close camera {}: {}", camera.source, e);
            }
            camera.connected = false;
        }
    }

    pub fn is_arm_connected(&self, side: ArmSide) -> bool {
        self.slot(side).map(|c| c.connected).unwrap_or(false)
    }

    pub fn connected_arms(&self) -> Vec<ArmSide> {
        ArmSide::ALL
            .into_iter()
            .filter(|side| self.is_arm_connected(*side))
            .collect()
    }

    pub fn arm_address(&self, side: ArmSide) -> Option<&ArmAddress> {
        self.slot(side).map(|c| &c.address)
    }

    pub fn camera_names(&self) -> Vec<String> {
        self.cameras
            .iter()
            .filter(|c| c.connected)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.connected_arms().is_empty() && self.camera_names().is_empty()
    }

    /// Exclusive access to one connected arm, for command pass-through
    pub fn arm_mut(&mut self, side: ArmSide) -> RecorderResult<&mut dyn ArmDriver> {
        match self.slot_mut(side) {
            Some(channel) if channel.connected => Ok(channel.driver.as_mut()),
            _ => Err(RecorderError::Device(DeviceError::Disconnected(side.to_string()))),
        }
    }

    async fn release_arms(&mut self) {
        for channel in [self.left.as_mut(), self.right.as_mut()].into_iter().flatten() {
            if !channel.connected {
                continue;
            }
            if let Err(e) = channel.driver.disconnect().await {
                tracing::warn!("Failed to disconnect {} arm: {}", channel.side, e);
            }
            channel.connected = false;
        }
    }

    fn slot(&self, side: ArmSide) -> Option<&ArmChannel> {
        match side {
            ArmSide::Left => self.left.as_ref(),
            ArmSide::Right => self.right.as_ref(),
        }
    }

    fn slot_mut(&mut self, side: ArmSide) -> &mut Option<ArmChannel> {
        match side {
            ArmSide::Left => &mut self.left,
            ArmSide::Right => &mut self.right,
        }
    }
}

async fn open_camera(
    connector: &dyn CameraConnector,
    source: &CameraSource,
    settings: &CameraSettings,
) -> Result<Box<dyn CameraDriver>, DeviceError> {
    let mut driver = connector.open(source).await?;

    let warmed_up = match driver.configure(settings).await {
        Ok(()) => driver.read_frame().await.map(|_| ()),
        Err(e) => Err(e),
    };

    match warmed_up {
        Ok(()) => Ok(driver),
        Err(e) => {
            if let Err(close_err) = driver.close().await {
                tracing::debug!("Closing failed camera {} also failed: {}", source, close_err);
            }
            Err(e)
        }
    }
}

async fn read_arm(channel: Option<&mut ArmChannel>) -> Option<(ArmSide, Result<ArmSample, DeviceError>)> {
    let channel = channel.filter(|c| c.connected)?;

    let state = match channel.driver.read_state().await {
        Ok(state) => state,
        Err(e) => return Some((channel.side, Err(e))),
    };

    // A missing gripper does not invalidate the arm sample
    let gripper = channel.driver.read_gripper().await;
    if let Err(e) = &gripper {
        tracing::debug!("Gripper read failed on {} arm: {}", channel.side, e);
    }

    Some((
        channel.side,
        Ok(ArmSample {
            state,
            gripper,
            timestamp: now_secs(),
        }),
    ))
}
