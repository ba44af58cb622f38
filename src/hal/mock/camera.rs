use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::ImageBuffer;
use crate::error::DeviceError;
use crate::hal::traits::{CameraConnector, CameraDriver};
use crate::hal::types::{CameraSettings, CameraSource};

/// Shared fault-injection switches for one simulated camera
#[derive(Debug, Default)]
pub struct CameraFaults {
    fail_configure: AtomicBool,
    fail_next_reads: AtomicUsize,
    frames_read: AtomicU64,
}

impl CameraFaults {
    pub fn set_fail_configure(&self, fail: bool) {
        self.fail_configure.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `n` frame reads (the warm-up read counts)
    pub fn fail_next_reads(&self, n: usize) {
        self.fail_next_reads.store(n, Ordering::SeqCst);
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.fail_next_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Camera producing a moving RGB gradient
pub struct SimulatedCamera {
    id: String,
    settings: CameraSettings,
    faults: Arc<CameraFaults>,
    frame_counter: u64,
    open: bool,
}

impl SimulatedCamera {
    pub fn new(id: impl Into<String>, faults: Arc<CameraFaults>) -> Self {
        Self {
            id: id.into(),
            settings: CameraSettings::default(),
            faults,
            frame_counter: 0,
            open: true,
        }
    }

    fn render(&self) -> ImageBuffer {
        let CameraSettings { width, height, .. } = self.settings;
        let shift = self.frame_counter as u32;
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(((x + shift) % 256) as u8);
                data.push(((y + shift) % 256) as u8);
                data.push((shift % 256) as u8);
            }
        }
        ImageBuffer::new(width, height, 3, data)
    }
}

#[async_trait]
impl CameraDriver for SimulatedCamera {
    fn id(&self) -> &str {
        &self.id
    }

    async fn configure(&mut self, settings: &CameraSettings) -> Result<(), DeviceError> {
        if self.faults.fail_configure.load(Ordering::SeqCst) {
            return Err(DeviceError::Io(format!(
                "{} does not support {}x{}@{}",
                self.id, settings.width, settings.height, settings.fps
            )));
        }
        self.settings = *settings;
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<ImageBuffer, DeviceError> {
        if !self.open {
            return Err(DeviceError::Disconnected(self.id.clone()));
        }
        if self.faults.take_failure() {
            return Err(DeviceError::Io(format!("{}: no frame available", self.id)));
        }

        let image = self.render();
        self.frame_counter += 1;
        self.faults.frames_read.fetch_add(1, Ordering::SeqCst);
        Ok(image)
    }

    async fn close(&mut self) -> Result<(), DeviceError> {
        self.open = false;
        Ok(())
    }
}

/// Hands out [`SimulatedCamera`] captures
#[derive(Default)]
pub struct SimulatedCameraConnector {
    unavailable: HashSet<CameraSource>,
    faults: Mutex<HashMap<CameraSource, Arc<CameraFaults>>>,
}

impl SimulatedCameraConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opening this source fails
    pub fn with_unavailable(mut self, source: CameraSource) -> Self {
        self.unavailable.insert(source);
        self
    }

    pub fn faults_for(&self, source: &CameraSource) -> Arc<CameraFaults> {
        let mut faults = match self.faults.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        faults.entry(source.clone()).or_default().clone()
    }
}

#[async_trait]
impl CameraConnector for SimulatedCameraConnector {
    async fn open(&self, source: &CameraSource) -> Result<Box<dyn CameraDriver>, DeviceError> {
        if self.unavailable.contains(source) {
            return Err(DeviceError::Connection {
                address: source.to_string(),
                reason: "cannot open camera".to_string(),
            });
        }
        Ok(Box::new(SimulatedCamera::new(
            source.to_string(),
            self.faults_for(source),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_match_configured_resolution() {
        let mut camera = SimulatedCamera::new("sim", Arc::new(CameraFaults::default()));
        camera
            .configure(&CameraSettings {
                width: 8,
                height: 4,
                fps: 30,
            })
            .await
            .unwrap();

        let image = camera.read_frame().await.unwrap();
        assert_eq!((image.width, image.height, image.channels), (8, 4, 3));
        assert_eq!(image.byte_len(), 8 * 4 * 3);
    }

    #[tokio::test]
    async fn test_closed_camera_returns_error() {
        let mut camera = SimulatedCamera::new("sim", Arc::new(CameraFaults::default()));
        camera.close().await.unwrap();
        assert!(camera.read_frame().await.is_err());
    }
}
