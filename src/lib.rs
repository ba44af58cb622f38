//! Fixed-rate recording of dual robotic-arm sessions.
//!
//! Devices are reached through the traits in [`hal`]; the recorders in
//! [`recorder`] drive a [`engine::RecordingLoop`] over a [`hal::DevicePool`]
//! and persist episodes through [`store::EpisodeStore`].

pub mod config;
pub mod control;
pub mod core;
pub mod engine;
pub mod error;
pub mod hal;
pub mod logging;
pub mod observability;
pub mod recorder;
pub mod store;

pub use config::RecorderConfig;
pub use error::{DeviceError, RecorderError, RecorderResult, StoreError};
pub use recorder::{DatasetRecorder, FlatRecorder};
