use std::sync::Arc;
use std::time::Duration;

use crate::engine::{LoopState, RecordingLoop, TickReport, TickSink};
use crate::error::{RecorderError, RecorderResult};
use crate::hal::DevicePool;
use crate::observability::LoopMetrics;

/// Shared start/stop bookkeeping for the recorders.
///
/// While the loop runs, the pool and the sink live inside the loop task and
/// both `pool` and `sink` are `None` here.
pub(crate) struct LoopDriver<S: TickSink> {
    pool: Option<DevicePool>,
    sink: Option<S>,
    running: Option<RecordingLoop<S>>,
    state: LoopState,
    metrics: Arc<LoopMetrics>,
}

impl<S: TickSink> LoopDriver<S> {
    pub fn new() -> Self {
        Self {
            pool: None,
            sink: None,
            running: None,
            state: LoopState::Idle,
            metrics: Arc::new(LoopMetrics::new()),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn metrics(&self) -> Arc<LoopMetrics> {
        self.metrics.clone()
    }

    pub fn pool(&self) -> Option<&DevicePool> {
        self.pool.as_ref()
    }

    pub fn pool_mut(&mut self) -> RecorderResult<&mut DevicePool> {
        self.ensure_idle("access devices")?;
        self.pool
            .as_mut()
            .ok_or_else(|| RecorderError::invalid_state("no devices connected"))
    }

    pub fn set_pool(&mut self, pool: DevicePool) {
        self.pool = Some(pool);
    }

    pub fn take_pool(&mut self) -> Option<DevicePool> {
        self.pool.take()
    }

    pub fn sink(&self) -> Option<&S> {
        self.sink.as_ref()
    }

    pub fn sink_mut(&mut self) -> Option<&mut S> {
        self.sink.as_mut()
    }

    pub fn set_sink(&mut self, sink: S) {
        self.sink = Some(sink);
    }

    pub fn take_sink(&mut self) -> Option<S> {
        self.sink.take()
    }

    /// Run one tick in the caller's task
    pub async fn tick(&mut self) -> RecorderResult<TickReport> {
        self.ensure_idle("record a frame")?;
        let (pool, sink) = match (self.pool.as_mut(), self.sink.as_mut()) {
            (Some(pool), Some(sink)) => (pool, sink),
            (None, _) => return Err(RecorderError::invalid_state("no devices connected")),
            (_, None) => return Err(RecorderError::invalid_state("nothing to record into")),
        };

        let start = self.metrics.start_tick();
        let report = sink.record_tick(pool).await?;
        self.metrics.finish_tick(start);
        if report.is_degraded() {
            self.metrics.record_degraded();
        }
        self.metrics.record_camera_misses(report.camera_misses as u64);
        Ok(report)
    }

    /// Hand the pool and the sink to a new loop task
    pub fn start(&mut self, fps: f64) -> RecorderResult<()> {
        if !self.state.can_transition_to(LoopState::Running) {
            return Err(RecorderError::invalid_state(format!(
                "cannot start recording while {}",
                self.state
            )));
        }
        let pool = self
            .pool
            .take()
            .ok_or_else(|| RecorderError::invalid_state("no devices connected"))?;
        let Some(sink) = self.sink.take() else {
            self.pool = Some(pool);
            return Err(RecorderError::invalid_state("nothing to record into"));
        };

        self.running = Some(RecordingLoop::spawn(pool, sink, fps, self.metrics.clone()));
        self.state = LoopState::Running;
        Ok(())
    }

    /// Signal the loop and wait for it. Returns the number of frames it recorded.
    ///
    /// Stopping an idle driver is a no-op. After a timeout the driver stays
    /// `Stopping` and the next call waits again.
    pub async fn stop(&mut self, timeout: Duration) -> RecorderResult<u64> {
        let Some(running) = self.running.as_mut() else {
            return Ok(0);
        };

        running.request_stop();
        self.state = LoopState::Stopping;

        match running.join(timeout).await {
            Ok(exit) => {
                self.running = None;
                self.pool = Some(exit.pool);
                self.sink = Some(exit.sink);
                self.state = LoopState::Idle;
                match exit.error {
                    Some(e) => Err(e),
                    None => Ok(exit.frames),
                }
            }
            Err(e @ RecorderError::StopTimeout(_)) => {
                tracing::error!("Recording loop did not stop within {:?}", timeout);
                Err(e)
            }
            Err(e) => {
                // The task is gone and took the devices with it
                self.running = None;
                self.state = LoopState::Idle;
                Err(e)
            }
        }
    }

    fn ensure_idle(&self, action: &str) -> RecorderResult<()> {
        if self.state.is_idle() {
            Ok(())
        } else {
            Err(RecorderError::invalid_state(format!(
                "cannot {action} while {}",
                self.state
            )))
        }
    }
}
