use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::sink::TickSink;
use crate::error::{RecorderError, RecorderResult};
use crate::hal::DevicePool;
use crate::observability::LoopMetrics;

/// Everything the loop task owned, handed back when it is joined
pub struct LoopExit<S> {
    pub pool: DevicePool,
    pub sink: S,
    pub frames: u64,
    /// Set when the sink failed and ended the loop early
    pub error: Option<RecorderError>,
}

/// A running recording loop.
///
/// The pool and the sink are moved into a background task for as long as the
/// loop runs, so nothing else can touch them until [`RecordingLoop::join`]
/// returns them.
pub struct RecordingLoop<S> {
    handle: JoinHandle<LoopExit<S>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl<S: TickSink> RecordingLoop<S> {
    /// Start ticking at `fps` frames per second. The first tick runs immediately.
    pub fn spawn(pool: DevicePool, sink: S, fps: f64, metrics: Arc<LoopMetrics>) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
        let handle = tokio::spawn(run(pool, sink, fps, metrics, shutdown_rx));

        Self {
            handle,
            shutdown_tx,
        }
    }

    /// Ask the loop to stop at the next tick boundary
    pub fn request_stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait up to `timeout` for the loop task to finish.
    ///
    /// On [`RecorderError::StopTimeout`] the task keeps its resources and
    /// `join` may be called again.
    pub async fn join(&mut self, timeout: Duration) -> RecorderResult<LoopExit<S>> {
        match tokio::time::timeout(timeout, &mut self.handle).await {
            Ok(Ok(exit)) => Ok(exit),
            Ok(Err(e)) => Err(RecorderError::LoopPanicked(e.to_string())),
            Err(_) => Err(RecorderError::StopTimeout(timeout)),
        }
    }
}

impl<S> Drop for RecordingLoop<S> {
    fn drop(&mut self) {
        // Can't join here, but the task must not outlive its owner
        let _ = self.shutdown_tx.send(());
    }
}

async fn run<S: TickSink>(
    mut pool: DevicePool,
    mut sink: S,
    fps: f64,
    metrics: Arc<LoopMetrics>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> LoopExit<S> {
    let interval = Duration::from_secs_f64(1.0 / fps);
    let progress_every = (fps.round() as u64).max(1);
    let started = Instant::now();
    let mut deadline = started;
    let mut frames = 0u64;
    let mut error = None;

    tracing::info!("Recording loop started at {} FPS", fps);

    loop {
        // Stop is only observed between ticks
        if !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty)) {
            break;
        }

        let tick_start = metrics.start_tick();
        match sink.record_tick(&mut pool).await {
            Ok(report) => {
                frames += 1;
                if report.is_degraded() {
                    metrics.record_degraded();
                }
                metrics.record_camera_misses(report.camera_misses as u64);
            }
            Err(e) => {
                tracing::error!("Recording loop aborted after {} frames: {}", frames, e);
                metrics.record_sink_error();
                error = Some(e);
                break;
            }
        }
        metrics.finish_tick(tick_start);

        if frames % progress_every == 0 {
            let elapsed = started.elapsed().as_secs_f64();
            tracing::info!(
                "Recording... {:.1}s | {} frames | {:.1} FPS",
                elapsed,
                frames,
                frames as f64 / elapsed
            );
        }

        // Schedule against the previous deadline so timer slack does not accumulate
        deadline += interval;
        let now = Instant::now();
        if deadline <= now {
            metrics.record_overrun();
            deadline = now;
            tokio::task::yield_now().await;
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {}
            _ = shutdown_rx.recv() => break,
        }
    }

    tracing::info!("Recording loop stopped after {} frames", frames);

    LoopExit {
        pool,
        sink,
        frames,
        error,
    }
}
