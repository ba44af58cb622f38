use async_trait::async_trait;

use super::translate::{capture, TickReport};
use crate::core::Episode;
use crate::error::RecorderResult;
use crate::hal::DevicePool;

/// Destination of the frames produced by the recording loop.
///
/// Each call polls the pool once and appends exactly one frame. A returned
/// error ends the loop.
#[async_trait]
pub trait TickSink: Send + 'static {
    async fn record_tick(&mut self, pool: &mut DevicePool) -> RecorderResult<TickReport>;
}

#[async_trait]
impl TickSink for Episode {
    async fn record_tick(&mut self, pool: &mut DevicePool) -> RecorderResult<TickReport> {
        let (data, report) = capture(pool).await;
        self.add_frame_data(data)?;
        Ok(report)
    }
}
