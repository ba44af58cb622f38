pub mod recording_loop;
pub mod sink;
pub mod state;
pub mod translate;

pub use recording_loop::{LoopExit, RecordingLoop};
pub use sink::TickSink;
pub use state::LoopState;
pub use translate::{capture, translate, TickReport};
