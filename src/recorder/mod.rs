pub mod dataset;
mod driver;
pub mod flat;

pub use dataset::DatasetRecorder;
pub use flat::{ArmEntry, FlatFrame, FlatMetadata, FlatRecorder, FlatRecording, GripperEntry};
