pub mod episode;
pub mod feature;
pub mod frame;

pub use episode::{now_secs, Episode, EpisodeStats};
pub use feature::{ArmSide, FeatureKey};
pub use frame::{FeatureMap, Frame, FrameData, ImageBuffer, Value};
