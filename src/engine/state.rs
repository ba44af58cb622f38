use serde::{Deserialize, Serialize};
use std::fmt;

/// Recording loop states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoopState {
    #[default]
    Idle,
    Running,
    /// Stop was requested but the loop task has not been joined yet
    Stopping,
}

impl LoopState {
    /// Check if transition from current state to target state is valid
    pub fn can_transition_to(&self, target: LoopState) -> bool {
        use LoopState::*;

        matches!(
            (self, target),
            (Idle, Running) |
            (Running, Stopping) |
            // Joined immediately after the stop signal
            (Running, Idle) |
            (Stopping, Idle)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
