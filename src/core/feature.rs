use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Which of the two arms a channel belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArmSide {
    Left,
    Right,
}

impl ArmSide {
    pub const ALL: [ArmSide; 2] = [ArmSide::Left, ArmSide::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArmSide::Left => "left",
            ArmSide::Right => "right",
        }
    }

    /// Name used by the legacy flat format ("arm1" / "arm2")
    pub fn legacy_name(&self) -> &'static str {
        match self {
            ArmSide::Left => "arm1",
            ArmSide::Right => "arm2",
        }
    }

    fn parse_prefix(s: &str) -> Option<(ArmSide, &str)> {
        if let Some(rest) = s.strip_prefix("left_") {
            Some((ArmSide::Left, rest))
        } else {
            s.strip_prefix("right_").map(|rest| (ArmSide::Right, rest))
        }
    }
}

impl fmt::Display for ArmSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recognized observation/action/state keys.
///
/// Every variant renders to the column name used on disk, and parsing a column
/// name gives back the same variant. Unknown names land in `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureKey {
    /// `observation.state.<side>_arm`, joint angles in radians
    ObservationArm(ArmSide),
    /// `observation.state.<side>_eef_pos`, meters
    ObservationEefPos(ArmSide),
    /// `observation.state.<side>_eef_euler`, radians
    ObservationEefEuler(ArmSide),
    /// `observation.state.<side>_gripper`
    ObservationGripper(ArmSide),
    /// `action.<side>_arm`
    ActionArm(ArmSide),
    /// `action.<side>_gripper`
    ActionGripper(ArmSide),
    /// `state.<side>_arm`
    StateArm(ArmSide),
    /// `observation.camera_<name>`, pixel buffer
    Camera(String),
    Custom(String),
}

impl FeatureKey {
    pub fn camera(name: impl Into<String>) -> Self {
        FeatureKey::Camera(name.into())
    }

    pub fn side(&self) -> Option<ArmSide> {
        match self {
            FeatureKey::ObservationArm(s)
            | FeatureKey::ObservationEefPos(s)
            | FeatureKey::ObservationEefEuler(s)
            | FeatureKey::ObservationGripper(s)
            | FeatureKey::ActionArm(s)
            | FeatureKey::ActionGripper(s)
            | FeatureKey::StateArm(s) => Some(*s),
            _ => None,
        }
    }

    pub fn is_camera(&self) -> bool {
        matches!(self, FeatureKey::Camera(_))
    }

    /// All keys one live arm contributes to a frame
    pub fn arm_keys(side: ArmSide) -> [FeatureKey; 7] {
        [
            FeatureKey::ObservationArm(side),
            FeatureKey::ObservationEefPos(side),
            FeatureKey::ObservationEefEuler(side),
            FeatureKey::ObservationGripper(side),
            FeatureKey::ActionArm(side),
            FeatureKey::ActionGripper(side),
            FeatureKey::StateArm(side),
        ]
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureKey::ObservationArm(s) => write!(f, "observation.state.{s}_arm"),
            FeatureKey::ObservationEefPos(s) => write!(f, "observation.state.{s}_eef_pos"),
            FeatureKey::ObservationEefEuler(s) => write!(f, "observation.state.{s}_eef_euler"),
            FeatureKey::ObservationGripper(s) => write!(f, "observation.state.{s}_gripper"),
            FeatureKey::ActionArm(s) => write!(f, "action.{s}_arm"),
            FeatureKey::ActionGripper(s) => write!(f, "action.{s}_gripper"),
            FeatureKey::StateArm(s) => write!(f, "state.{s}_arm"),
            FeatureKey::Camera(name) => write!(f, "observation.camera_{name}"),
            FeatureKey::Custom(name) => f.write_str(name),
        }
    }
}

impl FromStr for FeatureKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let custom = || FeatureKey::Custom(s.to_string());

        if let Some(rest) = s.strip_prefix("observation.state.") {
            let key = ArmSide::parse_prefix(rest).and_then(|(side, field)| match field {
                "arm" => Some(FeatureKey::ObservationArm(side)),
                "eef_pos" => Some(FeatureKey::ObservationEefPos(side)),
                "eef_euler" => Some(FeatureKey::ObservationEefEuler(side)),
                "gripper" => Some(FeatureKey::ObservationGripper(side)),
                _ => None,
            });
            return Ok(key.unwrap_or_else(custom));
        }
        if let Some(name) = s.strip_prefix("observation.camera_") {
            if !name.is_empty() {
                return Ok(FeatureKey::Camera(name.to_string()));
            }
            return Ok(custom());
        }
        if let Some(rest) = s.strip_prefix("action.") {
            let key = ArmSide::parse_prefix(rest).and_then(|(side, field)| match field {
                "arm" => Some(FeatureKey::ActionArm(side)),
                "gripper" => Some(FeatureKey::ActionGripper(side)),
                _ => None,
            });
            return Ok(key.unwrap_or_else(custom));
        }
        if let Some(rest) = s.strip_prefix("state.") {
            let key = ArmSide::parse_prefix(rest).and_then(|(side, field)| match field {
                "arm" => Some(FeatureKey::StateArm(side)),
                _ => None,
            });
            return Ok(key.unwrap_or_else(custom));
        }
        Ok(custom())
    }
}

impl Serialize for FeatureKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FeatureKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        // Infallible
        Ok(s.parse().unwrap_or(FeatureKey::Custom(s)))
    }
}
