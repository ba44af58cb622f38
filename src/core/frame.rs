use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::FeatureKey;

/// Raw camera image. Pixel data is shared, never copied between frames.
///
/// Only the shape is serialized; JSON documents never carry pixel data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    #[serde(skip)]
    pub data: Arc<Vec<u8>>,
}

impl ImageBuffer {
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels,
            data: Arc::new(data),
        }
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

/// A recorded value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Scalar(f64),
    Vector(Vec<f64>),
    Image(ImageBuffer),
}

impl Value {
    pub fn is_image(&self) -> bool {
        matches!(self, Value::Image(_))
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Vector(v)
    }
}

impl From<ImageBuffer> for Value {
    fn from(image: ImageBuffer) -> Self {
        Value::Image(image)
    }
}

pub type FeatureMap = BTreeMap<FeatureKey, Value>;

/// One time-stamped sample appended to an episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Seconds since the UNIX epoch
    pub timestamp: f64,

    /// Position within the parent episode, starting at 0
    pub index: u64,

    pub observation: FeatureMap,
    pub action: FeatureMap,
    pub state: FeatureMap,

    /// Observation keys holding pixel buffers, in capture order
    pub image_keys: Vec<FeatureKey>,
}

impl Frame {
    /// Look a key up across observation, action and state, in that order
    pub fn get(&self, key: &FeatureKey) -> Option<&Value> {
        self.observation
            .get(key)
            .or_else(|| self.action.get(key))
            .or_else(|| self.state.get(key))
    }

    /// Non-image entries of all three maps
    pub fn tabular_values(&self) -> impl Iterator<Item = (&FeatureKey, &Value)> {
        self.observation
            .iter()
            .chain(self.action.iter())
            .chain(self.state.iter())
            .filter(|(_, v)| !v.is_image())
    }

    pub fn has_side(&self, side: super::ArmSide) -> bool {
        self.observation.keys().any(|k| k.side() == Some(side))
    }
}

/// Mutable frame contents collected during one tick.
///
/// Inserting an image through [`FrameData::insert_image`] records its key in
/// `image_keys`, so the image-key invariant of [`Frame`] holds by construction.
#[derive(Debug, Clone, Default)]
pub struct FrameData {
    pub observation: FeatureMap,
    pub action: FeatureMap,
    pub state: FeatureMap,
    pub image_keys: Vec<FeatureKey>,
}

impl FrameData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_observation(&mut self, key: FeatureKey, value: impl Into<Value>) {
        let value = value.into();
        if let Value::Image(image) = value {
            self.insert_image(key, image);
        } else {
            self.observation.insert(key, value);
        }
    }

    pub fn insert_image(&mut self, key: FeatureKey, image: ImageBuffer) {
        if !self.image_keys.contains(&key) {
            self.image_keys.push(key.clone());
        }
        self.observation.insert(key, Value::Image(image));
    }

    pub fn insert_action(&mut self, key: FeatureKey, value: impl Into<Value>) {
        self.action.insert(key, value.into());
    }

    pub fn insert_state(&mut self, key: FeatureKey, value: impl Into<Value>) {
        self.state.insert(key, value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.observation.is_empty() && self.action.is_empty() && self.state.is_empty()
    }
}
