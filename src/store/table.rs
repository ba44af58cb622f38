use std::collections::BTreeMap;

use crate::core::{Episode, Value};
use crate::error::{StoreError, StoreResult};

pub const EPISODE_INDEX_COLUMN: &str = "episode_index";
pub const FRAME_INDEX_COLUMN: &str = "frame_index";
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Column storage. Missing keys in a frame are `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int(Vec<i64>),
    Scalar(Vec<Option<f64>>),
    /// `width` is set when every present value has the same length
    Vector {
        width: Option<usize>,
        values: Vec<Option<Vec<f64>>>,
    },
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int(v) => v.len(),
            ColumnData::Scalar(v) => v.len(),
            ColumnData::Vector { values, .. } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            ColumnData::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_scalars(&self) -> Option<&[Option<f64>]> {
        match self {
            ColumnData::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vectors(&self) -> Option<&[Option<Vec<f64>>]> {
        match self {
            ColumnData::Vector { values, .. } => Some(values),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

/// Tabular form of one episode: one row per frame.
///
/// Leading columns are `episode_index`, `frame_index` and `timestamp`,
/// followed by one column per distinct non-image key, sorted by name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EpisodeTable {
    columns: Vec<Column>,
}

impl EpisodeTable {
    pub fn from_columns(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn from_episode(episode: &Episode) -> StoreResult<Self> {
        let frames = episode.frames();
        let rows = frames.len();

        let mut columns = vec![
            Column {
                name: EPISODE_INDEX_COLUMN.to_string(),
                data: ColumnData::Int(vec![episode.episode_index() as i64; rows]),
            },
            Column {
                name: FRAME_INDEX_COLUMN.to_string(),
                data: ColumnData::Int(frames.iter().map(|f| f.index as i64).collect()),
            },
            Column {
                name: TIMESTAMP_COLUMN.to_string(),
                data: ColumnData::Scalar(frames.iter().map(|f| Some(f.timestamp)).collect()),
            },
        ];

        // Column name -> one cell per frame
        let mut cells: BTreeMap<String, Vec<Option<&Value>>> = BTreeMap::new();
        for (row, frame) in frames.iter().enumerate() {
            for (key, value) in frame.tabular_values() {
                let column = cells
                    .entry(key.to_string())
                    .or_insert_with(|| vec![None; rows]);
                // First occurrence wins: observation, then action, then state
                if column[row].is_none() {
                    column[row] = Some(value);
                }
            }
        }

        for (name, values) in cells {
            let data = build_column(&name, &values)?;
            columns.push(Column { name, data });
        }

        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.data.len()).unwrap_or(0)
    }
}

fn build_column(name: &str, cells: &[Option<&Value>]) -> StoreResult<ColumnData> {
    let inconsistent = || StoreError::InconsistentColumn {
        column: name.to_string(),
    };

    let is_vector = match cells.iter().flatten().next() {
        Some(Value::Vector(_)) => true,
        Some(Value::Scalar(_)) => false,
        _ => return Err(inconsistent()),
    };

    if is_vector {
        let values = cells
            .iter()
            .map(|cell| match cell {
                None => Ok(None),
                Some(Value::Vector(v)) => Ok(Some(v.clone())),
                Some(_) => Err(inconsistent()),
            })
            .collect::<StoreResult<Vec<_>>>()?;

        let mut widths = values.iter().flatten().map(Vec::len);
        let first = widths.next();
        let width = match first {
            Some(w) if widths.all(|other| other == w) => Some(w),
            _ => None,
        };

        Ok(ColumnData::Vector { width, values })
    } else {
        cells
            .iter()
            .map(|cell| match cell {
                None => Ok(None),
                Some(Value::Scalar(v)) => Ok(Some(*v)),
                Some(_) => Err(inconsistent()),
            })
            .collect::<StoreResult<Vec<_>>>()
            .map(ColumnData::Scalar)
    }
}
