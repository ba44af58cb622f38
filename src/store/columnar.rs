//! Columnar episode files.
//!
//! Parquet support is compiled in with the `parquet` feature. Without it
//! [`default_writer`] returns `None` and episodes are stored as JSON.

use std::path::Path;

use super::table::EpisodeTable;
use crate::error::StoreResult;

/// Writes an [`EpisodeTable`] to a single file
pub trait ColumnarWriter: Send + Sync {
    /// File extension without the dot
    fn extension(&self) -> &'static str;

    /// Write the table. [`crate::error::StoreError::WriterUnavailable`] tells
    /// the caller to fall back to JSON; any other error is fatal.
    fn write(&self, table: &EpisodeTable, path: &Path) -> StoreResult<()>;
}

#[cfg(feature = "parquet")]
pub fn default_writer() -> Option<Box<dyn ColumnarWriter>> {
    Some(Box::new(parquet_io::ParquetWriter::default()))
}

#[cfg(not(feature = "parquet"))]
pub fn default_writer() -> Option<Box<dyn ColumnarWriter>> {
    None
}

#[cfg(feature = "parquet")]
pub use parquet_io::{read_table, ParquetWriter};

#[cfg(feature = "parquet")]
mod parquet_io {
    use std::fs::File;
    use std::path::Path;
    use std::sync::Arc;

    use arrow::array::{
        Array, ArrayRef, AsArray, FixedSizeListBuilder, Float64Array, Float64Builder, Int64Array,
        ListBuilder,
    };
    use arrow::datatypes::{DataType, Float64Type, Int64Type};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use parquet::arrow::ArrowWriter;
    use parquet::basic::Compression;
    use parquet::file::properties::WriterProperties;

    use super::ColumnarWriter;
    use crate::error::{StoreError, StoreResult};
    use crate::store::table::{
        Column, ColumnData, EpisodeTable, EPISODE_INDEX_COLUMN, FRAME_INDEX_COLUMN,
        TIMESTAMP_COLUMN,
    };

    /// Snappy-compressed Parquet, one row group per episode
    #[derive(Debug, Clone)]
    pub struct ParquetWriter {
        compression: Compression,
    }

    impl Default for ParquetWriter {
        fn default() -> Self {
            Self {
                compression: Compression::SNAPPY,
            }
        }
    }

    impl ColumnarWriter for ParquetWriter {
        fn extension(&self) -> &'static str {
            "parquet"
        }

        fn write(&self, table: &EpisodeTable, path: &Path) -> StoreResult<()> {
            let arrays = table
                .columns()
                .iter()
                .map(|column| Ok((column.name.as_str(), to_array(&column.data)?)))
                .collect::<StoreResult<Vec<(&str, ArrayRef)>>>()?;
            let batch = RecordBatch::try_from_iter(arrays)?;

            let props = WriterProperties::builder()
                .set_compression(self.compression)
                .build();
            let file = File::create(path)?;
            let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
            writer.write(&batch)?;
            writer.close()?;
            Ok(())
        }
    }

    fn to_array(data: &ColumnData) -> StoreResult<ArrayRef> {
        let array: ArrayRef = match data {
            ColumnData::Int(values) => Arc::new(Int64Array::from(values.clone())),
            ColumnData::Scalar(values) => Arc::new(Float64Array::from(values.clone())),
            ColumnData::Vector {
                width: Some(width),
                values,
            } => {
                let mut builder = FixedSizeListBuilder::new(Float64Builder::new(), *width as i32);
                for value in values {
                    match value {
                        Some(v) => {
                            builder.values().append_slice(v);
                            builder.append(true);
                        }
                        None => {
                            // Null slots still occupy `width` child values
                            builder.values().append_nulls(*width);
                            builder.append(false);
                        }
                    }
                }
                Arc::new(builder.finish())
            }
            ColumnData::Vector { width: None, values } => {
                let mut builder = ListBuilder::new(Float64Builder::new());
                for value in values {
                    match value {
                        Some(v) => {
                            builder.values().append_slice(v);
                            builder.append(true);
                        }
                        None => builder.append(false),
                    }
                }
                Arc::new(builder.finish())
            }
        };
        Ok(array)
    }

    /// Load an episode file written by [`ParquetWriter`]
    pub fn read_table(path: &Path) -> StoreResult<EpisodeTable> {
        let file = File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut columns: Vec<Column> = Vec::new();
        for batch in reader {
            let batch = batch?;
            let schema = batch.schema();
            for (i, field) in schema.fields().iter().enumerate() {
                let data = from_array(field.name(), batch.column(i).as_ref())?;
                match columns.iter_mut().find(|c| &c.name == field.name()) {
                    Some(column) => append(&mut column.data, data),
                    None => columns.push(Column {
                        name: field.name().clone(),
                        data,
                    }),
                }
            }
        }

        for required in [EPISODE_INDEX_COLUMN, FRAME_INDEX_COLUMN, TIMESTAMP_COLUMN] {
            if !columns.iter().any(|c| c.name == required) {
                return Err(StoreError::MissingColumn(required.to_string()));
            }
        }

        Ok(EpisodeTable::from_columns(columns))
    }

    fn from_array(name: &str, array: &dyn Array) -> StoreResult<ColumnData> {
        let data = match array.data_type() {
            DataType::Int64 => ColumnData::Int(array.as_primitive::<Int64Type>().values().to_vec()),
            DataType::Float64 => {
                ColumnData::Scalar(array.as_primitive::<Float64Type>().iter().collect())
            }
            DataType::FixedSizeList(_, width) => {
                let list = array.as_fixed_size_list();
                let values = (0..list.len())
                    .map(|row| {
                        if list.is_null(row) {
                            None
                        } else {
                            Some(float_values(list.value(row).as_ref()))
                        }
                    })
                    .collect();
                ColumnData::Vector {
                    width: Some(*width as usize),
                    values,
                }
            }
            DataType::List(_) => {
                let list = array.as_list::<i32>();
                let values = (0..list.len())
                    .map(|row| {
                        if list.is_null(row) {
                            None
                        } else {
                            Some(float_values(list.value(row).as_ref()))
                        }
                    })
                    .collect();
                ColumnData::Vector {
                    width: None,
                    values,
                }
            }
            other => {
                return Err(StoreError::Columnar(format!(
                    "unsupported type {other} in column {name}"
                )))
            }
        };
        Ok(data)
    }

    fn float_values(array: &dyn Array) -> Vec<f64> {
        array.as_primitive::<Float64Type>().values().to_vec()
    }

    fn append(target: &mut ColumnData, more: ColumnData) {
        match (target, more) {
            (ColumnData::Int(a), ColumnData::Int(b)) => a.extend(b),
            (ColumnData::Scalar(a), ColumnData::Scalar(b)) => a.extend(b),
            (ColumnData::Vector { values: a, .. }, ColumnData::Vector { values: b, .. }) => {
                a.extend(b)
            }
            // Schema is fixed per file
            _ => {}
        }
    }
}
