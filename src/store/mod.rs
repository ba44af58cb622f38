pub mod columnar;
pub mod episode_store;
pub mod info;
pub mod layout;
pub mod table;

#[cfg(feature = "parquet")]
pub use columnar::{read_table, ParquetWriter};
pub use columnar::{default_writer, ColumnarWriter};
pub use episode_store::{EpisodeLogEntry, EpisodeStore, StoredEpisode, StoredFormat};
pub use info::DatasetInfo;
pub use layout::DatasetLayout;
pub use table::{Column, ColumnData, EpisodeTable};
