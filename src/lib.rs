//! `convoy` — a CSV writer that many threads can share.
//!
//! Producers call [`RowWriter::write`] from anywhere; every row reaches the
//! file whole, one after another. Two strategies are provided:
//!
//! | Strategy            | Type                | Who runs the encoder          |
//! |---------------------|---------------------|-------------------------------|
//! | [`Strategy::Task`]  | [`CsvWriter`]       | one background writer thread  |
//! | [`Strategy::Locked`]| [`LockedCsvWriter`] | the caller, under a mutex     |
//!
//! ```rust,ignore
//! use convoy::prelude::*;
//!
//! let writer = convoy::open("out.csv")?;
//! writer.write(Row::from(["A", "row", "in", "a", "CSV", "file"]))?;
//! writer.close()?;
//! ```

pub mod encoder;
pub mod error;
pub mod row;
pub mod stats;
pub mod writer;

pub use error::{EncodingFault, WriterError, WriterResult};
pub use row::Row;
pub use stats::{StatsSnapshot, WriterStats};
pub use writer::{
    open, open_with, CsvWriter, LockedCsvWriter, RowWriter, Strategy, WriterConfig,
};

pub mod prelude {
    pub use crate::error::{WriterError, WriterResult};
    pub use crate::row::Row;
    pub use crate::writer::{CsvWriter, LockedCsvWriter, RowWriter, Strategy, WriterConfig};
}
