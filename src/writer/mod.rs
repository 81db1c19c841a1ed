pub mod config;
pub mod locked;
pub mod task;

pub use config::{QuoteStyle, Strategy, Terminator, WriterConfig};
pub use locked::LockedCsvWriter;
pub use task::CsvWriter;

use crate::error::WriterResult;
use crate::row::Row;
use crate::stats::StatsSnapshot;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};

/// A row sink that any number of threads may write to at once.
///
/// Every record lands in the output whole: rows are never interleaved
/// mid-encoding, and nothing is written once `close` has returned.
///
/// A stream fault is sticky under both strategies: once the file fails, every
/// later `write`, `flush` and `close` returns that fault as `Encoding`.
pub trait RowWriter: Send + Sync {
    fn write(&self, row: Row) -> WriterResult<()>;

    /// Write each row in turn, stopping at the first error. Rows written
    /// before the error stay in the output.
    fn write_all(&self, rows: &[Row]) -> WriterResult<()> {
        for row in rows {
            self.write(row.clone())?;
        }
        Ok(())
    }

    fn flush(&self) -> WriterResult<()>;

    /// Flush, finalize and release the destination. A second call returns
    /// `WriterError::Closed`.
    fn close(&self) -> WriterResult<()>;

    fn stats(&self) -> StatsSnapshot;
    fn path(&self) -> &Path;
    fn strategy(&self) -> Strategy;
}

/// Open `path` with the owning-task writer and default settings.
pub fn open(path: impl AsRef<Path>) -> WriterResult<CsvWriter> {
    CsvWriter::open(path)
}

/// Open `path` with whichever strategy `config` names.
pub fn open_with(path: impl AsRef<Path>, config: WriterConfig) -> WriterResult<Box<dyn RowWriter>> {
    match config.strategy {
        Strategy::Task => Ok(Box::new(CsvWriter::open_with(path, config)?)),
        Strategy::Locked => Ok(Box::new(LockedCsvWriter::open_with(path, config)?)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum State {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

/// Tri-state lifecycle flag shared by every caller of one writer.
#[derive(Debug)]
pub(crate) struct Lifecycle(AtomicU8);

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(State::Open as u8))
    }

    pub(crate) fn state(&self) -> State {
        match self.0.load(Ordering::Acquire) {
            0 => State::Open,
            1 => State::Closing,
            _ => State::Closed,
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state() == State::Open
    }

    /// `Open -> Closing`. Only one caller ever gets `true`.
    pub(crate) fn begin_close(&self) -> bool {
        self.0
            .compare_exchange(
                State::Open as u8,
                State::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn finish_close(&self) {
        self.0.store(State::Closed as u8, Ordering::Release);
    }
}
