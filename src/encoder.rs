//! Binding to the `csv` encoder and the field-count guard that sits in front of it.

use crate::error::{EncodingFault, WriterError, WriterResult};
use crate::row::Row;
use crate::writer::config::WriterConfig;
use csv::Writer;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Owns the destination file and the encoder bound to it.
///
/// Never shared: exactly one thread drives a `RowEncoder` at a time, either
/// the owning task or whoever holds the writer's lock.
pub struct RowEncoder {
    writer: Writer<File>,
}

impl RowEncoder {
    /// Create (or truncate) `path` and write the configured header, if any.
    pub fn create(path: &Path, config: &WriterConfig) -> WriterResult<Self> {
        let file = File::create(path).map_err(|source| WriterError::Create {
            path: path.to_path_buf(),
            source,
        })?;
        let mut encoder = Self {
            writer: config.csv_builder().from_writer(file),
        };

        if let Some(header) = &config.header {
            encoder
                .encode(header)
                .map_err(|e| WriterError::encoding("writing the header", e))?;
        }

        debug!("Encoder ready for {}", path.display());
        Ok(encoder)
    }

    pub fn encode(&mut self, row: &Row) -> Result<(), EncodingFault> {
        self.writer.write_record(row)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), EncodingFault> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush, then release the file. The handle is closed on return.
    pub fn finish(mut self) -> Result<(), EncodingFault> {
        self.writer.flush()?;
        let file = self.writer.into_inner().map_err(|e| e.into_error())?;
        drop(file);
        Ok(())
    }
}

const UNSET: usize = usize::MAX;

/// Field-count guard checked on the caller's thread before a row is handed on.
///
/// In strict mode the first row to pass (or the header) fixes the width for
/// the rest of the file. Rejected rows never reach the encoder, so they cannot
/// leave half a record in the stream.
#[derive(Debug)]
pub struct Shape {
    flexible: bool,
    width: AtomicUsize,
}

impl Shape {
    pub fn new(config: &WriterConfig) -> Self {
        let width = config.header.as_ref().map_or(UNSET, Row::len);
        Self {
            flexible: config.flexible,
            width: AtomicUsize::new(width),
        }
    }

    pub fn check(&self, row: &Row) -> Result<(), EncodingFault> {
        if self.flexible {
            return Ok(());
        }

        let found = row.len();
        match self
            .width
            .compare_exchange(UNSET, found, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(expected) if expected == found => Ok(()),
            Err(expected) => Err(EncodingFault::UnequalLengths { expected, found }),
        }
    }
}
