use super::{RowWriter, Strategy, WriterConfig};
use crate::encoder::{RowEncoder, Shape};
use crate::error::{EncodingFault, WriterError, WriterResult};
use crate::row::Row;
use crate::stats::{StatsSnapshot, WriterStats};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Mutex-guarded writer. Callers run the encoder themselves while holding
/// the lock; `None` in the slot means the writer has been closed.
///
/// A stream fault is sticky, as with the owning-task writer: once the encoder
/// or file fails, every later call reports that fault.
pub struct LockedCsvWriter {
    path: PathBuf,
    encoder: Mutex<Option<RowEncoder>>,
    // Only touched while `encoder` is locked
    fault: Mutex<Option<Arc<EncodingFault>>>,
    shape: Shape,
    stats: WriterStats,
}

impl LockedCsvWriter {
    pub fn open(path: impl AsRef<Path>) -> WriterResult<Self> {
        Self::open_with(path, WriterConfig::default())
    }

    pub fn open_with(path: impl AsRef<Path>, config: WriterConfig) -> WriterResult<Self> {
        let path = path.as_ref().to_path_buf();
        let encoder = RowEncoder::create(&path, &config)?;

        info!("Opened {} (strategy: locked)", path.display());

        Ok(Self {
            path,
            encoder: Mutex::new(Some(encoder)),
            fault: Mutex::new(None),
            shape: Shape::new(&config),
            stats: WriterStats::new(),
        })
    }

    fn check_fault(&self, context: &'static str) -> WriterResult<()> {
        match self.fault.lock().as_ref() {
            Some(fault) => Err(WriterError::Encoding {
                context,
                source: fault.clone(),
            }),
            None => Ok(()),
        }
    }

    fn record(&self, context: &'static str, e: EncodingFault) -> WriterError {
        warn!("Writer for {} faulted: {}", self.path.display(), e);
        let fault = Arc::new(e);
        *self.fault.lock() = Some(fault.clone());
        WriterError::Encoding {
            context,
            source: fault,
        }
    }

    fn write_locked(&self, encoder: &mut RowEncoder, row: &Row) -> WriterResult<()> {
        if let Err(fault) = self.shape.check(row) {
            self.stats.row_rejected();
            return Err(WriterError::encoding("writing a row", fault));
        }

        encoder
            .encode(row)
            .map_err(|e| self.record("writing a row", e))?;
        self.stats.row_accepted();
        self.stats.row_written();
        Ok(())
    }
}

impl RowWriter for LockedCsvWriter {
    fn write(&self, row: Row) -> WriterResult<()> {
        let mut guard = self.encoder.lock();
        let encoder = guard.as_mut().ok_or(WriterError::Closed)?;
        self.check_fault("writing a row")?;
        self.write_locked(encoder, &row)
    }

    /// Holds the lock for the whole batch, so a batch lands contiguously.
    fn write_all(&self, rows: &[Row]) -> WriterResult<()> {
        let mut guard = self.encoder.lock();
        let encoder = guard.as_mut().ok_or(WriterError::Closed)?;
        self.check_fault("writing a row")?;
        for row in rows {
            self.write_locked(encoder, row)?;
        }
        Ok(())
    }

    fn flush(&self) -> WriterResult<()> {
        let mut guard = self.encoder.lock();
        let encoder = guard.as_mut().ok_or(WriterError::Closed)?;
        self.check_fault("flushing")?;
        encoder
            .flush()
            .map_err(|e| self.record("flushing", e))?;
        self.stats.flushed();
        debug!("Flushed {}", self.path.display());
        Ok(())
    }

    fn close(&self) -> WriterResult<()> {
        let encoder = self.encoder.lock().take().ok_or(WriterError::Closed)?;
        if let Err(e) = self.check_fault("closing") {
            // Released without a final flush; the stream is already broken
            drop(encoder);
            return Err(e);
        }
        encoder
            .finish()
            .map_err(|e| self.record("closing", e))?;

        info!(
            "Closed {} ({} rows written)",
            self.path.display(),
            self.stats.snapshot().rows_written
        );
        Ok(())
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn strategy(&self) -> Strategy {
        Strategy::Locked
    }
}

impl Drop for LockedCsvWriter {
    fn drop(&mut self) {
        if let Some(encoder) = self.encoder.get_mut().take() {
            if self.fault.get_mut().is_some() {
                return;
            }
            if let Err(e) = encoder.finish() {
                warn!("Closing {} on drop failed: {}", self.path.display(), e);
            }
        }
    }
}
