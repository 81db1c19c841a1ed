// Owning-task writer: one background thread holds the encoder, callers only
// ever hand rows to it.

use super::{Lifecycle, RowWriter, Strategy, WriterConfig};
use crate::encoder::{RowEncoder, Shape};
use crate::error::{EncodingFault, WriterError, WriterResult};
use crate::row::Row;
use crate::stats::{StatsSnapshot, WriterStats};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

type TaskResult = Result<(), Arc<EncodingFault>>;
type FaultSlot = Arc<Mutex<Option<Arc<EncodingFault>>>>;

enum Command {
    Row(Row),
    Flush(Sender<TaskResult>),
    Shutdown,
    #[cfg(test)]
    Panic,
}

pub struct CsvWriter {
    path: PathBuf,
    tx: Sender<Command>,
    lifecycle: Lifecycle,
    shape: Shape,
    fault: FaultSlot,
    stats: WriterStats,
    worker: Mutex<Option<JoinHandle<TaskResult>>>,
}

impl CsvWriter {
    pub fn open(path: impl AsRef<Path>) -> WriterResult<Self> {
        Self::open_with(path, WriterConfig::default())
    }

    pub fn open_with(path: impl AsRef<Path>, config: WriterConfig) -> WriterResult<Self> {
        let path = path.as_ref().to_path_buf();
        let encoder = RowEncoder::create(&path, &config)?;

        // Zero capacity: a send completes only once the task has taken the row
        let (tx, rx) = channel::bounded(0);
        let fault: FaultSlot = Arc::new(Mutex::new(None));
        let stats = WriterStats::new();

        let worker = {
            let fault = fault.clone();
            let stats = stats.clone();
            let label = path.display().to_string();
            thread::Builder::new()
                .name("convoy-writer".to_string())
                .spawn(move || run_task(encoder, rx, fault, stats, label))
                .map_err(|source| WriterError::Create {
                    path: path.clone(),
                    source,
                })?
        };

        info!("Opened {} (strategy: task)", path.display());

        Ok(Self {
            path,
            tx,
            lifecycle: Lifecycle::new(),
            shape: Shape::new(&config),
            fault,
            stats,
            worker: Mutex::new(Some(worker)),
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

    fn shutdown(&self) -> WriterResult<()> {
        // Fails only if the task is already gone; the join below says why
        let _ = self.tx.send(Command::Shutdown);

        let Some(handle) = self.worker.lock().take() else {
            return Err(WriterError::Closed);
        };

        match handle.join() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(fault)) => Err(WriterError::Encoding {
                context: "closing",
                source: fault,
            }),
            Err(_) => {
                error!("Writer task for {} panicked", self.path.display());
                Err(WriterError::Closed)
            }
        }
    }
}

impl RowWriter for CsvWriter {
    fn write(&self, row: Row) -> WriterResult<()> {
        if !self.lifecycle.is_open() {
            return Err(WriterError::Closed);
        }
        self.check_fault("writing a row")?;

        if let Err(fault) = self.shape.check(&row) {
            self.stats.row_rejected();
            return Err(WriterError::encoding("writing a row", fault));
        }

        // Disconnected means the task exited while we were racing close
        self.tx
            .send(Command::Row(row))
            .map_err(|_| WriterError::Closed)?;
        self.stats.row_accepted();
        Ok(())
    }

    fn flush(&self) -> WriterResult<()> {
        if !self.lifecycle.is_open() {
            return Err(WriterError::Closed);
        }
        self.check_fault("flushing")?;

        let (reply_tx, reply_rx) = channel::bounded(1);
        self.tx
            .send(Command::Flush(reply_tx))
            .map_err(|_| WriterError::Closed)?;

        match reply_rx.recv() {
            Ok(Ok(())) => {
                debug!("Flushed {}", self.path.display());
                Ok(())
            }
            Ok(Err(fault)) => Err(WriterError::Encoding {
                context: "flushing",
                source: fault,
            }),
            Err(_) => Err(WriterError::Closed),
        }
    }

    fn close(&self) -> WriterResult<()> {
        if !self.lifecycle.begin_close() {
            return Err(WriterError::Closed);
        }

        let result = self.shutdown();
        self.lifecycle.finish_close();

        let snap = self.stats.snapshot();
        info!(
            "Closed {} ({} rows written, {} flushes)",
            self.path.display(),
            snap.rows_written,
            snap.flushes
        );
        result
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn strategy(&self) -> Strategy {
        Strategy::Task
    }
}

impl Drop for CsvWriter {
    fn drop(&mut self) {
        if self.lifecycle.is_open() {
            if let Err(e) = self.close() {
                warn!("Closing {} on drop failed: {}", self.path.display(), e);
            }
        }
    }
}

fn run_task(
    mut encoder: RowEncoder,
    rx: Receiver<Command>,
    fault: FaultSlot,
    stats: WriterStats,
    label: String,
) -> TaskResult {
    debug!("Writer task started for {}", label);

    let mut failed: Option<Arc<EncodingFault>> = None;
    let record = |e: EncodingFault| {
        warn!("Writer task for {} faulted: {}", label, e);
        let e = Arc::new(e);
        *fault.lock() = Some(e.clone());
        e
    };

    while let Ok(cmd) = rx.recv() {
        match cmd {
            Command::Row(row) => {
                // Rows that arrive after a fault are dropped; the fault itself
                // is reported by every later call
                if failed.is_some() {
                    continue;
                }
                match encoder.encode(&row) {
                    Ok(()) => stats.row_written(),
                    Err(e) => failed = Some(record(e)),
                }
            }
            Command::Flush(reply) => {
                let result = match failed.clone() {
                    Some(e) => Err(e),
                    None => match encoder.flush() {
                        Ok(()) => {
                            stats.flushed();
                            Ok(())
                        }
                        Err(e) => {
                            let e = record(e);
                            failed = Some(e.clone());
                            Err(e)
                        }
                    },
                };
                let _ = reply.send(result);
            }
            Command::Shutdown => break,
            #[cfg(test)]
            Command::Panic => panic!("writer task for {} told to panic", label),
        }
    }

    // Callers still blocked on a handoff see a disconnect from here on
    drop(rx);

    let result = match failed {
        Some(e) => Err(e),
        None => encoder.finish().map_err(record),
    };
    debug!("Writer task for {} stopped", label);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tmp() -> TempDir {
        tempfile::tempdir().expect("create temp dir")
    }

    fn read_back(path: &Path) -> Vec<csv::StringRecord> {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .unwrap()
            .records()
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn single_row_flush_close() {
        let dir = tmp();
        let path = dir.path().join("one.csv");
        let row = Row::from(["A", "row", "in", "a", "CSV", "file"]);

        let w = CsvWriter::open(&path).unwrap();
        w.write(row.clone()).unwrap();
        w.flush().unwrap();
        w.close().unwrap();

        let records = read_back(&path);
        assert_eq!(records.len(), 1);
        assert_eq!(row, records[0]);
    }

    #[test]
    fn flush_makes_rows_visible_before_close() {
        let dir = tmp();
        let path = dir.path().join("flush.csv");

        let w = CsvWriter::open(&path).unwrap();
        w.write(Row::from(["x", "y"])).unwrap();
        w.flush().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "x,y\n");
        w.close().unwrap();
    }

    #[test]
    fn operations_after_close_fail() {
        let dir = tmp();
        let path = dir.path().join("closed.csv");

        let w = CsvWriter::open(&path).unwrap();
        w.write(Row::from(["kept"])).unwrap();
        w.close().unwrap();
        let before = std::fs::read(&path).unwrap();

        assert!(w.write(Row::from(["late"])).unwrap_err().is_closed());
        assert!(w.write_all(&[Row::from(["late"])]).unwrap_err().is_closed());
        assert!(w.flush().unwrap_err().is_closed());
        assert!(w.close().unwrap_err().is_closed());
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn strict_width_rejects_before_handoff() {
        let dir = tmp();
        let path = dir.path().join("strict.csv");
        let config = WriterConfig::default().with_flexible(false);

        let w = CsvWriter::open_with(&path, config).unwrap();
        w.write(Row::from(["a", "b"])).unwrap();
        let err = w.write(Row::from(["c"])).unwrap_err();
        assert!(matches!(
            err.fault(),
            Some(EncodingFault::UnequalLengths { expected: 2, found: 1 })
        ));
        // A rejected row does not poison the writer
        w.write(Row::from(["d", "e"])).unwrap();
        w.close().unwrap();

        let records = read_back(&path);
        assert_eq!(records.len(), 2);
        assert_eq!(w.stats().rows_rejected, 1);
    }

    #[test]
    fn stats_track_the_task() {
        let dir = tmp();
        let path = dir.path().join("stats.csv");

        let w = CsvWriter::open(&path).unwrap();
        for i in 0..5 {
            w.write(Row::new([i.to_string()])).unwrap();
        }
        w.flush().unwrap();
        let snap = w.stats();
        assert_eq!(snap.rows_accepted, 5);
        assert_eq!(snap.rows_written, 5);
        assert_eq!(snap.flushes, 1);
        w.close().unwrap();
    }

    #[test]
    fn drop_closes_and_flushes() {
        let dir = tmp();
        let path = dir.path().join("dropped.csv");

        {
            let w = CsvWriter::open(&path).unwrap();
            w.write(Row::from(["left", "open"])).unwrap();
        }

        assert_eq!(read_back(&path).len(), 1);
    }

    #[test]
    fn racing_closers_get_one_success() {
        let dir = tmp();
        let path = dir.path().join("race.csv");
        let w = Arc::new(CsvWriter::open(&path).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let w = w.clone();
                thread::spawn(move || w.close())
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(WriterError::is_closed));
    }

    // /dev/full accepts the open and fails every write with ENOSPC
    #[cfg(target_os = "linux")]
    #[test]
    fn stream_fault_is_sticky() {
        let w = CsvWriter::open("/dev/full").unwrap();

        // Accepted by the task; the fault only shows once bytes hit the device
        w.write(Row::from(["A", "row", "in", "a", "CSV", "file"])).unwrap();

        let err = w.flush().unwrap_err();
        assert!(err.is_encoding(), "{err}");
        assert!(matches!(err.fault(), Some(EncodingFault::Csv(_)) | Some(EncodingFault::Io(_))));

        assert!(w.write(Row::from(["again"])).unwrap_err().is_encoding());
        assert!(w.write_all(&[Row::from(["batch"])]).unwrap_err().is_encoding());
        assert!(w.flush().unwrap_err().is_encoding());

        assert!(w.close().unwrap_err().is_encoding());
        assert!(w.worker.lock().is_none(), "task should have been joined");
        assert!(w.close().unwrap_err().is_closed());
        assert!(w.write(Row::from(["late"])).unwrap_err().is_closed());
    }

    #[test]
    fn panicked_task_reports_closed() {
        let dir = tmp();
        let path = dir.path().join("panic.csv");
        let w = Arc::new(CsvWriter::open(&path).unwrap());
        w.write(Row::from(["before"])).unwrap();

        // Returns once the task has taken the command, so it is now unwinding
        assert!(w.tx.send(Command::Panic).is_ok());

        // Writers blocked on the handoff are released when the receiver goes
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let w = w.clone();
                thread::spawn(move || w.write(Row::from(["after"])))
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap().unwrap_err().is_closed());
        }

        assert!(w.flush().unwrap_err().is_closed());
        assert!(w.close().unwrap_err().is_closed());
        assert!(w.worker.lock().is_none());
        assert!(w.close().unwrap_err().is_closed());
    }
}
