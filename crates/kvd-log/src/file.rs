// ABOUTME: File-backed transaction log: append-only text records, one writer task.
// ABOUTME: Replay scans the file line by line, validating sequence monotonicity.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use kvd_core::{Event, PendingEvent};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::TransactionLogError;
use crate::pending::PendingWrites;
use crate::{TransactionLog, WRITE_QUEUE_CAPACITY, codec};

/// Append-only file-backed transaction log. One text record per event;
/// see the codec module for the line format.
pub struct FileTransactionLog {
    path: PathBuf,
    /// Held until `run`, then moved into the writer task, which owns it
    /// exclusively from that point on.
    file: Option<File>,
    last_sequence: Arc<AtomicU64>,
    pending: Arc<PendingWrites>,
    events_tx: Option<mpsc::Sender<PendingEvent>>,
    error_rx: Mutex<Option<oneshot::Receiver<TransactionLogError>>>,
    writer: Option<JoinHandle<()>>,
}

impl FileTransactionLog {
    /// Open (or create) the log file in append mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TransactionLogError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        Ok(Self {
            path,
            file: Some(file),
            last_sequence: Arc::new(AtomicU64::new(0)),
            pending: Arc::new(PendingWrites::new()),
            events_tx: None,
            error_rx: Mutex::new(None),
            writer: None,
        })
    }

    async fn enqueue(&self, event: PendingEvent) -> Result<(), TransactionLogError> {
        let Some(events_tx) = &self.events_tx else {
            return Err(TransactionLogError::NotRunning);
        };

        self.pending.add();
        if events_tx.send(event).await.is_err() {
            // The writer dropped its receiver after a fatal error.
            self.pending.done();
            return Err(TransactionLogError::WriterStopped);
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionLog for FileTransactionLog {
    async fn write_put(&self, key: &str, value: &str) -> Result<(), TransactionLogError> {
        self.enqueue(PendingEvent::put(key, value)).await
    }

    async fn write_delete(&self, key: &str) -> Result<(), TransactionLogError> {
        self.enqueue(PendingEvent::delete(key)).await
    }

    fn err(&self) -> Option<oneshot::Receiver<TransactionLogError>> {
        self.error_rx.lock().ok().and_then(|mut slot| slot.take())
    }

    fn read_events(
        &mut self,
    ) -> (mpsc::Receiver<Event>, oneshot::Receiver<TransactionLogError>) {
        let (event_tx, event_rx) = mpsc::channel(1);
        let (error_tx, error_rx) = oneshot::channel();
        let path = self.path.clone();
        let last_sequence = Arc::clone(&self.last_sequence);

        tokio::task::spawn_blocking(move || {
            scan_file(&path, &last_sequence, &event_tx, error_tx);
        });

        (event_rx, error_rx)
    }

    fn run(&mut self) -> Result<(), TransactionLogError> {
        if self.events_tx.is_some() {
            return Err(TransactionLogError::AlreadyRunning);
        }
        let Some(file) = self.file.take() else {
            return Err(TransactionLogError::AlreadyRunning);
        };

        let (events_tx, events_rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        let (error_tx, error_rx) = oneshot::channel();
        self.events_tx = Some(events_tx);
        if let Ok(mut slot) = self.error_rx.lock() {
            *slot = Some(error_rx);
        }

        self.writer = Some(tokio::spawn(write_loop(
            file,
            events_rx,
            Arc::clone(&self.last_sequence),
            Arc::clone(&self.pending),
            error_tx,
        )));
        Ok(())
    }

    fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::Acquire)
    }

    async fn wait(&self) {
        self.pending.wait().await;
    }

    async fn close(&mut self) -> Result<(), TransactionLogError> {
        self.pending.wait().await;
        // Dropping the sender closes the queue; the writer exits once it
        // has drained.
        self.events_tx = None;
        if let Some(writer) = self.writer.take() {
            let _ = writer.await;
        }
        Ok(())
    }
}

/// The single writer task. Dequeues one event at a time, assigns the next
/// sequence number, appends the encoded record, and syncs before releasing
/// the barrier slot. A write failure stops the task permanently.
async fn write_loop(
    mut file: File,
    mut events: mpsc::Receiver<PendingEvent>,
    last_sequence: Arc<AtomicU64>,
    pending: Arc<PendingWrites>,
    error_tx: oneshot::Sender<TransactionLogError>,
) {
    while let Some(event) = events.recv().await {
        let sequence = last_sequence.load(Ordering::Acquire) + 1;
        let line = codec::encode_line(&event.into_event(sequence));

        match append_record(&mut file, &line) {
            Ok(()) => {
                last_sequence.store(sequence, Ordering::Release);
                pending.done();
            }
            Err(err) => {
                tracing::error!("transaction log append failed: {err}");
                pending.done();
                let _ = error_tx.send(err);
                // Fail-stop: reject everything not yet enqueued and
                // discard what is, releasing barrier slots so wait()
                // cannot strand callers.
                events.close();
                while events.recv().await.is_some() {
                    pending.done();
                }
                return;
            }
        }
    }
}

fn append_record(file: &mut File, line: &str) -> Result<(), TransactionLogError> {
    file.write_all(line.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

/// Scan the log file from the beginning, emitting events in file order
/// and validating that sequence numbers strictly increase. Runs on the
/// blocking pool; the consumer paces it through the bounded channel.
fn scan_file(
    path: &Path,
    last_sequence: &AtomicU64,
    events: &mpsc::Sender<Event>,
    error_tx: oneshot::Sender<TransactionLogError>,
) {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            let _ = error_tx.send(err.into());
            return;
        }
    };

    let reader = BufReader::new(file);
    for (index, line) in reader.lines().enumerate() {
        let line_no = index as u64 + 1;
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                let _ = error_tx.send(TransactionLogError::Io(err));
                return;
            }
        };

        let event = match codec::parse_line(&line, line_no) {
            Ok(event) => event,
            Err(err) => {
                let _ = error_tx.send(err);
                return;
            }
        };

        let last = last_sequence.load(Ordering::Acquire);
        if event.sequence <= last {
            let _ = error_tx.send(TransactionLogError::OutOfSequence {
                last,
                current: event.sequence,
            });
            return;
        }
        last_sequence.store(event.sequence, Ordering::Release);

        if events.blocking_send(event).is_err() {
            // Consumer hung up mid-replay; nothing left to report to.
            return;
        }
    }
}
