// ABOUTME: SQLite-backed transaction log: one table, engine-assigned sequences.
// ABOUTME: The table is created lazily on first open; replay is a single ordered query.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use kvd_core::{Event, EventType, PendingEvent};

use async_trait::async_trait;
use rusqlite::{Connection, params};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::TransactionLogError;
use crate::pending::PendingWrites;
use crate::{TransactionLog, WRITE_QUEUE_CAPACITY};

const CREATE_TABLE: &str = "CREATE TABLE transactions (
    sequence   INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type INTEGER NOT NULL,
    key        TEXT NOT NULL,
    value      TEXT NOT NULL
)";

/// SQLite-backed transaction log. The storage engine assigns sequence
/// numbers through AUTOINCREMENT, which never reuses a rowid, so writes
/// need no sequence bookkeeping of their own.
pub struct SqliteTransactionLog {
    path: PathBuf,
    /// Held until `run`, then moved into the writer task, which owns it
    /// exclusively from that point on. Wrapped in a `Mutex` so the log is
    /// `Sync` (a bare `Connection` is `Send` but not `Sync`).
    conn: Mutex<Option<Connection>>,
    /// Tracked during replay as a defensive check; writes rely on the
    /// engine's ordering instead.
    last_sequence: Arc<AtomicU64>,
    pending: Arc<PendingWrites>,
    events_tx: Option<mpsc::Sender<PendingEvent>>,
    error_rx: Mutex<Option<oneshot::Receiver<TransactionLogError>>>,
    writer: Option<JoinHandle<()>>,
}

impl SqliteTransactionLog {
    /// Open the database, creating the transactions table if this is the
    /// first time a log runs against it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TransactionLogError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;

        if !table_exists(&conn)? {
            conn.execute(CREATE_TABLE, [])?;
        }

        Ok(Self {
            path,
            conn: Mutex::new(Some(conn)),
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
            self.pending.done();
            return Err(TransactionLogError::WriterStopped);
        }
        Ok(())
    }
}

/// Probe the catalog for the transactions table. Zero rows means the
/// table has never been created; any other probe failure is fatal.
fn table_exists(conn: &Connection) -> Result<bool, TransactionLogError> {
    let probe = conn.query_row(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'transactions'",
        [],
        |row| row.get::<_, String>(0),
    );
    match probe {
        Ok(_) => Ok(true),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

#[async_trait]
impl TransactionLog for SqliteTransactionLog {
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
            scan_table(&path, &last_sequence, &event_tx, error_tx);
        });

        (event_rx, error_rx)
    }

    fn run(&mut self) -> Result<(), TransactionLogError> {
        if self.events_tx.is_some() {
            return Err(TransactionLogError::AlreadyRunning);
        }
        let Some(conn) = self.conn.lock().expect("conn mutex poisoned").take() else {
            return Err(TransactionLogError::AlreadyRunning);
        };

        let (events_tx, events_rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        let (error_tx, error_rx) = oneshot::channel();
        self.events_tx = Some(events_tx);
        if let Ok(mut slot) = self.error_rx.lock() {
            *slot = Some(error_rx);
        }

        self.writer = Some(tokio::spawn(write_loop(
            conn,
            events_rx,
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
        self.events_tx = None;
        if let Some(writer) = self.writer.take() {
            let _ = writer.await;
        }
        Ok(())
    }
}

/// The single writer task. Each dequeued event becomes one inserted row;
/// the engine assigns the sequence. The barrier slot is released only
/// after the insert completes, so `wait` guarantees persisted writes.
async fn write_loop(
    conn: Connection,
    mut events: mpsc::Receiver<PendingEvent>,
    pending: Arc<PendingWrites>,
    error_tx: oneshot::Sender<TransactionLogError>,
) {
    while let Some(event) = events.recv().await {
        match insert_event(&conn, &event) {
            Ok(()) => pending.done(),
            Err(err) => {
                tracing::error!("transaction log insert failed: {err}");
                pending.done();
                let _ = error_tx.send(err);
                events.close();
                while events.recv().await.is_some() {
                    pending.done();
                }
                return;
            }
        }
    }
}

fn insert_event(conn: &Connection, event: &PendingEvent) -> Result<(), TransactionLogError> {
    conn.execute(
        "INSERT INTO transactions (event_type, key, value) VALUES (?1, ?2, ?3)",
        params![event.event_type.code(), event.key, event.value],
    )?;
    Ok(())
}

/// Stream the table in sequence order. Monotonicity is guaranteed by the
/// ordered query over a primary key, but replay still validates it as a
/// defensive check against a tampered table.
fn scan_table(
    path: &Path,
    last_sequence: &AtomicU64,
    events: &mpsc::Sender<Event>,
    error_tx: oneshot::Sender<TransactionLogError>,
) {
    let result = (|| -> Result<(), TransactionLogError> {
        let conn = Connection::open(path)?;
        let mut stmt = conn.prepare(
            "SELECT sequence, event_type, key, value FROM transactions ORDER BY sequence",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, u64>(0)?,
                row.get::<_, u8>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        for row in rows {
            let (sequence, code, key, value) = row?;
            let event_type =
                EventType::from_code(code).ok_or(TransactionLogError::UnknownEventType(code))?;

            let last = last_sequence.load(Ordering::Acquire);
            if sequence <= last {
                return Err(TransactionLogError::OutOfSequence {
                    last,
                    current: sequence,
                });
            }
            last_sequence.store(sequence, Ordering::Release);

            let event = Event {
                sequence,
                event_type,
                key,
                value,
            };
            if events.blocking_send(event).is_err() {
                // Consumer hung up mid-replay.
                return Ok(());
            }
        }
        Ok(())
    })();

    if let Err(err) = result {
        let _ = error_tx.send(err);
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn db_path(dir: &TempDir) -> PathBuf {
        dir.path().join("transactions.db")
    }

    async fn drain(
        mut events: mpsc::Receiver<Event>,
        errors: oneshot::Receiver<TransactionLogError>,
    ) -> (Vec<Event>, Option<TransactionLogError>) {
        let mut collected = Vec::new();
        while let Some(event) = events.recv().await {
            collected.push(event);
        }
        (collected, errors.await.ok())
    }

    fn count_transaction_tables(path: &Path) -> i64 {
        let conn = Connection::open(path).unwrap();
        conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = 'transactions'",
            [],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn open_bootstraps_the_table_exactly_once() {
        let dir = TempDir::new().unwrap();
        let path = db_path(&dir);

        let first = SqliteTransactionLog::open(&path).unwrap();
        assert_eq!(count_transaction_tables(&path), 1);
        drop(first);

        // A second open against the same database succeeds without
        // recreating anything.
        let _second = SqliteTransactionLog::open(&path).unwrap();
        assert_eq!(count_transaction_tables(&path), 1);
    }

    #[tokio::test]
    async fn writes_insert_rows_with_engine_assigned_sequences() {
        let dir = TempDir::new().unwrap();
        let path = db_path(&dir);

        let mut log = SqliteTransactionLog::open(&path).unwrap();
        log.run().unwrap();
        log.write_put("a", "1").await.unwrap();
        log.write_put("a", "2").await.unwrap();
        log.write_delete("a").await.unwrap();
        log.wait().await;
        log.close().await.unwrap();

        let conn = Connection::open(&path).unwrap();
        let rows: Vec<(u64, u8, String, String)> = conn
            .prepare("SELECT sequence, event_type, key, value FROM transactions ORDER BY sequence")
            .unwrap()
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(
            rows,
            vec![
                (1, 2, "a".to_string(), "1".to_string()),
                (2, 2, "a".to_string(), "2".to_string()),
                (3, 1, "a".to_string(), String::new()),
            ]
        );
    }

    #[tokio::test]
    async fn round_trip_replays_events_in_order() {
        let dir = TempDir::new().unwrap();
        let path = db_path(&dir);

        let mut log = SqliteTransactionLog::open(&path).unwrap();
        log.run().unwrap();
        log.write_put("tab\tkey", "line\nbreak").await.unwrap();
        log.write_delete("tab\tkey").await.unwrap();
        log.close().await.unwrap();

        let mut reopened = SqliteTransactionLog::open(&path).unwrap();
        let (events, error) = {
            let (events, errors) = reopened.read_events();
            drain(events, errors).await
        };

        assert!(error.is_none(), "unexpected replay error: {error:?}");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 1);
        assert_eq!(events[0].event_type, EventType::Put);
        assert_eq!(events[0].key, "tab\tkey");
        assert_eq!(events[0].value, "line\nbreak");
        assert_eq!(events[1].sequence, 2);
        assert_eq!(events[1].event_type, EventType::Delete);
        assert_eq!(reopened.last_sequence(), 2);
    }

    #[tokio::test]
    async fn wait_guarantees_rows_are_persisted() {
        let dir = TempDir::new().unwrap();
        let path = db_path(&dir);

        let mut log = SqliteTransactionLog::open(&path).unwrap();
        log.run().unwrap();
        for i in 0..5 {
            log.write_put(&format!("key-{i}"), "v").await.unwrap();
        }
        log.wait().await;

        // Rows are visible to an independent connection as soon as wait
        // returns, before any close.
        let conn = Connection::open(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT count(*) FROM transactions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 5);
    }

    #[tokio::test]
    async fn reserved_event_type_in_table_aborts_replay() {
        let dir = TempDir::new().unwrap();
        let path = db_path(&dir);

        {
            let conn = Connection::open(&path).unwrap();
            conn.execute(CREATE_TABLE, []).unwrap();
            conn.execute(
                "INSERT INTO transactions (event_type, key, value) VALUES (0, 'a', '1')",
                [],
            )
            .unwrap();
        }

        let mut log = SqliteTransactionLog::open(&path).unwrap();
        let (events, errors) = log.read_events();
        let (replayed, error) = drain(events, errors).await;

        assert!(replayed.is_empty());
        assert!(matches!(error, Some(TransactionLogError::UnknownEventType(0))));
    }

    #[tokio::test]
    async fn write_before_run_is_rejected() {
        let dir = TempDir::new().unwrap();
        let log = SqliteTransactionLog::open(db_path(&dir)).unwrap();
        let err = log.write_put("a", "1").await.expect_err("no writer yet");
        assert!(matches!(err, TransactionLogError::NotRunning));
    }

    #[tokio::test]
    async fn run_twice_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut log = SqliteTransactionLog::open(db_path(&dir)).unwrap();
        log.run().unwrap();
        let err = log.run().expect_err("second run");
        assert!(matches!(err, TransactionLogError::AlreadyRunning));
    }
}
