// ABOUTME: Shared error taxonomy for the transaction log crate.
// ABOUTME: Covers open/initialization, replay corruption, write-path, and misuse errors.

use thiserror::Error;

/// Errors surfaced by either transaction log backend.
///
/// Replay errors are fatal to replay: they arrive exactly once on the
/// error stream and the event stream closes behind them. Write-path
/// errors arrive once via `err()` and stop the writer permanently. There
/// is no automatic retry anywhere in this crate.
#[derive(Debug, Error)]
pub enum TransactionLogError {
    /// Opening, appending to, or scanning the backing file failed.
    #[error("transaction log io error: {0}")]
    Io(#[from] std::io::Error),

    /// The SQLite backend failed at the connection or statement level.
    #[error("transaction log sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A persisted record could not be parsed back into an event.
    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    /// A persisted event type code was 0 (reserved) or unknown.
    #[error("unknown event type code {0}")]
    UnknownEventType(u8),

    /// Replay observed a sequence number that did not strictly increase.
    #[error("transaction numbers out of sequence: {current} after {last}")]
    OutOfSequence { last: u64, current: u64 },

    /// A write was issued before `run` started the writer task.
    #[error("transaction log writer is not running")]
    NotRunning,

    /// `run` was called a second time on the same log instance.
    #[error("transaction log writer is already running")]
    AlreadyRunning,

    /// The writer task halted after a fatal error; new writes are rejected.
    #[error("transaction log writer has stopped")]
    WriterStopped,
}
