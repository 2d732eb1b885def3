// ABOUTME: Write-ahead transaction log for kvd: the facade trait and both backends.
// ABOUTME: File and SQLite logs share one contract; callers pick a backend at startup.

pub mod codec;
pub mod error;
pub mod file;
pub mod pending;
pub mod replay;
pub mod sqlite;

pub use error::TransactionLogError;
pub use file::FileTransactionLog;
pub use pending::PendingWrites;
pub use replay::replay_into_store;
pub use sqlite::SqliteTransactionLog;

use async_trait::async_trait;
use kvd_core::Event;
use tokio::sync::{mpsc, oneshot};

/// Capacity of the bounded queue between producers and the writer task.
/// A full queue suspends producers until the writer drains a slot; this is
/// the only synchronization point between them.
pub const WRITE_QUEUE_CAPACITY: usize = 16;

/// The capability set the request layer and startup replay depend on,
/// independent of which medium backs the log.
///
/// Lifecycle contract: `read_events` (at most once) strictly before
/// `run` (exactly once); writes only after `run`. Once running, the
/// writer task owns the backing medium exclusively.
#[async_trait]
pub trait TransactionLog: Send + Sync {
    /// Enqueue a Put mutation. Suspends while the write queue is full.
    /// The sequence number is assigned later, by the writer task.
    async fn write_put(&self, key: &str, value: &str) -> Result<(), TransactionLogError>;

    /// Enqueue a Delete mutation. Suspends while the write queue is full.
    async fn write_delete(&self, key: &str) -> Result<(), TransactionLogError>;

    /// Take the receiver for the writer task's single fatal error.
    /// Yields Some on the first call after `run`, None afterwards. A
    /// receiver that resolves without a value means the writer exited
    /// cleanly; at most one error is ever delivered.
    fn err(&self) -> Option<oneshot::Receiver<TransactionLogError>>;

    /// Stream every persisted event in ascending sequence order for
    /// one-time startup replay. The event stream terminates normally when
    /// storage is exhausted, or closes after exactly one error arrives on
    /// the second channel.
    fn read_events(
        &mut self,
    ) -> (mpsc::Receiver<Event>, oneshot::Receiver<TransactionLogError>);

    /// Start the single background writer task.
    fn run(&mut self) -> Result<(), TransactionLogError>;

    /// Highest sequence number this log has written or accepted during
    /// replay. Seeds the next assigned sequence on write.
    fn last_sequence(&self) -> u64;

    /// Suspend until every previously accepted write is durable.
    async fn wait(&self);

    /// Drain outstanding writes, stop the writer task, and release the
    /// backing medium.
    async fn close(&mut self) -> Result<(), TransactionLogError>;
}
