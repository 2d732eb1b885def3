// ABOUTME: Startup replay: drains persisted events into the in-memory store.
// ABOUTME: Runs once per process, strictly before the log's writer task starts.

use kvd_core::KeyValueStore;

use crate::TransactionLog;
use crate::error::TransactionLogError;

/// Drain `read_events` into the store, applying each mutation without
/// emitting new log records. Returns the number of events applied.
///
/// Replay is all-or-nothing: any parse, decode, ordering, or I/O failure
/// aborts with that error and the process should not serve traffic.
/// Must complete before `TransactionLog::run` is called.
pub async fn replay_into_store(
    log: &mut dyn TransactionLog,
    store: &KeyValueStore,
) -> Result<u64, TransactionLogError> {
    let (mut events, error_rx) = log.read_events();
    let mut applied: u64 = 0;

    while let Some(event) = events.recv().await {
        store.apply(&event).await;
        applied += 1;
    }

    // The event stream has closed: either the scan finished or it aborted
    // with the single error below.
    match error_rx.await {
        Ok(err) => Err(err),
        Err(_) => {
            tracing::info!("replayed {applied} events from the transaction log");
            Ok(applied)
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::file::FileTransactionLog;

    use super::*;

    #[tokio::test]
    async fn replay_reconstructs_store_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("transactions.log");

        let mut log = FileTransactionLog::open(&path).unwrap();
        log.run().unwrap();
        log.write_put("a", "1").await.unwrap();
        log.write_put("b", "2").await.unwrap();
        log.write_put("a", "updated").await.unwrap();
        log.write_delete("b").await.unwrap();
        log.close().await.unwrap();

        let mut reopened = FileTransactionLog::open(&path).unwrap();
        let store = KeyValueStore::new();
        let applied = replay_into_store(&mut reopened, &store).await.unwrap();

        assert_eq!(applied, 4);
        assert_eq!(store.get("a").await.as_deref(), Some("updated"));
        assert_eq!(store.get("b").await, None);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn deleted_key_stays_deleted_after_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("transactions.log");

        let mut log = FileTransactionLog::open(&path).unwrap();
        log.run().unwrap();
        log.write_put("a", "1").await.unwrap();
        log.write_put("a", "2").await.unwrap();
        log.write_delete("a").await.unwrap();
        log.wait().await;
        log.close().await.unwrap();

        let mut reopened = FileTransactionLog::open(&path).unwrap();
        let store = KeyValueStore::new();
        let applied = replay_into_store(&mut reopened, &store).await.unwrap();

        assert_eq!(applied, 3);
        assert_eq!(store.get("a").await, None);
        assert_eq!(reopened.last_sequence(), 3);
    }

    #[tokio::test]
    async fn corrupt_log_fails_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("transactions.log");
        std::fs::write(&path, "1\t2\ta\t1\ngarbage line\n").unwrap();

        let mut log = FileTransactionLog::open(&path).unwrap();
        let store = KeyValueStore::new();
        let err = replay_into_store(&mut log, &store)
            .await
            .expect_err("replay must abort");
        assert!(matches!(err, TransactionLogError::MalformedRecord { .. }));
    }

    #[tokio::test]
    async fn empty_log_replays_zero_events() {
        let dir = TempDir::new().unwrap();
        let mut log = FileTransactionLog::open(dir.path().join("transactions.log")).unwrap();
        let store = KeyValueStore::new();
        let applied = replay_into_store(&mut log, &store).await.unwrap();
        assert_eq!(applied, 0);
        assert!(store.is_empty().await);
    }
}
