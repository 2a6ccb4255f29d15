//! Durable order history.
//!
//! The whole history lives in one JSON document. A commit builds the next
//! snapshot, writes it to a temporary file, renames it over the live file and
//! only then swaps the in-memory pointer, so readers see either the old
//! snapshot or the new one and never a half-applied commit.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::domain::{Order, OrderHistory};
use crate::error::{PlaceError, Result};

pub struct HistoryStore {
    path: PathBuf,
    snapshot: RwLock<Arc<OrderHistory>>,
    /// Serializes commits; readers never take it.
    commit_lock: Mutex<()>,
}

impl HistoryStore {
    /// Load `path` if it exists, otherwise start from the seed history.
    /// The seed is not written until the first commit.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let history = match tokio::fs::read(&path).await {
            Ok(raw) => {
                let history: OrderHistory = serde_json::from_slice(&raw).map_err(|e| {
                    PlaceError::Persistence(format!(
                        "failed to parse order history {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                info!(
                    path = %path.display(),
                    orders = history.len(),
                    current = %history.current_map,
                    "Loaded order history"
                );
                history
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No order history found, using seed order");
                OrderHistory::seeded()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self::with_history(path, history))
    }

    pub fn with_history(path: impl Into<PathBuf>, history: OrderHistory) -> Self {
        Self {
            path: path.into(),
            snapshot: RwLock::new(Arc::new(history)),
            commit_lock: Mutex::new(()),
        }
    }

    /// Latest durable snapshot.
    pub async fn snapshot(&self) -> Arc<OrderHistory> {
        Arc::clone(&*self.snapshot.read().await)
    }

    /// The order agents should currently paint.
    pub async fn current(&self) -> Order {
        let snapshot = self.snapshot().await;
        snapshot.current().cloned().unwrap_or_else(Order::seed)
    }

    /// Every committed order, oldest first.
    pub async fn history(&self) -> Vec<Order> {
        self.snapshot().await.map_history.clone()
    }

    /// Append `order` and make it current. Returns once the new history is on
    /// disk; on error nothing changes.
    pub async fn commit(&self, order: Order) -> Result<Arc<OrderHistory>> {
        let _guard = self.commit_lock.lock().await;

        let next = Arc::new(self.snapshot().await.with_appended(order));
        self.persist(&next).await?;

        *self.snapshot.write().await = Arc::clone(&next);
        info!(
            file = %next.current_map,
            orders = next.len(),
            "Committed new order"
        );
        Ok(next)
    }

    async fn persist(&self, history: &OrderHistory) -> Result<()> {
        let payload = serde_json::to_vec(history)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    PlaceError::Persistence(format!("failed to create history dir: {}", e))
                })?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &payload).await.map_err(|e| {
            PlaceError::Persistence(format!("failed to write {}: {}", tmp.display(), e))
        })?;

        let file = tokio::fs::OpenOptions::new().write(true).open(&tmp).await?;
        if let Err(e) = file.sync_all().await {
            warn!("fsync of {} failed: {}", tmp.display(), e);
        }
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            PlaceError::Persistence(format!(
                "failed to move {} into place: {}",
                self.path.display(),
                e
            ))
        })?;

        debug!(path = %self.path.display(), bytes = payload.len(), "Order history persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn order(ms: i64, reason: &str) -> Order {
        let at = Utc.timestamp_millis_opt(ms).unwrap();
        Order::new(Order::file_name_for(at), reason, at)
    }

    #[tokio::test]
    async fn test_open_missing_file_uses_seed() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("data.json")).await.unwrap();

        assert_eq!(store.current().await, Order::seed());
        assert_eq!(store.history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_appends_and_moves_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("data.json")).await.unwrap();

        let first = order(1_700_000_000_000, "first");
        let second = order(1_700_000_060_000, "second");
        store.commit(first.clone()).await.unwrap();
        store.commit(second.clone()).await.unwrap();

        let history = store.history().await;
        assert_eq!(history.len(), 3);
        assert_eq!(history.last(), Some(&second));
        assert_eq!(store.current().await, second);
    }

    #[tokio::test]
    async fn test_commit_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("data.json");
        let committed = order(1_700_000_000_000, "durable");

        {
            let store = HistoryStore::open(&path).await.unwrap();
            store.commit(committed.clone()).await.unwrap();
        }

        let reopened = HistoryStore::open(&path).await.unwrap();
        assert_eq!(reopened.current().await, committed);
        assert_eq!(reopened.history().await.len(), 2);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_history_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the data file should be makes the rename fail.
        let path = dir.path().join("data.json");
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        let store = HistoryStore::with_history(&path, OrderHistory::seeded());
        let result = store.commit(order(1_700_000_000_000, "lost")).await;

        assert!(result.is_err());
        assert_eq!(store.history().await.len(), 1);
        assert_eq!(store.current().await, Order::seed());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, b"{not json").unwrap();

        assert!(matches!(
            HistoryStore::open(&path).await,
            Err(PlaceError::Persistence(_))
        ));
    }
}
