//! Connected agent registry and liveness aggregation.
//!
//! All connection state sits behind one `RwLock`. Writers (connect, brand,
//! placement telemetry, disconnect) hold it only for the single-entry update;
//! the liveness tick holds the read side only while iterating to build a
//! snapshot. No guard is ever held across socket I/O, so a reader never sees a
//! connection's brand and activity time from two different updates.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::coordination::ShutdownListener;
use crate::protocol::UNKNOWN_BRAND;

/// Default trailing window in which an agent counts as active
pub const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(11 * 60);

/// Default aggregation period
pub const DEFAULT_LIVENESS_TICK: Duration = Duration::from_secs(1);

pub type ConnectionId = u64;

/// One live socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConnection {
    pub id: ConnectionId,
    pub brand: String,
    pub last_activity_at: DateTime<Utc>,
}

impl AgentConnection {
    pub fn is_identified(&self) -> bool {
        self.brand != UNKNOWN_BRAND
    }

    fn is_active(&self, threshold: DateTime<Utc>) -> bool {
        self.last_activity_at >= threshold
    }
}

/// Derived view of recent activity. Recomputed from the registry every tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessSnapshot {
    /// Active connections that announced a brand
    pub connection_count: usize,
    /// Active connections per brand, `unknown` included
    pub brand_usage: BTreeMap<String, usize>,
    #[serde(skip)]
    pub computed_at: Option<DateTime<Utc>>,
}

/// Aggregate a set of connections at `now`.
pub fn aggregate_liveness<'a>(
    connections: impl IntoIterator<Item = &'a AgentConnection>,
    now: DateTime<Utc>,
    window: chrono::Duration,
) -> LivenessSnapshot {
    let threshold = now - window;
    let mut snapshot = LivenessSnapshot {
        computed_at: Some(now),
        ..Default::default()
    };

    for conn in connections.into_iter().filter(|c| c.is_active(threshold)) {
        if conn.is_identified() {
            snapshot.connection_count += 1;
        }
        *snapshot.brand_usage.entry(conn.brand.clone()).or_insert(0) += 1;
    }

    snapshot
}

pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, AgentConnection>>,
    next_id: AtomicU64,
    window: chrono::Duration,
    liveness: RwLock<LivenessSnapshot>,
}

impl ConnectionRegistry {
    pub fn new(window: Duration) -> Self {
        let window = chrono::Duration::from_std(window)
            .unwrap_or_else(|_| chrono::Duration::minutes(11));
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            window,
            liveness: RwLock::new(LivenessSnapshot::default()),
        }
    }

    /// Add a connection. It starts unbranded and one full window in the past,
    /// so it is not counted until it reports a placement.
    pub async fn register(&self, now: DateTime<Utc>) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let conn = AgentConnection {
            id,
            brand: UNKNOWN_BRAND.to_string(),
            last_activity_at: now - self.window,
        };
        self.connections.write().await.insert(id, conn);
        id
    }

    pub async fn unregister(&self, id: ConnectionId) -> Option<AgentConnection> {
        self.connections.write().await.remove(&id)
    }

    /// Set the brand of a connection. Returns `false` for unknown ids.
    pub async fn set_brand(&self, id: ConnectionId, brand: &str) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get_mut(&id) {
            Some(conn) => {
                conn.brand = brand.to_string();
                true
            }
            None => false,
        }
    }

    /// Mark a connection active at `now`.
    pub async fn touch(&self, id: ConnectionId, now: DateTime<Utc>) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get_mut(&id) {
            Some(conn) => {
                conn.last_activity_at = now;
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, id: ConnectionId) -> Option<AgentConnection> {
        self.connections.read().await.get(&id).cloned()
    }

    /// Number of open sockets, active or not.
    pub async fn raw_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Aggregate the registry as it is right now.
    pub async fn compute_liveness(&self, now: DateTime<Utc>) -> LivenessSnapshot {
        let connections = self.connections.read().await;
        aggregate_liveness(connections.values(), now, self.window)
    }

    /// Recompute and publish the snapshot served by the stats endpoint.
    pub async fn refresh_liveness(&self, now: DateTime<Utc>) -> LivenessSnapshot {
        let snapshot = self.compute_liveness(now).await;
        *self.liveness.write().await = snapshot.clone();
        snapshot
    }

    /// Snapshot from the most recent tick.
    pub async fn liveness(&self) -> LivenessSnapshot {
        self.liveness.read().await.clone()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_LIVENESS_WINDOW)
    }
}

/// Recompute liveness every `tick` until shutdown.
pub fn spawn_liveness_task(
    registry: Arc<ConnectionRegistry>,
    tick: Duration,
    mut shutdown: ShutdownListener,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Liveness aggregation running every {:?}", tick);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let snapshot = registry.refresh_liveness(Utc::now()).await;
                    debug!(
                        active = snapshot.connection_count,
                        brands = snapshot.brand_usage.len(),
                        "Liveness tick"
                    );
                }
                _ = shutdown.wait() => {
                    info!("Liveness aggregation stopped");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn conn(id: u64, brand: &str, last: DateTime<Utc>) -> AgentConnection {
        AgentConnection {
            id,
            brand: brand.to_string(),
            last_activity_at: last,
        }
    }

    #[test]
    fn test_aggregate_counts_branded_active_connections() {
        let now = at(3600);
        let window = chrono::Duration::minutes(11);
        let conns = vec![
            conn(0, "userscriptV19", now),
            conn(1, "userscriptV19", now - chrono::Duration::minutes(10)),
            conn(2, "rust", now - window),
            conn(3, "unknown", now),
            conn(4, "rust", now - window - chrono::Duration::seconds(1)),
        ];

        let snapshot = aggregate_liveness(&conns, now, window);
        assert_eq!(snapshot.connection_count, 3);
        assert_eq!(snapshot.brand_usage.get("userscriptV19"), Some(&2));
        assert_eq!(snapshot.brand_usage.get("rust"), Some(&1));
        // Unknown brands are excluded from the count but not from usage.
        assert_eq!(snapshot.brand_usage.get("unknown"), Some(&1));
    }

    #[tokio::test]
    async fn test_new_connection_starts_outside_window() {
        let registry = ConnectionRegistry::default();
        let id = registry.register(at(0)).await;
        registry.set_brand(id, "rust").await;

        assert_eq!(registry.compute_liveness(at(1)).await.connection_count, 0);
        assert_eq!(registry.raw_count().await, 1);

        registry.touch(id, at(2)).await;
        assert_eq!(registry.compute_liveness(at(3)).await.connection_count, 1);
    }

    #[tokio::test]
    async fn test_activity_expires_after_window() {
        let registry = ConnectionRegistry::default();
        let id = registry.register(at(0)).await;
        registry.set_brand(id, "rust").await;
        registry.touch(id, at(0)).await;

        assert_eq!(registry.compute_liveness(at(660)).await.connection_count, 1);
        assert_eq!(registry.compute_liveness(at(661)).await.connection_count, 0);
    }

    #[tokio::test]
    async fn test_unregistered_connection_leaves_next_snapshot() {
        let registry = ConnectionRegistry::default();
        let a = registry.register(at(0)).await;
        let b = registry.register(at(0)).await;
        for id in [a, b] {
            registry.set_brand(id, "rust").await;
            registry.touch(id, at(1)).await;
        }
        assert_eq!(registry.refresh_liveness(at(2)).await.connection_count, 2);

        registry.unregister(a).await;
        let snapshot = registry.refresh_liveness(at(3)).await;
        assert_eq!(snapshot.connection_count, 1);
        assert_eq!(registry.liveness().await, snapshot);
        assert_eq!(registry.raw_count().await, 1);
    }

    #[tokio::test]
    async fn test_updates_on_missing_ids_are_noops() {
        let registry = ConnectionRegistry::default();
        assert!(!registry.set_brand(42, "rust").await);
        assert!(!registry.touch(42, at(0)).await);
        assert!(registry.get(42).await.is_none());
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let registry = ConnectionRegistry::default();
        let a = registry.register(at(0)).await;
        let b = registry.register(at(0)).await;
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_liveness_task_publishes_snapshots() {
        let registry = Arc::new(ConnectionRegistry::default());
        let id = registry.register(Utc::now()).await;
        registry.set_brand(id, "rust").await;
        registry.touch(id, Utc::now()).await;

        let shutdown = crate::coordination::Shutdown::new();
        let handle = spawn_liveness_task(
            Arc::clone(&registry),
            Duration::from_millis(10),
            shutdown.listener(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(registry.liveness().await.connection_count, 1);

        shutdown.request_shutdown(crate::coordination::ShutdownSignal::Requested);
        handle.await.unwrap();
    }
}
