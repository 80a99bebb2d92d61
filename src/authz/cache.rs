use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use sqlx::{Row, SqlitePool};

use super::role::{CapabilityTable, Capability, Role};

/// Injectable time source so TTL behavior is testable without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct CachedTable {
    table: Arc<CapabilityTable>,
    loaded_at: Instant,
}

/// Process-wide cache over the role_permissions store. Reads within the TTL
/// may be stale; every write path must call `invalidate()`.
pub struct RolePermissionCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    inner: RwLock<Option<CachedTable>>,
}

impl RolePermissionCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            inner: RwLock::new(None),
        }
    }

    pub fn with_system_clock(ttl: Duration) -> Self {
        Self::new(ttl, Arc::new(SystemClock))
    }

    /// Current capability table, loading from the store when the cached copy
    /// is missing or expired. A store failure falls back to the hard-coded
    /// defaults rather than propagating.
    pub async fn table(&self, pool: &SqlitePool) -> Arc<CapabilityTable> {
        if let Some(table) = self.fresh() {
            return table;
        }

        let table = Arc::new(load_table(pool).await);

        let mut guard = self.inner.write().expect("role cache lock poisoned");
        *guard = Some(CachedTable {
            table: Arc::clone(&table),
            loaded_at: self.clock.now(),
        });

        table
    }

    /// Drop the cached table so the next read reloads from the store. Called
    /// after every role_permissions write.
    pub fn invalidate(&self) {
        let mut guard = self.inner.write().expect("role cache lock poisoned");
        *guard = None;
    }

    fn fresh(&self) -> Option<Arc<CapabilityTable>> {
        let guard = self.inner.read().expect("role cache lock poisoned");
        let cached = guard.as_ref()?;
        if self.clock.now().duration_since(cached.loaded_at) < self.ttl {
            Some(Arc::clone(&cached.table))
        } else {
            None
        }
    }
}

async fn load_table(pool: &SqlitePool) -> CapabilityTable {
    let rows = sqlx::query("SELECT role, capability, enabled FROM role_permissions")
        .fetch_all(pool)
        .await;

    match rows {
        Ok(rows) => {
            let parsed = rows.iter().filter_map(|row| {
                let role = Role::from_str(row.get::<&str, _>("role")).ok()?;
                let capability = Capability::from_str(row.get::<&str, _>("capability")).ok()?;
                let enabled: bool = row.get("enabled");
                Some((role, capability, enabled))
            });
            CapabilityTable::from_rows(parsed)
        }
        Err(err) => {
            tracing::warn!(error = %err, "role_permissions unavailable, using default capability table");
            CapabilityTable::from_defaults()
        }
    }
}
