//! The tenant-placement database contract (spec §4.5(a), §6) and a
//! `sqlx`-backed MySQL implementation. Values are always bound
//! parameters, never string-interpolated — this is how "values MUST be
//! safely quoted" (spec §6) is satisfied without hand-rolled escaping.

use async_trait::async_trait;
use sonny_core::{Result, SonnyError};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySqlPool, Row};

/// One connection to the tenant-placement database. The update statement
/// rewrites both `host` and `node` columns of tenant rows keyed by tenant
/// UUID, all rows in one transaction, committed once.
#[async_trait]
pub trait PlacementDb: Send + Sync {
    /// Move every tenant UUID in `tenant_ids` onto `spare_host` (both the
    /// `host` and `node` columns), in a single transaction.
    async fn move_tenants(&self, tenant_ids: &[String], spare_host: &str) -> Result<()>;

    /// The host currently recorded for a tenant, if any row exists.
    async fn current_host(&self, tenant_id: &str) -> Result<Option<String>>;
}

pub struct MySqlPlacementDb {
    pool: MySqlPool,
}

impl MySqlPlacementDb {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| SonnyError::CacheUnavailable(format!("mysql connect: {e}")))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl PlacementDb for MySqlPlacementDb {
    async fn move_tenants(&self, tenant_ids: &[String], spare_host: &str) -> Result<()> {
        if tenant_ids.is_empty() {
            return Ok(());
        }
        // One connection opened for the duration of this job, closed on
        // exit either way (spec §5's "database connections are opened
        // per-job and closed on exit").
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SonnyError::Placement(format!("begin tx: {e}")))?;

        for uuid in tenant_ids {
            sqlx::query("UPDATE instances SET host = ?, node = ? WHERE uuid = ?")
                .bind(spare_host)
                .bind(spare_host)
                .bind(uuid)
                .execute(&mut *tx)
                .await
                .map_err(|e| SonnyError::Placement(format!("update {uuid}: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| SonnyError::Placement(format!("commit tx: {e}")))
    }

    async fn current_host(&self, tenant_id: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT host FROM instances WHERE uuid = ?")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SonnyError::CloudApi(format!("query current_host: {e}")))?;
        Ok(row.map(|r| r.get::<String, _>("host")))
    }
}

/// In-memory `PlacementDb` fixture for tests: preload `uuid -> host`
/// rows, drive a scenario, then inspect `moved` to see exactly which
/// tenants were rewritten and onto which host. `fail_after` simulates a
/// transaction that fails partway through its batch of updates.
#[derive(Default)]
pub struct FakePlacementDb {
    hosts: std::sync::Mutex<std::collections::HashMap<String, String>>,
    pub moved: std::sync::Mutex<Vec<(Vec<String>, String)>>,
    fail_after: std::sync::Mutex<Option<usize>>,
}

impl FakePlacementDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, tenant_id: &str, host: &str) {
        self.hosts
            .lock()
            .unwrap()
            .insert(tenant_id.to_string(), host.to_string());
    }

    /// Make `move_tenants` fail once it has already applied `after`
    /// updates, simulating a transaction aborting mid-batch.
    pub fn fail_after(&self, after: usize) {
        *self.fail_after.lock().unwrap() = Some(after);
    }
}

#[async_trait]
impl PlacementDb for FakePlacementDb {
    async fn move_tenants(&self, tenant_ids: &[String], spare_host: &str) -> Result<()> {
        let fail_after = *self.fail_after.lock().unwrap();
        let mut hosts = self.hosts.lock().unwrap();
        for (i, uuid) in tenant_ids.iter().enumerate() {
            if fail_after == Some(i) {
                return Err(SonnyError::Placement(format!("update {uuid}: simulated failure")));
            }
            hosts.insert(uuid.clone(), spare_host.to_string());
        }
        self.moved
            .lock()
            .unwrap()
            .push((tenant_ids.to_vec(), spare_host.to_string()));
        Ok(())
    }

    async fn current_host(&self, tenant_id: &str) -> Result<Option<String>> {
        Ok(self.hosts.lock().unwrap().get(tenant_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_move_tenants_updates_current_host() {
        let db = FakePlacementDb::new();
        db.seed("t1", "hv1");
        db.move_tenants(&["t1".to_string()], "hv99").await.unwrap();
        assert_eq!(db.current_host("t1").await.unwrap(), Some("hv99".to_string()));
    }

    #[tokio::test]
    async fn fake_fail_after_aborts_the_batch() {
        let db = FakePlacementDb::new();
        db.seed("t1", "hv1");
        db.seed("t2", "hv1");
        db.fail_after(1);
        let err = db
            .move_tenants(&["t1".to_string(), "t2".to_string()], "hv99")
            .await
            .unwrap_err();
        assert!(matches!(err, SonnyError::Placement(_)));
        assert_eq!(db.current_host("t1").await.unwrap(), Some("hv99".to_string()));
        assert_eq!(db.current_host("t2").await.unwrap(), Some("hv1".to_string()));
    }
}
