//! Connection pool over a libsql database.
//!
//! Probe results are appended from the watcher task while the read API
//! queries history, so several connections are open at once.

use std::time::Duration;

use deadpool::managed::{self, Pool, PoolConfig, RecycleError, RecycleResult};
use libsql::{Connection, Database, Error as LibsqlError};

/// Upper bound on open connections
pub const MAX_CONNECTIONS: usize = 8;

/// How long a local writer waits on a locked file before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct LibsqlManager {
    database: Database,
    local: bool,
}

impl LibsqlManager {
    pub fn new(database: Database, local: bool) -> Self {
        Self { database, local }
    }
}

impl managed::Manager for LibsqlManager {
    type Type = Connection;
    type Error = LibsqlError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        let conn = self.database.connect()?;
        if self.local {
            conn.busy_timeout(BUSY_TIMEOUT)?;
        }
        Ok(conn)
    }

    async fn recycle(
        &self,
        conn: &mut Self::Type,
        _: &managed::Metrics,
    ) -> RecycleResult<Self::Error> {
        let row = conn
            .query("SELECT 1", ())
            .await?
            .next()
            .await?
            .ok_or(LibsqlError::QueryReturnedNoRows)?;
        if row.get::<i64>(0)? != 1 {
            return Err(RecycleError::Message("connection answered garbage".into()));
        }
        Ok(())
    }
}

pub type LibsqlPool = Pool<LibsqlManager>;

/// Build a pool over an opened database.
pub fn build_pool(database: Database, local: bool) -> anyhow::Result<LibsqlPool> {
    let config = PoolConfig { max_size: MAX_CONNECTIONS, ..PoolConfig::default() };
    Ok(LibsqlPool::builder(LibsqlManager::new(database, local)).config(config).build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connections_are_recycled() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let database = libsql::Builder::new_local(dir.path().join("pool.db")).build().await?;
        let pool = build_pool(database, true)?;

        {
            let conn = pool.get().await.map_err(|e| anyhow::anyhow!("{e}"))?;
            conn.execute("CREATE TABLE t (x INTEGER)", ()).await?;
        }
        let conn = pool.get().await.map_err(|e| anyhow::anyhow!("{e}"))?;
        conn.execute("INSERT INTO t (x) VALUES (1)", ()).await?;

        let status = pool.status();
        assert_eq!(status.max_size, MAX_CONNECTIONS);
        assert_eq!(status.size, 1);
        Ok(())
    }
}
