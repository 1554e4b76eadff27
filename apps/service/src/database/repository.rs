use anyhow::Result;
use async_trait::async_trait;
use libsql::params;

use super::models::{FETCH_STATUS_COLUMNS, StatusRecord, TimeOrder, flag, server_status_from_row, to_millis};
use crate::monitoring::types::ServerStatus;
use crate::pool::LibsqlPool;

/// Append-only history of probe results
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Store a record and return its row id
    async fn append(&self, record: &StatusRecord) -> Result<i64>;

    /// Up to `limit` status records of a server
    async fn query_latest(&self, server: &str, limit: usize, order: TimeOrder) -> Result<Vec<ServerStatus>>;
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<crate::pool::LibsqlManager>> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl HistoryStore for DatabaseImpl {
    async fn append(&self, record: &StatusRecord) -> Result<i64> {
        let conn = self.get_conn().await?;

        match record {
            StatusRecord::Host(status) => {
                conn.execute(
                    "INSERT INTO host_status (host, at, alive, ns) VALUES (?, ?, ?, ?)",
                    params![status.host.clone(), to_millis(status.when), flag(status.alive), status.ns as i64],
                )
                .await?;
            }
            StatusRecord::Server(status) => {
                conn.execute(
                    "INSERT INTO fetch_status (server, at, ns, probation, status_code, is_setup, is_busted, busted, users, guests, pages, dbused, mem, load, info, uptime, stamp) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        status.server.clone(),
                        to_millis(status.when),
                        status.ns as i64,
                        flag(status.probation),
                        i64::from(status.status_code),
                        flag(status.is_setup),
                        flag(status.is_busted),
                        status.busted.clone(),
                        status.users,
                        status.guests,
                        status.pages,
                        status.dbused,
                        status.mem.clone(),
                        status.load.clone(),
                        status.info.clone(),
                        status.uptime.clone(),
                        status.stamp.map(to_millis)
                    ],
                )
                .await?;
            }
        }

        Ok(conn.last_insert_rowid())
    }

    async fn query_latest(&self, server: &str, limit: usize, order: TimeOrder) -> Result<Vec<ServerStatus>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {FETCH_STATUS_COLUMNS} FROM fetch_status WHERE server = ? ORDER BY at {dir}, id {dir} LIMIT ?",
            dir = order.sql()
        );
        let mut stmt = conn.prepare(&sql).await?;

        let mut rows = stmt.query(params![server.to_string(), limit as i64]).await?;
        let mut results = Vec::new();

        while let Some(row) = rows.next().await? {
            results.push(server_status_from_row(&row)?);
        }

        Ok(results)
    }
}
