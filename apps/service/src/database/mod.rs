/// Database abstraction layer
///
/// History of pings and status calls, kept in libsql (local file or remote).

pub mod repository;
pub mod migrations;
pub mod models;

pub use models::{StatusRecord, TimeOrder};
pub use repository::{DatabaseImpl, HistoryStore};

use anyhow::{Context, Result};

use crate::pool::{self, LibsqlPool};

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}

fn is_remote(dbpath: &str) -> bool {
    ["libsql://", "http://", "https://"]
        .iter()
        .any(|scheme| dbpath.starts_with(scheme))
}

/// Open the database at `dbpath`, build a pool and migrate the schema
pub async fn open(dbpath: &str, auth_token: Option<&str>) -> Result<LibsqlPool> {
    let remote = is_remote(dbpath);
    let db = if remote {
        tracing::info!("Using remote database {}", dbpath);
        libsql::Builder::new_remote(dbpath.to_string(), auth_token.unwrap_or_default().to_string())
            .build()
            .await
            .with_context(|| format!("opening remote database {dbpath}"))?
    } else {
        tracing::info!("Using database file {}", dbpath);
        libsql::Builder::new_local(dbpath)
            .build()
            .await
            .with_context(|| format!("opening database file {dbpath}"))?
    };

    let pool = pool::build_pool(db, !remote)?;

    let conn = pool.get().await.map_err(|e| anyhow::anyhow!("connecting to {dbpath}: {e}"))?;
    initialize_database(&conn).await?;

    Ok(pool)
}
