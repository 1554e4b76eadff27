use anyhow::Result;
use libsql::Connection;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 2;

/// Run database migrations
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    // Create schema_migrations table first (tracks applied migrations)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::debug!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Host and server status history").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await?;
        record_migration(conn, 2, "Persist probation flag").await?;
    }

    tracing::info!("Database migrations completed successfully (now at version {})", SCHEMA_VERSION);
    Ok(())
}

/// Get current schema version from database
async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query("SELECT MAX(version) FROM schema_migrations", ())
        .await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

/// Record that a migration was applied
async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp();

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: ping and status-call history
/// Times are epoch milliseconds, flags are 0/1.
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS host_status (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            host TEXT NOT NULL,
            at INTEGER NOT NULL,
            alive INTEGER NOT NULL,
            ns INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fetch_status (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            server TEXT NOT NULL,
            at INTEGER NOT NULL,
            ns INTEGER NOT NULL,
            status_code INTEGER NOT NULL,
            is_setup INTEGER NOT NULL DEFAULT 0,
            is_busted INTEGER NOT NULL DEFAULT 0,
            busted TEXT,
            users INTEGER,
            guests INTEGER,
            pages INTEGER,
            dbused INTEGER,
            mem TEXT,
            load TEXT,
            info TEXT,
            uptime TEXT,
            stamp INTEGER
        )",
        (),
    )
    .await?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_host_status_host_at ON host_status(host, at DESC)", ()).await?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_fetch_status_server_at ON fetch_status(server, at DESC)", ()).await?;

    tracing::info!("Created host_status and fetch_status tables");
    Ok(())
}

/// Migration v2: remember whether a record put its server on probation
async fn run_migration_v2(conn: &Connection) -> Result<()> {
    let mut rows = conn.query("PRAGMA table_info(fetch_status)", ()).await?;
    let mut has_probation = false;
    while let Some(row) = rows.next().await? {
        let name: String = row.get(1)?;
        if name == "probation" {
            has_probation = true;
        }
    }

    if !has_probation {
        conn.execute(
            "ALTER TABLE fetch_status ADD COLUMN probation INTEGER NOT NULL DEFAULT 0",
            (),
        )
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_migrations_are_idempotent() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("migrate.db");
        let db = libsql::Builder::new_local(path.to_string_lossy().as_ref()).build().await?;
        let conn = db.connect()?;

        run_migrations(&conn).await?;
        run_migrations(&conn).await?;

        assert_eq!(get_current_version(&conn).await?, SCHEMA_VERSION);

        let mut rows = conn.query("SELECT COUNT(*) FROM schema_migrations", ()).await?;
        let count: i64 = rows.next().await?.map(|r| r.get(0)).transpose()?.unwrap_or(0);
        assert_eq!(count, i64::from(SCHEMA_VERSION));

        conn.execute(
            "INSERT INTO fetch_status (server, at, ns, status_code, probation) VALUES ('st', 1, 1, 200, 1)",
            (),
        )
        .await?;
        Ok(())
    }
}
