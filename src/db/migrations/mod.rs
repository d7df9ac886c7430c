//! Versioned schema changes.
//!
//! Each version `NN` has two files next to this module: `migration_NN_up.sql` takes the schema
//! from `NN-1` to `NN`, and `migration_NN_down.sql` undoes it. The version the database is at
//! lives in the single-row `schema_version` table.

use crate::Result;
use anyhow::{bail, Context};
use sqlx::{Executor, SqlitePool};
use tracing::debug;

/// The schema version this build of the program expects.
pub(crate) const CURRENT_VERSION: i32 = 1;

struct Migration {
    version: i32,
    up: &'static str,
    down: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    up: include_str!("migration_01_up.sql"),
    down: include_str!("migration_01_down.sql"),
}];

/// Creates `schema_version` at version 0 on a brand new database.
pub(crate) async fn bootstrap(pool: &SqlitePool) -> Result<()> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .execute(pool)
        .await
        .context("Unable to create the schema_version table")?;
    let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM schema_version")
        .fetch_one(pool)
        .await
        .context("Unable to read the schema_version table")?;
    if rows == 0 {
        sqlx::query("INSERT INTO schema_version (version) VALUES (0)")
            .execute(pool)
            .await
            .context("Unable to initialize the schema version")?;
    }
    Ok(())
}

pub(crate) async fn version(pool: &SqlitePool) -> Result<i32> {
    let (version,): (i32,) = sqlx::query_as("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .context("Unable to read the schema version")?;
    Ok(version)
}

/// Walks the schema from version `from` to version `to`, one migration at a time, up or down.
/// Every step commits together with its `schema_version` change. Nothing runs unless every
/// migration on the way is known.
pub(crate) async fn run(pool: &SqlitePool, from: i32, to: i32) -> Result<()> {
    if from == to {
        debug!("Schema is at version {to}, nothing to migrate");
        return Ok(());
    }
    check_available(from, to)?;

    if from < to {
        for version in (from + 1)..=to {
            debug!("Migrating up to schema version {version:02}");
            apply(pool, find(version)?.up, version).await?;
        }
    } else {
        for version in ((to + 1)..=from).rev() {
            debug!("Migrating down from schema version {version:02}");
            apply(pool, find(version)?.down, version - 1).await?;
        }
    }
    debug!("Schema is now at version {to}");
    Ok(())
}

fn find(version: i32) -> Result<&'static Migration> {
    MIGRATIONS
        .iter()
        .find(|m| m.version == version)
        .with_context(|| format!("There is no migration for schema version {version}"))
}

async fn apply(pool: &SqlitePool, sql: &str, resulting_version: i32) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("Unable to start a migration transaction")?;
    tx.execute(sql)
        .await
        .context("The migration SQL failed")?;
    sqlx::query("UPDATE schema_version SET version = ?")
        .bind(resulting_version)
        .execute(&mut *tx)
        .await
        .context("Unable to record the new schema version")?;
    tx.commit()
        .await
        .context("Unable to commit the migration")?;
    Ok(())
}

fn check_available(from: i32, to: i32) -> Result<()> {
    let (low, high) = if from < to { (from + 1, to) } else { (to + 1, from) };
    for version in low..=high {
        if !MIGRATIONS.iter().any(|m| m.version == version) {
            bail!("Cannot migrate the schema from version {from} to {to}: migration {version} is missing");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use tempfile::TempDir;

    async fn empty_db() -> (TempDir, SqlitePool) {
        let dir = TempDir::new().unwrap();
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("migrations.sqlite"))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        bootstrap(&pool).await.unwrap();
        (dir, pool)
    }

    async fn has_table(pool: &SqlitePool, name: &str) -> bool {
        let (n,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(name)
                .fetch_one(pool)
                .await
                .unwrap();
        n > 0
    }

    #[tokio::test]
    async fn test_up_then_down() {
        let (_dir, pool) = empty_db().await;
        assert_eq!(version(&pool).await.unwrap(), 0);

        run(&pool, 0, CURRENT_VERSION).await.unwrap();
        assert_eq!(version(&pool).await.unwrap(), CURRENT_VERSION);
        assert!(has_table(&pool, "expenses").await);
        assert!(has_table(&pool, "categories").await);

        run(&pool, CURRENT_VERSION, 0).await.unwrap();
        assert_eq!(version(&pool).await.unwrap(), 0);
        assert!(!has_table(&pool, "expenses").await);
        assert!(!has_table(&pool, "categories").await);
    }

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let (_dir, pool) = empty_db().await;
        run(&pool, 0, 1).await.unwrap();
        bootstrap(&pool).await.unwrap();
        assert_eq!(version(&pool).await.unwrap(), 1);
        run(&pool, 1, 1).await.unwrap();
    }

    #[test]
    fn test_missing_migrations_are_rejected() {
        assert!(check_available(0, 1).is_ok());
        assert!(check_available(1, 0).is_ok());
        assert!(check_available(0, 2).is_err());
        assert!(check_available(3, 1).is_err());
    }
}
