use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::protocol::Snapshot;

/// Default key the board snapshot is stored under.
pub const DEFAULT_STORAGE_KEY: &str = "break_board";

/// Local key/value persistence for board snapshots.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every in-memory connection is its own database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open sqlite database '{database_url}'"))?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// `Ok(None)` when nothing was ever saved under `key`; an error when the
    /// stored payload no longer decodes.
    pub async fn load_snapshot(&self, key: &str) -> Result<Option<Snapshot>> {
        let row = sqlx::query("SELECT payload FROM snapshots WHERE storage_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read snapshot '{key}'"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let payload: String = row.try_get("payload")?;
        let snapshot = serde_json::from_str(&payload)
            .with_context(|| format!("stored snapshot '{key}' is corrupt"))?;
        Ok(Some(snapshot))
    }

    pub async fn save_snapshot(&self, key: &str, snapshot: &Snapshot) -> Result<()> {
        let payload = serde_json::to_string(snapshot).context("failed to encode snapshot")?;
        sqlx::query(
            "INSERT INTO snapshots (storage_key, payload, last_updated)
             VALUES (?, ?, ?)
             ON CONFLICT(storage_key) DO UPDATE SET
                payload = excluded.payload,
                last_updated = excluded.last_updated,
                saved_at = CURRENT_TIMESTAMP",
        )
        .bind(key)
        .bind(payload)
        .bind(snapshot.last_updated)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write snapshot '{key}'"))?;
        Ok(())
    }

    /// `lastUpdated` of the stored snapshot without decoding the payload.
    pub async fn last_updated(&self, key: &str) -> Result<Option<i64>> {
        let value: Option<i64> =
            sqlx::query_scalar("SELECT last_updated FROM snapshots WHERE storage_key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .with_context(|| format!("failed to read snapshot timestamp '{key}'"))?;
        Ok(value)
    }

    #[cfg(test)]
    async fn write_raw_payload(&self, key: &str, payload: &str) -> Result<()> {
        sqlx::query("INSERT INTO snapshots (storage_key, payload, last_updated) VALUES (?, ?, 0)")
            .bind(key)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Turns a bare file path (or `sqlite:path`) into a `sqlite://` URL. URLs
/// and in-memory databases pass through unchanged.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    let path = raw_database_url
        .strip_prefix("sqlite:")
        .unwrap_or(raw_database_url);
    format!("sqlite://{}", path.replace('\\', "/"))
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.contains(":memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
