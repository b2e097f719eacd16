use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Mutex,
};

use shared::domain::Tier;

pub const AUTH_TOKEN_KEY: &str = "authToken";
pub const USER_KEY: &str = "liftops_user";
pub const TIER_KEY: &str = "liftops_tier";

pub const SESSION_KEYS: [&str; 3] = [AUTH_TOKEN_KEY, USER_KEY, TIER_KEY];

/// String key/value store holding the dashboard's session keys.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_value(&self, key: &str) -> Result<Option<String>>;
    async fn set_value(&self, key: &str, value: &str) -> Result<()>;
    async fn remove_value(&self, key: &str) -> Result<bool>;

    async fn load_snapshot(&self) -> Result<ClientStateSnapshot> {
        Ok(ClientStateSnapshot {
            auth_token: self.get_value(AUTH_TOKEN_KEY).await?,
            user_json: self.get_value(USER_KEY).await?,
            tier_override: self.get_value(TIER_KEY).await?,
        })
    }

    /// Seeds the keys the login page writes after a successful sign-in.
    async fn save_login(&self, auth_token: &str, user_json: Option<&str>) -> Result<()> {
        self.set_value(AUTH_TOKEN_KEY, auth_token).await?;
        if let Some(user_json) = user_json {
            self.set_value(USER_KEY, user_json).await?;
        }
        Ok(())
    }

    async fn save_tier(&self, tier: Tier) -> Result<()> {
        self.set_value(TIER_KEY, tier.as_str()).await
    }

    async fn clear_session(&self) -> Result<()> {
        for key in SESSION_KEYS {
            self.remove_value(key).await?;
        }
        Ok(())
    }
}

/// Persisted client state: a small string key/value table standing in for
/// the browser's local storage.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

/// Raw view of the three session keys, read in one pass at bootstrap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientStateSnapshot {
    pub auth_token: Option<String>,
    pub user_json: Option<String>,
    pub tier_override: Option<String>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to an in-memory url is a separate database.
        let max_connections = if is_memory_url(database_url) { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        let storage = Self { pool };
        storage.ensure_client_state_table().await?;
        Ok(storage)
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

    async fn ensure_client_state_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS client_state (
                key        TEXT PRIMARY KEY NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure client_state table exists")?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for Storage {
    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM client_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read client state key '{key}'"))?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO client_state (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write client state key '{key}'"))?;
        Ok(())
    }

    async fn remove_value(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM client_state WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to remove client state key '{key}'"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_login(&self, auth_token: &str, user_json: Option<&str>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in [(AUTH_TOKEN_KEY, Some(auth_token)), (USER_KEY, user_json)] {
            let Some(value) = value else {
                continue;
            };
            sqlx::query(
                "INSERT INTO client_state (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await.context("failed to persist login state")?;
        Ok(())
    }
}

/// Process-local store for ephemeral sessions and tests.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values().get(key).cloned())
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_value(&self, key: &str) -> Result<bool> {
        Ok(self.values().remove(key).is_some())
    }
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
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
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
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
