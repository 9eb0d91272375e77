use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

pub const TOKEN_KEY: &str = "session_token";
pub const SETTINGS_KEY: &str = "user_settings";

/// Small key/value store backing the degraded-mode fallbacks (session token,
/// custom columns, categories) when the API cannot be reached.
#[derive(Clone)]
pub struct Cache {
    pool: SqlitePool,
}

impl Cache {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        // Ensure the data directory exists
        if let Some(path) = url.strip_prefix("sqlite:") {
            let path = path.split('?').next().unwrap_or(path);
            if !path.contains(":memory:") {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        // Every in-memory connection is its own database.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Connects and migrates in one step.
    pub async fn open(url: &str) -> anyhow::Result<Self> {
        let cache = Self::connect(url).await?;
        cache.run_migrations().await?;
        Ok(cache)
    }

    pub async fn get(&self, key: &str) -> sqlx::Result<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT value FROM cache_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn put(&self, key: &str, value: &str) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> sqlx::Result<()> {
        sqlx::query("DELETE FROM cache_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Reads a JSON value. Missing, unreadable, or malformed entries are all
    /// reported as `None`.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::warn!(key, error = %err, "discarding malformed cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(key, error = %err, "cache read failed");
                None
            }
        }
    }

    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(key, error = %err, "failed to encode cache entry");
                return;
            }
        };
        if let Err(err) = self.put(key, &raw).await {
            tracing::warn!(key, error = %err, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, UserSettings};

    async fn temp_cache(dir: &tempfile::TempDir) -> Cache {
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("cache.db").display());
        Cache::open(&url).await.unwrap()
    }

    #[tokio::test]
    async fn put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let cache = temp_cache(&dir).await;

        assert_eq!(cache.get(TOKEN_KEY).await.unwrap(), None);
        cache.put(TOKEN_KEY, "one").await.unwrap();
        cache.put(TOKEN_KEY, "two").await.unwrap();
        assert_eq!(cache.get(TOKEN_KEY).await.unwrap().as_deref(), Some("two"));

        cache.delete(TOKEN_KEY).await.unwrap();
        assert_eq!(cache.get(TOKEN_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn json_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let settings = UserSettings {
            custom_columns: vec![],
            categories: vec![Category {
                id: "c1".into(),
                name: "Work".into(),
                color: None,
            }],
        };
        temp_cache(&dir).await.put_json(SETTINGS_KEY, &settings).await;

        let reopened = temp_cache(&dir).await;
        let loaded: Option<UserSettings> = reopened.get_json(SETTINGS_KEY).await;
        assert_eq!(loaded, Some(settings));
    }

    #[tokio::test]
    async fn malformed_json_reads_as_missing() {
        let cache = Cache::open("sqlite::memory:").await.unwrap();
        cache.put(SETTINGS_KEY, "{not json").await.unwrap();
        let loaded: Option<UserSettings> = cache.get_json(SETTINGS_KEY).await;
        assert!(loaded.is_none());
    }
}
