//! Generic key-value persistence for application state across restarts.
//!
//! Backed by the `app_kv` table. Holds refresh state, the last good snapshot
//! of every directory collection, and the directory settings.

use sqlx::PgPool;

/// Retrieve a value by key, or `None` if not present.
pub async fn get(pool: &PgPool, key: &str) -> Result<Option<serde_json::Value>, sqlx::Error> {
    sqlx::query_scalar::<_, serde_json::Value>("SELECT value FROM app_kv WHERE key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await
}

/// Insert or update a key-value pair.
pub async fn set(pool: &PgPool, key: &str, value: &serde_json::Value) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO app_kv (key, value)
        VALUES ($1, $2)
        ON CONFLICT (key)
        DO UPDATE SET value = EXCLUDED.value, updated_at = now()
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}
