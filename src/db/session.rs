use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;

use super::now;
use crate::{data::User, error::Result};

pub async fn add_session(
    db_conn: &SqlitePool,
    token: &str,
    user_id: i64,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("INSERT INTO session (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)")
        .bind(token)
        .bind(user_id)
        .bind(now())
        .bind(expires_at)
        .execute(db_conn)
        .await?;
    Ok(())
}

/// The active user behind a live session. An expired session is removed.
pub async fn session_user(db_conn: &SqlitePool, token: &str) -> Result<Option<User>> {
    let expires_at: Option<DateTime<Utc>> =
        sqlx::query_scalar("SELECT expires_at FROM session WHERE token = ?")
            .bind(token)
            .fetch_optional(db_conn)
            .await?;
    let Some(expires_at) = expires_at else {
        return Ok(None);
    };
    if expires_at <= now() {
        delete_session(db_conn, token).await?;
        return Ok(None);
    }

    let user = sqlx::query_as::<_, User>(
        r#"
SELECT
    u.id, u.username, u.email, u.first_name, u.last_name, u.is_staff, u.is_superuser,
    u.is_active, u.password_hash, u.date_joined, u.last_login
FROM session s
JOIN app_user u ON u.id = s.user_id
WHERE s.token = ? AND u.is_active = 1"#,
    )
    .bind(token)
    .fetch_optional(db_conn)
    .await?;
    Ok(user)
}

pub async fn delete_session(db_conn: &SqlitePool, token: &str) -> Result<()> {
    sqlx::query("DELETE FROM session WHERE token = ?")
        .bind(token)
        .execute(db_conn)
        .await?;
    Ok(())
}

/// Ends every session of `user_id` except `keep`.
pub async fn delete_other_sessions(db_conn: &SqlitePool, user_id: i64, keep: &str) -> Result<u64> {
    let rows = sqlx::query("DELETE FROM session WHERE user_id = ? AND token <> ?")
        .bind(user_id)
        .bind(keep)
        .execute(db_conn)
        .await?
        .rows_affected();
    Ok(rows)
}

pub async fn purge_expired_sessions(db_conn: &SqlitePool) -> Result<u64> {
    let rows = sqlx::query("DELETE FROM session WHERE expires_at <= ?")
        .bind(now())
        .execute(db_conn)
        .await?
        .rows_affected();
    Ok(rows)
}
