use derive_builder::Builder;
use serde::Deserialize;
use sqlx::sqlite::SqlitePool;

use super::{ensure_affected, now};
use crate::{
    data::User,
    error::{Error, Result},
    validate,
};

const SELECT: &str = r#"
SELECT
    id, username, email, first_name, last_name, is_staff, is_superuser, is_active,
    password_hash, date_joined, last_login
FROM app_user"#;

/// A new account. The password is already hashed.
#[derive(Debug, Clone, Builder)]
pub struct NewUserProps {
    #[builder(setter(into))]
    pub username: String,
    #[builder(setter(into), default)]
    pub email: String,
    #[builder(setter(into))]
    pub password_hash: String,
    #[builder(setter(into), default)]
    pub first_name: String,
    #[builder(setter(into), default)]
    pub last_name: String,
    #[builder(default)]
    pub is_staff: bool,
    #[builder(default)]
    pub is_superuser: bool,
}

impl NewUserProps {
    fn validate(&self) -> Result<()> {
        validate::required("username", &self.username)?;
        validate::max_len("username", &self.username, 150)?;
        validate::email("email", &self.email)
    }
}

/// Partial profile update; absent fields are kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

pub async fn add_user(db_conn: &SqlitePool, props: &NewUserProps) -> Result<i64> {
    props.validate()?;
    let id = sqlx::query(
        r#"
INSERT INTO app_user
    (username, email, password_hash, first_name, last_name, is_staff, is_superuser,
     is_active, date_joined)
VALUES
    (?, ?, ?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(&props.username)
    .bind(&props.email)
    .bind(&props.password_hash)
    .bind(&props.first_name)
    .bind(&props.last_name)
    .bind(props.is_staff)
    .bind(props.is_superuser)
    .bind(now())
    .execute(db_conn)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn get_user(db_conn: &SqlitePool, id: i64) -> Result<User> {
    let sql = format!("{SELECT} WHERE id = ?");
    sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(db_conn)
        .await?
        .ok_or_else(|| Error::not_found("Not found."))
}

pub async fn find_user_by_username(db_conn: &SqlitePool, username: &str) -> Result<Option<User>> {
    let sql = format!("{SELECT} WHERE username = ?");
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(username)
        .fetch_optional(db_conn)
        .await?;
    Ok(user)
}

pub async fn update_profile(db_conn: &SqlitePool, id: i64, patch: &ProfilePatch) -> Result<()> {
    let current = get_user(db_conn, id).await?;
    let email = patch.email.as_deref().unwrap_or(&current.email);
    validate::email("email", email)?;
    let first_name = patch.first_name.as_deref().unwrap_or(&current.first_name);
    let last_name = patch.last_name.as_deref().unwrap_or(&current.last_name);
    validate::max_len("first_name", first_name, 150)?;
    validate::max_len("last_name", last_name, 150)?;

    let rows = sqlx::query("UPDATE app_user SET first_name = ?, last_name = ?, email = ? WHERE id = ?")
        .bind(first_name)
        .bind(last_name)
        .bind(email)
        .bind(id)
        .execute(db_conn)
        .await?
        .rows_affected();
    ensure_affected(rows)
}

pub async fn set_password_hash(db_conn: &SqlitePool, id: i64, password_hash: &str) -> Result<()> {
    let rows = sqlx::query("UPDATE app_user SET password_hash = ? WHERE id = ?")
        .bind(password_hash)
        .bind(id)
        .execute(db_conn)
        .await?
        .rows_affected();
    ensure_affected(rows)
}

pub async fn touch_last_login(db_conn: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("UPDATE app_user SET last_login = ? WHERE id = ?")
        .bind(now())
        .bind(id)
        .execute(db_conn)
        .await?;
    Ok(())
}
