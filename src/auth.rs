//! Password hashing, cookie sessions and the request-side view of who is
//! calling.

use actix_web::{
    cookie::{time, Cookie, SameSite},
    dev::Payload,
    web, FromRequest, HttpRequest,
};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Duration;
use futures::future::LocalBoxFuture;
use rand::{rngs::OsRng, Rng};
use sqlx::sqlite::SqlitePool;

use crate::{
    api::ApiState,
    data::User,
    db::{
        now,
        session::{add_session, session_user},
        user::{add_user, find_user_by_username, touch_last_login, NewUserPropsBuilder},
    },
    error::{Error, Result},
};

pub const SESSION_COOKIE: &str = "sessionid";

pub const MIN_PASSWORD_LEN: usize = 8;

/// Argon2id PHC string of `password`. Runs on the blocking pool.
pub async fn hash_password(password: &str) -> Result<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
    })
    .await
    .map_err(|e| Error::PasswordHash(e.to_string()))?
    .map_err(|e| Error::PasswordHash(e.to_string()))
}

/// A malformed stored hash never matches.
pub async fn verify_password(password: &str, stored: &str) -> Result<bool> {
    let password = password.to_string();
    let stored = stored.to_string();
    tokio::task::spawn_blocking(move || match PasswordHash::new(&stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("unreadable password hash: {e}");
            false
        }
    })
    .await
    .map_err(|e| Error::PasswordHash(e.to_string()))
}

pub fn check_password_strength(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::Invalid(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long."
        )));
    }
    Ok(())
}

/// 32 random bytes, URL-safe base64.
pub fn new_session_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// The active user with this username and password.
pub async fn authenticate(db_conn: &SqlitePool, username: &str, password: &str) -> Result<User> {
    let Some(user) = find_user_by_username(db_conn, username).await? else {
        // spend the same time as for a real account
        let _ = hash_password(password).await?;
        return Err(Error::BadCredentials);
    };
    if !user.is_active || !verify_password(password, &user.password_hash).await? {
        return Err(Error::BadCredentials);
    }
    touch_last_login(db_conn, user.id).await?;
    Ok(user)
}

/// Opens a session for `user_id` and returns its token.
pub async fn start_session(db_conn: &SqlitePool, user_id: i64, ttl_hours: i64) -> Result<String> {
    let token = new_session_token();
    add_session(db_conn, &token, user_id, now() + Duration::hours(ttl_hours)).await?;
    Ok(token)
}

pub fn session_cookie(token: String, ttl_hours: i64, secure: bool) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::hours(ttl_hours))
        .finish()
}

pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(SESSION_COOKIE, "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish();
    cookie.make_removal();
    cookie
}

/// Creates the configured superuser unless the name is already taken.
/// Returns whether an account was created.
pub async fn ensure_admin(db_conn: &SqlitePool, username: &str, password: &str) -> Result<bool> {
    if find_user_by_username(db_conn, username).await?.is_some() {
        return Ok(false);
    }
    check_password_strength(password)?;
    let props = NewUserPropsBuilder::default()
        .username(username)
        .password_hash(hash_password(password).await?)
        .is_staff(true)
        .is_superuser(true)
        .build()
        .map_err(|e| Error::Invalid(e.to_string()))?;
    add_user(db_conn, &props).await?;
    tracing::info!("created superuser {username}");
    Ok(true)
}

/// Whoever sent the request, resolved from the session cookie.
#[derive(Debug, Clone, Default)]
pub struct Viewer {
    user: Option<User>,
    token: Option<String>,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// The session token, if the session resolved to a user.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_staff(&self) -> bool {
        self.user
            .as_ref()
            .is_some_and(|u| u.is_staff || u.is_superuser)
    }

    pub fn require_user(&self) -> Result<&User> {
        self.user.as_ref().ok_or(Error::NotAuthenticated)
    }

    pub fn require_staff(&self) -> Result<&User> {
        let user = self.require_user()?;
        if !(user.is_staff || user.is_superuser) {
            return Err(Error::Forbidden);
        }
        Ok(user)
    }
}

impl FromRequest for Viewer {
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let token = req.cookie(SESSION_COOKIE).map(|c| c.value().to_string());
        let state = req.app_data::<web::Data<ApiState>>().cloned();
        Box::pin(async move {
            let (Some(token), Some(state)) = (token, state) else {
                return Ok(Viewer::anonymous());
            };
            let user = session_user(&state.db_pool, &token).await?;
            let token = user.as_ref().map(|_| token);
            Ok(Viewer { user, token })
        })
    }
}
