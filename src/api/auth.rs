use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use super::ApiState;
use crate::{
    auth::{self, Viewer},
    db::{
        session::{delete_other_sessions, delete_session},
        user::{self, NewUserPropsBuilder, ProfilePatch},
    },
    error::{Error, Result},
};

fn filled(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[derive(Deserialize)]
pub(super) struct LoginBody {
    username: Option<String>,
    password: Option<String>,
}

#[actix_web::post("/api/auth/login/")]
pub(super) async fn login(
    data: web::Data<ApiState>,
    body: web::Json<LoginBody>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let (Some(username), Some(password)) = (filled(body.username), filled(body.password)) else {
        return Err(Error::invalid("Please provide both username and password"));
    };

    let user = match auth::authenticate(&data.db_pool, &username, &password).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!("failed login for {username}");
            return Err(e);
        }
    };
    let token = auth::start_session(&data.db_pool, user.id, data.config.session_ttl_hours).await?;
    tracing::info!("{} logged in", user.username);

    Ok(HttpResponse::Ok()
        .cookie(auth::session_cookie(
            token,
            data.config.session_ttl_hours,
            data.config.session_cookie_secure,
        ))
        .json(json!({ "success": true, "user": user })))
}

#[actix_web::post("/api/auth/logout/")]
pub(super) async fn logout(data: web::Data<ApiState>, viewer: Viewer) -> Result<HttpResponse> {
    let user = viewer.require_user()?;
    if let Some(token) = viewer.token() {
        delete_session(&data.db_pool, token).await?;
    }
    tracing::info!("{} logged out", user.username);
    Ok(HttpResponse::Ok()
        .cookie(auth::removal_cookie())
        .json(json!({ "success": true, "message": "Logged out successfully" })))
}

#[actix_web::get("/api/auth/user/")]
pub(super) async fn current_user(viewer: Viewer) -> Result<HttpResponse> {
    let user = viewer.require_user()?;
    Ok(HttpResponse::Ok().json(user))
}

#[derive(Deserialize)]
pub(super) struct RegisterBody {
    username: Option<String>,
    password: Option<String>,
    #[serde(default)]
    email: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
}

/// Creates a plain account and logs it in.
#[actix_web::post("/api/auth/register/")]
pub(super) async fn register(
    data: web::Data<ApiState>,
    body: web::Json<RegisterBody>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let (Some(username), Some(password)) = (filled(body.username), filled(body.password)) else {
        return Err(Error::invalid("Please provide username and password"));
    };
    if user::find_user_by_username(&data.db_pool, &username).await?.is_some() {
        return Err(Error::invalid("Username already exists"));
    }
    auth::check_password_strength(&password)?;

    let props = NewUserPropsBuilder::default()
        .username(username)
        .email(body.email)
        .first_name(body.first_name)
        .last_name(body.last_name)
        .password_hash(auth::hash_password(&password).await?)
        .build()
        .map_err(|e| Error::Invalid(e.to_string()))?;
    let id = user::add_user(&data.db_pool, &props).await?;
    let created = user::get_user(&data.db_pool, id).await?;
    tracing::info!("registered user {}", created.username);

    let token = auth::start_session(&data.db_pool, id, data.config.session_ttl_hours).await?;
    Ok(HttpResponse::Created()
        .cookie(auth::session_cookie(
            token,
            data.config.session_ttl_hours,
            data.config.session_cookie_secure,
        ))
        .json(json!({ "success": true, "user": created })))
}

#[actix_web::post("/api/auth/update-profile/")]
pub(super) async fn update_profile(
    data: web::Data<ApiState>,
    viewer: Viewer,
    body: web::Json<ProfilePatch>,
) -> Result<HttpResponse> {
    let user = viewer.require_user()?;
    user::update_profile(&data.db_pool, user.id, &body).await?;
    tracing::info!("{} updated their profile", user.username);
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Profile updated successfully!",
    })))
}

#[derive(Deserialize)]
pub(super) struct ChangePasswordBody {
    #[serde(default)]
    current_password: String,
    #[serde(default)]
    new_password: String,
    #[serde(default)]
    confirm_password: String,
}

/// Keeps the session that made the request and revokes all others.
#[actix_web::post("/api/auth/change-password/")]
pub(super) async fn change_password(
    data: web::Data<ApiState>,
    viewer: Viewer,
    body: web::Json<ChangePasswordBody>,
) -> Result<HttpResponse> {
    let user = viewer.require_user()?;
    if !auth::verify_password(&body.current_password, &user.password_hash).await? {
        return Err(Error::invalid("Current password is incorrect."));
    }
    if body.new_password != body.confirm_password {
        return Err(Error::invalid("New passwords do not match."));
    }
    auth::check_password_strength(&body.new_password)?;

    let hash = auth::hash_password(&body.new_password).await?;
    user::set_password_hash(&data.db_pool, user.id, &hash).await?;
    let revoked = match viewer.token() {
        Some(keep) => delete_other_sessions(&data.db_pool, user.id, keep).await?,
        None => 0,
    };
    tracing::info!("{} changed their password, {revoked} other sessions revoked", user.username);

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Password changed successfully!",
    })))
}
