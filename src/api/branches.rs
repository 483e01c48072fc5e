use actix_web::{web, HttpRequest, HttpResponse};

use super::{paginated, ApiState};
use crate::{
    auth::Viewer,
    db::{
        branch::{self, BranchPatch, BranchProps, ListBranchProps},
        review,
    },
    error::Result,
    query::ListParams,
};

#[actix_web::get("/api/branches/")]
pub(super) async fn list(
    req: HttpRequest,
    data: web::Data<ApiState>,
    viewer: Viewer,
    params: web::Query<ListParams>,
) -> Result<HttpResponse> {
    let page = params.page(data.config.page_size)?;
    let props = ListBranchProps::from_params(&params, viewer.is_staff());
    let paged = branch::list_branches(&data.db_pool, &props, page).await?;
    Ok(paginated(&req, paged))
}

#[actix_web::post("/api/branches/")]
pub(super) async fn create(
    data: web::Data<ApiState>,
    viewer: Viewer,
    body: web::Json<BranchProps>,
) -> Result<HttpResponse> {
    let user = viewer.require_staff()?;
    let id = branch::add_branch(&data.db_pool, &body).await?;
    tracing::info!("{} created branch {id}", user.username);
    let created = branch::get_branch(&data.db_pool, id, true).await?;
    Ok(HttpResponse::Created().json(created))
}

#[actix_web::get("/api/branches/{id:\\d+}/")]
pub(super) async fn retrieve(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let found = branch::get_branch(&data.db_pool, *path, viewer.is_staff()).await?;
    Ok(HttpResponse::Ok().json(found))
}

#[actix_web::put("/api/branches/{id:\\d+}/")]
pub(super) async fn replace(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
    body: web::Json<BranchProps>,
) -> Result<HttpResponse> {
    viewer.require_staff()?;
    let id = *path;
    branch::update_branch(&data.db_pool, id, &body).await?;
    let updated = branch::get_branch(&data.db_pool, id, true).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[actix_web::patch("/api/branches/{id:\\d+}/")]
pub(super) async fn patch(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
    body: web::Json<BranchPatch>,
) -> Result<HttpResponse> {
    viewer.require_staff()?;
    let id = *path;
    let mut props: BranchProps = branch::get_branch(&data.db_pool, id, true).await?.into();
    body.into_inner().apply(&mut props);
    branch::update_branch(&data.db_pool, id, &props).await?;
    let updated = branch::get_branch(&data.db_pool, id, true).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[actix_web::delete("/api/branches/{id:\\d+}/")]
pub(super) async fn destroy(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let user = viewer.require_staff()?;
    branch::delete_branch(&data.db_pool, *path).await?;
    tracing::info!("{} deleted branch {}", user.username, *path);
    Ok(HttpResponse::NoContent().finish())
}

#[actix_web::get("/api/branches/{id:\\d+}/reviews/")]
pub(super) async fn reviews(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let id = *path;
    branch::get_branch(&data.db_pool, id, viewer.is_staff()).await?;
    let found = review::reviews_for_branch(&data.db_pool, id).await?;
    Ok(HttpResponse::Ok().json(found))
}
