use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use super::{paginated, ApiState};
use crate::{
    auth::Viewer,
    data::ReviewCategory,
    db::review::{self, ListReviewProps, ReviewPatch, ReviewProps, SubmitReviewProps},
    error::Result,
    query::{parse_choice, ListParams},
};

/// Staff see every review, everyone else approved ones only.
#[actix_web::get("/api/reviews/")]
pub(super) async fn list(
    req: HttpRequest,
    data: web::Data<ApiState>,
    viewer: Viewer,
    params: web::Query<ListParams>,
) -> Result<HttpResponse> {
    let page = params.page(data.config.page_size)?;
    let props = ListReviewProps::from_params(&params, !viewer.is_staff())?;
    let paged = review::list_reviews(&data.db_pool, &props, page).await?;
    Ok(paginated(&req, paged))
}

#[actix_web::post("/api/reviews/")]
pub(super) async fn create(
    data: web::Data<ApiState>,
    body: web::Json<ReviewProps>,
) -> Result<HttpResponse> {
    let id = review::add_review(&data.db_pool, &body).await?;
    tracing::info!("review {id} submitted by {}", body.customer_name);
    Ok(HttpResponse::Created().json(json!({
        "message": "Review submitted successfully and is pending approval"
    })))
}

#[derive(Deserialize)]
pub(super) struct ByCategoryQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// An unknown or missing type lists every approved review.
#[actix_web::get("/api/reviews/by_category/")]
pub(super) async fn by_category(
    data: web::Data<ApiState>,
    query: web::Query<ByCategoryQuery>,
) -> Result<HttpResponse> {
    let category = query
        .kind
        .as_deref()
        .and_then(|raw| parse_choice::<ReviewCategory>("type", raw).ok());
    let found = review::approved_reviews_by_category(&data.db_pool, category).await?;
    Ok(HttpResponse::Ok().json(found))
}

#[actix_web::post("/api/reviews/submit/")]
pub(super) async fn submit(
    data: web::Data<ApiState>,
    body: web::Json<SubmitReviewProps>,
) -> Result<HttpResponse> {
    let submitted = review::submit_review(&data.db_pool, body.into_inner()).await?;
    tracing::info!(
        "review {} submitted ({:?})",
        submitted.review_id,
        submitted.category
    );
    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Review submitted successfully! It will be visible after approval.",
        "review_id": submitted.review_id,
        "category": submitted.category,
    })))
}

#[actix_web::get("/api/reviews/{id:\\d+}/")]
pub(super) async fn retrieve(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let found = review::get_review(&data.db_pool, *path, viewer.is_staff()).await?;
    Ok(HttpResponse::Ok().json(found))
}

#[actix_web::put("/api/reviews/{id:\\d+}/")]
pub(super) async fn replace(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
    body: web::Json<ReviewProps>,
) -> Result<HttpResponse> {
    viewer.require_staff()?;
    let id = *path;
    review::update_review(&data.db_pool, id, &body).await?;
    let updated = review::get_review(&data.db_pool, id, true).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[actix_web::patch("/api/reviews/{id:\\d+}/")]
pub(super) async fn patch(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
    body: web::Json<ReviewPatch>,
) -> Result<HttpResponse> {
    viewer.require_staff()?;
    let id = *path;
    let mut props: ReviewProps = review::get_review(&data.db_pool, id, true).await?.into();
    body.into_inner().apply(&mut props);
    review::update_review(&data.db_pool, id, &props).await?;
    let updated = review::get_review(&data.db_pool, id, true).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[actix_web::delete("/api/reviews/{id:\\d+}/")]
pub(super) async fn destroy(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let user = viewer.require_staff()?;
    review::delete_review(&data.db_pool, *path).await?;
    tracing::info!("{} deleted review {}", user.username, *path);
    Ok(HttpResponse::NoContent().finish())
}

async fn moderate(data: &ApiState, viewer: &Viewer, id: i64, approved: bool) -> Result<HttpResponse> {
    let user = viewer.require_staff()?;
    review::set_review_approval(&data.db_pool, id, approved).await?;
    tracing::info!(
        "{} {} review {id}",
        user.username,
        if approved { "approved" } else { "rejected" }
    );
    let updated = review::get_review(&data.db_pool, id, true).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[actix_web::post("/api/reviews/{id:\\d+}/approve/")]
pub(super) async fn approve(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    moderate(&data, &viewer, *path, true).await
}

#[actix_web::post("/api/reviews/{id:\\d+}/reject/")]
pub(super) async fn reject(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    moderate(&data, &viewer, *path, false).await
}
