use actix_web::{web, HttpRequest, HttpResponse};

use super::{paginated, ApiState};
use crate::{
    auth::Viewer,
    db::ingredient::{self, IngredientPatch, IngredientProps, ListIngredientProps},
    error::Result,
    query::ListParams,
};

#[actix_web::get("/api/ingredients/")]
pub(super) async fn list(
    req: HttpRequest,
    data: web::Data<ApiState>,
    params: web::Query<ListParams>,
) -> Result<HttpResponse> {
    let page = params.page(data.config.page_size)?;
    let props = ListIngredientProps::from_params(&params);
    let paged = ingredient::list_ingredients(&data.db_pool, &props, page).await?;
    Ok(paginated(&req, paged))
}

#[actix_web::post("/api/ingredients/")]
pub(super) async fn create(
    data: web::Data<ApiState>,
    viewer: Viewer,
    body: web::Json<IngredientProps>,
) -> Result<HttpResponse> {
    let user = viewer.require_staff()?;
    let id = ingredient::add_ingredient(&data.db_pool, &body).await?;
    tracing::info!("{} created ingredient {id}", user.username);
    let created = ingredient::get_ingredient(&data.db_pool, id).await?;
    Ok(HttpResponse::Created().json(created))
}

#[actix_web::get("/api/ingredients/allergens/")]
pub(super) async fn allergens(data: web::Data<ApiState>) -> Result<HttpResponse> {
    let found = ingredient::allergen_ingredients(&data.db_pool).await?;
    Ok(HttpResponse::Ok().json(found))
}

#[actix_web::get("/api/ingredients/{id:\\d+}/")]
pub(super) async fn retrieve(data: web::Data<ApiState>, path: web::Path<i64>) -> Result<HttpResponse> {
    let found = ingredient::get_ingredient(&data.db_pool, *path).await?;
    Ok(HttpResponse::Ok().json(found))
}

#[actix_web::get("/api/ingredients/{id:\\d+}/details/")]
pub(super) async fn details(data: web::Data<ApiState>, path: web::Path<i64>) -> Result<HttpResponse> {
    let found = ingredient::get_ingredient_details(&data.db_pool, *path).await?;
    Ok(HttpResponse::Ok().json(found))
}

#[actix_web::put("/api/ingredients/{id:\\d+}/")]
pub(super) async fn replace(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
    body: web::Json<IngredientProps>,
) -> Result<HttpResponse> {
    viewer.require_staff()?;
    let id = *path;
    ingredient::update_ingredient(&data.db_pool, id, &body).await?;
    let updated = ingredient::get_ingredient(&data.db_pool, id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[actix_web::patch("/api/ingredients/{id:\\d+}/")]
pub(super) async fn patch(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
    body: web::Json<IngredientPatch>,
) -> Result<HttpResponse> {
    viewer.require_staff()?;
    let id = *path;
    let mut props: IngredientProps = ingredient::get_ingredient(&data.db_pool, id).await?.into();
    body.into_inner().apply(&mut props);
    ingredient::update_ingredient(&data.db_pool, id, &props).await?;
    let updated = ingredient::get_ingredient(&data.db_pool, id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[actix_web::delete("/api/ingredients/{id:\\d+}/")]
pub(super) async fn destroy(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let user = viewer.require_staff()?;
    ingredient::delete_ingredient(&data.db_pool, *path).await?;
    tracing::info!("{} deleted ingredient {}", user.username, *path);
    Ok(HttpResponse::NoContent().finish())
}
