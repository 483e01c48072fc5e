use actix_web::{web, HttpRequest, HttpResponse};

use super::{paginated, ApiState};
use crate::{
    auth::Viewer,
    data::MenuItemSummary,
    db::{
        category::{self, CategoryPatch, CategoryProps, ListCategoryProps},
        menu_item,
    },
    error::Result,
    query::ListParams,
};

#[actix_web::get("/api/categories/")]
pub(super) async fn list(
    req: HttpRequest,
    data: web::Data<ApiState>,
    viewer: Viewer,
    params: web::Query<ListParams>,
) -> Result<HttpResponse> {
    let page = params.page(data.config.page_size)?;
    let props = ListCategoryProps::from_params(&params, viewer.is_staff());
    let paged = category::list_categories(&data.db_pool, &props, page).await?;
    Ok(paginated(&req, paged))
}

#[actix_web::post("/api/categories/")]
pub(super) async fn create(
    data: web::Data<ApiState>,
    viewer: Viewer,
    body: web::Json<CategoryProps>,
) -> Result<HttpResponse> {
    let user = viewer.require_staff()?;
    let id = category::add_category(&data.db_pool, &body).await?;
    tracing::info!("{} created category {id}", user.username);
    let created = category::get_category(&data.db_pool, id, true).await?;
    Ok(HttpResponse::Created().json(created))
}

#[actix_web::get("/api/categories/{id:\\d+}/")]
pub(super) async fn retrieve(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let found = category::get_category(&data.db_pool, *path, viewer.is_staff()).await?;
    Ok(HttpResponse::Ok().json(found))
}

#[actix_web::put("/api/categories/{id:\\d+}/")]
pub(super) async fn replace(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
    body: web::Json<CategoryProps>,
) -> Result<HttpResponse> {
    viewer.require_staff()?;
    let id = *path;
    category::get_category(&data.db_pool, id, true).await?;
    category::update_category(&data.db_pool, id, &body).await?;
    let updated = category::get_category(&data.db_pool, id, true).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[actix_web::patch("/api/categories/{id:\\d+}/")]
pub(super) async fn patch(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
    body: web::Json<CategoryPatch>,
) -> Result<HttpResponse> {
    viewer.require_staff()?;
    let id = *path;
    let mut props: CategoryProps = category::get_category(&data.db_pool, id, true).await?.into();
    body.into_inner().apply(&mut props);
    category::update_category(&data.db_pool, id, &props).await?;
    let updated = category::get_category(&data.db_pool, id, true).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[actix_web::delete("/api/categories/{id:\\d+}/")]
pub(super) async fn destroy(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let user = viewer.require_staff()?;
    category::delete_category(&data.db_pool, *path).await?;
    tracing::info!("{} deleted category {}", user.username, *path);
    Ok(HttpResponse::NoContent().finish())
}

/// Available items of the category.
#[actix_web::get("/api/categories/{id:\\d+}/items/")]
pub(super) async fn items(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let id = *path;
    category::get_category(&data.db_pool, id, viewer.is_staff()).await?;
    let items: Vec<MenuItemSummary> = menu_item::items_in_category(&data.db_pool, id)
        .await?
        .into_iter()
        .map(MenuItemSummary::from)
        .collect();
    Ok(HttpResponse::Ok().json(items))
}
