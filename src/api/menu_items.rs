use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use super::{paginated, ApiState};
use crate::{
    auth::Viewer,
    data::{MenuItem, MenuItemSummary},
    db::{
        menu_item::{self, ItemIngredientProps, ListMenuItemProps, MenuItemPatch, MenuItemProps},
        review,
    },
    error::Result,
    query::ListParams,
};

fn summaries(items: Vec<MenuItem>) -> Vec<MenuItemSummary> {
    items.into_iter().map(MenuItemSummary::from).collect()
}

#[actix_web::get("/api/menu-items/")]
pub(super) async fn list(
    req: HttpRequest,
    data: web::Data<ApiState>,
    params: web::Query<ListParams>,
) -> Result<HttpResponse> {
    let page = params.page(data.config.page_size)?;
    let props = ListMenuItemProps::from_params(&params)?;
    let paged = menu_item::list_menu_items(&data.db_pool, &props, page).await?;
    Ok(paginated(&req, paged.map(MenuItemSummary::from)))
}

#[actix_web::post("/api/menu-items/")]
pub(super) async fn create(
    data: web::Data<ApiState>,
    viewer: Viewer,
    body: web::Json<MenuItemProps>,
) -> Result<HttpResponse> {
    let user = viewer.require_staff()?;
    let id = menu_item::add_menu_item(&data.db_pool, &body).await?;
    tracing::info!("{} created menu item {id}", user.username);
    let created = menu_item::get_menu_item(&data.db_pool, id).await?;
    Ok(HttpResponse::Created().json(MenuItemSummary::from(created)))
}

#[actix_web::get("/api/menu-items/featured/")]
pub(super) async fn featured(data: web::Data<ApiState>) -> Result<HttpResponse> {
    let items = menu_item::featured_menu_items(&data.db_pool).await?;
    Ok(HttpResponse::Ok().json(summaries(items)))
}

#[derive(Deserialize)]
pub(super) struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[actix_web::get("/api/menu-items/search/")]
pub(super) async fn search(
    data: web::Data<ApiState>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse> {
    let items = menu_item::search_menu_items(&data.db_pool, &query.q).await?;
    Ok(HttpResponse::Ok().json(summaries(items)))
}

#[actix_web::get("/api/menu-items/{id:\\d+}/")]
pub(super) async fn retrieve(data: web::Data<ApiState>, path: web::Path<i64>) -> Result<HttpResponse> {
    let detail = menu_item::get_menu_item_detail(&data.db_pool, *path).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[actix_web::put("/api/menu-items/{id:\\d+}/")]
pub(super) async fn replace(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
    body: web::Json<MenuItemProps>,
) -> Result<HttpResponse> {
    viewer.require_staff()?;
    let id = *path;
    menu_item::get_menu_item(&data.db_pool, id).await?;
    menu_item::update_menu_item(&data.db_pool, id, &body).await?;
    let updated = menu_item::get_menu_item_detail(&data.db_pool, id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[actix_web::patch("/api/menu-items/{id:\\d+}/")]
pub(super) async fn patch(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
    body: web::Json<MenuItemPatch>,
) -> Result<HttpResponse> {
    viewer.require_staff()?;
    let id = *path;
    let mut props: MenuItemProps = menu_item::get_menu_item(&data.db_pool, id).await?.into();
    body.into_inner().apply(&mut props);
    menu_item::update_menu_item(&data.db_pool, id, &props).await?;
    let updated = menu_item::get_menu_item_detail(&data.db_pool, id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[actix_web::delete("/api/menu-items/{id:\\d+}/")]
pub(super) async fn destroy(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let user = viewer.require_staff()?;
    menu_item::delete_menu_item(&data.db_pool, *path).await?;
    tracing::info!("{} deleted menu item {}", user.username, *path);
    Ok(HttpResponse::NoContent().finish())
}

#[actix_web::get("/api/menu-items/{id:\\d+}/reviews/")]
pub(super) async fn reviews(data: web::Data<ApiState>, path: web::Path<i64>) -> Result<HttpResponse> {
    let id = *path;
    menu_item::get_menu_item(&data.db_pool, id).await?;
    let reviews = review::reviews_for_menu_item(&data.db_pool, id, None).await?;
    Ok(HttpResponse::Ok().json(reviews))
}

#[actix_web::post("/api/menu-items/{id:\\d+}/ingredients/")]
pub(super) async fn add_ingredient(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
    body: web::Json<ItemIngredientProps>,
) -> Result<HttpResponse> {
    viewer.require_staff()?;
    let line = menu_item::add_item_ingredient(&data.db_pool, *path, &body).await?;
    Ok(HttpResponse::Created().json(line))
}

#[actix_web::delete("/api/menu-items/{id:\\d+}/ingredients/{ingredient_id:\\d+}/")]
pub(super) async fn remove_ingredient(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse> {
    viewer.require_staff()?;
    let (id, ingredient_id) = path.into_inner();
    menu_item::remove_item_ingredient(&data.db_pool, id, ingredient_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Deserialize)]
pub(super) struct LinkBody {
    customization_id: i64,
}

#[actix_web::post("/api/menu-items/{id:\\d+}/customizations/")]
pub(super) async fn link_customization(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
    body: web::Json<LinkBody>,
) -> Result<HttpResponse> {
    viewer.require_staff()?;
    menu_item::link_customization(&data.db_pool, *path, body.customization_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[actix_web::delete("/api/menu-items/{id:\\d+}/customizations/{customization_id:\\d+}/")]
pub(super) async fn unlink_customization(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse> {
    viewer.require_staff()?;
    let (id, customization_id) = path.into_inner();
    menu_item::unlink_customization(&data.db_pool, id, customization_id).await?;
    Ok(HttpResponse::NoContent().finish())
}
