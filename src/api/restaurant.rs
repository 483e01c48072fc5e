use actix_web::{web, HttpRequest, HttpResponse};

use super::{paginated, ApiState};
use crate::{
    auth::Viewer,
    db::restaurant::{self, RestaurantInfoProps},
    error::{Error, Result},
    query::ListParams,
};

#[actix_web::get("/api/restaurant-info/")]
pub(super) async fn list(
    req: HttpRequest,
    data: web::Data<ApiState>,
    params: web::Query<ListParams>,
) -> Result<HttpResponse> {
    let page = params.page(data.config.page_size)?;
    let paged = restaurant::list_restaurant_info(&data.db_pool, page).await?;
    Ok(paginated(&req, paged))
}

#[actix_web::get("/api/restaurant-info/current/")]
pub(super) async fn current(data: web::Data<ApiState>) -> Result<HttpResponse> {
    let info = restaurant::current_restaurant_info(&data.db_pool)
        .await?
        .ok_or_else(|| Error::not_found("Restaurant information not configured"))?;
    Ok(HttpResponse::Ok().json(info))
}

/// Creates the record on first use, replaces it afterwards.
#[actix_web::put("/api/restaurant-info/current/")]
pub(super) async fn put_current(
    data: web::Data<ApiState>,
    viewer: Viewer,
    body: web::Json<RestaurantInfoProps>,
) -> Result<HttpResponse> {
    let user = viewer.require_staff()?;
    let created = restaurant::put_restaurant_info(&data.db_pool, &body).await?;
    tracing::info!("{} updated the restaurant information", user.username);
    let info = restaurant::get_restaurant_info(&data.db_pool, restaurant::SINGLETON_ID).await?;
    if created {
        Ok(HttpResponse::Created().json(info))
    } else {
        Ok(HttpResponse::Ok().json(info))
    }
}

#[actix_web::get("/api/restaurant-info/{id:\\d+}/")]
pub(super) async fn retrieve(data: web::Data<ApiState>, path: web::Path<i64>) -> Result<HttpResponse> {
    let info = restaurant::get_restaurant_info(&data.db_pool, *path).await?;
    Ok(HttpResponse::Ok().json(info))
}
