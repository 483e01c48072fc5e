use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use super::{paginated, ApiState};
use crate::{
    auth::Viewer,
    data::{Customization, CustomizationType},
    db::customization::{self, CustomizationPatch, CustomizationProps, ListCustomizationProps},
    error::Result,
    query::{parse_choice, ListParams},
};

#[actix_web::get("/api/customizations/")]
pub(super) async fn list(
    req: HttpRequest,
    data: web::Data<ApiState>,
    viewer: Viewer,
    params: web::Query<ListParams>,
) -> Result<HttpResponse> {
    let page = params.page(data.config.page_size)?;
    let props = ListCustomizationProps::from_params(&params, viewer.is_staff())?;
    let paged = customization::list_customizations(&data.db_pool, &props, page).await?;
    Ok(paginated(&req, paged))
}

#[actix_web::post("/api/customizations/")]
pub(super) async fn create(
    data: web::Data<ApiState>,
    viewer: Viewer,
    body: web::Json<CustomizationProps>,
) -> Result<HttpResponse> {
    let user = viewer.require_staff()?;
    let id = customization::add_customization(&data.db_pool, &body).await?;
    tracing::info!("{} created customization {id}", user.username);
    let created = customization::get_customization(&data.db_pool, id, true).await?;
    Ok(HttpResponse::Created().json(created))
}

#[derive(Deserialize)]
pub(super) struct ByTypeQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Active customizations of `?type=`, or all of them when the type is absent.
/// A type no customization can have matches nothing.
#[actix_web::get("/api/customizations/by_type/")]
pub(super) async fn by_type(
    data: web::Data<ApiState>,
    query: web::Query<ByTypeQuery>,
) -> Result<HttpResponse> {
    let kind = match query.kind.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match parse_choice::<CustomizationType>("type", raw) {
            Ok(kind) => Some(kind),
            Err(_) => return Ok(HttpResponse::Ok().json(Vec::<Customization>::new())),
        },
    };
    let found = customization::customizations_by_type(&data.db_pool, kind).await?;
    Ok(HttpResponse::Ok().json(found))
}

#[actix_web::get("/api/customizations/{id:\\d+}/")]
pub(super) async fn retrieve(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let found = customization::get_customization(&data.db_pool, *path, viewer.is_staff()).await?;
    Ok(HttpResponse::Ok().json(found))
}

#[actix_web::put("/api/customizations/{id:\\d+}/")]
pub(super) async fn replace(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
    body: web::Json<CustomizationProps>,
) -> Result<HttpResponse> {
    viewer.require_staff()?;
    let id = *path;
    customization::update_customization(&data.db_pool, id, &body).await?;
    let updated = customization::get_customization(&data.db_pool, id, true).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[actix_web::patch("/api/customizations/{id:\\d+}/")]
pub(super) async fn patch(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
    body: web::Json<CustomizationPatch>,
) -> Result<HttpResponse> {
    viewer.require_staff()?;
    let id = *path;
    let mut props: CustomizationProps =
        customization::get_customization(&data.db_pool, id, true).await?.into();
    body.into_inner().apply(&mut props);
    customization::update_customization(&data.db_pool, id, &props).await?;
    let updated = customization::get_customization(&data.db_pool, id, true).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[actix_web::delete("/api/customizations/{id:\\d+}/")]
pub(super) async fn destroy(
    data: web::Data<ApiState>,
    viewer: Viewer,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let user = viewer.require_staff()?;
    customization::delete_customization(&data.db_pool, *path).await?;
    tracing::info!("{} deleted customization {}", user.username, *path);
    Ok(HttpResponse::NoContent().finish())
}
