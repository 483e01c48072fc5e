//! The HTTP surface. Every route lives under `/api/` and ends in a slash.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{config::Config, error::Error, query::Paged, storage::MediaStore};

mod auth;
mod branches;
mod categories;
mod customizations;
mod ingredients;
mod menu_items;
mod restaurant;
mod reviews;
mod upload;

pub struct ApiState {
    pub db_pool: SqlitePool,
    pub config: Config,
    pub media: MediaStore,
}

impl ApiState {
    pub fn new(db_pool: SqlitePool, config: Config) -> Self {
        let media = MediaStore::new(
            config.media_root.clone(),
            config.media_url.clone(),
            config.max_upload_bytes,
        );
        Self {
            db_pool,
            config,
            media,
        }
    }
}

/// Registers the extractor error handlers and every route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default().error_handler(|err, _| Error::Invalid(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default().error_handler(|err, _| Error::Invalid(err.to_string()).into()),
    )
    .app_data(web::PathConfig::default().error_handler(|_, _| Error::not_found("Not found.").into()));

    cfg.service(categories::list)
        .service(categories::create)
        .service(categories::retrieve)
        .service(categories::replace)
        .service(categories::patch)
        .service(categories::destroy)
        .service(categories::items);

    cfg.service(menu_items::list)
        .service(menu_items::create)
        .service(menu_items::featured)
        .service(menu_items::search)
        .service(menu_items::retrieve)
        .service(menu_items::replace)
        .service(menu_items::patch)
        .service(menu_items::destroy)
        .service(menu_items::reviews)
        .service(menu_items::add_ingredient)
        .service(menu_items::remove_ingredient)
        .service(menu_items::link_customization)
        .service(menu_items::unlink_customization);

    cfg.service(ingredients::list)
        .service(ingredients::create)
        .service(ingredients::allergens)
        .service(ingredients::retrieve)
        .service(ingredients::details)
        .service(ingredients::replace)
        .service(ingredients::patch)
        .service(ingredients::destroy);

    cfg.service(customizations::list)
        .service(customizations::create)
        .service(customizations::by_type)
        .service(customizations::retrieve)
        .service(customizations::replace)
        .service(customizations::patch)
        .service(customizations::destroy);

    cfg.service(reviews::list)
        .service(reviews::create)
        .service(reviews::by_category)
        .service(reviews::submit)
        .service(reviews::retrieve)
        .service(reviews::replace)
        .service(reviews::patch)
        .service(reviews::destroy)
        .service(reviews::approve)
        .service(reviews::reject);

    cfg.service(branches::list)
        .service(branches::create)
        .service(branches::retrieve)
        .service(branches::replace)
        .service(branches::patch)
        .service(branches::destroy)
        .service(branches::reviews);

    cfg.service(restaurant::list)
        .service(restaurant::current)
        .service(restaurant::put_current)
        .service(restaurant::retrieve);

    cfg.service(auth::login)
        .service(auth::logout)
        .service(auth::current_user)
        .service(auth::register)
        .service(auth::update_profile)
        .service(auth::change_password);

    cfg.service(upload::upload_image);
}

#[derive(Serialize)]
struct PageResp<T> {
    count: i64,
    next: Option<String>,
    previous: Option<String>,
    results: Vec<T>,
}

/// `scheme://host` as the client addressed us.
pub(crate) fn origin(req: &HttpRequest) -> String {
    let info = req.connection_info();
    format!("{}://{}", info.scheme(), info.host())
}

/// The current URL with its `page` parameter replaced. Page 1 has none.
fn page_url(req: &HttpRequest, page: u32) -> String {
    let mut pairs: Vec<String> = req
        .query_string()
        .split('&')
        .filter(|pair| !pair.is_empty() && *pair != "page" && !pair.starts_with("page="))
        .map(str::to_string)
        .collect();
    if page > 1 {
        pairs.push(format!("page={page}"));
    }
    let mut url = format!("{}{}", origin(req), req.path());
    if !pairs.is_empty() {
        url.push('?');
        url.push_str(&pairs.join("&"));
    }
    url
}

/// The `{count, next, previous, results}` envelope of list endpoints.
pub(crate) fn paginated<T: Serialize>(req: &HttpRequest, paged: Paged<T>) -> HttpResponse {
    let number = paged.page.number;
    let next = paged
        .page
        .has_next(paged.count)
        .then(|| page_url(req, number + 1));
    let previous = (number > 1).then(|| page_url(req, number - 1));
    HttpResponse::Ok().json(PageResp {
        count: paged.count,
        next,
        previous,
        results: paged.items,
    })
}
