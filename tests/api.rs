use actix_web::{
    http::{header, StatusCode},
    middleware::{NormalizePath, TrailingSlash},
    test, web, App,
};
use restaurant_menu::{
    api::{self, ApiState},
    auth::{self, SESSION_COOKIE},
    config::Config,
    db::{
        self,
        category::{self, CategoryPropsBuilder},
    },
};
use serde_json::{json, Value};
use tempfile::TempDir;

const ADMIN: &str = "admin";
const ADMIN_PASSWORD: &str = "correct horse";

async fn state() -> (web::Data<ApiState>, TempDir) {
    let media = tempfile::tempdir().unwrap();
    let pool = db::connect_in_memory().await.unwrap();
    auth::ensure_admin(&pool, ADMIN, ADMIN_PASSWORD).await.unwrap();
    let state = ApiState::new(pool, Config::for_tests(media.path()));
    (web::Data::new(state), media)
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data($state.clone())
                .wrap(NormalizePath::new(TrailingSlash::Always))
                .configure(api::configure),
        )
        .await
    };
}

macro_rules! session {
    ($app:expr, $uri:expr, $body:expr, $status:expr) => {{
        let req = test::TestRequest::post().uri($uri).set_json($body).to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), $status);
        resp.response()
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE)
            .expect("session cookie")
            .into_owned()
    }};
}

macro_rules! login {
    ($app:expr, $username:expr, $password:expr) => {
        session!(
            $app,
            "/api/auth/login/",
            json!({ "username": $username, "password": $password }),
            StatusCode::OK
        )
    };
}

macro_rules! register {
    ($app:expr, $username:expr) => {
        session!(
            $app,
            "/api/auth/register/",
            json!({ "username": $username, "password": "s3cret-pass", "email": "guest@example.com" }),
            StatusCode::CREATED
        )
    };
}

#[actix_web::test]
async fn login_sets_a_session_cookie() {
    let (state, _media) = state().await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/auth/login/")
        .set_json(json!({ "username": ADMIN, "password": "wrong password" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Invalid credentials");

    let req = test::TestRequest::post()
        .uri("/api/auth/login/")
        .set_json(json!({ "username": ADMIN }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let cookie = login!(app, ADMIN, ADMIN_PASSWORD);
    assert!(cookie.http_only().unwrap_or(false));

    let req = test::TestRequest::get()
        .uri("/api/auth/user/")
        .cookie(cookie.clone())
        .to_request();
    let user: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(user["username"], ADMIN);
    assert_eq!(user["is_admin"], true);
    assert!(user.get("password_hash").is_none());

    let req = test::TestRequest::post()
        .uri("/api/auth/logout/")
        .cookie(cookie.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // the old cookie no longer resolves to a session
    let req = test::TestRequest::get()
        .uri("/api/auth/user/")
        .cookie(cookie)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn register_rejects_taken_names_and_short_passwords() {
    let (state, _media) = state().await;
    let app = app!(state);

    for (body, message) in [
        (json!({ "username": ADMIN, "password": "long enough" }), "Username already exists"),
        (
            json!({ "username": "newbie", "password": "short" }),
            "Password must be at least 8 characters long.",
        ),
        (json!({ "username": "newbie" }), "Please provide username and password"),
    ] {
        let req = test::TestRequest::post()
            .uri("/api/auth/register/")
            .set_json(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], message);
    }

    let cookie = register!(app, "newbie");
    let req = test::TestRequest::get()
        .uri("/api/auth/user/")
        .cookie(cookie)
        .to_request();
    let user: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(user["username"], "newbie");
    assert_eq!(user["is_admin"], false);
}

#[actix_web::test]
async fn changing_password_revokes_other_sessions() {
    let (state, _media) = state().await;
    let app = app!(state);

    let here = register!(app, "diner");
    let elsewhere = login!(app, "diner", "s3cret-pass");

    let req = test::TestRequest::post()
        .uri("/api/auth/change-password/")
        .cookie(here.clone())
        .set_json(json!({
            "current_password": "s3cret-pass",
            "new_password": "even-better",
            "confirm_password": "not the same",
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/auth/change-password/")
        .cookie(here.clone())
        .set_json(json!({
            "current_password": "s3cret-pass",
            "new_password": "even-better",
            "confirm_password": "even-better",
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get().uri("/api/auth/user/").cookie(here).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    let req = test::TestRequest::get()
        .uri("/api/auth/user/")
        .cookie(elsewhere)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    login!(app, "diner", "even-better");
}

#[actix_web::test]
async fn catalog_writes_need_staff() {
    let (state, _media) = state().await;
    let app = app!(state);
    let body = json!({ "name": "Desserts" });

    let req = test::TestRequest::post()
        .uri("/api/categories/")
        .set_json(&body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let guest = register!(app, "guest");
    let req = test::TestRequest::post()
        .uri("/api/categories/")
        .cookie(guest)
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["error"], "You do not have permission to perform this action.");

    let admin = login!(app, ADMIN, ADMIN_PASSWORD);
    let req = test::TestRequest::post()
        .uri("/api/categories/")
        .cookie(admin.clone())
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    assert_eq!(created["name"], "Desserts");
    assert_eq!(created["is_active"], true);

    let req = test::TestRequest::post()
        .uri("/api/categories/")
        .cookie(admin)
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn lists_are_paginated() {
    let (state, _media) = state().await;
    for i in 0..25 {
        let props = CategoryPropsBuilder::default()
            .name(format!("Category {i:02}"))
            .display_order(i)
            .build()
            .unwrap();
        category::add_category(&state.db_pool, &props).await.unwrap();
    }
    let app = app!(state);

    // no trailing slash, NormalizePath adds it
    let req = test::TestRequest::get().uri("/api/categories").to_request();
    let first: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(first["count"], 25);
    assert_eq!(first["results"].as_array().unwrap().len(), 20);
    assert_eq!(first["results"][0]["name"], "Category 00");
    assert!(first["previous"].is_null());
    let next = first["next"].as_str().unwrap();
    assert!(next.ends_with("/api/categories/?page=2"), "{next}");

    let req = test::TestRequest::get().uri("/api/categories/?page=2").to_request();
    let second: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(second["results"].as_array().unwrap().len(), 5);
    assert!(second["next"].is_null());
    assert!(second["previous"].as_str().unwrap().ends_with("/api/categories/"));

    let req = test::TestRequest::get().uri("/api/categories/?page=3").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get()
        .uri("/api/categories/?search=category%2024")
        .to_request();
    let found: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(found["count"], 1);
}

#[actix_web::test]
async fn submitted_reviews_show_after_approval() {
    let (state, _media) = state().await;
    let app = app!(state);
    let admin = login!(app, ADMIN, ADMIN_PASSWORD);

    let req = test::TestRequest::post()
        .uri("/api/categories/")
        .cookie(admin.clone())
        .set_json(json!({ "name": "Soups" }))
        .to_request();
    let category: Value = test::call_and_read_body_json(&app, req).await;
    let req = test::TestRequest::post()
        .uri("/api/menu-items/")
        .cookie(admin.clone())
        .set_json(json!({
            "name": "Tomato soup",
            "description": "Slow roasted",
            "category": category["id"],
            "price": "6.50",
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let item: Value = test::read_body_json(resp).await;
    assert_eq!(item["price"], "6.50");
    let item_id = item["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri("/api/reviews/submit/")
        .set_json(json!({ "category": "product", "customer_name": "Ana", "rating": 4 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["error"], "menu_item_id is required for product reviews");

    let req = test::TestRequest::post()
        .uri("/api/reviews/submit/")
        .set_json(json!({
            "category": "product",
            "menu_item_id": item_id.to_string(),
            "customer_name": "Ana",
            "rating": "4",
            "comment": "Lovely",
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let submitted: Value = test::read_body_json(resp).await;
    assert_eq!(submitted["success"], true);
    assert_eq!(submitted["category"], "product");
    let review_id = submitted["review_id"].as_i64().unwrap();

    let req = test::TestRequest::get().uri("/api/reviews/").to_request();
    let public: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(public["count"], 0);
    let req = test::TestRequest::get()
        .uri(&format!("/api/reviews/{review_id}/"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::post()
        .uri(&format!("/api/reviews/{review_id}/approve/"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
    let req = test::TestRequest::post()
        .uri(&format!("/api/reviews/{review_id}/approve/"))
        .cookie(admin)
        .to_request();
    let approved: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(approved["is_approved"], true);
    assert_eq!(approved["menu_item_name"], "Tomato soup");

    let req = test::TestRequest::get().uri("/api/reviews/").to_request();
    let public: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(public["count"], 1);

    let req = test::TestRequest::get()
        .uri(&format!("/api/menu-items/{item_id}/"))
        .to_request();
    let detail: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(detail["average_rating"], 4.0);
    assert_eq!(detail["review_count"], 1);
    assert_eq!(detail["reviews"][0]["customer_name"], "Ana");
}

#[actix_web::test]
async fn restaurant_info_is_created_then_replaced() {
    let (state, _media) = state().await;
    let app = app!(state);
    let admin = login!(app, ADMIN, ADMIN_PASSWORD);

    let req = test::TestRequest::get()
        .uri("/api/restaurant-info/current/")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["error"], "Restaurant information not configured");

    let mut info = json!({
        "name": "Trattoria",
        "description": "Family run",
        "phone": "+1 555 0100",
        "email": "hello@trattoria.test",
        "address": "1 Main St",
        "opening_hours": "Mon-Sun 12-22",
        "tax_rate": "8.25",
    });
    let req = test::TestRequest::put()
        .uri("/api/restaurant-info/current/")
        .cookie(admin.clone())
        .set_json(&info)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    info["name"] = json!("Trattoria Nova");
    let req = test::TestRequest::put()
        .uri("/api/restaurant-info/current/")
        .cookie(admin)
        .set_json(&info)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/api/restaurant-info/current/")
        .to_request();
    let current: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(current["name"], "Trattoria Nova");
    assert_eq!(current["currency_symbol"], "€");
    assert_eq!(current["tax_rate"], "8.25");
}

fn multipart(boundary: &str, category: Option<&str>, image: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(category) = category {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"category\"\r\n\r\n{category}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, bytes)) = image {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

#[actix_web::test]
async fn uploads_land_under_the_media_root() {
    let (state, media) = state().await;
    let app = app!(state);
    let boundary = "menu-upload-boundary";
    let content_type = format!("multipart/form-data; boundary={boundary}");
    let png: &[u8] = b"\x89PNG\r\n\x1a\nnot really an image";

    let req = test::TestRequest::post()
        .uri("/api/upload-image/")
        .insert_header((header::CONTENT_TYPE, content_type.clone()))
        .set_payload(multipart(boundary, Some("menu_item"), Some(("soup.PNG", png))))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let guest = register!(app, "photographer");

    let req = test::TestRequest::post()
        .uri("/api/upload-image/")
        .cookie(guest.clone())
        .insert_header((header::CONTENT_TYPE, content_type.clone()))
        .set_payload(multipart(boundary, Some("menu_item"), None))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["error"], "No image file provided");

    let req = test::TestRequest::post()
        .uri("/api/upload-image/")
        .cookie(guest.clone())
        .insert_header((header::CONTENT_TYPE, content_type.clone()))
        .set_payload(multipart(boundary, Some("menu_item"), Some(("soup.PNG", png))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let uploaded: Value = test::read_body_json(resp).await;
    let file_path = uploaded["file_path"].as_str().unwrap();
    assert!(file_path.starts_with("menu_items/menu_item_"), "{file_path}");
    assert!(file_path.ends_with(".png"), "{file_path}");
    assert!(uploaded["image_url"]
        .as_str()
        .unwrap()
        .ends_with(&format!("/media/{file_path}")));
    let stored = std::fs::read(media.path().join(file_path)).unwrap();
    assert_eq!(stored, png);

    // no category falls back to the general bucket
    let req = test::TestRequest::post()
        .uri("/api/upload-image/")
        .cookie(guest)
        .insert_header((header::CONTENT_TYPE, content_type))
        .set_payload(multipart(boundary, None, Some(("logo.jpg", png))))
        .to_request();
    let uploaded: Value = test::call_and_read_body_json(&app, req).await;
    assert!(uploaded["file_path"]
        .as_str()
        .unwrap()
        .starts_with("generals/general_"));
}

#[actix_web::test]
async fn customizations_by_type() {
    let (state, _media) = state().await;
    let app = app!(state);
    let admin = login!(app, ADMIN, ADMIN_PASSWORD);

    for body in [
        json!({ "name": "Large", "customization_type": "size", "price_modifier": "1.50" }),
        json!({ "name": "Aioli", "customization_type": "sauce", "price_modifier": 0.5 }),
        json!({ "name": "Old sauce", "customization_type": "sauce", "is_active": false }),
    ] {
        let req = test::TestRequest::post()
            .uri("/api/customizations/")
            .cookie(admin.clone())
            .set_json(body)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);
    }

    let req = test::TestRequest::get()
        .uri("/api/customizations/by_type/?type=sauce")
        .to_request();
    let sauces: Value = test::call_and_read_body_json(&app, req).await;
    let sauces = sauces.as_array().unwrap();
    assert_eq!(sauces.len(), 1);
    assert_eq!(sauces[0]["name"], "Aioli");
    assert_eq!(sauces[0]["price_modifier"], "0.50");

    let req = test::TestRequest::get()
        .uri("/api/customizations/by_type/")
        .to_request();
    let all: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let req = test::TestRequest::get()
        .uri("/api/customizations/by_type/?type=bogus")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let none: Value = test::read_body_json(resp).await;
    assert_eq!(none, json!([]));
}

#[actix_web::test]
async fn inactive_categories_are_staff_only() {
    let (state, _media) = state().await;
    let app = app!(state);
    let admin = login!(app, ADMIN, ADMIN_PASSWORD);

    let req = test::TestRequest::post()
        .uri("/api/categories/")
        .cookie(admin.clone())
        .set_json(json!({ "name": "Seasonal", "is_active": false }))
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["is_active"], false);

    let req = test::TestRequest::get()
        .uri(&format!("/api/categories/{id}/"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    let req = test::TestRequest::get().uri("/api/categories/").to_request();
    let public: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(public["count"], 0);

    let req = test::TestRequest::get()
        .uri("/api/categories/")
        .cookie(admin.clone())
        .to_request();
    let staff: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(staff["count"], 1);

    let req = test::TestRequest::patch()
        .uri(&format!("/api/categories/{id}/"))
        .cookie(admin)
        .set_json(json!({ "is_active": true }))
        .to_request();
    let reactivated: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(reactivated["is_active"], true);

    let req = test::TestRequest::get()
        .uri(&format!("/api/categories/{id}/"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
}
