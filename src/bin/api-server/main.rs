use actix_cors::Cors;
use actix_web::{
    http::header,
    middleware::{Logger, NormalizePath, TrailingSlash},
    web, App, HttpServer,
};
use anyhow::Context;
use restaurant_menu::{
    api::{self, ApiState},
    auth,
    config::Config,
    db,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    // try_init also forwards the `log` records of actix's Logger
    tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_ansi(true)
        .with_file(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("fail to setup logging: {e}"))?;

    let db_pool = db::connect(&config.database_url, config.db_max_connections)
        .await
        .with_context(|| format!("fail to open database {}", config.database_url))?;

    if let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) {
        auth::ensure_admin(&db_pool, username, password)
            .await
            .context("fail to create the admin account")?;
    }
    let purged = db::session::purge_expired_sessions(&db_pool).await?;
    if purged > 0 {
        tracing::info!("purged {purged} expired sessions");
    }

    let addr = (config.bind_addr.clone(), config.port);
    let origins = config.cors_allowed_origins.clone();
    let state = web::Data::new(ApiState::new(db_pool, config));
    tracing::info!("listening on {}:{}", addr.0, addr.1);

    HttpServer::new(move || {
        let cors = origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allow_any_method()
            .allowed_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
            .supports_credentials()
            .max_age(3600);
        App::new()
            .app_data(state.clone())
            .wrap(NormalizePath::new(TrailingSlash::Always))
            .wrap(cors)
            .wrap(Logger::default())
            .configure(api::configure)
    })
    .bind(addr)?
    .run()
    .await?;
    Ok(())
}
