use actix_web::web;

pub mod auth;
pub mod config;
pub mod feed;
pub mod handlers;
pub mod posts;
pub mod projection;
pub mod static_server;
pub mod templates;
pub mod users;

pub mod core {
    pub mod db;
    pub mod errors;
    pub mod helpers;
    pub mod query_params;
}

pub mod models {
    pub mod models;
}

use crate::config::Settings;
use crate::core::db::Db;

/// Shared by every worker; holds no per-request state.
pub struct AppState {
    pub db: Db,
    pub settings: Settings,
}

impl AppState {
    pub fn new(db: Db, settings: Settings) -> web::Data<Self> {
        web::Data::new(Self { db, settings })
    }
}

/// Registers every route. Protected handlers take a [`auth::SessionUser`]
/// (HTML) or [`auth::ApiUser`] (JSON) argument.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(handlers::dashboard))
        .route("/", web::post().to(handlers::create_from_dashboard))
        .route("/post/", web::get().to(handlers::redirect_home))
        .route("/post/{id}", web::get().to(handlers::post_detail))
        .route("/post/{id}", web::post().to(handlers::create_from_detail))
        .route("/post/{id}/like", web::post().to(handlers::like))
        .route("/post/{id}/like/", web::post().to(handlers::like))
        .route("/login", web::get().to(handlers::login_page))
        .route("/login", web::post().to(handlers::login))
        .route("/logout", web::post().to(handlers::logout))
        .route("/logout", web::get().to(handlers::logout))
        .route("/signup", web::get().to(handlers::signup_page))
        .route("/signup", web::post().to(handlers::signup))
        .route("/api/login", web::post().to(handlers::api_login))
        .route("/api/logout", web::post().to(handlers::api_logout))
        .route("/api/posts", web::get().to(handlers::api_posts))
        .route("/api/posts/{id}", web::get().to(handlers::api_post))
        .route("/static/{file:.*}", web::get().to(static_server::serve_static));
}
