use std::collections::HashMap;

use actix_web::http::{header, StatusCode};
use actix_web::{web, HttpRequest, HttpResponse};

use crate::auth::{
    authenticate, end_session, establish_session, removal_cookie, require_session,
    session_cookie, session_token, ApiUser, SessionUser,
};
use crate::core::errors::{ApiError, FormErrors};
use crate::core::helpers::parse_id;
use crate::core::query_params::{get_string, parse_query_params};
use crate::feed::{api_page, dashboard_page, Page};
use crate::models::models::{Post, User};
use crate::posts::{create_post, get_post, likers, load_view, toggle_like, validate_post_form, PostForm, PostView};
use crate::projection::{project_feed, project_post, project_post_not_found};
use crate::templates::{html, html_with_status, render_dashboard, render_login, render_post_detail, render_signup};
use crate::users::{create_user, validate_signup, SignupForm};
use crate::AppState;

fn form_params(body: &web::Bytes) -> HashMap<String, String> {
    parse_query_params(&String::from_utf8_lossy(body))
}

fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location.to_string()))
        .finish()
}

/// Only same-site absolute paths are followed after login.
fn safe_next(next: &str) -> &str {
    if next.starts_with('/') && !next.starts_with("//") && !next.starts_with("/\\") {
        next
    } else {
        "/"
    }
}

fn path_post_id(raw: &str) -> Result<u64, ApiError> {
    parse_id(raw).ok_or_else(ApiError::post_not_found)
}

fn dashboard_views(state: &AppState, req: &HttpRequest) -> Result<Page<PostView>, ApiError> {
    let params = parse_query_params(req.query_string());
    dashboard_page(&state.db, &params)?.try_map(|post: Post| load_view(&state.db, post))
}

/// Creates a post for `user`. Validation errors are handed back for the
/// caller to render; everything else propagates.
fn submit_post(state: &AppState, user: &User, body: &web::Bytes) -> Result<Option<FormErrors>, ApiError> {
    let form = PostForm::from_params(&form_params(body));
    let new_post = match validate_post_form(&form) {
        Ok(p) => p,
        Err(ApiError::Validation(errors)) => return Ok(Some(errors)),
        Err(e) => return Err(e),
    };
    create_post(&state.db, user.id, new_post)?;
    Ok(None)
}

// === Feed ===

pub async fn dashboard(
    req: HttpRequest,
    state: web::Data<AppState>,
    SessionUser(user): SessionUser,
) -> Result<HttpResponse, ApiError> {
    let page = dashboard_views(&state, &req)?;
    Ok(html(render_dashboard(&user, &page, &FormErrors::new())?))
}

pub async fn create_from_dashboard(
    req: HttpRequest,
    state: web::Data<AppState>,
    SessionUser(user): SessionUser,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    match submit_post(&state, &user, &body)? {
        None => Ok(see_other("/")),
        Some(errors) => {
            let page = dashboard_views(&state, &req)?;
            Ok(html_with_status(
                StatusCode::BAD_REQUEST,
                render_dashboard(&user, &page, &errors)?,
            ))
        }
    }
}

pub async fn redirect_home() -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, "/"))
        .finish()
}

// === Single post ===

pub async fn post_detail(
    state: web::Data<AppState>,
    SessionUser(user): SessionUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let post = get_post(&state.db, path_post_id(&path)?)?;
    let view = load_view(&state.db, post)?;
    Ok(html(render_post_detail(&user, &view, &FormErrors::new())?))
}

pub async fn create_from_detail(
    state: web::Data<AppState>,
    SessionUser(user): SessionUser,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let post = get_post(&state.db, path_post_id(&path)?)?;
    match submit_post(&state, &user, &body)? {
        None => Ok(see_other("/")),
        Some(errors) => {
            let view = load_view(&state.db, post)?;
            Ok(html_with_status(
                StatusCode::BAD_REQUEST,
                render_post_detail(&user, &view, &errors)?,
            ))
        }
    }
}

pub async fn like(
    state: web::Data<AppState>,
    ApiUser(user): ApiUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let result = toggle_like(&state.db, user.id, path_post_id(&path)?)?;
    Ok(HttpResponse::Ok().json(result))
}

// === Login / logout / signup ===

pub async fn login_page(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    if require_session(&req).is_ok() {
        return Ok(see_other("/"));
    }
    let params = parse_query_params(req.query_string());
    let next = get_string(&params, "next");
    Ok(html(render_login(&FormErrors::new(), "", safe_next(&next))?))
}

pub async fn login(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    if require_session(&req).is_ok() {
        return Ok(see_other("/"));
    }

    let params = form_params(&body);
    let username = get_string(&params, "username").trim().to_string();
    let password = get_string(&params, "password");
    let next = get_string(&params, "next");

    let mut errors = FormErrors::new();
    if username.is_empty() {
        errors.add("username", "This field is required.");
    }
    if password.is_empty() {
        errors.add("password", "This field is required.");
    }

    if errors.is_empty() {
        if let Some(user) = authenticate(&state.db, &username, &password)? {
            let token = establish_session(&state.db, &user)?;
            return Ok(HttpResponse::SeeOther()
                .insert_header((header::LOCATION, safe_next(&next).to_string()))
                .cookie(session_cookie(&token))
                .finish());
        }
        errors.add_non_field("Invalid username or password");
    }

    Ok(html(render_login(&errors, &username, safe_next(&next))?))
}

pub async fn logout(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    if let Some(token) = session_token(&req) {
        end_session(&state.db, &token)?;
        tracing::info!("Session ended");
    }
    Ok(HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/login"))
        .cookie(removal_cookie())
        .finish())
}

pub async fn signup_page() -> Result<HttpResponse, ApiError> {
    Ok(html(render_signup(&SignupForm::default(), &FormErrors::new())?))
}

pub async fn signup(state: web::Data<AppState>, body: web::Bytes) -> Result<HttpResponse, ApiError> {
    let form = SignupForm::from_params(&form_params(&body));

    let result = validate_signup(&form).and_then(|new_user| create_user(&state.db, new_user));
    match result {
        Ok(_) => Ok(see_other("/")),
        Err(ApiError::Validation(errors)) => Ok(html_with_status(
            StatusCode::BAD_REQUEST,
            render_signup(&form, &errors)?,
        )),
        Err(e) => Err(e),
    }
}

// === JSON API ===

pub async fn api_login(state: web::Data<AppState>, body: web::Bytes) -> Result<HttpResponse, ApiError> {
    let creds: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|_| ApiError::Validation(FormErrors::single("body", "Invalid JSON")))?;
    let username = creds["username"].as_str().unwrap_or_default();
    let password = creds["password"].as_str().unwrap_or_default();

    let user = authenticate(&state.db, username, password)?.ok_or(ApiError::Authentication)?;
    let token = establish_session(&state.db, &user)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "token": token,
        "user_id": user.id,
    })))
}

pub async fn api_logout(
    req: HttpRequest,
    state: web::Data<AppState>,
    ApiUser(_user): ApiUser,
) -> Result<HttpResponse, ApiError> {
    if let Some(token) = session_token(&req) {
        end_session(&state.db, &token)?;
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({"message": "Logged out successfully"})))
}

pub async fn api_posts(
    req: HttpRequest,
    state: web::Data<AppState>,
    ApiUser(_user): ApiUser,
) -> Result<HttpResponse, ApiError> {
    let params = parse_query_params(req.query_string());
    let page = api_page(&state.db, &params)?
        .try_map(|post| likers(&state.db, post.id).map(|l| project_post(&post, &l)))?;
    Ok(HttpResponse::Ok().json(project_feed(page)))
}

pub async fn api_post(
    state: web::Data<AppState>,
    ApiUser(_user): ApiUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let Some(post_id) = parse_id(&path) else {
        return Ok(project_post_not_found());
    };
    match get_post(&state.db, post_id) {
        Ok(post) => {
            let likers = likers(&state.db, post.id)?;
            Ok(HttpResponse::Ok().json(project_post(&post, &likers)))
        }
        Err(ApiError::NotFound(_)) => Ok(project_post_not_found()),
        Err(e) => Err(e),
    }
}
