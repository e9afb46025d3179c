use std::future::{ready, Ready};

use actix_web::cookie::{Cookie, SameSite};
use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{web, FromRequest, HttpRequest};
use uuid::Uuid;

use crate::config::*;
use crate::core::db::Db;
use crate::core::errors::ApiError;
use crate::core::helpers::{dummy_verify, now};
use crate::models::models::{SessionData, User, UserId};
use crate::users::{find_by_username, get_user};
use crate::AppState;

/// Checks credentials. Unknown usernames, wrong passwords and banned
/// accounts all come back as `None`.
pub fn authenticate(db: &Db, username: &str, raw_password: &str) -> Result<Option<User>, ApiError> {
    match find_by_username(db, username)? {
        Some(user) => {
            if user.verify_password(raw_password) && user.is_active() {
                Ok(Some(user))
            } else {
                tracing::warn!("Failed login for existing user");
                Ok(None)
            }
        }
        None => {
            dummy_verify(raw_password);
            tracing::warn!("Failed login for unknown user");
            Ok(None)
        }
    }
}

/// Opens a session for `user` and stamps their last login.
pub fn establish_session(db: &Db, user: &User) -> Result<String, ApiError> {
    let token = Uuid::new_v4().to_string();
    let user_id = user.id;

    db.transaction(|tx| {
        let key = user_key(user_id);
        let mut stored = tx
            .get_json::<User>(&key)?
            .ok_or_else(ApiError::user_not_found)?;
        let created_at = now();
        stored.last_login = Some(created_at);
        tx.set_json(&key, &stored)?;
        tx.set_json(&session_key(&token), &SessionData { user_id, created_at })?;
        Ok::<_, ApiError>(())
    })?;

    tracing::info!("User {} logged in", user);
    Ok(token)
}

pub fn end_session(db: &Db, token: &str) -> Result<(), ApiError> {
    db.transaction(|tx| {
        tx.delete(&session_key(token));
        Ok::<_, ApiError>(())
    })
}

/// The user a session token belongs to, if the session is known and not
/// older than `session_hours`. Expired sessions are removed.
pub fn resolve_session(db: &Db, token: &str, session_hours: i64) -> Result<Option<UserId>, ApiError> {
    if Uuid::parse_str(token).is_err() {
        return Ok(None);
    }
    let Some(data) = db.get_json::<SessionData>(&session_key(token))? else {
        return Ok(None);
    };

    let age_hours = (now() - data.created_at).num_hours();
    if age_hours >= session_hours {
        tracing::warn!(user_id = data.user_id, "Rejected expired session");
        end_session(db, token)?;
        return Ok(None);
    }
    Ok(Some(data.user_id))
}

/// Session token from the `sessionid` cookie or a bearer header.
pub fn session_token(req: &HttpRequest) -> Option<String> {
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
}

pub fn session_cookie(token: &str) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, token.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish()
}

pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, "");
    cookie.set_path("/");
    cookie.make_removal();
    cookie
}

pub fn app_state(req: &HttpRequest) -> Result<&web::Data<AppState>, ApiError> {
    req.app_data::<web::Data<AppState>>()
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("Application state is not configured")))
}

/// The guard every protected route goes through: resolves the request's
/// session to an active user or fails with `Unauthorized`.
pub fn require_session(req: &HttpRequest) -> Result<User, ApiError> {
    let state = app_state(req)?;
    let token = session_token(req).ok_or(ApiError::Unauthorized)?;
    let user_id = resolve_session(&state.db, &token, state.settings.session_hours)?
        .ok_or(ApiError::Unauthorized)?;

    match get_user(&state.db, user_id)? {
        Some(user) if user.is_active() => Ok(user),
        _ => {
            tracing::warn!(user_id, "Session user missing or banned");
            Err(ApiError::Unauthorized)
        }
    }
}

/// Authenticated user of an HTML route. Without a session the request is
/// redirected to the login page.
#[derive(Debug, Clone)]
pub struct SessionUser(pub User);

impl FromRequest for SessionUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let result = require_session(req).map(SessionUser).map_err(|e| match e {
            ApiError::Unauthorized => ApiError::LoginRequired {
                next: req
                    .uri()
                    .path_and_query()
                    .map(|pq| pq.as_str().to_string())
                    .unwrap_or_else(|| req.path().to_string()),
            },
            other => other,
        });
        ready(result)
    }
}

/// Authenticated user of a JSON route. Without a session the request
/// fails with 401.
#[derive(Debug, Clone)]
pub struct ApiUser(pub User);

impl FromRequest for ApiUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(require_session(req).map(ApiUser))
    }
}
