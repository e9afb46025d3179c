use std::collections::BTreeMap;
use std::fmt;

use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// Field-scoped and form-wide validation messages, keyed by form field name.
#[derive(Debug, Default, Clone, Serialize, PartialEq)]
pub struct FormErrors {
    pub fields: BTreeMap<String, Vec<String>>,
    pub non_field: Vec<String>,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.non_field.push(message.into());
    }

    pub fn field(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_field(&self, name: &str) -> bool {
        !self.field(name).is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.non_field.is_empty()
    }

    /// `Ok(())` when nothing was recorded, otherwise a validation error.
    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }
}

impl fmt::Display for FormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.non_field.clone();
        for (field, messages) in &self.fields {
            for msg in messages {
                parts.push(format!("{}: {}", field, msg));
            }
        }
        write!(f, "{}", parts.join("; "))
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation failed: {0}")]
    Validation(FormErrors),

    #[error("Invalid username or password")]
    Authentication,

    #[error("Unauthorized")]
    Unauthorized,

    /// Interactive clients without a session are sent to the login page.
    #[error("Login required")]
    LoginRequired { next: String },

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Internal Error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn post_not_found() -> Self {
        ApiError::NotFound("Post not found".to_string())
    }

    pub fn user_not_found() -> Self {
        ApiError::NotFound("User not found".to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(err.into())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Authentication | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::LoginRequired { .. } => StatusCode::FOUND,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::Validation(errors) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Validation failed",
                "errors": errors.fields,
                "non_field_errors": errors.non_field,
            })),
            ApiError::Authentication => HttpResponse::Unauthorized()
                .json(serde_json::json!({"error": "Invalid username or password"})),
            ApiError::Unauthorized => {
                HttpResponse::Unauthorized().json(serde_json::json!({"error": "Unauthorized"}))
            }
            ApiError::LoginRequired { next } => HttpResponse::Found()
                .insert_header((
                    header::LOCATION,
                    format!("/login?next={}", urlencoding::encode(next)),
                ))
                .finish(),
            ApiError::NotFound(msg) => {
                HttpResponse::NotFound().json(serde_json::json!({"error": msg}))
            }
            ApiError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                HttpResponse::InternalServerError()
                    .json(serde_json::json!({"error": "Internal server error"}))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn empty_form_errors_are_ok() {
        assert!(FormErrors::new().into_result().is_ok());
    }

    #[test]
    fn recorded_errors_become_validation_error() {
        let mut errors = FormErrors::new();
        errors.add("username", "Username is already taken");
        errors.add_non_field("Password and Confirm Password does not match");

        match errors.into_result() {
            Err(ApiError::Validation(e)) => {
                assert_eq!(e.field("username"), ["Username is already taken"]);
                assert_eq!(e.non_field.len(), 1);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn login_required_redirects_with_next() {
        let err = ApiError::LoginRequired {
            next: "/post/3".to_string(),
        };
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::FOUND);
        let location = resp.headers().get(header::LOCATION).unwrap();
        assert_eq!(location, "/login?next=%2Fpost%2F3");
    }

    #[actix_web::test]
    async fn not_found_has_json_error_body() {
        let resp = ApiError::post_not_found().error_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(resp.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, serde_json::json!({"error": "Post not found"}));
    }
}
