use actix_web::{web, HttpResponse};
use mime_guess::from_path;

use crate::core::errors::ApiError;
use crate::templates::Assets;

pub async fn serve_static(path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let file_path = path.into_inner();

    let file = Assets::get(&file_path)
        .ok_or_else(|| ApiError::NotFound("File not found".to_string()))?;

    let mime = from_path(&file_path).first_or_octet_stream();

    Ok(HttpResponse::Ok()
        .content_type(mime.as_ref())
        .body(file.data.into_owned()))
}
