use std::collections::HashMap;

use serde::Serialize;

use crate::config::*;
use crate::core::db::{ids_from_keys, Db, Tx};
use crate::core::errors::{ApiError, FormErrors};
use crate::core::helpers::{now, parse_id};
use crate::core::query_params::{get_optional, get_string};
use crate::models::models::{GeoPoint, Likers, Post, PostId, Status, User, UserId};

/// Post form exactly as submitted.
#[derive(Debug, Default, Clone)]
pub struct PostForm {
    pub post_content: String,
    pub repost_val: Option<String>,
    pub loc_lon: Option<String>,
    pub loc_lat: Option<String>,
}

impl PostForm {
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        Self {
            post_content: get_string(params, "post_content"),
            repost_val: get_optional(params, "repost_val"),
            loc_lon: get_optional(params, "loc_lon"),
            loc_lat: get_optional(params, "loc_lat"),
        }
    }
}

/// A validated post, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub content: String,
    pub geo: Option<GeoPoint>,
    pub repost_of: Option<PostId>,
}

fn check_content(content: &str, errors: &mut FormErrors) {
    let len = content.chars().count();
    if len > MAX_POST_LENGTH {
        errors.add(
            "post_content",
            format!(
                "Ensure this value has at most {} characters (it has {}).",
                MAX_POST_LENGTH, len
            ),
        );
    }
}

fn parse_coordinate(
    raw: Option<&str>,
    field: &str,
    label: &str,
    bound: f64,
    errors: &mut FormErrors,
) -> Option<f64> {
    let value = raw?.parse::<f64>().ok().filter(|v| v.is_finite());
    match value {
        None => {
            errors.add(field, "Enter a number.");
            None
        }
        Some(v) if v.abs() > bound => {
            errors.add(field, format!("{} must be between -{} and {}", label, bound, bound));
            None
        }
        Some(v) => Some(v),
    }
}

/// Maps the submitted form onto a [`NewPost`]. Coordinates are accepted
/// only as a complete pair.
pub fn validate_post_form(form: &PostForm) -> Result<NewPost, ApiError> {
    let mut errors = FormErrors::new();

    check_content(&form.post_content, &mut errors);

    let repost_of = match form.repost_val.as_deref() {
        None => None,
        Some(raw) => match parse_id(raw) {
            Some(id) => Some(id),
            None => {
                errors.add("repost_val", "Enter a whole number.");
                None
            }
        },
    };

    let lat = parse_coordinate(form.loc_lat.as_deref(), "loc_lat", "Latitude", 90.0, &mut errors);
    let lon = parse_coordinate(form.loc_lon.as_deref(), "loc_lon", "Longitude", 180.0, &mut errors);
    if form.loc_lat.is_some() != form.loc_lon.is_some() {
        errors.add_non_field("Latitude and longitude must be provided together");
    }

    errors.into_result()?;

    let geo = match (lat, lon) {
        (Some(lat), Some(lon)) => Some(GeoPoint { lat, lon }),
        _ => None,
    };

    Ok(NewPost {
        content: form.post_content.clone(),
        geo,
        repost_of,
    })
}

/// Stores a new post by `author`. The repost target must exist. The id
/// allocation and the post document are committed together.
pub fn create_post(db: &Db, author: UserId, new_post: NewPost) -> Result<Post, ApiError> {
    let mut errors = FormErrors::new();
    check_content(&new_post.content, &mut errors);
    errors.into_result()?;

    let post = db.transaction(|tx| {
        if !tx.exists(&user_key(author))? {
            return Err(ApiError::user_not_found());
        }
        if let Some(original) = new_post.repost_of {
            if !tx.exists(&post_key(original))? {
                return Err(ApiError::post_not_found());
            }
        }

        let id = tx.next_id(POST_SEQ_KEY)?;
        let post = Post {
            id,
            content: new_post.content.clone(),
            geo: new_post.geo,
            created_at: now(),
            status: Status::Active,
            poster_id: author,
            repost_id: new_post.repost_of,
        };
        tx.set_json(&post_key(id), &post)?;
        Ok(post)
    })?;

    tracing::info!(
        post_id = post.id,
        poster_id = post.poster_id,
        repost_id = ?post.repost_id,
        "Created post"
    );
    Ok(post)
}

pub fn get_post(db: &Db, post_id: PostId) -> Result<Post, ApiError> {
    db.get_json::<Post>(&post_key(post_id))?
        .ok_or_else(ApiError::post_not_found)
}

pub fn likers(db: &Db, post_id: PostId) -> Result<Likers, ApiError> {
    Ok(db.get_json::<Likers>(&likes_key(post_id))?.unwrap_or_default())
}

/// Every post, ascending by id.
pub fn all_posts(db: &Db) -> Result<Vec<Post>, ApiError> {
    let keys = db.keys("post:")?;
    let mut posts = Vec::new();
    for id in ids_from_keys(&keys, "post:") {
        if let Some(p) = db.get_json::<Post>(&post_key(id))? {
            posts.push(p);
        }
    }
    Ok(posts)
}

/// A post with the data needed to display it.
#[derive(Debug, Clone)]
pub struct PostView {
    pub post: Post,
    pub author: Option<User>,
    pub likers: Likers,
}

pub fn load_view(db: &Db, post: Post) -> Result<PostView, ApiError> {
    let author = crate::users::get_user(db, post.poster_id)?;
    let likers = likers(db, post.id)?;
    Ok(PostView {
        post,
        author,
        likers,
    })
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct LikeToggle {
    pub liked: bool,
    pub total_likes: usize,
}

/// Adds `user_id` to the post's like set, or removes it if already
/// present. Membership check, update and count are one transaction.
pub fn toggle_like(db: &Db, user_id: UserId, post_id: PostId) -> Result<LikeToggle, ApiError> {
    let result = db.transaction(|tx| {
        if !tx.exists(&post_key(post_id))? {
            return Err(ApiError::post_not_found());
        }

        let key = likes_key(post_id);
        let mut likers: Likers = tx.get_json(&key)?.unwrap_or_default();
        let liked = if likers.remove(&user_id) {
            false
        } else {
            likers.insert(user_id);
            true
        };
        let total_likes = likers.len();

        if likers.is_empty() {
            tx.delete(&key);
        } else {
            tx.set_json(&key, &likers)?;
        }
        Ok(LikeToggle { liked, total_likes })
    })?;

    tracing::debug!(post_id, user_id, liked = result.liked, total = result.total_likes, "Toggled like");
    Ok(result)
}

/// Deletes a post, its like set and every repost of it, recursively.
pub fn delete_post(db: &Db, post_id: PostId) -> Result<(), ApiError> {
    db.transaction(|tx| {
        if !tx.exists(&post_key(post_id))? {
            return Err(ApiError::post_not_found());
        }
        delete_post_in(tx, post_id)
    })?;

    tracing::info!(post_id, "Deleted post");
    Ok(())
}

/// Cascade delete inside an open transaction. Missing posts are skipped.
pub(crate) fn delete_post_in(tx: &mut Tx<'_>, post_id: PostId) -> Result<(), ApiError> {
    let mut pending = vec![post_id];

    while let Some(id) = pending.pop() {
        if !tx.exists(&post_key(id))? {
            continue;
        }
        for other in ids_from_keys(&tx.keys("post:")?, "post:") {
            let reposts_this = tx
                .get_json::<Post>(&post_key(other))?
                .map(|p| p.repost_id == Some(id))
                .unwrap_or(false);
            if reposts_this {
                pending.push(other);
            }
        }
        tx.delete(&likes_key(id));
        tx.delete(&post_key(id));
    }

    Ok(())
}
