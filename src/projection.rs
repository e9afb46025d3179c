//! External JSON shape of posts and feeds.

use actix_web::HttpResponse;
use serde::Serialize;

use crate::core::helpers::to_iso;
use crate::feed::Page;
use crate::models::models::{Likers, Post, PostId, UserId};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PostJson {
    pub post_id: PostId,
    pub post_content: String,
    pub loc_lon: Option<f64>,
    pub loc_lat: Option<f64>,
    pub created_at: String,
    pub post_status: &'static str,
    pub liker_id: Vec<UserId>,
    pub poster_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repost_id: Option<PostId>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeedJson {
    pub total_post: usize,
    pub posts: Vec<PostJson>,
}

pub fn project_post(post: &Post, likers: &Likers) -> PostJson {
    let mut liker_id: Vec<UserId> = likers.iter().copied().collect();
    liker_id.sort_unstable();

    PostJson {
        post_id: post.id,
        post_content: post.content.clone(),
        loc_lon: post.geo.map(|g| g.lon),
        loc_lat: post.geo.map(|g| g.lat),
        created_at: to_iso(&post.created_at),
        post_status: post.status.code(),
        liker_id,
        poster_id: post.poster_id,
        repost_id: post.repost_id,
    }
}

pub fn project_post_not_found() -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({"error": "Post not found"}))
}

pub fn project_feed(page: Page<PostJson>) -> FeedJson {
    FeedJson {
        total_post: page.total,
        posts: page.items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::page;
    use crate::models::models::{GeoPoint, Status};
    use chrono::{TimeZone, Utc};

    fn post(id: PostId, repost_id: Option<PostId>, geo: Option<GeoPoint>) -> Post {
        Post {
            id,
            content: format!("post {}", id),
            geo,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            status: Status::Active,
            poster_id: 7,
            repost_id,
        }
    }

    #[test]
    fn original_post_omits_repost_id() {
        let likers: Likers = [9, 3, 5].into_iter().collect();
        let value = serde_json::to_value(project_post(&post(1, None, None), &likers)).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "post_id": 1,
                "post_content": "post 1",
                "loc_lon": null,
                "loc_lat": null,
                "created_at": "2024-05-01T12:30:00.000000Z",
                "post_status": "ACT",
                "liker_id": [3, 5, 9],
                "poster_id": 7,
            })
        );
        assert!(value.get("repost_id").is_none());
    }

    #[test]
    fn repost_carries_origin_and_geo() {
        let geo = Some(GeoPoint { lat: 1.5, lon: -2.25 });
        let value =
            serde_json::to_value(project_post(&post(2, Some(1), geo), &Likers::new())).unwrap();
        assert_eq!(value["repost_id"], 1);
        assert_eq!(value["loc_lat"], 1.5);
        assert_eq!(value["loc_lon"], -2.25);
        assert_eq!(value["liker_id"], serde_json::json!([]));
    }

    #[test]
    fn feed_reports_total_not_page_length() {
        let posts: Vec<PostJson> = (1..=8)
            .map(|id| project_post(&post(id, None, None), &Likers::new()))
            .collect();
        let feed = project_feed(page(posts, 1, 5));
        assert_eq!(feed.total_post, 8);
        assert_eq!(feed.posts.len(), 3);
        assert_eq!(feed.posts[0].post_id, 6);
    }
}
