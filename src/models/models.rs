use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = u64;
pub type PostId = u64;

/// Account and post moderation state. Serialized with the short codes
/// used by the stored documents.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    #[serde(rename = "ACT")]
    Active,
    #[serde(rename = "BAN")]
    Banned,
}

impl Status {
    pub fn code(&self) -> &'static str {
        match self {
            Status::Active => "ACT",
            Status::Banned => "BAN",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub display_name: String,
    /// argon2 PHC string, never the raw password
    pub password: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.display_name, self.username)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Post {
    pub id: PostId,
    pub content: String,
    pub geo: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
    pub status: Status,
    pub poster_id: UserId,
    pub repost_id: Option<PostId>,
}

impl Post {
    pub fn is_repost(&self) -> bool {
        self.repost_id.is_some()
    }
}

/// Like edges of a single post.
pub type Likers = HashSet<UserId>;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SessionData {
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}
