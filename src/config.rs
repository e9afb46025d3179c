use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

// === Validation limits ===
pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 32;
pub const MAX_DISPLAY_NAME_LENGTH: usize = 64;
pub const MAX_EMAIL_LENGTH: usize = 255;
pub const MAX_POST_LENGTH: usize = 140;

// === Paging ===
pub const POSTS_PER_PAGE: usize = 5;
pub const API_DEFAULT_MAX_POST: usize = 5;
pub const API_MAX_POST_CEILING: usize = 5;

// === Sessions ===
pub const SESSION_COOKIE: &str = "sessionid";
pub const DEFAULT_SESSION_HOURS: i64 = 24;

// === Store keys ===
pub const USER_SEQ_KEY: &str = "seq:user";
pub const POST_SEQ_KEY: &str = "seq:post";

pub fn user_key(id: u64) -> String {
    format!("user:{}", id)
}

pub fn username_key(username: &str) -> String {
    format!("username:{}", username)
}

pub fn post_key(id: u64) -> String {
    format!("post:{}", id)
}

pub fn likes_key(post_id: u64) -> String {
    format!("likes:{}", post_id)
}

pub fn session_key(token: &str) -> String {
    format!("session:{}", token)
}

/// Runtime settings, read from flags or `CHIRP_*` environment variables.
#[derive(Parser, Debug, Clone)]
#[command(name = "chirp", about = "Short-post social feed server")]
pub struct Settings {
    #[arg(long, env = "CHIRP_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "CHIRP_PORT", default_value_t = 3000)]
    pub port: u16,

    /// JSON snapshot file; the store stays in memory when omitted
    #[arg(long, env = "CHIRP_DATA_FILE")]
    pub data_file: Option<PathBuf>,

    #[arg(long, env = "CHIRP_SESSION_HOURS", default_value_t = DEFAULT_SESSION_HOURS)]
    pub session_hours: i64,

    /// Create the demo users and posts on start
    #[arg(long, env = "CHIRP_SEED_DEMO", default_value_t = false)]
    pub seed_demo: bool,
}

impl Settings {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid bind address {}:{}: {}", self.host, self.port, e))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            data_file: None,
            session_hours: DEFAULT_SESSION_HOURS,
            seed_demo: false,
        }
    }
}
