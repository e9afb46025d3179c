use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::*;
use crate::core::db::{ids_from_keys, Db, Tx};
use crate::core::errors::{ApiError, FormErrors};
use crate::core::helpers::{hash_password, now, sanitize_text, verify_password};
use crate::core::query_params::get_string;
use crate::models::models::{Likers, Post, SessionData, Status, User, UserId};
use crate::posts::delete_post_in;

// === Credential store ===

impl User {
    /// Replaces the stored hash with a freshly salted hash of `raw`.
    pub fn set_password(&mut self, raw: &str) -> anyhow::Result<()> {
        self.password = hash_password(raw)?;
        Ok(())
    }

    pub fn verify_password(&self, raw: &str) -> bool {
        verify_password(raw, &self.password)
    }

    pub fn activate(&mut self) {
        self.status = Status::Active;
    }

    pub fn ban(&mut self) {
        self.status = Status::Banned;
    }

    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }
}

// === Signup form ===

/// Signup form exactly as submitted.
#[derive(Debug, Default, Clone)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub password: String,
    pub confirmed_password: String,
}

impl SignupForm {
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        Self {
            username: get_string(params, "username").trim().to_string(),
            email: get_string(params, "email").trim().to_string(),
            display_name: get_string(params, "display_name").trim().to_string(),
            password: get_string(params, "password"),
            confirmed_password: get_string(params, "confirmed_password"),
        }
    }
}

/// A validated account, ready to be stored.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub password: String,
}

fn username_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("Regex should compile"))
}

fn email_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
            .expect("Regex should compile")
    })
}

pub fn validate_username(username: &str, errors: &mut FormErrors) {
    let len = username.chars().count();
    if username.is_empty() {
        errors.add("username", "This field is required.");
    } else if len < MIN_USERNAME_LENGTH {
        errors.add("username", "Username must be atleast 3 characters long");
    } else if len > MAX_USERNAME_LENGTH {
        errors.add("username", "Username must be at most 32 characters long");
    } else if !username_regex().is_match(username) {
        errors.add(
            "username",
            "Username may only contain letters, digits and . _ -",
        );
    }
}

/// Maps the submitted form onto a [`NewUser`]. Uniqueness is checked
/// later, inside the creating transaction.
/// Lowercases the domain part; the local part is kept as typed.
pub fn normalize_email(email: &str) -> String {
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

pub fn validate_signup(form: &SignupForm) -> Result<NewUser, ApiError> {
    let mut errors = FormErrors::new();

    validate_username(&form.username, &mut errors);

    if form.email.is_empty() {
        errors.add("email", "This field is required.");
    } else if form.email.len() > MAX_EMAIL_LENGTH || !email_regex().is_match(&form.email) {
        errors.add("email", "Enter a valid email address.");
    }

    let display_name = sanitize_text(&form.display_name).trim().to_string();
    if display_name.is_empty() {
        errors.add("display_name", "This field is required.");
    } else if display_name.chars().count() > MAX_DISPLAY_NAME_LENGTH {
        errors.add(
            "display_name",
            "Display name must be at most 64 characters long",
        );
    }

    if form.password.is_empty() {
        errors.add("password", "This field is required.");
    }
    if form.confirmed_password.is_empty() {
        errors.add("confirmed_password", "This field is required.");
    } else if !form.password.is_empty() && form.password != form.confirmed_password {
        errors.add_non_field("Password and Confirm Password does not match");
    }

    errors.into_result()?;

    Ok(NewUser {
        username: form.username.clone(),
        email: normalize_email(&form.email),
        display_name,
        password: form.password.clone(),
    })
}

// === Storage ===

/// Stores a new account, active from the start. The username check, id allocation,
/// user document and username index are one transaction.
pub fn create_user(db: &Db, new_user: NewUser) -> Result<User, ApiError> {
    // Hash outside the writer lock; argon2 is deliberately slow.
    let password_hash = hash_password(&new_user.password)?;

    let user = db.transaction(|tx| {
        let index_key = username_key(&new_user.username);
        if tx.exists(&index_key)? {
            return Err(ApiError::Validation(FormErrors::single(
                "username",
                "Username is already taken",
            )));
        }

        let id = tx.next_id(USER_SEQ_KEY)?;
        let user = User {
            id,
            username: new_user.username.clone(),
            email: new_user.email.clone(),
            display_name: new_user.display_name.clone(),
            password: password_hash,
            status: Status::Active,
            created_at: now(),
            last_login: None,
        };

        tx.set_json(&user_key(id), &user)?;
        tx.set_json(&index_key, &id)?;
        Ok(user)
    })?;

    tracing::info!("Created user {} (id {})", user, user.id);
    Ok(user)
}

pub fn get_user(db: &Db, user_id: UserId) -> Result<Option<User>, ApiError> {
    Ok(db.get_json::<User>(&user_key(user_id))?)
}

pub fn find_by_username(db: &Db, username: &str) -> Result<Option<User>, ApiError> {
    match db.get_json::<UserId>(&username_key(username))? {
        Some(id) => get_user(db, id),
        None => Ok(None),
    }
}

/// All users, ordered by username.
pub fn list_users(db: &Db) -> Result<Vec<User>, ApiError> {
    let keys = db.keys("user:")?;
    let mut users = Vec::new();
    for id in ids_from_keys(&keys, "user:") {
        if let Some(u) = get_user(db, id)? {
            users.push(u);
        }
    }
    users.sort_by(|a, b| a.username.cmp(&b.username));
    Ok(users)
}

/// Persists an activate/ban transition. Returns the updated user.
pub fn set_status(db: &Db, user_id: UserId, status: Status) -> Result<User, ApiError> {
    let user = db.transaction(|tx| {
        let key = user_key(user_id);
        let mut user = tx
            .get_json::<User>(&key)?
            .ok_or_else(ApiError::user_not_found)?;
        match status {
            Status::Active => user.activate(),
            Status::Banned => user.ban(),
        }
        tx.set_json(&key, &user)?;
        Ok::<_, ApiError>(user)
    })?;

    tracing::info!("User {} is now {:?}", user, user.status);
    Ok(user)
}

/// Deletes an account together with everything that depends on it: the
/// user's posts (and their reposts), their like edges and their sessions.
pub fn delete_user(db: &Db, user_id: UserId) -> Result<(), ApiError> {
    db.transaction(|tx| {
        let user = tx
            .get_json::<User>(&user_key(user_id))?
            .ok_or_else(ApiError::user_not_found)?;

        for post_id in ids_from_keys(&tx.keys("post:")?, "post:") {
            let authored = tx
                .get_json::<Post>(&post_key(post_id))?
                .map(|p| p.poster_id == user_id)
                .unwrap_or(false);
            if authored {
                delete_post_in(tx, post_id)?;
            }
        }

        remove_like_edges(tx, user_id)?;
        remove_sessions(tx, user_id)?;

        tx.delete(&username_key(&user.username));
        tx.delete(&user_key(user_id));
        Ok::<_, ApiError>(())
    })?;

    tracing::info!("Deleted user {}", user_id);
    Ok(())
}

fn remove_like_edges(tx: &mut Tx<'_>, user_id: UserId) -> anyhow::Result<()> {
    for key in tx.keys("likes:")? {
        if let Some(mut likers) = tx.get_json::<Likers>(&key)? {
            if likers.remove(&user_id) {
                tx.set_json(&key, &likers)?;
            }
        }
    }
    Ok(())
}

fn remove_sessions(tx: &mut Tx<'_>, user_id: UserId) -> anyhow::Result<()> {
    for key in tx.keys("session:")? {
        let owned = tx
            .get_json::<SessionData>(&key)?
            .map(|s| s.user_id == user_id)
            .unwrap_or(false);
        if owned {
            tx.delete(&key);
        }
    }
    Ok(())
}
