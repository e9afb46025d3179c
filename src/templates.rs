use std::collections::HashMap;
use std::sync::OnceLock;

use actix_web::HttpResponse;
use html_escape::{encode_double_quoted_attribute, encode_text};
use regex::Regex;
use rust_embed::RustEmbed;

use crate::core::errors::{ApiError, FormErrors};
use crate::core::helpers::to_iso;
use crate::feed::Page;
use crate::posts::PostView;
use crate::users::SignupForm;
use crate::models::models::User;

#[derive(RustEmbed)]
#[folder = "static"]
pub(crate) struct Assets;

fn load(name: &str) -> Result<String, ApiError> {
    let file = Assets::get(name)
        .ok_or_else(|| anyhow::anyhow!("Template {} not found", name))?;
    Ok(String::from_utf8(file.data.to_vec()).map_err(anyhow::Error::from)?)
}

fn placeholder_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"[A-Z][A-Z_]*[A-Z]").expect("Regex should compile"))
}

/// Substitutes placeholders in one pass, so inserted text is never
/// scanned again.
fn fill(template: &str, values: &HashMap<&str, String>) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &regex::Captures| {
            let token = &caps[0];
            values
                .get(token)
                .cloned()
                .unwrap_or_else(|| token.to_string())
        })
        .into_owned()
}

pub fn html(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

pub fn html_with_status(status: actix_web::http::StatusCode, body: String) -> HttpResponse {
    HttpResponse::build(status)
        .content_type("text/html; charset=utf-8")
        .body(body)
}

fn render_errors(errors: &FormErrors) -> String {
    if errors.is_empty() {
        return String::new();
    }
    let mut items: Vec<String> = errors
        .non_field
        .iter()
        .map(|msg| format!("<li>{}</li>", encode_text(msg)))
        .collect();
    for (field, messages) in &errors.fields {
        for msg in messages {
            items.push(format!(
                r#"<li data-field="{}">{}</li>"#,
                encode_double_quoted_attribute(field),
                encode_text(msg)
            ));
        }
    }
    format!(r#"<ul class="errors">{}</ul>"#, items.join(""))
}

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("Regex should compile"))
}

/// Escapes post text and turns http(s) URLs into links.
fn render_content(content: &str) -> String {
    let escaped = encode_text(content).to_string();
    url_regex()
        .replace_all(&escaped, |caps: &regex::Captures| {
            let url = &caps[0];
            format!(
                r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
                url, url
            )
        })
        .into_owned()
}

fn render_post(view: &PostView, viewer: &User) -> String {
    let post = &view.post;
    let author = view
        .author
        .as_ref()
        .map(|a| format!("{} @{}", encode_text(&a.display_name), encode_text(&a.username)))
        .unwrap_or_else(|| "unknown".to_string());
    let repost = post
        .repost_id
        .map(|id| format!(r##"<div class="repost-of">reposting <a href="/post/{id}">#{id}</a></div>"##))
        .unwrap_or_default();
    let geo = post
        .geo
        .map(|g| format!(r#" · <span class="geo">{:.4}, {:.4}</span>"#, g.lat, g.lon))
        .unwrap_or_default();
    let liked = if view.likers.contains(&viewer.id) {
        " liked"
    } else {
        ""
    };

    format!(
        r#"<article class="card post" id="post-{id}">
  <div class="meta">{author} · <a href="/post/{id}"><time datetime="{ts}">{ts}</time></a>{geo}</div>
  {repost}<p>{content}</p>
  <div class="actions">
    <button type="button" class="like{liked}" data-post-id="{id}">♥ <span class="count">{likes}</span></button>
    <button type="button" class="repost" data-post-id="{id}">Repost</button>
  </div>
</article>"#,
        id = post.id,
        author = author,
        ts = to_iso(&post.created_at),
        geo = geo,
        repost = repost,
        content = render_content(&post.content),
        liked = liked,
        likes = view.likers.len(),
    )
}

fn render_pagination<T>(page: &Page<T>) -> String {
    let current = page.number + 1;
    let prev = if page.has_prev {
        format!(r#"<a href="/?page={}">&laquo; Newer</a>"#, current - 1)
    } else {
        "<span></span>".to_string()
    };
    let next = if page.has_next {
        format!(r#"<a href="/?page={}">Older &raquo;</a>"#, current + 1)
    } else {
        "<span></span>".to_string()
    };
    format!(
        r#"<nav class="pagination">{prev}<span>Page {current} of {total}</span>{next}</nav>"#,
        prev = prev,
        current = current,
        total = page.num_pages(),
        next = next,
    )
}

pub fn render_login(errors: &FormErrors, username: &str, next: &str) -> Result<String, ApiError> {
    let template = load("login.html")?;
    let values = HashMap::from([
        ("FORM_ERRORS", render_errors(errors)),
        ("LOGIN_USERNAME", encode_double_quoted_attribute(username).to_string()),
        ("LOGIN_NEXT", encode_double_quoted_attribute(next).to_string()),
    ]);
    Ok(fill(&template, &values))
}

pub fn render_signup(form: &SignupForm, errors: &FormErrors) -> Result<String, ApiError> {
    let template = load("signup.html")?;
    let values = HashMap::from([
        ("FORM_ERRORS", render_errors(errors)),
        ("SIGNUP_USERNAME", encode_double_quoted_attribute(&form.username).to_string()),
        ("SIGNUP_EMAIL", encode_double_quoted_attribute(&form.email).to_string()),
        (
            "SIGNUP_DISPLAY_NAME",
            encode_double_quoted_attribute(&form.display_name).to_string(),
        ),
    ]);
    Ok(fill(&template, &values))
}

fn render_shell(
    title: &str,
    user: &User,
    form_action: &str,
    errors: &FormErrors,
    body: String,
) -> Result<String, ApiError> {
    let template = load("dashboard.html")?;
    let values = HashMap::from([
        ("PAGE_TITLE", encode_text(title).to_string()),
        ("CURRENT_USER", encode_text(&user.to_string()).to_string()),
        ("FORM_ERRORS", render_errors(errors)),
        ("FORM_ACTION", form_action.to_string()),
        ("PAGE_BODY", body),
    ]);
    Ok(fill(&template, &values))
}

pub fn render_dashboard(
    user: &User,
    page: &Page<PostView>,
    errors: &FormErrors,
) -> Result<String, ApiError> {
    let mut body: String = page.items.iter().map(|v| render_post(v, user)).collect();
    if page.items.is_empty() {
        body.push_str(r#"<p class="card">No posts yet.</p>"#);
    }
    body.push_str(&render_pagination(page));
    render_shell("Home", user, "/", errors, body)
}

pub fn render_post_detail(
    user: &User,
    view: &PostView,
    errors: &FormErrors,
) -> Result<String, ApiError> {
    let action = format!("/post/{}", view.post.id);
    render_shell(
        &format!("Post #{}", view.post.id),
        user,
        &action,
        errors,
        render_post(view, user),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_is_single_pass() {
        let values = HashMap::from([
            ("FORM_ERRORS", "PAGE_BODY".to_string()),
            ("PAGE_BODY", "body".to_string()),
        ]);
        assert_eq!(fill("FORM_ERRORS|PAGE_BODY|DOCTYPE", &values), "PAGE_BODY|body|DOCTYPE");
    }

    #[test]
    fn content_is_escaped_and_linked() {
        let out = render_content("<b>hi</b> see https://example.com/x?a=1");
        assert!(out.starts_with("&lt;b&gt;hi&lt;/b&gt; see "));
        assert!(out.contains(r#"<a href="https://example.com/x?a=1" target="_blank""#));
    }

    #[test]
    fn login_page_echoes_escaped_username() {
        let mut errors = FormErrors::new();
        errors.add_non_field("Invalid username or password");
        let page = render_login(&errors, "\"><script>", "/").unwrap();
        assert!(page.contains("Invalid username or password"));
        assert!(!page.contains("\"><script>"));
    }
}
