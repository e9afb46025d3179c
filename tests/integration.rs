use actix_web::cookie::Cookie;
use actix_web::http::header::{self, ContentType};
use actix_web::http::StatusCode;
use actix_web::{test, App};
use serde_json::Value;

use chirp::config::Settings;
use chirp::core::db::Db;
use chirp::AppState;

macro_rules! app {
    () => {{
        let state = AppState::new(Db::in_memory(), Settings::default());
        test::init_service(App::new().app_data(state.clone()).configure(chirp::configure)).await
    }};
}

/// Signs `$username` up (password "secret") and logs in, returning the
/// session cookie.
macro_rules! signed_in {
    ($app:expr, $username:expr) => {{
        let resp = test::call_service(&$app, form("/signup", &signup_body($username))).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER, "signup of {}", $username);

        let resp = test::call_service(
            &$app,
            form("/login", &format!("username={}&password=secret", $username)),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER, "login of {}", $username);
        session_of(&resp).expect("login should set a session cookie")
    }};
}

fn form(uri: &str, body: &str) -> actix_http::Request {
    test::TestRequest::post()
        .uri(uri)
        .insert_header(ContentType::form_url_encoded())
        .set_payload(body.to_string())
        .to_request()
}

fn form_with(uri: &str, body: &str, session: &Cookie<'static>) -> actix_http::Request {
    test::TestRequest::post()
        .uri(uri)
        .insert_header(ContentType::form_url_encoded())
        .cookie(session.clone())
        .set_payload(body.to_string())
        .to_request()
}

fn get_with(uri: &str, session: &Cookie<'static>) -> actix_http::Request {
    test::TestRequest::get()
        .uri(uri)
        .cookie(session.clone())
        .to_request()
}

fn signup_body(username: &str) -> String {
    format!(
        "username={u}&email={u}%40example.com&display_name=Test+{u}&password=secret&confirmed_password=secret",
        u = username
    )
}

fn session_of<B>(resp: &actix_web::dev::ServiceResponse<B>) -> Option<Cookie<'static>> {
    resp.response()
        .cookies()
        .find(|c| c.name() == "sessionid" && !c.value().is_empty())
        .map(|c| c.into_owned())
}

fn location<B>(resp: &actix_web::dev::ServiceResponse<B>) -> String {
    resp.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[actix_web::test]
async fn test_signup_rejects_short_username() {
    let app = app!();

    let resp = test::call_service(&app, form("/signup", &signup_body("ab"))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = test::read_body(resp).await;
    let body = String::from_utf8_lossy(&body);
    assert!(body.contains("Username must be atleast 3 characters long"));
}

#[actix_web::test]
async fn test_signup_rejects_taken_username() {
    let app = app!();

    let first = test::call_service(&app, form("/signup", &signup_body("alice"))).await;
    assert_eq!(first.status(), StatusCode::SEE_OTHER);

    let second = test::call_service(&app, form("/signup", &signup_body("alice"))).await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    let body = test::read_body(second).await;
    assert!(String::from_utf8_lossy(&body).contains("already taken"));
}

#[actix_web::test]
async fn test_login_wrong_password_sets_no_session() {
    let app = app!();
    let resp = test::call_service(&app, form("/signup", &signup_body("alice"))).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    for body in ["username=alice&password=wrong", "username=nobody&password=secret"] {
        let resp = test::call_service(&app, form("/login", body)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(session_of(&resp).is_none());
        let html = test::read_body(resp).await;
        assert!(String::from_utf8_lossy(&html).contains("Invalid username or password"));
    }
}

#[actix_web::test]
async fn test_protected_routes_require_session() {
    let app = app!();

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/login?next=%2F");

    let resp = test::call_service(&app, form("/", "post_content=hi")).await;
    assert_eq!(resp.status(), StatusCode::FOUND);

    let resp = test::call_service(&app, form("/post/1/like", "")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/api/posts").to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_full_user_flow() {
    let app = app!();
    let session = signed_in!(app, "alice");

    // Create a geotagged post, then repost it
    let resp = test::call_service(
        &app,
        form_with("/", "post_content=hello+world&loc_lat=52.5&loc_lon=13.4", &session),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");

    let resp = test::call_service(
        &app,
        form_with("/post/1", "post_content=worth+repeating&repost_val=1", &session),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    // Dashboard shows both
    let resp = test::call_service(&app, get_with("/", &session)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = test::read_body(resp).await;
    let html = String::from_utf8_lossy(&html);
    assert!(html.contains("hello world"));
    assert!(html.contains("worth repeating"));

    // Like, unlike
    let resp: Value = test::call_and_read_body_json(&app, form_with("/post/1/like", "", &session)).await;
    assert_eq!(resp, serde_json::json!({"liked": true, "total_likes": 1}));
    let resp: Value = test::call_and_read_body_json(&app, form_with("/post/1/like", "", &session)).await;
    assert_eq!(resp, serde_json::json!({"liked": false, "total_likes": 0}));
    let resp: Value = test::call_and_read_body_json(&app, form_with("/post/2/like", "", &session)).await;
    assert_eq!(resp["liked"], true);

    // JSON projections
    let original: Value = test::call_and_read_body_json(&app, get_with("/api/posts/1", &session)).await;
    assert_eq!(original["post_content"], "hello world");
    assert_eq!(original["loc_lat"], 52.5);
    assert_eq!(original["loc_lon"], 13.4);
    assert_eq!(original["post_status"], "ACT");
    assert!(original.get("repost_id").is_none());

    let repost: Value = test::call_and_read_body_json(&app, get_with("/api/posts/2", &session)).await;
    assert_eq!(repost["repost_id"], 1);
    assert_eq!(repost["liker_id"], serde_json::json!([original["poster_id"].clone()]));
    assert_eq!(repost["loc_lat"], Value::Null);

    // Logout ends the session
    let resp = test::call_service(&app, form_with("/logout", "", &session)).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login");
    let resp = test::call_service(&app, get_with("/", &session)).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
}

#[actix_web::test]
async fn test_post_content_validation() {
    let app = app!();
    let session = signed_in!(app, "alice");

    let long = "a".repeat(141);
    let resp = test::call_service(
        &app,
        form_with("/", &format!("post_content={}", long), &session),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let html = test::read_body(resp).await;
    assert!(String::from_utf8_lossy(&html)
        .contains("Ensure this value has at most 140 characters (it has 141)."));

    let resp = test::call_service(&app, form_with("/", "post_content=half&loc_lat=10", &session)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(&app, form_with("/", "post_content=&repost_val=9999", &session)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Nothing was stored
    let feed: Value = test::call_and_read_body_json(&app, get_with("/api/posts", &session)).await;
    assert_eq!(feed["total_post"], 0);
}

#[actix_web::test]
async fn test_missing_posts_are_not_found() {
    let app = app!();
    let session = signed_in!(app, "alice");

    let resp = test::call_service(&app, form_with("/post/9999/like", "", &session)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, serde_json::json!({"error": "Post not found"}));

    let resp = test::call_service(&app, get_with("/api/posts/9999", &session)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, serde_json::json!({"error": "Post not found"}));

    let resp = test::call_service(&app, get_with("/post/9999", &session)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_api_feed_paging() {
    let app = app!();
    let session = signed_in!(app, "alice");

    for i in 1..=7 {
        let resp = test::call_service(
            &app,
            form_with("/", &format!("post_content=post+{}", i), &session),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    }

    let default: Value = test::call_and_read_body_json(&app, get_with("/api/posts", &session)).await;
    assert_eq!(default["total_post"], 7);
    let ids: Vec<u64> = default["posts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["post_id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![7, 6, 5, 4, 3]);

    let clamped: Value =
        test::call_and_read_body_json(&app, get_with("/api/posts?max_post=999", &session)).await;
    let five: Value = test::call_and_read_body_json(&app, get_with("/api/posts?max_post=5", &session)).await;
    let garbage: Value =
        test::call_and_read_body_json(&app, get_with("/api/posts?max_post=abc", &session)).await;
    assert_eq!(clamped, five);
    assert_eq!(garbage, default);

    let second: Value =
        test::call_and_read_body_json(&app, get_with("/api/posts?max_post=5&page=1", &session)).await;
    assert_eq!(second["posts"].as_array().unwrap().len(), 2);
    let negative: Value =
        test::call_and_read_body_json(&app, get_with("/api/posts?page=-3", &session)).await;
    assert_eq!(negative, default);
}

#[actix_web::test]
async fn test_dashboard_paging() {
    let app = app!();
    let session = signed_in!(app, "alice");

    for i in 1..=7 {
        let resp = test::call_service(
            &app,
            form_with("/", &format!("post_content=entry+number+{}", i), &session),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    }

    let body = test::read_body(test::call_service(&app, get_with("/", &session)).await).await;
    let first = String::from_utf8_lossy(&body).to_string();
    for i in 3..=7 {
        assert!(first.contains(&format!("entry number {}<", i)), "page 1 misses {}", i);
    }
    assert!(!first.contains("entry number 2<"));

    let body = test::read_body(test::call_service(&app, get_with("/?page=2", &session)).await).await;
    let second = String::from_utf8_lossy(&body).to_string();
    assert!(second.contains("entry number 2<"));
    assert!(second.contains("entry number 1<"));
    assert!(!second.contains("entry number 3<"));

    let body = test::read_body(test::call_service(&app, get_with("/?page=99", &session)).await).await;
    assert_eq!(String::from_utf8_lossy(&body), second);
}

#[actix_web::test]
async fn test_bearer_token_api() {
    let app = app!();
    let resp = test::call_service(&app, form("/signup", &signup_body("bob"))).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let bad = test::TestRequest::post()
        .uri("/api/login")
        .set_json(serde_json::json!({"username": "bob", "password": "nope"}))
        .to_request();
    assert_eq!(test::call_service(&app, bad).await.status(), StatusCode::UNAUTHORIZED);

    let login = test::TestRequest::post()
        .uri("/api/login")
        .set_json(serde_json::json!({"username": "bob", "password": "secret"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, login).await;
    let token = body["token"].as_str().unwrap().to_string();

    let feed = test::TestRequest::get()
        .uri("/api/posts")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, feed).await;
    assert_eq!(body, serde_json::json!({"total_post": 0, "posts": []}));

    let logout = test::TestRequest::post()
        .uri("/api/logout")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .to_request();
    assert_eq!(test::call_service(&app, logout).await.status(), StatusCode::OK);

    let after = test::TestRequest::get()
        .uri("/api/posts")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .to_request();
    assert_eq!(test::call_service(&app, after).await.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_login_redirects_to_next() {
    let app = app!();
    let resp = test::call_service(&app, form("/signup", &signup_body("carol"))).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let resp = test::call_service(
        &app,
        form("/login", "username=carol&password=secret&next=%2Fpost%2F"),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/post/");
    let session = session_of(&resp).unwrap();

    let resp = test::call_service(&app, get_with("/login", &session)).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");

    let resp = test::call_service(&app, get_with("/post/", &session)).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/");
}

#[actix_web::test]
async fn test_static_assets() {
    let app = app!();
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/static/style.css").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/css"
    );

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/static/missing.css").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
