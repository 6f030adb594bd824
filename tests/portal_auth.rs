//! Integration tests for portal login and course enumeration.

use std::path::PathBuf;

use course_mirror::{
    AuthDomain, LoginError, MirrorConfig, PageFetcher, SESSION_COOKIE_NAME, SessionContext,
    list_courses, login,
};
use url::Url;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(server: &MockServer) -> MirrorConfig {
    MirrorConfig::new(
        Url::parse(&server.uri()).expect("mock server uri"),
        Url::parse(&server.uri()).expect("mock server uri"),
        PathBuf::from("/tmp/unused"),
        true,
        8,
    )
    .expect("test config")
}

// ==================== Login Tests ====================

#[tokio::test]
async fn test_login_captures_portal_session_cookie() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/index.aspx"))
        .and(body_string_contains("username=kim"))
        .and(body_string_contains("password=hunter2"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header(
                    "Set-Cookie",
                    format!("{SESSION_COOKIE_NAME}=sess-xyz; Path=/; HttpOnly"),
                )
                .insert_header("Location", "/dashboard"),
        )
        .mount(&server)
        .await;

    let fetcher = PageFetcher::new().expect("fetcher");
    let config = test_config(&server);

    let session = login(&fetcher, &config, "kim", "hunter2")
        .await
        .expect("login");
    assert_eq!(
        session.cookie_header(&[AuthDomain::Portal]),
        format!("{SESSION_COOKIE_NAME}=sess-xyz")
    );
}

#[tokio::test]
async fn test_login_without_session_cookie_is_fatal() {
    let server = MockServer::start().await;

    // Rejected credentials: the portal re-renders the login form with no
    // session cookie.
    Mock::given(method("POST"))
        .and(path("/index.aspx"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>try again</html>"))
        .mount(&server)
        .await;

    let fetcher = PageFetcher::new().expect("fetcher");
    let config = test_config(&server);

    let error = login(&fetcher, &config, "kim", "wrong")
        .await
        .expect_err("login must fail");
    assert!(matches!(error, LoginError::NoSessionCookie));
}

#[tokio::test]
async fn test_login_http_error_is_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/index.aspx"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let fetcher = PageFetcher::new().expect("fetcher");
    let config = test_config(&server);

    let error = login(&fetcher, &config, "kim", "hunter2")
        .await
        .expect_err("login must fail");
    assert!(matches!(error, LoginError::Fetch(_)));
}

// ==================== Course Listing Tests ====================

fn course_entity(title: &str, id: u64) -> serde_json::Value {
    serde_json::json!({ "Title": title, "CourseId": id })
}

#[tokio::test]
async fn test_list_courses_single_page() {
    let server = MockServer::start().await;

    let payload = serde_json::json!({
        "EntityArray": [
            course_entity("Algebra II", 1205),
            course_entity("History", 88),
        ],
        "Total": 2
    });
    Mock::given(method("GET"))
        .and(path("/restapi/personal/courses/v1"))
        .and(query_param("PageIndex", "0"))
        .and(wiremock::matchers::header(
            "Cookie",
            format!("{SESSION_COOKIE_NAME}=sess-1"),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(&payload))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = PageFetcher::new().expect("fetcher");
    let config = test_config(&server);
    let session = SessionContext::with_portal_session(SESSION_COOKIE_NAME, "sess-1");

    let courses = list_courses(&fetcher, &config, &session)
        .await
        .expect("course list");
    assert_eq!(courses.len(), 2);
    assert_eq!(courses[0].title, "Algebra II");
    assert_eq!(courses[0].id, 1205);
}

#[tokio::test]
async fn test_list_courses_follows_paging_until_short_page() {
    let server = MockServer::start().await;

    let full_page: Vec<serde_json::Value> = (0..100)
        .map(|i| course_entity(&format!("Course {i}"), i))
        .collect();
    Mock::given(method("GET"))
        .and(path("/restapi/personal/courses/v1"))
        .and(query_param("PageIndex", "0"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "EntityArray": full_page })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/restapi/personal/courses/v1"))
        .and(query_param("PageIndex", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({ "EntityArray": [course_entity("Tail", 999)] }),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = PageFetcher::new().expect("fetcher");
    let config = test_config(&server);
    let session = SessionContext::with_portal_session(SESSION_COOKIE_NAME, "sess-1");

    let courses = list_courses(&fetcher, &config, &session)
        .await
        .expect("course list");
    assert_eq!(courses.len(), 101);
    assert_eq!(courses[100].title, "Tail");
}

#[tokio::test]
async fn test_list_courses_http_error_propagates() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/restapi/personal/courses/v1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let fetcher = PageFetcher::new().expect("fetcher");
    let config = test_config(&server);
    let session = SessionContext::with_portal_session(SESSION_COOKIE_NAME, "stale");

    let error = list_courses(&fetcher, &config, &session)
        .await
        .expect_err("listing must fail");
    assert!(error.to_string().contains("401"), "got: {error}");
}
