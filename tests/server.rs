//! Transport behavior: session creation, the request protocol, and error
//! normalization as observed over a real HTTP connection.

mod common;

use common::{MockResponse, MockServer};
use hansom::{Capabilities, CmdError, HttpOptions, NewSessionError, Server, Status};
use serde_json::json;

fn chrome_caps() -> Capabilities {
    let mut desired = Capabilities::new();
    desired.insert("browserName", json!("chrome"));
    desired
}

#[tokio::test]
async fn create_session_against_cooperative_driver() {
    let mock = MockServer::start(|method, path, _body| match (method, path) {
        ("POST", "/session") => MockResponse::raw(
            200,
            json!({
                "status": 0,
                "sessionId": "abc",
                "value": { "browserName": "chrome", "version": "60" },
            }),
        ),
        _ => MockResponse::unknown_command(),
    })
    .await;

    let server = Server::new(&mock.url()).unwrap();
    let mut desired = chrome_caps();
    // Static fill only; the mock cannot survive the probe battery.
    desired.insert("fixSessionCapabilities", json!("no-detect"));
    let session = server.create_session(desired).await.unwrap();

    assert_eq!(session.session_id(), "abc");
    let caps = session.capabilities();
    assert_eq!(caps.string("browserVersion"), Some("60"));
    assert!(caps.is_filled());

    // The filler control key never crosses the wire.
    let create = &mock.requests_to("/session")[0];
    assert_eq!(create.method, "POST");
    let desired_sent = &create.body["desiredCapabilities"];
    assert_eq!(desired_sent["browserName"], json!("chrome"));
    assert!(desired_sent.get("fixSessionCapabilities").is_none());
}

#[tokio::test]
async fn create_session_accepts_w3c_response_shape() {
    let mock = MockServer::start(|method, path, _body| match (method, path) {
        ("POST", "/session") => MockResponse::raw(
            200,
            json!({
                "value": {
                    "sessionId": "w3c-1",
                    "capabilities": { "browserName": "firefox", "browserVersion": "78.0" },
                },
            }),
        ),
        _ => MockResponse::unknown_command(),
    })
    .await;

    let server = Server::new(&mock.url()).unwrap();
    let mut desired = Capabilities::new();
    desired.insert("browserName", json!("firefox"));
    desired.insert("fixSessionCapabilities", json!(false));
    let session = server.create_session(desired).await.unwrap();

    assert_eq!(session.session_id(), "w3c-1");
    let caps = session.capabilities();
    assert!(caps.flag("isWebDriver"));
    assert_eq!(caps.string("browserName"), Some("firefox"));
    // The legacy spelling is mirrored for old-style consumers.
    assert_eq!(caps.string("version"), Some("78.0"));
}

#[tokio::test]
async fn create_session_follows_redirect_with_get() {
    let mock = MockServer::start(|method, path, _body| match (method, path) {
        ("POST", "/session") => MockResponse::redirect("/session/legacy-7"),
        ("GET", "/session/legacy-7") => MockResponse::raw(
            200,
            json!({
                "status": 0,
                "sessionId": "legacy-7",
                "value": { "browserName": "oldbrowser" },
            }),
        ),
        _ => MockResponse::unknown_command(),
    })
    .await;

    let server = Server::new(&mock.url()).unwrap();
    let mut desired = chrome_caps();
    desired.insert("fixSessionCapabilities", json!(false));
    let session = server.create_session(desired).await.unwrap();
    assert_eq!(session.session_id(), "legacy-7");

    let followed = &mock.requests_to("/session/legacy-7")[0];
    assert_eq!(followed.method, "GET");
}

#[tokio::test]
async fn refused_session_is_session_not_created() {
    let mock = MockServer::start(|method, path, _body| match (method, path) {
        ("POST", "/session") => MockResponse::error(500, 33, "no browsers available"),
        _ => MockResponse::unknown_command(),
    })
    .await;

    let server = Server::new(&mock.url()).unwrap();
    let result = server.create_session(chrome_caps()).await;
    match result {
        Err(NewSessionError::SessionNotCreated(e)) => {
            assert_eq!(e.status, Status::SessionNotCreatedException);
            assert_eq!(e.message, "no browsers available");
        }
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn no_content_synthesizes_success() {
    let mock = MockServer::start(|method, path, _body| match (method, path) {
        ("DELETE", "/session/s1") => MockResponse::no_content(),
        _ => MockResponse::unknown_command(),
    })
    .await;

    let server = Server::new(&mock.url()).unwrap();
    server.delete_session("s1").await.unwrap();
}

#[tokio::test]
async fn plain_text_error_bodies_are_normalized() {
    let mock = MockServer::start(|method, path, _body| match (method, path) {
        ("GET", "/status") => MockResponse::text(404, "these are not the droids"),
        _ => MockResponse::unknown_command(),
    })
    .await;

    let server = Server::new(&mock.url()).unwrap();
    match server.get_status().await {
        Err(CmdError::Standard(e)) => {
            assert_eq!(e.status, Status::UnknownCommand);
            assert_eq!(e.message, "these are not the droids");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn unsupported_operation_classes_become_unknown_command() {
    let mock = MockServer::start(|method, path, _body| match (method, path) {
        ("GET", "/status") => MockResponse::raw(
            500,
            json!({
                "status": 13,
                "value": {
                    "message": "nope",
                    "class": "org.openqa.selenium.UnsupportedCommandException",
                },
            }),
        ),
        _ => MockResponse::unknown_command(),
    })
    .await;

    let server = Server::new(&mock.url()).unwrap();
    let error = server.get_status().await.unwrap_err();
    assert!(error.is_unknown_command());
}

#[tokio::test]
async fn w3c_error_strings_map_through_the_registry() {
    let mock = MockServer::start(|method, path, _body| match (method, path) {
        ("GET", "/status") => MockResponse::raw(
            404,
            json!({ "value": { "error": "no such window", "message": "window is gone" } }),
        ),
        _ => MockResponse::unknown_command(),
    })
    .await;

    let server = Server::new(&mock.url()).unwrap();
    match server.get_status().await {
        Err(CmdError::Standard(e)) => {
            assert_eq!(e.status, Status::NoSuchWindow);
            assert_eq!(e.message, "window is gone");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn credentials_fold_into_basic_auth() {
    let mock = MockServer::start(|method, path, _body| match (method, path) {
        ("GET", "/status") => MockResponse::ok(json!({"ready": true})),
        _ => MockResponse::unknown_command(),
    })
    .await;

    let options = HttpOptions {
        username: Some("user".to_string()),
        password: None,
        access_key: Some("sekrit".to_string()),
    };
    let server = Server::with_options(&mock.url(), options).unwrap();
    server.get_status().await.unwrap();

    let request = &mock.requests_to("/status")[0];
    // user:sekrit, base64-encoded
    assert_eq!(request.authorization.as_deref(), Some("Basic dXNlcjpzZWtyaXQ="));
    // The handle never exposes the credentials.
    assert!(!server.url().contains("sekrit"));
}

#[tokio::test]
async fn bodyless_requests_carry_content_length_zero() {
    let mock = MockServer::start(|method, path, _body| match (method, path) {
        ("DELETE", "/session/s1") => MockResponse::ok(json!(null)),
        _ => MockResponse::unknown_command(),
    })
    .await;

    let server = Server::new(&mock.url()).unwrap();
    server.delete_session("s1").await.unwrap();

    let request = &mock.requests_to("/session/s1")[0];
    assert_eq!(request.content_length.as_deref(), Some("0"));
}

#[tokio::test]
async fn path_parts_are_url_encoded() {
    let mock = MockServer::start(|method, path, _body| {
        match (method, path) {
            ("GET", "/session/a%20b") => MockResponse::ok(json!({})),
            _ => MockResponse::unknown_command(),
        }
    })
    .await;

    let server = Server::new(&mock.url()).unwrap();
    server.get_session_capabilities("a b").await.unwrap();
}

#[tokio::test]
async fn session_listing_accepts_both_id_spellings() {
    let mock = MockServer::start(|method, path, _body| match (method, path) {
        ("GET", "/sessions") => MockResponse::ok(json!([
            { "id": "one", "capabilities": { "browserName": "chrome" } },
            { "sessionId": "two", "capabilities": { "browserName": "firefox" } },
        ])),
        _ => MockResponse::unknown_command(),
    })
    .await;

    let server = Server::new(&mock.url()).unwrap();
    let sessions = server.get_sessions().await.unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].id, "one");
    assert_eq!(sessions[1].id, "two");
    assert_eq!(sessions[1].capabilities.string("browserName"), Some("firefox"));
}
