//! Session behavior: request serialization, the timeout state machine, and
//! the per-driver quirk fallbacks.

mod common;

use common::{create_mock_session, with_handshake, MockResponse, MockServer};
use hansom::{CmdError, Status, Strategy, Timeout};
use serde_json::{json, Value as Json};

const S: &str = "/session/mock-session";

fn sub(path: &str) -> String {
    format!("{}{}", S, path)
}

#[tokio::test]
async fn requests_are_serialized_per_session() {
    let mock = MockServer::start(with_handshake(json!({}), |method, path, _body| {
        match (method, path) {
            ("GET", p) if p.ends_with("/title") => {
                MockResponse::ok(json!("The Title")).delay(100)
            }
            ("GET", p) if p.ends_with("/url") => MockResponse::ok(json!("http://a/")),
            _ => MockResponse::unknown_command(),
        }
    }))
    .await;

    let (_server, session) = create_mock_session(&mock).await;

    // Issue both without awaiting the first.
    let (title, url) = tokio::join!(session.get_page_title(), session.get_current_url());
    assert_eq!(title.unwrap(), "The Title");
    assert_eq!(url.unwrap(), "http://a/");

    let requests: Vec<_> = mock
        .requests()
        .into_iter()
        .filter(|r| r.path != "/session")
        .collect();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].path, sub("/title"));
    assert_eq!(requests[1].path, sub("/url"));
    // The second request must not start until the first response completed.
    assert!(requests[1].started >= requests[0].finished);
    assert_eq!(mock.max_concurrency(), 1);
}

#[tokio::test]
async fn broken_mouse_events_are_simulated_in_page() {
    let mock = MockServer::start(with_handshake(
        json!({ "brokenMouseEvents": true }),
        |method, path, _body| match (method, path) {
            ("POST", p) if p.ends_with("/element") => {
                MockResponse::ok(json!({ "ELEMENT": "e1" }))
            }
            ("POST", p) if p.ends_with("/execute") => {
                MockResponse::ok(json!({ "x": 105, "y": 205 }))
            }
            _ => MockResponse::unknown_command(),
        },
    ))
    .await;

    let (_server, session) = create_mock_session(&mock).await;
    let element = session.find(Strategy::Id, "target").await.unwrap();
    session.move_mouse_to(Some(&element), Some(5), Some(5)).await.unwrap();

    // The move went through the in-page simulator, not /moveto.
    assert!(mock.requests_to("/moveto").is_empty());
    let executes = mock.requests_to("/execute");
    assert_eq!(executes.len(), 1);
    let kwargs = &executes[0].body["args"][0];
    assert_eq!(kwargs["action"], json!("mousemove"));
    assert_eq!(kwargs["xOffset"], json!(5));
    assert_eq!(kwargs["position"], json!({ "x": 0, "y": 0 }));

    // The next simulated action starts from the position the page reported.
    session.click_mouse_button(0).await.unwrap();
    let executes = mock.requests_to("/execute");
    assert_eq!(executes.len(), 2);
    let kwargs = &executes[1].body["args"][0];
    assert_eq!(kwargs["action"], json!("click"));
    assert_eq!(kwargs["position"], json!({ "x": 105, "y": 205 }));
}

#[tokio::test]
async fn broken_delete_cookie_expires_through_the_page() {
    let mock = MockServer::start(with_handshake(
        json!({ "brokenDeleteCookie": true }),
        |method, path, _body| match (method, path) {
            ("GET", p) if p.ends_with("/cookie") => MockResponse::ok(json!([
                { "name": "sid", "value": "v", "path": "/" },
                { "name": "other", "value": "w", "path": "/" },
            ])),
            ("POST", p) if p.ends_with("/execute") => MockResponse::ok(Json::Null),
            _ => MockResponse::unknown_command(),
        },
    ))
    .await;

    let (_server, session) = create_mock_session(&mock).await;
    session.delete_cookie("sid").await.unwrap();

    // A single script call expires the one matching cookie; the page itself
    // supplies the encoded domain for the expired stand-in.
    let executes = mock.requests_to("/execute");
    assert_eq!(executes.len(), 1);
    let script = executes[0].body["script"].as_str().unwrap();
    assert!(script.contains("'=; expires=Thu, 01 Jan 1970 00:00:00 GMT; domain='"), "got: {}", script);
    assert!(script.contains("encodeURIComponent(document.domain)"));
    assert!(script.contains("'; path='"));
    assert_eq!(
        executes[0].body["args"][0],
        json!([{ "name": "sid", "path": "/" }])
    );
    // The DELETE endpoint is known broken and never tried.
    assert!(mock.requests().iter().all(|r| r.method != "DELETE"));
}

#[tokio::test]
async fn set_cookie_falls_back_to_document_cookie() {
    let mock = MockServer::start(with_handshake(json!({}), |method, path, _body| {
        match (method, path) {
            ("POST", p) if p.ends_with("/cookie") => MockResponse::unknown_command(),
            ("POST", p) if p.ends_with("/execute") => MockResponse::ok(Json::Null),
            _ => MockResponse::unknown_command(),
        }
    }))
    .await;

    let (_server, session) = create_mock_session(&mock).await;
    let mut cookie = hansom::Cookie::new("sid", "v");
    cookie.set_path("/app");
    session.set_cookie(&cookie).await.unwrap();

    let executes = mock.requests_to("/execute");
    assert_eq!(executes.len(), 1);
    let assignment = executes[0].body["args"][0].as_str().unwrap();
    assert!(assignment.starts_with("sid=v"));
    assert!(assignment.contains("path=/app"));
}

#[tokio::test]
async fn invalid_cookie_names_are_rejected_before_the_page() {
    let mock = MockServer::start(with_handshake(json!({}), |method, path, _body| {
        match (method, path) {
            ("POST", p) if p.ends_with("/cookie") => MockResponse::unknown_command(),
            _ => MockResponse::unknown_command(),
        }
    }))
    .await;

    let (_server, session) = create_mock_session(&mock).await;
    let cookie = hansom::Cookie::new("bad name", "v");
    let error = session.set_cookie(&cookie).await.unwrap_err();
    assert_eq!(error.wire_status(), Some(Status::UnableToSetCookie));
    assert!(mock.requests_to("/execute").is_empty());
}

#[tokio::test]
async fn timeouts_cache_follows_acknowledged_values() {
    let mock = MockServer::start(with_handshake(json!({}), |method, path, _body| {
        match (method, path) {
            ("POST", p) if p.ends_with("/timeouts") => MockResponse::ok(Json::Null),
            _ => MockResponse::unknown_command(),
        }
    }))
    .await;

    let (_server, session) = create_mock_session(&mock).await;
    assert_eq!(session.get_find_timeout(), 0);

    session.set_timeout(Timeout::Implicit, 5000).await.unwrap();
    assert_eq!(session.get_find_timeout(), 5000);

    let body = &mock.requests_to("/timeouts")[0].body;
    assert_eq!(body["type"], json!("implicit"));
    assert_eq!(body["ms"], json!(5000));
}

#[tokio::test]
async fn timeouts_clamp_and_fall_back_to_legacy_endpoints() {
    let mock = MockServer::start(with_handshake(json!({}), |method, path, _body| {
        match (method, path) {
            ("POST", p) if p.ends_with("/timeouts") => MockResponse::unknown_command(),
            ("POST", p) if p.ends_with("/timeouts/async_script") => {
                MockResponse::ok(Json::Null)
            }
            _ => MockResponse::unknown_command(),
        }
    }))
    .await;

    let (_server, session) = create_mock_session(&mock).await;
    session.set_timeout(Timeout::Script, u64::MAX).await.unwrap();

    // Clamped to the signed 24-bit maximum.
    assert_eq!(session.get_execute_async_timeout(), hansom::MAX_TIMEOUT_MS);
    let legacy = &mock.requests_to("/timeouts/async_script")[0];
    assert_eq!(legacy.body["ms"], json!(hansom::MAX_TIMEOUT_MS));
}

#[tokio::test]
async fn failed_timeout_updates_leave_the_cache_alone() {
    let mock = MockServer::start(with_handshake(json!({}), |method, path, _body| {
        match (method, path) {
            ("POST", p) if p.ends_with("/timeouts") => {
                MockResponse::error(500, 13, "boom")
            }
            _ => MockResponse::unknown_command(),
        }
    }))
    .await;

    let (_server, session) = create_mock_session(&mock).await;
    let before = session.get_page_load_timeout();
    assert!(session.set_timeout(Timeout::PageLoad, 1234).await.is_err());
    assert_eq!(session.get_page_load_timeout(), before);
}

#[tokio::test]
async fn zero_timeouts_send_one_on_broken_drivers() {
    let mock = MockServer::start(with_handshake(
        json!({ "brokenZeroTimeout": true }),
        |method, path, _body| match (method, path) {
            ("POST", p) if p.ends_with("/timeouts") => MockResponse::ok(Json::Null),
            _ => MockResponse::unknown_command(),
        },
    ))
    .await;

    let (_server, session) = create_mock_session(&mock).await;
    session.set_timeout(Timeout::Implicit, 0).await.unwrap();
    assert_eq!(mock.requests_to("/timeouts")[0].body["ms"], json!(1));
}

#[tokio::test]
async fn closed_windows_are_tracked_when_delete_is_broken() {
    let mock = MockServer::start(with_handshake(json!({}), |method, path, _body| {
        match (method, path) {
            ("DELETE", p) if p.ends_with("/window") => MockResponse::unknown_command(),
            ("GET", p) if p.ends_with("/window_handle") => MockResponse::ok(json!("w1")),
            ("GET", p) if p.ends_with("/window_handles") => {
                MockResponse::ok(json!(["w1", "w2"]))
            }
            ("POST", p) if p.ends_with("/execute") => MockResponse::ok(Json::Null),
            _ => MockResponse::unknown_command(),
        }
    }))
    .await;

    let (_server, session) = create_mock_session(&mock).await;
    session.close_current_window().await.unwrap();

    // The driver keeps listing the window it could not close; the session
    // lies on its behalf.
    let handles = session.get_all_window_handles().await.unwrap();
    assert_eq!(handles, vec!["w2".to_string()]);

    let error = session.get_current_window_handle().await.unwrap_err();
    assert_eq!(error.wire_status(), Some(Status::NoSuchWindow));
}

#[tokio::test]
async fn manual_link_text_search_replaces_the_locator() {
    let mock = MockServer::start(with_handshake(
        json!({ "brokenWhitespaceNormalization": true }),
        |method, path, body| match (method, path) {
            ("POST", p) if p.ends_with("/execute") => {
                let text = body["args"][3].as_str().unwrap_or("");
                if text == "present link" {
                    MockResponse::ok(json!({ "ELEMENT": "e9" }))
                } else {
                    MockResponse::ok(Json::Null)
                }
            }
            _ => MockResponse::unknown_command(),
        },
    ))
    .await;

    let (_server, session) = create_mock_session(&mock).await;

    let element = session.find(Strategy::LinkText, "present link").await.unwrap();
    assert_eq!(element.element_id(), "e9");
    // The driver's own locator is never consulted.
    assert!(mock.requests_to("/element").is_empty());

    let error = session.find(Strategy::LinkText, "absent link").await.unwrap_err();
    assert_eq!(error.wire_status(), Some(Status::NoSuchElement));
}

#[tokio::test]
async fn w3c_locators_are_translated() {
    let mock = MockServer::start(with_handshake(
        json!({ "isWebDriver": true }),
        |method, path, _body| match (method, path) {
            ("POST", p) if p.ends_with("/element") => {
                MockResponse::raw(200, json!({ "value": { "ELEMENT": "e1" } }))
            }
            _ => MockResponse::unknown_command(),
        },
    ))
    .await;

    let (_server, session) = create_mock_session(&mock).await;
    session.find(Strategy::Id, "main").await.unwrap();

    let request = &mock.requests_to("/element")[0];
    assert_eq!(request.body["using"], json!("css selector"));
    assert_eq!(request.body["value"], json!("#main"));
}

#[tokio::test]
async fn broken_undefined_returns_coerce_to_null() {
    let mock = MockServer::start(with_handshake(
        json!({ "brokenExecuteUndefinedReturn": true }),
        |method, path, _body| match (method, path) {
            ("POST", p) if p.ends_with("/execute") => MockResponse::ok(json!("undefined")),
            _ => MockResponse::unknown_command(),
        },
    ))
    .await;

    let (_server, session) = create_mock_session(&mock).await;
    let value = session.execute("return undefined;", vec![]).await.unwrap();
    assert_eq!(value, Json::Null);
}

#[tokio::test]
async fn window_size_errors_survive_the_restore_switch() {
    // implicitWindowHandles forces a round-trip through the target window;
    // the sizing failure must surface even when switching back also fails.
    let mock = MockServer::start(with_handshake(
        json!({ "implicitWindowHandles": true }),
        |method, path, body| match (method, path) {
            ("GET", p) if p.ends_with("/window_handle") => MockResponse::ok(json!("w1")),
            ("POST", p) if p.ends_with("/window") => {
                if body["name"] == json!("w1") {
                    MockResponse::error(500, 13, "switch back failed")
                } else {
                    MockResponse::ok(Json::Null)
                }
            }
            ("POST", p) if p.ends_with("/window/current/size") => {
                MockResponse::error(500, 13, "cannot resize")
            }
            _ => MockResponse::unknown_command(),
        },
    ))
    .await;

    let (_server, session) = create_mock_session(&mock).await;
    let error = session.set_window_size_of("w2", 800, 600).await.unwrap_err();
    assert_eq!(error.wire_status(), Some(Status::UnknownError));
    assert!(error.to_string().contains("cannot resize"));

    // Both the target switch and the attempted restore hit the wire.
    let switches: Vec<Json> =
        mock.requests_to("/window").into_iter().map(|r| r.body["name"].clone()).collect();
    assert_eq!(switches, vec![json!("w2"), json!("w1")]);
}

#[tokio::test]
async fn execute_unknown_errors_become_javascript_errors() {
    let mock = MockServer::start(with_handshake(json!({}), |method, path, _body| {
        match (method, path) {
            ("POST", p) if p.ends_with("/execute") => {
                MockResponse::error(500, 13, "something in the script broke")
            }
            _ => MockResponse::unknown_command(),
        }
    }))
    .await;

    let (_server, session) = create_mock_session(&mock).await;
    let error = session.execute("return 1;", vec![]).await.unwrap_err();
    assert_eq!(error.wire_status(), Some(Status::JavaScriptError));
}

#[tokio::test]
async fn broken_empty_post_substitutes_an_empty_object() {
    let mock = MockServer::start(with_handshake(
        json!({ "brokenEmptyPost": true }),
        |method, path, body| match (method, path) {
            ("POST", p) if p.ends_with("/refresh") => {
                if body.is_object() {
                    MockResponse::ok(Json::Null)
                } else {
                    MockResponse::error(400, 13, "missing body")
                }
            }
            _ => MockResponse::unknown_command(),
        },
    ))
    .await;

    let (_server, session) = create_mock_session(&mock).await;
    session.refresh().await.unwrap();
    assert_eq!(mock.requests_to("/refresh")[0].body, json!({}));
}

#[tokio::test]
async fn selendroid_log_lines_are_parsed() {
    let mock = MockServer::start(with_handshake(json!({}), |method, path, _body| {
        match (method, path) {
            ("POST", p) if p.ends_with("/log") => MockResponse::ok(json!([
                "[2014-05-08 17:10:00] [INFO] hello",
                "mystery line",
            ])),
            _ => MockResponse::unknown_command(),
        }
    }))
    .await;

    let (_server, session) = create_mock_session(&mock).await;
    let entries = session.get_logs_for("browser").await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].level, "INFO");
    assert_eq!(entries[0].message, "hello");
    assert!(entries[1].timestamp.is_nan());
    assert_eq!(entries[1].level, "INFO");
    assert_eq!(entries[1].message, "mystery line");
}

#[tokio::test]
async fn fixed_log_types_short_circuit_the_wire() {
    let mock = MockServer::start(with_handshake(
        json!({ "fixedLogTypes": ["browser"] }),
        |_method, _path, _body| MockResponse::unknown_command(),
    ))
    .await;

    let (_server, session) = create_mock_session(&mock).await;
    let types = session.get_available_log_types().await.unwrap();
    assert_eq!(types, vec!["browser".to_string()]);
    assert!(mock.requests_to("/log/types").is_empty());
}

#[tokio::test]
async fn cancelled_requests_never_reach_the_driver() {
    let mock = MockServer::start(with_handshake(json!({}), |method, path, _body| {
        match (method, path) {
            ("GET", p) if p.ends_with("/title") => MockResponse::ok(json!("t")).delay(100),
            ("GET", p) if p.ends_with("/url") => MockResponse::ok(json!("u")),
            _ => MockResponse::unknown_command(),
        }
    }))
    .await;

    let (_server, session) = create_mock_session(&mock).await;

    // Queue a slow request, then one we drop before it reaches the head of
    // the queue.
    let slow = session.get_page_title();
    tokio::pin!(slow);
    // Poll the slow request once so it enters the queue first.
    futures_util::future::poll_immediate(slow.as_mut()).await;

    {
        let dropped = session.get_current_url();
        tokio::pin!(dropped);
        futures_util::future::poll_immediate(dropped.as_mut()).await;
        // Dropped here, while still queued behind the slow request.
    }

    slow.await.unwrap();
    assert_eq!(mock.requests_to("/url").len(), 0);
    assert_eq!(mock.requests_to("/title").len(), 1);
}

#[tokio::test]
async fn geolocation_altitude_quirk() {
    let mock = MockServer::start(with_handshake(json!({}), |method, path, _body| {
        match (method, path) {
            ("GET", p) if p.ends_with("/location") => MockResponse::ok(json!({
                "latitude": 1.0, "longitude": 2.0, "altitude": 0.0,
            })),
            ("POST", p) if p.ends_with("/location") => MockResponse::ok(Json::Null),
            _ => MockResponse::unknown_command(),
        }
    }))
    .await;

    let (_server, session) = create_mock_session(&mock).await;

    // ChromeDriver 2.9 reports altitude 0 when none was ever set.
    let location = session.get_geolocation().await.unwrap();
    assert_eq!(location.altitude, None);

    // Once a zero altitude has really been set, it is believed.
    session
        .set_geolocation(&hansom::Geolocation {
            latitude: 1.0,
            longitude: 2.0,
            altitude: Some(0.0),
        })
        .await
        .unwrap();
    let location = session.get_geolocation().await.unwrap();
    assert_eq!(location.altitude, Some(0.0));
}

#[tokio::test]
async fn element_fallbacks_follow_capability_flags() {
    let mock = MockServer::start(with_handshake(
        json!({
            "brokenSubmitElement": true,
            "brokenNullGetSpecAttribute": true,
        }),
        |method, path, _body| match (method, path) {
            ("POST", p) if p.ends_with("/element") => {
                MockResponse::ok(json!({ "ELEMENT": "e1" }))
            }
            ("POST", p) if p.ends_with("/execute") => MockResponse::ok(Json::Null),
            ("GET", p) if p.ends_with("/attribute/missing") => MockResponse::ok(json!("")),
            _ => MockResponse::unknown_command(),
        },
    ))
    .await;

    let (_server, session) = create_mock_session(&mock).await;
    let element = session.find(Strategy::CssSelector, "form input").await.unwrap();

    element.submit().await.unwrap();
    let executes = mock.requests_to("/execute");
    assert_eq!(executes.len(), 1);
    assert!(executes[0].body["script"].as_str().unwrap().contains("submit.call"));
    assert!(mock.requests_to("/submit").is_empty());

    // Empty string means "absent" on these drivers.
    let value = element.get_spec_attribute("missing").await.unwrap();
    assert_eq!(value, None);
}

#[tokio::test]
async fn quit_deletes_the_session() {
    let mock = MockServer::start(with_handshake(json!({}), |method, path, _body| {
        match (method, path) {
            ("DELETE", "/session/mock-session") => MockResponse::ok(Json::Null),
            _ => MockResponse::unknown_command(),
        }
    }))
    .await;

    let (_server, session) = create_mock_session(&mock).await;
    session.quit().await.unwrap();
    assert_eq!(mock.requests_to("/session/mock-session").len(), 1);
}

#[tokio::test]
async fn errors_carry_a_redacted_request_summary() {
    let mock = MockServer::start(with_handshake(json!({}), |method, path, _body| {
        match (method, path) {
            ("GET", p) if p.ends_with("/title") => MockResponse::error(500, 13, "boom"),
            _ => MockResponse::unknown_command(),
        }
    }))
    .await;

    let (_server, session) = create_mock_session(&mock).await;
    match session.get_page_title().await {
        Err(CmdError::Standard(e)) => {
            let request = e.request.expect("request summary");
            assert_eq!(request.method, http::Method::GET);
            assert!(request.url.ends_with("/session/mock-session/title"));
            assert_eq!(e.response.as_deref(), Some(r#"{"status":13,"value":{"message":"boom"}}"#));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}
