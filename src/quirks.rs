//! The capability filler: a static known-defects table plus runtime probes.
//!
//! The static half is a pure function of `(browserName, browserVersion,
//! platformName)` and always applies, even when detection is disabled. The
//! probe half drives the live session through a battery of small checks to
//! fill in whatever the table left unset, navigating to `about:blank`
//! between groups so no probe inherits another's page state.
//!
//! Caller-supplied capabilities always win: both halves only ever set keys
//! that are still missing.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde_json::{json, Map, Value as Json};
use std::time::Duration;

use crate::capabilities::Capabilities;
use crate::error::CmdError;
use crate::locator::Strategy;
use crate::session::{Geolocation, Session, Timeout};

/// Fill the session's capabilities. Idempotent: a second call is a no-op.
pub(crate) async fn fill_capabilities(session: &Session, detect: bool) -> Result<(), CmdError> {
    if session.capabilities().is_filled() {
        return Ok(());
    }

    let fixed = known_defects(&session.capabilities());
    session.update_capabilities(|caps| caps.merge_missing(fixed));

    if detect {
        run_probes(session).await?;
    }

    session.update_capabilities(Capabilities::set_filled);
    Ok(())
}

// The accumulated browser-defect lore, keyed by identity. Only fills gaps;
// a caller who already set a flag keeps their value.
pub(crate) fn known_defects(caps: &Capabilities) -> Map<String, Json> {
    let browser = caps.browser_name();
    let version = caps.browser_version();
    let platform = caps.platform();

    let mut fixed = Map::new();
    let mut set = |key: &str, value: Json| {
        fixed.insert(key.to_string(), value);
    };

    match browser.as_str() {
        "safari" => {
            set("brokenWindowSwitch", json!(true));
            set("brokenSubmitElement", json!(true));
            if version.major() < 12 {
                set("brokenCookies", json!(true));
            }
            if version.major() == 10 {
                set("supportsExecuteAsync", json!(false));
            }
            // Native safaridriver reports version numbers in the thousands.
            if version.major() >= 1000 {
                set("isWebDriver", json!(true));
                set("brokenLinkTextLocator", json!(true));
                set("brokenOptionSelect", json!(true));
                set("brokenWhitespaceNormalization", json!(true));
                set("fixedLogTypes", json!([]));
                set("usesWebDriverActiveElement", json!(true));
            }
        }
        "firefox" => {
            if version.major() >= 49 {
                set("isWebDriver", json!(true));
                set("supportsKeysCommand", json!(false));
                set("usesWebDriverLocators", json!(true));
                set("usesWebDriverTimeouts", json!(true));
                set("usesHandleParameter", json!(true));
                set("usesFlatKeysArray", json!(true));
                set("brokenEmptyPost", json!(true));
                set("brokenMouseEvents", json!(true));
                set("fixedLogTypes", json!([]));
            }
            if (49..53).contains(&version.major()) {
                set("brokenWindowSwitch", json!(true));
            }
            if version.major() >= 53 {
                set("usesWebDriverWindowCommands", json!(true));
            }
        }
        "internet explorer" => {
            if version.major() == 11 {
                set("takesScreenshot", json!(true));
                set("brokenSubmitElement", json!(true));
            }
            if version.major() >= 11 {
                set("brokenOptionSelect", json!(false));
            }
            if version.major() <= 9 {
                set("scriptedParentFrameCrashesBrowser", json!(true));
            }
        }
        "microsoftedge" | "edge" => {
            set("returnsFromClickImmediately", json!(true));
            set("brokenDeleteCookie", json!(true));
            set("brokenClick", json!(true));
            set("remoteFiles", json!(false));
            if version <= crate::capabilities::BrowserVersion::parse("25.10586") {
                set("brokenWindowClose", json!(true));
            }
            if version <= crate::capabilities::BrowserVersion::parse("38.14366") {
                set("brokenFileSendKeys", json!(true));
            }
            if version <= crate::capabilities::BrowserVersion::parse("37.14316") {
                set("handlesAlerts", json!(true));
            }
        }
        _ => {}
    }

    let is_ios = platform.contains("ios")
        || caps.string("deviceName").map(|d| {
            let d = d.to_lowercase();
            d.contains("iphone") || d.contains("ipad")
        }) == Some(true);
    let shortcut = if is_ios {
        Json::Null
    } else if platform.contains("mac") || platform.contains("darwin") {
        json!(crate::keys::Key::Command.name())
    } else {
        json!(crate::keys::Key::Control.name())
    };
    set("shortcutKey", shortcut);

    fixed
}

// Interpret a probe outcome. A status-coded answer means the feature is
// broken or unsupported; a transport failure means the driver is gone and
// filling must stop.
fn probe_ok<T>(result: Result<T, CmdError>) -> Result<bool, CmdError> {
    match result {
        Ok(_) => Ok(true),
        Err(e) if e.is_transport() => Err(e),
        Err(_) => Ok(false),
    }
}

struct Prober<'a> {
    session: &'a Session,
}

impl<'a> Prober<'a> {
    fn unset(&self, key: &str) -> bool {
        !self.session.capabilities().contains(key)
    }

    fn set(&self, key: &str, value: impl Into<Json>) {
        let value = value.into();
        self.session.update_capabilities(|caps| {
            if !caps.contains(key) {
                caps.insert(key, value);
            }
        });
    }

    // Loads a page of probe HTML. Data URIs are the fast path; IE and Edge
    // need a real page (their initial browser URL) with the markup injected,
    // and everything else gets about:blank plus document.write.
    async fn get_page(&self, html: &str) -> Result<(), CmdError> {
        let session = self.session;
        if !html.is_empty() && session.cap("supportsNavigationDataUris") {
            let encoded = utf8_percent_encode(html, NON_ALPHANUMERIC).to_string();
            return session.get(&format!("data:text/html;charset=utf-8,{}", encoded)).await;
        }

        let browser = session.capabilities().browser_name();
        let version = session.capabilities().browser_version();
        let is_ie_or_edge = browser == "microsoftedge"
            || browser == "edge"
            || (browser == "internet explorer" && version.major() <= 10);
        if is_ie_or_edge {
            let initial = session.cap_string("initialBrowserUrl").or_else(|| {
                session
                    .cap_value("se:ieOptions")
                    .as_ref()
                    .and_then(|v| v.get("initialBrowserUrl"))
                    .and_then(Json::as_str)
                    .map(str::to_string)
            });
            if let Some(url) = initial {
                session.get(&url).await?;
                if !html.is_empty() {
                    let body = html.trim_start_matches("<!DOCTYPE html>").trim_start();
                    session
                        .execute(
                            "document.body.innerHTML = arguments[0]; return null;",
                            vec![json!(body)],
                        )
                        .await?;
                }
                return Ok(());
            }
        }

        session.get("about:blank").await?;
        if !html.is_empty() {
            session
                .execute(
                    "document.write(arguments[0]); document.close(); return null;",
                    vec![json!(html)],
                )
                .await?;
        }
        Ok(())
    }

    async fn blank(&self) -> Result<(), CmdError> {
        self.get_page("").await
    }
}

async fn run_probes(session: &Session) -> Result<(), CmdError> {
    let prober = Prober { session };

    probe_server_features(&prober).await?;
    prober.blank().await?;
    probe_features(&prober).await?;
    prober.blank().await?;
    probe_defects(&prober).await?;
    prober.blank().await?;

    Ok(())
}

async fn probe_server_features(p: &Prober<'_>) -> Result<(), CmdError> {
    let session = p.session;

    // Some grids 404 the sessions listing.
    if p.unset("brokenSessionList") {
        let ok = probe_ok(session.server().get_sessions().await)?;
        p.set("brokenSessionList", !ok);
    }

    // The W3C window-rect command doubles as the signal for the rest of the
    // W3C window command family.
    if p.unset("supportsWindowRectCommand") {
        let ok = probe_ok(session.server_get("window/rect", &[]).await)?;
        p.set("supportsWindowRectCommand", ok);
        p.set("usesWebDriverWindowCommands", ok);
    }

    // W3C renamed the switch-to-window parameter from `name` to `handle`.
    if p.unset("usesHandleParameter") {
        let handle = match session.get_current_window_handle().await {
            Ok(handle) => Some(handle),
            Err(e) if e.is_transport() => return Err(e),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            let by_name = probe_ok(
                session
                    .server_post("window", Some(json!({ "name": handle })), &[])
                    .await,
            )?;
            if by_name {
                p.set("usesHandleParameter", false);
            } else {
                let by_handle = probe_ok(
                    session
                        .server_post("window", Some(json!({ "handle": handle })), &[])
                        .await,
                )?;
                p.set("usesHandleParameter", by_handle);
            }
        }
    }

    // A POST with no body at all upsets some drivers.
    if p.unset("brokenEmptyPost") {
        let ok = probe_ok(session.server_post("refresh", None, &[]).await)?;
        p.set("brokenEmptyPost", !ok);
    }

    Ok(())
}

async fn probe_features(p: &Prober<'_>) -> Result<(), CmdError> {
    let session = p.session;

    if p.unset("touchEnabled") {
        let ok = probe_ok(session.press_finger(0, 0).await)?;
        if ok {
            let _ = session.release_finger(0, 0).await;
        }
        p.set("touchEnabled", ok);
    }

    if p.unset("rotatable") {
        let ok = probe_ok(session.get_orientation().await)?;
        p.set("rotatable", ok);
    }

    if p.unset("locationContextEnabled") {
        let supported = match session.get_geolocation().await {
            Ok(_) => true,
            Err(e) if e.is_transport() => return Err(e),
            // ios-driver refuses to read a location before one is set.
            Err(CmdError::Standard(ref w)) if w.message.contains("Location must be set") => {
                let location = Geolocation {
                    latitude: 12.1,
                    longitude: 22.33,
                    altitude: None,
                };
                session.set_geolocation(&location).await.is_ok()
                    && session.get_geolocation().await.is_ok()
            }
            Err(_) => false,
        };
        p.set("locationContextEnabled", supported);
    }

    if p.unset("webStorageEnabled") {
        let ok = probe_ok(session.get_local_storage_length().await)?;
        p.set("webStorageEnabled", ok);
    }

    if p.unset("takesScreenshot") {
        let ok = probe_ok(session.take_screenshot().await)?;
        p.set("takesScreenshot", ok);
    }

    if p.unset("supportsExecuteAsync") {
        let original = session.get_execute_async_timeout();
        let _ = session.set_execute_async_timeout(1000).await;
        let ok = probe_ok(
            session
                .execute_async("arguments[arguments.length - 1](true);", vec![])
                .await,
        )?;
        let _ = session.set_execute_async_timeout(original).await;
        p.set("supportsExecuteAsync", ok);
    }

    if p.unset("supportsNavigationDataUris") {
        let result = session
            .get("data:text/html;charset=utf-8,%3Ctitle%3EData%20URI%3C%2Ftitle%3E")
            .await;
        let on_data_page = match result {
            Ok(()) => {
                let protocol = session.execute("return location.protocol;", vec![]).await;
                match protocol {
                    Ok(value) => value.as_str() == Some("data:"),
                    Err(e) if e.is_transport() => return Err(e),
                    Err(_) => false,
                }
            }
            Err(e) if e.is_transport() => return Err(e),
            Err(_) => false,
        };
        p.set("supportsNavigationDataUris", on_data_page);
        let _ = session.get("about:blank").await;
    }

    if p.unset("dynamicViewport") {
        let supported = match session.get_window_size().await {
            Ok((width, height)) => {
                probe_ok(session.set_window_size(width, height).await)?
            }
            Err(e) if e.is_transport() => return Err(e),
            Err(_) => false,
        };
        p.set("dynamicViewport", supported);
    }

    if p.unset("supportsCssTransforms") {
        p.get_page(
            "<!DOCTYPE html><div id=\"a\" style=\"width:100px;height:100px;\
             -webkit-transform:scale(0.5);transform:scale(0.5);\"></div>",
        )
        .await?;
        let script = "\
            var rect = document.getElementById('a').getBoundingClientRect();\
            return Math.round(rect.width) === 50;";
        let supported = match session.execute(script, vec![]).await {
            Ok(value) => value.as_bool() == Some(true),
            Err(e) if e.is_transport() => return Err(e),
            Err(_) => false,
        };
        p.set("supportsCssTransforms", supported);
    }

    if p.unset("supportsKeysCommand") {
        let ok = probe_ok(
            session
                .server_post("keys", Some(json!({ "value": ["a"] })), &[])
                .await,
        )?;
        p.set("supportsKeysCommand", ok);
    }

    Ok(())
}

async fn probe_defects(p: &Prober<'_>) -> Result<(), CmdError> {
    let session = p.session;

    if p.unset("brokenActiveElement") {
        let ok = probe_ok(session.server_post("element/active", None, &[]).await)?;
        p.set("brokenActiveElement", !ok);
    }

    if p.unset("brokenExecuteUndefinedReturn") {
        // A sound driver answers null; the broken ones error out or hand
        // back the string "undefined".
        let broken = match session.execute("return undefined;", vec![]).await {
            Ok(value) => value.as_str() == Some("undefined"),
            Err(e) if e.is_transport() => return Err(e),
            Err(_) => true,
        };
        p.set("brokenExecuteUndefinedReturn", broken);
    }

    if p.unset("brokenExecuteElementReturn") || p.unset("brokenElementSerialization") {
        p.get_page("<!DOCTYPE html><div id=\"a\"></div>").await?;
        let result = session
            .execute("return document.getElementById('a');", vec![])
            .await;
        match result {
            Ok(value) => {
                let parsed = crate::element::parse_element_ref(&value);
                if p.unset("brokenElementSerialization") {
                    p.set("brokenElementSerialization", parsed.is_err());
                }
                let usable = match parsed {
                    Ok(id) => probe_ok(
                        crate::element::Element::new(session.clone(), id).get_tag_name().await,
                    )?,
                    Err(_) => false,
                };
                p.set("brokenExecuteElementReturn", !usable);
            }
            Err(e) if e.is_transport() => return Err(e),
            Err(_) => {
                p.set("brokenElementSerialization", true);
                p.set("brokenExecuteElementReturn", true);
            }
        }
    }

    if p.unset("brokenElementDisplayedOpacity") {
        p.get_page("<!DOCTYPE html><div id=\"a\" style=\"opacity:0;\">a</div>").await?;
        let displayed = displayed_by_driver(session, "a").await?;
        // Invisible element reported visible: the driver ignores opacity.
        p.set("brokenElementDisplayedOpacity", displayed == Some(true));
    }

    if p.unset("brokenElementDisplayedOffscreen") {
        p.get_page(
            "<!DOCTYPE html><div id=\"a\" \
             style=\"position:absolute;left:-1000px;top:-1000px;\">a</div>",
        )
        .await?;
        let displayed = displayed_by_driver(session, "a").await?;
        p.set("brokenElementDisplayedOffscreen", displayed == Some(true));
    }

    if p.unset("brokenWhitespaceNormalization") || p.unset("brokenLinkTextLocator") {
        p.get_page("<!DOCTYPE html><a href=\"#\">test\r\n  link</a><div>a  b</div>").await?;
        if p.unset("brokenWhitespaceNormalization") {
            let text = match session.find(Strategy::TagName, "div").await {
                Ok(element) => match element.get_visible_text().await {
                    Ok(text) => Some(text),
                    Err(e) if e.is_transport() => return Err(e),
                    Err(_) => None,
                },
                Err(e) if e.is_transport() => return Err(e),
                Err(_) => None,
            };
            let broken = match text {
                Some(text) => text.contains('\r') || text.contains("  "),
                None => true,
            };
            p.set("brokenWhitespaceNormalization", broken);
        }
        if p.unset("brokenLinkTextLocator") {
            let ok = probe_ok(session.find(Strategy::LinkText, "test link").await)?;
            p.set("brokenLinkTextLocator", !ok);
        }
    }

    if p.unset("brokenNullGetSpecAttribute") {
        p.get_page("<!DOCTYPE html><div id=\"a\"></div>").await?;
        match session.find(Strategy::Id, "a").await {
            Ok(element) => {
                let value = element.get_spec_attribute("nonexisting").await;
                match value {
                    // An empty string where null belongs is the defect.
                    Ok(value) => p.set("brokenNullGetSpecAttribute", value == Some(String::new())),
                    Err(e) if e.is_transport() => return Err(e),
                    Err(_) => p.set("brokenNullGetSpecAttribute", false),
                }
            }
            Err(e) if e.is_transport() => return Err(e),
            Err(_) => {}
        }
    }

    if p.unset("brokenComputedStyles") {
        p.get_page("<!DOCTYPE html><div id=\"a\" style=\"background-color:red;\">a</div>").await?;
        let working = match session.find(Strategy::Id, "a").await {
            Ok(element) => match element.get_computed_style("backgroundColor").await {
                Ok(value) => !value.is_empty(),
                Err(e) if e.is_transport() => return Err(e),
                Err(_) => false,
            },
            Err(e) if e.is_transport() => return Err(e),
            Err(_) => false,
        };
        p.set("brokenComputedStyles", !working);
    }

    if p.unset("brokenOptionSelect") {
        p.get_page(
            "<!DOCTYPE html><select id=\"s\"><option id=\"o1\">foo</option>\
             <option id=\"o2\">bar</option></select>",
        )
        .await?;
        let selected = match session.find(Strategy::Id, "o2").await {
            Ok(option) => {
                match option.click().await {
                    Ok(()) => match option.is_selected().await {
                        Ok(selected) => selected,
                        Err(e) if e.is_transport() => return Err(e),
                        Err(_) => false,
                    },
                    Err(e) if e.is_transport() => return Err(e),
                    Err(_) => false,
                }
            }
            Err(e) if e.is_transport() => return Err(e),
            Err(_) => false,
        };
        p.set("brokenOptionSelect", !selected);
    }

    if p.unset("brokenClick") {
        p.get_page("<!DOCTYPE html><input id=\"c\" type=\"checkbox\">").await?;
        let consistent = match session.find(Strategy::Id, "c").await {
            Ok(checkbox) => match checkbox.click().await {
                Ok(()) => match checkbox.is_selected().await {
                    Ok(selected) => selected,
                    Err(e) if e.is_transport() => return Err(e),
                    Err(_) => false,
                },
                Err(e) if e.is_transport() => return Err(e),
                Err(_) => false,
            },
            Err(e) if e.is_transport() => return Err(e),
            Err(_) => false,
        };
        p.set("brokenClick", !consistent);
    }

    if p.unset("brokenPageSource") {
        let ok = probe_ok(session.server_get("source", &[]).await)?;
        p.set("brokenPageSource", !ok);
    }

    if p.unset("brokenSubmitElement") {
        p.get_page(
            "<!DOCTYPE html><form method=\"get\" action=\"\">\
             <input type=\"hidden\" name=\"a\" value=\"1\">\
             <input id=\"submit\" type=\"submit\"></form>",
        )
        .await?;
        let propagated = match session.find(Strategy::Id, "submit").await {
            Ok(button) => match button.submit().await {
                Ok(()) => {
                    let search = session.execute("return location.search;", vec![]).await;
                    match search {
                        Ok(value) => value.as_str().map(|s| s.contains("a=1")).unwrap_or(false),
                        Err(e) if e.is_transport() => return Err(e),
                        Err(_) => false,
                    }
                }
                Err(e) if e.is_transport() => return Err(e),
                Err(_) => false,
            },
            Err(e) if e.is_transport() => return Err(e),
            Err(_) => false,
        };
        p.set("brokenSubmitElement", !propagated);
    }

    if p.unset("brokenWindowSize") || p.unset("brokenWindowMaximize") {
        match session.get_window_size().await {
            Ok((width, height)) => {
                if p.unset("brokenWindowSize") {
                    let round_trips = match session.set_window_size(width, height).await {
                        Ok(()) => match session.get_window_size().await {
                            Ok(size) => size == (width, height),
                            Err(e) if e.is_transport() => return Err(e),
                            Err(_) => false,
                        },
                        Err(e) if e.is_transport() => return Err(e),
                        Err(_) => false,
                    };
                    p.set("brokenWindowSize", !round_trips);
                }
                if p.unset("brokenWindowMaximize") {
                    let ok = probe_ok(session.maximize_window().await)?;
                    p.set("brokenWindowMaximize", !ok);
                    // Undo the maximize so later probes see a stable window.
                    let _ = session.set_window_size(width, height).await;
                }
            }
            Err(e) if e.is_transport() => return Err(e),
            Err(_) => {}
        }
    }

    if p.unset("brokenWindowPosition") {
        let round_trips = match session.set_window_position(16, 16).await {
            Ok(()) => match session.get_window_position().await {
                Ok(position) => position == (16, 16),
                Err(e) if e.is_transport() => return Err(e),
                Err(_) => false,
            },
            Err(e) if e.is_transport() => return Err(e),
            Err(_) => false,
        };
        p.set("brokenWindowPosition", !round_trips);
    }

    if p.unset("brokenWindowSwitch") {
        let ok = match session.get_current_window_handle().await {
            Ok(handle) => probe_ok(session.switch_to_window(&handle).await)?,
            Err(e) if e.is_transport() => return Err(e),
            Err(_) => false,
        };
        p.set("brokenWindowSwitch", !ok);
    }

    if p.unset("brokenZeroTimeout") {
        let original = session.get_find_timeout();
        let ok = probe_ok(session.set_timeout(Timeout::Implicit, 0).await)?;
        p.set("brokenZeroTimeout", !ok);
        let _ = session.set_timeout(Timeout::Implicit, original).await;
    }

    if p.unset("brokenParentFrameSwitch") {
        let ok = probe_ok(session.server_post("frame/parent", None, &[]).await)?;
        p.set("brokenParentFrameSwitch", !ok);
    }

    if p.unset("usesWebDriverFrameId") {
        p.get_page("<!DOCTYPE html><iframe src=\"about:blank\"></iframe>").await?;
        // W3C dropped numeric frame ids; a driver that rejects one wants
        // frame elements instead.
        let numeric_ok = probe_ok(
            session.server_post("frame", Some(json!({ "id": 0 })), &[]).await,
        )?;
        p.set("usesWebDriverFrameId", !numeric_ok);
        let _ = session.server_post("frame", Some(json!({ "id": null })), &[]).await;
    }

    if p.unset("brokenElementPosition") {
        p.get_page(
            "<!DOCTYPE html><div id=\"a\" style=\"position:absolute;\
             left:3000px;top:3000px;width:10px;height:10px;\"></div>",
        )
        .await?;
        let _ = session.execute("window.scrollTo(3000, 3000); return null;", vec![]).await;
        let correct = match session.find(Strategy::Id, "a").await {
            Ok(element) => match element.get_position().await {
                Ok((x, y)) => x == 3000.0 && y == 3000.0,
                Err(e) if e.is_transport() => return Err(e),
                Err(_) => false,
            },
            Err(e) if e.is_transport() => return Err(e),
            Err(_) => false,
        };
        p.set("brokenElementPosition", !correct);
        let _ = session.execute("window.scrollTo(0, 0); return null;", vec![]).await;
    }

    if p.unset("brokenCssTransformedSize") {
        p.get_page(
            "<!DOCTYPE html><div id=\"a\" style=\"width:100px;height:100px;\
             -webkit-transform:scale(0.5);transform:scale(0.5);\"></div>",
        )
        .await?;
        let correct = match session.find(Strategy::Id, "a").await {
            Ok(element) => match element.get_size().await {
                Ok((width, _)) => (width - 50.0).abs() < 2.0,
                Err(e) if e.is_transport() => return Err(e),
                Err(_) => false,
            },
            Err(e) if e.is_transport() => return Err(e),
            Err(_) => false,
        };
        p.set("brokenCssTransformedSize", !correct);
    }

    // A refresh that never resolves (ios-driver against a data URI) would
    // hang every later command, so give it two seconds and move on.
    if p.unset("brokenRefresh") {
        let refresh = session.refresh();
        let completed = match tokio::time::timeout(Duration::from_millis(2000), refresh).await {
            Ok(result) => probe_ok(result)?,
            Err(_) => false,
        };
        p.set("brokenRefresh", !completed);
    }

    if p.unset("brokenMouseEvents") || p.unset("brokenHtmlMouseMove") {
        probe_mouse(p).await?;
    }

    if p.unset("brokenDoubleClick") && !session.cap("brokenMouseEvents") {
        probe_double_click(p).await?;
    }

    Ok(())
}

async fn displayed_by_driver(session: &Session, id: &str) -> Result<Option<bool>, CmdError> {
    match session.find(Strategy::Id, id).await {
        Ok(element) => match element.session().server_get(
            "element/$0/displayed",
            &[element.element_id()],
        )
        .await
        {
            Ok(value) => Ok(value.as_bool()),
            Err(e) if e.is_transport() => Err(e),
            Err(_) => Ok(None),
        },
        Err(e) if e.is_transport() => Err(e),
        Err(_) => Ok(None),
    }
}

const MOUSE_RECORDER: &str = "<!DOCTYPE html>\
<div id=\"a\" style=\"width:100px;height:100px;\"></div>\
<script>\
window.mouseEvents = [];\
document.onmousemove = function () { window.mouseEvents.push('mousemove'); };\
</script>";

// A native mouse move must produce real events. Two separate pages guard
// against a driver that only appears to work because of state left over
// from the previous page.
async fn probe_mouse(p: &Prober<'_>) -> Result<(), CmdError> {
    let session = p.session;
    let mut moves_work = true;

    for _ in 0..2 {
        p.get_page(MOUSE_RECORDER).await?;
        let element = match session.find(Strategy::Id, "a").await {
            Ok(element) => element,
            Err(e) if e.is_transport() => return Err(e),
            Err(_) => {
                moves_work = false;
                break;
            }
        };
        match session.move_mouse_to(Some(&element), None, None).await {
            Ok(()) => {}
            Err(e) if e.is_transport() => return Err(e),
            Err(_) => {
                moves_work = false;
                break;
            }
        }
        let recorded = session
            .execute("return window.mouseEvents.length > 0;", vec![])
            .await;
        match recorded {
            Ok(value) if value.as_bool() == Some(true) => {}
            Err(e) if e.is_transport() => return Err(e),
            _ => {
                moves_work = false;
                break;
            }
        }
    }
    if p.unset("brokenMouseEvents") {
        p.set("brokenMouseEvents", !moves_work);
    }

    if moves_work && p.unset("brokenHtmlMouseMove") {
        p.get_page(MOUSE_RECORDER).await?;
        let html = session.execute("return document.documentElement;", vec![]).await;
        let ok = match html {
            Ok(value) => match crate::element::Element::from_script_value(session.clone(), &value)
            {
                Ok(element) => probe_ok(session.move_mouse_to(Some(&element), Some(0), Some(0)).await)?,
                Err(_) => false,
            },
            Err(e) if e.is_transport() => return Err(e),
            Err(_) => false,
        };
        p.set("brokenHtmlMouseMove", !ok);
    }

    Ok(())
}

const DOUBLE_CLICK_RECORDER: &str = "<!DOCTYPE html>\
<div id=\"a\" style=\"width:100px;height:100px;\"></div>\
<script>\
window.clickEvents = [];\
['mousedown', 'mouseup', 'click', 'dblclick'].forEach(function (type) {\
    document.addEventListener(type, function () { window.clickEvents.push(type); });\
});\
</script>";

// A full double click is six mouse events plus dblclick. Drivers race their
// answer against the browser's event loop, so an undersized count gets one
// re-read before the driver is condemned.
async fn probe_double_click(p: &Prober<'_>) -> Result<(), CmdError> {
    let session = p.session;
    p.get_page(DOUBLE_CLICK_RECORDER).await?;

    let element = match session.find(Strategy::Id, "a").await {
        Ok(element) => element,
        Err(e) if e.is_transport() => return Err(e),
        Err(_) => return Ok(()),
    };
    if let Err(e) = session.move_mouse_to(Some(&element), None, None).await {
        if e.is_transport() {
            return Err(e);
        }
        return Ok(());
    }
    match session.double_click().await {
        Ok(()) => {}
        Err(e) if e.is_transport() => return Err(e),
        Err(_) => {
            p.set("brokenDoubleClick", true);
            return Ok(());
        }
    }

    let mut complete = false;
    for _ in 0..2 {
        let count = session
            .execute("return window.clickEvents.length;", vec![])
            .await;
        match count {
            Ok(value) if value.as_u64().unwrap_or(0) >= 6 => {
                complete = true;
                break;
            }
            Err(e) if e.is_transport() => return Err(e),
            _ => tokio::time::sleep(Duration::from_millis(100)).await,
        }
    }
    p.set("brokenDoubleClick", !complete);
    Ok(())
}
