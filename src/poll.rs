//! Time-bounded retry loops layered on top of the base find and script
//! endpoints.
//!
//! The pollers borrow the driver-managed timeouts for their budget and are
//! careful to restore them on every exit path, so a poll never leaks its
//! internal timeout into later calls.

use serde_json::{json, Value as Json};
use std::time::{Duration, Instant};

use crate::element::Element;
use crate::error::{CmdError, Status};
use crate::locator::Strategy;
use crate::session::{find_all_with_root, find_with_root, Session};

/// How often `poll_until` re-runs its poller inside the page.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 67;

// In-page polling loop. Receives the poller source, its arguments, the
// timeout and the interval; completes with the poller's first non-null
// result, or null once the deadline passes. Thrown errors surface through
// the driver as JavascriptError.
const POLL_UNTIL: &str = "\
var pollerSource = arguments[0];\
var pollArgs = arguments[1];\
var deadline = Date.now() + arguments[2];\
var interval = arguments[3];\
var done = arguments[4];\
var poller = new Function('return (' + pollerSource + ').apply(this, arguments);');\
(function poll() {\
    var result = poller.apply(null, pollArgs);\
    if (result != null) {\
        done(result);\
    } else if (Date.now() < deadline) {\
        setTimeout(poll, interval);\
    } else {\
        done(null);\
    }\
})();";

/// Pollers.
impl Session {
    /// Repeatedly evaluate `poller` (JavaScript function source) inside the
    /// page until it returns something other than `null`/`undefined`.
    ///
    /// Polling happens entirely in-page through one `executeAsync` call; the
    /// asynchronous-script timeout is raised to cover `timeout_ms` for the
    /// duration and restored afterwards, success or not. When no result
    /// arrives in time the error has status [`Status::ScriptTimeout`].
    pub async fn poll_until(
        &self,
        poller: &str,
        args: Vec<Json>,
        timeout_ms: Option<u64>,
    ) -> Result<Json, CmdError> {
        self.poll_until_with_interval(poller, args, timeout_ms, DEFAULT_POLL_INTERVAL_MS)
            .await
    }

    /// [`Session::poll_until`] with an explicit poll interval.
    pub async fn poll_until_with_interval(
        &self,
        poller: &str,
        args: Vec<Json>,
        timeout_ms: Option<u64>,
        poll_interval_ms: u64,
    ) -> Result<Json, CmdError> {
        let original_timeout = self.get_execute_async_timeout();
        let timeout = timeout_ms.unwrap_or(original_timeout);

        self.set_execute_async_timeout(timeout).await?;
        let result = self
            .execute_async(
                POLL_UNTIL,
                vec![json!(poller), json!(args), json!(timeout), json!(poll_interval_ms)],
            )
            .await;
        // Put the caller's timeout back no matter how the poll went.
        let _ = self.set_execute_async_timeout(original_timeout).await;

        let value = result?;
        if value.is_null() {
            return Err(CmdError::status_message(
                Status::ScriptTimeout,
                "Polling timed out with no result",
            ));
        }
        Ok(value)
    }

    /// Find the first *displayed* element matching the given strategy and
    /// value, polling for up to the implicit timeout.
    pub async fn find_displayed(
        &self,
        strategy: Strategy,
        value: &str,
    ) -> Result<Element, CmdError> {
        find_displayed_with_root(self, None, strategy, value).await
    }

    /// Wait for every element matching the given strategy and value to
    /// leave the DOM, polling for up to the implicit timeout.
    pub async fn wait_for_deleted(&self, strategy: Strategy, value: &str) -> Result<(), CmdError> {
        wait_for_deleted_with_root(self, None, strategy, value).await
    }
}

pub(crate) async fn find_displayed_with_root(
    session: &Session,
    root: Option<&Element>,
    strategy: Strategy,
    value: &str,
) -> Result<Element, CmdError> {
    let budget = Duration::from_millis(session.get_find_timeout());
    let started = Instant::now();
    let mut any_matched = false;

    loop {
        let elements = find_all_with_root(session, root, strategy, value).await?;
        any_matched = any_matched || !elements.is_empty();

        // One at a time; ChromeDriver 2.16 falls over when visibility is
        // queried for several elements concurrently.
        for element in &elements {
            if element.is_displayed().await? {
                return Ok(element.clone());
            }
        }

        if started.elapsed() >= budget {
            return Err(if any_matched {
                CmdError::status_message(
                    Status::ElementNotVisible,
                    format!(
                        "No element matching \"{}\" (strategy \"{}\") was displayed",
                        value, strategy
                    ),
                )
            } else {
                CmdError::status_message(
                    Status::NoSuchElement,
                    format!("No element matching \"{}\" (strategy \"{}\") was found", value, strategy),
                )
            });
        }
    }
}

pub(crate) async fn wait_for_deleted_with_root(
    session: &Session,
    root: Option<&Element>,
    strategy: Strategy,
    value: &str,
) -> Result<(), CmdError> {
    // Zero the implicit timeout so each find returns immediately; the saved
    // value is both the poll budget and what gets restored.
    let budget_ms = session.get_find_timeout();
    session.set_find_timeout(0).await?;

    let budget = Duration::from_millis(budget_ms);
    let started = Instant::now();

    let result = loop {
        match find_with_root(session, root, strategy, value).await {
            Err(e) if e.is_no_such_element() => break Ok(()),
            Err(e) => break Err(e),
            Ok(_) => {
                if started.elapsed() >= budget {
                    break Err(CmdError::status_message(
                        Status::Timeout,
                        format!(
                            "Element matching \"{}\" (strategy \"{}\") was still present after {} ms",
                            value, strategy, budget_ms
                        ),
                    ));
                }
            }
        }
    };

    // Restore on every exit path; a failed restore must not mask the poll
    // outcome.
    let _ = session.set_find_timeout(budget_ms).await;
    result
}
