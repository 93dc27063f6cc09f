//! The per-session command surface.
//!
//! A [`Session`] is a cheap handle onto a live browser session. All requests
//! for one session flow through a background dispatcher task, so at most one
//! request is in flight per session at any instant and requests reach the
//! driver in the order the corresponding calls were issued. Sessions also
//! hold the capability map and the transient state (timeout cache, last
//! mouse position, closed-window set) that the quirk workarounds depend on.

use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};

use crate::capabilities::Capabilities;
use crate::element::{parse_element_ref, Element};
use crate::error::{CmdError, Status};
use crate::locator::Strategy;
use crate::server::{substitute_path_parts, Server};

/// Timeouts above this value are clamped; some drivers store timeouts in a
/// signed 24-bit field.
pub const MAX_TIMEOUT_MS: u64 = (1 << 23) - 1;

/// The three timeouts a WebDriver server manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// How long an asynchronous script may run.
    Script,
    /// How long a single find call may wait for a matching element.
    Implicit,
    /// How long a navigation may take.
    PageLoad,
}

impl Timeout {
    /// The JsonWire name, sent as the `type` field of `POST /timeouts`.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Timeout::Script => "script",
            Timeout::Implicit => "implicit",
            Timeout::PageLoad => "page load",
        }
    }

    /// The W3C payload key.
    fn w3c_key(&self) -> &'static str {
        match self {
            Timeout::Script => "script",
            Timeout::Implicit => "implicit",
            Timeout::PageLoad => "pageLoad",
        }
    }

    /// The pre-2013 per-type endpoint, where one exists.
    fn legacy_endpoint(&self) -> Option<&'static str> {
        match self {
            Timeout::Script => Some("timeouts/async_script"),
            Timeout::Implicit => Some("timeouts/implicit_wait"),
            Timeout::PageLoad => None,
        }
    }
}

/// A frame to switch into.
#[derive(Debug, Clone)]
pub enum FrameTarget {
    /// The top-level browsing context.
    Top,
    /// A frame by index.
    Index(u16),
    /// A frame by name (JsonWire servers only).
    Name(String),
    /// A frame element.
    Element(Element),
}

impl From<u16> for FrameTarget {
    fn from(index: u16) -> Self {
        FrameTarget::Index(index)
    }
}

impl From<&str> for FrameTarget {
    fn from(name: &str) -> Self {
        FrameTarget::Name(name.to_string())
    }
}

impl From<Element> for FrameTarget {
    fn from(element: Element) -> Self {
        FrameTarget::Element(element)
    }
}

impl From<Option<Element>> for FrameTarget {
    fn from(element: Option<Element>) -> Self {
        match element {
            Some(element) => FrameTarget::Element(element),
            None => FrameTarget::Top,
        }
    }
}

/// A physical location, as used by the geolocation commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geolocation {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Altitude in meters above the WGS84 ellipsoid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

/// One entry of a remote log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Seconds since the epoch; NaN when the driver's output could not be
    /// parsed.
    #[serde(default = "f64_nan")]
    pub timestamp: f64,
    /// The severity level.
    #[serde(default)]
    pub level: String,
    /// The log message.
    #[serde(default)]
    pub message: String,
}

fn f64_nan() -> f64 {
    f64::NAN
}

pub(crate) struct RequestData {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) body: Option<Json>,
}

pub(crate) struct Task {
    request: RequestData,
    ack: oneshot::Sender<Result<Json, CmdError>>,
}

#[derive(Default)]
pub(crate) struct SessionState {
    pub(crate) timeouts: TimeoutCache,
    pub(crate) moved_to_element: bool,
    pub(crate) last_mouse_position: Option<(i64, i64)>,
    pub(crate) last_altitude: Option<f64>,
    pub(crate) closed_windows: HashSet<String>,
}

pub(crate) struct TimeoutCache {
    script: u64,
    implicit: u64,
    page_load: u64,
}

impl Default for TimeoutCache {
    fn default() -> Self {
        TimeoutCache {
            script: 0,
            implicit: 0,
            page_load: MAX_TIMEOUT_MS,
        }
    }
}

impl TimeoutCache {
    fn get(&self, kind: Timeout) -> u64 {
        match kind {
            Timeout::Script => self.script,
            Timeout::Implicit => self.implicit,
            Timeout::PageLoad => self.page_load,
        }
    }

    fn set(&mut self, kind: Timeout, ms: u64) {
        match kind {
            Timeout::Script => self.script = ms,
            Timeout::Implicit => self.implicit = ms,
            Timeout::PageLoad => self.page_load = ms,
        }
    }
}

struct SessionInner {
    session_id: String,
    server: Server,
    capabilities: RwLock<Capabilities>,
    state: Mutex<SessionState>,
}

/// A live browser session.
///
/// Created by [`Server::create_session`]; destroyed by [`Session::quit`].
/// Cloning produces another handle onto the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
    tx: mpsc::UnboundedSender<Task>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("session_id", &self.inner.session_id).finish()
    }
}

// Executes queued requests one at a time. The oneshot ack doubles as the
// cancellation signal: if the caller has dropped the receiver by the time
// its request reaches the head of the queue, the request never runs.
async fn run_session(server: Server, mut rx: mpsc::UnboundedReceiver<Task>) {
    while let Some(Task { request, ack }) = rx.recv().await {
        if ack.is_closed() {
            continue;
        }
        let result = server
            .send(request.method, &request.path, request.body.as_ref(), &[])
            .await;
        let _ = ack.send(result);
    }
}

impl Session {
    /// Construct a session handle and start its dispatcher.
    ///
    /// Only [`Server::create_session`] calls this; it is public for callers
    /// that need to re-attach to an already-running session.
    pub fn new(session_id: String, server: Server, capabilities: Capabilities) -> Session {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_session(server.clone(), rx));
        Session {
            inner: Arc::new(SessionInner {
                session_id,
                server,
                capabilities: RwLock::new(capabilities),
                state: Mutex::new(SessionState::default()),
            }),
            tx,
        }
    }

    /// The opaque session id assigned by the server.
    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// The server this session belongs to.
    pub fn server(&self) -> &Server {
        &self.inner.server
    }

    /// A snapshot of the session's capability map.
    pub fn capabilities(&self) -> Capabilities {
        self.inner.capabilities.read().expect("capabilities lock").clone()
    }

    pub(crate) fn cap(&self, key: &str) -> bool {
        self.inner.capabilities.read().expect("capabilities lock").flag(key)
    }

    pub(crate) fn cap_or(&self, key: &str, default: bool) -> bool {
        self.inner.capabilities.read().expect("capabilities lock").flag_or(key, default)
    }

    pub(crate) fn cap_string(&self, key: &str) -> Option<String> {
        self.inner
            .capabilities
            .read()
            .expect("capabilities lock")
            .string(key)
            .map(str::to_string)
    }

    pub(crate) fn cap_value(&self, key: &str) -> Option<Json> {
        self.inner.capabilities.read().expect("capabilities lock").get(key).cloned()
    }

    pub(crate) fn set_cap(&self, key: &str, value: impl Into<Json>) {
        self.inner.capabilities.write().expect("capabilities lock").insert(key, value);
    }

    pub(crate) fn update_capabilities(&self, f: impl FnOnce(&mut Capabilities)) {
        f(&mut self.inner.capabilities.write().expect("capabilities lock"))
    }

    pub(crate) fn is_webdriver(&self) -> bool {
        self.cap("isWebDriver")
    }

    pub(crate) fn uses_webdriver_locators(&self) -> bool {
        self.cap("usesWebDriverLocators") || self.is_webdriver()
    }

    fn uses_webdriver_window_commands(&self) -> bool {
        self.cap("usesWebDriverWindowCommands")
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        f(&mut self.inner.state.lock().expect("state lock"))
    }

    /// Enqueue one request on this session's serialization tail and wait for
    /// its response `value`.
    pub(crate) async fn delegate(
        &self,
        method: Method,
        subpath: &str,
        body: Option<Json>,
        path_parts: &[&str],
    ) -> Result<Json, CmdError> {
        let mut body = body;
        if method == Method::POST && body.is_none() && self.cap("brokenEmptyPost") {
            body = Some(json!({}));
        }

        let session_root = substitute_path_parts("session/$0", &[&self.inner.session_id]);
        let path = if subpath.is_empty() {
            session_root
        } else {
            format!("{}/{}", session_root, substitute_path_parts(subpath, path_parts))
        };

        let (ack, response) = oneshot::channel();
        self.tx
            .send(Task {
                request: RequestData { method, path, body },
                ack,
            })
            .map_err(|_| {
                CmdError::Lost(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "WebDriver session has been closed",
                ))
            })?;

        let mut body = response.await.map_err(|_| {
            CmdError::Lost(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "WebDriver session was closed while waiting",
            ))
        })??;

        Ok(body.get_mut("value").map(Json::take).unwrap_or(Json::Null))
    }

    pub(crate) async fn server_get(
        &self,
        subpath: &str,
        path_parts: &[&str],
    ) -> Result<Json, CmdError> {
        self.delegate(Method::GET, subpath, None, path_parts).await
    }

    pub(crate) async fn server_post(
        &self,
        subpath: &str,
        body: Option<Json>,
        path_parts: &[&str],
    ) -> Result<Json, CmdError> {
        self.delegate(Method::POST, subpath, body, path_parts).await
    }

    pub(crate) async fn server_delete(
        &self,
        subpath: &str,
        path_parts: &[&str],
    ) -> Result<Json, CmdError> {
        self.delegate(Method::DELETE, subpath, None, path_parts).await
    }

    /// End the session (`DELETE /session/{id}`).
    pub async fn quit(&self) -> Result<(), CmdError> {
        self.delegate(Method::DELETE, "", None, &[]).await?;
        Ok(())
    }
}

/// Timeouts.
impl Session {
    /// Set one of the driver-managed timeouts.
    ///
    /// Values above [`MAX_TIMEOUT_MS`] are clamped. On drivers with
    /// `brokenZeroTimeout`, a zero timeout is sent as one millisecond. The
    /// cache consulted by [`Session::get_timeout`] is only updated when the
    /// driver acknowledged the new value.
    pub async fn set_timeout(&self, kind: Timeout, ms: u64) -> Result<(), CmdError> {
        let mut ms = ms.min(MAX_TIMEOUT_MS);
        if ms == 0 && self.cap("brokenZeroTimeout") {
            ms = 1;
        }

        let body = if self.cap("usesWebDriverTimeouts") || self.is_webdriver() {
            json!({ kind.w3c_key(): ms })
        } else {
            json!({ "type": kind.wire_name(), "ms": ms })
        };

        let result = match self.server_post("timeouts", Some(body), &[]).await {
            Err(e) if e.is_unknown_command() => match kind.legacy_endpoint() {
                Some(endpoint) => self
                    .server_post(endpoint, Some(json!({ "ms": ms })), &[])
                    .await
                    .map(drop),
                None => Err(e),
            },
            r => r.map(drop),
        };

        if result.is_ok() {
            self.with_state(|state| state.timeouts.set(kind, ms));
        }
        result
    }

    /// The last acknowledged value for the given timeout.
    pub fn get_timeout(&self, kind: Timeout) -> u64 {
        self.with_state(|state| state.timeouts.get(kind))
    }

    /// Set the asynchronous-script timeout.
    pub async fn set_execute_async_timeout(&self, ms: u64) -> Result<(), CmdError> {
        self.set_timeout(Timeout::Script, ms).await
    }

    /// The asynchronous-script timeout.
    pub fn get_execute_async_timeout(&self) -> u64 {
        self.get_timeout(Timeout::Script)
    }

    /// Set the implicit find timeout.
    pub async fn set_find_timeout(&self, ms: u64) -> Result<(), CmdError> {
        self.set_timeout(Timeout::Implicit, ms).await
    }

    /// The implicit find timeout.
    pub fn get_find_timeout(&self) -> u64 {
        self.get_timeout(Timeout::Implicit)
    }

    /// Set the page-load timeout.
    pub async fn set_page_load_timeout(&self, ms: u64) -> Result<(), CmdError> {
        self.set_timeout(Timeout::PageLoad, ms).await
    }

    /// The page-load timeout.
    pub fn get_page_load_timeout(&self) -> u64 {
        self.get_timeout(Timeout::PageLoad)
    }
}

/// Navigation.
impl Session {
    /// Navigate to the given URL.
    pub async fn get(&self, url: &str) -> Result<(), CmdError> {
        // A navigation resets the virtual mouse used by the event-simulation
        // fallback.
        let broken_mouse = self.cap("brokenMouseEvents");
        self.with_state(|state| {
            state.moved_to_element = false;
            if broken_mouse {
                state.last_mouse_position = Some((0, 0));
            }
        });
        self.server_post("url", Some(json!({ "url": url })), &[]).await?;
        Ok(())
    }

    /// Navigate backwards in the history.
    pub async fn go_back(&self) -> Result<(), CmdError> {
        self.server_post("back", None, &[]).await?;
        Ok(())
    }

    /// Navigate forwards in the history.
    pub async fn go_forward(&self) -> Result<(), CmdError> {
        self.server_post("forward", None, &[]).await?;
        Ok(())
    }

    /// Reload the current page.
    pub async fn refresh(&self) -> Result<(), CmdError> {
        if self.cap("brokenRefresh") {
            self.execute("location.reload();", vec![]).await?;
            return Ok(());
        }
        self.server_post("refresh", None, &[]).await?;
        Ok(())
    }

    /// The title of the focused window.
    pub async fn get_page_title(&self) -> Result<String, CmdError> {
        string_value(self.server_get("title", &[]).await?)
    }

    /// The URL of the focused window.
    pub async fn get_current_url(&self) -> Result<String, CmdError> {
        string_value(self.server_get("url", &[]).await?)
    }

    /// The HTML source of the current page.
    pub async fn get_page_source(&self) -> Result<String, CmdError> {
        if self.cap("brokenPageSource") {
            let value = self
                .execute("return document.documentElement.outerHTML;", vec![])
                .await?;
            return string_value(value);
        }
        string_value(self.server_get("source", &[]).await?)
    }

    /// A PNG screenshot of the focused window.
    pub async fn take_screenshot(&self) -> Result<Vec<u8>, CmdError> {
        use base64::Engine;
        let value = self.server_get("screenshot", &[]).await?;
        let encoded = string_value(value)?;
        Ok(base64::prelude::BASE64_STANDARD.decode(encoded.as_bytes())?)
    }
}

/// Script execution.
impl Session {
    /// Execute JavaScript in the focused frame and return its value.
    ///
    /// Element handles can be passed as arguments via
    /// [`Element::to_json`] and come back out of the result as objects
    /// carrying the element sentinel key; use
    /// [`Element::from_script_value`] to rehydrate them.
    pub async fn execute(&self, script: &str, args: Vec<Json>) -> Result<Json, CmdError> {
        self.execute_inner(script, args, false).await
    }

    /// Execute JavaScript that completes by invoking the callback the driver
    /// appends to its arguments.
    pub async fn execute_async(&self, script: &str, args: Vec<Json>) -> Result<Json, CmdError> {
        self.execute_inner(script, args, true).await
    }

    async fn execute_inner(
        &self,
        script: &str,
        args: Vec<Json>,
        asynchronous: bool,
    ) -> Result<Json, CmdError> {
        let path = match (asynchronous, self.is_webdriver()) {
            (false, false) => "execute",
            (false, true) => "execute/sync",
            (true, false) => "execute_async",
            (true, true) => "execute/async",
        };

        let body = json!({ "script": script, "args": args });
        let result = self.server_post(path, Some(body), &[]).await;

        match result {
            Ok(value) => {
                // Drivers with this defect serialize an undefined script
                // result as the string "undefined" instead of null.
                if self.cap("brokenExecuteUndefinedReturn") && value.as_str() == Some("undefined")
                {
                    return Ok(Json::Null);
                }
                Ok(value)
            }
            // Pre-2015 drivers report script failures as UnknownError; all
            // of them belong to the JavaScriptError status.
            Err(CmdError::Standard(mut e)) if !asynchronous && e.status == Status::UnknownError => {
                e.status = Status::JavaScriptError;
                Err(CmdError::Standard(e))
            }
            r => r,
        }
    }
}

/// Element retrieval.
impl Session {
    /// Find the first element matching the given strategy and value.
    pub async fn find(&self, strategy: Strategy, value: &str) -> Result<Element, CmdError> {
        find_with_root(self, None, strategy, value).await
    }

    /// Find every element matching the given strategy and value.
    pub async fn find_all(&self, strategy: Strategy, value: &str) -> Result<Vec<Element>, CmdError> {
        find_all_with_root(self, None, strategy, value).await
    }

    /// The element that currently has focus.
    pub async fn get_active_element(&self) -> Result<Element, CmdError> {
        if self.cap("brokenActiveElement") {
            let value = self.execute("return document.activeElement;", vec![]).await?;
            return Ok(Element::new(self.clone(), parse_element_ref(&value)?));
        }
        let value = self.server_post("element/active", None, &[]).await?;
        if value.is_null() {
            // W3C and JsonWire disagree about whether <body> counts as the
            // active element; the script answer is always usable.
            let value = self.execute("return document.activeElement;", vec![]).await?;
            return Ok(Element::new(self.clone(), parse_element_ref(&value)?));
        }
        Ok(Element::new(self.clone(), parse_element_ref(&value)?))
    }
}

// The manual link-text search used when the driver's own locator mangles
// whitespace or is missing entirely. Strings are normalized the way a
// conforming driver would render them before comparison.
pub(crate) const MANUAL_FIND_LINKS: &str = "\
var root = arguments[0] || document;\
var all = arguments[1];\
var partial = arguments[2];\
var text = arguments[3];\
function normalize(value) {\
    return value.replace(/^\\s+/, '').replace(/\\s+$/, '')\
        .replace(/\\s*\\r\\n\\s*/g, '\\n').replace(/ +/g, ' ');\
}\
var links = root.getElementsByTagName('a');\
var results = [];\
for (var i = 0; i < links.length; i++) {\
    var source = links[i].innerText != null ? links[i].innerText : links[i].textContent;\
    var linkText = normalize(source);\
    var matched = partial ? linkText.indexOf(text) !== -1 : linkText === text;\
    if (matched) {\
        if (!all) { return links[i]; }\
        results.push(links[i]);\
    }\
}\
return all ? results : null;";

fn needs_manual_link_text(session: &Session, strategy: Strategy) -> bool {
    strategy.is_link_text()
        && (session.cap("brokenWhitespaceNormalization") || session.cap("brokenLinkTextLocator"))
}

fn locator_body(session: &Session, strategy: Strategy, value: &str) -> Json {
    if session.uses_webdriver_locators() {
        let (strategy, value) = strategy.to_w3c(value);
        json!({ "using": strategy.as_wire(), "value": value })
    } else {
        json!({ "using": strategy.as_wire(), "value": value })
    }
}

pub(crate) async fn find_with_root(
    session: &Session,
    root: Option<&Element>,
    strategy: Strategy,
    value: &str,
) -> Result<Element, CmdError> {
    if needs_manual_link_text(session, strategy) {
        let args = vec![
            root.map(|e| e.to_json()).transpose()?.unwrap_or(Json::Null),
            json!(false),
            json!(strategy == Strategy::PartialLinkText),
            json!(value),
        ];
        let found = session.execute(MANUAL_FIND_LINKS, args).await?;
        if found.is_null() {
            return Err(CmdError::status(Status::NoSuchElement));
        }
        return Ok(Element::new(session.clone(), parse_element_ref(&found)?));
    }

    let body = locator_body(session, strategy, value);
    let value = match root {
        Some(root) => {
            session
                .server_post("element/$0/element", Some(body), &[root.element_id()])
                .await?
        }
        None => session.server_post("element", Some(body), &[]).await?,
    };
    Ok(Element::new(session.clone(), parse_element_ref(&value)?))
}

pub(crate) async fn find_all_with_root(
    session: &Session,
    root: Option<&Element>,
    strategy: Strategy,
    value: &str,
) -> Result<Vec<Element>, CmdError> {
    if needs_manual_link_text(session, strategy) {
        let args = vec![
            root.map(|e| e.to_json()).transpose()?.unwrap_or(Json::Null),
            json!(true),
            json!(strategy == Strategy::PartialLinkText),
            json!(value),
        ];
        let found = session.execute(MANUAL_FIND_LINKS, args).await?;
        return elements_from_array(session, found);
    }

    let body = locator_body(session, strategy, value);
    let value = match root {
        Some(root) => {
            session
                .server_post("element/$0/elements", Some(body), &[root.element_id()])
                .await?
        }
        None => session.server_post("elements", Some(body), &[]).await?,
    };
    elements_from_array(session, value)
}

fn elements_from_array(session: &Session, value: Json) -> Result<Vec<Element>, CmdError> {
    let entries = match value {
        Json::Array(entries) => entries,
        Json::Null => Vec::new(),
        v => return Err(CmdError::NotJson(v.to_string())),
    };
    entries
        .into_iter()
        .map(|entry| Ok(Element::new(session.clone(), parse_element_ref(&entry)?)))
        .collect()
}

/// Frames and windows.
impl Session {
    /// Switch the focused frame.
    pub async fn switch_to_frame(&self, frame: impl Into<FrameTarget>) -> Result<(), CmdError> {
        let id = match frame.into() {
            FrameTarget::Top => Json::Null,
            // W3C dropped numeric and named frame ids; resolve them to the
            // frame element first on drivers that insist.
            FrameTarget::Index(index) if self.cap("usesWebDriverFrameId") => {
                let frame = self
                    .execute(
                        "var frames = document.querySelectorAll('frame, iframe');\
                         return frames[arguments[0]] || null;",
                        vec![json!(index)],
                    )
                    .await?;
                if frame.is_null() {
                    return Err(CmdError::status(Status::NoSuchFrame));
                }
                frame
            }
            FrameTarget::Index(index) => json!(index),
            FrameTarget::Name(name) => json!(name),
            FrameTarget::Element(element) => element.to_json()?,
        };
        self.server_post("frame", Some(json!({ "id": id })), &[]).await?;
        Ok(())
    }

    /// Switch to the parent of the focused frame.
    pub async fn switch_to_parent_frame(&self) -> Result<(), CmdError> {
        match self.server_post("frame/parent", None, &[]).await {
            Err(e) if parent_frame_needs_fallback(&e) => {
                if self.cap("scriptedParentFrameCrashesBrowser") {
                    return Err(e);
                }
                let parent = self.execute("return window.parent.frameElement;", vec![]).await?;
                if parent.is_null() {
                    self.switch_to_frame(FrameTarget::Top).await
                } else {
                    let element = Element::new(self.clone(), parse_element_ref(&parent)?);
                    self.switch_to_frame(element).await
                }
            }
            r => r.map(drop),
        }
    }

    /// Switch the focused window.
    pub async fn switch_to_window(&self, handle: &str) -> Result<(), CmdError> {
        let body = if self.cap("usesHandleParameter") || self.is_webdriver() {
            json!({ "handle": handle })
        } else {
            json!({ "name": handle })
        };
        self.server_post("window", Some(body), &[]).await?;
        Ok(())
    }

    /// The handle of the focused window.
    pub async fn get_current_window_handle(&self) -> Result<String, CmdError> {
        let path = if self.uses_webdriver_window_commands() || self.is_webdriver() {
            "window"
        } else {
            "window_handle"
        };
        let handle = string_value(self.server_get(path, &[]).await?)?;
        if self.cap("brokenDeleteWindow")
            && self.with_state(|state| state.closed_windows.contains(&handle))
        {
            return Err(CmdError::status(Status::NoSuchWindow));
        }
        Ok(handle)
    }

    /// The handles of every open window.
    ///
    /// Windows the session had to close via script (drivers with
    /// `brokenDeleteWindow`) are filtered out, since those drivers keep
    /// reporting them.
    pub async fn get_all_window_handles(&self) -> Result<Vec<String>, CmdError> {
        let path = if self.uses_webdriver_window_commands() || self.is_webdriver() {
            "window/handles"
        } else {
            "window_handles"
        };
        let value = self.server_get(path, &[]).await?;
        let mut handles: Vec<String> = serde_json::from_value(value)?;
        if self.cap("brokenDeleteWindow") {
            self.with_state(|state| {
                handles.retain(|handle| !state.closed_windows.contains(handle));
            });
        }
        Ok(handles)
    }

    /// Close the focused window.
    pub async fn close_current_window(&self) -> Result<(), CmdError> {
        if self.cap("brokenDeleteWindow") {
            return self.close_current_window_scripted().await;
        }
        match self.server_delete("window", &[]).await {
            Err(e) if e.is_unknown_command() => {
                self.set_cap("brokenDeleteWindow", true);
                self.close_current_window_scripted().await
            }
            r => r.map(drop),
        }
    }

    // Closes the window via script and remembers the handle, because the
    // driver will keep listing it.
    async fn close_current_window_scripted(&self) -> Result<(), CmdError> {
        let handle = self.get_current_window_handle().await?;
        self.execute("window.close();", vec![]).await?;
        self.with_state(|state| state.closed_windows.insert(handle));
        Ok(())
    }

    /// Resize the focused window.
    pub async fn set_window_size(&self, width: u32, height: u32) -> Result<(), CmdError> {
        self.set_current_window_size(width, height).await
    }

    /// Resize the given window.
    pub async fn set_window_size_of(
        &self,
        handle: &str,
        width: u32,
        height: u32,
    ) -> Result<(), CmdError> {
        if self.cap("implicitWindowHandles") || self.cap("supportsWindowRectCommand") {
            // These drivers can only size the focused window; round-trip
            // through it and re-raise whatever the sizing itself reported.
            let previous = self.get_current_window_handle().await?;
            if previous == handle {
                return self.set_current_window_size(width, height).await;
            }
            self.switch_to_window(handle).await?;
            let result = self.set_current_window_size(width, height).await;
            // Best-effort restore; the sizing outcome is the answer the
            // caller asked for.
            let _ = self.switch_to_window(&previous).await;
            return result;
        }
        self.server_post(
            "window/$0/size",
            Some(json!({ "width": width, "height": height })),
            &[handle],
        )
        .await?;
        Ok(())
    }

    async fn set_current_window_size(&self, width: u32, height: u32) -> Result<(), CmdError> {
        if self.cap("supportsWindowRectCommand") {
            self.server_post(
                "window/rect",
                Some(json!({ "x": null, "y": null, "width": width, "height": height })),
                &[],
            )
            .await?;
        } else {
            self.server_post(
                "window/$0/size",
                Some(json!({ "width": width, "height": height })),
                &["current"],
            )
            .await?;
        }
        Ok(())
    }

    /// The size of the focused window.
    pub async fn get_window_size(&self) -> Result<(u32, u32), CmdError> {
        let value = if self.cap("supportsWindowRectCommand") {
            self.server_get("window/rect", &[]).await?
        } else {
            self.server_get("window/$0/size", &["current"]).await?
        };
        size_from(value)
    }

    /// The size of the given window.
    pub async fn get_window_size_of(&self, handle: &str) -> Result<(u32, u32), CmdError> {
        if self.cap("implicitWindowHandles") || self.cap("supportsWindowRectCommand") {
            let previous = self.get_current_window_handle().await?;
            if previous == handle {
                return self.get_window_size().await;
            }
            self.switch_to_window(handle).await?;
            let result = self.get_window_size().await;
            let _ = self.switch_to_window(&previous).await;
            return result;
        }
        size_from(self.server_get("window/$0/size", &[handle]).await?)
    }

    /// Move the focused window.
    pub async fn set_window_position(&self, x: i32, y: i32) -> Result<(), CmdError> {
        if self.uses_webdriver_window_commands() {
            self.server_post(
                "window/rect",
                Some(json!({ "x": x, "y": y, "width": null, "height": null })),
                &[],
            )
            .await?;
        } else {
            self.server_post(
                "window/$0/position",
                Some(json!({ "x": x, "y": y })),
                &["current"],
            )
            .await?;
        }
        Ok(())
    }

    /// The position of the focused window.
    pub async fn get_window_position(&self) -> Result<(i32, i32), CmdError> {
        let value = if self.uses_webdriver_window_commands() {
            self.server_get("window/rect", &[]).await?
        } else {
            self.server_get("window/$0/position", &["current"]).await?
        };
        let x = value.get("x").and_then(Json::as_i64).unwrap_or(0) as i32;
        let y = value.get("y").and_then(Json::as_i64).unwrap_or(0) as i32;
        Ok((x, y))
    }

    /// Maximize the focused window.
    pub async fn maximize_window(&self) -> Result<(), CmdError> {
        if self.uses_webdriver_window_commands() {
            self.server_post("window/maximize", None, &[]).await?;
        } else {
            self.server_post("window/$0/maximize", None, &["current"]).await?;
        }
        Ok(())
    }
}

/// Geolocation.
impl Session {
    /// The current simulated physical location.
    pub async fn get_geolocation(&self) -> Result<Geolocation, CmdError> {
        let value = self.server_get("location", &[]).await?;
        let mut location: Geolocation = serde_json::from_value(value)?;
        // ChromeDriver 2.9 reports 0 for an altitude that was never set.
        let last_altitude = self.with_state(|state| state.last_altitude);
        if location.altitude == Some(0.0) && last_altitude != Some(0.0) {
            location.altitude = None;
        }
        Ok(location)
    }

    /// Set the simulated physical location.
    pub async fn set_geolocation(&self, location: &Geolocation) -> Result<(), CmdError> {
        self.server_post("location", Some(json!({ "location": location })), &[]).await?;
        self.with_state(|state| state.last_altitude = location.altitude);
        Ok(())
    }
}

/// Logs and orientation.
impl Session {
    /// Fetch and clear the log of the given type.
    pub async fn get_logs_for(&self, log_type: &str) -> Result<Vec<LogEntry>, CmdError> {
        let value = self
            .server_post("log", Some(json!({ "type": log_type })), &[])
            .await?;
        let entries = match value {
            Json::Array(entries) => entries,
            Json::Null => return Ok(Vec::new()),
            v => return Err(CmdError::NotJson(v.to_string())),
        };

        // Selendroid sends bare strings shaped "[timestamp] [level] message".
        if entries.iter().all(Json::is_string) {
            return Ok(entries
                .into_iter()
                .map(|entry| parse_text_log_entry(entry.as_str().unwrap_or("")))
                .collect());
        }

        entries
            .into_iter()
            .map(|entry| serde_json::from_value(entry).map_err(CmdError::from))
            .collect()
    }

    /// The log types the driver can produce.
    pub async fn get_available_log_types(&self) -> Result<Vec<String>, CmdError> {
        if let Some(fixed) = self.cap_value("fixedLogTypes") {
            if !fixed.is_null() && fixed != Json::Bool(false) {
                return Ok(serde_json::from_value(fixed)?);
            }
        }
        let value = self.server_get("log/types", &[]).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// The device orientation, `"PORTRAIT"` or `"LANDSCAPE"`.
    pub async fn get_orientation(&self) -> Result<String, CmdError> {
        string_value(self.server_get("orientation", &[]).await?)
    }

    /// Set the device orientation.
    pub async fn set_orientation(&self, orientation: &str) -> Result<(), CmdError> {
        let orientation = orientation.to_uppercase();
        self.server_post("orientation", Some(json!({ "orientation": orientation })), &[])
            .await?;
        Ok(())
    }
}

// Strategy-suffixed shortcut families, mirroring the strategies table.
macro_rules! session_strategy_helpers {
    ($(($method:ident, $strategy:ident)),*$(,)?) => {
        paste::paste! {
            /// Shortcut methods, one family per locator strategy.
            impl Session {
                $(
                    /// Find the first element matching the given
                    #[doc = concat!("`", stringify!($method), "` value.")]
                    pub async fn [<find_by_ $method>](&self, value: &str) -> Result<Element, CmdError> {
                        self.find(Strategy::$strategy, value).await
                    }

                    /// Find all elements matching the given
                    #[doc = concat!("`", stringify!($method), "` value.")]
                    pub async fn [<find_all_by_ $method>](&self, value: &str) -> Result<Vec<Element>, CmdError> {
                        self.find_all(Strategy::$strategy, value).await
                    }

                    /// Find the first displayed element matching the given
                    #[doc = concat!("`", stringify!($method), "` value.")]
                    pub async fn [<find_displayed_by_ $method>](&self, value: &str) -> Result<Element, CmdError> {
                        self.find_displayed(Strategy::$strategy, value).await
                    }

                    /// Wait for every element matching the given
                    #[doc = concat!("`", stringify!($method), "` value to leave the DOM.")]
                    pub async fn [<wait_for_deleted_by_ $method>](&self, value: &str) -> Result<(), CmdError> {
                        self.wait_for_deleted(Strategy::$strategy, value).await
                    }
                )*
            }
        }
    }
}

session_strategy_helpers![
    (class_name, ClassName),
    (css_selector, CssSelector),
    (id, Id),
    (name, Name),
    (link_text, LinkText),
    (partial_link_text, PartialLinkText),
    (tag_name, TagName),
    (xpath, XPath),
];

fn parent_frame_needs_fallback(e: &CmdError) -> bool {
    if e.is_unknown_command() {
        return true;
    }
    // Selendroid fails this endpoint with a communication error instead of
    // an unknown-command answer.
    match e {
        CmdError::Standard(w) => w.message.contains("Error communicating with the remote browser"),
        _ => false,
    }
}

pub(crate) fn string_value(value: Json) -> Result<String, CmdError> {
    match value {
        Json::String(s) => Ok(s),
        v => Err(CmdError::NotJson(v.to_string())),
    }
}

fn size_from(value: Json) -> Result<(u32, u32), CmdError> {
    let width = value.get("width").and_then(Json::as_u64);
    let height = value.get("height").and_then(Json::as_u64);
    match (width, height) {
        (Some(width), Some(height)) => Ok((width as u32, height as u32)),
        _ => Err(CmdError::NotJson(value.to_string())),
    }
}

fn parse_text_log_entry(raw: &str) -> LogEntry {
    // "[timestamp] [level] message"
    let fallback = || LogEntry {
        timestamp: f64::NAN,
        level: "INFO".to_string(),
        message: raw.to_string(),
    };

    let rest = match raw.strip_prefix('[') {
        Some(rest) => rest,
        None => return fallback(),
    };
    let (timestamp_text, rest) = match rest.split_once(']') {
        Some(parts) => parts,
        None => return fallback(),
    };
    let rest = rest.trim_start();
    let rest = match rest.strip_prefix('[') {
        Some(rest) => rest,
        None => return fallback(),
    };
    let (level, message) = match rest.split_once(']') {
        Some(parts) => parts,
        None => return fallback(),
    };

    LogEntry {
        timestamp: parse_log_timestamp(timestamp_text),
        level: level.trim().to_string(),
        message: message.trim_start().to_string(),
    }
}

fn parse_log_timestamp(text: &str) -> f64 {
    let text = text.trim();
    if let Ok(seconds) = text.parse::<f64>() {
        return seconds;
    }
    let format = time::macros::format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    );
    match time::PrimitiveDateTime::parse(text, &format) {
        Ok(datetime) => datetime.assume_utc().unix_timestamp() as f64,
        Err(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_selendroid_log_lines() {
        let entry = parse_text_log_entry("[2014-05-08 17:10:00] [INFO] hello world");
        assert_eq!(entry.level, "INFO");
        assert_eq!(entry.message, "hello world");
        assert!(entry.timestamp > 0.0);

        let entry = parse_text_log_entry("free-form nonsense");
        assert!(entry.timestamp.is_nan());
        assert_eq!(entry.level, "INFO");
        assert_eq!(entry.message, "free-form nonsense");
    }

    #[test]
    fn timeout_wire_names() {
        assert_eq!(Timeout::PageLoad.wire_name(), "page load");
        assert_eq!(Timeout::PageLoad.w3c_key(), "pageLoad");
        assert_eq!(Timeout::Script.legacy_endpoint(), Some("timeouts/async_script"));
        assert_eq!(Timeout::PageLoad.legacy_endpoint(), None);
    }

    #[test]
    fn timeout_cache_defaults() {
        let cache = TimeoutCache::default();
        assert_eq!(cache.get(Timeout::Script), 0);
        assert_eq!(cache.get(Timeout::Implicit), 0);
        assert_eq!(cache.get(Timeout::PageLoad), MAX_TIMEOUT_MS);
    }
}
