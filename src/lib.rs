//! A client for remote WebDriver servers, speaking both the legacy
//! JsonWireProtocol and the W3C WebDriver protocol.
//!
//! This crate drives a conforming (potentially headless) browser through
//! high-level operations: navigation, scripting, DOM interaction, cookies,
//! storage, input and alerts. It earns its keep below that surface, in four
//! places:
//!
//! - a transport layer ([`Server`]) that normalizes a decade of disagreeing
//!   driver error formats into one status registry, and follows the odd
//!   redirects some drivers still emit;
//! - a capability probe that detects dozens of driver-specific defects at
//!   session creation and records them as `broken*` capability flags;
//! - a session layer ([`Session`]) that serializes requests per session and
//!   transparently routes around the recorded defects: simulating mouse
//!   and keyboard events in the page, searching link text by hand, expiring
//!   cookies through `document.cookie`, remembering windows a driver cannot
//!   really close;
//! - a fluent, chainable façade ([`Command`]) that composes these
//!   operations into linear test scripts, with an element context flowing
//!   down the chain.
//!
//! # Examples
//!
//! The example assumes a WebDriver server (chromedriver, geckodriver,
//! a Selenium grid, ...) listening on port 4444.
//!
//! ```no_run
//! use hansom::{Capabilities, Server, Strategy};
//! use serde_json::json;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new("http://localhost:4444/wd/hub")?;
//!
//!     let mut desired = Capabilities::new();
//!     desired.insert("browserName", json!("chrome"));
//!     let session = server.create_session(desired).await?;
//!
//!     session.get("https://en.wikipedia.org/wiki/Foobar").await?;
//!     let heading = session.find(Strategy::CssSelector, "#firstHeading").await?;
//!     assert_eq!(heading.get_visible_text().await?, "Foobar");
//!
//!     session.quit().await?;
//!     Ok(())
//! }
//! ```
//!
//! The same flow as a command chain:
//!
//! ```no_run
//! use hansom::{Capabilities, Command, Server};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let server = Server::new("http://localhost:4444/wd/hub")?;
//! # let mut desired = Capabilities::new();
//! # desired.insert("browserName", json!("chrome"));
//! let session = server.create_session(desired).await?;
//!
//! let heading: String = Command::new(&session)
//!     .get("https://en.wikipedia.org/wiki/Foobar")
//!     .find_by_css_selector("#firstHeading")
//!     .get_visible_text()
//!     .value()
//!     .await?;
//! assert_eq!(heading, "Foobar");
//! # Ok(())
//! # }
//! ```
//!
//! # Driver defects
//!
//! By default [`Server::create_session`] fills the session's capability map
//! from a static table of known browser defects and a battery of runtime
//! probes. Pass `fixSessionCapabilities: "no-detect"` in the desired
//! capabilities to run the table only, or `fixSessionCapabilities: false`
//! to skip filling entirely (on well-behaved drivers this saves a few
//! hundred milliseconds of probing at session start).

#![deny(missing_docs)]
#![warn(missing_debug_implementations, rustdoc::all)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Alert handling.
mod alerts;
/// The capability map and browser version handling.
mod capabilities;
/// The fluent command chain.
mod command;
/// Cookie types and commands.
mod cookies;
/// Remote element handles.
mod element;
/// Error types and the wire status registry.
pub mod error;
/// The pluggable HTTP transport.
pub mod httpclient;
/// Mouse, touch and keyboard input.
mod input;
/// Key constants.
mod keys;
/// Locator strategies.
mod locator;
/// Element-location polling.
mod poll;
/// The capability filler.
mod quirks;
/// The transport layer and session factory.
mod server;
/// The per-session command surface.
mod session;
/// Local and session storage.
mod storage;

pub use capabilities::{BrowserVersion, Capabilities};
pub use command::{Command, Context, ContextSetter, ThenValue};
pub use cookies::Cookie;
pub use element::Element;
pub use error::{CmdError, NewSessionError, Status, WireError};
pub use keys::{Key, Keys};
pub use locator::{Strategy, STRATEGIES};
pub use poll::DEFAULT_POLL_INTERVAL_MS;
pub use server::{HttpOptions, Server, SessionDescriptor};
pub use session::{
    FrameTarget, Geolocation, LogEntry, Session, Timeout, MAX_TIMEOUT_MS,
};
