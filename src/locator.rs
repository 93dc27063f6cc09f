//! The element search strategies recognized by WebDriver servers.

use std::borrow::Cow;
use std::fmt;

/// An element locator strategy.
///
/// JsonWireProtocol servers accept all eight strategies natively; W3C servers
/// only accept `css selector`, `link text`, `partial link text`, `tag name`
/// and `xpath`, so the remaining strategies are rewritten to equivalent CSS
/// selectors before they reach a W3C server (see [`Strategy::to_w3c`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Search by the `class` attribute.
    ClassName,
    /// Search by CSS selector.
    CssSelector,
    /// Search by the `id` attribute.
    Id,
    /// Search by the `name` attribute.
    Name,
    /// Search `<a>` elements by their exact visible text.
    LinkText,
    /// Search `<a>` elements by a substring of their visible text.
    PartialLinkText,
    /// Search by tag name.
    TagName,
    /// Search by XPath expression.
    XPath,
}

/// Every strategy, in the order the shortcut-method families are generated.
pub const STRATEGIES: [Strategy; 8] = [
    Strategy::ClassName,
    Strategy::CssSelector,
    Strategy::Id,
    Strategy::Name,
    Strategy::LinkText,
    Strategy::PartialLinkText,
    Strategy::TagName,
    Strategy::XPath,
];

impl Strategy {
    /// The wire name of this strategy, as sent in `using`.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Strategy::ClassName => "class name",
            Strategy::CssSelector => "css selector",
            Strategy::Id => "id",
            Strategy::Name => "name",
            Strategy::LinkText => "link text",
            Strategy::PartialLinkText => "partial link text",
            Strategy::TagName => "tag name",
            Strategy::XPath => "xpath",
        }
    }

    /// True for the two link-text strategies, which have their own quirk
    /// handling (manual in-page search on drivers with broken whitespace
    /// normalization or broken link-text locators).
    pub fn is_link_text(&self) -> bool {
        matches!(self, Strategy::LinkText | Strategy::PartialLinkText)
    }

    /// Translate a JsonWire strategy/value pair into one acceptable to a W3C
    /// server.
    ///
    /// The link-text strategies and XPath survive unchanged; `id`, `class
    /// name`, `name` and `tag name` become CSS selectors.
    pub fn to_w3c<'a>(&self, value: &'a str) -> (Strategy, Cow<'a, str>) {
        match self {
            Strategy::Id => (Strategy::CssSelector, Cow::Owned(format!("#{}", value))),
            Strategy::ClassName => (Strategy::CssSelector, Cow::Owned(format!(".{}", value))),
            Strategy::Name => {
                (Strategy::CssSelector, Cow::Owned(format!("[name=\"{}\"]", value)))
            }
            Strategy::TagName => (Strategy::CssSelector, Cow::Borrowed(value)),
            _ => (*self, Cow::Borrowed(value)),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}
