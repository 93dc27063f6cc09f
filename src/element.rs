//! Remote element handles.
//!
//! An [`Element`] is a value-like handle: a session plus the opaque id the
//! driver assigned. Identity is `(session, elementId)`; semantic equality
//! goes through the driver-side `equals` endpoint.

use serde_json::{json, Value as Json};
use std::fmt;
use std::time::Duration;

use crate::error::CmdError;
use crate::keys::Keys;
use crate::locator::Strategy;
use crate::session::{find_all_with_root, find_with_root, string_value, Session};

/// The JsonWireProtocol sentinel key for elements crossing the wire.
pub(crate) const ELEMENT_KEY: &str = "ELEMENT";
/// The W3C sentinel key, a fixed UUID.
pub(crate) const W3C_ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Extract the element id out of a wire object shaped `{ELEMENT: "<id>"}`
/// (or its W3C equivalent).
pub(crate) fn parse_element_ref(value: &Json) -> Result<String, CmdError> {
    let id = value
        .get(ELEMENT_KEY)
        .or_else(|| value.get(W3C_ELEMENT_KEY))
        .and_then(Json::as_str);
    match id {
        Some(id) => Ok(id.to_string()),
        None => Err(CmdError::NotJson(value.to_string())),
    }
}

// Depth-first search for element references anywhere inside a script result.
fn collect_element_refs(value: &Json, refs: &mut Vec<String>) {
    match value {
        Json::Object(map) => {
            if let Some(id) = map
                .get(ELEMENT_KEY)
                .or_else(|| map.get(W3C_ELEMENT_KEY))
                .and_then(Json::as_str)
            {
                refs.push(id.to_string());
                return;
            }
            for nested in map.values() {
                collect_element_refs(nested, refs);
            }
        }
        Json::Array(entries) => {
            for entry in entries {
                collect_element_refs(entry, refs);
            }
        }
        _ => {}
    }
}

/// A single DOM element on the current page.
#[derive(Clone)]
pub struct Element {
    session: Session,
    element_id: String,
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element").field("element_id", &self.element_id).finish()
    }
}

impl Element {
    pub(crate) fn new(session: Session, element_id: String) -> Element {
        Element {
            session,
            element_id,
        }
    }

    /// The session this element belongs to.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The opaque element id assigned by the driver.
    pub fn element_id(&self) -> &str {
        &self.element_id
    }

    /// The wire form of this element, usable as a script argument.
    ///
    /// Both the JsonWire and the W3C sentinel keys are emitted; drivers
    /// ignore the one they do not know.
    pub fn to_json(&self) -> Result<Json, CmdError> {
        Ok(json!({
            ELEMENT_KEY: self.element_id,
            W3C_ELEMENT_KEY: self.element_id,
        }))
    }

    /// Rehydrate the first element reference found anywhere inside a script
    /// result.
    pub fn from_script_value(session: Session, value: &Json) -> Result<Element, CmdError> {
        let mut refs = Vec::new();
        collect_element_refs(value, &mut refs);
        match refs.into_iter().next() {
            Some(id) => Ok(Element::new(session, id)),
            None => Err(CmdError::NotJson(value.to_string())),
        }
    }

    /// Rehydrate every element reference found anywhere inside a script
    /// result, in document order of the serialized value.
    pub fn all_from_script_value(session: &Session, value: &Json) -> Vec<Element> {
        let mut refs = Vec::new();
        collect_element_refs(value, &mut refs);
        refs.into_iter().map(|id| Element::new(session.clone(), id)).collect()
    }

    async fn get(&self, subpath: &str, parts: &[&str]) -> Result<Json, CmdError> {
        let path = format!("element/$0/{}", subpath);
        let mut all_parts = vec![self.element_id.as_str()];
        all_parts.extend_from_slice(parts);
        // The sub-placeholders are written one off ($0 within subpath would
        // collide with the element id), so subpaths use $1 onwards.
        self.session.server_get(&path, &all_parts).await
    }

    async fn post(&self, subpath: &str, body: Option<Json>, parts: &[&str]) -> Result<Json, CmdError> {
        let path = format!("element/$0/{}", subpath);
        let mut all_parts = vec![self.element_id.as_str()];
        all_parts.extend_from_slice(parts);
        self.session.server_post(&path, body, &all_parts).await
    }
}

/// Element retrieval scoped to this element.
impl Element {
    /// Find the first descendant matching the given strategy and value.
    pub async fn find(&self, strategy: Strategy, value: &str) -> Result<Element, CmdError> {
        find_with_root(&self.session, Some(self), strategy, value).await
    }

    /// Find every descendant matching the given strategy and value.
    pub async fn find_all(&self, strategy: Strategy, value: &str) -> Result<Vec<Element>, CmdError> {
        find_all_with_root(&self.session, Some(self), strategy, value).await
    }

    /// Find the first *displayed* descendant matching the given strategy and
    /// value.
    pub async fn find_displayed(&self, strategy: Strategy, value: &str) -> Result<Element, CmdError> {
        crate::poll::find_displayed_with_root(&self.session, Some(self), strategy, value).await
    }

    /// Wait for every descendant matching the given strategy and value to
    /// leave the DOM.
    pub async fn wait_for_deleted(&self, strategy: Strategy, value: &str) -> Result<(), CmdError> {
        crate::poll::wait_for_deleted_with_root(&self.session, Some(self), strategy, value).await
    }
}

/// Interaction.
impl Element {
    /// Click this element.
    pub async fn click(&self) -> Result<(), CmdError> {
        if self.session.cap("brokenOptionSelect") && self.get_tag_name().await? == "option" {
            return self.select_option_scripted().await;
        }
        if self.session.cap("brokenClick") {
            self.session
                .execute("arguments[0].click();", vec![self.to_json()?])
                .await?;
            return Ok(());
        }
        self.post("click", None, &[]).await?;
        // Give drivers that return before the click has been processed a
        // moment to catch up.
        if self.session.cap("returnsFromClickImmediately") {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        Ok(())
    }

    // Selects an <option> by flipping the property and dispatching a change
    // event from the owning <select>, for drivers whose click does neither.
    async fn select_option_scripted(&self) -> Result<(), CmdError> {
        let script = "\
            var option = arguments[0];\
            var select = option.parentNode;\
            while (select && String(select.nodeName).toUpperCase() !== 'SELECT') {\
                select = select.parentNode;\
            }\
            if (!select) { throw new Error('option is not within a select'); }\
            option.selected = true;\
            var event;\
            try {\
                event = new Event('change', { bubbles: true });\
            } catch (error) {\
                event = document.createEvent('HTMLEvents');\
                event.initEvent('change', true, true);\
            }\
            select.dispatchEvent(event);\
            return null;";
        self.session.execute(script, vec![self.to_json()?]).await?;
        Ok(())
    }

    /// Submit the form this element belongs to.
    pub async fn submit(&self) -> Result<(), CmdError> {
        if self.session.cap("brokenSubmitElement") {
            // Calling a detached form's submit avoids any page script that
            // shadowed the real one with a button named "submit".
            let script = "\
                var element = arguments[0];\
                var form = element;\
                while (form && String(form.nodeName).toUpperCase() !== 'FORM') {\
                    form = form.parentNode;\
                }\
                if (!form) { throw new Error('element is not within a form'); }\
                document.createElement('form').submit.call(form);\
                return null;";
            self.session.execute(script, vec![self.to_json()?]).await?;
            return Ok(());
        }
        self.post("submit", None, &[]).await.map(drop)
    }

    /// Type keys into this element.
    pub async fn type_keys(&self, keys: impl Into<Keys>) -> Result<(), CmdError> {
        let keys = keys.into();
        if self.session.cap("brokenSendKeys") {
            self.session
                .execute("arguments[0].focus();", vec![self.to_json()?])
                .await?;
            return self.session.simulate_keys(&keys).await;
        }
        let value = if self.session.cap("usesFlatKeysArray") {
            keys.flattened()
        } else {
            keys.as_strings().to_vec()
        };
        // JsonWire reads `value`, W3C reads `text`; sending both keeps every
        // driver era happy.
        let body = json!({ "value": value, "text": keys.joined() });
        self.post("value", Some(body), &[]).await.map(drop)
    }

    /// Clear the value of this (input or textarea) element.
    pub async fn clear_value(&self) -> Result<(), CmdError> {
        self.post("clear", None, &[]).await.map(drop)
    }
}

/// State.
impl Element {
    /// The visible text of this element, with leading/trailing whitespace
    /// removed.
    pub async fn get_visible_text(&self) -> Result<String, CmdError> {
        let text = string_value(self.get("text", &[]).await?)?;
        if self.session.cap("brokenWhitespaceNormalization") {
            return Ok(normalize_whitespace(&text));
        }
        Ok(text)
    }

    /// The tag name of this element, lowercased by the driver.
    pub async fn get_tag_name(&self) -> Result<String, CmdError> {
        string_value(self.get("name", &[]).await?)
    }

    /// True if this (option, checkbox or radio) element is selected.
    pub async fn is_selected(&self) -> Result<bool, CmdError> {
        bool_value(self.get("selected", &[]).await?)
    }

    /// True if this form element is enabled.
    pub async fn is_enabled(&self) -> Result<bool, CmdError> {
        bool_value(self.get("enabled", &[]).await?)
    }

    /// True if this element is displayed.
    pub async fn is_displayed(&self) -> Result<bool, CmdError> {
        let displayed = bool_value(self.get("displayed", &[]).await?)?;
        if displayed
            && (self.session.cap("brokenElementDisplayedOffscreen")
                || self.session.cap("brokenElementDisplayedOpacity"))
        {
            // The driver thinks it is displayed, but it cannot tell
            // fully-transparent or off-screen elements apart from real ones.
            let script = "\
                var element = arguments[0];\
                var scrollX = document.documentElement.scrollLeft || document.body.scrollLeft;\
                var scrollY = document.documentElement.scrollTop || document.body.scrollTop;\
                do {\
                    if (window.getComputedStyle(element, null).opacity === '0') {\
                        return false;\
                    }\
                    var rect = element.getBoundingClientRect();\
                    if (rect.right + scrollX <= 0 || rect.bottom + scrollY <= 0) {\
                        return false;\
                    }\
                } while ((element = element.parentNode) && element.nodeType === 1);\
                return true;";
            let value = self.session.execute(script, vec![self.to_json()?]).await?;
            return bool_value(value);
        }
        Ok(displayed)
    }

    /// The raw DOM attribute exactly as the driver reports it.
    ///
    /// Returns `None` when the attribute is absent; drivers with
    /// `brokenNullGetSpecAttribute` report absence as an empty string, which
    /// is coerced back to `None`.
    pub async fn get_spec_attribute(&self, name: &str) -> Result<Option<String>, CmdError> {
        let value = self.get("attribute/$1", &[name]).await?;
        let value = match value {
            Json::Null => None,
            Json::String(s) => Some(s),
            v => return Err(CmdError::NotJson(v.to_string())),
        };
        if self.session.cap("brokenNullGetSpecAttribute") {
            return Ok(value.filter(|s| !s.is_empty()));
        }
        Ok(value)
    }

    /// The attribute value with DOM `getAttribute` semantics.
    ///
    /// Prefers the wire endpoint; drivers that predate it (or conflate
    /// attributes with properties) get a script fallback.
    pub async fn get_attribute(&self, name: &str) -> Result<Option<String>, CmdError> {
        match self.get_spec_attribute(name).await {
            Err(e) if e.is_unknown_command() => {
                let value = self
                    .session
                    .execute(
                        "return arguments[0].getAttribute(arguments[1]);",
                        vec![self.to_json()?, json!(name)],
                    )
                    .await?;
                match value {
                    Json::Null => Ok(None),
                    Json::String(s) => Ok(Some(s)),
                    v => Err(CmdError::NotJson(v.to_string())),
                }
            }
            r => r,
        }
    }

    /// A DOM property of this element.
    pub async fn get_property(&self, name: &str) -> Result<Json, CmdError> {
        match self.get("property/$1", &[name]).await {
            Err(e) if e.is_unknown_command() => {
                self.session
                    .execute(
                        "return arguments[0][arguments[1]];",
                        vec![self.to_json()?, json!(name)],
                    )
                    .await
            }
            r => r,
        }
    }

    /// True if this and `other` refer to the same DOM element.
    pub async fn equals(&self, other: &Element) -> Result<bool, CmdError> {
        match self.get("equals/$1", &[other.element_id()]).await {
            Err(e) if e.is_unknown_command() => {
                let value = self
                    .session
                    .execute(
                        "return arguments[0] === arguments[1];",
                        vec![self.to_json()?, other.to_json()?],
                    )
                    .await?;
                bool_value(value)
            }
            r => r.and_then(bool_value),
        }
    }

    /// The position of this element's top-left corner in the page.
    pub async fn get_position(&self) -> Result<(f64, f64), CmdError> {
        if self.session.cap("brokenElementPosition") {
            let script = "\
                var rect = arguments[0].getBoundingClientRect();\
                var scrollX = document.documentElement.scrollLeft || document.body.scrollLeft;\
                var scrollY = document.documentElement.scrollTop || document.body.scrollTop;\
                return { x: scrollX + rect.left, y: scrollY + rect.top };";
            let value = self.session.execute(script, vec![self.to_json()?]).await?;
            return point_from(&value);
        }
        let value = if self.session.is_webdriver() {
            self.get("rect", &[]).await?
        } else {
            self.get("location", &[]).await?
        };
        point_from(&value)
    }

    /// The rendered size of this element.
    pub async fn get_size(&self) -> Result<(f64, f64), CmdError> {
        if self.session.cap("brokenCssTransformedSize") {
            let script = "\
                var rect = arguments[0].getBoundingClientRect();\
                return { width: rect.width, height: rect.height };";
            let value = self.session.execute(script, vec![self.to_json()?]).await?;
            return dimensions_from(&value);
        }
        let value = if self.session.is_webdriver() {
            self.get("rect", &[]).await?
        } else {
            self.get("size", &[]).await?
        };
        dimensions_from(&value)
    }

    /// The computed value of a CSS property.
    pub async fn get_computed_style(&self, property: &str) -> Result<String, CmdError> {
        if self.session.cap("brokenComputedStyles") {
            let value = self
                .session
                .execute(
                    "return window.getComputedStyle(arguments[0], null)[arguments[1]] || '';",
                    vec![self.to_json()?, json!(property)],
                )
                .await?;
            return string_value(value);
        }
        string_value(self.get("css/$1", &[property]).await?)
    }
}

// Strategy-suffixed shortcut families, mirroring the session-level set but
// scoped to this element.
macro_rules! element_strategy_helpers {
    ($(($method:ident, $strategy:ident)),*$(,)?) => {
        paste::paste! {
            /// Shortcut methods, one family per locator strategy.
            impl Element {
                $(
                    /// Find the first descendant matching the given
                    #[doc = concat!("`", stringify!($method), "` value.")]
                    pub async fn [<find_by_ $method>](&self, value: &str) -> Result<Element, CmdError> {
                        self.find(Strategy::$strategy, value).await
                    }

                    /// Find all descendants matching the given
                    #[doc = concat!("`", stringify!($method), "` value.")]
                    pub async fn [<find_all_by_ $method>](&self, value: &str) -> Result<Vec<Element>, CmdError> {
                        self.find_all(Strategy::$strategy, value).await
                    }

                    /// Find the first displayed descendant matching the given
                    #[doc = concat!("`", stringify!($method), "` value.")]
                    pub async fn [<find_displayed_by_ $method>](&self, value: &str) -> Result<Element, CmdError> {
                        self.find_displayed(Strategy::$strategy, value).await
                    }

                    /// Wait for every descendant matching the given
                    #[doc = concat!("`", stringify!($method), "` value to leave the DOM.")]
                    pub async fn [<wait_for_deleted_by_ $method>](&self, value: &str) -> Result<(), CmdError> {
                        self.wait_for_deleted(Strategy::$strategy, value).await
                    }
                )*
            }
        }
    }
}

element_strategy_helpers![
    (class_name, ClassName),
    (css_selector, CssSelector),
    (id, Id),
    (name, Name),
    (link_text, LinkText),
    (partial_link_text, PartialLinkText),
    (tag_name, TagName),
    (xpath, XPath),
];

fn bool_value(value: Json) -> Result<bool, CmdError> {
    match value {
        Json::Bool(b) => Ok(b),
        v => Err(CmdError::NotJson(v.to_string())),
    }
}

fn point_from(value: &Json) -> Result<(f64, f64), CmdError> {
    let x = value.get("x").and_then(Json::as_f64);
    let y = value.get("y").and_then(Json::as_f64);
    match (x, y) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(CmdError::NotJson(value.to_string())),
    }
}

fn dimensions_from(value: &Json) -> Result<(f64, f64), CmdError> {
    let width = value.get("width").and_then(Json::as_f64);
    let height = value.get("height").and_then(Json::as_f64);
    match (width, height) {
        (Some(width), Some(height)) => Ok((width, height)),
        _ => Err(CmdError::NotJson(value.to_string())),
    }
}

/// Apply the whitespace normalization a conforming driver performs on
/// visible text: trim the ends, turn CRLF runs into single newlines, and
/// collapse runs of spaces.
pub(crate) fn normalize_whitespace(text: &str) -> String {
    let text = text.trim();

    let chars: Vec<char> = text.chars().collect();
    let mut collapsed = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_whitespace() {
            let start = i;
            let mut has_crlf = false;
            while i < chars.len() && chars[i].is_whitespace() {
                if chars[i] == '\r' && chars.get(i + 1) == Some(&'\n') {
                    has_crlf = true;
                }
                i += 1;
            }
            if has_crlf {
                collapsed.push('\n');
            } else {
                collapsed.extend(&chars[start..i]);
            }
        } else {
            collapsed.push(chars[i]);
            i += 1;
        }
    }

    let mut result = String::with_capacity(collapsed.len());
    let mut previous_space = false;
    for c in collapsed.chars() {
        if c == ' ' {
            if !previous_space {
                result.push(c);
            }
            previous_space = true;
        } else {
            result.push(c);
            previous_space = false;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_sentinel_shapes() {
        let legacy = json!({ "ELEMENT": "abc" });
        assert_eq!(parse_element_ref(&legacy).unwrap(), "abc");

        let w3c = json!({ W3C_ELEMENT_KEY: "def" });
        assert_eq!(parse_element_ref(&w3c).unwrap(), "def");

        assert!(parse_element_ref(&json!({"nope": 1})).is_err());
    }

    #[test]
    fn finds_nested_element_refs() {
        let value = json!({
            "wrapper": [
                { "inner": { "ELEMENT": "one" } },
                { "ELEMENT": "two" },
            ]
        });
        let mut refs = Vec::new();
        collect_element_refs(&value, &mut refs);
        assert_eq!(refs, vec!["one", "two"]);
    }

    #[test]
    fn whitespace_normalization() {
        assert_eq!(normalize_whitespace("  hello  world  "), "hello world");
        assert_eq!(normalize_whitespace("a \r\n b"), "a\nb");
        assert_eq!(normalize_whitespace("a\t\r\n\tb"), "a\nb");
        assert_eq!(normalize_whitespace("a    b"), "a b");
        assert_eq!(normalize_whitespace("\r\n x \r\n"), "x");
    }
}
