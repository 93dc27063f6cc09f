//! Mouse, touch and keyboard input.
//!
//! Two regimes coexist here. Drivers with working input endpoints get the
//! JsonWire `/moveto`, `/buttondown`, `/click`, `/touch/*` and `/keys`
//! commands. Drivers flagged `brokenMouseEvents` or `brokenSendKeys` (and
//! those without a `/keys` command at all) get synthetic events dispatched
//! in the page instead, with the session tracking a virtual mouse position
//! between calls.

use serde_json::{json, Map, Value as Json};
use std::time::Duration;

use crate::element::Element;
use crate::error::CmdError;
use crate::keys::Keys;
use crate::session::Session;

// Dispatches synthetic mouse events, tracking the pointer position that the
// driver would otherwise own. Receives {action, position, element?, xOffset?,
// yOffset?, button?} and returns the new position.
pub(crate) const SIMULATE_MOUSE: &str = "\
var kwArgs = arguments[0];\
var position = kwArgs.position;\
function getTarget() {\
    if (kwArgs.element) { return kwArgs.element; }\
    return document.elementFromPoint(\
        position.x - window.pageXOffset,\
        position.y - window.pageYOffset\
    ) || document.documentElement;\
}\
function dispatch(type, detail, button) {\
    var target = getTarget();\
    var event;\
    try {\
        event = new MouseEvent(type, {\
            bubbles: true, cancelable: true, view: window, detail: detail,\
            screenX: position.x, screenY: position.y,\
            clientX: position.x - window.pageXOffset,\
            clientY: position.y - window.pageYOffset,\
            button: button\
        });\
    } catch (error) {\
        event = document.createEvent('MouseEvents');\
        event.initMouseEvent(type, true, true, window, detail,\
            position.x, position.y,\
            position.x - window.pageXOffset, position.y - window.pageYOffset,\
            false, false, false, false, button, null);\
    }\
    target.dispatchEvent(event);\
}\
if (kwArgs.action === 'mousemove') {\
    if (kwArgs.element) {\
        var rect = kwArgs.element.getBoundingClientRect();\
        position = {\
            x: window.pageXOffset + rect.left +\
                (kwArgs.xOffset != null ? kwArgs.xOffset : rect.width / 2),\
            y: window.pageYOffset + rect.top +\
                (kwArgs.yOffset != null ? kwArgs.yOffset : rect.height / 2)\
        };\
    } else {\
        position = {\
            x: position.x + (kwArgs.xOffset || 0),\
            y: position.y + (kwArgs.yOffset || 0)\
        };\
    }\
}\
switch (kwArgs.action) {\
    case 'mousemove':\
        dispatch('mousemove', 0, 0);\
        break;\
    case 'mousedown':\
        dispatch('mousedown', 1, kwArgs.button);\
        break;\
    case 'mouseup':\
        dispatch('mouseup', 1, kwArgs.button);\
        break;\
    case 'click':\
        dispatch('mousedown', 1, kwArgs.button);\
        dispatch('mouseup', 1, kwArgs.button);\
        dispatch('click', 1, kwArgs.button);\
        break;\
    case 'dblclick':\
        dispatch('mousedown', 1, kwArgs.button);\
        dispatch('mouseup', 1, kwArgs.button);\
        dispatch('click', 1, kwArgs.button);\
        dispatch('mousedown', 2, kwArgs.button);\
        dispatch('mouseup', 2, kwArgs.button);\
        dispatch('click', 2, kwArgs.button);\
        dispatch('dblclick', 2, kwArgs.button);\
        break;\
}\
return position;";

// Dispatches keydown/keypress/keyup per character on the active element,
// inserting printable characters into the element's value, or through a
// Range when the target is contentEditable. WebDriver's private-use code
// points count as control keys and are never inserted as text.
pub(crate) const SIMULATE_KEYS: &str = "\
var keys = arguments[0];\
var target = document.activeElement;\
function dispatch(type, key) {\
    var event;\
    try {\
        event = new KeyboardEvent(type, {\
            bubbles: true, cancelable: true, view: window, key: key\
        });\
    } catch (error) {\
        event = document.createEvent('KeyboardEvent');\
        event.initKeyboardEvent(type, true, true, window, key, 3, '', false, '');\
    }\
    return target.dispatchEvent(event);\
}\
function insert(character) {\
    if (target.isContentEditable) {\
        var selection = window.getSelection();\
        var range = selection.getRangeAt(0);\
        range.deleteContents();\
        var node = document.createTextNode(character);\
        range.insertNode(node);\
        range.setStartAfter(node);\
        range.setEndAfter(node);\
        selection.removeAllRanges();\
        selection.addRange(range);\
    } else if ('value' in target) {\
        target.value += character;\
    }\
}\
for (var i = 0; i < keys.length; i++) {\
    var key = keys[i];\
    for (var j = 0; j < key.length; j++) {\
        var character = key.charAt(j);\
        var code = character.charCodeAt(0);\
        dispatch('keydown', character);\
        var proceed = dispatch('keypress', character);\
        if (proceed && (code < 0xE000 || code > 0xF8FF)) {\
            insert(character);\
        }\
        dispatch('keyup', character);\
    }\
}\
return null;";

const MOUSE_BUTTON_LEFT: u64 = 0;

/// Mouse input.
impl Session {
    /// Move the mouse to an element (optionally offset from its top-left
    /// corner), or by an offset from its last position when no element is
    /// given.
    pub async fn move_mouse_to(
        &self,
        element: Option<&Element>,
        x_offset: Option<i64>,
        y_offset: Option<i64>,
    ) -> Result<(), CmdError> {
        if self.cap("brokenMouseEvents") {
            return self.simulate_mouse_move(element, x_offset, y_offset).await;
        }

        if element.is_none() && !self.with_state(|state| state.moved_to_element) {
            // The driver has no mouse position yet, so a relative move is
            // undefined; anchor at the document origin first.
            let (root, x_offset, y_offset) = if self.cap("brokenHtmlMouseMove") {
                let body = self.execute("return document.body;", vec![]).await?;
                let body = Element::from_script_value(self.clone(), &body)?;
                let (x, y) = body.get_position().await?;
                (
                    body,
                    Some(x_offset.unwrap_or(0) - x as i64),
                    Some(y_offset.unwrap_or(0) - y as i64),
                )
            } else {
                let root = self.execute("return document.documentElement;", vec![]).await?;
                (Element::from_script_value(self.clone(), &root)?, x_offset, y_offset)
            };
            self.move_mouse_native(Some(&root), x_offset, y_offset).await?;
            return Ok(());
        }

        self.move_mouse_native(element, x_offset, y_offset).await
    }

    async fn move_mouse_native(
        &self,
        element: Option<&Element>,
        x_offset: Option<i64>,
        y_offset: Option<i64>,
    ) -> Result<(), CmdError> {
        let mut body = Map::new();
        if let Some(element) = element {
            body.insert("element".to_string(), json!(element.element_id()));
        }
        if let Some(x) = x_offset {
            body.insert("xoffset".to_string(), json!(x));
        }
        if let Some(y) = y_offset {
            body.insert("yoffset".to_string(), json!(y));
        }
        self.server_post("moveto", Some(Json::Object(body)), &[]).await?;
        self.with_state(|state| state.moved_to_element = true);
        Ok(())
    }

    async fn simulate_mouse_move(
        &self,
        element: Option<&Element>,
        x_offset: Option<i64>,
        y_offset: Option<i64>,
    ) -> Result<(), CmdError> {
        let kwargs = json!({
            "action": "mousemove",
            "position": self.simulated_position(),
            "element": element.map(|e| e.to_json()).transpose()?,
            "xOffset": x_offset,
            "yOffset": y_offset,
        });
        let position = self.execute(SIMULATE_MOUSE, vec![kwargs]).await?;
        self.store_simulated_position(&position);
        self.with_state(|state| state.moved_to_element = true);
        Ok(())
    }

    /// Press (and hold) a mouse button. Button 0 is the left button.
    pub async fn press_mouse_button(&self, button: u64) -> Result<(), CmdError> {
        if self.cap("brokenMouseEvents") {
            return self.simulate_mouse_button("mousedown", button).await;
        }
        self.server_post("buttondown", Some(json!({ "button": button })), &[])
            .await
            .map(drop)
    }

    /// Release a held mouse button.
    pub async fn release_mouse_button(&self, button: u64) -> Result<(), CmdError> {
        if self.cap("brokenMouseEvents") {
            return self.simulate_mouse_button("mouseup", button).await;
        }
        self.server_post("buttonup", Some(json!({ "button": button })), &[])
            .await
            .map(drop)
    }

    /// Click a mouse button at the current mouse position.
    pub async fn click_mouse_button(&self, button: u64) -> Result<(), CmdError> {
        if self.cap("brokenMouseEvents") {
            return self.simulate_mouse_button("click", button).await;
        }
        self.server_post("click", Some(json!({ "button": button })), &[]).await?;
        // ios-driver resolves the click before the simulated gesture has
        // landed.
        if self.cap("touchEnabled") {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        Ok(())
    }

    /// Double-click the left mouse button at the current mouse position.
    pub async fn double_click(&self) -> Result<(), CmdError> {
        if self.cap("brokenMouseEvents") {
            return self.simulate_mouse_button("dblclick", MOUSE_BUTTON_LEFT).await;
        }
        if self.cap("brokenDoubleClick") {
            self.press_mouse_button(MOUSE_BUTTON_LEFT).await?;
            self.release_mouse_button(MOUSE_BUTTON_LEFT).await?;
        }
        self.server_post("doubleclick", None, &[]).await.map(drop)
    }

    async fn simulate_mouse_button(&self, action: &str, button: u64) -> Result<(), CmdError> {
        let kwargs = json!({
            "action": action,
            "position": self.simulated_position(),
            "button": button,
        });
        let position = self.execute(SIMULATE_MOUSE, vec![kwargs]).await?;
        self.store_simulated_position(&position);
        Ok(())
    }

    fn simulated_position(&self) -> Json {
        let (x, y) = self.with_state(|state| state.last_mouse_position).unwrap_or((0, 0));
        json!({ "x": x, "y": y })
    }

    fn store_simulated_position(&self, position: &Json) {
        let x = position.get("x").and_then(Json::as_i64);
        let y = position.get("y").and_then(Json::as_i64);
        if let (Some(x), Some(y)) = (x, y) {
            self.with_state(|state| state.last_mouse_position = Some((x, y)));
        }
    }
}

/// Touch input.
impl Session {
    /// Tap an element.
    pub async fn tap(&self, element: &Element) -> Result<(), CmdError> {
        self.server_post("touch/click", Some(json!({ "element": element.element_id() })), &[])
            .await
            .map(drop)
    }

    /// Press a finger at the given page coordinates.
    pub async fn press_finger(&self, x: i64, y: i64) -> Result<(), CmdError> {
        self.server_post("touch/down", Some(json!({ "x": x, "y": y })), &[]).await.map(drop)
    }

    /// Release a finger at the given page coordinates.
    pub async fn release_finger(&self, x: i64, y: i64) -> Result<(), CmdError> {
        self.server_post("touch/up", Some(json!({ "x": x, "y": y })), &[]).await.map(drop)
    }

    /// Move a held finger to the given page coordinates.
    pub async fn move_finger(&self, x: i64, y: i64) -> Result<(), CmdError> {
        self.server_post("touch/move", Some(json!({ "x": x, "y": y })), &[]).await.map(drop)
    }

    /// Scroll by an offset, anchored at an element when one is given.
    pub async fn touch_scroll(
        &self,
        element: Option<&Element>,
        x_offset: i64,
        y_offset: i64,
    ) -> Result<(), CmdError> {
        if self.cap("brokenTouchScroll") {
            let script = "\
                var element = arguments[0] || document.documentElement;\
                var rect = element.getBoundingClientRect();\
                window.scrollTo(rect.left + arguments[1], rect.top + arguments[2]);\
                return null;";
            let args = vec![
                element.map(|e| e.to_json()).transpose()?.unwrap_or(Json::Null),
                json!(x_offset),
                json!(y_offset),
            ];
            self.execute(script, args).await?;
            return Ok(());
        }

        let mut body = Map::new();
        if let Some(element) = element {
            body.insert("element".to_string(), json!(element.element_id()));
        }
        body.insert("xoffset".to_string(), json!(x_offset));
        body.insert("yoffset".to_string(), json!(y_offset));
        self.server_post("touch/scroll", Some(Json::Object(body)), &[]).await.map(drop)
    }

    /// Double-tap an element.
    pub async fn double_tap(&self, element: &Element) -> Result<(), CmdError> {
        self.server_post(
            "touch/doubleclick",
            Some(json!({ "element": element.element_id() })),
            &[],
        )
        .await
        .map(drop)
    }

    /// Long-press an element.
    pub async fn long_tap(&self, element: &Element) -> Result<(), CmdError> {
        self.server_post(
            "touch/longclick",
            Some(json!({ "element": element.element_id() })),
            &[],
        )
        .await
        .map(drop)
    }

    /// Flick with the given per-axis speeds, in pixels per second.
    pub async fn flick_finger(&self, x_speed: i64, y_speed: i64) -> Result<(), CmdError> {
        self.server_post(
            "touch/flick",
            Some(json!({ "xspeed": x_speed, "yspeed": y_speed })),
            &[],
        )
        .await
        .map(drop)
    }

    /// Flick starting at an offset within an element, at the given speed.
    pub async fn flick_finger_on(
        &self,
        element: &Element,
        x_offset: i64,
        y_offset: i64,
        speed: i64,
    ) -> Result<(), CmdError> {
        self.server_post(
            "touch/flick",
            Some(json!({
                "element": element.element_id(),
                "xoffset": x_offset,
                "yoffset": y_offset,
                "speed": speed,
            })),
            &[],
        )
        .await
        .map(drop)
    }
}

/// Keyboard input.
impl Session {
    /// Send keys to the focused element.
    ///
    /// On drivers without a working `/keys` command the keystrokes are
    /// simulated in-page, character by character, against the active
    /// element.
    pub async fn press_keys(&self, keys: impl Into<Keys>) -> Result<(), CmdError> {
        let keys = keys.into();
        if self.cap("brokenSendKeys") || !self.cap_or("supportsKeysCommand", true) {
            return self.simulate_keys(&keys).await;
        }
        let value = if self.cap("usesFlatKeysArray") {
            keys.flattened()
        } else {
            keys.as_strings().to_vec()
        };
        self.server_post("keys", Some(json!({ "value": value })), &[]).await.map(drop)
    }

    pub(crate) async fn simulate_keys(&self, keys: &Keys) -> Result<(), CmdError> {
        self.execute(SIMULATE_KEYS, vec![json!(keys.as_strings())]).await?;
        Ok(())
    }
}
