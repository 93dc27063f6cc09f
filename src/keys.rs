//! The special keyboard keys defined by WebDriver.
//!
//! Each key maps to a Unicode code point in the private-use area, as listed
//! in [the send-keys section] of the WebDriver standard. These are what the
//! `shortcutKey` capability resolves to and what key-simulation scripts
//! translate back into synthetic keyboard events.
//!
//! [the send-keys section]: https://www.w3.org/TR/webdriver1/#keyboard-actions

/// A special keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Key {
    /// The NULL key, which releases all held modifiers.
    Null,
    /// The cancel key.
    Cancel,
    /// The help key.
    Help,
    /// Backspace.
    Backspace,
    /// Tab.
    Tab,
    /// The clear key.
    Clear,
    /// Return.
    Return,
    /// Enter.
    Enter,
    /// Shift.
    Shift,
    /// Control.
    Control,
    /// Alt.
    Alt,
    /// Pause.
    Pause,
    /// Escape.
    Escape,
    /// Space.
    Space,
    /// Page up.
    PageUp,
    /// Page down.
    PageDown,
    /// End.
    End,
    /// Home.
    Home,
    /// The left arrow key.
    Left,
    /// The up arrow key.
    Up,
    /// The right arrow key.
    Right,
    /// The down arrow key.
    Down,
    /// Insert.
    Insert,
    /// Delete.
    Delete,
    /// Semicolon.
    Semicolon,
    /// Equals.
    Equals,
    /// Numpad 0.
    NumPad0,
    /// Numpad 1.
    NumPad1,
    /// Numpad 2.
    NumPad2,
    /// Numpad 3.
    NumPad3,
    /// Numpad 4.
    NumPad4,
    /// Numpad 5.
    NumPad5,
    /// Numpad 6.
    NumPad6,
    /// Numpad 7.
    NumPad7,
    /// Numpad 8.
    NumPad8,
    /// Numpad 9.
    NumPad9,
    /// Numpad multiply.
    Multiply,
    /// Numpad add.
    Add,
    /// Numpad separator.
    Separator,
    /// Numpad subtract.
    Subtract,
    /// Numpad decimal.
    Decimal,
    /// Numpad divide.
    Divide,
    /// F1.
    F1,
    /// F2.
    F2,
    /// F3.
    F3,
    /// F4.
    F4,
    /// F5.
    F5,
    /// F6.
    F6,
    /// F7.
    F7,
    /// F8.
    F8,
    /// F9.
    F9,
    /// F10.
    F10,
    /// F11.
    F11,
    /// F12.
    F12,
    /// The meta key, called "command" on macOS.
    Meta,
    /// The command key; an alias for [`Key::Meta`].
    Command,
}

impl From<Key> for char {
    fn from(k: Key) -> char {
        use Key::*;
        match k {
            Null => '\u{e000}',
            Cancel => '\u{e001}',
            Help => '\u{e002}',
            Backspace => '\u{e003}',
            Tab => '\u{e004}',
            Clear => '\u{e005}',
            Return => '\u{e006}',
            Enter => '\u{e007}',
            Shift => '\u{e008}',
            Control => '\u{e009}',
            Alt => '\u{e00a}',
            Pause => '\u{e00b}',
            Escape => '\u{e00c}',
            Space => '\u{e00d}',
            PageUp => '\u{e00e}',
            PageDown => '\u{e00f}',
            End => '\u{e010}',
            Home => '\u{e011}',
            Left => '\u{e012}',
            Up => '\u{e013}',
            Right => '\u{e014}',
            Down => '\u{e015}',
            Insert => '\u{e016}',
            Delete => '\u{e017}',
            Semicolon => '\u{e018}',
            Equals => '\u{e019}',
            NumPad0 => '\u{e01a}',
            NumPad1 => '\u{e01b}',
            NumPad2 => '\u{e01c}',
            NumPad3 => '\u{e01d}',
            NumPad4 => '\u{e01e}',
            NumPad5 => '\u{e01f}',
            NumPad6 => '\u{e020}',
            NumPad7 => '\u{e021}',
            NumPad8 => '\u{e022}',
            NumPad9 => '\u{e023}',
            Multiply => '\u{e024}',
            Add => '\u{e025}',
            Separator => '\u{e026}',
            Subtract => '\u{e027}',
            Decimal => '\u{e028}',
            Divide => '\u{e029}',
            F1 => '\u{e031}',
            F2 => '\u{e032}',
            F3 => '\u{e033}',
            F4 => '\u{e034}',
            F5 => '\u{e035}',
            F6 => '\u{e036}',
            F7 => '\u{e037}',
            F8 => '\u{e038}',
            F9 => '\u{e039}',
            F10 => '\u{e03a}',
            F11 => '\u{e03b}',
            F12 => '\u{e03c}',
            Meta | Command => '\u{e03d}',
        }
    }
}

impl From<Key> for String {
    fn from(k: Key) -> String {
        char::from(k).to_string()
    }
}

impl Key {
    /// The wire name of this key, used by the static defect table for the
    /// `shortcutKey` capability.
    pub fn name(&self) -> &'static str {
        match self {
            Key::Control => "CONTROL",
            Key::Meta | Key::Command => "COMMAND",
            Key::Alt => "ALT",
            Key::Shift => "SHIFT",
            _ => "",
        }
    }
}

/// A sequence of keys to send to the browser, mixing plain text and special
/// keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keys(pub(crate) Vec<String>);

impl Keys {
    /// The key sequence as discrete strings.
    pub fn as_strings(&self) -> &[String] {
        &self.0
    }

    /// The key sequence flattened into single-character strings, as required
    /// by drivers with the `usesFlatKeysArray` capability.
    pub fn flattened(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|s| s.chars())
            .map(|c| c.to_string())
            .collect()
    }

    /// The sequence joined into a single string.
    pub fn joined(&self) -> String {
        self.0.concat()
    }
}

impl From<&str> for Keys {
    fn from(s: &str) -> Keys {
        Keys(vec![s.to_string()])
    }
}

impl From<String> for Keys {
    fn from(s: String) -> Keys {
        Keys(vec![s])
    }
}

impl From<Key> for Keys {
    fn from(k: Key) -> Keys {
        Keys(vec![String::from(k)])
    }
}

impl From<Vec<String>> for Keys {
    fn from(v: Vec<String>) -> Keys {
        Keys(v)
    }
}

impl From<&[&str]> for Keys {
    fn from(v: &[&str]) -> Keys {
        Keys(v.iter().map(|s| s.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_flatten() {
        let keys = Keys::from(vec!["ab".to_string(), String::from(Key::Enter)]);
        let flat = keys.flattened();
        assert_eq!(flat, vec!["a", "b", "\u{e007}"]);
        assert_eq!(keys.joined(), "ab\u{e007}");
    }

    #[test]
    fn shortcut_names() {
        assert_eq!(Key::Command.name(), "COMMAND");
        assert_eq!(Key::Control.name(), "CONTROL");
    }
}
