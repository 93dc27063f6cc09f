//! User-prompt (alert, confirm, prompt) handling.

use serde_json::json;

use crate::error::CmdError;
use crate::keys::Keys;
use crate::session::{string_value, Session};

impl Session {
    fn alert_paths(&self) -> (&'static str, &'static str, &'static str) {
        // (text, accept, dismiss)
        if self.is_webdriver() {
            ("alert/text", "alert/accept", "alert/dismiss")
        } else {
            ("alert_text", "accept_alert", "dismiss_alert")
        }
    }

    /// The message of the currently open prompt.
    pub async fn get_alert_text(&self) -> Result<String, CmdError> {
        let (text, _, _) = self.alert_paths();
        string_value(self.server_get(text, &[]).await?)
    }

    /// Type an answer into the currently open prompt.
    pub async fn type_in_prompt(&self, keys: impl Into<Keys>) -> Result<(), CmdError> {
        let (text, _, _) = self.alert_paths();
        let text_value = keys.into().joined();
        self.server_post(text, Some(json!({ "text": text_value })), &[]).await?;
        Ok(())
    }

    /// Accept the currently open prompt, like clicking "OK".
    pub async fn accept_alert(&self) -> Result<(), CmdError> {
        let (_, accept, _) = self.alert_paths();
        self.server_post(accept, None, &[]).await.map(drop)
    }

    /// Dismiss the currently open prompt, like clicking "Cancel" (or "OK"
    /// for plain alerts).
    pub async fn dismiss_alert(&self) -> Result<(), CmdError> {
        let (_, _, dismiss) = self.alert_paths();
        self.server_post(dismiss, None, &[]).await.map(drop)
    }
}
