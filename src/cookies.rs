//! Cookie-related functionality.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use time::OffsetDateTime;

use crate::error::{CmdError, Status};
use crate::session::Session;

/// Type alias for a [`cookie::Cookie`].
pub type Cookie<'a> = cookie::Cookie<'a>;

/// Representation of a cookie as it crosses the wire: `expiry` is seconds
/// since the epoch rather than a date.
///
/// Unknown keys are dropped during deserialization, which also disposes of
/// the non-standard fields Safari likes to attach.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireCookie {
    name: String,
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    secure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "httpOnly")]
    http_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiry: Option<f64>,
}

impl From<&Cookie<'static>> for WireCookie {
    fn from(cookie: &Cookie<'static>) -> WireCookie {
        let expiry = match cookie.expires() {
            Some(cookie::Expiration::DateTime(datetime)) => {
                Some(datetime.unix_timestamp() as f64)
            }
            _ => None,
        };
        WireCookie {
            name: cookie.name().to_string(),
            value: cookie.value().to_string(),
            path: cookie.path().map(str::to_string),
            domain: cookie.domain().map(str::to_string),
            secure: cookie.secure(),
            http_only: cookie.http_only(),
            expiry,
        }
    }
}

impl TryFrom<WireCookie> for Cookie<'static> {
    type Error = CmdError;

    fn try_from(wire: WireCookie) -> Result<Cookie<'static>, CmdError> {
        let mut cookie = Cookie::new(wire.name, wire.value);
        if let Some(path) = wire.path {
            cookie.set_path(path);
        }
        if let Some(domain) = wire.domain {
            cookie.set_domain(domain);
        }
        if let Some(secure) = wire.secure {
            cookie.set_secure(secure);
        }
        if let Some(http_only) = wire.http_only {
            cookie.set_http_only(http_only);
        }
        if let Some(expiry) = wire.expiry {
            let datetime = OffsetDateTime::from_unix_timestamp(expiry as i64).map_err(|e| {
                CmdError::InvalidArgument("expiry".to_string(), e.to_string())
            })?;
            cookie.set_expires(datetime);
        }
        Ok(cookie)
    }
}

// RFC 6265 token characters, the only ones legal in a cookie name.
fn valid_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+.^_`|~-".contains(&b))
}

// RFC 6265 cookie-octets: printable US-ASCII minus whitespace, double
// quotes, comma, semicolon and backslash.
fn valid_cookie_value(value: &str) -> bool {
    value
        .bytes()
        .all(|b| matches!(b, 0x21 | 0x23..=0x2b | 0x2d..=0x3a | 0x3c..=0x5b | 0x5d..=0x7e))
}

fn format_expires(datetime: OffsetDateTime) -> String {
    let format = time::macros::format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    datetime
        .to_offset(time::UtcOffset::UTC)
        .format(&format)
        .unwrap_or_default()
}

const EXPIRED_1970: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Cookie storage.
impl Session {
    /// All cookies set on the current page.
    pub async fn get_cookies(&self) -> Result<Vec<Cookie<'static>>, CmdError> {
        let value = self.server_get("cookie", &[]).await?;
        let wire: Vec<WireCookie> = serde_json::from_value(value)?;
        wire.into_iter().map(Cookie::try_from).collect()
    }

    /// Set a cookie on the current page.
    ///
    /// Drivers that do not implement the cookie endpoint get the cookie
    /// through `document.cookie` instead, after the name and value have been
    /// validated against RFC 6265 (the script assignment would otherwise
    /// corrupt the jar silently).
    pub async fn set_cookie(&self, cookie: &Cookie<'static>) -> Result<(), CmdError> {
        let wire = WireCookie::from(cookie);
        match self.server_post("cookie", Some(json!({ "cookie": wire })), &[]).await {
            Err(e) if e.is_unknown_command() => self.set_cookie_scripted(cookie).await,
            r => r.map(drop),
        }
    }

    async fn set_cookie_scripted(&self, cookie: &Cookie<'static>) -> Result<(), CmdError> {
        if !valid_cookie_name(cookie.name()) {
            return Err(CmdError::status_message(
                Status::UnableToSetCookie,
                format!("invalid cookie name \"{}\"", cookie.name()),
            ));
        }
        if !valid_cookie_value(cookie.value()) {
            return Err(CmdError::status_message(
                Status::UnableToSetCookie,
                format!("invalid cookie value \"{}\"", cookie.value()),
            ));
        }

        let mut parts = vec![format!("{}={}", cookie.name(), cookie.value())];
        if let Some(cookie::Expiration::DateTime(datetime)) = cookie.expires() {
            parts.push(format!("expires={}", format_expires(datetime)));
        }
        // "http" is the sentinel some drivers report for a host-only cookie;
        // reflecting it back would produce an invalid domain attribute.
        if let Some(domain) = cookie.domain().filter(|d| *d != "http") {
            parts.push(format!(
                "domain={}",
                utf8_percent_encode(domain, NON_ALPHANUMERIC)
            ));
        }
        if let Some(path) = cookie.path() {
            parts.push(format!("path={}", path));
        }
        if cookie.secure() == Some(true) {
            parts.push("secure".to_string());
        }

        self.execute(
            "document.cookie = arguments[0];",
            vec![Json::String(parts.join("; "))],
        )
        .await?;
        Ok(())
    }

    /// Delete every cookie visible to the current page.
    pub async fn clear_cookies(&self) -> Result<(), CmdError> {
        if self.cap("brokenDeleteCookie") {
            return self.expire_cookies_scripted(None).await;
        }
        self.server_delete("cookie", &[]).await.map(drop)
    }

    /// Delete the cookie with the given name.
    pub async fn delete_cookie(&self, name: &str) -> Result<(), CmdError> {
        if !self.cap("brokenDeleteCookie") {
            match self.server_delete("cookie/$0", &[name]).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_unknown_command() => {}
                Err(e) => return Err(e),
            }
        }
        self.expire_cookies_scripted(Some(name)).await
    }

    // Expires matching cookies through `document.cookie`, for drivers whose
    // DELETE endpoints are missing or lie about success. One script call
    // handles the whole batch: only the page knows its own domain, and the
    // expired stand-in must repeat the original domain and path or the
    // browser treats it as a different cookie.
    async fn expire_cookies_scripted(&self, name: Option<&str>) -> Result<(), CmdError> {
        let cookies = self.get_cookies().await?;
        let doomed: Vec<Json> = cookies
            .iter()
            .filter(|cookie| name.map_or(true, |name| cookie.name() == name))
            .map(|cookie| {
                json!({ "name": cookie.name(), "path": cookie.path().unwrap_or("/") })
            })
            .collect();
        if doomed.is_empty() {
            return Ok(());
        }

        let script = format!(
            "var cookies = arguments[0];\
             var domain = encodeURIComponent(document.domain);\
             for (var i = 0; i < cookies.length; i++) {{\
                 document.cookie = cookies[i].name +\
                     '=; expires={}; domain=' + domain + '; path=' + cookies[i].path;\
             }}\
             return null;",
            EXPIRED_1970
        );
        self.execute(&script, vec![Json::Array(doomed)]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn cookie_names_follow_rfc6265() {
        assert!(valid_cookie_name("sid"));
        assert!(valid_cookie_name("a-b_c.d"));
        assert!(!valid_cookie_name(""));
        assert!(!valid_cookie_name("a b"));
        assert!(!valid_cookie_name("a;b"));
        assert!(!valid_cookie_name("a=b"));
    }

    #[test]
    fn cookie_values_follow_rfc6265() {
        assert!(valid_cookie_value(""));
        assert!(valid_cookie_value("abc123!#$"));
        assert!(!valid_cookie_value("a b"));
        assert!(!valid_cookie_value("a\"b"));
        assert!(!valid_cookie_value("a,b"));
        assert!(!valid_cookie_value("a\\b"));
    }

    #[test]
    fn expires_renders_as_utc_string() {
        let formatted = format_expires(datetime!(1970-01-01 00:00:00 UTC));
        assert_eq!(formatted, EXPIRED_1970);
    }

    #[test]
    fn wire_round_trip_preserves_expiry_seconds() {
        let mut cookie = Cookie::new("sid", "v");
        cookie.set_expires(datetime!(2024-06-01 12:30:45 UTC));
        let wire = WireCookie::from(&cookie);
        assert_eq!(wire.expiry, Some(1717245045.0));

        let back = Cookie::try_from(wire).unwrap();
        match back.expires() {
            Some(cookie::Expiration::DateTime(datetime)) => {
                assert_eq!(datetime.unix_timestamp(), 1717245045);
            }
            other => panic!("unexpected expiration: {:?}", other),
        }
    }
}
