//! The capability map describing a remote browser environment.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Sentinel key set once the capability filler has run for a session, making
/// the filler idempotent.
pub(crate) const FILLED_KEY: &str = "_filled";

/// An open, string-keyed map of feature flags, defect flags and identity
/// fields describing what a remote driver supports and what is broken.
///
/// Three kinds of entries coexist:
///
/// - *positive features* such as `touchEnabled` or `supportsExecuteAsync`;
/// - *broken flags* such as `brokenCookies` or `brokenMouseEvents`, set by
///   the known-defects table or by runtime probes;
/// - *identity* fields such as `browserName`, `browserVersion` and
///   `platformName`.
///
/// Truthiness follows the wire: a flag is set when its value is anything but
/// `false`, `null`, `0` or `""`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(Map<String, Json>);

impl Capabilities {
    /// Create an empty capability map.
    pub fn new() -> Self {
        Capabilities(Map::new())
    }

    /// Wrap an existing JSON map.
    pub fn from_map(map: Map<String, Json>) -> Self {
        let mut caps = Capabilities(map);
        caps.normalize_identity();
        caps
    }

    /// The raw underlying map.
    pub fn as_map(&self) -> &Map<String, Json> {
        &self.0
    }

    /// Get the raw value of a capability.
    pub fn get(&self, key: &str) -> Option<&Json> {
        self.0.get(key)
    }

    /// Set a capability.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Json>) {
        self.0.insert(key.into(), value.into());
    }

    /// Remove a capability, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<Json> {
        self.0.remove(key)
    }

    /// Whether the capability has any value at all, truthy or not.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Whether the capability is present and truthy.
    pub fn flag(&self, key: &str) -> bool {
        match self.0.get(key) {
            None | Some(Json::Null) => false,
            Some(Json::Bool(b)) => *b,
            Some(Json::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
            Some(Json::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    /// Whether the capability is truthy, defaulting when unset.
    ///
    /// Positive features that are assumed supported until a probe or the
    /// defect table says otherwise (`supportsKeysCommand`, for example) read
    /// through this with `default = true`.
    pub fn flag_or(&self, key: &str, default: bool) -> bool {
        match self.0.get(key) {
            None => default,
            Some(_) => self.flag(key),
        }
    }

    /// The capability as a string, if it is one.
    pub fn string(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Json::as_str)
    }

    /// The capability as a float, if it is numeric.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Json::as_f64)
    }

    /// The browser name, lowercased, or the empty string.
    pub fn browser_name(&self) -> String {
        self.string("browserName").unwrap_or("").to_lowercase()
    }

    /// The browser version, preferring `browserVersion` over the legacy
    /// `version` key.
    pub fn browser_version(&self) -> BrowserVersion {
        self.string("browserVersion")
            .or_else(|| self.string("version"))
            .map(BrowserVersion::parse)
            .unwrap_or_default()
    }

    /// The platform name, lowercased, preferring `platformName` over the
    /// legacy `platform` key.
    pub fn platform(&self) -> String {
        self.string("platformName")
            .or_else(|| self.string("platform"))
            .unwrap_or("")
            .to_lowercase()
    }

    /// Merge entries from `other`, keeping any value that is already present.
    ///
    /// The filler uses this so that caller-supplied capabilities always win
    /// over the defect table, and the defect table over probes.
    pub fn merge_missing(&mut self, other: Map<String, Json>) {
        for (key, value) in other {
            self.0.entry(key).or_insert(value);
        }
    }

    /// Whether the capability filler has completed for this map.
    pub fn is_filled(&self) -> bool {
        self.flag(FILLED_KEY)
    }

    pub(crate) fn set_filled(&mut self) {
        self.0.insert(FILLED_KEY.to_string(), Json::Bool(true));
    }

    /// Mirror `version`/`browserVersion` and `platform`/`platformName` onto
    /// each other so either spelling works regardless of protocol era.
    pub(crate) fn normalize_identity(&mut self) {
        for (old, new) in [("version", "browserVersion"), ("platform", "platformName")] {
            match (self.0.get(old).cloned(), self.0.get(new).cloned()) {
                (Some(v), None) => {
                    self.0.insert(new.to_string(), v);
                }
                (None, Some(v)) => {
                    self.0.insert(old.to_string(), v);
                }
                _ => {}
            }
        }
    }
}

impl FromIterator<(String, Json)> for Capabilities {
    fn from_iter<T: IntoIterator<Item = (String, Json)>>(iter: T) -> Self {
        Capabilities(iter.into_iter().collect())
    }
}

/// A dotted browser version, compared segment by segment.
///
/// Handles both human versions like `"60.0.3112"` and build-style versions
/// like Edge's `"25.10586"`; trailing non-numeric junk in a segment is
/// ignored (`"16.4.1 Safari"` parses as `16.4.1`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowserVersion(Vec<u64>);

impl BrowserVersion {
    /// Parse a dotted version string.
    pub fn parse(s: &str) -> Self {
        let segments = s
            .split('.')
            .map(|seg| {
                let digits: String = seg.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse().unwrap_or(0)
            })
            .collect();
        BrowserVersion(segments)
    }

    /// The major version, or 0 when unknown.
    pub fn major(&self) -> u64 {
        self.0.first().copied().unwrap_or(0)
    }

    /// True when no version information was available.
    pub fn is_unknown(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for BrowserVersion {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(BrowserVersion::parse(s))
    }
}

impl PartialOrd for BrowserVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BrowserVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for BrowserVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}
