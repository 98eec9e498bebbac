//! Legacy `browser` manifest field.
//!
//! The field is either a replacement entry (`"browser": "./dist/b.js"`) or a
//! per-file/per-module substitution table where `false` disables a module:
//!
//! ```json
//! { "browser": { "./lib/node.js": "./lib/browser.js", "fs": false } }
//! ```

use super::specifier::normalize_posix;
use serde_json::Value;

/// Right-hand side of a browser table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserTarget {
    Path(String),
    /// `false`: replaced by an empty module.
    Disabled,
}

/// Parsed `browser` field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BrowserField {
    #[default]
    Absent,
    Entry(String),
    Map(Vec<(String, BrowserTarget)>),
}

/// Outcome of a browser table lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserMapping {
    /// Substitute this path (or package name).
    Mapped(String),
    /// Resolve to the browser-external empty module.
    Stubbed,
    /// No entry; resolve the original path.
    NotMapped,
}

impl BrowserField {
    pub(crate) fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(s)) => Self::Entry(s.clone()),
            Some(Value::Object(obj)) => Self::Map(
                obj.iter()
                    .filter_map(|(k, v)| {
                        let target = match v {
                            Value::String(s) => BrowserTarget::Path(s.clone()),
                            Value::Bool(false) => BrowserTarget::Disabled,
                            _ => return None,
                        };
                        Some((k.clone(), target))
                    })
                    .collect(),
            ),
            _ => Self::Absent,
        }
    }

    /// Package entry declared through the field: the string form, or the
    /// table's `"."` key.
    #[must_use]
    pub fn entry(&self) -> Option<&str> {
        match self {
            Self::Entry(s) => Some(s),
            Self::Map(entries) => entries.iter().find_map(|(k, v)| match v {
                BrowserTarget::Path(p) if k == "." => Some(p.as_str()),
                _ => None,
            }),
            Self::Absent => None,
        }
    }

    /// Whether the field is a substitution table.
    #[must_use]
    pub fn is_map(&self) -> bool {
        matches!(self, Self::Map(_))
    }
}

/// Look up `relative_path` in a browser substitution table.
///
/// A key matches the normalized path exactly, or after dropping `.js`, or
/// after dropping `/index.js` from either side. Entry strings and absent
/// fields never match.
#[must_use]
pub fn map_with_browser_field(relative_path: &str, field: &BrowserField) -> BrowserMapping {
    let BrowserField::Map(entries) = field else {
        return BrowserMapping::NotMapped;
    };

    let normalized_path = normalize_posix(relative_path);
    for (key, target) in entries {
        let normalized_key = normalize_posix(key);
        if normalized_path == normalized_key
            || equal_without_suffix(&normalized_path, &normalized_key, ".js")
            || equal_without_suffix(&normalized_path, &normalized_key, "/index.js")
        {
            return match target {
                BrowserTarget::Path(p) => BrowserMapping::Mapped(p.clone()),
                BrowserTarget::Disabled => BrowserMapping::Stubbed,
            };
        }
    }
    BrowserMapping::NotMapped
}

fn equal_without_suffix(path: &str, key: &str, suffix: &str) -> bool {
    key.strip_suffix(suffix).is_some_and(|k| k == path)
        || path.strip_suffix(suffix).is_some_and(|p| p == key)
}
