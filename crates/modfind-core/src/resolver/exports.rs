//! Package.json `exports` and `imports` field evaluation.
//!
//! Implements Node.js-compatible conditional mapping:
//! - String shorthand and root conditions (only `"."` exposed)
//! - Exact subpath keys (`"./feature"`, `"#internal"`)
//! - Pattern keys with a `*` wildcard, most specific wins
//! - Legacy folder keys ending in `/`
//! - Nested conditions and arrays of fallbacks
//!
//! The raw JSON is parsed once into an [`ExportsTree`] when the manifest is
//! loaded; every lookup afterwards walks the typed tree.

use super::context::ResolveContext;
use super::package::PackageData;
use crate::error::ResolveError;
use serde_json::Value;

/// Which manifest map to resolve through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportsField {
    Exports,
    Imports,
}

impl ExportsField {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exports => "exports",
            Self::Imports => "imports",
        }
    }
}

/// Parsed shape of an `exports`/`imports` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportsTree {
    /// A path (or, for `imports`, a bare package) target.
    Target(String),
    /// `null`: explicitly not exported.
    Null,
    /// Condition name to target, in declared order.
    Conditions(Vec<(String, ExportsTree)>),
    /// Subpath key to target, in declared order. Only at the top level.
    Subpaths(Vec<(String, ExportsTree)>),
    /// Fallbacks tried in order.
    Alternatives(Vec<ExportsTree>),
}

impl ExportsTree {
    /// Parse a top-level manifest field.
    ///
    /// Returns `None` when the field is effectively absent (`null`, `false`).
    /// Shorthands are normalized so the result is always [`ExportsTree::Subpaths`].
    #[must_use]
    pub fn from_field(value: &Value, field: ExportsField) -> Option<Self> {
        let key_prefix = match field {
            ExportsField::Exports => '.',
            ExportsField::Imports => '#',
        };

        match value {
            Value::Null | Value::Bool(false) => None,
            Value::Object(obj) if obj.keys().any(|k| k.starts_with(key_prefix)) => {
                let entries = obj
                    .iter()
                    .filter(|(k, _)| k.starts_with(key_prefix))
                    .map(|(k, v)| (k.clone(), Self::from_value(v)))
                    .collect();
                Some(Self::Subpaths(entries))
            }
            // `imports` must be a subpath map
            _ if field == ExportsField::Imports => None,
            other => Some(Self::Subpaths(vec![(
                ".".to_string(),
                Self::from_value(other),
            )])),
        }
    }

    fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::Target(s.clone()),
            Value::Array(items) => Self::Alternatives(items.iter().map(Self::from_value).collect()),
            Value::Object(obj) => Self::Conditions(
                obj.iter()
                    .map(|(k, v)| (k.clone(), Self::from_value(v)))
                    .collect(),
            ),
            _ => Self::Null,
        }
    }
}

/// Active export conditions for one resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionSet {
    names: Vec<String>,
}

impl ConditionSet {
    /// Conditions for a context: `default`, `production`/`development`,
    /// `module`, user conditions, `import`/`require` and `browser`/`node`.
    #[must_use]
    pub fn new(ctx: &ResolveContext, target_web: bool) -> Self {
        let mut additional: Vec<String> = Vec::with_capacity(ctx.conditions.len() + 2);
        additional.push(if ctx.is_production { "production" } else { "development" }.to_string());
        additional.push("module".to_string());
        additional.extend(ctx.conditions.iter().cloned());

        let has = |name: &str| additional.iter().any(|c| c == name);
        let format = if ctx.is_require && !has("import") {
            "require"
        } else {
            "import"
        };
        let platform = if target_web && !has("node") {
            "browser"
        } else {
            "node"
        };

        let mut names = vec!["default".to_string()];
        names.extend(additional.iter().cloned());
        names.push(format.to_string());
        names.push(platform.to_string());
        names.dedup();
        Self { names }
    }

    /// Explicit condition list (`default` is always added).
    #[must_use]
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = vec!["default".to_string()];
        for name in names {
            let name = name.into();
            if !out.contains(&name) {
                out.push(name);
            }
        }
        Self { names: out }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Resolve `key` (`"."`, `"./sub"` or `"#name"`) through a package's
/// `exports` or `imports` map.
///
/// Returns `Ok(None)` when the package has no such field,
/// `Ok(Some(target))` with the raw target (usually `"./..."`), and
/// [`ResolveError::SubpathNotDefined`] when the field exists but does not
/// cover `key`. The latter is a hard failure: declaring a public surface
/// hides everything it does not list.
pub fn resolve_exports_or_imports(
    pkg: &PackageData,
    key: &str,
    conditions: &ConditionSet,
    field: ExportsField,
) -> Result<Option<String>, ResolveError> {
    let tree = match field {
        ExportsField::Exports => pkg.exports.as_ref(),
        ExportsField::Imports => pkg.imports.as_ref(),
    };
    let Some(tree) = tree else {
        return Ok(None);
    };

    match resolve_subpath(tree, key, conditions, field) {
        Some(target) => Ok(Some(target)),
        None => {
            let specifier = match field {
                ExportsField::Exports => format!("{}{}", pkg.display_name(), &key[1..]),
                ExportsField::Imports => key.to_string(),
            };
            Err(ResolveError::SubpathNotDefined {
                specifier,
                subpath: key.to_string(),
                field: field.as_str(),
                manifest: pkg.manifest_path(),
            })
        }
    }
}

/// Look `key` up in a top-level subpath map.
fn resolve_subpath(
    tree: &ExportsTree,
    key: &str,
    conditions: &ConditionSet,
    field: ExportsField,
) -> Option<String> {
    let ExportsTree::Subpaths(map) = tree else {
        return None;
    };

    // Exact key wins over any pattern
    if let Some((_, target)) = map.iter().find(|(k, _)| k == key && !k.contains('*')) {
        return evaluate(target, conditions, field);
    }

    // Collect pattern and folder matches with their specificity
    let mut matches: Vec<(&str, &ExportsTree, String)> = Vec::new();
    for (k, value) in map {
        if let Some(star_value) = match_pattern(k, key) {
            matches.push((k.as_str(), value, star_value));
        } else if k.ends_with('/') && key.starts_with(k.as_str()) && key.len() > k.len() {
            matches.push((k.as_str(), value, key[k.len()..].to_string()));
        }
    }

    // Longest key first, then lexicographic for ties
    matches.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

    let (matched_key, target, star_value) = matches.into_iter().next()?;
    let target = evaluate(target, conditions, field)?;

    if matched_key.contains('*') {
        substitute_star(&target, &star_value, field)
    } else if target.ends_with('/') {
        validate_target(&format!("{target}{star_value}"), field)
    } else {
        None
    }
}

/// Evaluate a target tree against the active conditions.
fn evaluate(tree: &ExportsTree, conditions: &ConditionSet, field: ExportsField) -> Option<String> {
    match tree {
        ExportsTree::Target(s) => validate_target(s, field),
        ExportsTree::Null | ExportsTree::Subpaths(_) => None,
        ExportsTree::Conditions(entries) => entries
            .iter()
            .filter(|(name, _)| conditions.contains(name))
            .find_map(|(_, target)| evaluate(target, conditions, field)),
        ExportsTree::Alternatives(items) => items
            .iter()
            .find_map(|target| evaluate(target, conditions, field)),
    }
}

/// Match a pattern key against a subpath.
///
/// Returns the `*` substitution value if matched.
/// E.g., pattern `"./features/*"` with subpath `"./features/foo"` returns `Some("foo")`.
fn match_pattern(pattern: &str, subpath: &str) -> Option<String> {
    if pattern.matches('*').count() != 1 {
        return None;
    }
    let star_pos = pattern.find('*')?;

    let prefix = &pattern[..star_pos];
    let suffix = &pattern[star_pos + 1..];

    if !subpath.starts_with(prefix) {
        return None;
    }

    if !suffix.is_empty() && !subpath.ends_with(suffix) {
        return None;
    }

    let start = prefix.len();
    let end = subpath.len() - suffix.len();

    if start >= end {
        return None;
    }

    Some(subpath[start..end].to_string())
}

/// Substitute every `*` in the target with the star value.
fn substitute_star(target: &str, star_value: &str, field: ExportsField) -> Option<String> {
    if !target.contains('*') {
        return None;
    }
    validate_target(&target.replace('*', star_value), field)
}

/// Validate a target: `./`-relative without `..` segments.
///
/// `imports` targets may also name another package.
fn validate_target(target: &str, field: ExportsField) -> Option<String> {
    if let Some(rest) = target.strip_prefix("./") {
        if rest.split('/').any(|segment| segment == "..") {
            return None;
        }
        return Some(target.to_string());
    }

    if field == ExportsField::Imports
        && !target.starts_with('/')
        && !target.starts_with("../")
        && !target.contains("://")
    {
        return Some(target.to_string());
    }

    None
}
