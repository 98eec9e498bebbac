//! Parsed `package.json` record.
//!
//! A [`PackageData`] is built once per package directory and never mutated;
//! memoization lives in [`super::cache::PackageCache`].

use super::browser::BrowserField;
use super::exports::{ExportsField, ExportsTree};
use glob::{MatchOptions, Pattern};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Manifest file name.
pub const PACKAGE_JSON: &str = "package.json";

/// Module format declared by `"type"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PackageType {
    #[default]
    CommonJs,
    Module,
}

/// Compiled `sideEffects` field.
#[derive(Debug, Clone)]
pub enum SideEffects {
    /// `true`, `false` or absent (`true`).
    All(bool),
    /// Globs relative to the package directory.
    Patterns(Vec<Pattern>),
}

impl SideEffects {
    fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Bool(b)) => Self::All(*b),
            Some(Value::String(s)) => Self::Patterns(compile_side_effect_globs([s.as_str()])),
            Some(Value::Array(items)) => Self::Patterns(compile_side_effect_globs(
                items.iter().filter_map(Value::as_str),
            )),
            _ => Self::All(true),
        }
    }
}

fn compile_side_effect_globs<'a>(globs: impl IntoIterator<Item = &'a str>) -> Vec<Pattern> {
    globs
        .into_iter()
        .filter_map(|raw| {
            let glob = raw.strip_prefix("./").unwrap_or(raw);
            // Bare file names match at any depth
            let glob = if glob.contains('/') {
                glob.to_string()
            } else {
                format!("**/{glob}")
            };
            Pattern::new(&glob).ok()
        })
        .collect()
}

/// Immutable view of one package manifest.
#[derive(Debug, Clone)]
pub struct PackageData {
    /// Directory containing the manifest.
    pub dir: PathBuf,
    pub name: Option<String>,
    pub version: Option<String>,
    pub package_type: PackageType,
    pub browser: BrowserField,
    pub exports: Option<ExportsTree>,
    pub imports: Option<ExportsTree>,
    pub side_effects: SideEffects,
    pub peer_dependencies: BTreeMap<String, String>,
    optional_peers: HashSet<String>,
    string_fields: HashMap<String, String>,
}

impl PackageData {
    /// Parse manifest text for the package in `dir`.
    pub fn parse(dir: &Path, content: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(content)?;
        Ok(Self::from_value(dir, &value))
    }

    /// Build from an already-parsed manifest. Non-object manifests yield an
    /// empty record.
    #[must_use]
    pub fn from_value(dir: &Path, value: &Value) -> Self {
        let empty = serde_json::Map::new();
        let obj = value.as_object().unwrap_or(&empty);

        let string_fields = obj
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect();

        let peer_dependencies = obj
            .get("peerDependencies")
            .and_then(Value::as_object)
            .map(|deps| {
                deps.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let optional_peers = obj
            .get("peerDependenciesMeta")
            .and_then(Value::as_object)
            .map(|meta| {
                meta.iter()
                    .filter(|(_, v)| v.get("optional").and_then(Value::as_bool) == Some(true))
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            dir: dir.to_path_buf(),
            name: obj.get("name").and_then(Value::as_str).map(ToString::to_string),
            version: obj.get("version").and_then(Value::as_str).map(ToString::to_string),
            package_type: match obj.get("type").and_then(Value::as_str) {
                Some("module") => PackageType::Module,
                _ => PackageType::CommonJs,
            },
            browser: BrowserField::from_value(obj.get("browser")),
            exports: obj
                .get("exports")
                .and_then(|v| ExportsTree::from_field(v, ExportsField::Exports)),
            imports: obj
                .get("imports")
                .and_then(|v| ExportsTree::from_field(v, ExportsField::Imports)),
            side_effects: SideEffects::from_value(obj.get("sideEffects")),
            peer_dependencies,
            optional_peers,
            string_fields,
        }
    }

    /// Top-level string field, e.g. `main`, `module`, `jsnext:main`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.string_fields
            .get(name)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn has_exports(&self) -> bool {
        self.exports.is_some()
    }

    /// `name`, or the directory name for nameless manifests.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(PACKAGE_JSON)
    }

    /// Whether `id` is declared as an optional peer dependency.
    #[must_use]
    pub fn is_optional_peer(&self, id: &str) -> bool {
        self.peer_dependencies.contains_key(id) && self.optional_peers.contains(id)
    }

    /// Whether importing `file` may have side effects.
    #[must_use]
    pub fn has_side_effects(&self, file: &Path) -> bool {
        match &self.side_effects {
            SideEffects::All(b) => *b,
            SideEffects::Patterns(patterns) => {
                let Ok(relative) = file.strip_prefix(&self.dir) else {
                    return false;
                };
                let options = MatchOptions {
                    require_literal_separator: true,
                    ..MatchOptions::default()
                };
                patterns
                    .iter()
                    .any(|p| p.matches_path_with(relative, options))
            }
        }
    }
}
