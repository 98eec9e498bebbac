//! Dependency pre-bundling coordination.
//!
//! The resolver only talks to the pre-bundler through [`DepsOptimizer`]:
//! it registers dependencies it finds, asks for their optimized ids and
//! reads the browser hash used as a cache-busting `?v=` query.
//! [`DepsRegistry`] records discoveries and their output locations under
//! `.modfind/deps` without bundling anything itself.

use super::specifier::path_to_id;
use crate::config::OptimizeDepsConfig;
use modfind_util::fs::atomic_write;
use modfind_util::hash::{blake3_file, short_hash};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, PoisonError, RwLock};
use tracing::{debug, warn};

/// Cache directory under the project root.
pub const CACHE_DIR: &str = ".modfind";

/// Metadata file inside the deps directory.
pub const METADATA_FILE: &str = "_metadata.json";

/// Lockfiles whose content invalidates pre-bundled output.
const LOCKFILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "bun.lockb",
    "bun.lock",
];

/// One pre-bundled (or pending) dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizedDepInfo {
    /// Specifier as imported, e.g. `react` or `lodash/fp`.
    pub id: String,
    /// Bundled output file.
    pub file: PathBuf,
    /// Resolved source entry.
    pub src: String,
    pub browser_hash: String,
}

/// Contract with the dependency pre-bundler.
pub trait DepsOptimizer: Send + Sync + std::fmt::Debug {
    /// Record a dependency that is not optimized yet.
    ///
    /// Must return immediately with placeholder info; bundling happens
    /// elsewhere.
    fn register_missing_import(&self, id: &str, resolved: &str) -> OptimizedDepInfo;

    /// Id the browser should request for an optimized dependency.
    fn get_optimized_dep_id(&self, info: &OptimizedDepInfo) -> String;

    /// Hash of the current optimized set, for `?v=` queries.
    fn browser_hash(&self) -> String;
}

fn special_query_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[?&](?:worker|sharedworker|raw|url)\b").ok())
        .as_ref()
}

fn optimizable_entry_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.[cm]?[jt]s$").ok()).as_ref()
}

fn dep_version_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[?&]v=[\w.-]+\b").ok()).as_ref()
}

/// Whether `id` carries a query that must bypass pre-bundling
/// (`?worker`, `?sharedworker`, `?raw`, `?url`).
#[must_use]
pub fn has_special_query(id: &str) -> bool {
    special_query_re().is_some_and(|re| re.is_match(id))
}

/// Whether `id` already carries a `v=` version query.
#[must_use]
pub fn has_version_query(id: &str) -> bool {
    dep_version_re().is_some_and(|re| re.is_match(id))
}

/// Whether the pre-bundler can handle `file` (a path without query).
#[must_use]
pub fn is_optimizable(file: &str, options: &OptimizeDepsConfig) -> bool {
    optimizable_entry_re().is_some_and(|re| re.is_match(file))
        || options.extensions.iter().any(|ext| file.ends_with(ext.as_str()))
}

/// Flatten a specifier into a file name: `@scope/pkg/sub` becomes
/// `@scope_pkg_sub`, dots become `__`.
#[must_use]
pub fn flatten_id(id: &str) -> String {
    id.replace(['/', ':'], "_").replace('.', "__")
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepsMetadata {
    hash: String,
    browser_hash: String,
    optimized: BTreeMap<String, OptimizedDepInfo>,
}

#[derive(Debug, Default)]
struct RegistryState {
    browser_hash: String,
    optimized: BTreeMap<String, OptimizedDepInfo>,
    discovered: BTreeMap<String, OptimizedDepInfo>,
}

/// Reference [`DepsOptimizer`]: tracks discovered dependencies and
/// persists `_metadata.json`.
#[derive(Debug)]
pub struct DepsRegistry {
    deps_dir: PathBuf,
    hash: String,
    state: RwLock<RegistryState>,
}

impl DepsRegistry {
    /// Registry for the project at `root`.
    ///
    /// Reuses the committed metadata when the lockfile and options still
    /// hash the same.
    #[must_use]
    pub fn new(root: &Path, options: &OptimizeDepsConfig) -> Self {
        let deps_dir = root.join(CACHE_DIR).join("deps");
        let hash = config_hash(root, options);

        let mut state = RegistryState {
            browser_hash: browser_hash_for(&hash, std::iter::empty()),
            ..RegistryState::default()
        };

        let metadata_path = deps_dir.join(METADATA_FILE);
        if let Ok(content) = std::fs::read_to_string(&metadata_path) {
            match serde_json::from_str::<DepsMetadata>(&content) {
                Ok(meta) if meta.hash == hash => {
                    debug!(deps = meta.optimized.len(), "Reusing optimized deps metadata");
                    state.browser_hash = meta.browser_hash;
                    state.optimized = meta.optimized;
                }
                Ok(_) => debug!("Optimized deps metadata is stale"),
                Err(e) => warn!(path = %metadata_path.display(), error = %e, "Ignoring unreadable deps metadata"),
            }
        }

        Self {
            deps_dir,
            hash,
            state: RwLock::new(state),
        }
    }

    #[must_use]
    pub fn deps_dir(&self) -> &Path {
        &self.deps_dir
    }

    /// Hash of the lockfile and options.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Dependencies discovered since the last [`Self::persist`].
    #[must_use]
    pub fn discovered(&self) -> Vec<OptimizedDepInfo> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.discovered.values().cloned().collect()
    }

    /// Committed info for `id`.
    #[must_use]
    pub fn optimized(&self, id: &str) -> Option<OptimizedDepInfo> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.optimized.get(id).cloned()
    }

    /// Commit discovered dependencies and write `_metadata.json`.
    ///
    /// Returns the metadata path.
    pub fn persist(&self) -> io::Result<PathBuf> {
        let metadata = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let discovered = std::mem::take(&mut state.discovered);
            if !discovered.is_empty() {
                let next = browser_hash_for(&self.hash, state.optimized.keys().chain(discovered.keys()));
                state.browser_hash = next;
            }
            let browser_hash = state.browser_hash.clone();
            for (id, mut info) in discovered {
                info.browser_hash.clone_from(&browser_hash);
                state.optimized.insert(id, info);
            }
            DepsMetadata {
                hash: self.hash.clone(),
                browser_hash,
                optimized: state.optimized.clone(),
            }
        };

        std::fs::create_dir_all(&self.deps_dir)?;
        let path = self.deps_dir.join(METADATA_FILE);
        let json = serde_json::to_vec_pretty(&metadata).map_err(io::Error::other)?;
        atomic_write(&path, &json)?;
        debug!(path = %path.display(), deps = metadata.optimized.len(), "Wrote deps metadata");
        Ok(path)
    }
}

impl DepsOptimizer for DepsRegistry {
    fn register_missing_import(&self, id: &str, resolved: &str) -> OptimizedDepInfo {
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(info) = state.optimized.get(id).or_else(|| state.discovered.get(id)) {
                return info.clone();
            }
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(info) = state.discovered.get(id) {
            return info.clone();
        }

        let browser_hash = browser_hash_for(
            &self.hash,
            state
                .optimized
                .keys()
                .chain(state.discovered.keys())
                .chain(std::iter::once(&id.to_string())),
        );
        let info = OptimizedDepInfo {
            id: id.to_string(),
            file: self.deps_dir.join(format!("{}.js", flatten_id(id))),
            src: resolved.to_string(),
            browser_hash,
        };
        debug!(id, src = resolved, "New dependency discovered");
        state.discovered.insert(id.to_string(), info.clone());
        info
    }

    fn get_optimized_dep_id(&self, info: &OptimizedDepInfo) -> String {
        format!("{}?v={}", path_to_id(&info.file), info.browser_hash)
    }

    fn browser_hash(&self) -> String {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.browser_hash.clone()
    }
}

fn config_hash(root: &Path, options: &OptimizeDepsConfig) -> String {
    let mut data = Vec::new();
    // First lockfile found wins; its digest stands in for the content
    for name in LOCKFILES {
        if let Ok(digest) = blake3_file(&root.join(name)) {
            data.extend_from_slice(name.as_bytes());
            data.extend_from_slice(digest.as_bytes());
            break;
        }
    }
    if let Ok(json) = serde_json::to_vec(options) {
        data.extend_from_slice(&json);
    }
    short_hash(&data)
}

fn browser_hash_for<'a>(hash: &str, ids: impl Iterator<Item = &'a String>) -> String {
    let mut ids: Vec<&String> = ids.collect();
    ids.sort();
    ids.dedup();
    let mut data = hash.to_string();
    for id in ids {
        data.push('\n');
        data.push_str(id);
    }
    short_hash(data.as_bytes())
}
