use crate::error::ConfigError;
use crate::resolver::cache::PackageCache;
use crate::resolver::context::{ResolveContext, DEFAULT_EXTENSIONS, DEFAULT_MAIN_FIELDS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Settings file looked up in the project root.
pub const CONFIG_FILE_NAME: &str = "modfind.json";

/// Runtime configuration for the modfind CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Current working directory.
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = WARN, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }
}

/// Dependency pre-bundling lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptimizeDepsConfig {
    /// Ids always pre-bundled, even when otherwise ineligible.
    pub include: Vec<String>,
    /// Ids never pre-bundled.
    pub exclude: Vec<String>,
    /// Extra file extensions the pre-bundler understands (e.g. `.vue`).
    pub extensions: Vec<String>,
}

impl OptimizeDepsConfig {
    #[must_use]
    pub fn is_included(&self, id: &str) -> bool {
        self.include.iter().any(|i| i == id)
    }

    #[must_use]
    pub fn is_excluded(&self, id: &str) -> bool {
        self.exclude.iter().any(|e| e == id)
    }
}

/// Parsed resolver settings.
///
/// Deserialized from `modfind.json` (camelCase keys); every field is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolveConfig {
    pub extensions: Vec<String>,
    pub main_fields: Vec<String>,
    pub conditions: Vec<String>,
    pub dedupe: Vec<String>,
    pub preserve_symlinks: bool,
    pub browser_field: bool,
    pub try_esm_only: bool,
    pub optimize_deps: OptimizeDepsConfig,
    pub ssr_optimize_deps: OptimizeDepsConfig,

    /// Pre-seeded cache injected by the host.
    #[serde(skip)]
    pub package_cache: Option<Arc<PackageCache>>,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect(),
            main_fields: DEFAULT_MAIN_FIELDS.iter().map(ToString::to_string).collect(),
            conditions: Vec::new(),
            dedupe: Vec::new(),
            preserve_symlinks: false,
            browser_field: true,
            try_esm_only: false,
            optimize_deps: OptimizeDepsConfig::default(),
            ssr_optimize_deps: OptimizeDepsConfig::default(),
            package_cache: None,
        }
    }
}

impl ResolveConfig {
    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `modfind.json` from `root` if present.
    pub fn discover(root: &Path) -> Result<Option<(PathBuf, Self)>, ConfigError> {
        let path = root.join(CONFIG_FILE_NAME);
        if !path.is_file() {
            return Ok(None);
        }
        let config = Self::load(&path)?;
        Ok(Some((path, config)))
    }

    /// Build the per-call context for a build (`is_build`) or dev session.
    ///
    /// Builds select the `production` condition.
    #[must_use]
    pub fn context(&self, root: impl Into<PathBuf>, is_build: bool) -> ResolveContext {
        let mut ctx = ResolveContext::new(root);
        ctx.is_build = is_build;
        ctx.is_production = is_build;
        ctx.extensions.clone_from(&self.extensions);
        ctx.main_fields.clone_from(&self.main_fields);
        ctx.conditions.clone_from(&self.conditions);
        ctx.dedupe.clone_from(&self.dedupe);
        ctx.preserve_symlinks = self.preserve_symlinks;
        ctx.browser_field = self.browser_field;
        ctx.try_esm_only = self.try_esm_only;
        ctx.optimize_deps = self.optimize_deps.clone();
        ctx.ssr_optimize_deps = self.ssr_optimize_deps.clone();
        ctx
    }

    /// The injected package cache, or a fresh OS-backed one.
    #[must_use]
    pub fn package_cache(&self) -> Arc<PackageCache> {
        self.package_cache
            .clone()
            .unwrap_or_else(|| Arc::new(PackageCache::default()))
    }
}
