//! Per-call resolution context.

use crate::config::OptimizeDepsConfig;
use modfind_util::hash::blake3_bytes;
use std::path::PathBuf;

/// Default extensions for probing, in order.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".mjs", ".js", ".mts", ".ts", ".jsx", ".tsx", ".json"];

/// Default manifest fields consulted for a package entry, in order.
pub const DEFAULT_MAIN_FIELDS: &[&str] = &["browser", "module", "jsnext:main", "jsnext"];

/// Everything a single resolution needs to know about the build.
///
/// Built from already-parsed settings (see [`crate::config::ResolveConfig`])
/// and passed by reference through every resolver call.
#[derive(Debug, Clone)]
pub struct ResolveContext {
    /// Project root; fallback base directory for package lookup.
    pub root: PathBuf,
    /// Package ids always resolved from `root`.
    pub dedupe: Vec<String>,
    /// One-shot build (`true`) or dev server (`false`).
    pub is_build: bool,
    /// Selects the `production` or `development` condition.
    pub is_production: bool,
    /// Request comes from `require()` rather than `import`.
    pub is_require: bool,
    /// Keep symlinked paths instead of resolving to real paths.
    pub preserve_symlinks: bool,
    /// Resolving for the browser rather than node.
    pub target_web: bool,
    /// Honor the legacy `browser` manifest field.
    pub browser_field: bool,
    /// Dependency scan phase: pre-bundling never applies.
    pub scan: bool,
    /// SSR pass that only marks which deps the pre-bundler must skip.
    pub ssr_optimize_check: bool,
    /// Retry a failed package resolution once with ESM-only settings.
    pub try_esm_only: bool,
    /// Importer is TypeScript: `.js` requests may point at `.ts` sources.
    pub is_from_ts_importer: bool,
    /// Filename prefix tried after extensions (e.g. `_` for Sass partials).
    pub try_prefix: Option<String>,
    /// Extra export conditions.
    pub conditions: Vec<String>,
    /// Manifest fields consulted for a package entry, in order.
    pub main_fields: Vec<String>,
    /// Extensions to probe, in order.
    pub extensions: Vec<String>,
    /// Pre-bundling include/exclude lists for client resolution.
    pub optimize_deps: OptimizeDepsConfig,
    /// Pre-bundling include/exclude lists for the SSR optimize check.
    pub ssr_optimize_deps: OptimizeDepsConfig,
    /// Set on the ESM-only retry so it gets its own resolution cache entries.
    pub(crate) esm_retry: bool,
}

impl ResolveContext {
    /// Context with default settings rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dedupe: Vec::new(),
            is_build: false,
            is_production: false,
            is_require: false,
            preserve_symlinks: false,
            target_web: true,
            browser_field: true,
            scan: false,
            ssr_optimize_check: false,
            try_esm_only: false,
            is_from_ts_importer: false,
            try_prefix: None,
            conditions: Vec::new(),
            main_fields: DEFAULT_MAIN_FIELDS.iter().map(ToString::to_string).collect(),
            extensions: DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect(),
            optimize_deps: OptimizeDepsConfig::default(),
            ssr_optimize_deps: OptimizeDepsConfig::default(),
            esm_retry: false,
        }
    }

    /// Settings for the ESM-only retry: `import` semantics with default main
    /// fields and extensions.
    #[must_use]
    pub fn esm_only(&self) -> Self {
        Self {
            is_require: false,
            main_fields: DEFAULT_MAIN_FIELDS.iter().map(ToString::to_string).collect(),
            extensions: DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect(),
            esm_retry: true,
            ..self.clone()
        }
    }

    /// Digest of every setting that changes how a package subpath or entry
    /// resolves, apart from the target platform.
    ///
    /// Contexts with equal digests may share cached resolutions.
    #[must_use]
    pub fn settings_digest(&self) -> String {
        let mut buf = String::new();
        for flag in [
            self.is_production,
            self.is_require,
            self.preserve_symlinks,
            self.browser_field,
            self.is_from_ts_importer,
            self.esm_retry,
        ] {
            buf.push(if flag { '1' } else { '0' });
        }
        for (tag, list) in [
            ("c", &self.conditions),
            ("m", &self.main_fields),
            ("e", &self.extensions),
        ] {
            buf.push('\0');
            buf.push_str(tag);
            for item in list {
                buf.push('\x1f');
                buf.push_str(item);
            }
        }
        buf.push('\0');
        if let Some(prefix) = &self.try_prefix {
            buf.push('p');
            buf.push_str(prefix);
        }
        blake3_bytes(buf.as_bytes())
    }

    /// Check if `pkg_id` is forced to resolve from the project root.
    #[must_use]
    pub fn is_deduped(&self, pkg_id: &str) -> bool {
        self.dedupe.iter().any(|d| d == pkg_id)
    }
}
