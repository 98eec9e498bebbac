//! Module resolver for bundlers.
//!
//! Resolves import specifiers to files, virtual ids or externals:
//! - relative and absolute paths with extension and `index` probing
//! - `#` subpath imports through the importer's `imports` field
//! - bare packages with `exports`, `browser` and main-field handling
//! - node builtins, stubbed for the browser
//!
//! [`Resolver`] is the entry point; the submodules expose each stage.

pub mod browser;
pub mod cache;
pub mod context;
pub mod deep;
pub mod entry;
pub mod exports;
pub mod fs_resolve;
pub mod node;
pub mod optimizer;
pub mod package;
pub mod specifier;

pub use browser::{map_with_browser_field, BrowserField, BrowserMapping, BrowserTarget};
pub use cache::{CacheStats, OnceMap, PackageCache, ResolvedKey};
pub use context::{ResolveContext, DEFAULT_EXTENSIONS, DEFAULT_MAIN_FIELDS};
pub use deep::resolve_deep_import;
pub use entry::{has_esm_syntax, resolve_package_entry};
pub use exports::{resolve_exports_or_imports, ConditionSet, ExportsField, ExportsTree};
pub use fs_resolve::try_fs_resolve;
pub use node::{try_node_resolve, ResolveFlags, ResolvedModule};
pub use optimizer::{DepsOptimizer, DepsRegistry, OptimizedDepInfo};
pub use package::{PackageData, PackageType, SideEffects};
pub use specifier::{BROWSER_EXTERNAL_ID, OPTIONAL_PEER_DEP_ID, SKIP_OPTIMIZATION_QUERY};

use crate::config::ResolveConfig;
use crate::error::ResolveError;
use optimizer::{has_version_query, is_optimizable};
use specifier::{
    clean_url, inject_query, is_absolute_path, is_bare_import, is_builtin, is_in_node_modules,
    normalize_posix, path_to_id, split_file_and_postfix,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

/// Resolver entry point.
///
/// Cheap to clone; clones share the package cache and optimizer.
#[derive(Debug, Clone)]
pub struct Resolver {
    cache: Arc<PackageCache>,
    optimizer: Option<Arc<dyn DepsOptimizer>>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(Arc::new(PackageCache::default()))
    }
}

impl Resolver {
    #[must_use]
    pub fn new(cache: Arc<PackageCache>) -> Self {
        Self {
            cache,
            optimizer: None,
        }
    }

    /// Resolver using the config's injected cache, if any.
    #[must_use]
    pub fn from_config(config: &ResolveConfig) -> Self {
        Self::new(config.package_cache())
    }

    /// Attach a pre-bundling coordinator.
    #[must_use]
    pub fn with_optimizer(mut self, optimizer: Arc<dyn DepsOptimizer>) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<PackageCache> {
        &self.cache
    }

    #[must_use]
    pub fn optimizer(&self) -> Option<&dyn DepsOptimizer> {
        self.optimizer.as_deref()
    }

    /// Resolve `specifier` imported from `importer` (an absolute file path,
    /// or `None` for entries).
    ///
    /// `Ok(None)` means not found; errors are hard failures for this
    /// specifier only and name it.
    pub fn resolve(
        &self,
        specifier: &str,
        importer: Option<&str>,
        ctx: &ResolveContext,
        flags: ResolveFlags,
    ) -> Result<Option<ResolvedModule>, ResolveError> {
        self.resolve_specifier(specifier, importer, ctx, flags)
            .map_err(|e| e.for_specifier(specifier))
    }

    fn resolve_specifier(
        &self,
        specifier: &str,
        importer: Option<&str>,
        ctx: &ResolveContext,
        flags: ResolveFlags,
    ) -> Result<Option<ResolvedModule>, ResolveError> {
        trace!(specifier, importer, "Resolving");

        let mapped;
        let mut id = specifier;
        if let Some(imported) = self.resolve_subpath_imports(id, importer, ctx)? {
            trace!(specifier, mapped = %imported, "Mapped through imports field");
            mapped = imported;
            id = &mapped;
        }

        if id.starts_with('\0') || id.starts_with("data:") {
            return Ok(None);
        }

        if is_external_url(id) {
            return Ok(Some(ResolvedModule {
                external: true,
                ..ResolvedModule::new(id)
            }));
        }

        let result = if is_relative(id) {
            let basedir = importer
                .and_then(|i| Path::new(i).parent())
                .map_or_else(|| path_to_id(&ctx.root), path_to_id);
            let fs_path = join_id(&basedir, id);
            self.resolve_file(&fs_path, id, importer, ctx, flags)?
        } else if is_absolute_path(id) {
            self.resolve_file(id, id, importer, ctx, flags)?
        } else if is_bare_import(id) {
            self.resolve_bare(id, importer, ctx, flags)?
        } else {
            None
        };

        match &result {
            Some(module) => debug!(specifier, id = %module.id, external = module.external, "Resolved"),
            None => debug!(specifier, "Unresolved"),
        }
        Ok(result)
    }

    fn resolve_file(
        &self,
        fs_path: &str,
        id: &str,
        importer: Option<&str>,
        ctx: &ResolveContext,
        flags: ResolveFlags,
    ) -> Result<Option<ResolvedModule>, ResolveError> {
        if ctx.target_web && ctx.browser_field {
            if let Some(module) = self.try_browser_mapping(fs_path, importer, ctx, true, flags)? {
                return Ok(Some(module));
            }
        }

        let Some(resolved) = try_fs_resolve(fs_path, ctx, &self.cache, true, ctx.target_web, false)? else {
            return Ok(None);
        };
        let resolved = self.ensure_version_query(resolved, id, ctx);
        let module_side_effects = if ctx.is_build && !ctx.scan {
            self.side_effects_of(&resolved, ctx)?
        } else {
            None
        };
        Ok(Some(ResolvedModule {
            module_side_effects,
            ..ResolvedModule::new(resolved)
        }))
    }

    fn resolve_bare(
        &self,
        id: &str,
        importer: Option<&str>,
        ctx: &ResolveContext,
        flags: ResolveFlags,
    ) -> Result<Option<ResolvedModule>, ResolveError> {
        if ctx.target_web && ctx.browser_field {
            if let Some(module) = self.try_browser_mapping(id, importer, ctx, false, flags)? {
                return Ok(Some(module));
            }
        }

        if let Some(module) = try_node_resolve(id, importer, ctx, &self.cache, self.optimizer(), flags)? {
            return Ok(Some(module));
        }

        if is_builtin(id) {
            if flags.ssr || !ctx.target_web {
                return Ok(Some(ResolvedModule {
                    external: true,
                    module_side_effects: Some(false),
                    ..ResolvedModule::new(id)
                }));
            }
            debug!(id, "Node builtin stubbed for the browser");
            let stub = if ctx.is_production {
                BROWSER_EXTERNAL_ID.to_string()
            } else {
                format!("{BROWSER_EXTERNAL_ID}:{id}")
            };
            return Ok(Some(ResolvedModule::new(stub)));
        }

        Ok(None)
    }

    /// Map `#name` through the `imports` field of the importer's package.
    ///
    /// Local targets become absolute paths; package targets stay bare.
    fn resolve_subpath_imports(
        &self,
        id: &str,
        importer: Option<&str>,
        ctx: &ResolveContext,
    ) -> Result<Option<String>, ResolveError> {
        let Some(importer) = importer.filter(|_| id.starts_with('#')) else {
            return Ok(None);
        };
        let Some(basedir) = Path::new(importer).parent() else {
            return Ok(None);
        };
        let Some(pkg) = self.cache.find_nearest(basedir, ctx.preserve_symlinks)? else {
            return Ok(None);
        };

        let (file, postfix) = split_file_and_postfix(id);
        let conditions = ConditionSet::new(ctx, ctx.target_web);
        let Some(target) = resolve_exports_or_imports(&pkg, file, &conditions, ExportsField::Imports)? else {
            return Ok(None);
        };

        let mapped = if target.starts_with('.') {
            join_id(&path_to_id(&pkg.dir), &target)
        } else {
            target
        };
        Ok(Some(format!("{mapped}{postfix}")))
    }

    /// Apply the `browser` table of the importer's package.
    fn try_browser_mapping(
        &self,
        id: &str,
        importer: Option<&str>,
        ctx: &ResolveContext,
        is_file_path: bool,
        flags: ResolveFlags,
    ) -> Result<Option<ResolvedModule>, ResolveError> {
        let Some(basedir) = importer.and_then(|i| Path::new(i).parent()) else {
            return Ok(None);
        };
        let Some(pkg) = self.cache.find_nearest(basedir, ctx.preserve_symlinks)? else {
            return Ok(None);
        };
        if !pkg.browser.is_map() {
            return Ok(None);
        }

        let pkg_dir = path_to_id(&pkg.dir);
        let map_id = if is_file_path {
            match id.strip_prefix(&pkg_dir).and_then(|rest| rest.strip_prefix('/')) {
                Some(rest) => format!("./{rest}"),
                None => return Ok(None),
            }
        } else {
            id.to_string()
        };

        let mapped = match map_with_browser_field(&map_id, &pkg.browser) {
            BrowserMapping::NotMapped => return Ok(None),
            BrowserMapping::Stubbed => {
                debug!(id, package = %pkg.display_name(), "Browser field disables module");
                return Ok(Some(ResolvedModule::new(BROWSER_EXTERNAL_ID)));
            }
            BrowserMapping::Mapped(mapped) => mapped,
        };

        let resolved = if is_bare_import(&mapped) {
            try_node_resolve(&mapped, importer, ctx, &self.cache, self.optimizer(), flags)?.map(|m| m.id)
        } else {
            try_fs_resolve(&join_id(&pkg_dir, &mapped), ctx, &self.cache, true, true, false)?
        };
        let Some(resolved) = resolved else {
            return Ok(None);
        };
        debug!(id, mapped = %resolved, "Browser mapped");

        let module_side_effects = if ctx.is_build && !ctx.scan {
            self.side_effects_of(&resolved, ctx)?
        } else {
            None
        };
        Ok(Some(ResolvedModule {
            id: resolved,
            external: flags.externalize,
            module_side_effects,
        }))
    }

    /// Give direct `node_modules` file imports the same `?v=` query a bare
    /// import of the package would get.
    fn ensure_version_query(&self, resolved: String, id: &str, ctx: &ResolveContext) -> String {
        if ctx.is_build || ctx.scan {
            return resolved;
        }
        let Some(optimizer) = self.optimizer() else {
            return resolved;
        };
        if !(is_in_node_modules(id) || is_in_node_modules(&resolved)) || has_version_query(&resolved) {
            return resolved;
        }
        let version = optimizer.browser_hash();
        if !version.is_empty() && is_optimizable(clean_url(&resolved), &ctx.optimize_deps) {
            return inject_query(&resolved, &format!("v={version}"));
        }
        resolved
    }

    fn side_effects_of(&self, resolved: &str, ctx: &ResolveContext) -> Result<Option<bool>, ResolveError> {
        let file = Path::new(clean_url(resolved));
        let Some(dir) = file.parent() else {
            return Ok(None);
        };
        Ok(self
            .cache
            .find_nearest(dir, ctx.preserve_symlinks)?
            .map(|pkg| pkg.has_side_effects(file)))
    }
}

fn is_relative(id: &str) -> bool {
    id == "." || id == ".." || id.starts_with("./") || id.starts_with("../")
}

fn is_external_url(id: &str) -> bool {
    id.starts_with("http://") || id.starts_with("https://") || id.starts_with("//")
}

/// Join a relative id onto an absolute base and normalize it.
fn join_id(base: &str, relative: &str) -> String {
    let joined = normalize_posix(&format!("{base}/{relative}"));
    if base.starts_with('/') {
        format!("/{joined}")
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_id() {
        assert_eq!(join_id("/proj/src", "./a.js"), "/proj/src/a.js");
        assert_eq!(join_id("/proj/src", "../lib/b?x"), "/proj/lib/b?x");
        assert_eq!(join_id("C:/proj", "./a.js"), "C:/proj/a.js");
    }

    #[test]
    fn test_is_relative() {
        assert!(is_relative("./a"));
        assert!(is_relative("../a"));
        assert!(is_relative("."));
        assert!(!is_relative(".hidden"));
        assert!(!is_relative("pkg"));
    }

    #[test]
    fn test_external_url() {
        assert!(is_external_url("https://cdn.example.com/x.js"));
        assert!(is_external_url("//cdn.example.com/x.js"));
        assert!(!is_external_url("/abs/x.js"));
    }
}
