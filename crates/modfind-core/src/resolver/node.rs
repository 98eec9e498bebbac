//! Bare package resolution with externalization and pre-bundling.

use super::cache::PackageCache;
use super::context::ResolveContext;
use super::deep::resolve_deep_import;
use super::entry::resolve_package_entry;
use super::optimizer::{has_special_query, is_optimizable, DepsOptimizer};
use super::package::{PackageData, PackageType};
use super::specifier::{
    clean_url, ext_name, inject_query, is_bare_import, is_builtin, is_in_node_modules,
    package_name, parse_deep_import, OPTIONAL_PEER_DEP_ID, SKIP_OPTIMIZATION_QUERY,
};
use crate::error::ResolveError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Final resolution result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedModule {
    /// File path (possibly with query), virtual id, or external specifier.
    pub id: String,
    /// Leave the import to the runtime instead of bundling it.
    pub external: bool,
    /// Side-effect hint for tree-shaking, set for builds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_side_effects: Option<bool>,
}

impl ResolvedModule {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external: false,
            module_side_effects: None,
        }
    }
}

/// Per-call switches of the surrounding bundler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveFlags {
    /// Resolving for server-side rendering.
    pub ssr: bool,
    /// Externalize eligible dependencies.
    pub externalize: bool,
    /// Linked (non-`node_modules`) packages may be externalized.
    pub allow_linked_external: bool,
}

impl Default for ResolveFlags {
    fn default() -> Self {
        Self {
            ssr: false,
            externalize: false,
            allow_linked_external: true,
        }
    }
}

/// Resolve a bare specifier (`pkg`, `pkg/sub`, `@scope/pkg/sub?query`).
///
/// Returns `Ok(None)` when the package or file cannot be found. A missing
/// optional peer dependency of the importing package resolves to an
/// `__optional-peer-dep:<dep>:<consumer>` placeholder.
pub fn try_node_resolve(
    id: &str,
    importer: Option<&str>,
    ctx: &ResolveContext,
    cache: &PackageCache,
    optimizer: Option<&dyn DepsOptimizer>,
    flags: ResolveFlags,
) -> Result<Option<ResolvedModule>, ResolveError> {
    let deep_pkg = parse_deep_import(id);
    let pkg_id = deep_pkg.unwrap_or_else(|| clean_url(id));

    let basedir = base_dir(pkg_id, importer, ctx, cache);

    let Some(pkg) = cache.resolve_package(pkg_id, &basedir, ctx.preserve_symlinks)? else {
        return optional_peer_placeholder(id, &basedir, ctx, cache);
    };

    let unresolved = match deep_pkg {
        Some(name) => format!(".{}", &id[name.len()..]),
        None => id.to_string(),
    };
    let resolve_with = |ctx: &ResolveContext| {
        if deep_pkg.is_some() {
            resolve_deep_import(&unresolved, &pkg, ctx.target_web, ctx, cache)
        } else {
            resolve_package_entry(&unresolved, &pkg, ctx.target_web, ctx, cache)
        }
    };

    let mut resolved = match resolve_with(ctx) {
        Ok(resolved) => resolved,
        Err(e) if ctx.try_esm_only => {
            debug!(id, error = %e, "Resolution failed, retrying as ESM");
            None
        }
        Err(e) => return Err(e),
    };
    if resolved.is_none() && ctx.try_esm_only {
        resolved = resolve_with(&ctx.esm_only())?;
    }
    let Some(mut resolved) = resolved else {
        return Ok(None);
    };

    let process = |module: ResolvedModule| process_result(module, id, deep_pkg.is_some(), &pkg, flags);

    if (!ctx.scan && ctx.is_build && optimizer.is_none()) || flags.externalize {
        let side_effects = pkg.has_side_effects(Path::new(clean_url(&resolved)));
        return Ok(Some(process(ResolvedModule {
            module_side_effects: Some(side_effects),
            ..ResolvedModule::new(resolved)
        })));
    }

    if !ctx.ssr_optimize_check && (!is_in_node_modules(&resolved) || optimizer.is_none() || ctx.scan) {
        return Ok(Some(process(ResolvedModule::new(resolved))));
    }

    // A dependency that has not been optimized yet
    let options = if ctx.ssr_optimize_check {
        &ctx.ssr_optimize_deps
    } else {
        &ctx.optimize_deps
    };
    let file = clean_url(&resolved);
    let is_js_type = is_optimizable(file, options);
    let is_cjs = match ext_name(file) {
        ".cjs" => true,
        ".js" => {
            let nearest = match Path::new(file).parent() {
                Some(dir) => cache.find_nearest(dir, ctx.preserve_symlinks)?,
                None => None,
            };
            nearest.map_or(true, |p| p.package_type != PackageType::Module)
        }
        _ => false,
    };

    let skip_optimization = !is_js_type
        || importer.is_some_and(is_in_node_modules)
        || options.is_excluded(pkg_id)
        || options.is_excluded(id)
        || has_special_query(&resolved)
        // Dev SSR cannot reload the graph for late discoveries
        || (!ctx.ssr_optimize_check && !ctx.is_build && flags.ssr)
        || (flags.ssr && !is_cjs && !(options.is_included(pkg_id) || options.is_included(id)));

    if ctx.ssr_optimize_check {
        let id = if skip_optimization {
            inject_query(&resolved, SKIP_OPTIMIZATION_QUERY)
        } else {
            resolved
        };
        return Ok(Some(ResolvedModule::new(id)));
    }

    let Some(optimizer) = optimizer else {
        return Ok(Some(ResolvedModule::new(resolved)));
    };

    if skip_optimization {
        if !ctx.is_build {
            let version = optimizer.browser_hash();
            if !version.is_empty() && is_js_type {
                resolved = inject_query(&resolved, &format!("v={version}"));
            }
        }
    } else {
        let info = optimizer.register_missing_import(id, &resolved);
        resolved = optimizer.get_optimized_dep_id(&info);
        debug!(id, optimized = %resolved, "Registered dependency for pre-bundling");
    }

    Ok(Some(ResolvedModule::new(resolved)))
}

/// Directory the package lookup starts from.
///
/// Deduped packages always come from the root; otherwise the importer's
/// directory when it exists on disk.
fn base_dir(pkg_id: &str, importer: Option<&str>, ctx: &ResolveContext, cache: &PackageCache) -> PathBuf {
    if ctx.is_deduped(pkg_id) {
        return ctx.root.clone();
    }
    if let Some(importer) = importer {
        let path = Path::new(importer);
        if path.is_absolute() && (importer.ends_with('*') || cache.fs().exists(Path::new(clean_url(importer)))) {
            if let Some(parent) = path.parent() {
                return parent.to_path_buf();
            }
        }
    }
    ctx.root.clone()
}

fn optional_peer_placeholder(
    id: &str,
    basedir: &Path,
    ctx: &ResolveContext,
    cache: &PackageCache,
) -> Result<Option<ResolvedModule>, ResolveError> {
    // The project root has no peer dependencies
    if basedir == ctx.root || is_builtin(id) || id.contains('\0') || !is_bare_import(id) {
        return Ok(None);
    }
    let Some(consumer) = cache.find_nearest_main(basedir, ctx.preserve_symlinks)? else {
        return Ok(None);
    };
    let Some(dep) = package_name(id) else {
        return Ok(None);
    };
    if !consumer.is_optional_peer(dep) {
        return Ok(None);
    }

    let consumer_name = consumer.display_name();
    debug!(dep, consumer = %consumer_name, "Missing optional peer dependency");
    Ok(Some(ResolvedModule::new(format!(
        "{OPTIONAL_PEER_DEP_ID}:{dep}:{consumer_name}"
    ))))
}

/// Mark a result external when requested and the file is plain JavaScript.
fn process_result(
    module: ResolvedModule,
    id: &str,
    is_deep: bool,
    pkg: &PackageData,
    flags: ResolveFlags,
) -> ResolvedModule {
    if !flags.externalize {
        return module;
    }
    // Linked packages stay in the bundle
    if !flags.allow_linked_external && !is_in_node_modules(&module.id) {
        return module;
    }
    let resolved_ext = ext_name(clean_url(&module.id));
    if !resolved_ext.is_empty() && !matches!(resolved_ext, ".js" | ".mjs" | ".cjs") {
        return module;
    }

    // `date-fns/locale` resolving to `.../date-fns/esm/locale/index.js` is
    // externalized by the part of the path starting at the specifier
    let mut external_id = id.to_string();
    if is_deep && !pkg.has_exports() && ext_name(id) != resolved_ext {
        if let Some(idx) = module.id.find(id) {
            external_id = module.id[idx..].to_string();
            debug!(id, external = %external_id, "Externalized deep import by resolved path");
        }
    }

    debug!(id = %external_id, "Externalized dependency");
    ResolvedModule {
        id: external_id,
        external: true,
        ..module
    }
}
