//! Package entry point selection (`import "pkg"`).

use super::browser::{map_with_browser_field, BrowserMapping};
use super::cache::{PackageCache, ResolvedKey, ResolvedResult};
use super::context::ResolveContext;
use super::exports::{resolve_exports_or_imports, ConditionSet, ExportsField};
use super::fs_resolve::try_fs_resolve;
use super::package::PackageData;
use super::specifier::{clean_url, ext_name, normalize_posix, path_to_id, split_file_and_postfix};
use crate::error::ResolveError;
use regex_lite::Regex;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Entries tried when a package declares none.
const DEFAULT_ENTRIES: &[&str] = &["index.js", "index.json", "index.node"];

/// Resolve the entry file of `pkg`.
///
/// `id` is the requested specifier; its `?query`/`#hash` is reattached to
/// the result. Order: `exports["."]`, the `browser` entry for web targets,
/// `main_fields`, `main`, then [`DEFAULT_ENTRIES`]. A package whose `exports`
/// lacks `"."` fails hard; any other miss is `Ok(None)`.
pub fn resolve_package_entry(
    id: &str,
    pkg: &PackageData,
    target_web: bool,
    ctx: &ResolveContext,
    cache: &PackageCache,
) -> ResolvedResult {
    let (_, postfix) = split_file_and_postfix(id);
    let key = ResolvedKey {
        dir: pkg.dir.clone(),
        subpath: ".".to_string(),
        target_web,
        settings: ctx.settings_digest(),
    };

    let entry = cache.resolve_cached(&key, || resolve_entry_uncached(pkg, target_web, ctx, cache))?;
    if entry.is_none() {
        debug!(package = %pkg.display_name(), "Failed to resolve package entry");
    }
    Ok(entry.map(|e| e + postfix))
}

fn resolve_entry_uncached(
    pkg: &PackageData,
    target_web: bool,
    ctx: &ResolveContext,
    cache: &PackageCache,
) -> ResolvedResult {
    let mut entry_point: Option<String> = None;

    if pkg.has_exports() {
        let conditions = ConditionSet::new(ctx, target_web);
        entry_point = resolve_exports_or_imports(pkg, ".", &conditions, ExportsField::Exports)?;
    }
    let resolved_from_exports = entry_point.is_some();

    // Packages with exports never consult the browser field
    let use_browser_field = target_web && ctx.browser_field && !pkg.has_exports();

    if use_browser_field {
        if let Some(browser_entry) = pkg.browser.entry() {
            entry_point = browser_or_module_entry(pkg, browser_entry, ctx, cache)?.or(entry_point);
        }
    }

    if !resolved_from_exports && entry_point.is_none() {
        entry_point = ctx
            .main_fields
            .iter()
            .filter(|f| f.as_str() != "browser")
            .find_map(|f| pkg.field(f))
            .map(ToString::to_string);
    }

    if entry_point.is_none() {
        entry_point = pkg.field("main").map(ToString::to_string);
    }

    let candidates: Vec<String> = match entry_point {
        Some(e) => vec![e],
        None => DEFAULT_ENTRIES.iter().map(ToString::to_string).collect(),
    };

    let dir_id = path_to_id(&pkg.dir);
    for candidate in candidates {
        let mut entry = candidate;
        let mut skip_package_json = false;

        // Looking for stylesheets: never fall back to scripts
        if ctx.main_fields.first().is_some_and(|f| f == "sass")
            && !ctx.extensions.iter().any(|e| e == ext_name(&entry))
        {
            entry = String::new();
            skip_package_json = true;
        } else if use_browser_field {
            if let BrowserMapping::Mapped(mapped) = map_with_browser_field(&entry, &pkg.browser) {
                entry = mapped;
            }
        }

        let relative = normalize_posix(&entry);
        let entry_path = if relative == "." {
            // The package directory itself: its manifest is the one being resolved
            skip_package_json = true;
            dir_id.clone()
        } else {
            format!("{dir_id}/{relative}")
        };

        if let Some(resolved) = try_fs_resolve(&entry_path, ctx, cache, true, true, skip_package_json)? {
            debug!(package = %pkg.display_name(), entry = %resolved, "Resolved package entry");
            return Ok(Some(resolved));
        }
    }

    Ok(None)
}

/// Pick between a `browser` entry and `module` when both exist.
///
/// Some packages point `module` at node ESM and `browser` at ESM, others
/// point `browser` at a UMD/IIFE bundle. Read the browser entry: ESM syntax
/// keeps it, anything else prefers `module`.
fn browser_or_module_entry(
    pkg: &PackageData,
    browser_entry: &str,
    ctx: &ResolveContext,
    cache: &PackageCache,
) -> Result<Option<String>, ResolveError> {
    let module = pkg.field("module");
    let prefers_module = !ctx.is_require
        && ctx.main_fields.iter().any(|f| f == "module")
        && module.is_some_and(|m| m != browser_entry);

    let Some(module) = module.filter(|_| prefers_module) else {
        return Ok(Some(browser_entry.to_string()));
    };

    let relative = normalize_posix(browser_entry);
    // `"browser": "./"` names the package directory: skip its own manifest
    let (browser_path, skip_package_json) = if relative == "." {
        (path_to_id(&pkg.dir), true)
    } else {
        (format!("{}/{relative}", path_to_id(&pkg.dir)), false)
    };
    let Some(resolved) = try_fs_resolve(&browser_path, ctx, cache, true, true, skip_package_json)? else {
        return Ok(None);
    };

    let path = Path::new(clean_url(&resolved));
    let content = cache.fs().read_to_string(path).map_err(|e| ResolveError::FileRead {
        path: path.to_path_buf(),
        source: Arc::new(e),
    })?;
    if has_esm_syntax(&content) {
        Ok(Some(browser_entry.to_string()))
    } else {
        Ok(Some(module.to_string()))
    }
}

fn esm_syntax_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?m)(?:[\s;]|^)(?:import[\s\w*,{}]*from|import\s*['"*{]|export\b\s*(?:[*{]|default|class|type|function|const|var|let|async function)|import\.meta\b)"#,
        )
        .ok()
    })
    .as_ref()
}

/// Heuristic check for ES module syntax.
#[must_use]
pub fn has_esm_syntax(code: &str) -> bool {
    esm_syntax_re().is_some_and(|re| re.is_match(code))
}
