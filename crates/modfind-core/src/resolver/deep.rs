//! Deep imports (`pkg/sub/path`).

use super::browser::{map_with_browser_field, BrowserMapping};
use super::cache::{PackageCache, ResolvedKey, ResolvedResult};
use super::context::ResolveContext;
use super::exports::{resolve_exports_or_imports, ConditionSet, ExportsField};
use super::fs_resolve::try_fs_resolve;
use super::package::PackageData;
use super::specifier::{normalize_posix, path_to_id, split_file_and_postfix, BROWSER_EXTERNAL_ID};
use tracing::trace;

/// Resolve `subpath` (`"./sub/path"`, optionally with `?query`/`#hash`)
/// inside `pkg`.
///
/// Packages with `exports` resolve only through it, without `index`
/// fallback. Otherwise web targets consult the `browser` table first; a
/// disabled file yields [`BROWSER_EXTERNAL_ID`]. Results, misses included,
/// are cached per package.
pub fn resolve_deep_import(
    subpath: &str,
    pkg: &PackageData,
    target_web: bool,
    ctx: &ResolveContext,
    cache: &PackageCache,
) -> ResolvedResult {
    let key = ResolvedKey {
        dir: pkg.dir.clone(),
        subpath: subpath.to_string(),
        target_web,
        settings: ctx.settings_digest(),
    };
    cache.resolve_cached(&key, || resolve_deep_uncached(subpath, pkg, target_web, ctx, cache))
}

fn resolve_deep_uncached(
    subpath: &str,
    pkg: &PackageData,
    target_web: bool,
    ctx: &ResolveContext,
    cache: &PackageCache,
) -> ResolvedResult {
    let (file, postfix) = split_file_and_postfix(subpath);

    let relative = if pkg.has_exports() {
        let conditions = ConditionSet::new(ctx, target_web);
        match resolve_exports_or_imports(pkg, file, &conditions, ExportsField::Exports)? {
            Some(target) => format!("{target}{postfix}"),
            None => return Ok(None),
        }
    } else if target_web && ctx.browser_field && pkg.browser.is_map() {
        match map_with_browser_field(file, &pkg.browser) {
            BrowserMapping::Mapped(mapped) => format!("{mapped}{postfix}"),
            BrowserMapping::Stubbed => {
                trace!(package = %pkg.display_name(), subpath, "Browser field disables deep import");
                return Ok(Some(BROWSER_EXTERNAL_ID.to_string()));
            }
            BrowserMapping::NotMapped => subpath.to_string(),
        }
    } else {
        subpath.to_string()
    };

    let (rel_file, rel_postfix) = split_file_and_postfix(&relative);
    let full = format!("{}/{}{rel_postfix}", path_to_id(&pkg.dir), normalize_posix(rel_file));
    try_fs_resolve(&full, ctx, cache, !pkg.has_exports(), target_web, false)
}
