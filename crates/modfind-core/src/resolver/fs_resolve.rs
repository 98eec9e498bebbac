//! Filesystem candidate search: literal file, extensions, prefix, directory
//! entry, then `index`.

use super::cache::{PackageCache, ResolvedResult};
use super::context::ResolveContext;
use super::entry::resolve_package_entry;
use super::package::PACKAGE_JSON;
use super::specifier::{ext_name, is_in_node_modules, path_to_id, split_file_and_postfix};
use modfind_util::FileKind;
use std::path::Path;
use tracing::trace;

/// Resolve a filesystem path (with optional `?query`/`#hash`) to an existing
/// file.
///
/// The postfix never takes part in the lookup and is reattached to the
/// result. Inside `node_modules` a `#` may be part of a file name, so that
/// reading is tried first. Returns the real path unless
/// `ctx.preserve_symlinks`.
pub fn try_fs_resolve(
    fs_path: &str,
    ctx: &ResolveContext,
    cache: &PackageCache,
    try_index: bool,
    target_web: bool,
    skip_package_json: bool,
) -> ResolvedResult {
    if let Some(hash_idx) = fs_path.find('#') {
        if is_in_node_modules(fs_path) {
            let query_idx = fs_path.find('?');
            // foo#bar?baz and foo#bar; foo?bar#baz is a plain postfix
            if query_idx.map_or(true, |q| q > hash_idx) {
                let file = query_idx.map_or(fs_path, |q| &fs_path[..q]);
                if let Some(res) =
                    try_clean_fs_resolve(file, ctx, cache, try_index, target_web, skip_package_json)?
                {
                    return Ok(Some(res + &fs_path[file.len()..]));
                }
            }
        }
    }

    let (file, postfix) = split_file_and_postfix(fs_path);
    let res = try_clean_fs_resolve(file, ctx, cache, try_index, target_web, skip_package_json)?;
    Ok(res.map(|r| r + postfix))
}

fn try_clean_fs_resolve(
    file: &str,
    ctx: &ResolveContext,
    cache: &PackageCache,
    try_index: bool,
    target_web: bool,
    skip_package_json: bool,
) -> ResolvedResult {
    let fs = cache.fs();
    let path = Path::new(file);
    let kind = fs.kind(path).ok();

    if kind == Some(FileKind::File) {
        return Ok(Some(real_path(cache, path, ctx.preserve_symlinks)));
    }

    let possible_js_to_ts = ctx.is_from_ts_importer && is_possible_ts_output(file);
    if possible_js_to_ts || !ctx.extensions.is_empty() || ctx.try_prefix.is_some() {
        let parent = path.parent().filter(|p| fs.is_dir(p));
        if let Some(dir) = parent {
            if possible_js_to_ts {
                let ext = ext_name(file);
                let stem = &file[..file.len() - ext.len()];
                let ts_ext = ext.replacen("js", "ts", 1);
                if let Some(res) = try_real_file(cache, &format!("{stem}{ts_ext}"), ctx) {
                    return Ok(Some(res));
                }
                if ext == ".js" {
                    if let Some(res) = try_real_file(cache, &format!("{stem}.tsx"), ctx) {
                        return Ok(Some(res));
                    }
                }
            }

            if let Some(res) = try_with_extensions(cache, file, ctx) {
                return Ok(Some(res));
            }

            if let Some(prefix) = &ctx.try_prefix {
                if let Some(base) = path.file_name() {
                    let prefixed = path_to_id(&dir.join(format!("{prefix}{}", base.to_string_lossy())));
                    if let Some(res) = try_real_file(cache, &prefixed, ctx)
                        .or_else(|| try_with_extensions(cache, &prefixed, ctx))
                    {
                        return Ok(Some(res));
                    }
                }
            }
        }
    }

    if try_index && kind == Some(FileKind::Dir) {
        if !skip_package_json && fs.is_file(&path.join(PACKAGE_JSON)) {
            let pkg_dir = if ctx.preserve_symlinks {
                path.to_path_buf()
            } else {
                fs.canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
            };
            if let Some(pkg) = cache.load_manifest(&pkg_dir)? {
                if let Some(entry) = resolve_package_entry(file, &pkg, target_web, ctx, cache)? {
                    return Ok(Some(entry));
                }
            }
        }

        let index = format!("{}/index", file.trim_end_matches('/'));
        if let Some(res) = try_with_extensions(cache, &index, ctx) {
            return Ok(Some(res));
        }

        if let Some(prefix) = &ctx.try_prefix {
            let prefixed = format!("{}/{prefix}index", file.trim_end_matches('/'));
            if let Some(res) = try_with_extensions(cache, &prefixed, ctx) {
                return Ok(Some(res));
            }
        }
    }

    trace!(file, "No filesystem candidate");
    Ok(None)
}

fn try_with_extensions(cache: &PackageCache, file: &str, ctx: &ResolveContext) -> Option<String> {
    ctx.extensions
        .iter()
        .find_map(|ext| try_real_file(cache, &format!("{file}{ext}"), ctx))
}

fn try_real_file(cache: &PackageCache, file: &str, ctx: &ResolveContext) -> Option<String> {
    let path = Path::new(file);
    if cache.fs().is_file(path) {
        Some(real_path(cache, path, ctx.preserve_symlinks))
    } else {
        None
    }
}

fn real_path(cache: &PackageCache, path: &Path, preserve_symlinks: bool) -> String {
    if preserve_symlinks {
        return path_to_id(path);
    }
    match cache.fs().canonicalize(path) {
        Ok(real) => path_to_id(&real),
        Err(_) => path_to_id(path),
    }
}

/// `.js`-family requests from TypeScript may name a `.ts` source.
fn is_possible_ts_output(file: &str) -> bool {
    matches!(ext_name(file), ".js" | ".mjs" | ".cjs" | ".jsx")
}
