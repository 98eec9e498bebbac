//! Specifier classification and id string helpers.
//!
//! Resolved ids are plain strings rather than paths: they may carry a
//! `?query`/`#hash` postfix or be one of the reserved virtual ids below.

use std::path::Path;

/// Id of the empty module that replaces browser-disabled files and node
/// builtins when targeting the browser.
pub const BROWSER_EXTERNAL_ID: &str = "__browser-external";

/// Prefix of the placeholder id for a missing optional peer dependency:
/// `__optional-peer-dep:<dependency>:<consumer>`.
pub const OPTIONAL_PEER_DEP_ID: &str = "__optional-peer-dep";

/// Query token marking a dependency the pre-bundler must leave alone.
pub const SKIP_OPTIMIZATION_QUERY: &str = "__skip_optimization";

/// Node.js builtin module names (without the `node:` prefix).
const NODE_BUILTINS: &[&str] = &[
    "assert",
    "assert/strict",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "dns/promises",
    "domain",
    "events",
    "fs",
    "fs/promises",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "path/posix",
    "path/win32",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "readline/promises",
    "repl",
    "stream",
    "stream/consumers",
    "stream/promises",
    "stream/web",
    "string_decoder",
    "sys",
    "timers",
    "timers/promises",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "util/types",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// Check if a specifier names a node builtin (`fs`, `node:fs`, `fs/promises`).
#[must_use]
pub fn is_builtin(id: &str) -> bool {
    if id.starts_with("node:") {
        return true;
    }
    NODE_BUILTINS.contains(&id)
}

/// Check if a specifier looks like a bare package import.
///
/// Starts with a word character or `@`, is not a Windows drive path, and does
/// not contain a URL scheme.
#[must_use]
pub fn is_bare_import(id: &str) -> bool {
    let bytes = id.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return false;
    }
    let Some(&first) = bytes.first() else {
        return false;
    };
    let word_start = first.is_ascii_alphanumeric() || first == b'_' || first == b'@';
    word_start && !id.contains("://")
}

/// Check if a specifier is an absolute filesystem path.
#[must_use]
pub fn is_absolute_path(spec: &str) -> bool {
    if spec.starts_with('/') {
        return true;
    }

    // Windows absolute: C:\, D:/
    let bytes = spec.as_bytes();
    if bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
    {
        return true;
    }

    // UNC path: \\server\share
    spec.starts_with("\\\\")
}

/// Package name of a deep import, or `None` when `id` has no subpath.
///
/// `lodash/fp` yields `lodash`, `@scope/pkg/sub` yields `@scope/pkg`,
/// `lodash` and `@scope/pkg` yield `None`.
#[must_use]
pub fn parse_deep_import(id: &str) -> Option<&str> {
    if id.starts_with('@') {
        let mut slashes = id.match_indices('/').map(|(i, _)| i);
        let first = slashes.next()?;
        let second = slashes.next()?;
        // "@/x" and "@scope//x" are not scoped names
        if first == 1 || second == first + 1 {
            return None;
        }
        return Some(&id[..second]);
    }

    let pos = id.find('/')?;
    if pos == 0 {
        return None;
    }
    Some(&id[..pos])
}

/// npm package name of a bare specifier.
///
/// Scoped names require both segments; `@scope` alone yields `None`.
#[must_use]
pub fn package_name(id: &str) -> Option<&str> {
    let mut parts = id.splitn(3, '/');
    let first = parts.next()?;
    if first.starts_with('@') {
        let second = parts.next().filter(|s| !s.is_empty())?;
        Some(&id[..first.len() + 1 + second.len()])
    } else if first.is_empty() {
        None
    } else {
        Some(first)
    }
}

/// Strip a trailing `?query` and/or `#hash`.
#[must_use]
pub fn clean_url(url: &str) -> &str {
    match url.find(['?', '#']) {
        Some(idx) => &url[..idx],
        None => url,
    }
}

/// Split an id into its file portion and the `?query`/`#hash` postfix.
#[must_use]
pub fn split_file_and_postfix(path: &str) -> (&str, &str) {
    let file = clean_url(path);
    (file, &path[file.len()..])
}

/// Insert `query` as the first query parameter of `url`.
///
/// Existing parameters follow it and a `#hash` stays last:
/// `a.js?inline#x` + `v=1` becomes `a.js?v=1&inline#x`.
#[must_use]
pub fn inject_query(url: &str, query: &str) -> String {
    let path = clean_url(url);
    let rest = &url[path.len()..];
    let (search, hash) = match rest.find('#') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };

    let mut out = format!("{path}?{query}");
    if search.len() > 1 {
        out.push('&');
        out.push_str(&search[1..]);
    }
    out.push_str(hash);
    out
}

/// Check if an id points into an installed dependency.
#[must_use]
pub fn is_in_node_modules(id: &str) -> bool {
    id.contains("node_modules")
}

/// Extension of the last path segment including the dot, or `""`.
///
/// Leading dots do not count (`.eslintrc` has no extension).
#[must_use]
pub fn ext_name(id: &str) -> &str {
    let base = id.rsplit(['/', '\\']).next().unwrap_or(id);
    match base.rfind('.') {
        Some(0) | None => "",
        Some(idx) => &base[idx..],
    }
}

/// Normalize a `/`-separated relative path: drop `.` segments, fold `..`
/// and duplicate slashes.
#[must_use]
pub fn normalize_posix(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(out.last(), Some(&s) if s != "..") {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            s => out.push(s),
        }
    }
    if out.is_empty() {
        ".".to_string()
    } else {
        out.join("/")
    }
}

/// Render a filesystem path as an id with forward slashes.
#[must_use]
pub fn path_to_id(path: &Path) -> String {
    let s = path.to_string_lossy();
    if cfg!(windows) {
        s.replace('\\', "/")
    } else {
        s.into_owned()
    }
}
