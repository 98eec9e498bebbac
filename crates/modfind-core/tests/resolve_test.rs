//! End-to-end resolution through [`Resolver`] against real `node_modules` trees.

use modfind_core::resolver::optimizer::OptimizedDepInfo;
use modfind_core::resolver::specifier::path_to_id;
use modfind_core::{
    DepsOptimizer, PackageCache, ResolveConfig, ResolveContext, ResolveError, ResolveFlags,
    ResolvedModule, Resolver,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::tempdir;

struct Project {
    _dir: tempfile::TempDir,
    root: String,
}

impl Project {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let root = path_to_id(&dir.path().canonicalize().unwrap());
        let project = Self { _dir: dir, root };
        project.write("package.json", r#"{"name":"app"}"#);
        project.write("src/main.js", "");
        project
    }

    fn write(&self, rel: &str, content: &str) {
        let path = Path::new(&self.root).join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn path(&self, rel: &str) -> String {
        format!("{}/{rel}", self.root)
    }

    fn ctx(&self) -> ResolveContext {
        ResolveContext::new(&self.root)
    }
}

fn resolve(
    resolver: &Resolver,
    id: &str,
    importer: Option<&str>,
    ctx: &ResolveContext,
) -> Option<ResolvedModule> {
    resolver
        .resolve(id, importer, ctx, ResolveFlags::default())
        .unwrap()
}

fn resolve_id(resolver: &Resolver, id: &str, importer: Option<&str>, ctx: &ResolveContext) -> Option<String> {
    resolve(resolver, id, importer, ctx).map(|m| m.id)
}

#[derive(Debug)]
struct FixedOptimizer;

impl DepsOptimizer for FixedOptimizer {
    fn register_missing_import(&self, id: &str, resolved: &str) -> OptimizedDepInfo {
        OptimizedDepInfo {
            id: id.to_string(),
            file: PathBuf::from(format!("/deps/{id}.js")),
            src: resolved.to_string(),
            browser_hash: "h1".to_string(),
        }
    }

    fn get_optimized_dep_id(&self, info: &OptimizedDepInfo) -> String {
        format!("{}?v={}", info.file.display(), info.browser_hash)
    }

    fn browser_hash(&self) -> String {
        "h1".to_string()
    }
}

#[test]
fn test_exports_pattern_subpath() {
    let p = Project::new();
    p.write(
        "node_modules/pkg/package.json",
        r#"{"name":"pkg","exports":{"./*":"./*.js"}}"#,
    );
    p.write("node_modules/pkg/debounce.js", "");

    let resolver = Resolver::default();
    assert_eq!(
        resolve_id(&resolver, "pkg/debounce", None, &p.ctx()),
        Some(p.path("node_modules/pkg/debounce.js"))
    );
}

#[test]
fn test_main_field_without_exports() {
    let p = Project::new();
    p.write(
        "node_modules/pkg/package.json",
        r#"{"name":"pkg","main":"dist/lib.esm.js"}"#,
    );
    p.write("node_modules/pkg/dist/lib.esm.js", "");

    let resolver = Resolver::default();
    assert_eq!(
        resolve_id(&resolver, "pkg", None, &p.ctx()),
        Some(p.path("node_modules/pkg/dist/lib.esm.js"))
    );
}

#[test]
fn test_undeclared_subpath_is_hard_error() {
    let p = Project::new();
    p.write(
        "node_modules/pkg/package.json",
        r#"{"name":"pkg","exports":{"./a":"./a.js"}}"#,
    );
    p.write("node_modules/pkg/a.js", "");
    p.write("node_modules/pkg/b.js", "");

    let resolver = Resolver::default();
    let ctx = p.ctx();
    assert!(resolve_id(&resolver, "pkg/a", None, &ctx).is_some());

    let err = resolver
        .resolve("pkg/b", None, &ctx, ResolveFlags::default())
        .unwrap_err();
    match &err {
        ResolveError::SubpathNotDefined { subpath, manifest, .. } => {
            assert_eq!(subpath, "./b");
            assert_eq!(manifest, &PathBuf::from(p.path("node_modules/pkg/package.json")));
        }
        other => panic!("unexpected error: {other}"),
    }
    let message = err.to_string();
    assert!(message.contains("./b"));
    assert!(message.contains("package.json"));
}

#[test]
fn test_exports_shadow_browser_field() {
    let p = Project::new();
    p.write(
        "node_modules/pkg/package.json",
        r#"{
            "name": "pkg",
            "exports": {".": "./index.js", "./lib/node.js": "./lib/node.js"},
            "browser": {"./index.js": "./web.js", "./lib/node.js": false}
        }"#,
    );
    p.write("node_modules/pkg/index.js", "");
    p.write("node_modules/pkg/web.js", "");
    p.write("node_modules/pkg/lib/node.js", "");

    let resolver = Resolver::default();
    let ctx = p.ctx();
    assert_eq!(
        resolve_id(&resolver, "pkg", None, &ctx),
        Some(p.path("node_modules/pkg/index.js"))
    );
    assert_eq!(
        resolve_id(&resolver, "pkg/lib/node.js", None, &ctx),
        Some(p.path("node_modules/pkg/lib/node.js"))
    );
}

#[test]
fn test_browser_field_without_exports() {
    let p = Project::new();
    p.write(
        "node_modules/pkg/package.json",
        r#"{"name":"pkg","main":"./index.js","browser":{"./index.js":"./web.js","./lib/fs.js":false}}"#,
    );
    p.write("node_modules/pkg/index.js", "");
    p.write("node_modules/pkg/web.js", "");
    p.write("node_modules/pkg/lib/fs.js", "");

    let resolver = Resolver::default();
    let ctx = p.ctx();
    assert_eq!(
        resolve_id(&resolver, "pkg", None, &ctx),
        Some(p.path("node_modules/pkg/web.js"))
    );
    assert_eq!(
        resolve_id(&resolver, "pkg/lib/fs.js", None, &ctx),
        Some("__browser-external".to_string())
    );

    let mut node_ctx = p.ctx();
    node_ctx.target_web = false;
    assert_eq!(
        resolve_id(&resolver, "pkg", None, &node_ctx),
        Some(p.path("node_modules/pkg/index.js"))
    );
}

#[test]
fn test_importer_browser_field_maps_own_imports() {
    let p = Project::new();
    p.write(
        "node_modules/lib/package.json",
        r#"{"name":"lib","browser":{"./node.js":"./web.js","crypto":false}}"#,
    );
    p.write("node_modules/lib/index.js", "");
    p.write("node_modules/lib/node.js", "");
    p.write("node_modules/lib/web.js", "");
    let importer = p.path("node_modules/lib/index.js");

    let resolver = Resolver::default();
    let ctx = p.ctx();
    assert_eq!(
        resolve_id(&resolver, "./node.js", Some(&importer), &ctx),
        Some(p.path("node_modules/lib/web.js"))
    );
    assert_eq!(
        resolve_id(&resolver, "crypto", Some(&importer), &ctx),
        Some("__browser-external".to_string())
    );
}

#[test]
fn test_dedupe_resolves_from_root() {
    let p = Project::new();
    p.write(
        "node_modules/react/package.json",
        r#"{"name":"react","version":"18.0.0","main":"index.js"}"#,
    );
    p.write("node_modules/react/index.js", "");
    p.write("node_modules/lib/package.json", r#"{"name":"lib"}"#);
    p.write("node_modules/lib/index.js", "");
    p.write(
        "node_modules/lib/node_modules/react/package.json",
        r#"{"name":"react","version":"17.0.0","main":"index.js"}"#,
    );
    p.write("node_modules/lib/node_modules/react/index.js", "");
    let importer = p.path("node_modules/lib/index.js");

    let resolver = Resolver::default();
    let ctx = p.ctx();
    assert_eq!(
        resolve_id(&resolver, "react", Some(&importer), &ctx),
        Some(p.path("node_modules/lib/node_modules/react/index.js"))
    );

    let mut deduped = p.ctx();
    deduped.dedupe = vec!["react".to_string()];
    assert_eq!(
        resolve_id(&resolver, "react", Some(&importer), &deduped),
        Some(p.path("node_modules/react/index.js"))
    );
}

#[test]
fn test_missing_optional_peer_dependency() {
    let p = Project::new();
    p.write(
        "node_modules/consumer/package.json",
        r#"{
            "name": "consumer",
            "peerDependencies": {"foo": "*", "bar": "*"},
            "peerDependenciesMeta": {"foo": {"optional": true}}
        }"#,
    );
    p.write("node_modules/consumer/index.js", "");
    let importer = p.path("node_modules/consumer/index.js");

    let resolver = Resolver::default();
    let ctx = p.ctx();
    assert_eq!(
        resolve_id(&resolver, "foo", Some(&importer), &ctx),
        Some("__optional-peer-dep:foo:consumer".to_string())
    );
    // Deep imports name the package, not the subpath
    assert_eq!(
        resolve_id(&resolver, "foo/sub", Some(&importer), &ctx),
        Some("__optional-peer-dep:foo:consumer".to_string())
    );
    // Required peers stay unresolved
    assert_eq!(resolve_id(&resolver, "bar", Some(&importer), &ctx), None);
    // The project root has no peer dependencies
    assert_eq!(resolve_id(&resolver, "foo", None, &ctx), None);
    let root_importer = p.path("src/main.js");
    assert_eq!(resolve_id(&resolver, "foo", Some(&root_importer), &ctx), None);
}

#[test]
fn test_relative_inline_query_in_node_modules() {
    let p = Project::new();
    p.write("node_modules/lib/package.json", r#"{"name":"lib"}"#);
    p.write("node_modules/lib/index.js", "");
    p.write("node_modules/lib/utils.js", "");
    let importer = p.path("node_modules/lib/index.js");

    let resolver = Resolver::default().with_optimizer(Arc::new(FixedOptimizer));
    let ctx = p.ctx();
    assert_eq!(
        resolve_id(&resolver, "./utils?inline", Some(&importer), &ctx),
        Some(p.path("node_modules/lib/utils.js?v=h1&inline"))
    );
    // Bare imports from inside node_modules skip pre-bundling
    assert_eq!(
        resolve_id(&resolver, "lib/utils?inline", Some(&importer), &ctx),
        Some(p.path("node_modules/lib/utils.js?v=h1&inline"))
    );
    // Already versioned ids are left alone
    assert_eq!(
        resolve_id(&resolver, "./utils?v=abc", Some(&importer), &ctx),
        Some(p.path("node_modules/lib/utils.js?v=abc"))
    );
}

#[test]
fn test_optimizer_registration_from_app_code() {
    let p = Project::new();
    p.write("node_modules/lib/package.json", r#"{"name":"lib","main":"index.js"}"#);
    p.write("node_modules/lib/index.js", "");
    p.write("node_modules/lib/style.css", "");
    let importer = p.path("src/main.js");

    let resolver = Resolver::default().with_optimizer(Arc::new(FixedOptimizer));
    let ctx = p.ctx();
    assert_eq!(
        resolve_id(&resolver, "lib", Some(&importer), &ctx),
        Some("/deps/lib.js?v=h1".to_string())
    );
    // Non-JS files are never pre-bundled nor versioned
    assert_eq!(
        resolve_id(&resolver, "lib/style.css", Some(&importer), &ctx),
        Some(p.path("node_modules/lib/style.css"))
    );
}

#[test]
fn test_builtins() {
    let p = Project::new();
    let resolver = Resolver::default();

    let mut ctx = p.ctx();
    assert_eq!(
        resolve_id(&resolver, "fs", None, &ctx),
        Some("__browser-external:fs".to_string())
    );
    assert_eq!(
        resolve_id(&resolver, "node:path", None, &ctx),
        Some("__browser-external:node:path".to_string())
    );

    ctx.is_production = true;
    assert_eq!(
        resolve_id(&resolver, "fs", None, &ctx),
        Some("__browser-external".to_string())
    );

    let ssr = resolver
        .resolve("fs", None, &p.ctx(), ResolveFlags { ssr: true, ..ResolveFlags::default() })
        .unwrap()
        .unwrap();
    assert_eq!(ssr.id, "fs");
    assert!(ssr.external);
    assert_eq!(ssr.module_side_effects, Some(false));
}

#[test]
fn test_subpath_imports() {
    let p = Project::new();
    p.write(
        "package.json",
        r##"{"name":"app","imports":{"#dep":"./src/dep.js","#ext":"lib","#internal/*":"./src/internal/*.js"}}"##,
    );
    p.write("src/dep.js", "");
    p.write("src/internal/a.js", "");
    p.write("node_modules/lib/package.json", r#"{"name":"lib","main":"main.js"}"#);
    p.write("node_modules/lib/main.js", "");
    let importer = p.path("src/main.js");

    let resolver = Resolver::default();
    let ctx = p.ctx();
    assert_eq!(
        resolve_id(&resolver, "#dep", Some(&importer), &ctx),
        Some(p.path("src/dep.js"))
    );
    assert_eq!(
        resolve_id(&resolver, "#internal/a", Some(&importer), &ctx),
        Some(p.path("src/internal/a.js"))
    );
    assert_eq!(
        resolve_id(&resolver, "#ext", Some(&importer), &ctx),
        Some(p.path("node_modules/lib/main.js"))
    );
    assert!(resolver
        .resolve("#missing", Some(&importer), &ctx, ResolveFlags::default())
        .is_err());
}

#[test]
fn test_relative_and_absolute_files() {
    let p = Project::new();
    p.write("src/util.ts", "");
    p.write("src/dir/index.js", "");
    p.write("src/_partial.scss", "");
    let importer = p.path("src/main.js");

    let resolver = Resolver::default();
    let mut ctx = p.ctx();
    assert_eq!(
        resolve_id(&resolver, "./util", Some(&importer), &ctx),
        Some(p.path("src/util.ts"))
    );
    assert_eq!(
        resolve_id(&resolver, "./dir", Some(&importer), &ctx),
        Some(p.path("src/dir/index.js"))
    );
    assert_eq!(
        resolve_id(&resolver, &p.path("src/util.ts"), None, &ctx),
        Some(p.path("src/util.ts"))
    );
    assert_eq!(resolve_id(&resolver, "./nope", Some(&importer), &ctx), None);

    ctx.is_from_ts_importer = true;
    assert_eq!(
        resolve_id(&resolver, "./util.js", Some(&importer), &ctx),
        Some(p.path("src/util.ts"))
    );

    ctx.try_prefix = Some("_".to_string());
    ctx.extensions = vec![".scss".to_string()];
    assert_eq!(
        resolve_id(&resolver, "./partial", Some(&importer), &ctx),
        Some(p.path("src/_partial.scss"))
    );
}

#[test]
fn test_virtual_and_url_ids() {
    let p = Project::new();
    let resolver = Resolver::default();
    let ctx = p.ctx();

    assert_eq!(resolve_id(&resolver, "\0virtual", None, &ctx), None);
    assert_eq!(resolve_id(&resolver, "data:text/javascript,1", None, &ctx), None);

    let url = resolve(&resolver, "https://esm.sh/react", None, &ctx).unwrap();
    assert!(url.external);
    assert_eq!(url.id, "https://esm.sh/react");
}

#[test]
fn test_build_externalize_and_side_effects() {
    let p = Project::new();
    p.write(
        "node_modules/lib/package.json",
        r#"{"name":"lib","main":"index.js","sideEffects":["*.css"]}"#,
    );
    p.write("node_modules/lib/index.js", "");
    p.write("node_modules/lib/theme.css", "");

    let resolver = Resolver::default();
    let mut ctx = p.ctx();
    ctx.is_build = true;

    let entry = resolve(&resolver, "lib", None, &ctx).unwrap();
    assert!(!entry.external);
    assert_eq!(entry.module_side_effects, Some(false));

    let css = resolve(&resolver, "lib/theme.css", None, &ctx).unwrap();
    assert_eq!(css.module_side_effects, Some(true));

    let flags = ResolveFlags {
        ssr: true,
        externalize: true,
        allow_linked_external: true,
    };
    let external = resolver.resolve("lib", None, &ctx, flags).unwrap().unwrap();
    assert!(external.external);
    assert_eq!(external.id, "lib");

    // Non-JS files stay bundled
    let css = resolver.resolve("lib/theme.css", None, &ctx, flags).unwrap().unwrap();
    assert!(!css.external);
}

#[test]
fn test_config_injected_cache_is_shared() {
    let p = Project::new();
    p.write("node_modules/lib/package.json", r#"{"name":"lib"}"#);
    p.write("node_modules/lib/index.js", "");

    let cache = Arc::new(PackageCache::default());
    let config = ResolveConfig {
        package_cache: Some(Arc::clone(&cache)),
        ..ResolveConfig::default()
    };
    let resolver = Resolver::from_config(&config);
    assert!(Arc::ptr_eq(resolver.cache(), &cache));

    let ctx = config.context(&p.root, false);
    assert!(resolve_id(&resolver, "lib", None, &ctx).is_some());
    assert!(cache.stats().manifests > 0);
}

#[test]
fn test_one_cache_serves_dev_and_build_contexts() {
    let p = Project::new();
    p.write(
        "node_modules/cond/package.json",
        r#"{"name":"cond","exports":{
            ".":{"development":"./dev.js","production":"./prod.js","default":"./prod.js"},
            "./x":{"worker":"./w.js","default":"./d.js"}
        }}"#,
    );
    for file in ["dev.js", "prod.js", "w.js", "d.js"] {
        p.write(&format!("node_modules/cond/{file}"), "");
    }

    let resolver = Resolver::default();
    let dev = p.ctx();
    let mut build = p.ctx();
    build.is_build = true;
    build.is_production = true;
    let mut worker = p.ctx();
    worker.conditions = vec!["worker".to_string()];

    assert_eq!(resolve_id(&resolver, "cond", None, &dev), Some(p.path("node_modules/cond/dev.js")));
    assert_eq!(resolve_id(&resolver, "cond", None, &build), Some(p.path("node_modules/cond/prod.js")));
    assert_eq!(resolve_id(&resolver, "cond/x", None, &dev), Some(p.path("node_modules/cond/d.js")));
    assert_eq!(resolve_id(&resolver, "cond/x", None, &worker), Some(p.path("node_modules/cond/w.js")));

    // Warm entries are still served per context
    assert_eq!(resolve_id(&resolver, "cond", None, &dev), Some(p.path("node_modules/cond/dev.js")));
}

#[cfg(unix)]
#[test]
fn test_symlinked_importer_shares_manifest() {
    let p = Project::new();
    p.write(
        "packages/lib/package.json",
        r##"{"name":"lib","imports":{"#util":"./src/util.js"}}"##,
    );
    p.write("packages/lib/src/util.js", "");
    p.write("packages/lib/src/main.js", "");
    std::os::unix::fs::symlink(p.path("packages/lib"), p.path("link")).unwrap();

    let resolver = Resolver::default();
    let ctx = p.ctx();
    let via_real = resolve_id(&resolver, "#util", Some(&p.path("packages/lib/src/main.js")), &ctx);
    let via_link = resolve_id(&resolver, "#util", Some(&p.path("link/src/main.js")), &ctx);
    assert_eq!(via_real, Some(p.path("packages/lib/src/util.js")));
    assert_eq!(via_link, via_real);

    let cache = resolver.cache();
    let a = cache.find_nearest(Path::new(&p.path("packages/lib/src")), false).unwrap().unwrap();
    let b = cache.find_nearest(Path::new(&p.path("link/src")), false).unwrap().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(cache.stats().manifests, 1);
}

#[test]
fn test_broken_manifest_error_names_specifier() {
    let p = Project::new();
    p.write("node_modules/broken/package.json", "{ invalid");
    p.write("node_modules/broken/deep/file.js", "");

    let resolver = Resolver::default();
    let err = resolver
        .resolve("broken/deep/file", None, &p.ctx(), ResolveFlags::default())
        .unwrap_err();
    match &err {
        ResolveError::Specifier { specifier, source } => {
            assert_eq!(specifier, "broken/deep/file");
            assert!(matches!(source.as_ref(), ResolveError::ManifestParse { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.path(), Path::new(&p.path("node_modules/broken/package.json")));
    assert!(err.to_string().contains("'broken/deep/file'"));
}
