//! Integration tests for `modfind resolve` and `modfind pkg`.

use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn modfind() -> Command {
    Command::new(env!("CARGO_BIN_EXE_modfind"))
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn fixture() -> tempfile::TempDir {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(root, "package.json", r#"{"name":"app","dependencies":{"lib":"1.0.0"}}"#);
    write(root, "src/main.js", "import 'lib'");
    write(root, "src/util.ts", "export const x = 1");
    write(
        root,
        "node_modules/lib/package.json",
        r#"{"name":"lib","version":"1.2.3","type":"module","exports":{".":{"import":"./esm/index.js","require":"./cjs/index.js"},"./feature":"./esm/feature.js"}}"#,
    );
    write(root, "node_modules/lib/esm/index.js", "export default 1");
    write(root, "node_modules/lib/cjs/index.js", "module.exports = 1");
    write(root, "node_modules/lib/esm/feature.js", "export const f = 1");
    dir
}

fn run_json(cwd: &Path, args: &[&str]) -> (bool, serde_json::Value) {
    let output = modfind()
        .arg("--cwd")
        .arg(cwd)
        .arg("--json")
        .args(args)
        .output()
        .expect("Failed to run modfind");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.trim().starts_with('{'),
        "stdout should begin with '{{': {stdout}"
    );
    let json: serde_json::Value =
        serde_json::from_str(&stdout).expect("stdout should be valid JSON");
    (output.status.success(), json)
}

fn real(root: &Path) -> String {
    root.canonicalize().unwrap().to_string_lossy().replace('\\', "/")
}

#[test]
fn test_resolve_json_entry_and_deep_import() {
    let dir = fixture();
    let root = real(dir.path());
    let (ok, json) = run_json(dir.path(), &["resolve", "lib", "lib/feature"]);

    assert!(ok);
    assert_eq!(json["schema_version"].as_u64(), Some(1));
    assert_eq!(json["ok"].as_bool(), Some(true));

    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["specifier"], "lib");
    assert_eq!(
        results[0]["resolved"]["id"].as_str(),
        Some(format!("{root}/node_modules/lib/esm/index.js").as_str())
    );
    assert_eq!(
        results[1]["resolved"]["id"].as_str(),
        Some(format!("{root}/node_modules/lib/esm/feature.js").as_str())
    );
}

#[test]
fn test_resolve_require_condition() {
    let dir = fixture();
    let root = real(dir.path());
    let (ok, json) = run_json(dir.path(), &["resolve", "--require", "--node", "lib"]);

    assert!(ok);
    assert_eq!(
        json["results"][0]["resolved"]["id"].as_str(),
        Some(format!("{root}/node_modules/lib/cjs/index.js").as_str())
    );
}

#[test]
fn test_resolve_relative_from_importer() {
    let dir = fixture();
    let root = real(dir.path());
    let (ok, json) = run_json(dir.path(), &["resolve", "--importer", "src/main.js", "./util"]);

    assert!(ok);
    assert_eq!(
        json["results"][0]["resolved"]["id"].as_str(),
        Some(format!("{root}/src/util.ts").as_str())
    );
}

#[test]
fn test_resolve_unexported_subpath_fails() {
    let dir = fixture();
    let (ok, json) = run_json(dir.path(), &["resolve", "lib/missing", "lib"]);

    assert!(!ok, "exit status should be non-zero");
    assert_eq!(json["ok"].as_bool(), Some(false));
    let first = &json["results"][0];
    assert!(first.get("resolved").is_none());
    let error = first["error"].as_str().unwrap();
    assert!(error.contains("./missing"), "unexpected error: {error}");
    // The failure stays local to its specifier
    assert!(json["results"][1]["resolved"]["id"].is_string());
}

#[test]
fn test_resolve_missing_package_is_unresolved() {
    let dir = fixture();
    let (ok, json) = run_json(dir.path(), &["resolve", "nope"]);

    assert!(!ok);
    let first = &json["results"][0];
    assert!(first.get("resolved").is_none());
    assert!(first.get("error").is_none());
}

#[test]
fn test_resolve_builtin_for_browser() {
    let dir = fixture();
    let (ok, json) = run_json(dir.path(), &["resolve", "--build", "fs"]);

    assert!(ok);
    assert_eq!(
        json["results"][0]["resolved"]["id"].as_str(),
        Some("__browser-external")
    );
}

#[test]
fn test_resolve_optimize_writes_metadata() {
    let dir = fixture();
    let (ok, json) = run_json(
        dir.path(),
        &["resolve", "--optimize", "--importer", "src/main.js", "lib"],
    );

    assert!(ok);
    let id = json["results"][0]["resolved"]["id"].as_str().unwrap();
    assert!(id.contains("/.modfind/deps/lib.js?v="), "unexpected id: {id}");
    let metadata = json["deps_metadata"].as_str().unwrap();
    assert!(Path::new(metadata).is_file());

    let meta: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(metadata).unwrap()).unwrap();
    assert!(meta["optimized"]["lib"].is_object());
}

#[test]
fn test_resolve_reads_config_file() {
    let dir = fixture();
    let root = real(dir.path());
    write(dir.path(), "modfind.json", r#"{"conditions":["custom"]}"#);
    write(
        dir.path(),
        "node_modules/cond/package.json",
        r#"{"name":"cond","exports":{"custom":"./custom.js","default":"./default.js"}}"#,
    );
    write(dir.path(), "node_modules/cond/custom.js", "");
    write(dir.path(), "node_modules/cond/default.js", "");

    let (ok, json) = run_json(dir.path(), &["resolve", "cond"]);
    assert!(ok);
    assert_eq!(
        json["results"][0]["resolved"]["id"].as_str(),
        Some(format!("{root}/node_modules/cond/custom.js").as_str())
    );
}

#[test]
fn test_resolve_human_output() {
    let dir = fixture();
    let output = modfind()
        .arg("--cwd")
        .arg(dir.path())
        .args(["resolve", "lib", "nope"])
        .output()
        .expect("Failed to run modfind");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Specifier: lib"));
    assert!(stdout.contains("Resolved: "));
    assert!(stdout.contains("Status: UNRESOLVED"));
    assert!(!output.status.success());
}

#[test]
fn test_pkg_json() {
    let dir = fixture();
    let root = real(dir.path());
    let (ok, json) = run_json(dir.path(), &["pkg", "lib"]);

    assert!(ok);
    let pkg = &json["package"];
    assert_eq!(pkg["name"], "lib");
    assert_eq!(pkg["version"], "1.2.3");
    assert_eq!(pkg["type"], "module");
    assert_eq!(pkg["has_exports"].as_bool(), Some(true));
    assert_eq!(
        pkg["entry"].as_str(),
        Some(format!("{root}/node_modules/lib/esm/index.js").as_str())
    );
}

#[test]
fn test_pkg_not_found() {
    let dir = fixture();
    let (ok, json) = run_json(dir.path(), &["pkg", "nope"]);

    assert!(!ok);
    assert_eq!(json["ok"].as_bool(), Some(false));
    assert!(json["error"].as_str().unwrap().contains("nope"));
}

#[test]
fn test_version() {
    let output = modfind().arg("version").output().expect("Failed to run modfind");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("modfind "));
}
