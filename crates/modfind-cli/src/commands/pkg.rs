//! `modfind pkg`: show the manifest a package name resolves to.

use super::resolve::{absolutize, load_resolve_config};
use miette::{miette, IntoDiagnostic, Result};
use modfind_core::resolver::entry::resolve_package_entry;
use modfind_core::resolver::package::{PackageType, SideEffects};
use modfind_core::version::RESOLVE_SCHEMA_VERSION;
use modfind_core::{Config, Resolver};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct PkgInfo {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    dir: String,
    #[serde(rename = "type")]
    package_type: &'static str,
    has_exports: bool,
    side_effects: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    peer_dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entry: Option<String>,
}

#[derive(Debug, Serialize)]
struct PkgOutput {
    schema_version: u32,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    package: Option<PkgInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn run(config: &Config, name: &str, from: Option<&Path>, node: bool) -> Result<()> {
    let cwd = &config.cwd;
    let basedir = from.map_or_else(|| cwd.clone(), |f| absolutize(cwd, f));
    let settings = load_resolve_config(cwd, None)?;

    let mut ctx = settings.context(basedir.clone(), false);
    ctx.target_web = !node;

    let resolver = Resolver::from_config(&settings);
    let cache = resolver.cache();

    let output = match cache.resolve_package(name, &basedir, ctx.preserve_symlinks) {
        Ok(Some(pkg)) => {
            let entry = resolve_package_entry(name, &pkg, ctx.target_web, &ctx, cache);
            let (entry, error) = match entry {
                Ok(entry) => (entry, None),
                Err(e) => (None, Some(e.to_string())),
            };
            PkgOutput {
                schema_version: RESOLVE_SCHEMA_VERSION,
                ok: error.is_none(),
                package: Some(PkgInfo {
                    name: pkg.display_name(),
                    version: pkg.version.clone(),
                    dir: pkg.dir.display().to_string(),
                    package_type: match pkg.package_type {
                        PackageType::Module => "module",
                        PackageType::CommonJs => "commonjs",
                    },
                    has_exports: pkg.has_exports(),
                    side_effects: describe_side_effects(&pkg.side_effects),
                    peer_dependencies: pkg.peer_dependencies.keys().cloned().collect(),
                    entry,
                }),
                error,
            }
        }
        Ok(None) => PkgOutput {
            schema_version: RESOLVE_SCHEMA_VERSION,
            ok: false,
            package: None,
            error: Some(format!("package not found: {name}")),
        },
        Err(e) => PkgOutput {
            schema_version: RESOLVE_SCHEMA_VERSION,
            ok: false,
            package: None,
            error: Some(e.to_string()),
        },
    };

    if config.json_logs {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).into_diagnostic()?
        );
    } else {
        print_human(name, &output);
    }

    match output.error {
        Some(error) => Err(miette!("{error}")),
        None => Ok(()),
    }
}

fn describe_side_effects(side_effects: &SideEffects) -> String {
    match side_effects {
        SideEffects::All(flag) => flag.to_string(),
        SideEffects::Patterns(patterns) => patterns
            .iter()
            .map(|p| p.as_str().to_string())
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn print_human(name: &str, output: &PkgOutput) {
    println!("Package: {name}");
    if let Some(pkg) = &output.package {
        if let Some(version) = &pkg.version {
            println!("Version: {version}");
        }
        println!("Dir: {}", pkg.dir);
        println!("Type: {}", pkg.package_type);
        println!("Exports: {}", if pkg.has_exports { "yes" } else { "no" });
        println!("Side effects: {}", pkg.side_effects);
        if !pkg.peer_dependencies.is_empty() {
            println!("Peer dependencies: {}", pkg.peer_dependencies.join(", "));
        }
        match &pkg.entry {
            Some(entry) => println!("Entry: {entry}"),
            None => println!("Entry: UNRESOLVED"),
        }
    }
    if let Some(error) = &output.error {
        println!("Error: {error}");
    }
}
