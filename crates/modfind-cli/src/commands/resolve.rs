//! `modfind resolve`: run specifiers through the resolver.

use miette::{miette, IntoDiagnostic, Result};
use modfind_core::config::ResolveConfig;
use modfind_core::resolver::specifier::path_to_id;
use modfind_core::version::RESOLVE_SCHEMA_VERSION;
use modfind_core::{Config, DepsRegistry, ResolveFlags, ResolvedModule, Resolver};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Arguments of `modfind resolve`.
#[derive(Debug)]
pub struct ResolveArgs {
    pub specifiers: Vec<String>,
    pub importer: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub ssr: bool,
    pub build: bool,
    pub node: bool,
    pub require: bool,
    pub externalize: bool,
    pub optimize: bool,
    pub conditions: Vec<String>,
}

/// One specifier's outcome.
#[derive(Debug, Serialize)]
struct ResolveEntry {
    specifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolved: Option<ResolvedModule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResolveOutput {
    schema_version: u32,
    ok: bool,
    results: Vec<ResolveEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deps_metadata: Option<String>,
}

/// Load `explicit`, or `modfind.json` from `cwd` when present.
pub fn load_resolve_config(cwd: &Path, explicit: Option<&Path>) -> Result<ResolveConfig> {
    if let Some(path) = explicit {
        let path = absolutize(cwd, path);
        debug!(path = %path.display(), "Loading resolve config");
        return ResolveConfig::load(&path).into_diagnostic();
    }
    match ResolveConfig::discover(cwd).into_diagnostic()? {
        Some((path, config)) => {
            debug!(path = %path.display(), "Discovered resolve config");
            Ok(config)
        }
        None => Ok(ResolveConfig::default()),
    }
}

pub fn run(config: &Config, args: &ResolveArgs) -> Result<()> {
    let cwd = &config.cwd;
    let settings = load_resolve_config(cwd, args.config.as_deref())?;

    let mut ctx = settings.context(cwd.clone(), args.build);
    ctx.target_web = !args.node;
    ctx.is_require = args.require;
    ctx.conditions.extend(args.conditions.iter().cloned());

    let registry = if args.optimize {
        let options = if args.ssr {
            &settings.ssr_optimize_deps
        } else {
            &settings.optimize_deps
        };
        Some(Arc::new(DepsRegistry::new(cwd, options)))
    } else {
        None
    };

    let mut resolver = Resolver::from_config(&settings);
    if let Some(registry) = &registry {
        resolver = resolver.with_optimizer(registry.clone());
    }

    let importer = args.importer.as_deref().map(|p| path_to_id(&absolutize(cwd, p)));
    let flags = ResolveFlags {
        ssr: args.ssr,
        externalize: args.externalize,
        allow_linked_external: true,
    };

    // Resolver shares one package cache across threads
    let results: Vec<ResolveEntry> = args
        .specifiers
        .par_iter()
        .map(|specifier| match resolver.resolve(specifier, importer.as_deref(), &ctx, flags) {
            Ok(resolved) => ResolveEntry {
                specifier: specifier.clone(),
                resolved,
                error: None,
            },
            Err(e) => ResolveEntry {
                specifier: specifier.clone(),
                resolved: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    let stats = resolver.cache().stats();
    debug!(
        manifests = stats.manifests,
        lookups = stats.lookups,
        resolved = stats.resolved,
        "Cache stats"
    );

    let deps_metadata = match &registry {
        Some(registry) if !registry.discovered().is_empty() => {
            let path = registry.persist().into_diagnostic()?;
            info!(path = %path.display(), "Wrote deps metadata");
            Some(path.display().to_string())
        }
        _ => None,
    };

    let failed = results.iter().filter(|r| r.resolved.is_none()).count();
    let output = ResolveOutput {
        schema_version: RESOLVE_SCHEMA_VERSION,
        ok: failed == 0,
        results,
        deps_metadata,
    };

    if config.json_logs {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).into_diagnostic()?
        );
    } else {
        print_human(&output);
    }

    if failed > 0 {
        return Err(miette!(
            "{failed} of {} specifier(s) did not resolve",
            output.results.len()
        ));
    }
    Ok(())
}

fn print_human(output: &ResolveOutput) {
    for entry in &output.results {
        println!("Specifier: {}", entry.specifier);
        match (&entry.resolved, &entry.error) {
            (Some(module), _) => {
                println!("Resolved: {}", module.id);
                if module.external {
                    println!("  external");
                }
                if let Some(side_effects) = module.module_side_effects {
                    println!("  side effects: {side_effects}");
                }
            }
            (None, Some(error)) => {
                println!("Status: ERROR");
                println!("Message: {error}");
            }
            (None, None) => println!("Status: UNRESOLVED"),
        }
        println!();
    }
    if let Some(path) = &output.deps_metadata {
        println!("Deps metadata: {path}");
    }
}

pub(crate) fn absolutize(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
