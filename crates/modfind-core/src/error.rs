use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Hard resolution failures.
///
/// A specifier that simply cannot be found is not an error; resolvers return
/// `Ok(None)` for that. These variants abort resolution of one specifier and
/// are cached like any other outcome, hence `Clone`.
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    #[error(
        "Package subpath '{subpath}' is not defined by \"{field}\" in {} (imported as '{specifier}')",
        manifest.display()
    )]
    SubpathNotDefined {
        specifier: String,
        subpath: String,
        field: &'static str,
        manifest: PathBuf,
    },

    #[error("Failed to read package manifest at {path}: {source}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("Failed to parse package manifest at {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: Arc<serde_json::Error>,
    },

    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A failure below the package layer, tagged with the specifier being
    /// resolved.
    #[error("Failed to resolve '{specifier}': {source}")]
    Specifier {
        specifier: String,
        #[source]
        source: Arc<ResolveError>,
    },
}

impl ResolveError {
    /// Path of the file involved in the failure.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::SubpathNotDefined { manifest, .. } => manifest,
            Self::ManifestRead { path, .. } | Self::ManifestParse { path, .. } | Self::FileRead { path, .. } => {
                path
            }
            Self::Specifier { source, .. } => source.path(),
        }
    }

    /// Tag the error with the specifier being resolved, unless it already
    /// names one.
    #[must_use]
    pub fn for_specifier(self, specifier: &str) -> Self {
        match self {
            Self::SubpathNotDefined { .. } | Self::Specifier { .. } => self,
            other => Self::Specifier {
                specifier: specifier.to_string(),
                source: Arc::new(other),
            },
        }
    }
}

/// Errors loading a resolver settings file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),
}
