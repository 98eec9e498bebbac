//! Package metadata and resolution caches.
//!
//! Every map is a [`OnceMap`]: readers share an `RwLock`, and concurrent
//! first-time lookups of one key run the computation once while the other
//! callers block on the same `OnceLock`.

use super::package::{PackageData, PACKAGE_JSON};
use crate::error::ResolveError;
use modfind_util::{FileSystem, OsFileSystem};
use std::collections::HashMap;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::{debug, trace};

/// Outcome of a manifest lookup: found, not found, or a hard failure.
pub type PackageResult = Result<Option<Arc<PackageData>>, ResolveError>;

/// Outcome of a cached path resolution.
pub type ResolvedResult = Result<Option<String>, ResolveError>;

/// Single-flight memo table.
#[derive(Debug)]
pub struct OnceMap<K, V> {
    cells: RwLock<HashMap<K, Arc<OnceLock<V>>>>,
}

impl<K, V> Default for OnceMap<K, V> {
    fn default() -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> OnceMap<K, V> {
    /// Return the value for `key`, computing it with `init` on first use.
    ///
    /// `init` must not look up the same key again.
    pub fn get_or_init(&self, key: &K, init: impl FnOnce() -> V) -> V {
        let cell = self.cell(key);
        cell.get_or_init(init).clone()
    }

    /// Value for `key` if it has been computed.
    pub fn get(&self, key: &K) -> Option<V> {
        let cells = self.cells.read().unwrap_or_else(PoisonError::into_inner);
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Store a value, replacing any previous one.
    pub fn insert(&self, key: K, value: V) {
        let cell = OnceLock::new();
        let _ = cell.set(value);
        let mut cells = self.cells.write().unwrap_or_else(PoisonError::into_inner);
        cells.insert(key, Arc::new(cell));
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut cells = self.cells.write().unwrap_or_else(PoisonError::into_inner);
        cells.remove(key).and_then(|cell| cell.get().cloned())
    }

    /// Keep entries for which `keep` returns true. Uninitialized entries are
    /// passed `None`.
    pub fn retain(&self, mut keep: impl FnMut(&K, Option<&V>) -> bool) -> usize {
        let mut cells = self.cells.write().unwrap_or_else(PoisonError::into_inner);
        let before = cells.len();
        cells.retain(|k, cell| keep(k, cell.get()));
        before - cells.len()
    }

    pub fn clear(&self) {
        self.cells
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.cells.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cell(&self, key: &K) -> Arc<OnceLock<V>> {
        {
            let cells = self.cells.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(cell) = cells.get(key) {
                return Arc::clone(cell);
            }
        }
        let mut cells = self.cells.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cells.entry(key.clone()).or_default())
    }
}

/// Key of a memoized package lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LookupKey {
    name: String,
    basedir: PathBuf,
    preserve_symlinks: bool,
}

/// Key of a cached deep-import or entry resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedKey {
    /// Package directory.
    pub dir: PathBuf,
    /// `"."` for the entry, otherwise the subpath with its postfix.
    pub subpath: String,
    pub target_web: bool,
    /// [`ResolveContext::settings_digest`] of the resolving context.
    ///
    /// [`ResolveContext::settings_digest`]: super::context::ResolveContext::settings_digest
    pub settings: String,
}

/// Entry counts, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub manifests: usize,
    pub lookups: usize,
    pub nearest: usize,
    pub resolved: usize,
}

/// Shared package metadata cache.
///
/// Holds parsed manifests by real directory, memoized package lookups and
/// the per-package resolution cache. Share it with `Arc`.
#[derive(Debug)]
pub struct PackageCache {
    fs: Arc<dyn FileSystem>,
    manifests: OnceMap<PathBuf, PackageResult>,
    lookups: OnceMap<LookupKey, PackageResult>,
    nearest: OnceMap<(PathBuf, bool), PackageResult>,
    nearest_main: OnceMap<(PathBuf, bool), PackageResult>,
    resolved: OnceMap<ResolvedKey, ResolvedResult>,
}

impl Default for PackageCache {
    fn default() -> Self {
        Self::new(Arc::new(OsFileSystem))
    }
}

impl PackageCache {
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            manifests: OnceMap::default(),
            lookups: OnceMap::default(),
            nearest: OnceMap::default(),
            nearest_main: OnceMap::default(),
            resolved: OnceMap::default(),
        }
    }

    /// Filesystem used for every lookup.
    #[must_use]
    pub fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    /// Parsed manifest of the package rooted at `dir`.
    ///
    /// `Ok(None)` when `dir` has no `package.json`.
    pub fn load_manifest(&self, dir: &Path) -> PackageResult {
        self.manifests.get_or_init(&dir.to_path_buf(), || {
            let path = dir.join(PACKAGE_JSON);
            if !self.fs.is_file(&path) {
                return Ok(None);
            }
            let content = self
                .fs
                .read_to_string(&path)
                .map_err(|e| ResolveError::ManifestRead {
                    path: path.clone(),
                    source: Arc::new(e),
                })?;
            let data = PackageData::parse(dir, &content).map_err(|e| ResolveError::ManifestParse {
                path: path.clone(),
                source: Arc::new(e),
            })?;
            debug!(dir = %dir.display(), name = ?data.name, "Loaded package manifest");
            Ok(Some(Arc::new(data)))
        })
    }

    /// Find package `name` from `basedir`, walking up through every
    /// `node_modules` directory.
    ///
    /// The package directory is canonicalized unless `preserve_symlinks`.
    pub fn resolve_package(&self, name: &str, basedir: &Path, preserve_symlinks: bool) -> PackageResult {
        let key = LookupKey {
            name: name.to_string(),
            basedir: basedir.to_path_buf(),
            preserve_symlinks,
        };
        self.lookups.get_or_init(&key, || {
            let mut current = Some(basedir);
            while let Some(dir) = current {
                let pkg_dir = dir.join("node_modules").join(name);
                if self.fs.is_file(&pkg_dir.join(PACKAGE_JSON)) {
                    let pkg_dir = self.real_dir(&pkg_dir, preserve_symlinks);
                    trace!(name, dir = %pkg_dir.display(), "Found package");
                    return self.load_manifest(&pkg_dir);
                }
                current = dir.parent();
            }
            debug!(name, basedir = %basedir.display(), "Package not found");
            Ok(None)
        })
    }

    /// Nearest manifest at or above `start`.
    ///
    /// The manifest is loaded from its real directory unless
    /// `preserve_symlinks`, so a symlinked and a real path into one package
    /// share the same record.
    pub fn find_nearest(&self, start: &Path, preserve_symlinks: bool) -> PackageResult {
        let key = (start.to_path_buf(), preserve_symlinks);
        self.nearest.get_or_init(&key, || {
            let mut current = Some(start);
            while let Some(dir) = current {
                if self.fs.is_file(&dir.join(PACKAGE_JSON)) {
                    return self.load_manifest(&self.real_dir(dir, preserve_symlinks));
                }
                current = dir.parent();
            }
            Ok(None)
        })
    }

    /// Nearest manifest at or above `start` that declares a `name`.
    ///
    /// Skips nested manifests such as `dist/package.json` that only set
    /// `"type"`.
    pub fn find_nearest_main(&self, start: &Path, preserve_symlinks: bool) -> PackageResult {
        let key = (start.to_path_buf(), preserve_symlinks);
        self.nearest_main.get_or_init(&key, || {
            let mut current = Some(start.to_path_buf());
            while let Some(dir) = current {
                let Some(pkg) = self.find_nearest(&dir, preserve_symlinks)? else {
                    return Ok(None);
                };
                if pkg.name.is_some() {
                    return Ok(Some(pkg));
                }
                current = pkg.dir.parent().map(Path::to_path_buf);
            }
            Ok(None)
        })
    }

    fn real_dir(&self, dir: &Path, preserve_symlinks: bool) -> PathBuf {
        if preserve_symlinks {
            return dir.to_path_buf();
        }
        self.fs.canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
    }

    /// Cached resolution for `key`, computed by `resolve` on first use.
    ///
    /// Hits, misses and hard errors are all remembered.
    pub fn resolve_cached(&self, key: &ResolvedKey, resolve: impl FnOnce() -> ResolvedResult) -> ResolvedResult {
        if let Some(hit) = self.resolved.get(key) {
            trace!(dir = %key.dir.display(), subpath = %key.subpath, "Resolution cache hit");
            return hit;
        }
        self.resolved.get_or_init(key, resolve)
    }

    /// Drop everything cached for the package in `dir`.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate(&self, dir: &Path) -> usize {
        let owned_by = |v: Option<&PackageResult>| {
            matches!(v, Some(Ok(Some(pkg))) if pkg.dir == dir)
        };

        let mut removed = usize::from(self.manifests.remove(&dir.to_path_buf()).is_some());
        removed += self.lookups.retain(|_, v| !owned_by(v));
        removed += self.nearest.retain(|_, v| !owned_by(v));
        removed += self.nearest_main.retain(|_, v| !owned_by(v));
        removed += self.resolved.retain(|k, _| k.dir != dir);

        if removed > 0 {
            debug!(dir = %dir.display(), removed, "Invalidated package cache entries");
        }
        removed
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.manifests.clear();
        self.lookups.clear();
        self.nearest.clear();
        self.nearest_main.clear();
        self.resolved.clear();
        debug!("Cleared package cache");
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            manifests: self.manifests.len(),
            lookups: self.lookups.len(),
            nearest: self.nearest.len() + self.nearest_main.len(),
            resolved: self.resolved.len(),
        }
    }
}
