//! Derivative cache for the `scale` command.
//!
//! Decoding and resampling a large source is the slow part of `scale`. The
//! cache keeps every derivative it has produced in one directory and, on a
//! repeat request, copies the stored file to the requested output instead
//! of rendering again.
//!
//! ## Cache keys
//!
//! Lookups are **content-addressed** by `source_hash` plus `params_hash`:
//!
//! - **`source_hash`**: SHA-256 of the source file bytes. Moving or renaming
//!   the source keeps its derivatives valid; editing it invalidates them.
//! - **`params_hash`**: SHA-256 of everything that shapes the output pixels
//!   and encoding: scale mode, explicit kernel or kernel policy, sharpen
//!   amount, linear tag, quality and the output format extension.
//!
//! A hit requires a matching manifest entry **and** the stored file on disk.
//!
//! ## Storage
//!
//! `<cache dir>/manifest.json` maps stored file names to their keys. Stored
//! files are named `<source prefix>-<params prefix>.<ext>` so a directory
//! listing stays readable. Nothing is ever evicted.

use crate::imaging::{DeriveParams, ScaleMode};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the manifest file inside the cache directory.
const MANIFEST_FILENAME: &str = "manifest.json";

/// Bump to drop every existing cache when the key computation changes.
const MANIFEST_VERSION: u32 = 1;

/// Hex digits of each hash used in stored file names.
const NAME_PREFIX_LEN: usize = 16;

/// One stored derivative.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub source_hash: String,
    pub params_hash: String,
    pub width: u32,
    pub height: u32,
}

/// On-disk manifest mapping stored file names to their cache entries.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CacheManifest {
    pub version: u32,
    pub entries: HashMap<String, CacheEntry>,
    /// `"{source_hash}:{params_hash}"` → stored file name. Rebuilt on load.
    #[serde(skip)]
    content_index: HashMap<String, String>,
}

impl CacheManifest {
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: HashMap::new(),
            content_index: HashMap::new(),
        }
    }

    /// Load from `cache_dir`. A missing, unreadable or outdated manifest
    /// yields an empty one.
    pub fn load(cache_dir: &Path) -> Self {
        let path = manifest_path(cache_dir);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        let mut manifest: Self = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable cache manifest");
                return Self::empty();
            }
        };
        if manifest.version != MANIFEST_VERSION {
            debug!(found = manifest.version, "cache manifest version changed; starting empty");
            return Self::empty();
        }
        manifest.content_index = build_content_index(&manifest.entries);
        manifest
    }

    pub fn save(&self, cache_dir: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(manifest_path(cache_dir), json)
    }

    /// The stored entry and its file name, if the file is still on disk.
    pub fn find_cached(
        &self,
        source_hash: &str,
        params_hash: &str,
        cache_dir: &Path,
    ) -> Option<(&str, &CacheEntry)> {
        let name = self.content_index.get(&content_key(source_hash, params_hash))?;
        let entry = self.entries.get(name)?;
        cache_dir
            .join(name)
            .exists()
            .then_some((name.as_str(), entry))
    }

    /// Record `entry` under `stored_name`, dropping any older name that held
    /// the same content.
    pub fn insert(&mut self, stored_name: String, entry: CacheEntry) {
        let key = content_key(&entry.source_hash, &entry.params_hash);
        if let Some(old) = self.content_index.get(&key)
            && *old != stored_name
        {
            self.entries.remove(old.as_str());
        }
        self.content_index.insert(key, stored_name.clone());
        self.entries.insert(stored_name, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn content_key(source_hash: &str, params_hash: &str) -> String {
    format!("{}:{}", source_hash, params_hash)
}

fn build_content_index(entries: &HashMap<String, CacheEntry>) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(name, entry)| {
            (
                content_key(&entry.source_hash, &entry.params_hash),
                name.clone(),
            )
        })
        .collect()
}

/// SHA-256 of a file's contents as lowercase hex.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// SHA-256 of the derive parameters that affect the output file.
///
/// Source and output paths are not part of the key; the output extension
/// is, since it selects the encoder.
pub fn hash_derive_params(params: &DeriveParams) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"derive\0");
    match params.mode {
        ScaleMode::Full => hasher.update(b"full"),
        ScaleMode::Width(w) => {
            hasher.update(b"w");
            hasher.update(w.to_le_bytes());
        }
        ScaleMode::Height(h) => {
            hasher.update(b"h");
            hasher.update(h.to_le_bytes());
        }
        ScaleMode::Fit { width, height } => {
            hasher.update(b"fit");
            hasher.update(width.to_le_bytes());
            hasher.update(height.to_le_bytes());
        }
        ScaleMode::Exact { width, height } => {
            hasher.update(b"exact");
            hasher.update(width.to_le_bytes());
            hasher.update(height.to_le_bytes());
        }
        ScaleMode::Percent(p) => {
            hasher.update(b"pct");
            hasher.update(p.to_le_bytes());
        }
    }
    hasher.update(b"\0");
    match params.filter {
        Some(filter) => {
            hasher.update(b"\x01");
            hasher.update(filter.name());
        }
        None => {
            hasher.update(b"\x00");
            hasher.update(params.policy.downscale.name());
            hasher.update(b"/");
            hasher.update(params.policy.upscale.name());
        }
    }
    hasher.update(b"\0");
    hasher.update(params.sharpen.amount().to_le_bytes());
    hasher.update([params.linear_output as u8]);
    hasher.update(params.quality.value().to_le_bytes());
    hasher.update(output_extension(&params.output).as_bytes());
    format!("{:x}", hasher.finalize())
}

fn output_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// File name a derivative is stored under.
pub fn stored_name(source_hash: &str, params_hash: &str, extension: &str) -> String {
    let short = |h: &str| h.get(..NAME_PREFIX_LEN).unwrap_or(h).to_string();
    if extension.is_empty() {
        format!("{}-{}", short(source_hash), short(params_hash))
    } else {
        format!("{}-{}.{}", short(source_hash), short(params_hash), extension)
    }
}

/// A cache directory with its manifest loaded.
#[derive(Debug)]
pub struct DerivativeCache {
    dir: PathBuf,
    manifest: CacheManifest,
    pub stats: CacheStats,
}

/// A derivative served from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHit {
    pub stored: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl DerivativeCache {
    /// Open (creating if needed) the cache directory.
    pub fn open(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let manifest = CacheManifest::load(dir);
        debug!(dir = %dir.display(), entries = manifest.len(), "cache opened");
        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
            stats: CacheStats::default(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> &CacheManifest {
        &self.manifest
    }

    /// Copy a cached derivative to `output` if one exists for these keys.
    pub fn restore(
        &mut self,
        source_hash: &str,
        params_hash: &str,
        output: &Path,
    ) -> io::Result<Option<CacheHit>> {
        let Some((name, entry)) = self
            .manifest
            .find_cached(source_hash, params_hash, &self.dir)
        else {
            self.stats.miss();
            return Ok(None);
        };
        let stored = self.dir.join(name);
        let hit = CacheHit {
            stored: stored.clone(),
            width: entry.width,
            height: entry.height,
        };
        if stored != output {
            fs::copy(&stored, output)?;
        }
        self.stats.hit();
        Ok(Some(hit))
    }

    /// Copy a freshly rendered `output` into the cache and persist the
    /// manifest.
    pub fn store(
        &mut self,
        source_hash: &str,
        params_hash: &str,
        output: &Path,
        size: (u32, u32),
    ) -> io::Result<PathBuf> {
        let name = stored_name(source_hash, params_hash, &output_extension(output));
        let stored = self.dir.join(&name);
        fs::copy(output, &stored)?;
        self.manifest.insert(
            name,
            CacheEntry {
                source_hash: source_hash.to_string(),
                params_hash: params_hash.to_string(),
                width: size.0,
                height: size.1,
            },
        );
        self.manifest.save(&self.dir)?;
        Ok(stored)
    }
}

/// Hit/miss counts for one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} rendered ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} rendered", self.misses)
        }
    }
}

pub fn manifest_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(MANIFEST_FILENAME)
}
