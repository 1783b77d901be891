//! Per-user classification cache.
//!
//! One JSON document per user scope, `{fingerprint_hex: category_name}`,
//! stored as `cache_<scope>.json` in the application data directory.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::fingerprint::Fingerprint;

/// Scope used when no user identity is available
pub const LOCAL_SCOPE: &str = "local";

pub type CacheMap = HashMap<Fingerprint, String>;

/// Persistent fingerprint to category store
#[derive(Debug, Clone)]
pub struct ClassificationCache {
    dir: PathBuf,
}

impl ClassificationCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the cache file for a user scope
    pub fn path_for(&self, scope: &str) -> PathBuf {
        self.dir.join(format!("cache_{}.json", sanitize_scope(scope)))
    }

    /// Load the whole cache for a scope.
    ///
    /// A missing, unreadable or corrupt file yields an empty map.
    pub fn load(&self, scope: &str) -> CacheMap {
        let path = self.path_for(scope);
        if !path.exists() {
            return CacheMap::new();
        }

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("[Cache] Failed to read {}: {}", path.display(), e);
                return CacheMap::new();
            }
        };

        match serde_json::from_str::<CacheMap>(&content) {
            Ok(map) => {
                tracing::debug!("[Cache] Loaded {} entries for scope '{}'", map.len(), scope);
                map
            }
            Err(e) => {
                tracing::warn!(
                    "[Cache] Ignoring corrupt cache file {}: {}",
                    path.display(),
                    e
                );
                CacheMap::new()
            }
        }
    }

    /// Replace the persisted cache for a scope with `map`.
    ///
    /// Writes a temp file next to the target and renames it over.
    pub fn save(&self, scope: &str, map: &CacheMap) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(scope);
        let temp_path = path.with_extension("tmp");

        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, map)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;

        fs::rename(&temp_path, &path)?;

        tracing::debug!("[Cache] Saved {} entries to {}", map.len(), path.display());
        Ok(())
    }
}

/// Keep a user scope safe for use inside a file name
fn sanitize_scope(scope: &str) -> String {
    let cleaned: String = scope
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        LOCAL_SCOPE.to_string()
    } else {
        cleaned
    }
}
