//! Content-addressed cassette store: one directory per upstream domain,
//! one file per fingerprint. No in-memory index; every operation computes
//! the deterministic filename and talks to the filesystem directly.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::matcher::compute_hash;
use crate::model::{Cassette, MatchingKey};

const ROUTES_DIR: &str = "_routes";

/// Convert a URL path into a filesystem-safe slug.
pub fn path_to_slug(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return "root".to_string();
    }
    trimmed
        .chars()
        .map(|c| {
            if c == '/' {
                '_'
            } else if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn cassette_filename(key: &MatchingKey) -> String {
    let slug = path_to_slug(&key.path);
    let hash = compute_hash(key);
    format!("{}_{}_{}.json", key.method, slug, hash)
}

#[derive(Debug, Clone)]
pub struct CassetteStore {
    cassettes_dir: PathBuf,
}

impl CassetteStore {
    pub fn new(cassettes_dir: impl Into<PathBuf>) -> Self {
        Self {
            cassettes_dir: cassettes_dir.into(),
        }
    }

    pub fn cassettes_dir(&self) -> &Path {
        &self.cassettes_dir
    }

    /// Directory reserved for route override documents; never treated as
    /// a domain by [`list_all`](Self::list_all).
    pub fn routes_dir(&self) -> PathBuf {
        self.cassettes_dir.join(ROUTES_DIR)
    }

    fn domain_dir(&self, domain: &str) -> PathBuf {
        self.cassettes_dir.join(domain)
    }

    /// Persist a cassette, overwriting silently if one already exists at
    /// the same filename. Returns the written path.
    pub fn save(&self, cassette: &Cassette, key: &MatchingKey) -> Result<PathBuf> {
        let domain_dir = self.domain_dir(&cassette.meta.domain);
        std::fs::create_dir_all(&domain_dir)?;

        let path = domain_dir.join(cassette_filename(key));
        let json = serde_json::to_string_pretty(cassette)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    /// Look up a cassette by domain and matching key. Returns `None` if
    /// the domain directory or the file is absent, or if the file fails
    /// to parse (a corrupt cassette is treated as a miss; see spec §7).
    pub fn lookup(&self, domain: &str, key: &MatchingKey) -> Option<Cassette> {
        let domain_dir = self.domain_dir(domain);
        if !domain_dir.is_dir() {
            return None;
        }

        let path = domain_dir.join(cassette_filename(key));
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(cassette) => Some(cassette),
            Err(e) => {
                log::warn!("malformed cassette at {path:?}, treating as a miss: {e}");
                None
            }
        }
    }

    /// All cassette files for a domain, sorted ascending by filename.
    pub fn list(&self, domain: &str) -> Vec<PathBuf> {
        let domain_dir = self.domain_dir(domain);
        list_json_files(&domain_dir)
    }

    /// All cassette files across all domains, sorted ascending by path.
    pub fn list_all(&self) -> Vec<PathBuf> {
        let mut all = Vec::new();
        let Ok(entries) = std::fs::read_dir(&self.cassettes_dir) else {
            return all;
        };
        let mut domains: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir() && p.file_name().and_then(|n| n.to_str()) != Some(ROUTES_DIR))
            .collect();
        domains.sort();

        for domain_dir in domains {
            all.extend(list_json_files(&domain_dir));
        }
        all.sort();
        all
    }

    /// Delete a cassette by domain and filename stem. Returns whether a
    /// file was actually removed.
    pub fn delete(&self, domain: &str, cassette_id: &str) -> bool {
        let path = self.domain_dir(domain).join(format!("{cassette_id}.json"));
        std::fs::remove_file(path).is_ok()
    }

    /// Delete all cassettes under a domain. Returns the count removed.
    pub fn delete_domain(&self, domain: &str) -> usize {
        let files = self.list(domain);
        let mut removed = 0;
        for f in files {
            if std::fs::remove_file(f).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    /// Delete every cassette discovered by [`list_all`](Self::list_all).
    /// Returns the count removed.
    pub fn delete_all(&self) -> usize {
        let files = self.list_all();
        let mut removed = 0;
        for f in files {
            if std::fs::remove_file(f).is_ok() {
                removed += 1;
            }
        }
        removed
    }
}

fn list_json_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    files.sort();
    files
}

/// Locate the domain's base-relative filename a given key would resolve
/// to, without touching the filesystem. Exposed for admin/inspection
/// tooling that wants the name before a cassette exists.
pub fn filename_for_key(key: &MatchingKey) -> String {
    cassette_filename(key)
}
