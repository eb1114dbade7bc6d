//! Manifest wire types: what the remote catalog returns and what we persist.
//!
//! The persisted file is a plain JSON array of grouped station entries so an
//! older device (or a human) can read it without knowing about this crate.

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::{parse_track_path, primary_path_of_nearby};
use crate::error::{RadioError, Result};

// ── ContentHash ───────────────────────────────────────────────────────────────

/// 128-bit content digest, carried as lowercase hex on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(pub [u8; 16]);

impl ContentHash {
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = RadioError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != 32 || !s.is_ascii() {
            return Err(RadioError::Parse(format!("not a 128-bit hex digest: {:?}", s)));
        }
        let mut out = [0u8; 16];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| RadioError::Parse(format!("invalid hex digest: {:?}", s)))?;
        }
        Ok(ContentHash(out))
    }
}

impl TryFrom<String> for ContentHash {
    type Error = RadioError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ContentHash> for String {
    fn from(h: ContentHash) -> Self {
        h.to_hex()
    }
}

// ── entries ───────────────────────────────────────────────────────────────────

/// One file in the catalog, addressed by its path relative to the cache root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub hash: ContentHash,
}

/// A station as the catalog server groups it.
///
/// `name`, `token` and `frequency` are informational: identity is always
/// re-derived from the file paths and the frequency from that identity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StationEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u16>,
    pub files: Vec<FileEntry>,
}

/// Flat descriptor form: one file per entry, grouped by path convention.
#[derive(Debug, Clone, Deserialize)]
struct FlatEntry {
    path: String,
    hash: ContentHash,
    #[serde(default)]
    frequency: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RemoteEntry {
    Station(StationEntry),
    File(FlatEntry),
}

// ── SyncManifest ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncManifest {
    pub stations: Vec<StationEntry>,
}

impl SyncManifest {
    pub fn new(stations: Vec<StationEntry>) -> Self {
        Self { stations }
    }

    pub fn is_empty(&self) -> bool {
        self.stations.iter().all(|s| s.files.is_empty())
    }

    /// All files in manifest order.
    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.stations.iter().flat_map(|s| s.files.iter())
    }

    pub fn file_count(&self) -> usize {
        self.stations.iter().map(|s| s.files.len()).sum()
    }

    /// Digest recorded for `path`, if the manifest lists it.
    pub fn hash_of(&self, path: &str) -> Option<ContentHash> {
        self.files().find(|f| f.path == path).map(|f| f.hash)
    }

    /// Parse a remote response body. Accepts grouped station entries, flat
    /// file entries, or a mix of both.
    pub fn from_remote_json(body: &str) -> Result<Self> {
        let entries: Vec<RemoteEntry> = serde_json::from_str(body)?;

        let mut stations = Vec::new();
        let mut flat_groups: HashMap<String, usize> = HashMap::new();

        for entry in entries {
            match entry {
                RemoteEntry::Station(station) => stations.push(station),
                RemoteEntry::File(flat) => {
                    let key = group_key(&flat.path);
                    let idx = *flat_groups.entry(key).or_insert_with(|| {
                        let id = primary_path_of_nearby(&flat.path)
                            .as_deref()
                            .or(Some(flat.path.as_str()))
                            .and_then(parse_track_path)
                            .map(|parsed| parsed.id);
                        stations.push(StationEntry {
                            name: id.as_ref().map(|id| id.name.clone()),
                            token: id.map(|id| id.owner_token),
                            frequency: flat.frequency,
                            files: Vec::new(),
                        });
                        stations.len() - 1
                    });
                    stations[idx].files.push(FileEntry {
                        path: flat.path,
                        hash: flat.hash,
                    });
                }
            }
        }

        debug!(
            "manifest: parsed {} stations ({} groups from flat entries)",
            stations.len(),
            flat_groups.len()
        );
        Ok(Self { stations })
    }

    /// Load the persisted manifest. A missing file is an empty manifest; a
    /// corrupt one is logged and treated as empty so the device still boots.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("manifest: no local copy at {}", path.display());
                return Self::default();
            }
            Err(e) => {
                warn!("manifest: failed to read {}: {}", path.display(), e);
                return Self::default();
            }
        };
        match serde_json::from_str::<Vec<StationEntry>>(&content) {
            Ok(stations) => Self { stations },
            Err(e) => {
                warn!("manifest: ignoring corrupt {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Persist atomically: write a sibling temp file, then rename over.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&self.stations)?;
        let tmp = temp_path_for(path);
        tokio::fs::write(&tmp, json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Flat entries group by parsed identity (nearby variants with their
/// primary); unparseable paths by directory.
fn group_key(path: &str) -> String {
    let primary = primary_path_of_nearby(path);
    match parse_track_path(primary.as_deref().unwrap_or(path)) {
        Some(parsed) => format!("{}/{}", parsed.id.owner_token, parsed.id.name),
        None => path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("").to_string(),
    }
}

/// `a/b/c.ogg` → `a/b/.c.ogg.part`
pub fn temp_path_for(path: &Path) -> std::path::PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.part", name))
}

/// Reject manifest paths that could escape the cache root.
pub fn validate_relative_path(path: &str) -> Result<()> {
    if path.is_empty() || path.contains('\\') {
        return Err(RadioError::Parse(format!("unsafe manifest path: {:?}", path)));
    }
    // `components()` folds interior `.` away, so check the raw segments.
    if path
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err(RadioError::Parse(format!("unsafe manifest path: {:?}", path)));
    }
    let ok = Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !ok {
        return Err(RadioError::Parse(format!("unsafe manifest path: {:?}", path)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "3f2b8c1e-9a4d-4e7b-8c2f-1d5e6a7b8c9d";
    const H1: &str = "0123456789abcdef0123456789abcdef";
    const H2: &str = "fedcba9876543210fedcba9876543210";

    #[test]
    fn test_hash_hex_round_trip_and_case() {
        let h: ContentHash = "0123456789ABCDEF0123456789abcdef".parse().unwrap();
        assert_eq!(h.to_hex(), "0123456789abcdef0123456789abcdef");
        assert!("abc".parse::<ContentHash>().is_err());
        assert!("zz23456789abcdef0123456789abcdef".parse::<ContentHash>().is_err());
    }

    #[test]
    fn test_parse_grouped_server_format() {
        let body = format!(
            r#"[
              {{
                "name": "Radio",
                "token": "{TOKEN}",
                "frequency": 960,
                "files": [
                  {{"path": "{TOKEN}/Radio_01.ogg", "hash": "{H1}"}},
                  {{"path": "{TOKEN}/Radio_01-lowpass.ogg", "hash": "{H2}"}}
                ]
              }}
            ]"#
        );
        let m = SyncManifest::from_remote_json(&body).unwrap();
        assert_eq!(m.stations.len(), 1);
        assert_eq!(m.stations[0].name.as_deref(), Some("Radio"));
        assert_eq!(m.file_count(), 2);
        assert_eq!(
            m.hash_of(&format!("{TOKEN}/Radio_01-lowpass.ogg")).unwrap().to_hex(),
            H2
        );
    }

    #[test]
    fn test_parse_flat_format_groups_by_identity() {
        let other = "00000000-0000-0000-0000-000000000002";
        let body = format!(
            r#"[
              {{"path": "{TOKEN}/Ana_01.ogg", "hash": "{H1}"}},
              {{"path": "{other}/Bob_01.ogg", "hash": "{H1}", "frequency": 1050}},
              {{"path": "{TOKEN}/Ana_01-lowpass.ogg", "hash": "{H2}"}},
              {{"path": "{TOKEN}/Ana_02.ogg", "hash": "{H2}"}}
            ]"#
        );
        let m = SyncManifest::from_remote_json(&body).unwrap();
        assert_eq!(m.stations.len(), 2);
        let paths: Vec<_> = m.stations[0].files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                format!("{TOKEN}/Ana_01.ogg"),
                format!("{TOKEN}/Ana_01-lowpass.ogg"),
                format!("{TOKEN}/Ana_02.ogg"),
            ]
        );
        assert_eq!(m.stations[0].name.as_deref(), Some("Ana_"));
        assert_eq!(m.stations[0].token.as_deref(), Some(TOKEN));
        assert_eq!(m.stations[1].files.len(), 1);
        assert_eq!(m.stations[1].frequency, Some(1050));
    }

    #[test]
    fn test_bad_digest_rejects_payload() {
        let body = r#"[{"path": "a/b01.ogg", "hash": "nope"}]"#;
        assert!(SyncManifest::from_remote_json(body).is_err());
    }

    #[test]
    fn test_validate_relative_path() {
        assert!(validate_relative_path(&format!("{TOKEN}/Radio_01.ogg")).is_ok());
        assert!(validate_relative_path("../etc/passwd").is_err());
        assert!(validate_relative_path("/abs/file.ogg").is_err());
        assert!(validate_relative_path("a//b.ogg").is_err());
        assert!(validate_relative_path("a/./b.ogg").is_err());
        assert!(validate_relative_path("a/.").is_err());
        assert!(validate_relative_path("./a.ogg").is_err());
        assert!(validate_relative_path("a/../b.ogg").is_err());
        assert!(validate_relative_path("a/.b.ogg").is_ok());
        assert!(validate_relative_path("").is_err());
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let p = temp_path_for(Path::new("root/tok/a01.ogg"));
        assert_eq!(p, Path::new("root/tok/.a01.ogg.part"));
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("stations.json");
        let m = SyncManifest::new(vec![StationEntry {
            name: Some("Radio".into()),
            token: Some(TOKEN.into()),
            frequency: None,
            files: vec![FileEntry {
                path: format!("{TOKEN}/Radio_01.ogg"),
                hash: H1.parse().unwrap(),
            }],
        }]);
        m.save(&path).await.unwrap();
        assert!(!temp_path_for(&path).exists());
        assert_eq!(SyncManifest::load(&path), m);
    }

    #[test]
    fn test_load_missing_or_corrupt_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(SyncManifest::load(&dir.path().join("none.json")).is_empty());
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert!(SyncManifest::load(&bad).is_empty());
    }
}
