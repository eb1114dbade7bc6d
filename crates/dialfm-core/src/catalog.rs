//! Frequency → station index built from the manifest.
//!
//! The index is immutable once built. A sync produces a brand new index which
//! the owner swaps in whole (`Arc<FrequencyIndex>`); nothing ever patches a
//! live one.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::frequency;
use crate::manifest::{validate_relative_path, ContentHash, StationEntry};

/// Inserted before the extension to name the muffled "nearby" rendition.
pub const NEARBY_SUFFIX: &str = "-lowpass";

const UUID_PATTERN: &str =
    "[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}";

fn track_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // <owner-token>/<name><NN>.<ext>
        Regex::new(&format!(r"^({})/([^/]+)([0-9][0-9])\.\w+$", UUID_PATTERN))
            .expect("track path pattern is valid")
    })
}

// ── identity ──────────────────────────────────────────────────────────────────

/// A station's identity. Its frequency is always derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StationId {
    pub owner_token: String,
    pub name: String,
}

impl StationId {
    pub fn new(owner_token: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner_token: owner_token.into(),
            name: name.into(),
        }
    }

    pub fn frequency(&self) -> u16 {
        frequency::assign(&self.owner_token, &self.name)
    }

    /// Name for the display: the server writes `<name>_<NN>`, so the parsed
    /// name usually ends in the `_` separator.
    pub fn display_name(&self) -> &str {
        let trimmed = self.name.trim_end_matches('_');
        if trimmed.is_empty() {
            &self.name
        } else {
            trimmed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPath {
    pub id: StationId,
    /// Two-digit track number from the file name.
    pub number: u8,
}

/// Extract `(owner_token, name)` from `<owner-token>/<name><NN>.<ext>`.
pub fn parse_track_path(path: &str) -> Option<ParsedPath> {
    let caps = track_path_regex().captures(path)?;
    Some(ParsedPath {
        id: StationId::new(&caps[1], &caps[2]),
        number: caps[3].parse().ok()?,
    })
}

/// `tok/Radio_01.ogg` → `tok/Radio_01-lowpass.ogg`. The suffix goes before
/// the last `.` of the file name, or at the end when there is none.
pub fn nearby_path_for(path: &str) -> String {
    let file_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[file_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let at = file_start + dot;
            format!("{}{}{}", &path[..at], NEARBY_SUFFIX, &path[at..])
        }
        _ => format!("{}{}", path, NEARBY_SUFFIX),
    }
}

/// Inverse of [`nearby_path_for`]; `None` if `path` is not a nearby variant.
pub fn primary_path_of_nearby(path: &str) -> Option<String> {
    let file_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let file = &path[file_start..];
    let stem_end = match file.rfind('.') {
        Some(dot) if dot > 0 => dot,
        _ => file.len(),
    };
    let stem = file[..stem_end].strip_suffix(NEARBY_SUFFIX)?;
    Some(format!("{}{}{}", &path[..file_start], stem, &file[stem_end..]))
}

pub fn is_nearby_variant(path: &str) -> bool {
    primary_path_of_nearby(path).is_some()
}

// ── tracks ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Relative to the recordings root.
    pub path: String,
    pub hash: ContentHash,
}

impl Track {
    pub fn primary_path(&self) -> &str {
        &self.path
    }

    /// Not guaranteed to exist on disk.
    pub fn nearby_path(&self) -> String {
        nearby_path_for(&self.path)
    }
}

/// One station's ordered tracks. Shared by `Arc`; the playback machine uses
/// pointer identity of that `Arc` to tell "same station as before" apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSet {
    pub station: StationId,
    pub tracks: Vec<Track>,
}

impl TrackSet {
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn frequency(&self) -> u16 {
        self.station.frequency()
    }
}

// ── index ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrequencyIndex {
    buckets: HashMap<u16, Vec<Arc<TrackSet>>>,
}

impl FrequencyIndex {
    /// Build from manifest stations. Bad paths are skipped with a warning;
    /// bucket order is manifest order.
    pub fn build(stations: &[StationEntry]) -> Self {
        let sets = stations.iter().filter_map(track_set_from_entry);
        let index = Self::from_track_sets(sets);
        info!(
            "catalog: {} stations on {} frequencies",
            index.station_count(),
            index.buckets.len()
        );
        index
    }

    /// Bucket already-parsed track sets by their derived frequency,
    /// preserving input order within each bucket. Empty sets are dropped.
    pub fn from_track_sets(sets: impl IntoIterator<Item = TrackSet>) -> Self {
        let mut buckets: HashMap<u16, Vec<Arc<TrackSet>>> = HashMap::new();
        for set in sets {
            if set.is_empty() {
                continue;
            }
            buckets
                .entry(set.frequency())
                .or_default()
                .push(Arc::new(set));
        }
        Self { buckets }
    }

    pub fn lookup(&self, freq: u16) -> Option<&[Arc<TrackSet>]> {
        self.buckets.get(&freq).map(|v| v.as_slice())
    }

    pub fn contains(&self, freq: u16) -> bool {
        self.buckets.contains_key(&freq)
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn station_count(&self) -> usize {
        self.buckets.values().map(|b| b.len()).sum()
    }

    /// Occupied frequencies, ascending.
    pub fn frequencies(&self) -> Vec<u16> {
        let mut freqs: Vec<u16> = self.buckets.keys().copied().collect();
        freqs.sort_unstable();
        freqs
    }
}

fn track_set_from_entry(entry: &StationEntry) -> Option<TrackSet> {
    let mut station: Option<StationId> = None;
    let mut tracks = Vec::new();

    for file in &entry.files {
        if let Err(e) = validate_relative_path(&file.path) {
            warn!("catalog: skipping {}", e);
            continue;
        }
        if is_nearby_variant(&file.path) {
            continue;
        }
        let Some(parsed) = parse_track_path(&file.path) else {
            warn!("catalog: skipping unrecognised path {:?}", file.path);
            continue;
        };
        match &station {
            None => station = Some(parsed.id),
            Some(id) if *id != parsed.id => {
                warn!(
                    "catalog: {:?} belongs to {}/{}, not {}/{}; skipping",
                    file.path, parsed.id.owner_token, parsed.id.name, id.owner_token, id.name
                );
                continue;
            }
            Some(_) => {}
        }
        tracks.push(Track {
            path: file.path.clone(),
            hash: file.hash,
        });
    }

    let station = station?;
    let freq = station.frequency();
    if let Some(remote) = entry.frequency {
        if remote != freq {
            debug!(
                "catalog: {} advertised at {} but derives to {}",
                station.name, remote, freq
            );
        }
    }
    Some(TrackSet { station, tracks })
}
