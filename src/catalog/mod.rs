//! Static song catalog, loaded once at process start

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

/// Catalog entry for a single chart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongInfo {
    pub title: String,
    pub base_duration_secs: u32,
}

/// On-disk catalog record: `{ "<song_id>": { "name_en": "...", "time": 142 } }`
#[derive(Debug, Deserialize)]
struct RawSongInfo {
    name_en: String,
    time: u32,
}

/// Read-only song lookup table keyed by song identifier
#[derive(Debug, Default)]
pub struct SongCatalog {
    songs: HashMap<String, SongInfo>,
}

impl SongCatalog {
    /// Load the catalog from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|source| CatalogError::Io { path: path.as_ref().display().to_string(), source })?;
        Self::from_json(&raw)
    }

    /// Parse a catalog from its JSON representation
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let raw: HashMap<String, RawSongInfo> = serde_json::from_str(json)?;
        let songs = raw
            .into_iter()
            .map(|(id, info)| {
                (
                    id,
                    SongInfo {
                        title: info.name_en,
                        base_duration_secs: info.time,
                    },
                )
            })
            .collect();
        Ok(Self { songs })
    }

    /// Build a catalog from already-resolved entries (used by tests)
    pub fn from_songs(songs: impl IntoIterator<Item = (String, SongInfo)>) -> Self {
        Self {
            songs: songs.into_iter().collect(),
        }
    }

    pub fn lookup(&self, song_id: &str) -> Option<&SongInfo> {
        self.songs.get(song_id)
    }

    /// Display title for a song id, falling back to the raw id on a catalog miss
    pub fn title_or_id(&self, song_id: &str) -> String {
        self.lookup(song_id)
            .map(|s| s.title.clone())
            .unwrap_or_else(|| song_id.to_string())
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }
}

/// Catalog loading errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_catalog_json() {
        let catalog = SongCatalog::from_json(
            r#"{
                "grievouslady": { "name_en": "Grievous Lady", "time": 141 },
                "fractureray": { "name_en": "Fracture Ray", "time": 137 }
            }"#,
        )
        .unwrap();

        assert_eq!(catalog.len(), 2);
        let song = catalog.lookup("grievouslady").unwrap();
        assert_eq!(song.title, "Grievous Lady");
        assert_eq!(song.base_duration_secs, 141);
    }

    #[test]
    fn unknown_song_falls_back_to_raw_id() {
        let catalog = SongCatalog::default();
        assert!(catalog.lookup("missing").is_none());
        assert_eq!(catalog.title_or_id("missing"), "missing");
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(SongCatalog::from_json("{ not json").is_err());
        assert!(SongCatalog::from_json(r#"{"x": {"name_en": 3}}"#).is_err());
    }
}
