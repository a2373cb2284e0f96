//! Sprite index — maps hotspot ids to playable audio segments.
//!
//! A *sprite* is a named sub-segment of one audio asset, defined by a
//! start offset and a duration in milliseconds.  [`SpriteIndex::build`]
//! derives the per-asset sprite maps from a book's hotspots once the
//! session's audio assets have finished loading.
//!
//! Construction is pure and synchronous; the index never changes
//! mid-session (it is rebuilt only when a different book is loaded).

use std::collections::{HashMap, HashSet};

use crate::book::{Book, Hotspot};

// ---------------------------------------------------------------------------
// Sprite
// ---------------------------------------------------------------------------

/// One playable segment of an audio asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sprite {
    /// Offset of the segment start within its asset, in milliseconds.
    pub start_ms: u64,
    /// Segment length in milliseconds.  Always > 0; hotspots with a
    /// non-positive span never make it into the index.
    pub duration_ms: u64,
}

impl Sprite {
    /// Derive a sprite from a hotspot's time range.
    ///
    /// Returns `None` when the span is non-positive — such segments cannot
    /// be scheduled and are excluded from the index rather than treated as
    /// an error.
    pub fn from_hotspot(hotspot: &Hotspot) -> Option<Self> {
        if hotspot.duration_secs() <= 0.0 {
            return None;
        }
        Some(Self {
            start_ms: hotspot.start_ms(),
            duration_ms: hotspot.end_ms().saturating_sub(hotspot.start_ms()),
        })
    }
}

// ---------------------------------------------------------------------------
// SpriteIndex
// ---------------------------------------------------------------------------

/// Per-asset mapping of hotspot id → [`Sprite`].
///
/// Hotspots referencing an asset that never loaded are excluded; their
/// activation later fails with `MissingAudioAsset`.
#[derive(Debug, Default)]
pub struct SpriteIndex {
    assets: HashMap<String, HashMap<String, Sprite>>,
}

impl SpriteIndex {
    /// Build the index for `book`, restricted to assets that actually
    /// loaded.
    ///
    /// Hotspots with a non-positive duration are silently dropped (they
    /// cannot be scheduled); the drop is logged at debug level so authors
    /// can find them.
    pub fn build(book: &Book, loaded_files: &HashSet<String>) -> Self {
        let mut assets: HashMap<String, HashMap<String, Sprite>> = HashMap::new();

        for hotspot in &book.hotspots {
            if !loaded_files.contains(&hotspot.audio_file) {
                continue;
            }
            match Sprite::from_hotspot(hotspot) {
                Some(sprite) => {
                    assets
                        .entry(hotspot.audio_file.clone())
                        .or_default()
                        .insert(hotspot.id.clone(), sprite);
                }
                None => {
                    log::debug!(
                        "sprite index: dropping hotspot {} (non-positive span {:.3}s)",
                        hotspot.id,
                        hotspot.duration_secs()
                    );
                }
            }
        }

        Self { assets }
    }

    /// The sprite map for one asset, if any of its hotspots survived.
    pub fn sprites_for(&self, audio_file: &str) -> Option<&HashMap<String, Sprite>> {
        self.assets.get(audio_file)
    }

    /// Direct lookup of a single sprite.
    pub fn sprite(&self, audio_file: &str, hotspot_id: &str) -> Option<Sprite> {
        self.assets.get(audio_file)?.get(hotspot_id).copied()
    }

    /// Number of assets that have at least one sprite.
    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    /// Total number of sprites across all assets.
    pub fn sprite_count(&self) -> usize {
        self.assets.values().map(|m| m.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn hotspot(id: &str, file: &str, start: f64, end: f64) -> Hotspot {
        Hotspot {
            id: id.into(),
            page_number: 1,
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
            audio_file: file.into(),
            audio_start: start,
            audio_end: end,
        }
    }

    fn book_with(hotspots: Vec<Hotspot>) -> Book {
        Book {
            title: "t".into(),
            pdf_asset: "t.pdf".into(),
            hotspots,
            default_audio_file: None,
        }
    }

    fn loaded(files: &[&str]) -> HashSet<String> {
        files.iter().map(|f| f.to_string()).collect()
    }

    // ---- Sprite::from_hotspot ----------------------------------------------

    #[test]
    fn sprite_from_positive_span() {
        let sprite = Sprite::from_hotspot(&hotspot("h1", "a.wav", 2.0, 4.5)).unwrap();
        assert_eq!(sprite.start_ms, 2000);
        assert_eq!(sprite.duration_ms, 2500);
    }

    #[test]
    fn sprite_from_zero_span_is_none() {
        assert!(Sprite::from_hotspot(&hotspot("h1", "a.wav", 2.0, 2.0)).is_none());
    }

    #[test]
    fn sprite_from_negative_span_is_none() {
        assert!(Sprite::from_hotspot(&hotspot("h1", "a.wav", 4.0, 2.0)).is_none());
    }

    // ---- SpriteIndex::build ------------------------------------------------

    #[test]
    fn build_groups_by_asset() {
        let book = book_with(vec![
            hotspot("h1", "a.wav", 0.0, 1.0),
            hotspot("h2", "a.wav", 1.0, 2.0),
            hotspot("h3", "b.wav", 0.0, 1.0),
        ]);
        let index = SpriteIndex::build(&book, &loaded(&["a.wav", "b.wav"]));

        assert_eq!(index.asset_count(), 2);
        assert_eq!(index.sprite_count(), 3);
        assert_eq!(index.sprites_for("a.wav").unwrap().len(), 2);
        assert_eq!(index.sprite("b.wav", "h3").unwrap().duration_ms, 1000);
    }

    #[test]
    fn build_excludes_unloaded_assets() {
        let book = book_with(vec![
            hotspot("h1", "a.wav", 0.0, 1.0),
            hotspot("h2", "missing.wav", 0.0, 1.0),
        ]);
        let index = SpriteIndex::build(&book, &loaded(&["a.wav"]));

        assert_eq!(index.asset_count(), 1);
        assert!(index.sprites_for("missing.wav").is_none());
        assert!(index.sprite("missing.wav", "h2").is_none());
    }

    #[test]
    fn build_silently_drops_non_positive_spans() {
        let book = book_with(vec![
            hotspot("good", "a.wav", 0.0, 1.0),
            hotspot("zero", "a.wav", 1.0, 1.0),
            hotspot("negative", "a.wav", 3.0, 2.0),
        ]);
        let index = SpriteIndex::build(&book, &loaded(&["a.wav"]));

        assert_eq!(index.sprite_count(), 1);
        assert!(index.sprite("a.wav", "good").is_some());
        assert!(index.sprite("a.wav", "zero").is_none());
        assert!(index.sprite("a.wav", "negative").is_none());
    }

    #[test]
    fn build_with_no_loaded_assets_is_empty() {
        let book = book_with(vec![hotspot("h1", "a.wav", 0.0, 1.0)]);
        let index = SpriteIndex::build(&book, &loaded(&[]));
        assert_eq!(index.asset_count(), 0);
        assert_eq!(index.sprite_count(), 0);
    }
}
