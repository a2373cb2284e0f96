//! Book data model — hotspots, the book manifest, and repeat ranges.
//!
//! All structs implement `Serialize`, `Deserialize` and `Clone` so a book
//! can be round-tripped through a `book.json` manifest and shared across
//! threads.  A [`Book`] is immutable once loaded; the playback engine only
//! ever reads it.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Hotspot
// ---------------------------------------------------------------------------

/// A page-relative rectangular region bound to a time range within one
/// audio asset.
///
/// Coordinates are percentages of the rendered page bounds (`0.0 – 100.0`),
/// so hotspots are resolution-independent.  `audio_start` / `audio_end` are
/// seconds into `audio_file`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    /// Unique identifier within the book (e.g. `"p3-title"`).
    pub id: String,
    /// 1-based page number this hotspot belongs to.
    pub page_number: u32,
    /// Left edge, percent of page width.
    pub x: f32,
    /// Top edge, percent of page height.
    pub y: f32,
    /// Width, percent of page width.
    pub width: f32,
    /// Height, percent of page height.
    pub height: f32,
    /// Filename of the audio asset this hotspot's narration lives in.
    pub audio_file: String,
    /// Segment start within `audio_file`, in seconds.
    pub audio_start: f64,
    /// Segment end within `audio_file`, in seconds.
    pub audio_end: f64,
}

impl Hotspot {
    /// Segment start offset rounded to the nearest millisecond.
    pub fn start_ms(&self) -> u64 {
        secs_to_ms(self.audio_start)
    }

    /// Segment end offset rounded to the nearest millisecond.
    pub fn end_ms(&self) -> u64 {
        secs_to_ms(self.audio_end)
    }

    /// Segment length in seconds.  May be zero or negative for malformed
    /// authoring data; such hotspots are dropped at sprite-index build time
    /// rather than rejected at load.
    pub fn duration_secs(&self) -> f64 {
        self.audio_end - self.audio_start
    }

    /// Segment length as a [`Duration`], or `None` when non-positive.
    pub fn duration(&self) -> Option<Duration> {
        let secs = self.duration_secs();
        if secs > 0.0 {
            Some(Duration::from_millis(secs_to_ms(secs)))
        } else {
            None
        }
    }

    /// Whether the page-percentage point `(x, y)` falls inside this
    /// hotspot's bounds (edges inclusive).
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}

/// Convert non-negative seconds to whole milliseconds, rounding half up.
fn secs_to_ms(secs: f64) -> u64 {
    (secs.max(0.0) * 1000.0).round() as u64
}

// ---------------------------------------------------------------------------
// BookError
// ---------------------------------------------------------------------------

/// Structural problems detected when validating a loaded book manifest.
#[derive(Debug, Clone, Error)]
pub enum BookError {
    /// Two hotspots share the same id.
    #[error("duplicate hotspot id: {0}")]
    DuplicateHotspotId(String),

    /// A hotspot's page number is zero (pages are 1-based).
    #[error("hotspot {0} has page number 0 (pages are 1-based)")]
    InvalidPageNumber(String),

    /// A hotspot's bounding box lies outside the 0–100 percent page bounds.
    #[error("hotspot {0} has a bounding box outside the page bounds")]
    InvalidBounds(String),
}

// ---------------------------------------------------------------------------
// Book
// ---------------------------------------------------------------------------

/// A loaded book: metadata plus all authored hotspots.
///
/// Hotspot order is authoring order and carries no semantic meaning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    /// Display title.
    pub title: String,
    /// Filename of the page-rendering asset (consumed by the excluded
    /// rendering collaborator; the engine never opens it).
    pub pdf_asset: String,
    /// All authored hotspots, in authoring order.
    pub hotspots: Vec<Hotspot>,
    /// Optional whole-book narration asset (e.g. background track).
    #[serde(default)]
    pub default_audio_file: Option<String>,
}

impl Book {
    /// Validate structural invariants of the manifest.
    ///
    /// Non-positive segment durations are deliberately **not** an error
    /// here — they are unplayable and get dropped when the sprite index is
    /// built, so a single bad timestamp never blocks the whole book.
    pub fn validate(&self) -> Result<(), BookError> {
        let mut seen = BTreeSet::new();
        for hotspot in &self.hotspots {
            if !seen.insert(hotspot.id.as_str()) {
                return Err(BookError::DuplicateHotspotId(hotspot.id.clone()));
            }
            if hotspot.page_number == 0 {
                return Err(BookError::InvalidPageNumber(hotspot.id.clone()));
            }
            let in_bounds = |v: f32| (0.0..=100.0).contains(&v);
            if !in_bounds(hotspot.x)
                || !in_bounds(hotspot.y)
                || !in_bounds(hotspot.width)
                || !in_bounds(hotspot.height)
                || hotspot.x + hotspot.width > 100.0 + f32::EPSILON * 100.0
                || hotspot.y + hotspot.height > 100.0 + f32::EPSILON * 100.0
            {
                return Err(BookError::InvalidBounds(hotspot.id.clone()));
            }
        }
        Ok(())
    }

    /// Look up a hotspot by id.
    pub fn hotspot(&self, id: &str) -> Option<&Hotspot> {
        self.hotspots.iter().find(|h| h.id == id)
    }

    /// All hotspots on the given 1-based page, in authoring order.
    pub fn hotspots_on_page(&self, page_number: u32) -> impl Iterator<Item = &Hotspot> {
        self.hotspots
            .iter()
            .filter(move |h| h.page_number == page_number)
    }

    /// Topmost hotspot under the page-percentage point `(x, y)`, if any.
    ///
    /// "Topmost" means last in authoring order, matching how overlapping
    /// regions stack when rendered.
    pub fn hotspot_at(&self, page_number: u32, x: f32, y: f32) -> Option<&Hotspot> {
        self.hotspots_on_page(page_number)
            .filter(|h| h.contains(x, y))
            .last()
    }

    /// The set of distinct audio filenames the book references, including
    /// the optional default narration file.
    pub fn audio_files(&self) -> BTreeSet<String> {
        let mut files: BTreeSet<String> = self
            .hotspots
            .iter()
            .map(|h| h.audio_file.clone())
            .collect();
        if let Some(default) = &self.default_audio_file {
            files.insert(default.clone());
        }
        files
    }
}

// ---------------------------------------------------------------------------
// RepeatRange
// ---------------------------------------------------------------------------

/// A validated-by-construction *pair* of hotspots selected for looping.
///
/// Both endpoints reference the same `audio_file` (the selector enforces
/// this).  The span may still be non-positive when the endpoints were
/// tapped in reverse offset order — the loop controller rejects that case
/// rather than silently swapping the endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct RepeatRange {
    /// The chronologically first-tapped endpoint.
    pub start: Hotspot,
    /// The chronologically second-tapped endpoint.
    pub end: Hotspot,
}

impl RepeatRange {
    /// Playback span in seconds: `end.audio_end - start.audio_start`.
    ///
    /// Zero or negative when the endpoints were tapped in reverse offset
    /// order; callers must validate before scheduling.
    pub fn span_secs(&self) -> f64 {
        self.end.audio_end - self.start.audio_start
    }

    /// Span start offset in milliseconds.
    pub fn start_ms(&self) -> u64 {
        self.start.start_ms()
    }

    /// Span length in milliseconds, or `None` when non-positive.
    pub fn duration_ms(&self) -> Option<u64> {
        let secs = self.span_secs();
        if secs > 0.0 {
            Some(secs_to_ms(secs))
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
