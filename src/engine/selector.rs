//! Repeat-range selection.
//!
//! In repeat mode the reader's first two taps choose an inclusive range
//! of audio: from the start of the first tapped hotspot's segment to the
//! end of the second's.  [`RepeatRangeSelector`] is the small state
//! machine behind that, with two rejection paths:
//!
//! * endpoints on different audio files keep the first endpoint and wait
//!   for a compatible second tap;
//! * a non-positive span (second endpoint ends at or before the first
//!   begins) discards the whole selection.

use thiserror::Error;

use crate::book::{Hotspot, RepeatRange};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum SelectionState {
    /// No endpoint chosen yet.
    AwaitingStart,
    /// First endpoint chosen; waiting for the second.
    AwaitingEnd { start: Hotspot },
}

/// What a selection tap produced.
#[derive(Debug)]
pub enum TapOutcome {
    /// First endpoint accepted.
    StartSet,
    /// Second endpoint accepted; the selector has reset itself.
    RangeComplete { range: RepeatRange },
}

#[derive(Debug, Error, PartialEq)]
pub enum SelectorError {
    /// Both endpoints must live on the same audio file.  The first
    /// endpoint is kept.
    #[error("range endpoints must share one audio file (start is on {expected}, tap was on {got})")]
    IncompatibleRange { expected: String, got: String },

    /// The chosen endpoints span no audio.  Selection starts over.
    #[error("repeat range spans no audio ({span_secs:.3} s)")]
    InvalidRepeatRange { span_secs: f64 },
}

// ---------------------------------------------------------------------------
// RepeatRangeSelector
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct RepeatRangeSelector {
    state: SelectionState,
}

impl RepeatRangeSelector {
    pub fn new() -> Self {
        Self {
            state: SelectionState::AwaitingStart,
        }
    }

    /// Feed one tap into the selection.
    ///
    /// Tap order is authoritative: the first tap is always the range
    /// start, the second always the end, even when the reader taps
    /// "backwards" on the page.
    pub fn tap(&mut self, hotspot: Hotspot) -> Result<TapOutcome, SelectorError> {
        match &self.state {
            SelectionState::AwaitingStart => {
                log::debug!("range start set to {}", hotspot.id);
                self.state = SelectionState::AwaitingEnd { start: hotspot };
                Ok(TapOutcome::StartSet)
            }
            SelectionState::AwaitingEnd { start } => {
                if hotspot.audio_file != start.audio_file {
                    return Err(SelectorError::IncompatibleRange {
                        expected: start.audio_file.clone(),
                        got: hotspot.audio_file,
                    });
                }

                let span_secs = hotspot.audio_end - start.audio_start;
                if span_secs <= 0.0 {
                    self.state = SelectionState::AwaitingStart;
                    return Err(SelectorError::InvalidRepeatRange { span_secs });
                }

                let range = RepeatRange {
                    start: start.clone(),
                    end: hotspot,
                };
                self.state = SelectionState::AwaitingStart;
                Ok(TapOutcome::RangeComplete { range })
            }
        }
    }

    /// Discard any partial selection.
    pub fn reset(&mut self) {
        self.state = SelectionState::AwaitingStart;
    }

    /// Id of the pending first endpoint, if one is set.
    pub fn pending_start(&self) -> Option<&str> {
        match &self.state {
            SelectionState::AwaitingEnd { start } => Some(&start.id),
            SelectionState::AwaitingStart => None,
        }
    }
}

impl Default for RepeatRangeSelector {
    fn default() -> Self {
        Self::new()
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
            width: 0.1,
            height: 0.1,
            audio_file: file.into(),
            audio_start: start,
            audio_end: end,
        }
    }

    #[test]
    fn two_taps_complete_a_range() {
        let mut selector = RepeatRangeSelector::new();

        assert!(matches!(
            selector.tap(hotspot("h1", "page1.wav", 1.0, 2.0)),
            Ok(TapOutcome::StartSet)
        ));
        assert_eq!(selector.pending_start(), Some("h1"));

        match selector.tap(hotspot("h2", "page1.wav", 3.0, 4.0)) {
            Ok(TapOutcome::RangeComplete { range }) => {
                assert_eq!(range.start.id, "h1");
                assert_eq!(range.end.id, "h2");
                assert!((range.span_secs() - 3.0).abs() < 1e-9);
            }
            other => panic!("expected RangeComplete, got {other:?}"),
        }

        // Completion resets the selector for the next selection.
        assert_eq!(selector.pending_start(), None);
    }

    #[test]
    fn cross_file_tap_keeps_the_start() {
        let mut selector = RepeatRangeSelector::new();
        selector.tap(hotspot("h1", "page1.wav", 1.0, 2.0)).unwrap();

        let err = selector
            .tap(hotspot("h9", "page2.wav", 0.0, 1.0))
            .unwrap_err();
        assert_eq!(
            err,
            SelectorError::IncompatibleRange {
                expected: "page1.wav".into(),
                got: "page2.wav".into(),
            }
        );

        // Still awaiting a compatible end; the start survives.
        assert_eq!(selector.pending_start(), Some("h1"));
        assert!(matches!(
            selector.tap(hotspot("h2", "page1.wav", 3.0, 4.0)),
            Ok(TapOutcome::RangeComplete { .. })
        ));
    }

    #[test]
    fn empty_span_discards_the_selection() {
        let mut selector = RepeatRangeSelector::new();
        selector.tap(hotspot("h5", "page1.wav", 6.0, 8.0)).unwrap();

        // Second endpoint ends before the first begins.
        let err = selector
            .tap(hotspot("h1", "page1.wav", 1.0, 2.0))
            .unwrap_err();
        assert!(matches!(err, SelectorError::InvalidRepeatRange { .. }));

        // Selection starts over from scratch.
        assert_eq!(selector.pending_start(), None);
    }

    #[test]
    fn same_hotspot_twice_is_a_valid_one_segment_range() {
        let mut selector = RepeatRangeSelector::new();
        let h = hotspot("h3", "page1.wav", 2.0, 3.5);

        selector.tap(h.clone()).unwrap();
        match selector.tap(h) {
            Ok(TapOutcome::RangeComplete { range }) => {
                assert!((range.span_secs() - 1.5).abs() < 1e-9);
            }
            other => panic!("expected RangeComplete, got {other:?}"),
        }
    }

    #[test]
    fn reset_clears_a_partial_selection() {
        let mut selector = RepeatRangeSelector::new();
        selector.tap(hotspot("h1", "page1.wav", 1.0, 2.0)).unwrap();

        selector.reset();
        assert_eq!(selector.pending_start(), None);
        assert!(matches!(
            selector.tap(hotspot("h2", "page1.wav", 3.0, 4.0)),
            Ok(TapOutcome::StartSet)
        ));
    }
}
