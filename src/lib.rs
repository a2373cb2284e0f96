//! storytap — synchronized hotspot audio playback for point-and-listen
//! storybooks.
//!
//! A book bundle pairs a PDF with a manifest of tappable hotspot regions,
//! each mapped to a time slice of a narration recording.  This crate
//! loads the bundle, indexes the slices as audio sprites, and runs the
//! playback engine: tap-to-play with interruption, a sequential
//! queue-and-play mode, and a repeat mode that loops a reader-chosen
//! range with pause/resume.
//!
//! # Layers
//!
//! * [`book`] — manifest model, validation, bundle loading.
//! * [`audio`] — backend traits, the cpal output path, sprite index and
//!   per-file sprite players.
//! * [`engine`] — the playback engine task, its command/event surface,
//!   and the mode state machines.
//! * [`config`] — TOML settings and platform paths.

pub mod audio;
pub mod book;
pub mod config;
pub mod engine;

pub use book::{Book, Hotspot};
pub use engine::{EngineCommand, EngineEvent, EngineHandle, PlaybackEngine};
