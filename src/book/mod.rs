//! Book data model and bundle loading.
//!
//! A book is a PDF plus a manifest of tappable [`Hotspot`] regions, each
//! mapped to a time slice of a narration audio file.  [`DirBookSource`]
//! loads the whole bundle (manifest, validation, WAV decoding) from a
//! directory.

pub mod model;
pub mod source;

pub use model::{Book, BookError, Hotspot, RepeatRange};
pub use source::{AssetFailure, BookSource, DirBookSource, LoadedBook, SourceError};
