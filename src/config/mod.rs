//! Configuration module for the storybook reader.
//!
//! Provides `ReaderConfig` (top-level settings), sub-configs for each
//! subsystem, `AppPaths` for cross-platform data directories, and TOML
//! persistence via `ReaderConfig::load` / `ReaderConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AudioSettings, LibrarySettings, ReaderConfig, RepeatSettings};
