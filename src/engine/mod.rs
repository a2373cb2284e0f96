//! Playback engine — taps in, audio and events out.
//!
//! # Architecture
//!
//! ```text
//! frontend ──EngineCommand──▶ PlaybackEngine (one tokio task)
//!                                │  ├─ PlaybackCoordinator (players + queue)
//!                                │  ├─ RepeatRangeSelector
//!                                │  └─ RepeatLoopController
//!    ◀──EngineEvent──────────────┘
//! ```
//!
//! The engine owns all playback state and is the only task that touches
//! it; timers deliver their expirations through the same channel as
//! commands, stamped with a generation counter so stale wake-ups are
//! dropped.

pub mod command;
pub mod coordinator;
pub mod repeat;
pub mod runner;
pub mod selector;
pub mod session;

pub use command::{EngineCommand, EngineEvent};
pub use coordinator::{ActivationError, ActivationOutcome, PlaybackCoordinator};
pub use repeat::{LoopError, LoopState, RepeatLoopController};
pub use runner::{EngineHandle, PlaybackEngine};
pub use selector::{RepeatRangeSelector, SelectorError, TapOutcome};
pub use session::{PlaybackMode, SessionSnapshot};
