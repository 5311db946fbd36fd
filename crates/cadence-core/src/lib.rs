//! cadence-core: single-track audio playback controller.
//!
//! One asset, one session at a time. The controller owns the state
//! machine; everything that touches bytes, codecs or devices is an effect
//! behind a trait.
//!
//! # Architecture
//!
//! ```text
//! Layer 0: Effects (byte sources, symphonia decode, cpal output, manual clock)
//! Layer 1: Controller (state machine, session bookkeeping, progress poller)
//! Layer 2: Hosts (CLI, embedders: issue commands, observe callbacks)
//! ```

pub mod config;
pub mod controller;
pub mod effects;
pub mod error;
pub mod metadata;
pub mod models;
mod poller;

pub use config::PlayerConfig;
pub use controller::{LoadHandle, PlaybackController};
pub use error::{
    ConfigError, DecodeError, EngineError, LoadError, PlayerError, TransportError,
};
pub use models::*;
