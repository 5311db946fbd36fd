//! cadence data models.
//!
//! Plain types shared between the controller, the collaborators and hosts.
//! Nothing here talks to an engine.

pub mod media;
pub mod playback;

pub use media::AudioAsset;
pub use playback::{LoadOutcome, PlaybackState};
