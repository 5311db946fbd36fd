//! Playback state and load outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// Controller state. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Finished,
    Error,
}

impl PlaybackState {
    /// States in which a playback session exists.
    pub fn has_session(self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Paused)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading => "loading",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Finished => "finished",
            PlaybackState::Error => "error",
        };
        f.write_str(s)
    }
}

/// How a `load_audio` call resolved.
///
/// Failures are already reflected in the controller state; this value is
/// informational for the caller that waited on the load.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded { duration: f64 },
    Failed(LoadError),
    /// A later `load_audio` call took over before this one finished.
    Superseded,
}

impl LoadOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded { .. })
    }

    pub fn to_value(&self) -> serde_json::Value {
        match self {
            LoadOutcome::Loaded { duration } => {
                serde_json::json!({"outcome": "loaded", "duration": duration})
            }
            LoadOutcome::Failed(e) => {
                serde_json::json!({"outcome": "failed", "error": e.to_string()})
            }
            LoadOutcome::Superseded => serde_json::json!({"outcome": "superseded"}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;

    #[test]
    fn state_serializes_lowercase() {
        let v = serde_json::to_value(PlaybackState::Finished).unwrap();
        assert_eq!(v, "finished");
        let back: PlaybackState = serde_json::from_value("paused".into()).unwrap();
        assert_eq!(back, PlaybackState::Paused);
    }

    #[test]
    fn only_playing_and_paused_hold_sessions() {
        assert!(PlaybackState::Playing.has_session());
        assert!(PlaybackState::Paused.has_session());
        assert!(!PlaybackState::Idle.has_session());
        assert!(!PlaybackState::Finished.has_session());
    }

    #[test]
    fn outcome_json() {
        let v = LoadOutcome::Loaded { duration: 2.5 }.to_value();
        assert_eq!(v["outcome"], "loaded");
        assert_eq!(v["duration"], 2.5);

        let v = LoadOutcome::Failed(DecodeError::NoTrack.into()).to_value();
        assert_eq!(v["outcome"], "failed");
        assert_eq!(v["error"], "decode: no playable audio track");
    }
}
