//! Error types for cadence-core.
//!
//! Environmental failures (transport, decode) never reach the caller of
//! `load_audio`; they land the controller in `PlaybackState::Error`.
//! Contract violations (`InvalidPosition`, `InvalidOperation`) and genuine
//! engine faults are returned to the immediate caller.

use thiserror::Error;

/// The byte source could not produce the requested bytes.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("source not found: {0}")]
    NotFound(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(String),

    #[error("source exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("unsupported locator: {0}")]
    Unsupported(String),
}

/// The bytes could not be turned into a playable asset.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unsupported or unrecognized format: {0}")]
    UnsupportedFormat(String),

    #[error("no playable audio track")]
    NoTrack,

    #[error("malformed audio data: {0}")]
    Malformed(String),

    /// Decoded cleanly but holds no audio. Rejected so progress is never
    /// computed against a zero duration.
    #[error("decoded asset has zero duration")]
    Empty,
}

/// Failure reported by a playback engine adapter.
///
/// `NotRunning` and `NotConnected` describe a stream that is already in the
/// requested condition; the controller treats them as benign.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("stream is not running")]
    NotRunning,

    #[error("stream is not connected")]
    NotConnected,

    #[error("output device error: {0}")]
    Device(String),

    #[error("engine fault: {0}")]
    Fault(String),
}

impl EngineError {
    /// True when the error only says the stream was already stopped/released.
    pub fn is_benign(&self) -> bool {
        matches!(self, EngineError::NotRunning | EngineError::NotConnected)
    }
}

/// Why a load ended in `PlaybackState::Error`.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("decode: {0}")]
    Decode(#[from] DecodeError),
}

/// Errors returned by controller operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlayerError {
    #[error("position {position}s is outside 0..={duration}s")]
    InvalidPosition { position: f64, duration: f64 },

    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benign_engine_errors() {
        assert!(EngineError::NotRunning.is_benign());
        assert!(EngineError::NotConnected.is_benign());
        assert!(!EngineError::Device("gone".into()).is_benign());
        assert!(!EngineError::Fault("boom".into()).is_benign());
    }

    #[test]
    fn engine_fault_converts_to_player_error() {
        let err: PlayerError = EngineError::Fault("boom".into()).into();
        assert_eq!(err.to_string(), "engine fault: boom");
    }

    #[test]
    fn invalid_position_message() {
        let err = PlayerError::InvalidPosition { position: 12.0, duration: 10.0 };
        assert_eq!(err.to_string(), "position 12s is outside 0..=10s");
    }
}
