//! Collaborators the controller drives: byte sources, decoders, engines.
//!
//! The controller only sees these traits. Native implementations live in
//! submodules and are feature-gated the same way the crate is:
//! `native` for cpal output, `http` for remote byte sources.

use crate::error::{DecodeError, EngineError, TransportError};
use crate::models::AudioAsset;

/// Resolves an opaque locator into raw bytes.
///
/// Called on a loader thread, so blocking is fine.
pub trait ByteSource: Send + Sync {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>, TransportError>;
}

/// Turns raw bytes into a decoded asset.
///
/// `hint` is a lowercase file extension when the locator carried one.
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, bytes: Vec<u8>, hint: Option<&str>) -> Result<AudioAsset, DecodeError>;
}

/// Natural-completion callback handed to a stream.
pub type EndedHook = Box<dyn FnOnce() + Send + 'static>;

/// Output engine: a monotonic clock plus a factory for one-shot streams.
pub trait PlaybackEngine: Send + Sync {
    /// Engine clock in seconds. Monotonic, shared by all streams.
    fn now(&self) -> f64;

    fn create_stream(&self, asset: &AudioAsset) -> Result<Box<dyn OutputStream>, EngineError>;
}

/// One playback of an asset. Started once; a new position needs a new stream.
///
/// Implementations must not fire the ended hook from inside `start`, and a
/// stream that was stopped never fires it.
pub trait OutputStream: Send {
    fn on_ended(&mut self, hook: EndedHook);

    /// Begin producing sound from `offset` seconds into the asset.
    fn start(&mut self, offset: f64) -> Result<(), EngineError>;

    /// Stop producing sound. `Err(NotRunning)` when it already stopped.
    fn stop(&mut self) -> Result<(), EngineError>;

    /// Release the output resource. `Err(NotConnected)` when already released.
    fn disconnect(&mut self) -> Result<(), EngineError>;
}

/// Lowercase extension of the last path segment, ignoring query/fragment.
///
/// `"https://example.com/song.mp3?token=abc"` → `Some("mp3")`
pub fn extension_hint(locator: &str) -> Option<String> {
    let path = locator.split('?').next().unwrap_or(locator);
    let path = path.split('#').next().unwrap_or(path);
    let segment = path.rsplit(['/', '\\']).next()?;
    let ext = segment.rsplit('.').next()?;
    if ext == segment || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Check if a locator looks like an HTTP URL.
pub fn is_http_url(locator: &str) -> bool {
    locator.starts_with("http://") || locator.starts_with("https://")
}

#[cfg(feature = "native")]
pub mod audio;
pub mod decode;
#[cfg(feature = "http")]
pub mod http;
pub mod manual;
pub mod source;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_hint_strips_query() {
        assert_eq!(
            extension_hint("https://example.com/song.mp3?token=abc"),
            Some("mp3".into())
        );
    }

    #[test]
    fn extension_hint_plain_path() {
        assert_eq!(extension_hint("/music/Track.FLAC"), Some("flac".into()));
        assert_eq!(extension_hint("C:\\music\\a.wav"), Some("wav".into()));
    }

    #[test]
    fn extension_hint_none_without_dot() {
        assert_eq!(extension_hint("https://example.com/stream"), None);
        assert_eq!(extension_hint("trailing."), None);
    }

    #[test]
    fn is_http_url_checks_scheme() {
        assert!(is_http_url("https://example.com/song.mp3"));
        assert!(is_http_url("http://example.com/song.mp3"));
        assert!(!is_http_url("/home/user/song.mp3"));
        assert!(!is_http_url("song.mp3"));
    }
}
