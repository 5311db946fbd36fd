//! Track tags for display, read with lofty.

use std::path::Path;

use lofty::prelude::*;
use lofty::probe::Probe;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackTags {
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    /// Container-reported duration, `None` when unknown.
    pub duration_secs: Option<f64>,
}

/// Read tags from a local file. Never fails: unreadable or untagged files
/// fall back to the file stem as the title.
pub fn read_tags(path: impl AsRef<Path>) -> TrackTags {
    let path = path.as_ref();
    let fallback_title = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Unknown")
        .to_string();

    let tagged = match Probe::open(path).and_then(|p| p.read()) {
        Ok(t) => t,
        Err(e) => {
            log::debug!("cadence: no tags for {}: {}", path.display(), e);
            return TrackTags {
                title: fallback_title,
                artist: None,
                album: None,
                genre: None,
                duration_secs: None,
            };
        }
    };

    let tag = tagged.primary_tag().or_else(|| tagged.first_tag());
    let duration = tagged.properties().duration().as_secs_f64();

    TrackTags {
        title: tag
            .and_then(|t| t.title().map(|s| s.to_string()))
            .unwrap_or(fallback_title),
        artist: tag.and_then(|t| t.artist().map(|s| s.to_string())),
        album: tag.and_then(|t| t.album().map(|s| s.to_string())),
        genre: tag.and_then(|t| t.genre().map(|s| s.to_string())),
        duration_secs: Some(duration).filter(|&d| d > 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::decode::tests::wav_bytes;
    use tempfile::TempDir;

    #[test]
    fn missing_file_uses_stem() {
        let tags = read_tags("/nonexistent/Some Song.flac");
        assert_eq!(tags.title, "Some Song");
        assert_eq!(tags.artist, None);
        assert_eq!(tags.duration_secs, None);
    }

    #[test]
    fn untagged_wav_reports_duration() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ramp.wav");
        std::fs::write(&path, wav_bytes(8000, 1, 16000)).unwrap();

        let tags = read_tags(&path);
        assert_eq!(tags.title, "ramp");
        let secs = tags.duration_secs.unwrap();
        assert!((secs - 2.0).abs() < 0.05, "duration {}", secs);
    }
}
