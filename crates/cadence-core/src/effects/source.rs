//! Local byte sources and the locator dispatcher.

use std::io::Read;
use std::path::Path;

use crate::config::PlayerConfig;
use crate::error::TransportError;
use crate::effects::ByteSource;

/// Reads locators as filesystem paths. `file://` prefixes are accepted.
pub struct FileSource {
    max_bytes: u64,
}

impl FileSource {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

impl Default for FileSource {
    fn default() -> Self {
        Self::new(PlayerConfig::default().max_fetch_bytes)
    }
}

impl ByteSource for FileSource {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>, TransportError> {
        let raw = locator.strip_prefix("file://").unwrap_or(locator);
        let path = Path::new(raw);
        if !path.is_file() {
            return Err(TransportError::NotFound(raw.to_string()));
        }
        let file = std::fs::File::open(path)?;
        let mut bytes = Vec::new();
        // Read one past the limit to detect oversize files without trusting metadata.
        file.take(self.max_bytes + 1).read_to_end(&mut bytes)?;
        if bytes.len() as u64 > self.max_bytes {
            return Err(TransportError::TooLarge { limit: self.max_bytes });
        }
        log::debug!("cadence: read {} bytes from {}", bytes.len(), raw);
        Ok(bytes)
    }
}

/// Dispatches by scheme: `http(s)://` to the HTTP source when the `http`
/// feature is on, everything else to the filesystem.
pub struct LocatorSource {
    file: FileSource,
    #[cfg(feature = "http")]
    http: crate::effects::http::HttpSource,
}

impl LocatorSource {
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            file: FileSource::new(config.max_fetch_bytes),
            #[cfg(feature = "http")]
            http: crate::effects::http::HttpSource::new(config),
        }
    }
}

impl LocatorSource {
    #[cfg(feature = "http")]
    fn fetch_remote(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        self.http.fetch(url)
    }

    #[cfg(not(feature = "http"))]
    fn fetch_remote(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        Err(TransportError::Unsupported(format!(
            "{} (built without the http feature)",
            url
        )))
    }
}

impl ByteSource for LocatorSource {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>, TransportError> {
        if crate::effects::is_http_url(locator) {
            return self.fetch_remote(locator);
        }
        self.file.fetch(locator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_existing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"RIFFdata").unwrap();
        let bytes = FileSource::default()
            .fetch(file.path().to_str().unwrap())
            .unwrap();
        assert_eq!(bytes, b"RIFFdata");
    }

    #[test]
    fn accepts_file_scheme() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        let locator = format!("file://{}", file.path().display());
        assert_eq!(FileSource::default().fetch(&locator).unwrap(), b"abc");
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = FileSource::default().fetch("/nonexistent/track.wav").unwrap_err();
        assert!(matches!(err, TransportError::NotFound(_)));
    }

    #[test]
    fn oversize_file_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 64]).unwrap();
        let err = FileSource::new(16)
            .fetch(file.path().to_str().unwrap())
            .unwrap_err();
        assert!(matches!(err, TransportError::TooLarge { limit: 16 }));
    }

    #[test]
    fn locator_source_routes_paths_to_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"xyz").unwrap();
        let source = LocatorSource::new(&PlayerConfig::default());
        assert_eq!(source.fetch(file.path().to_str().unwrap()).unwrap(), b"xyz");
    }
}
