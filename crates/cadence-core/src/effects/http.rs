//! HTTP byte source: fetch a whole remote file into memory.
//!
//! Feature-gated behind `http` to keep the default build minimal. The
//! request timeout lives here; the controller does not time out loads.

use crate::config::PlayerConfig;
use crate::effects::ByteSource;
use crate::error::TransportError;

pub struct HttpSource {
    agent: ureq::Agent,
    max_bytes: u64,
}

impl HttpSource {
    pub fn new(config: &PlayerConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(config.fetch_timeout())
            .build()
            .into();
        Self {
            agent,
            max_bytes: config.max_fetch_bytes,
        }
    }
}

impl ByteSource for HttpSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let mut response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| map_error(url, e, self.max_bytes))?;
        let bytes = response
            .body_mut()
            .with_config()
            .limit(self.max_bytes)
            .read_to_vec()
            .map_err(|e| map_error(url, e, self.max_bytes))?;
        log::debug!("cadence: fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes)
    }
}

fn map_error(url: &str, err: ureq::Error, limit: u64) -> TransportError {
    match err {
        ureq::Error::StatusCode(404) => TransportError::NotFound(url.to_string()),
        ureq::Error::BodyExceedsLimit(_) => TransportError::TooLarge { limit },
        ureq::Error::Io(e) => TransportError::Io(e),
        other => TransportError::Http(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_not_found() {
        let err = map_error("http://x/a.mp3", ureq::Error::StatusCode(404), 10);
        assert!(matches!(err, TransportError::NotFound(u) if u == "http://x/a.mp3"));
    }

    #[test]
    fn server_error_maps_to_http() {
        let err = map_error("http://x/a.mp3", ureq::Error::StatusCode(503), 10);
        assert!(matches!(err, TransportError::Http(_)));
    }

    #[test]
    fn oversize_body_maps_to_too_large() {
        let err = map_error("http://x/a.mp3", ureq::Error::BodyExceedsLimit(10), 10);
        assert!(matches!(err, TransportError::TooLarge { limit: 10 }));
    }

    #[test]
    fn unreachable_host_is_transport_error() {
        let source = HttpSource::new(&PlayerConfig {
            fetch_timeout_secs: Some(2),
            ..PlayerConfig::default()
        });
        assert!(source.fetch("http://127.0.0.1:9/track.mp3").is_err());
    }
}
