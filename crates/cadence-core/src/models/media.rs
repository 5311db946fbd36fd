//! Decoded audio assets.

use std::sync::Arc;

/// A fully decoded track: interleaved `f32` samples plus format.
///
/// Cloning is cheap; the sample buffer is shared.
#[derive(Clone)]
pub struct AudioAsset {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl AudioAsset {
    pub fn new(samples: impl Into<Arc<[f32]>>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Silent asset of the given length. Handy for headless hosts and tests.
    pub fn silence(duration_secs: f64, sample_rate: u32, channels: u16) -> Self {
        let frames = (duration_secs.max(0.0) * sample_rate as f64).round() as usize;
        Self::new(vec![0.0f32; frames * channels.max(1) as usize], sample_rate, channels)
    }

    pub fn samples(&self) -> &Arc<[f32]> {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Total duration in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

impl std::fmt::Debug for AudioAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioAsset")
            .field("frames", &self.frames())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::AudioAsset;

    #[test]
    fn duration_from_frames() {
        let asset = AudioAsset::new(vec![0.0f32; 44100 * 2 * 3], 44100, 2);
        assert_eq!(asset.frames(), 44100 * 3);
        assert!((asset.duration() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn silence_has_requested_length() {
        let asset = AudioAsset::silence(10.0, 8000, 1);
        assert!((asset.duration() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn zero_rate_reports_zero_duration() {
        let asset = AudioAsset::new(vec![0.0f32; 4], 0, 1);
        assert_eq!(asset.duration(), 0.0);
    }
}
