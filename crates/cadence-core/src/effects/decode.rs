//! Symphonia decoder: probe, then decode every packet into one buffer.
//!
//! Supports whatever the enabled symphonia features cover (MP3, FLAC, AAC,
//! OGG, WAV, ALAC, PCM). Corrupt packets are skipped, the rest of the track
//! still plays.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::effects::AudioDecoder;
use crate::error::DecodeError;
use crate::models::AudioAsset;

#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, bytes: Vec<u8>, hint: Option<&str>) -> Result<AudioAsset, DecodeError> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut probe_hint = Hint::new();
        if let Some(ext) = hint {
            probe_hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &probe_hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

        let mut format = probed.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoTrack)?;
        let track_id = track.id;

        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
        let mut channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(0);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

        let mut samples: Vec<f32> = Vec::new();
        let mut skipped = 0usize;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(DecodeError::Malformed(e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(msg)) => {
                    skipped += 1;
                    log::debug!("cadence: skipping corrupt packet: {}", msg);
                    continue;
                }
                Err(e) => return Err(DecodeError::Malformed(e.to_string())),
            };

            let spec = *decoded.spec();
            sample_rate = spec.rate;
            channels = spec.channels.count() as u16;

            let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(sample_buf.samples());
        }

        if skipped > 0 {
            log::warn!("cadence: skipped {} corrupt packets", skipped);
        }
        if channels == 0 {
            return Err(DecodeError::Malformed("no channel layout".into()));
        }
        if samples.is_empty() || sample_rate == 0 {
            return Err(DecodeError::Empty);
        }

        let asset = AudioAsset::new(samples, sample_rate, channels);
        log::info!(
            "cadence: decoded {:.2}s ({}Hz, {}ch)",
            asset.duration(),
            sample_rate,
            channels
        );
        Ok(asset)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal 16-bit PCM WAV with a ramp signal.
    pub(crate) fn wav_bytes(sample_rate: u32, channels: u16, frames: u32) -> Vec<u8> {
        let block_align = channels as u32 * 2;
        let data_len = frames * block_align;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * block_align).to_le_bytes());
        out.extend_from_slice(&(block_align as u16).to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for i in 0..frames {
            let s = ((i % 200) as i16 - 100) * 100;
            for _ in 0..channels {
                out.extend_from_slice(&s.to_le_bytes());
            }
        }
        out
    }

    #[test]
    fn decodes_mono_wav() {
        let asset = SymphoniaDecoder::new()
            .decode(wav_bytes(8000, 1, 8000), Some("wav"))
            .unwrap();
        assert_eq!(asset.sample_rate(), 8000);
        assert_eq!(asset.channels(), 1);
        assert!((asset.duration() - 1.0).abs() < 0.01);
    }

    #[test]
    fn decodes_stereo_wav_without_hint() {
        let asset = SymphoniaDecoder::new()
            .decode(wav_bytes(22050, 2, 11025), None)
            .unwrap();
        assert_eq!(asset.channels(), 2);
        assert!((asset.duration() - 0.5).abs() < 0.01);
    }

    #[test]
    fn garbage_is_unsupported() {
        let err = SymphoniaDecoder::new()
            .decode(b"definitely not audio".to_vec(), None)
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedFormat(_)));
    }

    #[test]
    fn empty_wav_is_rejected() {
        assert!(SymphoniaDecoder::new()
            .decode(wav_bytes(8000, 1, 0), Some("wav"))
            .is_err());
    }
}
