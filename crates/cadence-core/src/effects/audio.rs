//! Native playback engine: cpal output over a fully decoded asset.
//!
//! Each stream owns an output thread (cpal streams are not `Send` on every
//! platform, so the stream is built and kept alive on that thread). The
//! cpal callback copies frames straight out of the asset buffer; when the
//! device cannot take the asset's rate, the remaining audio is resampled
//! once at start.
//!
//! The engine clock is a monotonic `Instant` shared by all streams.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;

use crate::effects::{EndedHook, OutputStream, PlaybackEngine};
use crate::error::EngineError;
use crate::models::AudioAsset;

/// How often the output thread checks for stop/drain.
const WATCH_PERIOD: Duration = Duration::from_millis(20);

pub struct CpalEngine {
    epoch: Instant,
}

impl CpalEngine {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for CpalEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackEngine for CpalEngine {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn create_stream(&self, asset: &AudioAsset) -> Result<Box<dyn OutputStream>, EngineError> {
        Ok(Box::new(CpalStream::new(asset.clone())))
    }
}

struct StreamShared {
    stop_signal: AtomicBool,
    running: AtomicBool,
    drained: AtomicBool,
    /// Next frame the callback will copy.
    cursor: AtomicUsize,
    hook: Mutex<Option<EndedHook>>,
}

struct CpalStream {
    asset: AudioAsset,
    shared: Arc<StreamShared>,
    started: bool,
    connected: bool,
    thread: Option<thread::JoinHandle<()>>,
}

impl CpalStream {
    fn new(asset: AudioAsset) -> Self {
        Self {
            asset,
            shared: Arc::new(StreamShared {
                stop_signal: AtomicBool::new(false),
                running: AtomicBool::new(false),
                drained: AtomicBool::new(false),
                cursor: AtomicUsize::new(0),
                hook: Mutex::new(None),
            }),
            started: false,
            connected: true,
            thread: None,
        }
    }

    /// Signal the output thread and drop the pending hook.
    ///
    /// The thread is not joined: it may be blocked delivering a completion
    /// into a caller that is holding locks while stopping us.
    fn halt(&mut self) {
        self.shared.stop_signal.store(true, Ordering::SeqCst);
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.hook.lock().take();
        self.thread.take();
    }
}

impl OutputStream for CpalStream {
    fn on_ended(&mut self, hook: EndedHook) {
        *self.shared.hook.lock() = Some(hook);
    }

    fn start(&mut self, offset: f64) -> Result<(), EngineError> {
        if !self.connected {
            return Err(EngineError::NotConnected);
        }
        if self.started {
            return Err(EngineError::Fault("stream already started".into()));
        }
        self.started = true;

        let asset = self.asset.clone();
        let shared = Arc::clone(&self.shared);
        let (ready_tx, ready_rx) = mpsc::channel();

        shared.running.store(true, Ordering::SeqCst);
        let handle = thread::Builder::new()
            .name("cadence-output".into())
            .spawn(move || run_output(asset, offset, shared, ready_tx))
            .map_err(|e| EngineError::Fault(format!("spawn output thread: {}", e)))?;
        self.thread = Some(handle);

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.halt();
                Err(e)
            }
            Err(_) => {
                self.halt();
                Err(EngineError::Fault("output thread exited during setup".into()))
            }
        }
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        let was_running = self.shared.running.swap(false, Ordering::SeqCst);
        self.shared.stop_signal.store(true, Ordering::SeqCst);
        self.shared.hook.lock().take();
        if was_running {
            Ok(())
        } else {
            Err(EngineError::NotRunning)
        }
    }

    fn disconnect(&mut self) -> Result<(), EngineError> {
        if !self.connected {
            return Err(EngineError::NotConnected);
        }
        self.connected = false;
        self.halt();
        Ok(())
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Output thread body: build the cpal stream, report setup, then keep it
/// alive until stopped or drained.
fn run_output(
    asset: AudioAsset,
    offset: f64,
    shared: Arc<StreamShared>,
    ready: mpsc::Sender<Result<(), EngineError>>,
) {
    let stream = match build_stream(&asset, offset, Arc::clone(&shared)) {
        Ok(stream) => stream,
        Err(e) => {
            log::error!("cadence: output setup failed: {}", e);
            shared.running.store(false, Ordering::SeqCst);
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    loop {
        if shared.stop_signal.load(Ordering::SeqCst) {
            break;
        }
        if shared.drained.load(Ordering::SeqCst) {
            // Let the device play out what the last callback queued.
            thread::sleep(WATCH_PERIOD);
            let hook = {
                let mut slot = shared.hook.lock();
                if shared.stop_signal.load(Ordering::SeqCst) {
                    None
                } else {
                    shared.running.store(false, Ordering::SeqCst);
                    slot.take()
                }
            };
            drop(stream);
            if let Some(hook) = hook {
                log::debug!("cadence: stream drained");
                hook();
            }
            return;
        }
        thread::sleep(WATCH_PERIOD);
    }

    drop(stream);
}

fn build_stream(
    asset: &AudioAsset,
    offset: f64,
    shared: Arc<StreamShared>,
) -> Result<cpal::Stream, EngineError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| EngineError::Device("no output device".into()))?;

    let track_rate = asset.sample_rate();
    let track_channels = asset.channels();

    let device_supports_track = device
        .supported_output_configs()
        .map(|configs| {
            configs.into_iter().any(|range| {
                range.sample_format() == cpal::SampleFormat::F32
                    && range.channels() >= track_channels
                    && range.min_sample_rate().0 <= track_rate
                    && range.max_sample_rate().0 >= track_rate
            })
        })
        .unwrap_or(false);

    let config: cpal::StreamConfig = if device_supports_track {
        cpal::StreamConfig {
            channels: track_channels,
            sample_rate: cpal::SampleRate(track_rate),
            buffer_size: cpal::BufferSize::Default,
        }
    } else {
        let default_cfg = device
            .default_output_config()
            .map_err(|e| EngineError::Device(e.to_string()))?;
        if default_cfg.sample_format() != cpal::SampleFormat::F32 {
            return Err(EngineError::Device(format!(
                "device does not support f32 output (got {:?})",
                default_cfg.sample_format()
            )));
        }
        default_cfg.into()
    };

    let first = start_frame(offset, track_rate, asset.frames());
    let tail = &asset.samples()[first * track_channels as usize..];
    let mut resampler = LinearResampler::new(track_rate, config.sample_rate.0, track_channels);
    let pcm: Arc<[f32]> = if resampler.is_needed() {
        log::info!(
            "cadence: resampling {}Hz -> {}Hz",
            track_rate,
            config.sample_rate.0
        );
        resampler.process(tail).into()
    } else {
        tail.into()
    };

    let src_ch = track_channels as usize;
    let out_ch = config.channels.max(1) as usize;
    let total_frames = pcm.len() / src_ch;
    shared.cursor.store(0, Ordering::SeqCst);
    if total_frames == 0 {
        shared.drained.store(true, Ordering::SeqCst);
    }

    let cb_shared = Arc::clone(&shared);
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if cb_shared.stop_signal.load(Ordering::Relaxed) {
                    data.fill(0.0);
                    return;
                }
                let pos = cb_shared.cursor.load(Ordering::Relaxed);
                let want = data.len() / out_ch;
                let n = want.min(total_frames.saturating_sub(pos));
                let src = &pcm[pos * src_ch..(pos + n) * src_ch];
                let (head, rest) = data.split_at_mut(n * out_ch);
                if src_ch == out_ch {
                    head.copy_from_slice(src);
                } else {
                    adapt_channels(src, src_ch as u16, head, out_ch as u16);
                }
                rest.fill(0.0);
                cb_shared.cursor.store(pos + n, Ordering::Relaxed);
                if pos + n >= total_frames {
                    cb_shared.drained.store(true, Ordering::SeqCst);
                }
            },
            move |err| {
                log::error!("cadence: cpal error: {}", err);
            },
            None,
        )
        .map_err(|e| EngineError::Device(e.to_string()))?;

    stream
        .play()
        .map_err(|e| EngineError::Device(e.to_string()))?;
    Ok(stream)
}

/// Frame index for a start offset, clamped to the asset.
fn start_frame(offset: f64, sample_rate: u32, frames: usize) -> usize {
    let frame = (offset.max(0.0) * sample_rate as f64).round() as usize;
    frame.min(frames)
}

/// Linear interpolation resampler.
struct LinearResampler {
    ratio: f64,
    phase: f64,
    channels: usize,
}

impl LinearResampler {
    fn new(src_rate: u32, dst_rate: u32, channels: u16) -> Self {
        Self {
            ratio: dst_rate as f64 / src_rate.max(1) as f64,
            phase: 0.0,
            channels: channels.max(1) as usize,
        }
    }

    fn is_needed(&self) -> bool {
        (self.ratio - 1.0).abs() > 0.001
    }

    /// Resample interleaved samples. Returns resampled output.
    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if !self.is_needed() {
            return input.to_vec();
        }
        let ch = self.channels;
        let in_frames = input.len() / ch;
        if in_frames == 0 {
            return Vec::new();
        }
        let out_frames = ((in_frames as f64) * self.ratio).ceil() as usize;
        let mut output = Vec::with_capacity(out_frames * ch);

        for _ in 0..out_frames {
            let src_idx = self.phase as usize;
            if src_idx >= in_frames {
                break;
            }
            let frac = (self.phase - src_idx as f64) as f32;

            for c in 0..ch {
                let s0 = input[src_idx * ch + c];
                let s1 = if src_idx + 1 < in_frames {
                    input[(src_idx + 1) * ch + c]
                } else {
                    s0
                };
                output.push(s0 + (s1 - s0) * frac);
            }

            self.phase += 1.0 / self.ratio;
        }

        self.phase -= in_frames as f64;
        if self.phase < 0.0 {
            self.phase = 0.0;
        }

        output
    }
}

/// Adapt interleaved samples between different channel counts.
/// Handles mono→stereo, stereo→mono, and general up/down-mix.
fn adapt_channels(src: &[f32], src_ch: u16, dst: &mut [f32], dst_ch: u16) {
    let src_ch = src_ch as usize;
    let dst_ch = dst_ch as usize;
    let frames = dst.len() / dst_ch;

    for f in 0..frames {
        let src_off = f * src_ch;
        let dst_off = f * dst_ch;

        if src_ch == 1 && dst_ch >= 2 {
            let s = src.get(src_off).copied().unwrap_or(0.0);
            dst[dst_off..dst_off + dst_ch].fill(s);
        } else if src_ch >= 2 && dst_ch == 1 {
            let n = src_ch.min(src.len().saturating_sub(src_off));
            let sum: f32 = src.get(src_off..src_off + n).unwrap_or(&[]).iter().sum();
            dst[dst_off] = if n > 0 { sum / n as f32 } else { 0.0 };
        } else {
            // Copy matching channels, zero-fill extra, drop excess
            let copy_ch = src_ch.min(dst_ch);
            for c in 0..copy_ch {
                dst[dst_off + c] = src.get(src_off + c).copied().unwrap_or(0.0);
            }
            dst[dst_off + copy_ch..dst_off + dst_ch].fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unstarted_stream_stop_is_benign() {
        let mut stream = CpalStream::new(AudioAsset::silence(1.0, 8000, 1));
        assert_eq!(stream.stop(), Err(EngineError::NotRunning));
        assert_eq!(stream.disconnect(), Ok(()));
        assert_eq!(stream.disconnect(), Err(EngineError::NotConnected));
    }

    #[test]
    fn start_after_disconnect_fails() {
        let mut stream = CpalStream::new(AudioAsset::silence(1.0, 8000, 1));
        stream.disconnect().unwrap();
        assert_eq!(stream.start(0.0), Err(EngineError::NotConnected));
    }

    #[test]
    fn engine_clock_is_monotonic() {
        let engine = CpalEngine::new();
        let a = engine.now();
        thread::sleep(Duration::from_millis(5));
        assert!(engine.now() > a);
    }

    #[test]
    fn start_frame_clamps() {
        assert_eq!(start_frame(1.5, 1000, 5000), 1500);
        assert_eq!(start_frame(-1.0, 1000, 5000), 0);
        assert_eq!(start_frame(9.0, 1000, 5000), 5000);
    }

    #[test]
    fn resampler_same_rate_passthrough() {
        let mut rs = LinearResampler::new(44100, 44100, 2);
        assert!(!rs.is_needed());
        let input = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(rs.process(&input), input);
    }

    #[test]
    fn resampler_upsample_produces_more() {
        let mut rs = LinearResampler::new(22050, 44100, 1);
        assert!(rs.is_needed());
        let input = vec![0.0, 1.0, 0.0, -1.0];
        assert!(rs.process(&input).len() > input.len());
    }

    #[test]
    fn resampler_downsample_produces_fewer() {
        let mut rs = LinearResampler::new(96000, 48000, 1);
        let input: Vec<f32> = (0..96).map(|i| i as f32 / 96.0).collect();
        assert!(rs.process(&input).len() < input.len());
    }

    #[test]
    fn adapt_mono_to_stereo() {
        let src = [1.0, 2.0, 3.0];
        let mut dst = [0.0f32; 6];
        adapt_channels(&src, 1, &mut dst, 2);
        assert_eq!(dst, [1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
    }

    #[test]
    fn adapt_stereo_to_mono() {
        let src = [1.0, 3.0, 2.0, 4.0];
        let mut dst = [0.0f32; 2];
        adapt_channels(&src, 2, &mut dst, 1);
        assert_eq!(dst, [2.0, 3.0]);
    }

    #[test]
    fn adapt_stereo_to_quad_zero_fills() {
        let src = [1.0, 2.0];
        let mut dst = [9.0f32; 4];
        adapt_channels(&src, 2, &mut dst, 4);
        assert_eq!(dst, [1.0, 2.0, 0.0, 0.0]);
    }
}
