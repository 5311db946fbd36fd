//! Manually clocked playback engine.
//!
//! Produces no sound. Time only moves when the host calls `advance`, which
//! also delivers natural-completion hooks for streams that ran out. Used by
//! headless hosts and by the controller tests; faults can be injected.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::effects::{EndedHook, OutputStream, PlaybackEngine};
use crate::error::EngineError;
use crate::models::AudioAsset;

/// Tolerance when deciding whether a stream reached its end.
const END_EPSILON: f64 = 1e-9;

#[derive(Clone, Default)]
pub struct ManualEngine {
    inner: Arc<Mutex<ManualInner>>,
}

#[derive(Default)]
struct ManualInner {
    now: f64,
    next_id: u64,
    streams: HashMap<u64, Slot>,
    fail_next_stop: Option<EngineError>,
    fail_next_create: Option<EngineError>,
    drain_lag: f64,
    created: usize,
}

struct Slot {
    duration: f64,
    offset: f64,
    started_at: Option<f64>,
    running: bool,
    connected: bool,
    hook: Option<EndedHook>,
}

/// Completion hooks that came due but have not been delivered yet.
#[must_use = "hooks are only delivered by fire()"]
pub struct PendingCompletions {
    hooks: Vec<EndedHook>,
}

impl PendingCompletions {
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn fire(self) {
        for hook in self.hooks {
            hook();
        }
    }
}

impl ManualEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward and deliver any completions that came due.
    pub fn advance(&self, secs: f64) {
        self.advance_deferred(secs).fire();
    }

    /// Move the clock forward; streams that ran out stop, but their hooks
    /// are handed back instead of being delivered. Lets a caller interleave
    /// its own commands with an in-flight completion.
    pub fn advance_deferred(&self, secs: f64) -> PendingCompletions {
        let mut inner = self.inner.lock();
        inner.now += secs.max(0.0);
        let now = inner.now;
        let lag = inner.drain_lag;

        let mut hooks = Vec::new();
        for slot in inner.streams.values_mut() {
            let Some(started_at) = slot.started_at else {
                continue;
            };
            if slot.running && slot.offset + (now - started_at) >= slot.duration + lag - END_EPSILON {
                slot.running = false;
                if let Some(hook) = slot.hook.take() {
                    hooks.push(hook);
                }
            }
        }
        PendingCompletions { hooks }
    }

    /// Streams currently producing (virtual) sound.
    pub fn running_streams(&self) -> usize {
        self.inner.lock().streams.values().filter(|s| s.running).count()
    }

    /// Streams still holding an output connection.
    pub fn connected_streams(&self) -> usize {
        self.inner.lock().streams.values().filter(|s| s.connected).count()
    }

    /// Total streams ever created.
    pub fn created_streams(&self) -> usize {
        self.inner.lock().created
    }

    /// Make the next `stop()` on any stream fail with `err`.
    pub fn fail_next_stop(&self, err: EngineError) {
        self.inner.lock().fail_next_stop = Some(err);
    }

    /// Keep streams running for `secs` past their end before they complete,
    /// like a device still playing out its last buffer.
    pub fn set_drain_lag(&self, secs: f64) {
        self.inner.lock().drain_lag = secs.max(0.0);
    }

    /// Make the next `create_stream()` fail with `err`.
    pub fn fail_next_create(&self, err: EngineError) {
        self.inner.lock().fail_next_create = Some(err);
    }
}

impl PlaybackEngine for ManualEngine {
    fn now(&self) -> f64 {
        self.inner.lock().now
    }

    fn create_stream(&self, asset: &AudioAsset) -> Result<Box<dyn OutputStream>, EngineError> {
        let mut inner = self.inner.lock();
        if let Some(err) = inner.fail_next_create.take() {
            return Err(err);
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.created += 1;
        inner.streams.insert(
            id,
            Slot {
                duration: asset.duration(),
                offset: 0.0,
                started_at: None,
                running: false,
                connected: true,
                hook: None,
            },
        );
        Ok(Box::new(ManualStream {
            id,
            engine: Arc::clone(&self.inner),
        }))
    }
}

struct ManualStream {
    id: u64,
    engine: Arc<Mutex<ManualInner>>,
}

impl ManualStream {
    fn with_slot<T>(
        &self,
        f: impl FnOnce(&mut Slot, f64) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut inner = self.engine.lock();
        let now = inner.now;
        match inner.streams.get_mut(&self.id) {
            Some(slot) => f(slot, now),
            None => Err(EngineError::NotConnected),
        }
    }
}

impl OutputStream for ManualStream {
    fn on_ended(&mut self, hook: EndedHook) {
        let _ = self.with_slot(|slot, _| {
            slot.hook = Some(hook);
            Ok(())
        });
    }

    fn start(&mut self, offset: f64) -> Result<(), EngineError> {
        self.with_slot(|slot, now| {
            if !slot.connected {
                return Err(EngineError::NotConnected);
            }
            if slot.started_at.is_some() {
                return Err(EngineError::Fault("stream already started".into()));
            }
            slot.offset = offset;
            slot.started_at = Some(now);
            slot.running = true;
            Ok(())
        })
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        if let Some(err) = self.engine.lock().fail_next_stop.take() {
            return Err(err);
        }
        self.with_slot(|slot, _| {
            slot.hook = None;
            if !slot.running {
                return Err(EngineError::NotRunning);
            }
            slot.running = false;
            Ok(())
        })
    }

    fn disconnect(&mut self) -> Result<(), EngineError> {
        self.with_slot(|slot, _| {
            slot.hook = None;
            slot.running = false;
            if !slot.connected {
                return Err(EngineError::NotConnected);
            }
            slot.connected = false;
            Ok(())
        })
    }
}

impl Drop for ManualStream {
    fn drop(&mut self) {
        self.engine.lock().streams.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn asset(secs: f64) -> AudioAsset {
        AudioAsset::silence(secs, 100, 1)
    }

    #[test]
    fn clock_only_moves_on_advance() {
        let engine = ManualEngine::new();
        assert_eq!(engine.now(), 0.0);
        engine.advance(1.5);
        assert_eq!(engine.now(), 1.5);
    }

    #[test]
    fn stream_completes_after_remaining_time() {
        let engine = ManualEngine::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let mut stream = engine.create_stream(&asset(5.0)).unwrap();
        let counter = Arc::clone(&fired);
        stream.on_ended(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        stream.start(2.0).unwrap();

        engine.advance(2.9);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        engine.advance(0.1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        engine.advance(5.0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(stream.stop(), Err(EngineError::NotRunning));
    }

    #[test]
    fn stopped_stream_never_fires() {
        let engine = ManualEngine::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let mut stream = engine.create_stream(&asset(1.0)).unwrap();
        let counter = Arc::clone(&fired);
        stream.on_ended(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        stream.start(0.0).unwrap();
        stream.stop().unwrap();
        engine.advance(2.0);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn double_release_is_benign() {
        let engine = ManualEngine::new();
        let mut stream = engine.create_stream(&asset(1.0)).unwrap();
        assert_eq!(stream.stop(), Err(EngineError::NotRunning));
        stream.disconnect().unwrap();
        assert_eq!(stream.disconnect(), Err(EngineError::NotConnected));
        assert_eq!(engine.connected_streams(), 0);
    }

    #[test]
    fn dropping_stream_releases_slot() {
        let engine = ManualEngine::new();
        let stream = engine.create_stream(&asset(1.0)).unwrap();
        assert_eq!(engine.connected_streams(), 1);
        drop(stream);
        assert_eq!(engine.connected_streams(), 0);
        assert_eq!(engine.created_streams(), 1);
    }

    #[test]
    fn injected_faults_are_one_shot() {
        let engine = ManualEngine::new();
        engine.fail_next_create(EngineError::Device("unplugged".into()));
        assert!(engine.create_stream(&asset(1.0)).is_err());
        let mut stream = engine.create_stream(&asset(1.0)).unwrap();
        stream.start(0.0).unwrap();
        engine.fail_next_stop(EngineError::Fault("stuck".into()));
        assert_eq!(stream.stop(), Err(EngineError::Fault("stuck".into())));
        assert_eq!(stream.stop(), Ok(()));
    }

    #[test]
    fn drain_lag_delays_completion() {
        let engine = ManualEngine::new();
        engine.set_drain_lag(0.05);
        let fired = Arc::new(AtomicUsize::new(0));
        let mut stream = engine.create_stream(&asset(1.0)).unwrap();
        let counter = Arc::clone(&fired);
        stream.on_ended(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        stream.start(0.0).unwrap();

        engine.advance(1.02);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(engine.running_streams(), 1);
        engine.advance(0.1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deferred_completions_wait_for_fire() {
        let engine = ManualEngine::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let mut stream = engine.create_stream(&asset(1.0)).unwrap();
        let counter = Arc::clone(&fired);
        stream.on_ended(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        stream.start(0.0).unwrap();

        let pending = engine.advance_deferred(1.0);
        assert_eq!(pending.len(), 1);
        assert_eq!(engine.running_streams(), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        pending.fire();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
