//! Playback controller: state machine over an injected engine.
//!
//! Owns the loaded asset, the live session (stream handle, start reference,
//! paused offset, poller) and the two observers. All timing is derived from
//! the engine clock: `elapsed = now - start_reference` while playing.
//!
//! Locking:
//! - `turn` (reentrant) serializes whole operations, so notifications go out
//!   in transition order. Observers run while it is held; they may call back
//!   into the controller from the same thread.
//! - `core` guards bookkeeping and is released before observers run.
//! - Engine completions and poll ticks carry a session id; a stale id is a
//!   no-op, which is how a pause racing a natural end resolves to one winner.

use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};

use crate::config::PlayerConfig;
use crate::effects::{self, AudioDecoder, ByteSource, OutputStream, PlaybackEngine};
use crate::error::{DecodeError, EngineError, LoadError, PlayerError, TransportError};
use crate::models::{AudioAsset, LoadOutcome, PlaybackState};
use crate::poller::ProgressPoller;

pub type StateCallback = Arc<dyn Fn(PlaybackState) + Send + Sync>;
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Handle to a single-track player. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct PlaybackController {
    inner: Arc<Inner>,
}

struct Inner {
    engine: Arc<dyn PlaybackEngine>,
    source: Arc<dyn ByteSource>,
    decoder: Arc<dyn AudioDecoder>,
    poll_interval: Duration,
    turn: ReentrantMutex<()>,
    core: Mutex<Core>,
    observers: Mutex<Observers>,
}

#[derive(Default)]
struct Observers {
    state: Option<StateCallback>,
    progress: Option<ProgressCallback>,
}

#[derive(Default)]
struct Core {
    state: PlaybackState,
    asset: Option<AudioAsset>,
    session: Option<Session>,
    last_session_id: u64,
    load_generation: u64,
}

struct Session {
    id: u64,
    /// `None` while paused: a paused session holds no output stream.
    stream: Option<Box<dyn OutputStream>>,
    start_reference: f64,
    paused_offset: f64,
    poller: Option<ProgressPoller>,
}

enum Notice {
    State(PlaybackState),
    Progress(f64),
}

impl Core {
    fn duration(&self) -> f64 {
        self.asset.as_ref().map(AudioAsset::duration).unwrap_or(0.0)
    }

    fn elapsed(&self, now: f64) -> f64 {
        let Some(session) = &self.session else {
            return 0.0;
        };
        let raw = match self.state {
            PlaybackState::Playing => now - session.start_reference,
            PlaybackState::Paused => session.paused_offset,
            _ => 0.0,
        };
        raw.clamp(0.0, self.duration())
    }

    fn progress(&self, now: f64) -> f64 {
        let duration = self.duration();
        if duration <= 0.0 {
            return 0.0;
        }
        self.elapsed(now) / duration
    }

    fn set_state(&mut self, next: PlaybackState, out: &mut Vec<Notice>) {
        if self.state == next {
            return;
        }
        log::debug!("cadence: {} -> {}", self.state, next);
        self.state = next;
        out.push(Notice::State(next));
    }

    /// Drop the session, cancelling its poller and releasing its stream.
    /// Engine faults are logged, not returned.
    fn discard_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.poller.take();
            if let Some(mut stream) = session.stream.take() {
                if let Err(e) = silence(stream.as_mut()) {
                    log::warn!("cadence: stop during teardown failed: {}", e);
                }
                release(stream);
            }
        }
    }
}

impl PlaybackController {
    pub fn new(
        engine: Arc<dyn PlaybackEngine>,
        source: Arc<dyn ByteSource>,
        decoder: Arc<dyn AudioDecoder>,
        config: &PlayerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                source,
                decoder,
                poll_interval: config.poll_interval(),
                turn: ReentrantMutex::new(()),
                core: Mutex::new(Core::default()),
                observers: Mutex::new(Observers::default()),
            }),
        }
    }

    /// Player on the default output device, reading files (and URLs with
    /// the `http` feature), decoding with symphonia.
    #[cfg(feature = "native")]
    pub fn native(config: &PlayerConfig) -> Self {
        Self::new(
            Arc::new(effects::audio::CpalEngine::new()),
            Arc::new(effects::source::LocatorSource::new(config)),
            Arc::new(effects::decode::SymphoniaDecoder::new()),
            config,
        )
    }

    // -----------------------------------------------------------------------
    // Observers
    // -----------------------------------------------------------------------

    /// Replace the state observer.
    pub fn on_state_change(&self, callback: impl Fn(PlaybackState) + Send + Sync + 'static) {
        self.inner.observers.lock().state = Some(Arc::new(callback));
    }

    /// Replace the progress observer. Values are `elapsed / duration`.
    pub fn on_progress(&self, callback: impl Fn(f64) + Send + Sync + 'static) {
        self.inner.observers.lock().progress = Some(Arc::new(callback));
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn state(&self) -> PlaybackState {
        self.inner.core.lock().state
    }

    /// Loaded asset duration in seconds, 0 when nothing is loaded.
    pub fn duration(&self) -> f64 {
        self.inner.core.lock().duration()
    }

    /// Seconds into the asset, clamped to `[0, duration]`.
    pub fn elapsed(&self) -> f64 {
        let now = self.inner.engine.now();
        self.inner.core.lock().elapsed(now)
    }

    pub fn progress(&self) -> f64 {
        let now = self.inner.engine.now();
        self.inner.core.lock().progress(now)
    }

    pub fn paused_offset(&self) -> f64 {
        let core = self.inner.core.lock();
        core.session.as_ref().map(|s| s.paused_offset).unwrap_or(0.0)
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Start loading `locator`. The state is `Loading` when this returns;
    /// fetch and decode run on a background thread.
    ///
    /// A later call supersedes an earlier one still in flight: only the
    /// latest load's result is applied.
    pub fn load_audio(&self, locator: &str) -> LoadHandle {
        let generation = self.transact(|_, core, out| {
            core.discard_session();
            core.load_generation += 1;
            core.set_state(PlaybackState::Loading, out);
            core.load_generation
        });
        log::info!("cadence: loading {}", locator);

        let weak = Arc::downgrade(&self.inner);
        let source = Arc::clone(&self.inner.source);
        let decoder = Arc::clone(&self.inner.decoder);
        let owned = locator.to_string();

        let spawned = thread::Builder::new()
            .name("cadence-load".into())
            .spawn(move || {
                let result = fetch_and_decode(&*source, &*decoder, &owned);
                match weak.upgrade() {
                    Some(inner) => PlaybackController { inner }.finish_load(generation, &owned, result),
                    None => LoadOutcome::Superseded,
                }
            });

        match spawned {
            Ok(handle) => LoadHandle::Pending(handle),
            Err(e) => {
                let result = Err(LoadError::Transport(TransportError::Io(e)));
                LoadHandle::Ready(self.finish_load(generation, locator, result))
            }
        }
    }

    /// Play from `position` seconds, keeping the current progress observer.
    pub fn play(&self, position: f64) -> Result<(), PlayerError> {
        self.play_inner(position, None)
    }

    /// Play from `position` seconds, replacing the progress observer.
    pub fn play_with_progress(
        &self,
        position: f64,
        callback: impl Fn(f64) + Send + Sync + 'static,
    ) -> Result<(), PlayerError> {
        self.play_inner(position, Some(Arc::new(callback)))
    }

    pub fn pause(&self) -> Result<(), PlayerError> {
        self.transact(|inner, core, out| {
            if core.state != PlaybackState::Playing {
                return Err(PlayerError::InvalidOperation("pause requires playing"));
            }
            let duration = core.duration();
            let Some(session) = core.session.as_mut() else {
                return Err(PlayerError::InvalidOperation("pause requires a session"));
            };
            if let Some(stream) = session.stream.as_mut() {
                silence(stream.as_mut())?;
            }

            let offset = (inner.engine.now() - session.start_reference).clamp(0.0, duration);
            if offset >= duration {
                // The clock is past the end: the stream ran out or is
                // draining. Any completion still in flight finds no session.
                core.discard_session();
                core.set_state(PlaybackState::Finished, out);
                out.push(Notice::Progress(1.0));
                return Ok(());
            }
            session.poller.take();
            if let Some(stream) = session.stream.take() {
                release(stream);
            }
            session.paused_offset = offset;

            core.set_state(PlaybackState::Paused, out);
            out.push(Notice::Progress(offset / duration));
            Ok(())
        })
    }

    /// Continue from the paused offset. A no-op while already playing.
    pub fn resume(&self) -> Result<(), PlayerError> {
        self.transact(|inner, core, out| {
            match core.state {
                PlaybackState::Playing => {
                    log::debug!("cadence: resume while playing ignored");
                    return Ok(());
                }
                PlaybackState::Paused => {}
                _ => return Err(PlayerError::InvalidOperation("nothing to resume")),
            }
            let Some(session) = core.session.as_mut() else {
                return Err(PlayerError::InvalidOperation("nothing to resume"));
            };

            let offset = std::mem::take(&mut session.paused_offset);
            let result = begin_session(inner, core, offset, out);
            if result.is_err() {
                if let Some(session) = core.session.as_mut() {
                    session.paused_offset = offset;
                }
            }
            result
        })
    }

    pub fn stop(&self) -> Result<(), PlayerError> {
        self.transact(|_, core, out| {
            if !core.state.has_session() {
                return Err(PlayerError::InvalidOperation("no active session"));
            }
            let Some(session) = core.session.as_mut() else {
                return Err(PlayerError::InvalidOperation("no active session"));
            };
            if let Some(stream) = session.stream.as_mut() {
                silence(stream.as_mut())?;
            }

            core.discard_session();
            core.set_state(PlaybackState::Idle, out);
            out.push(Notice::Progress(0.0));
            Ok(())
        })
    }

    /// Move the playhead. Playing stays playing; paused stays paused.
    /// A seek to the very end finishes the track.
    pub fn seek(&self, position: f64) -> Result<(), PlayerError> {
        self.transact(|inner, core, out| {
            if !core.state.has_session() || core.session.is_none() {
                return Err(PlayerError::InvalidOperation("seek requires an active session"));
            }
            let duration = core.duration();
            validate_position(position, duration)?;

            if position >= duration {
                // Seeking to the end completes the track.
                if let Some(stream) = core.session.as_mut().and_then(|s| s.stream.as_mut()) {
                    silence(stream.as_mut())?;
                }
                core.discard_session();
                core.set_state(PlaybackState::Finished, out);
                out.push(Notice::Progress(1.0));
                return Ok(());
            }
            if core.state == PlaybackState::Playing {
                begin_session(inner, core, position, out)?;
            } else if let Some(session) = core.session.as_mut() {
                session.paused_offset = position;
            }
            out.push(Notice::Progress(position / duration));
            Ok(())
        })
    }

    /// End any session and abandon pending loads. Engine faults are logged.
    /// Safe to call repeatedly.
    pub fn shutdown(&self) {
        self.transact(|_, core, out| {
            core.load_generation += 1;
            core.discard_session();
            if core.state.has_session() || core.state == PlaybackState::Loading {
                core.set_state(PlaybackState::Idle, out);
            }
        });
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Run one operation: serialize, mutate under the core lock, then
    /// deliver notifications with the core lock released.
    fn transact<T>(&self, op: impl FnOnce(&Arc<Inner>, &mut Core, &mut Vec<Notice>) -> T) -> T {
        let _turn = self.inner.turn.lock();
        let mut notices = Vec::new();
        let result = {
            let mut core = self.inner.core.lock();
            op(&self.inner, &mut core, &mut notices)
        };
        self.inner.deliver(notices);
        result
    }

    fn play_inner(&self, position: f64, callback: Option<ProgressCallback>) -> Result<(), PlayerError> {
        self.transact(|inner, core, out| {
            if core.state == PlaybackState::Loading {
                return Err(PlayerError::InvalidOperation("load in progress"));
            }
            if core.asset.is_none() {
                return Err(PlayerError::InvalidOperation("no audio loaded"));
            }
            validate_position(position, core.duration())?;
            if let Some(callback) = callback {
                inner.observers.lock().progress = Some(callback);
            }
            begin_session(inner, core, position, out)
        })
    }

    fn finish_load(
        &self,
        generation: u64,
        locator: &str,
        result: Result<AudioAsset, LoadError>,
    ) -> LoadOutcome {
        self.transact(|_, core, out| {
            if core.load_generation != generation {
                log::debug!("cadence: discarding superseded load of {}", locator);
                return LoadOutcome::Superseded;
            }
            match result {
                Ok(asset) => {
                    let duration = asset.duration();
                    log::info!("cadence: loaded {} ({:.2}s)", locator, duration);
                    core.asset = Some(asset);
                    core.set_state(PlaybackState::Idle, out);
                    LoadOutcome::Loaded { duration }
                }
                Err(e) => {
                    log::warn!("cadence: load of {} failed: {}", locator, e);
                    core.asset = None;
                    core.set_state(PlaybackState::Error, out);
                    LoadOutcome::Failed(e)
                }
            }
        })
    }

    fn natural_end(&self, session_id: u64) {
        self.transact(|_, core, out| {
            let current = core.session.as_ref().map(|s| s.id);
            if core.state != PlaybackState::Playing || current != Some(session_id) {
                log::debug!("cadence: ignoring completion of stale session {}", session_id);
                return;
            }
            core.discard_session();
            core.set_state(PlaybackState::Finished, out);
            out.push(Notice::Progress(1.0));
        });
    }

    /// One poll tick. Returns false once the session is gone.
    fn poll_tick(&self, session_id: u64) -> bool {
        self.transact(|inner, core, out| {
            let Some(session) = core.session.as_ref() else {
                return false;
            };
            if session.id != session_id || core.state != PlaybackState::Playing {
                return false;
            }
            let duration = core.duration();
            let elapsed = inner.engine.now() - session.start_reference;
            // 1.0 is reserved for the completion notice.
            if elapsed < duration {
                out.push(Notice::Progress(elapsed.max(0.0) / duration));
            }
            true
        })
    }
}

impl Inner {
    fn deliver(&self, notices: Vec<Notice>) {
        for notice in notices {
            match notice {
                Notice::State(state) => {
                    let callback = self.observers.lock().state.clone();
                    if let Some(callback) = callback {
                        callback(state);
                    }
                }
                Notice::Progress(value) => {
                    let callback = self.observers.lock().progress.clone();
                    if let Some(callback) = callback {
                        callback(value);
                    }
                }
            }
        }
    }
}

/// Replace the current session (if any) with a fresh stream at `position`.
///
/// The new stream is created before the old one is touched, so a creation
/// fault leaves everything as it was. A start fault after the old session
/// is gone leaves the controller `Idle`.
fn begin_session(
    inner: &Arc<Inner>,
    core: &mut Core,
    position: f64,
    out: &mut Vec<Notice>,
) -> Result<(), PlayerError> {
    let Some(asset) = core.asset.as_ref() else {
        return Err(PlayerError::InvalidOperation("no audio loaded"));
    };
    let mut stream = inner.engine.create_stream(asset)?;

    if let Some(old) = core.session.as_mut().and_then(|s| s.stream.as_mut()) {
        silence(old.as_mut())?;
    }
    core.discard_session();

    core.last_session_id += 1;
    let id = core.last_session_id;
    let weak = Arc::downgrade(inner);
    stream.on_ended(Box::new(move || {
        if let Some(inner) = weak.upgrade() {
            PlaybackController { inner }.natural_end(id);
        }
    }));

    let start_reference = inner.engine.now() - position;
    if let Err(e) = stream.start(position) {
        log::error!("cadence: stream start failed: {}", e);
        if core.state.has_session() {
            core.set_state(PlaybackState::Idle, out);
        }
        return Err(e.into());
    }

    core.session = Some(Session {
        id,
        stream: Some(stream),
        start_reference,
        paused_offset: 0.0,
        poller: Some(spawn_poller(inner, id)),
    });
    core.set_state(PlaybackState::Playing, out);
    Ok(())
}

fn spawn_poller(inner: &Arc<Inner>, session_id: u64) -> ProgressPoller {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    ProgressPoller::spawn(inner.poll_interval, move || match weak.upgrade() {
        Some(inner) => PlaybackController { inner }.poll_tick(session_id),
        None => false,
    })
}

/// Stop a stream, treating "already stopped" as success.
fn silence(stream: &mut dyn OutputStream) -> Result<(), EngineError> {
    match stream.stop() {
        Ok(()) => Ok(()),
        Err(e) if e.is_benign() => {
            log::debug!("cadence: stop: {}", e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Release a stopped stream. Failures here cannot be acted on.
fn release(mut stream: Box<dyn OutputStream>) {
    match stream.disconnect() {
        Ok(()) => {}
        Err(e) if e.is_benign() => log::debug!("cadence: disconnect: {}", e),
        Err(e) => log::warn!("cadence: disconnect failed: {}", e),
    }
}

fn validate_position(position: f64, duration: f64) -> Result<(), PlayerError> {
    if !position.is_finite() || position < 0.0 || position > duration {
        return Err(PlayerError::InvalidPosition { position, duration });
    }
    Ok(())
}

fn fetch_and_decode(
    source: &dyn ByteSource,
    decoder: &dyn AudioDecoder,
    locator: &str,
) -> Result<AudioAsset, LoadError> {
    let bytes = source.fetch(locator)?;
    let hint = effects::extension_hint(locator);
    let asset = decoder.decode(bytes, hint.as_deref())?;
    if asset.duration() <= 0.0 {
        return Err(DecodeError::Empty.into());
    }
    Ok(asset)
}

/// Pending result of `load_audio`.
pub enum LoadHandle {
    Pending(JoinHandle<LoadOutcome>),
    Ready(LoadOutcome),
}

impl LoadHandle {
    /// Block until the load resolves.
    pub fn wait(self) -> LoadOutcome {
        match self {
            LoadHandle::Ready(outcome) => outcome,
            LoadHandle::Pending(handle) => handle.join().unwrap_or_else(|_| {
                LoadOutcome::Failed(LoadError::Transport(TransportError::Io(
                    std::io::Error::other("loader thread panicked"),
                )))
            }),
        }
    }

    pub fn is_finished(&self) -> bool {
        match self {
            LoadHandle::Ready(_) => true,
            LoadHandle::Pending(handle) => handle.is_finished(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_validation() {
        assert!(validate_position(0.0, 10.0).is_ok());
        assert!(validate_position(10.0, 10.0).is_ok());
        assert!(validate_position(-0.1, 10.0).is_err());
        assert!(validate_position(10.1, 10.0).is_err());
        assert!(validate_position(f64::NAN, 10.0).is_err());
        assert!(validate_position(f64::INFINITY, 10.0).is_err());
    }

    #[test]
    fn core_progress_guards_zero_duration() {
        let core = Core::default();
        assert_eq!(core.duration(), 0.0);
        assert_eq!(core.progress(5.0), 0.0);
        assert_eq!(core.elapsed(5.0), 0.0);
    }

    #[test]
    fn state_change_recorded_once() {
        let mut core = Core::default();
        let mut out = Vec::new();
        core.set_state(PlaybackState::Loading, &mut out);
        core.set_state(PlaybackState::Loading, &mut out);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Notice::State(PlaybackState::Loading)));
    }
}
