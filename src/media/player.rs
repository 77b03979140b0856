use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Playback surface the index seeks. Implementations own the actual engine.
pub trait PlaybackElement: Send + Sync {
    fn current_time(&self) -> f64;
    /// `None` while the duration is unknown.
    fn duration(&self) -> Option<f64>;
    fn play(&self);
    fn pause(&self);
    fn set_current_time(&self, seconds: f64);
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MediaBindingError {
    #[error("no playback element is bound")]
    Unbound,
    #[error("cannot seek to {seconds}: not a finite time")]
    InvalidTime { seconds: f64 },
}

pub type BindingId = u64;

#[derive(Default)]
struct BindingSlot {
    next_id: BindingId,
    bound: Option<(BindingId, Arc<dyn PlaybackElement>)>,
}

/// The currently bound playback element for one screen or session. Clones
/// share the slot.
#[derive(Clone, Default)]
pub struct PlayerBinding {
    slot: Arc<Mutex<BindingSlot>>,
    clamp_to_duration: bool,
}

impl PlayerBinding {
    pub fn new(clamp_to_duration: bool) -> Self {
        Self {
            slot: Arc::default(),
            clamp_to_duration,
        }
    }

    /// Binds `element`. Registering the element that is already bound
    /// returns its existing id; any other element replaces it.
    pub fn register(&self, element: Arc<dyn PlaybackElement>) -> BindingId {
        let mut slot = self.lock_slot();
        if let Some((id, bound)) = &slot.bound {
            if same_element(bound, &element) {
                return *id;
            }
        }
        slot.next_id += 1;
        let id = slot.next_id;
        slot.bound = Some((id, element));
        tracing::debug!(binding = id, "playback element registered");
        id
    }

    /// Releases the binding only if `id` is still the current one, so a late
    /// unregister from a replaced element leaves the new one alone.
    pub fn unregister(&self, id: BindingId) -> bool {
        let mut slot = self.lock_slot();
        match &slot.bound {
            Some((bound_id, _)) if *bound_id == id => {
                slot.bound = None;
                tracing::debug!(binding = id, "playback element unregistered");
                true
            }
            _ => false,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.lock_slot().bound.is_some()
    }

    pub fn current_time(&self) -> Option<f64> {
        self.element().map(|element| element.current_time())
    }

    /// Jumps to `seconds` and starts playback. Returns the position actually
    /// applied, which differs from `seconds` when clamped.
    pub fn try_seek(&self, seconds: f64) -> Result<f64, MediaBindingError> {
        if !seconds.is_finite() {
            return Err(MediaBindingError::InvalidTime { seconds });
        }
        let element = self.element().ok_or(MediaBindingError::Unbound)?;
        let target = self.resolve_target(seconds, element.duration());
        element.set_current_time(target);
        element.play();
        Ok(target)
    }

    /// Like `try_seek`, but a missing element or bad time is a no-op.
    pub fn seek(&self, seconds: f64) -> Option<f64> {
        match self.try_seek(seconds) {
            Ok(target) => Some(target),
            Err(error) => {
                tracing::debug!(seconds, error = %error, "seek ignored");
                None
            }
        }
    }

    pub fn pause(&self) {
        if let Some(element) = self.element() {
            element.pause();
        }
    }

    fn resolve_target(&self, seconds: f64, duration: Option<f64>) -> f64 {
        let mut target = seconds.max(0.0);
        if self.clamp_to_duration {
            if let Some(duration) = duration.filter(|d| d.is_finite() && *d > 0.0) {
                if target > duration {
                    tracing::info!(requested = seconds, duration, "clamping seek to media duration");
                    target = duration;
                }
            }
        }
        target
    }

    fn element(&self) -> Option<Arc<dyn PlaybackElement>> {
        self.lock_slot()
            .bound
            .as_ref()
            .map(|(_, element)| Arc::clone(element))
    }

    fn lock_slot(&self) -> MutexGuard<'_, BindingSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn same_element(a: &Arc<dyn PlaybackElement>, b: &Arc<dyn PlaybackElement>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[derive(Debug, Default)]
struct SimulatedState {
    position: f64,
    duration: Option<f64>,
    playing: bool,
}

/// Clock-free stand-in for a media engine; the position only moves through
/// `advance` and seeks.
#[derive(Debug, Default)]
pub struct SimulatedPlayer {
    state: Mutex<SimulatedState>,
}

impl SimulatedPlayer {
    pub fn new(duration: Option<f64>) -> Self {
        Self {
            state: Mutex::new(SimulatedState {
                duration,
                ..SimulatedState::default()
            }),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    /// Moves the playhead forward while playing. Returns the new position.
    pub fn advance(&self, seconds: f64) -> f64 {
        let mut state = self.lock();
        if state.playing && seconds.is_finite() && seconds > 0.0 {
            state.position += seconds;
            if let Some(duration) = state.duration {
                if state.position >= duration {
                    state.position = duration;
                    state.playing = false;
                }
            }
        }
        state.position
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PlaybackElement for SimulatedPlayer {
    fn current_time(&self) -> f64 {
        self.lock().position
    }

    fn duration(&self) -> Option<f64> {
        self.lock().duration
    }

    fn play(&self) {
        self.lock().playing = true;
    }

    fn pause(&self) {
        self.lock().playing = false;
    }

    fn set_current_time(&self, seconds: f64) {
        self.lock().position = seconds;
    }
}
