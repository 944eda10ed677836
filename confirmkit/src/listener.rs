//! Exactly-once delivery of redirect outcomes.
//!
//! A [`ListenerSlot`] holds at most one [`RedirectListener`]. An outcome
//! produced while no listener is registered is held and handed to the next
//! listener that registers, once. After that it is gone: a listener that
//! registers later never sees a stale outcome. Starting a new attempt
//! discards an outcome that is still held.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::UnboundedSender;

use crate::correlator::RedirectOutcome;

/// Receives the outcome of an external challenge.
pub trait RedirectListener: Send + Sync {
    /// Called once per resolved challenge.
    fn on_redirect_outcome(&self, outcome: RedirectOutcome);
}

impl<F> RedirectListener for F
where
    F: Fn(RedirectOutcome) + Send + Sync,
{
    fn on_redirect_outcome(&self, outcome: RedirectOutcome) {
        self(outcome);
    }
}

/// Forwards outcomes to a channel so they are consumed on the receiving
/// task. A closed receiver drops the outcome.
impl RedirectListener for UnboundedSender<RedirectOutcome> {
    fn on_redirect_outcome(&self, outcome: RedirectOutcome) {
        if self.send(outcome).is_err() {
            #[cfg(feature = "telemetry")]
            tracing::warn!("Redirect outcome receiver closed");
        }
    }
}

/// What happened to an outcome handed to [`ListenerSlot::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dispatch {
    /// The registered listener was called.
    Notified,
    /// No listener was registered; the outcome is held for the next one.
    Held,
}

#[derive(Default)]
struct ListenerState {
    listener: Option<Arc<dyn RedirectListener>>,
    held: Option<RedirectOutcome>,
}

/// Holder for the single registered listener and any undelivered outcome.
#[derive(Default)]
pub struct ListenerSlot {
    state: Mutex<ListenerState>,
}

impl fmt::Debug for ListenerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ListenerSlot")
            .field("has_listener", &state.listener.is_some())
            .field("held", &state.held)
            .finish()
    }
}

impl ListenerSlot {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener`, replacing any previous one.
    ///
    /// A held outcome is delivered to the new listener before this returns.
    pub fn register(&self, listener: Arc<dyn RedirectListener>) -> Option<Dispatch> {
        let held = {
            let mut state = self.lock();
            state.listener = Some(Arc::clone(&listener));
            state.held.take()
        };
        held.map(|outcome| {
            listener.on_redirect_outcome(outcome);
            Dispatch::Notified
        })
    }

    /// Removes the registered listener.
    pub fn clear(&self) {
        self.lock().listener = None;
    }

    /// Hands `outcome` to the registered listener, or holds it.
    ///
    /// A newer held outcome replaces an older undelivered one.
    pub fn dispatch(&self, outcome: RedirectOutcome) -> Dispatch {
        let listener = {
            let mut state = self.lock();
            match &state.listener {
                Some(listener) => Arc::clone(listener),
                None => {
                    state.held = Some(outcome);
                    return Dispatch::Held;
                }
            }
        };
        listener.on_redirect_outcome(outcome);
        Dispatch::Notified
    }

    /// Drops the held outcome without delivering it.
    pub fn discard_held(&self) -> Option<RedirectOutcome> {
        self.lock().held.take()
    }

    /// Returns a copy of the held outcome, if any.
    #[must_use]
    pub fn held(&self) -> Option<RedirectOutcome> {
        self.lock().held.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ListenerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
