//! A small generic state machine with a validated-transition table, broadcasting
//! every accepted transition to any number of subscribers.
//!
//! The Capture Engine (C3) is the primary user: it plugs its five-state lifecycle
//! (`idle` / `activating` / `running` / `stopping` / `failed`) and legality table
//! into this generic machine rather than hand-rolling locking and broadcast.

use parking_lot::RwLock;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// Bound on the broadcast channel's backlog. Transitions are infrequent and
/// subscribers are expected to keep up; this is generous headroom, not a
/// sizing knob anyone needs to tune.
const TRANSITION_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Error)]
#[error("invalid state transition: {from:?} -> {to:?}")]
pub struct TransitionError<S: Debug> {
    pub from: S,
    pub to: S,
}

/// `validate(from, to)` returns true iff the transition is legal.
#[derive(Clone)]
pub struct StateMachine<S: Clone + Debug + PartialEq + Send + 'static> {
    current: Arc<RwLock<S>>,
    tx: broadcast::Sender<S>,
    validate: fn(&S, &S) -> bool,
}

impl<S: Clone + Debug + PartialEq + Send + 'static> StateMachine<S> {
    pub fn new(initial: S, validate: fn(&S, &S) -> bool) -> Self {
        let (tx, _rx) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        Self {
            current: Arc::new(RwLock::new(initial)),
            tx,
            validate,
        }
    }

    /// Attempt a transition, returning the previous state on success.
    pub fn transition(&self, new_state: S) -> Result<S, TransitionError<S>> {
        let mut current = self.current.write();
        if !(self.validate)(&current, &new_state) {
            return Err(TransitionError {
                from: current.clone(),
                to: new_state,
            });
        }
        tracing::info!(from = ?*current, to = ?new_state, "state transition");
        let previous = std::mem::replace(&mut *current, new_state.clone());
        let _ = self.tx.send(new_state);
        Ok(previous)
    }

    pub fn current(&self) -> S {
        self.current.read().clone()
    }

    /// Each call returns an independent receiver that observes every
    /// transition from this point on — genuine fan-out, not a competing
    /// consumer of a shared queue.
    pub fn subscribe(&self) -> broadcast::Receiver<S> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    enum Light {
        Red,
        Green,
        Yellow,
    }

    fn legal(from: &Light, to: &Light) -> bool {
        matches!(
            (from, to),
            (Light::Red, Light::Green) | (Light::Green, Light::Yellow) | (Light::Yellow, Light::Red)
        )
    }

    #[test]
    fn legal_transition_succeeds_and_updates_current() {
        let sm = StateMachine::new(Light::Red, legal);
        assert_eq!(sm.transition(Light::Green).unwrap(), Light::Red);
        assert_eq!(sm.current(), Light::Green);
    }

    #[test]
    fn illegal_transition_is_rejected_and_state_unchanged() {
        let sm = StateMachine::new(Light::Red, legal);
        assert!(sm.transition(Light::Yellow).is_err());
        assert_eq!(sm.current(), Light::Red);
    }

    #[test]
    fn subscribers_observe_accepted_transitions() {
        let sm = StateMachine::new(Light::Red, legal);
        let mut rx = sm.subscribe();
        sm.transition(Light::Green).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Light::Green);
    }

    #[test]
    fn two_independent_subscribers_each_see_every_transition() {
        let sm = StateMachine::new(Light::Red, legal);
        let mut rx1 = sm.subscribe();
        let mut rx2 = sm.subscribe();
        sm.transition(Light::Green).unwrap();
        sm.transition(Light::Yellow).unwrap();

        assert_eq!(rx1.try_recv().unwrap(), Light::Green);
        assert_eq!(rx1.try_recv().unwrap(), Light::Yellow);
        assert_eq!(rx2.try_recv().unwrap(), Light::Green);
        assert_eq!(rx2.try_recv().unwrap(), Light::Yellow);
    }
}
