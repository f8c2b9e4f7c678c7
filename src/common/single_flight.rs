//! Collapse concurrent invocations of one async action into a single execution.
//!
//! The first caller to arrive while the coordinator is idle becomes the leader and
//! runs the action. Callers arriving while that run is in flight subscribe to it and
//! receive the same outcome. Once the run settles every subscriber is notified in
//! registration order and the coordinator returns to idle, so the next call starts
//! a fresh cycle.

use std::future::Future;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

/// Outcome shared by every caller of one cycle. Errors are behind an `Arc` so all
/// callers observe the same error instance.
pub type FlightOutcome<T, E> = Result<T, Arc<E>>;

type Subscriber<T, E> = oneshot::Sender<FlightOutcome<T, E>>;

/// Coordinator state. Transitions happen only while the mutex is held and never
/// across an await point.
enum FlightState<T, E> {
    Idle,
    InFlight(Vec<Subscriber<T, E>>),
}

enum Role<T, E> {
    Leader,
    Follower(oneshot::Receiver<FlightOutcome<T, E>>),
}

/// Single-flight coordinator for one action
pub struct SingleFlight<T, E> {
    state: Mutex<FlightState<T, E>>,
}

impl<T, E> SingleFlight<T, E>
where
    T: Clone,
{
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FlightState::Idle),
        }
    }

    /// Run `action` unless a run is already in flight, in which case wait for that
    /// run's outcome instead. `action` is only invoked by the caller that starts a cycle.
    pub async fn execute<F, Fut>(&self, action: F) -> FlightOutcome<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        loop {
            let receiver = match self.join() {
                Role::Leader => break,
                Role::Follower(receiver) => receiver,
            };

            match receiver.await {
                Ok(outcome) => return outcome,
                // The leader was dropped before settling; compete to lead a new cycle
                Err(_) => {
                    warn!("In-flight action was abandoned, starting a new cycle");
                }
            }
        }

        let guard = CycleGuard {
            flight: self,
            armed: true,
        };

        debug!("Starting single-flight cycle");
        let outcome = action().await.map_err(Arc::new);

        let subscribers = guard.settle();
        trace!(subscribers = subscribers.len(), "Fanning out single-flight outcome");
        for subscriber in subscribers {
            // A subscriber that stopped waiting is not an error
            let _ = subscriber.send(outcome.clone());
        }

        outcome
    }

    /// Number of callers attached to the current cycle, including the leader.
    /// Zero when idle.
    pub fn pending(&self) -> usize {
        match &*self.lock() {
            FlightState::Idle => 0,
            FlightState::InFlight(subscribers) => subscribers.len() + 1,
        }
    }

    /// Whether a cycle is currently in flight
    pub fn is_in_flight(&self) -> bool {
        matches!(&*self.lock(), FlightState::InFlight(_))
    }

    fn join(&self) -> Role<T, E> {
        let mut state = self.lock();
        match &mut *state {
            FlightState::InFlight(subscribers) => {
                let (sender, receiver) = oneshot::channel();
                subscribers.push(sender);
                trace!(waiting = subscribers.len(), "Joined in-flight cycle");
                Role::Follower(receiver)
            }
            FlightState::Idle => {
                *state = FlightState::InFlight(Vec::new());
                Role::Leader
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, FlightState<T, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T, E> Default for SingleFlight<T, E>
where
    T: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the coordinator to idle when the leader settles or is dropped mid-run.
/// Dropping the subscribers' senders on the abandoned path wakes them so one of
/// them can lead the next cycle.
struct CycleGuard<'a, T, E> {
    flight: &'a SingleFlight<T, E>,
    armed: bool,
}

impl<T, E> CycleGuard<'_, T, E>
where
    T: Clone,
{
    fn settle(mut self) -> Vec<Subscriber<T, E>> {
        self.armed = false;
        match mem::replace(&mut *self.flight.lock(), FlightState::Idle) {
            FlightState::InFlight(subscribers) => subscribers,
            FlightState::Idle => Vec::new(),
        }
    }
}

impl<T, E> Drop for CycleGuard<'_, T, E> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self
                .flight
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *state = FlightState::Idle;
        }
    }
}
