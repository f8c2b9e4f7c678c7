use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::auth::session::{AuthEvent, AuthState};
use crate::auth::user::StandardizedUser;
use crate::events::{EventStream, Subscriber, EVENT_BUFFER_SIZE, EVENT_BUS_CAPACITY};

/// Current user and session state as seen by the UI.
///
/// Only the auth client writes here. Everything else reads through the getters
/// or subscribes to [`AuthEvent`]s.
pub struct SessionStore {
    user: RwLock<Option<StandardizedUser>>,
    state: RwLock<AuthState>,
    events: EventStream<AuthEvent>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            user: RwLock::new(None),
            state: RwLock::new(AuthState::Unloaded),
            events: EventStream::new(EVENT_BUS_CAPACITY, EVENT_BUFFER_SIZE),
        }
    }

    /// Replace the current user. `None` signs the user out.
    pub fn set_user(&self, user: Option<StandardizedUser>) {
        let logged_in = user.is_some();
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = user.clone();
        debug!(logged_in, "Current user updated");
        self.events.publish(AuthEvent::UserChanged { user });
        self.set_state(if logged_in {
            AuthState::LoggedIn
        } else {
            AuthState::LoggedOut
        });
    }

    pub fn current_user(&self) -> Option<StandardizedUser> {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn user_is_logged_in(&self) -> bool {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Backend id of the current user, 0 when signed out or unknown
    pub fn user_id(&self) -> u64 {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, StandardizedUser::id)
    }

    pub fn state(&self) -> AuthState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `to`, publishing a transition event when the state actually changes
    pub fn set_state(&self, to: AuthState) {
        let from = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, to)
        };
        if from != to {
            debug!(?from, ?to, "Auth state changed");
            self.events.publish(AuthEvent::StateChanged { from, to });
        }
    }

    pub(crate) fn publish(&self, event: AuthEvent) {
        self.events.publish(event);
    }

    pub fn subscribe(&self) -> Subscriber<AuthEvent> {
        self.events.subscribe()
    }

    /// Most recent events, oldest first, for a view that subscribes late
    pub fn recent_events(&self) -> Vec<AuthEvent> {
        self.events.recent()
    }

    /// Forget the user and return to `Unloaded`
    pub fn reset(&self) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.set_state(AuthState::Unloaded);
        self.events.clear_buffer();
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
