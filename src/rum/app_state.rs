//! Application process state and its history.
//!
//! The host appends lifecycle transitions as they happen; metrics query whether the app stayed in
//! the foreground across a time window.

use serde::{Deserialize, Serialize};

use crate::Timestamp;

/// State of the application process.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    /// Running in the foreground and receiving events.
    Active,
    /// Running in the foreground but not receiving events (e.g. a system prompt is shown over the
    /// app).
    Inactive,
    /// Running in the background.
    Background,
}

impl AppState {
    /// Whether this state counts as running in the foreground.
    pub fn is_foreground(self) -> bool {
        matches!(self, AppState::Active | AppState::Inactive)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Transition {
    at: Timestamp,
    state: AppState,
}

/// An ordered timeline of app-state transitions.
///
/// The first entry is the state the history started in. Instants before the history started have
/// an unknown state: [`state_at`][AppStateHistory::state_at] answers `None` there, and windows
/// reaching into the unknown stretch never count as foreground.
#[derive(Debug, Clone)]
pub struct AppStateHistory {
    transitions: Vec<Transition>,
}

impl AppStateHistory {
    /// Creates a history starting at `at` in `state`.
    pub fn new(state: AppState, at: Timestamp) -> AppStateHistory {
        AppStateHistory {
            transitions: vec![Transition { at, state }],
        }
    }

    /// Appends a transition to `state` at `at`.
    ///
    /// Transitions must arrive in time order; one earlier than the latest recorded transition is
    /// ignored.
    pub fn append(&mut self, state: AppState, at: Timestamp) {
        if self.transitions.last().is_some_and(|latest| at < latest.at) {
            log::trace!(target: "rum", "ignoring out-of-order app state transition");
            return;
        }
        self.transitions.push(Transition { at, state });
    }

    /// The state in effect at `at`, or `None` if `at` predates the history.
    pub fn state_at(&self, at: Timestamp) -> Option<AppState> {
        self.transitions
            .iter()
            .take_while(|transition| transition.at <= at)
            .last()
            .map(|transition| transition.state)
    }

    /// Returns `true` if the app was in the foreground for the whole `[from, to]` window.
    pub fn is_foreground_throughout(&self, from: Timestamp, to: Timestamp) -> bool {
        if to < from {
            return false;
        }
        let Some(state) = self.state_at(from) else {
            return false;
        };
        if !state.is_foreground() {
            return false;
        }
        self.transitions
            .iter()
            .filter(|transition| transition.at > from && transition.at <= to)
            .all(|transition| transition.state.is_foreground())
    }
}
