//! Interaction-to-next-view: how long from the user's last interaction in a view to the start of
//! the next view.

use std::collections::HashMap;

use crate::{Str, Timestamp};

/// Type of a tracked user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    Tap,
    Click,
    Swipe,
    Scroll,
    /// A host-defined action.
    Custom,
}

impl ActionType {
    /// The instant from which time-to-next-view is measured. Continuous actions (swipes and
    /// scrolls) lead to the next view when they end, discrete ones when they start.
    fn reference_point(self, start: Timestamp, end: Timestamp) -> Timestamp {
        match self {
            ActionType::Tap | ActionType::Click | ActionType::Custom => start,
            ActionType::Swipe | ActionType::Scroll => end,
        }
    }
}

/// Everything a predicate can see about a candidate action.
#[derive(Debug, Clone, PartialEq)]
pub struct NextViewActionParams {
    /// Type of the action.
    pub action_type: ActionType,
    /// Name of the action.
    pub name: Str,
    /// Time from the action's reference point to the next view's start.
    pub time_to_next_view: chrono::Duration,
    /// Name of the view that started.
    pub next_view_name: Str,
}

/// Picks the action that caused the next view to appear.
///
/// Candidates are offered newest first; the first accepted action provides the metric value.
pub trait NextViewActionPredicate {
    /// Returns `true` if `action` is the interaction that led to the next view.
    fn is_last_action(&self, action: &NextViewActionParams) -> bool;
}

impl<F: Fn(&NextViewActionParams) -> bool> NextViewActionPredicate for F {
    fn is_last_action(&self, action: &NextViewActionParams) -> bool {
        self(action)
    }
}

/// The default [`NextViewActionPredicate`]: accepts an action iff its time to the next view falls
/// within `[0, threshold)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBasedNextViewActionPredicate {
    threshold: chrono::Duration,
}

impl TimeBasedNextViewActionPredicate {
    /// Default value for the acceptance window, in milliseconds.
    pub const DEFAULT_THRESHOLD_MS: i64 = 3_000;

    /// Creates a predicate accepting actions within `threshold` of the next view's start.
    pub fn new(threshold: chrono::Duration) -> TimeBasedNextViewActionPredicate {
        TimeBasedNextViewActionPredicate { threshold }
    }
}

impl Default for TimeBasedNextViewActionPredicate {
    fn default() -> TimeBasedNextViewActionPredicate {
        TimeBasedNextViewActionPredicate::new(chrono::Duration::milliseconds(
            TimeBasedNextViewActionPredicate::DEFAULT_THRESHOLD_MS,
        ))
    }
}

impl NextViewActionPredicate for TimeBasedNextViewActionPredicate {
    fn is_last_action(&self, action: &NextViewActionParams) -> bool {
        action.time_to_next_view >= chrono::Duration::zero()
            && action.time_to_next_view < self.threshold
    }
}

/// Why an interaction-to-next-view value is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoValueReason {
    /// The view is the first tracked view; nothing could have led to it.
    NoPrecedingView,
    /// The preceding view tracked no actions.
    NoTrackedActions,
    /// Every action in the preceding view predates that view's start.
    InvalidTrackedActions,
    /// No tracked action was accepted as the last interaction.
    NoLastInteraction,
    /// The view completed and its value was removed, or the view was never tracked.
    PreviousViewRemoved,
}

#[derive(Debug, Clone)]
struct TrackedAction {
    action_type: ActionType,
    name: Str,
    start: Timestamp,
    end: Timestamp,
}

/// Actions attributed to the most recently started view.
#[derive(Debug, Clone)]
struct ViewActions {
    view_id: Str,
    start: Timestamp,
    actions: Vec<TrackedAction>,
}

/// Session-wide "interaction to next view" state machine.
///
/// Feed it every view start, action, and view completion from the host's serial event-processing
/// queue. When a view starts, its value is derived from the previous view's actions and stays
/// frozen: actions arriving later never rewrite it. A view's value is discarded once the view
/// completes.
pub struct InteractionToNextViewMetric {
    predicate: Box<dyn NextViewActionPredicate + Send>,
    /// The most recently started view; source of the value for the next one.
    current_view: Option<ViewActions>,
    values: HashMap<Str, Result<chrono::Duration, NoValueReason>>,
}

impl InteractionToNextViewMetric {
    /// Creates the metric with the default time-based predicate.
    pub fn new() -> InteractionToNextViewMetric {
        InteractionToNextViewMetric::with_predicate(TimeBasedNextViewActionPredicate::default())
    }

    /// Creates the metric with a caller-supplied predicate.
    pub fn with_predicate(
        predicate: impl NextViewActionPredicate + Send + 'static,
    ) -> InteractionToNextViewMetric {
        InteractionToNextViewMetric {
            predicate: Box::new(predicate),
            current_view: None,
            values: HashMap::new(),
        }
    }

    /// Tracks a view start, deriving the new view's value from the preceding view's actions.
    pub fn track_view_start(&mut self, at: Timestamp, view_id: &Str, view_name: &Str) {
        let value = match &self.current_view {
            None => Err(NoValueReason::NoPrecedingView),
            Some(previous) => self.compute_value(previous, at, view_name),
        };
        self.values.insert(view_id.clone(), value);
        self.current_view = Some(ViewActions {
            view_id: view_id.clone(),
            start: at,
            actions: Vec::new(),
        });
    }

    /// Tracks an action attributed to view `view_id`.
    ///
    /// Actions for views other than the current one are inert, as are actions ending before they
    /// start.
    pub fn track_action(
        &mut self,
        start: Timestamp,
        end: Timestamp,
        action_type: ActionType,
        name: &Str,
        view_id: &str,
    ) {
        let Some(current) = &mut self.current_view else {
            return;
        };
        if current.view_id.as_str() != view_id {
            return;
        }
        if end < start {
            log::trace!(target: "rum", action_name:display = name; "discarding action with invalid timing");
            return;
        }
        current.actions.push(TrackedAction {
            action_type,
            name: name.clone(),
            start,
            end,
        });
    }

    /// Tracks the completion of view `view_id`, removing its stored value.
    ///
    /// The completed view remains the source view for the next view start.
    pub fn track_view_complete(&mut self, view_id: &str) {
        self.values.remove(view_id);
    }

    /// The value for view `view_id`: the time from the last qualifying interaction in the
    /// preceding view to this view's start.
    pub fn value(&self, view_id: &str) -> Result<chrono::Duration, NoValueReason> {
        self.values
            .get(view_id)
            .copied()
            .unwrap_or(Err(NoValueReason::PreviousViewRemoved))
    }

    fn compute_value(
        &self,
        previous: &ViewActions,
        next_view_start: Timestamp,
        next_view_name: &Str,
    ) -> Result<chrono::Duration, NoValueReason> {
        if previous.actions.is_empty() {
            return Err(NoValueReason::NoTrackedActions);
        }
        let mut candidates: Vec<&TrackedAction> = previous
            .actions
            .iter()
            .filter(|action| action.start >= previous.start)
            .collect();
        if candidates.is_empty() {
            return Err(NoValueReason::InvalidTrackedActions);
        }

        candidates.sort_by_key(|action| action.start);
        for action in candidates.iter().rev() {
            let reference = action.action_type.reference_point(action.start, action.end);
            let time_to_next_view = next_view_start - reference;
            let params = NextViewActionParams {
                action_type: action.action_type,
                name: action.name.clone(),
                time_to_next_view,
                next_view_name: next_view_name.clone(),
            };
            if self.predicate.is_last_action(&params) {
                return Ok(time_to_next_view);
            }
        }
        Err(NoValueReason::NoLastInteraction)
    }
}

impl Default for InteractionToNextViewMetric {
    fn default() -> InteractionToNextViewMetric {
        InteractionToNextViewMetric::new()
    }
}
