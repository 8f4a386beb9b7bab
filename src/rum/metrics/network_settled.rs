//! Time-to-network-settled: how long after a view started its initial resources kept loading.
//!
//! The metric watches resources starting close to the view start (per an injected predicate) and
//! resolves, once every tracked resource completed, to the largest per-resource contribution. One
//! instance covers one view.

use std::collections::HashMap;

use crate::rum::app_state::AppStateHistory;
use crate::{Str, Timestamp};

/// Everything a predicate can see about a starting resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceStartInfo {
    /// URL of the resource.
    pub url: Str,
    /// Time from the view start to the resource start. Never negative.
    pub time_since_view_start: chrono::Duration,
    /// Name of the view the resource belongs to.
    pub view_name: Str,
}

/// Classifies starting resources as part of a view's initial load.
///
/// Only initial resources gate settling; everything else a view loads later is ignored by the
/// metric.
pub trait InitialResourcePredicate {
    /// Returns `true` if the resource belongs to the view's initial load.
    fn is_initial_resource(&self, resource: &ResourceStartInfo) -> bool;
}

impl<F: Fn(&ResourceStartInfo) -> bool> InitialResourcePredicate for F {
    fn is_initial_resource(&self, resource: &ResourceStartInfo) -> bool {
        self(resource)
    }
}

/// The default [`InitialResourcePredicate`]: accepts resources starting within a fixed window
/// from the view start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBasedInitialResourcePredicate {
    threshold: chrono::Duration,
}

impl TimeBasedInitialResourcePredicate {
    /// Default value for the acceptance window, in milliseconds.
    pub const DEFAULT_THRESHOLD_MS: i64 = 100;

    /// Creates a predicate accepting resources starting within `threshold` of the view start.
    pub fn new(threshold: chrono::Duration) -> TimeBasedInitialResourcePredicate {
        TimeBasedInitialResourcePredicate { threshold }
    }
}

impl Default for TimeBasedInitialResourcePredicate {
    fn default() -> TimeBasedInitialResourcePredicate {
        TimeBasedInitialResourcePredicate::new(chrono::Duration::milliseconds(
            TimeBasedInitialResourcePredicate::DEFAULT_THRESHOLD_MS,
        ))
    }
}

impl InitialResourcePredicate for TimeBasedInitialResourcePredicate {
    fn is_initial_resource(&self, resource: &ResourceStartInfo) -> bool {
        resource.time_since_view_start < self.threshold
    }
}

/// Why a network-settled value is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoValueReason {
    /// No resource qualified as an initial resource for this view.
    NoInitialResources,
    /// At least one initial resource has not completed yet.
    NotSettledYet,
    /// Every initial resource was dropped or discarded, so nothing contributed a value.
    NoResourceContributions,
    /// The app left the foreground while the initial resources were loading.
    AppNotInForeground,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceState {
    /// Started and not yet completed.
    Pending { started_at: Timestamp },
    Completed {
        contribution: chrono::Duration,
        completed_at: Timestamp,
    },
    /// Tombstoned: no longer gates settling and contributes nothing.
    Dropped,
}

/// Per-view "time to network settled" state machine.
///
/// Create one instance when a view starts and feed it the view's resource callbacks;
/// [`value`][NetworkSettledMetric::value] resolves once all tracked resources completed. Driven
/// from the host's serial event-processing queue, so it carries no locks.
pub struct NetworkSettledMetric {
    view_start: Timestamp,
    view_name: Str,
    predicate: Box<dyn InitialResourcePredicate + Send>,
    resources: HashMap<Str, ResourceState>,
    /// Start of the earliest tracked resource, for the foreground check.
    first_resource_start: Option<Timestamp>,
    view_stopped: bool,
}

impl NetworkSettledMetric {
    /// Creates the metric for a view started at `view_start`, with the default time-based
    /// predicate.
    pub fn new(view_start: Timestamp, view_name: &Str) -> NetworkSettledMetric {
        NetworkSettledMetric::with_predicate(
            view_start,
            view_name,
            TimeBasedInitialResourcePredicate::default(),
        )
    }

    /// Creates the metric with a caller-supplied predicate.
    pub fn with_predicate(
        view_start: Timestamp,
        view_name: &Str,
        predicate: impl InitialResourcePredicate + Send + 'static,
    ) -> NetworkSettledMetric {
        NetworkSettledMetric {
            view_start,
            view_name: view_name.clone(),
            predicate: Box::new(predicate),
            resources: HashMap::new(),
            first_resource_start: None,
            view_stopped: false,
        }
    }

    /// Registers a resource start.
    ///
    /// Resources starting before the view, rejected by the predicate, or starting after the view
    /// was stopped are not tracked.
    pub fn track_resource_start(&mut self, at: Timestamp, resource_id: &Str, url: &Str) {
        if self.view_stopped || at < self.view_start {
            return;
        }
        let info = ResourceStartInfo {
            url: url.clone(),
            time_since_view_start: at - self.view_start,
            view_name: self.view_name.clone(),
        };
        if !self.predicate.is_initial_resource(&info) {
            return;
        }
        self.first_resource_start = Some(match self.first_resource_start {
            Some(first) => first.min(at),
            None => at,
        });
        self.resources
            .insert(resource_id.clone(), ResourceState::Pending { started_at: at });
    }

    /// Completes a tracked resource.
    ///
    /// The contribution is the explicit `duration` when provided, otherwise the time from the
    /// view start to `at`. Completions for untracked resources are ignored; completions predating
    /// their start and negative durations discard the resource.
    pub fn track_resource_end(
        &mut self,
        at: Timestamp,
        resource_id: &str,
        duration: Option<chrono::Duration>,
    ) {
        if self.view_stopped {
            return;
        }
        let Some(state) = self.resources.get_mut(resource_id) else {
            return;
        };
        let ResourceState::Pending { started_at } = *state else {
            return;
        };
        if at < started_at || duration.is_some_and(|d| d < chrono::Duration::zero()) {
            // Instrumentation race, not a programmer error. Exclude the resource silently.
            log::trace!(target: "rum", resource_id:display; "discarding resource with invalid timing");
            *state = ResourceState::Dropped;
            return;
        }
        let contribution = duration.unwrap_or(at - self.view_start);
        *state = ResourceState::Completed {
            contribution,
            completed_at: at,
        };
    }

    /// Tombstones a tracked resource: it stops gating settling and contributes nothing.
    pub fn track_resource_dropped(&mut self, resource_id: &str) {
        if self.view_stopped {
            return;
        }
        if let Some(state @ ResourceState::Pending { .. }) = self.resources.get_mut(resource_id) {
            *state = ResourceState::Dropped;
        }
    }

    /// Marks the view stopped. Later tracking calls become no-ops;
    /// [`value`][NetworkSettledMetric::value] keeps answering from the state as of the stop.
    pub fn track_view_was_stopped(&mut self) {
        self.view_stopped = true;
    }

    /// The metric value as of `at`.
    ///
    /// Available once every tracked resource completed no later than `at`, at least one resource
    /// contributed, and the app stayed in the foreground from the first resource start to the
    /// last completion. The value is the largest per-resource contribution.
    pub fn value(
        &self,
        at: Timestamp,
        app_state_history: &AppStateHistory,
    ) -> Result<chrono::Duration, NoValueReason> {
        if self.resources.is_empty() {
            return Err(NoValueReason::NoInitialResources);
        }

        let mut last_completion: Option<Timestamp> = None;
        let mut value: Option<chrono::Duration> = None;
        for state in self.resources.values() {
            match *state {
                ResourceState::Pending { .. } => return Err(NoValueReason::NotSettledYet),
                // A completion stamped after `at` has not happened yet from the caller's point
                // of view.
                ResourceState::Completed { completed_at, .. } if completed_at > at => {
                    return Err(NoValueReason::NotSettledYet)
                }
                ResourceState::Completed {
                    contribution,
                    completed_at,
                } => {
                    last_completion =
                        Some(last_completion.map_or(completed_at, |t| t.max(completed_at)));
                    value = Some(value.map_or(contribution, |v| v.max(contribution)));
                }
                ResourceState::Dropped => {}
            }
        }

        let (Some(first_start), Some(last_completion), Some(value)) =
            (self.first_resource_start, last_completion, value)
        else {
            return Err(NoValueReason::NoResourceContributions);
        };
        if !app_state_history.is_foreground_throughout(first_start, last_completion) {
            return Err(NoValueReason::AppNotInForeground);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use crate::rum::app_state::AppState;

    use super::*;

    fn view_start() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn foreground_history() -> AppStateHistory {
        AppStateHistory::new(AppState::Active, view_start() - Duration::minutes(1))
    }

    fn new_metric() -> NetworkSettledMetric {
        NetworkSettledMetric::new(view_start(), &Str::from("Home"))
    }

    #[test]
    fn value_waits_for_all_initial_resources() {
        let t0 = view_start();
        let history = foreground_history();
        let mut metric = new_metric();

        metric.track_resource_start(
            t0 + Duration::milliseconds(10),
            &"r1".into(),
            &"https://example.com/1".into(),
        );
        metric.track_resource_start(
            t0 + Duration::milliseconds(20),
            &"r2".into(),
            &"https://example.com/2".into(),
        );
        metric.track_resource_start(
            t0 + Duration::milliseconds(30),
            &"r3".into(),
            &"https://example.com/3".into(),
        );

        metric.track_resource_end(t0 + Duration::seconds(1), "r1", None);
        assert_eq!(
            metric.value(t0 + Duration::seconds(10), &history),
            Err(NoValueReason::NotSettledYet)
        );

        metric.track_resource_end(t0 + Duration::seconds(3), "r2", None);
        assert_eq!(
            metric.value(t0 + Duration::seconds(10), &history),
            Err(NoValueReason::NotSettledYet)
        );

        metric.track_resource_end(t0 + Duration::seconds(2), "r3", None);
        // All settled: the slowest resource defines the value.
        assert_eq!(
            metric.value(t0 + Duration::seconds(10), &history),
            Ok(Duration::seconds(3))
        );
    }

    #[test]
    fn explicit_duration_wins_over_end_time() {
        let t0 = view_start();
        let history = foreground_history();
        let mut metric = new_metric();

        metric.track_resource_start(t0, &"r1".into(), &"https://example.com/1".into());
        metric.track_resource_start(t0, &"r2".into(), &"https://example.com/2".into());

        // r1 reports a measured duration longer than its wall-clock window.
        metric.track_resource_end(t0 + Duration::seconds(1), "r1", Some(Duration::seconds(5)));
        metric.track_resource_end(t0 + Duration::seconds(2), "r2", None);

        assert_eq!(
            metric.value(t0 + Duration::seconds(10), &history),
            Ok(Duration::seconds(5))
        );
    }

    #[test]
    fn value_is_relative_to_the_query_instant() {
        let t0 = view_start();
        let history = foreground_history();
        let mut metric = new_metric();

        metric.track_resource_start(t0, &"r1".into(), &"https://example.com/1".into());
        metric.track_resource_end(t0 + Duration::seconds(2), "r1", None);

        // Asking about an instant before the completion happened.
        assert_eq!(
            metric.value(t0 + Duration::seconds(1), &history),
            Err(NoValueReason::NotSettledYet)
        );
        assert_eq!(
            metric.value(t0 + Duration::seconds(2), &history),
            Ok(Duration::seconds(2))
        );
    }

    #[test]
    fn late_resources_are_not_initial() {
        let t0 = view_start();
        let history = foreground_history();
        let mut metric = new_metric();

        // Starts past the default 100ms window.
        metric.track_resource_start(
            t0 + Duration::milliseconds(200),
            &"r1".into(),
            &"https://example.com/1".into(),
        );

        assert_eq!(
            metric.value(t0 + Duration::seconds(10), &history),
            Err(NoValueReason::NoInitialResources)
        );
    }

    #[test]
    fn resources_predating_the_view_are_inert() {
        let t0 = view_start();
        let history = foreground_history();
        let mut metric = new_metric();

        metric.track_resource_start(
            t0 - Duration::seconds(1),
            &"r1".into(),
            &"https://example.com/1".into(),
        );
        metric.track_resource_end(t0 + Duration::seconds(1), "r1", None);

        assert_eq!(
            metric.value(t0 + Duration::seconds(10), &history),
            Err(NoValueReason::NoInitialResources)
        );
    }

    #[test]
    fn custom_predicate_filters_by_url() {
        let t0 = view_start();
        let history = foreground_history();
        let mut metric = NetworkSettledMetric::with_predicate(
            t0,
            &Str::from("Home"),
            |resource: &ResourceStartInfo| resource.url.ends_with(".css"),
        );

        metric.track_resource_start(t0, &"r1".into(), &"https://example.com/app.css".into());
        metric.track_resource_start(t0, &"r2".into(), &"https://example.com/analytics.js".into());

        metric.track_resource_end(t0 + Duration::seconds(1), "r1", None);
        // r2 was never tracked, so its completion does not gate the value.
        assert_eq!(
            metric.value(t0 + Duration::seconds(10), &history),
            Ok(Duration::seconds(1))
        );
    }

    #[test]
    fn invalid_timings_discard_the_resource() {
        let t0 = view_start();
        let history = foreground_history();
        let mut metric = new_metric();

        metric.track_resource_start(
            t0 + Duration::milliseconds(50),
            &"r1".into(),
            &"https://example.com/1".into(),
        );
        // Ends before it started.
        metric.track_resource_end(t0, "r1", None);

        assert_eq!(
            metric.value(t0 + Duration::seconds(10), &history),
            Err(NoValueReason::NoResourceContributions)
        );

        let mut metric = new_metric();
        metric.track_resource_start(t0, &"r1".into(), &"https://example.com/1".into());
        metric.track_resource_end(t0 + Duration::seconds(1), "r1", Some(Duration::seconds(-1)));

        assert_eq!(
            metric.value(t0 + Duration::seconds(10), &history),
            Err(NoValueReason::NoResourceContributions)
        );
    }

    #[test]
    fn unknown_resource_ends_are_ignored() {
        let t0 = view_start();
        let history = foreground_history();
        let mut metric = new_metric();

        metric.track_resource_start(t0, &"r1".into(), &"https://example.com/1".into());
        metric.track_resource_end(t0 + Duration::seconds(1), "other", None);

        assert_eq!(
            metric.value(t0 + Duration::seconds(10), &history),
            Err(NoValueReason::NotSettledYet)
        );
    }

    #[test]
    fn dropped_resources_stop_gating_settling() {
        let t0 = view_start();
        let history = foreground_history();
        let mut metric = new_metric();

        metric.track_resource_start(t0, &"r1".into(), &"https://example.com/1".into());
        metric.track_resource_start(t0, &"r2".into(), &"https://example.com/2".into());

        metric.track_resource_end(t0 + Duration::seconds(1), "r1", None);
        metric.track_resource_dropped("r2");

        assert_eq!(
            metric.value(t0 + Duration::seconds(10), &history),
            Ok(Duration::seconds(1))
        );
    }

    #[test]
    fn all_resources_dropped_yields_no_contributions() {
        let t0 = view_start();
        let history = foreground_history();
        let mut metric = new_metric();

        metric.track_resource_start(t0, &"r1".into(), &"https://example.com/1".into());
        metric.track_resource_dropped("r1");

        assert_eq!(
            metric.value(t0 + Duration::seconds(10), &history),
            Err(NoValueReason::NoResourceContributions)
        );
    }

    #[test]
    fn backgrounding_during_the_load_voids_the_value() {
        let t0 = view_start();
        let mut history = foreground_history();
        history.append(AppState::Background, t0 + Duration::seconds(1));
        history.append(AppState::Active, t0 + Duration::seconds(2));

        let mut metric = new_metric();
        metric.track_resource_start(t0, &"r1".into(), &"https://example.com/1".into());
        metric.track_resource_end(t0 + Duration::seconds(3), "r1", None);

        assert_eq!(
            metric.value(t0 + Duration::seconds(10), &history),
            Err(NoValueReason::AppNotInForeground)
        );
    }

    #[test]
    fn tracking_stops_once_the_view_is_stopped() {
        let t0 = view_start();
        let history = foreground_history();
        let mut metric = new_metric();

        metric.track_resource_start(t0, &"r1".into(), &"https://example.com/1".into());
        metric.track_view_was_stopped();
        metric.track_resource_end(t0 + Duration::seconds(1), "r1", None);

        // The completion after the stop never registered.
        assert_eq!(
            metric.value(t0 + Duration::seconds(10), &history),
            Err(NoValueReason::NotSettledYet)
        );
    }
}
