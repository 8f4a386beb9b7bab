//! Reconciling a crash report from the previous process against the session state it persisted.

use std::sync::Arc;

use crate::rum::event::{
    ApplicationInfo, CrashAttributes, CrashCount, ErrorCategory, ErrorCount, ErrorDetails,
    ErrorViewRef, RumErrorEvent, RumEvent, RumViewEvent, SessionInfo, ViewDetails,
};
use crate::{Clock, EventWriter, Str, SystemClock, Timestamp};

use super::context::{CrashContext, LastSessionState, SessionKnowledge, TrackingConsent};
use super::report::CrashReport;

/// Name of the view synthesized for crashes during app launch.
pub const APP_LAUNCH_VIEW_NAME: &str = "ApplicationLaunch";
/// URL of the view synthesized for crashes during app launch.
pub const APP_LAUNCH_VIEW_URL: &str = "com/rum-sdk/application-launch/view";
/// Name of the view synthesized for crashes in the background.
pub const BACKGROUND_VIEW_NAME: &str = "Background";
/// URL of the view synthesized for crashes in the background.
pub const BACKGROUND_VIEW_URL: &str = "com/rum-sdk/background/view";

/// Crashes reported more than this many hours after the last view update link to the stale view's
/// ids without re-emitting the view itself.
const STALE_VIEW_HOURS: i64 = 4;

/// A caller-supplied hook that may rewrite an event before it is written.
///
/// Returning `None` keeps the original event: mappers can redact or transform crash events but
/// never suppress them.
pub trait EventMapper<E>: Send + Sync {
    /// Maps `event` to its rewritten version, or `None` to keep the original.
    fn map(&self, event: E) -> Option<E>;
}

impl<E, F: Fn(E) -> Option<E> + Send + Sync> EventMapper<E> for F {
    fn map(&self, event: E) -> Option<E> {
        self(event)
    }
}

/// Configuration for [`CrashReconciler`].
#[derive(Debug, Clone)]
pub struct CrashReconcilerConfig {
    /// RUM application id stamped on synthesized events.
    pub application_id: Str,
    /// Whether crashes with no active view that happened in the background produce events.
    pub background_event_tracking_enabled: bool,
    /// `source_type` stamped on error events unless the snapshot carries an override.
    pub default_source_type: Str,
}

/// Decides whether and how a crash captured in the previous process becomes RUM events.
///
/// [`receive`][CrashReconciler::receive] runs once, early in process lifetime, with the pending
/// crash report and the snapshot the crashed process persisted. It writes zero, one, or two
/// retroactive events: a view update closing the crashed view and an error describing the crash,
/// linked by the same application, session, and view ids.
pub struct CrashReconciler {
    config: CrashReconcilerConfig,
    writer: Box<dyn EventWriter<RumEvent> + Send + Sync>,
    clock: Arc<dyn Clock>,
    view_event_mapper: Option<Box<dyn EventMapper<RumViewEvent>>>,
    error_event_mapper: Option<Box<dyn EventMapper<RumErrorEvent>>>,
}

/// Which fixed view to synthesize when no view was active at crash time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SynthesizedView {
    AppLaunch,
    Background,
}

impl SynthesizedView {
    fn name(self) -> &'static str {
        match self {
            SynthesizedView::AppLaunch => APP_LAUNCH_VIEW_NAME,
            SynthesizedView::Background => BACKGROUND_VIEW_NAME,
        }
    }

    fn url(self) -> &'static str {
        match self {
            SynthesizedView::AppLaunch => APP_LAUNCH_VIEW_URL,
            SynthesizedView::Background => BACKGROUND_VIEW_URL,
        }
    }
}

impl CrashReconciler {
    /// Creates a reconciler timestamping undated reports with the system clock.
    pub fn new(
        config: CrashReconcilerConfig,
        writer: Box<dyn EventWriter<RumEvent> + Send + Sync>,
    ) -> CrashReconciler {
        CrashReconciler::with_clock(config, writer, Arc::new(SystemClock))
    }

    /// Creates a reconciler with the given clock.
    pub fn with_clock(
        config: CrashReconcilerConfig,
        writer: Box<dyn EventWriter<RumEvent> + Send + Sync>,
        clock: Arc<dyn Clock>,
    ) -> CrashReconciler {
        CrashReconciler {
            config,
            writer,
            clock,
            view_event_mapper: None,
            error_event_mapper: None,
        }
    }

    /// Sets a mapper applied to every emitted view event.
    pub fn with_view_event_mapper(
        mut self,
        mapper: impl EventMapper<RumViewEvent> + 'static,
    ) -> CrashReconciler {
        self.view_event_mapper = Some(Box::new(mapper));
        self
    }

    /// Sets a mapper applied to every emitted error event.
    pub fn with_error_event_mapper(
        mut self,
        mapper: impl EventMapper<RumErrorEvent> + 'static,
    ) -> CrashReconciler {
        self.error_event_mapper = Some(Box::new(mapper));
        self
    }

    /// Reconciles one crash report against the persisted snapshot.
    ///
    /// Crashes from sessions that were rejected by sampling, that happened in the background with
    /// background event tracking disabled, or whose last view already records a crash are dropped.
    /// Otherwise the crash is attributed to the last known view, or to a synthesized app-launch or
    /// background view when none was active.
    pub fn receive(&self, report: CrashReport, context: &CrashContext) {
        if context.tracking_consent != TrackingConsent::Granted {
            log::debug!(target: "rum", "dropping crash report, tracking consent was not granted");
            return;
        }

        // The report is stamped with device time; correct it to server time like any live event.
        let crash_date = report.date.unwrap_or_else(|| self.clock.now());
        let error_date = crash_date + context.server_time_offset();

        let knowledge = SessionKnowledge::from_snapshot(context);
        if !knowledge.is_sampled() {
            log::debug!(target: "rum", "dropping crash report, previous session was not sampled");
            return;
        }

        match knowledge {
            SessionKnowledge::NoSession => {
                self.send_crash_during_app_launch(&report, context, error_date)
            }
            SessionKnowledge::SessionNoView { session } => {
                self.send_crash_with_no_active_view(&report, context, &session, error_date)
            }
            SessionKnowledge::SessionWithView { view, .. } => {
                self.send_crash_with_last_view(&report, context, *view, error_date)
            }
        }
    }

    /// The previous process died before tracking any session: the crash happened during launch.
    fn send_crash_during_app_launch(
        &self,
        report: &CrashReport,
        context: &CrashContext,
        error_date: Timestamp,
    ) {
        let naming = if context.app_in_foreground {
            SynthesizedView::AppLaunch
        } else if self.config.background_event_tracking_enabled {
            SynthesizedView::Background
        } else {
            log::debug!(target: "rum", "dropping crash report, app was in background and background event tracking is disabled");
            return;
        };
        self.send_synthesized(report, context, naming, error_date);
    }

    /// A session existed but no view was active when the snapshot was written.
    fn send_crash_with_no_active_view(
        &self,
        report: &CrashReport,
        context: &CrashContext,
        session: &LastSessionState,
        error_date: Timestamp,
    ) {
        let crashed_before_first_view =
            session.is_initial_session && !session.has_tracked_any_view;
        let naming = if crashed_before_first_view && context.app_in_foreground {
            SynthesizedView::AppLaunch
        } else if self.config.background_event_tracking_enabled {
            SynthesizedView::Background
        } else {
            log::debug!(target: "rum", "dropping crash report, no active view and background event tracking is disabled");
            return;
        };
        self.send_synthesized(report, context, naming, error_date);
    }

    /// A view was active at crash time: update it with the crash or, if it is too old, only link
    /// the error to its ids.
    fn send_crash_with_last_view(
        &self,
        report: &CrashReport,
        context: &CrashContext,
        view: RumViewEvent,
        error_date: Timestamp,
    ) {
        if view.crash_count() >= 1 {
            // The previous process already reconciled a crash into this view; reporting another
            // one across restarts would double count it.
            log::debug!(target: "rum", "dropping crash report, last view already records a crash");
            return;
        }

        let attributes = crash_attributes(report);
        if error_date - view.date > chrono::Duration::hours(STALE_VIEW_HOURS) {
            let error = self.error_event(report, &view, context, error_date, attributes);
            self.write_error(error);
        } else {
            let updated = close_view_with_crash(view, attributes.clone());
            let error = self.error_event(report, &updated, context, error_date, attributes);
            self.write_view(updated);
            self.write_error(error);
        }
    }

    /// Synthesizes a fresh session with a single closed view and emits it with its crash error.
    fn send_synthesized(
        &self,
        report: &CrashReport,
        context: &CrashContext,
        naming: SynthesizedView,
        error_date: Timestamp,
    ) {
        let attributes = crash_attributes(report);
        let view = RumViewEvent {
            // Strictly before the error, so consumers ordering by timestamp keep the view first.
            date: error_date - chrono::Duration::milliseconds(1),
            application: ApplicationInfo {
                id: self.config.application_id.clone(),
            },
            session: SessionInfo { id: new_id() },
            view: ViewDetails {
                id: new_id(),
                name: Some(naming.name().into()),
                url: naming.url().into(),
                crash: Some(CrashCount { count: 1 }),
                error: ErrorCount { count: 1 },
                is_active: Some(false),
            },
            usr: context.user_info.clone(),
            connectivity: context.connectivity.clone(),
            device: context.device.clone(),
            service: context.service.clone(),
            version: context.version.clone(),
            build_version: context.build_number.clone(),
            source: context.source.clone(),
            document_version: 1,
            crash_details: Some(attributes.clone()),
        };
        let error = self.error_event(report, &view, context, error_date, attributes);
        self.write_view(view);
        self.write_error(error);
    }

    /// Builds the crash error linked to `view`.
    fn error_event(
        &self,
        report: &CrashReport,
        view: &RumViewEvent,
        context: &CrashContext,
        error_date: Timestamp,
        attributes: CrashAttributes,
    ) -> RumErrorEvent {
        let source_type = context
            .source_type_override
            .clone()
            .unwrap_or_else(|| self.config.default_source_type.clone());
        RumErrorEvent {
            date: error_date,
            application: view.application.clone(),
            session: view.session.clone(),
            view: ErrorViewRef {
                id: view.view.id.clone(),
                name: view.view.name.clone(),
                url: Some(view.view.url.clone()),
            },
            error: ErrorDetails {
                message: report.message.clone(),
                error_type: Some(report.crash_type.clone()),
                stack: Some(report.stack.clone()),
                category: Some(ErrorCategory::Exception),
                is_crash: Some(true),
                source_type: Some(source_type),
            },
            usr: view.usr.clone(),
            connectivity: view.connectivity.clone(),
            device: view.device.clone(),
            service: view.service.clone(),
            version: view.version.clone(),
            build_version: view.build_version.clone(),
            source: view.source.clone(),
            crash_details: Some(attributes),
        }
    }

    fn write_view(&self, view: RumViewEvent) {
        let view = match &self.view_event_mapper {
            // A mapper returning None keeps the original: crash events are never suppressed.
            Some(mapper) => mapper.map(view.clone()).unwrap_or(view),
            None => view,
        };
        self.writer.write(RumEvent::View(view));
    }

    fn write_error(&self, error: RumErrorEvent) {
        let error = match &self.error_event_mapper {
            Some(mapper) => mapper.map(error.clone()).unwrap_or(error),
            None => error,
        };
        self.writer.write(RumEvent::Error(error));
    }
}

/// Closes `view` with a crash: bumps the crash and error counters, deactivates it, and advances
/// the document version. Every other field is preserved verbatim.
fn close_view_with_crash(mut view: RumViewEvent, attributes: CrashAttributes) -> RumViewEvent {
    view.view.crash = Some(CrashCount {
        count: view.crash_count() + 1,
    });
    view.view.error.count += 1;
    view.view.is_active = Some(false);
    view.document_version += 1;
    view.crash_details = Some(attributes);
    view
}

/// Copies the report's side details carried on both emitted events.
fn crash_attributes(report: &CrashReport) -> CrashAttributes {
    CrashAttributes {
        threads: (!report.threads.is_empty()).then(|| report.threads.clone()),
        binary_images: (!report.binary_images.is_empty()).then(|| report.binary_images.clone()),
        meta: Some(report.meta.clone()),
        was_truncated: Some(report.was_truncated),
    }
}

fn new_id() -> Str {
    Str::from(uuid::Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::{Duration, TimeZone, Utc};

    use crate::rum::crash::{CrashMeta, CrashThread};
    use crate::rum::event::{DeviceInfo, UserInfo};
    use crate::ManualClock;

    use super::*;

    fn crash_time() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn report() -> CrashReport {
        CrashReport {
            date: Some(crash_time()),
            crash_type: "SIGSEGV".into(),
            message: "Application crash: SIGSEGV (Segmentation violation)".into(),
            stack: "0   app   0x0000000100e00000".into(),
            threads: vec![CrashThread {
                name: "Thread 0".into(),
                stack: "0   app   0x0000000100e00000".into(),
                crashed: true,
            }],
            binary_images: Vec::new(),
            meta: CrashMeta::default(),
            was_truncated: false,
        }
    }

    fn last_view(started_at: Timestamp) -> RumViewEvent {
        RumViewEvent {
            date: started_at,
            application: ApplicationInfo { id: "app-1".into() },
            session: SessionInfo {
                id: "session-1".into(),
            },
            view: ViewDetails {
                id: "view-1".into(),
                name: Some("Checkout".into()),
                url: "com/example/checkout".into(),
                crash: None,
                error: ErrorCount { count: 2 },
                is_active: Some(true),
            },
            usr: Some(UserInfo {
                id: Some("user-1".into()),
                name: None,
                email: None,
            }),
            connectivity: None,
            device: None,
            service: Some("shop-app".into()),
            version: Some("1.2.3".into()),
            build_version: Some("42".into()),
            source: Some("ios".into()),
            document_version: 7,
            crash_details: None,
        }
    }

    fn granted_context() -> CrashContext {
        CrashContext {
            tracking_consent: TrackingConsent::Granted,
            ..CrashContext::default()
        }
    }

    fn config() -> CrashReconcilerConfig {
        CrashReconcilerConfig {
            application_id: "app-1".into(),
            background_event_tracking_enabled: false,
            default_source_type: "ios".into(),
        }
    }

    /// Collects written events for assertions.
    fn capturing_writer() -> (
        Arc<Mutex<Vec<RumEvent>>>,
        Box<dyn EventWriter<RumEvent> + Send + Sync>,
    ) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let writer = Box::new(move |event: RumEvent| {
            sink.lock().unwrap().push(event);
        });
        (events, writer)
    }

    fn reconcile(
        config: CrashReconcilerConfig,
        report: CrashReport,
        context: &CrashContext,
    ) -> Vec<RumEvent> {
        let (events, writer) = capturing_writer();
        let reconciler = CrashReconciler::new(config, writer);
        reconciler.receive(report, context);
        let events = events.lock().unwrap();
        events.clone()
    }

    #[test]
    fn crash_in_active_view_updates_view_and_emits_error() {
        let view_start = crash_time() - Duration::hours(1);
        let context = CrashContext {
            last_view_event: Some(last_view(view_start)),
            ..granted_context()
        };

        let events = reconcile(config(), report(), &context);

        assert_eq!(events.len(), 2);
        let RumEvent::View(view) = &events[0] else {
            panic!("expected a view event first, got {:?}", events[0]);
        };
        let RumEvent::Error(error) = &events[1] else {
            panic!("expected an error event second, got {:?}", events[1]);
        };

        // The view is replayed with its own timestamp, closed and counted up.
        assert_eq!(view.date, view_start);
        assert_eq!(view.view.crash, Some(CrashCount { count: 1 }));
        assert_eq!(view.view.error.count, 3);
        assert_eq!(view.view.is_active, Some(false));
        assert_eq!(view.document_version, 8);
        assert!(view.crash_details.is_some());

        // The error links to the same ids and carries the report.
        assert_eq!(error.date, crash_time());
        assert_eq!(error.session.id.as_str(), "session-1");
        assert_eq!(error.view.id.as_str(), "view-1");
        assert_eq!(error.error.error_type.as_deref(), Some("SIGSEGV"));
        assert_eq!(error.error.is_crash, Some(true));
        assert_eq!(error.error.category, Some(ErrorCategory::Exception));
        assert_eq!(error.error.source_type.as_deref(), Some("ios"));
        assert_eq!(error.usr, view.usr);
    }

    #[test]
    fn crash_in_view_already_recording_a_crash_is_dropped() {
        let mut view = last_view(crash_time() - Duration::minutes(5));
        view.view.crash = Some(CrashCount { count: 1 });
        let context = CrashContext {
            last_view_event: Some(view),
            ..granted_context()
        };

        assert_eq!(reconcile(config(), report(), &context), vec![]);
    }

    #[test]
    fn stale_view_crash_emits_error_only() {
        let view_start = crash_time() - Duration::hours(5);
        let context = CrashContext {
            last_view_event: Some(last_view(view_start)),
            ..granted_context()
        };

        let events = reconcile(config(), report(), &context);

        assert_eq!(events.len(), 1);
        let RumEvent::Error(error) = &events[0] else {
            panic!("expected an error event, got {:?}", events[0]);
        };
        assert_eq!(error.view.id.as_str(), "view-1");
        assert_eq!(error.session.id.as_str(), "session-1");
    }

    #[test]
    fn crash_threshold_is_measured_against_view_start() {
        // One minute under the threshold still updates the view.
        let view_start = crash_time() - Duration::hours(4) + Duration::minutes(1);
        let context = CrashContext {
            last_view_event: Some(last_view(view_start)),
            ..granted_context()
        };

        assert_eq!(reconcile(config(), report(), &context).len(), 2);
    }

    #[test]
    fn crash_before_any_session_synthesizes_app_launch_view() {
        let events = reconcile(config(), report(), &granted_context());

        assert_eq!(events.len(), 2);
        let RumEvent::View(view) = &events[0] else {
            panic!("expected a view event first, got {:?}", events[0]);
        };
        let RumEvent::Error(error) = &events[1] else {
            panic!("expected an error event second, got {:?}", events[1]);
        };

        assert_eq!(view.view.name.as_deref(), Some(APP_LAUNCH_VIEW_NAME));
        assert_eq!(view.view.url.as_str(), APP_LAUNCH_VIEW_URL);
        assert_eq!(view.view.crash, Some(CrashCount { count: 1 }));
        assert_eq!(view.view.error.count, 1);
        assert_eq!(view.view.is_active, Some(false));
        assert_eq!(view.document_version, 1);
        // The synthesized view sorts strictly before its error.
        assert_eq!(view.date, crash_time() - Duration::milliseconds(1));
        assert_eq!(error.date, crash_time());
        assert_eq!(error.session.id, view.session.id);
        assert_eq!(error.view.id, view.view.id);
    }

    #[test]
    fn background_crash_is_dropped_unless_enabled() {
        let _ = env_logger::builder().is_test(true).try_init();

        let context = CrashContext {
            app_in_foreground: false,
            ..granted_context()
        };

        assert_eq!(reconcile(config(), report(), &context), vec![]);

        let enabled = CrashReconcilerConfig {
            background_event_tracking_enabled: true,
            ..config()
        };
        let events = reconcile(enabled, report(), &context);

        assert_eq!(events.len(), 2);
        let RumEvent::View(view) = &events[0] else {
            panic!("expected a view event first, got {:?}", events[0]);
        };
        assert_eq!(view.view.name.as_deref(), Some(BACKGROUND_VIEW_NAME));
        assert_eq!(view.view.url.as_str(), BACKGROUND_VIEW_URL);
    }

    #[test]
    fn session_without_views_maps_to_app_launch_when_initial() {
        let context = CrashContext {
            last_session_state: Some(LastSessionState {
                session_id: "session-1".into(),
                is_initial_session: true,
                has_tracked_any_view: false,
            }),
            ..granted_context()
        };

        let events = reconcile(config(), report(), &context);

        assert_eq!(events.len(), 2);
        let RumEvent::View(view) = &events[0] else {
            panic!("expected a view event first, got {:?}", events[0]);
        };
        assert_eq!(view.view.name.as_deref(), Some(APP_LAUNCH_VIEW_NAME));
    }

    #[test]
    fn session_without_views_is_background_otherwise() {
        let context = CrashContext {
            last_session_state: Some(LastSessionState {
                session_id: "session-1".into(),
                is_initial_session: false,
                has_tracked_any_view: true,
            }),
            ..granted_context()
        };

        // Not an app-launch crash and background tracking is disabled.
        assert_eq!(reconcile(config(), report(), &context), vec![]);

        let enabled = CrashReconcilerConfig {
            background_event_tracking_enabled: true,
            ..config()
        };
        let events = reconcile(enabled, report(), &context);
        assert_eq!(events.len(), 2);
        let RumEvent::View(view) = &events[0] else {
            panic!("expected a view event first, got {:?}", events[0]);
        };
        assert_eq!(view.view.name.as_deref(), Some(BACKGROUND_VIEW_NAME));
    }

    #[test]
    fn crash_from_unsampled_session_is_dropped() {
        use crate::rum::crash::NOT_SAMPLED_SESSION_ID;

        let mut view = last_view(crash_time() - Duration::minutes(5));
        view.session.id = NOT_SAMPLED_SESSION_ID.into();
        let context = CrashContext {
            last_view_event: Some(view),
            ..granted_context()
        };

        assert_eq!(reconcile(config(), report(), &context), vec![]);
    }

    #[test]
    fn crash_without_consent_is_dropped() {
        let _ = env_logger::builder().is_test(true).try_init();

        let context = CrashContext {
            last_view_event: Some(last_view(crash_time() - Duration::minutes(5))),
            tracking_consent: TrackingConsent::Pending,
            ..CrashContext::default()
        };

        assert_eq!(reconcile(config(), report(), &context), vec![]);
    }

    #[test]
    fn undated_report_is_stamped_with_the_clock() {
        let now = crash_time() + Duration::hours(2);
        let (events, writer) = capturing_writer();
        let reconciler =
            CrashReconciler::with_clock(config(), writer, Arc::new(ManualClock::new(now)));

        let undated = CrashReport {
            date: None,
            ..report()
        };
        reconciler.receive(undated, &granted_context());

        let events = events.lock().unwrap();
        let RumEvent::Error(error) = &events[1] else {
            panic!("expected an error event second, got {:?}", events[1]);
        };
        assert_eq!(error.date, now);
    }

    #[test]
    fn server_time_offset_shifts_event_dates() {
        let context = CrashContext {
            last_view_event: Some(last_view(crash_time() - Duration::minutes(5))),
            server_time_offset_ms: 30_000,
            ..granted_context()
        };

        let events = reconcile(config(), report(), &context);
        let RumEvent::Error(error) = &events[1] else {
            panic!("expected an error event second, got {:?}", events[1]);
        };
        assert_eq!(error.date, crash_time() + Duration::seconds(30));
    }

    #[test]
    fn source_type_override_wins_over_default() {
        let context = CrashContext {
            last_view_event: Some(last_view(crash_time() - Duration::minutes(5))),
            source_type_override: Some("react-native".into()),
            ..granted_context()
        };

        let events = reconcile(config(), report(), &context);
        let RumEvent::Error(error) = &events[1] else {
            panic!("expected an error event second, got {:?}", events[1]);
        };
        assert_eq!(error.error.source_type.as_deref(), Some("react-native"));
    }

    #[test]
    fn mappers_rewrite_events_but_cannot_suppress_them() {
        let context = CrashContext {
            last_view_event: Some(last_view(crash_time() - Duration::minutes(5))),
            ..granted_context()
        };

        let (events, writer) = capturing_writer();
        let reconciler = CrashReconciler::new(config(), writer)
            .with_view_event_mapper(|mut view: RumViewEvent| {
                view.view.name = Some("Redacted".into());
                Some(view)
            })
            .with_error_event_mapper(|_: RumErrorEvent| None);
        reconciler.receive(report(), &context);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        let RumEvent::View(view) = &events[0] else {
            panic!("expected a view event first, got {:?}", events[0]);
        };
        let RumEvent::Error(error) = &events[1] else {
            panic!("expected an error event second, got {:?}", events[1]);
        };
        assert_eq!(view.view.name.as_deref(), Some("Redacted"));
        // The error mapper returned None: the original event is written anyway.
        assert_eq!(error.error.message, report().message);
    }

    #[test]
    fn synthesized_events_carry_snapshot_metadata() {
        let context = CrashContext {
            user_info: Some(UserInfo {
                id: Some("user-9".into()),
                name: None,
                email: None,
            }),
            device: Some(DeviceInfo {
                name: Some("iPhone 15".into()),
                model: Some("iPhone15,2".into()),
                brand: Some("Apple".into()),
                architecture: Some("arm64e".into()),
            }),
            service: Some("shop-app".into()),
            version: Some("9.9.9".into()),
            build_number: Some("99".into()),
            source: Some("android".into()),
            ..granted_context()
        };

        let events = reconcile(config(), report(), &context);
        let RumEvent::View(view) = &events[0] else {
            panic!("expected a view event first, got {:?}", events[0]);
        };
        assert_eq!(view.usr.as_ref().and_then(|usr| usr.id.as_deref()), Some("user-9"));
        assert_eq!(
            view.device.as_ref().and_then(|device| device.model.as_deref()),
            Some("iPhone15,2")
        );
        assert_eq!(view.service.as_deref(), Some("shop-app"));
        assert_eq!(view.version.as_deref(), Some("9.9.9"));
        assert_eq!(view.build_version.as_deref(), Some("99"));
        assert_eq!(view.source.as_deref(), Some("android"));
    }
}
