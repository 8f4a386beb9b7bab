//! The crash-context snapshot persisted by the live process and read back at the next launch.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::rum::event::{Connectivity, DeviceInfo, RumViewEvent, UserInfo};
use crate::{KeyValueStorage, Str};

/// Session id recorded for sessions rejected by sampling.
pub const NOT_SAMPLED_SESSION_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Tracking consent granted by the user.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackingConsent {
    /// Data is tracked and uploaded.
    Granted,
    /// Data is neither tracked nor uploaded.
    NotGranted,
    /// Data is tracked but held back until consent is resolved.
    #[default]
    Pending,
}

/// Session facts persisted alongside the last view event.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LastSessionState {
    /// Session id. [`NOT_SAMPLED_SESSION_ID`] marks a session rejected by sampling.
    pub session_id: Str,
    /// Whether this was the first session after SDK initialization.
    pub is_initial_session: bool,
    /// Whether any view was tracked during the session.
    pub has_tracked_any_view: bool,
}

impl LastSessionState {
    /// `false` if the session was rejected by sampling and tracked nothing.
    pub fn is_sampled(&self) -> bool {
        self.session_id.as_str() != NOT_SAMPLED_SESSION_ID
    }
}

/// Last known state of the SDK, persisted continuously by the live process and read once at the
/// next launch to interpret a pending crash report.
///
/// A process that dies mid-update leaves a stale or partial snapshot, so every field has a
/// tolerant default and the whole record may be absent.
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CrashContext {
    /// The last view event emitted, when a view was active at snapshot time.
    pub last_view_event: Option<RumViewEvent>,
    /// The last known session state.
    pub last_session_state: Option<LastSessionState>,
    /// Whether the app was in the foreground.
    pub app_in_foreground: bool,
    /// Tracking consent at the time of the snapshot.
    pub tracking_consent: TrackingConsent,
    /// Additive correction from device time to server time, in milliseconds.
    pub server_time_offset_ms: i64,
    /// The tracked user.
    pub user_info: Option<UserInfo>,
    /// Network connectivity.
    pub connectivity: Option<Connectivity>,
    /// The device running the application.
    pub device: Option<DeviceInfo>,
    /// Service name of the application.
    pub service: Option<Str>,
    /// Version of the application.
    pub version: Option<Str>,
    /// Build number of the application.
    pub build_number: Option<Str>,
    /// The SDK flavor writing the snapshot.
    pub source: Option<Str>,
    /// Overrides the `source_type` stamped on synthesized error events; set by cross-platform
    /// hosts (e.g. `"react-native"`).
    pub source_type_override: Option<Str>,
}

impl CrashContext {
    /// The device-to-server time correction as a duration.
    pub fn server_time_offset(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.server_time_offset_ms)
    }
}

impl Default for CrashContext {
    fn default() -> CrashContext {
        CrashContext {
            last_view_event: None,
            last_session_state: None,
            // Apps launch in the foreground unless the snapshot says otherwise.
            app_in_foreground: true,
            tracking_consent: TrackingConsent::default(),
            server_time_offset_ms: 0,
            user_info: None,
            connectivity: None,
            device: None,
            service: None,
            version: None,
            build_number: None,
            source: None,
            source_type_override: None,
        }
    }
}

/// What the snapshot says about the previous process's session.
///
/// Remodels the two optionals (`last_view_event`, `last_session_state`) as explicit variants so
/// the crash decision logic can match on them exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionKnowledge {
    /// Nothing was recorded: the process died before the SDK tracked a session.
    NoSession,
    /// A session was recorded but no view was active at snapshot time.
    SessionNoView {
        /// The recorded session state.
        session: LastSessionState,
    },
    /// A view was active when the snapshot was written.
    SessionWithView {
        /// The last view event the previous process emitted.
        view: Box<RumViewEvent>,
        /// The recorded session state, when present. The view itself also carries session ids.
        session: Option<LastSessionState>,
    },
}

impl SessionKnowledge {
    /// Classifies a snapshot.
    pub fn from_snapshot(context: &CrashContext) -> SessionKnowledge {
        match (&context.last_view_event, &context.last_session_state) {
            (Some(view), session) => SessionKnowledge::SessionWithView {
                view: Box::new(view.clone()),
                session: session.clone(),
            },
            (None, Some(session)) => SessionKnowledge::SessionNoView {
                session: session.clone(),
            },
            (None, None) => SessionKnowledge::NoSession,
        }
    }

    /// `false` if the recorded session was rejected by sampling.
    pub fn is_sampled(&self) -> bool {
        match self {
            SessionKnowledge::NoSession => true,
            SessionKnowledge::SessionNoView { session } => session.is_sampled(),
            SessionKnowledge::SessionWithView { view, session } => match session {
                Some(session) => session.is_sampled(),
                None => view.session.id.as_str() != NOT_SAMPLED_SESSION_ID,
            },
        }
    }
}

/// Storage key under which the crash-context snapshot is persisted.
const STORAGE_KEY: &str = "rum.crash_context";

/// Persists the crash-context snapshot through the host's key-value storage.
///
/// The live process calls [`save`][CrashContextStore::save] on every crash-relevant transition
/// (view update, app state change, consent change); the next process calls
/// [`load`][CrashContextStore::load] once at launch. Reads tolerate unparseable data: a snapshot
/// corrupted by a dying process is treated as absent.
pub struct CrashContextStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl CrashContextStore {
    /// Creates a store on top of `storage`.
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> CrashContextStore {
        CrashContextStore { storage }
    }

    /// Writes the snapshot and flushes storage, so it survives a crash that follows immediately.
    pub fn save(&self, context: &CrashContext) {
        match serde_json::to_vec(context) {
            Ok(bytes) => {
                self.storage.set(STORAGE_KEY, bytes);
                self.storage.flush();
            }
            Err(err) => {
                log::warn!(target: "rum", "failed to serialize crash context: {:?}", err);
            }
        }
    }

    /// Reads the snapshot written by the previous process, if a parseable one exists.
    pub fn load(&self) -> Option<CrashContext> {
        let bytes = self.storage.get(STORAGE_KEY)?;
        match serde_json::from_slice(&bytes) {
            Ok(context) => Some(context),
            Err(err) => {
                log::warn!(target: "rum", "discarding unparseable crash context: {:?}", err);
                None
            }
        }
    }
}
