//! Fetching, storing, and refreshing precomputed flag assignments.
//!
//! Assignments are computed server-side for a single targeting subject. The repository keeps the
//! latest good copy in a thread-safe [`FlagAssignmentsStore`], persists it through
//! [`KeyValueStorage`] so the next launch can warm start before the network is up, and refreshes
//! it periodically on a [`RefreshThread`].
use std::collections::HashMap;
use std::sync::{mpsc::RecvTimeoutError, Arc, Condvar, Mutex, RwLock};
use std::time::Duration;

use rand::{thread_rng, Rng};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::{Error, KeyValueStorage, Result, Str, Timestamp};

use super::assignment::{
    AssignmentReason, FlagAssignment, FlagEvaluationError, FlagValueType, ValueWire,
};

const ASSIGNMENTS_ENDPOINT: &str = "/precomputed/v1/assignments";

/// Default value for [`FlagAssignmentsFetcherConfig::base_url`].
pub const DEFAULT_BASE_URL: &str = "https://flags.rum-sdk.io/api";

/// Storage key under which the last good assignments response is persisted.
const STORAGE_KEY: &str = "rum.flag_assignments";

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
///
/// This can be helpful to isolate errors in a subtree. e.g., if assignments for one flag parse,
/// the rest of the flags are still usable.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed.
    ParseFailed(serde_json::Value),
}
impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}
impl<'a, T> From<&'a TryParse<T>> for Option<&'a T> {
    fn from(value: &TryParse<T>) -> Option<&T> {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

/// A single precomputed flag assignment as served by the assignments endpoint.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentWire {
    /// The key of the matched allocation, if any.
    pub allocation_key: Option<Str>,
    /// The key of the served variation, if any.
    pub variation_key: Option<Str>,
    /// Declared type of `variation_value`.
    pub variation_type: FlagValueType,
    /// The untyped variation value.
    pub variation_value: ValueWire,
    /// Whether serving this assignment should produce an exposure event.
    #[serde(default)]
    pub do_log: bool,
}

impl AssignmentWire {
    /// Converts to a [`FlagAssignment`].
    ///
    /// Returns an error if the value does not actually have the declared type.
    pub fn to_assignment(&self) -> std::result::Result<FlagAssignment, FlagEvaluationError> {
        let value = self
            .variation_value
            .to_flag_value(self.variation_type)
            .ok_or(FlagEvaluationError::TypeMismatch {
                expected: self.variation_type,
                found: self.variation_value.natural_type(),
            })?;
        Ok(FlagAssignment {
            value,
            variation_key: self.variation_key.clone(),
            allocation_key: self.allocation_key.clone(),
            reason: AssignmentReason::TargetingMatch,
            do_log: self.do_log,
        })
    }
}

/// Precomputed flag assignments for one targeting subject.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FlagAssignments {
    /// When assignments were computed by the server.
    pub created_at: Timestamp,
    /// The subject these assignments were computed for.
    pub subject_key: Str,
    /// Assignments keyed by flag.
    ///
    /// Value is wrapped in `TryParse` so that if we fail to parse one flag (e.g., new server
    /// format), we can still serve other flags.
    pub flags: HashMap<Str, TryParse<AssignmentWire>>,
}

impl FlagAssignments {
    /// Looks up the assignment for `flag_key`.
    pub fn assignment(
        &self,
        flag_key: &str,
    ) -> std::result::Result<FlagAssignment, FlagEvaluationError> {
        match self.flags.get(flag_key) {
            Some(TryParse::Parsed(wire)) => wire.to_assignment(),
            Some(TryParse::ParseFailed(_)) => {
                log::warn!(target: "rum", flag_key:display; "flag assignment failed to parse, serving as not found");
                Err(FlagEvaluationError::FlagNotFound)
            }
            None => Err(FlagEvaluationError::FlagNotFound),
        }
    }
}

/// `FlagAssignmentsStore` provides a thread-safe (`Sync`) storage for the current flag
/// assignments snapshot that allows concurrent access for readers and writers.
///
/// A snapshot is always immutable and can only be replaced completely.
#[derive(Default)]
pub struct FlagAssignmentsStore {
    assignments: RwLock<Option<Arc<FlagAssignments>>>,
}

impl FlagAssignmentsStore {
    /// Create a new empty store.
    pub fn new() -> FlagAssignmentsStore {
        FlagAssignmentsStore::default()
    }

    /// Get the currently-active assignments. Returns `None` if assignments haven't been
    /// fetched/stored yet.
    pub fn get_assignments(&self) -> Option<Arc<FlagAssignments>> {
        // self.assignments.read() should always return Ok(). Err() is possible only if the lock
        // is poisoned (writer panicked while holding the lock), which should never happen.
        let assignments = self
            .assignments
            .read()
            .expect("thread holding assignments lock should not panic");

        assignments.clone()
    }

    /// Set new assignments.
    pub fn set_assignments(&self, assignments: Arc<FlagAssignments>) {
        let mut slot = self
            .assignments
            .write()
            .expect("thread holding assignments lock should not panic");

        *slot = Some(assignments);
    }

    /// Looks up the assignment for `flag_key` in the current snapshot.
    pub fn assignment(
        &self,
        flag_key: &str,
    ) -> std::result::Result<FlagAssignment, FlagEvaluationError> {
        let Some(assignments) = self.get_assignments() else {
            return Err(FlagEvaluationError::AssignmentsMissing);
        };
        assignments.assignment(flag_key)
    }
}

/// Configuration for [`FlagAssignmentsFetcher`].
#[derive(Debug, Clone)]
pub struct FlagAssignmentsFetcherConfig {
    /// Base URL of the assignments endpoint. Defaults should use [`DEFAULT_BASE_URL`].
    pub base_url: String,
    /// Client token identifying the application to the server.
    pub client_token: String,
    /// The targeting subject to fetch assignments for.
    pub subject_key: Str,
    /// SDK name. Usually, the host platform name.
    pub sdk_name: String,
    /// Version of SDK.
    pub sdk_version: String,
}

/// A client that fetches precomputed flag assignments from the server.
pub struct FlagAssignmentsFetcher {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::Client,
    config: FlagAssignmentsFetcherConfig,
    /// If we receive a 401 Unauthorized error during a request, it means the client token is not
    /// valid. We cache this error so we don't issue additional requests to the server.
    unauthorized: bool,
}

impl FlagAssignmentsFetcher {
    pub fn new(config: FlagAssignmentsFetcherConfig) -> FlagAssignmentsFetcher {
        FlagAssignmentsFetcher {
            client: reqwest::Client::new(),
            config,
            unauthorized: false,
        }
    }

    /// Fetches a fresh assignments snapshot.
    pub async fn fetch_assignments(&mut self) -> Result<FlagAssignments> {
        if self.unauthorized {
            return Err(Error::Unauthorized);
        }

        let url = Url::parse_with_params(
            &format!("{}{}", self.config.base_url, ASSIGNMENTS_ENDPOINT),
            &[
                ("apiKey", &*self.config.client_token),
                ("subjectKey", self.config.subject_key.as_str()),
                ("sdkName", &*self.config.sdk_name),
                ("sdkVersion", &*self.config.sdk_version),
                ("coreVersion", env!("CARGO_PKG_VERSION")),
            ],
        )
        .map_err(Error::InvalidBaseUrl)?;

        log::debug!(target: "rum", subject_key:display = self.config.subject_key; "fetching flag assignments");
        let response = self.client.get(url).send().await?;

        let response = response.error_for_status().map_err(|err| {
            if err.status() == Some(StatusCode::UNAUTHORIZED) {
                log::warn!(target: "rum", "client is not authorized. Check your client token");
                self.unauthorized = true;
                Error::Unauthorized
            } else {
                log::warn!(target: "rum", "received non-200 response while fetching flag assignments: {:?}", err);
                Error::from(err)
            }
        })?;

        let body = response.bytes().await?;
        let assignments = serde_json::from_slice::<FlagAssignments>(&body).map_err(|err| {
            log::warn!(target: "rum", "failed to parse assignments response body: {:?}", err);
            Error::InvalidResponse
        })?;

        log::debug!(target: "rum", subject_key:display = assignments.subject_key; "successfully fetched flag assignments");

        Ok(assignments)
    }
}

/// Combines the fetcher, the store, and key-value persistence.
///
/// [`warm_start`][FlagAssignmentsRepository::warm_start] fills the store from the last persisted
/// snapshot; [`refresh`][FlagAssignmentsRepository::refresh] fetches a fresh one, stores it, and
/// persists it for the next launch.
pub struct FlagAssignmentsRepository {
    fetcher: FlagAssignmentsFetcher,
    store: Arc<FlagAssignmentsStore>,
    storage: Arc<dyn KeyValueStorage>,
}

impl FlagAssignmentsRepository {
    pub fn new(
        fetcher: FlagAssignmentsFetcher,
        store: Arc<FlagAssignmentsStore>,
        storage: Arc<dyn KeyValueStorage>,
    ) -> FlagAssignmentsRepository {
        FlagAssignmentsRepository {
            fetcher,
            store,
            storage,
        }
    }

    /// Loads the last persisted snapshot into the store, if there is one.
    ///
    /// Unparseable persisted data (e.g. written by an older SDK version) is ignored with a
    /// warning.
    pub fn warm_start(&self) {
        let Some(bytes) = self.storage.get(STORAGE_KEY) else {
            log::debug!(target: "rum", "no persisted flag assignments to warm start from");
            return;
        };
        match serde_json::from_slice::<FlagAssignments>(&bytes) {
            Ok(assignments) => {
                log::debug!(target: "rum", subject_key:display = assignments.subject_key; "warm starting from persisted flag assignments");
                self.store.set_assignments(Arc::new(assignments));
            }
            Err(err) => {
                log::warn!(target: "rum", "failed to parse persisted flag assignments, ignoring: {:?}", err);
            }
        }
    }

    /// Fetches fresh assignments, updates the store, and persists the response.
    pub async fn refresh(&mut self) -> Result<()> {
        let assignments = self.fetcher.fetch_assignments().await?;
        match serde_json::to_vec(&assignments) {
            Ok(bytes) => {
                self.storage.set(STORAGE_KEY, bytes);
                self.storage.flush();
            }
            Err(err) => {
                log::warn!(target: "rum", "failed to serialize flag assignments for persistence: {:?}", err);
            }
        }
        self.store.set_assignments(Arc::new(assignments));
        Ok(())
    }
}

/// Configuration for [`RefreshThread`].
// Not implementing `Copy` as we may add non-copyable fields in the future.
#[derive(Debug, Clone)]
pub struct RefreshThreadConfig {
    /// Interval to wait between requests for assignments.
    ///
    /// Defaults to [`RefreshThreadConfig::DEFAULT_POLL_INTERVAL`].
    pub interval: Duration,
    /// Jitter applies a randomized duration to wait between requests for assignments. This helps
    /// to avoid multiple clients synchronizing and producing spiky network load.
    ///
    /// Defaults to [`RefreshThreadConfig::DEFAULT_POLL_JITTER`].
    pub jitter: Duration,
}

impl RefreshThreadConfig {
    /// Default value for [`RefreshThreadConfig::interval`].
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
    /// Default value for [`RefreshThreadConfig::jitter`].
    pub const DEFAULT_POLL_JITTER: Duration = Duration::from_secs(3);

    /// Create a new `RefreshThreadConfig` using default configuration.
    pub fn new() -> RefreshThreadConfig {
        RefreshThreadConfig::default()
    }

    /// Update poll interval with `interval`.
    pub fn with_interval(mut self, interval: Duration) -> RefreshThreadConfig {
        self.interval = interval;
        self
    }

    /// Update poll interval jitter with `jitter`.
    pub fn with_jitter(mut self, jitter: Duration) -> RefreshThreadConfig {
        self.jitter = jitter;
        self
    }
}

impl Default for RefreshThreadConfig {
    fn default() -> RefreshThreadConfig {
        RefreshThreadConfig {
            interval: RefreshThreadConfig::DEFAULT_POLL_INTERVAL,
            jitter: RefreshThreadConfig::DEFAULT_POLL_JITTER,
        }
    }
}

/// An assignments refresh thread.
///
/// The thread warm starts the store from persisted data, then polls the server periodically,
/// keeping the store and the persisted copy fresh through [`FlagAssignmentsRepository`].
pub struct RefreshThread {
    join_handle: std::thread::JoinHandle<()>,

    /// Used to send a stop command to the refresh thread.
    stop_sender: std::sync::mpsc::SyncSender<()>,

    /// Holds `None` if assignments haven't been fetched yet. Holds `Some(Ok(()))` if assignments
    /// have been fetched successfully. Holds `Some(Err(...))` if there was an error fetching the
    /// first assignments.
    result: Arc<(Mutex<Option<Result<()>>>, Condvar)>,
}

impl RefreshThread {
    /// Starts the refresh thread.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the refresh thread failed to start.
    pub fn start(repository: FlagAssignmentsRepository) -> std::io::Result<RefreshThread> {
        RefreshThread::start_with_config(repository, RefreshThreadConfig::default())
    }

    /// Starts the refresh thread with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the refresh thread failed to start.
    pub fn start_with_config(
        mut repository: FlagAssignmentsRepository,
        config: RefreshThreadConfig,
    ) -> std::io::Result<RefreshThread> {
        // Using `sync_channel` here as it makes `stop_sender` `Sync` (shareable between
        // threads). Buffer size of 1 is enough for our use case as we're sending a stop command,
        // and we can simply `try_send()` and ignore if the buffer is full (another thread has
        // sent a stop command already).
        let (stop_sender, stop_receiver) = std::sync::mpsc::sync_channel::<()>(1);

        let result = Arc::new((Mutex::new(None), Condvar::new()));

        let join_handle = {
            // Cloning Arc for move into thread
            let result = Arc::clone(&result);
            let update_result = move |value| {
                *result
                    .0
                    .lock()
                    .expect("thread holding refresh-result lock should not panic") = Some(value);
                result.1.notify_all();
            };

            std::thread::Builder::new()
                .name("rum-poller".to_owned())
                .spawn(move || {
                    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        let runtime = match tokio::runtime::Builder::new_current_thread()
                            .enable_all()
                            .build()
                        {
                            Ok(runtime) => runtime,
                            Err(err) => {
                                update_result(Err(Error::from(err)));
                                return;
                            }
                        };

                        repository.warm_start();

                        loop {
                            log::debug!(target: "rum", "fetching new flag assignments");
                            match runtime.block_on(repository.refresh()) {
                                Ok(()) => update_result(Ok(())),
                                Err(err @ (Error::Unauthorized | Error::InvalidBaseUrl(_))) => {
                                    // Unrecoverable errors
                                    update_result(Err(err));
                                    return;
                                }
                                _ => {
                                    // Other errors are retryable.
                                }
                            };

                            let timeout = jitter(config.interval, config.jitter);
                            match stop_receiver.recv_timeout(timeout) {
                                Err(RecvTimeoutError::Timeout) => {
                                    // Timed out. Loop back to fetch new assignments.
                                }
                                Ok(()) => {
                                    log::debug!(target: "rum", "refresh thread received stop command");
                                    // Stop command received, break out of the loop to end the thread.
                                    return;
                                }
                                Err(RecvTimeoutError::Disconnected) => {
                                    // When the other end of channel disconnects, calls to
                                    // .recv_timeout() return immediately.
                                    // Stop the thread.
                                    log::debug!(target: "rum", "refresh thread received disconnected");
                                    return;
                                }
                            }
                        }
                    }));

                    // If catch_unwind returns Err, it means a panic occurred.
                    if outcome.is_err() {
                        // Handle the panic gracefully by updating the result with an error.
                        update_result(Err(Error::RefreshThreadPanicked));
                    }
                })?
        };

        Ok(RefreshThread {
            join_handle,
            stop_sender,
            result,
        })
    }

    /// Waits for the first assignments fetch.
    ///
    /// This method blocks until the refresh thread has fetched assignments.
    ///
    /// # Errors
    ///
    /// This method can fail with the following errors:
    ///
    /// - [`Error::RefreshThreadPanicked`]
    /// - [`Error::Unauthorized`]
    /// - [`Error::InvalidBaseUrl`]
    pub fn wait_for_assignments(&self) -> Result<()> {
        let mut lock = self
            .result
            .0
            .lock()
            .map_err(|_| Error::RefreshThreadPanicked)?;
        loop {
            match &*lock {
                Some(result) => {
                    // The thread has already fetched assignments. Return Ok(()) or a possible
                    // error.
                    return result.clone();
                }
                None => {
                    // Block waiting for assignments to get fetched.
                    lock = self
                        .result
                        .1
                        .wait(lock)
                        .map_err(|_| Error::RefreshThreadPanicked)?;
                }
            }
        }
    }

    /// Stop the refresh thread.
    ///
    /// This function does not wait for the thread to actually stop.
    pub fn stop(&self) {
        // Error means that the receiver was dropped (thread exited) or the channel buffer is
        // full. First case can be ignored as there's nothing useful we can do. Second case can be
        // ignored as it indicates that another thread already sent a stop command and the thread
        // will stop anyway.
        let _ = self.stop_sender.try_send(());
    }

    /// Stop the refresh thread and block waiting for it to exit.
    ///
    /// If you don't need to wait for the thread to exit, use [`RefreshThread::stop`] instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RefreshThreadPanicked`] if the thread has panicked.
    pub fn shutdown(self) -> Result<()> {
        // Send stop signal in case it wasn't sent before.
        self.stop();

        // Error means that the thread has panicked and there's nothing useful we can do in that
        // case.
        self.join_handle
            .join()
            .map_err(|_| Error::RefreshThreadPanicked)?;

        Ok(())
    }
}

/// Apply randomized `jitter` to `interval`.
fn jitter(interval: Duration, jitter: Duration) -> Duration {
    Duration::saturating_sub(interval, thread_rng().gen_range(Duration::ZERO..=jitter))
}
