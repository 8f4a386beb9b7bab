//! A thread-safe aggregator that batches flag-evaluation telemetry, with a background thread
//! flushing it periodically to an event writer.
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::RecvTimeoutError,
    Arc, Mutex,
};
use std::time::Duration;

use crate::{Attributes, Clock, EventWriter, Str, SystemClock};

use super::aggregation::{Aggregated, AggregationMap};
use super::assignment::{EvaluationContext, FlagAssignment, FlagEvaluationError, FlagValue};
use super::events::{EvaluationEvent, EvaluationEventContext};

/// Composite identity under which evaluation telemetry is merged.
///
/// Two evaluations fold into one aggregate iff all components are equal. Attribute maps are
/// compared through their canonical sorted-key serialization, so key equality is independent of
/// map iteration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregationKey {
    flag_key: Str,
    variation_key: Option<Str>,
    allocation_key: Option<Str>,
    subject_key: Str,
    error_message: Option<Str>,
    context_attributes: Option<String>,
}

impl AggregationKey {
    fn new(
        flag_key: &Str,
        assignment: &FlagAssignment,
        context: &EvaluationContext,
        error: Option<&FlagEvaluationError>,
    ) -> AggregationKey {
        // Runtime defaults have no meaningful variation/allocation, so those components are left
        // out even if the caller populated them.
        let (variation_key, allocation_key) = if assignment.reason.is_runtime_default() {
            (None, None)
        } else {
            (
                assignment.variation_key.clone(),
                assignment.allocation_key.clone(),
            )
        };
        AggregationKey {
            flag_key: flag_key.clone(),
            variation_key,
            allocation_key,
            // An empty subject key is a valid subject and kept verbatim.
            subject_key: context.subject_key.clone(),
            error_message: error.map(|err| Str::from(err.to_string())),
            context_attributes: if context.attributes.is_empty() {
                None
            } else {
                Some(crate::attributes::canonical_json(&context.attributes))
            },
        }
    }
}

/// Per-key payload captured from the evaluation that opened the aggregate.
#[derive(Debug, Clone)]
struct EvaluationPayload {
    value: FlagValue,
    runtime_default_used: bool,
    attributes: Arc<Attributes>,
}

/// Configuration for [`EvaluationAggregator`].
// Not implementing `Copy` as we may add non-copyable fields in the future.
#[derive(Debug, Clone)]
pub struct EvaluationAggregatorConfig {
    /// Maximum number of distinct aggregation keys held in memory. Reaching it forces an
    /// immediate flush.
    ///
    /// Defaults to [`EvaluationAggregatorConfig::DEFAULT_MAX_AGGREGATIONS`]. Values below 1 are
    /// raised to 1.
    pub max_aggregations: usize,
    /// Interval between periodic flushes.
    ///
    /// Defaults to [`EvaluationAggregatorConfig::DEFAULT_FLUSH_INTERVAL`]. Out-of-range values
    /// are clamped to [[`EvaluationAggregatorConfig::MIN_FLUSH_INTERVAL`],
    /// [`EvaluationAggregatorConfig::MAX_FLUSH_INTERVAL`]] with a warning.
    pub flush_interval: Duration,
}

impl EvaluationAggregatorConfig {
    /// Default value for [`EvaluationAggregatorConfig::max_aggregations`].
    ///
    /// Bounds worst-case memory at roughly a thousand small events while still folding the common
    /// case (a handful of hot flags evaluated repeatedly) into a few entries per flush window.
    pub const DEFAULT_MAX_AGGREGATIONS: usize = 1000;
    /// Default value for [`EvaluationAggregatorConfig::flush_interval`].
    pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);
    /// Minimum accepted flush interval.
    pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_secs(1);
    /// Maximum accepted flush interval.
    pub const MAX_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

    /// Create a new `EvaluationAggregatorConfig` using default configuration.
    pub fn new() -> EvaluationAggregatorConfig {
        EvaluationAggregatorConfig::default()
    }

    /// Update maximum entry count with `max_aggregations`.
    pub fn with_max_aggregations(mut self, max_aggregations: usize) -> EvaluationAggregatorConfig {
        self.max_aggregations = max_aggregations;
        self
    }

    /// Update flush interval with `flush_interval`.
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> EvaluationAggregatorConfig {
        self.flush_interval = flush_interval;
        self
    }

    fn sanitized_max_aggregations(&self) -> usize {
        self.max_aggregations.max(1)
    }

    fn sanitized_flush_interval(&self) -> Duration {
        let clamped = self
            .flush_interval
            .clamp(Self::MIN_FLUSH_INTERVAL, Self::MAX_FLUSH_INTERVAL);
        if clamped != self.flush_interval {
            log::warn!(target: "rum",
                       requested:debug = self.flush_interval,
                       clamped:debug;
                       "flush interval out of range, clamping");
        }
        clamped
    }
}

impl Default for EvaluationAggregatorConfig {
    fn default() -> EvaluationAggregatorConfig {
        EvaluationAggregatorConfig {
            max_aggregations: EvaluationAggregatorConfig::DEFAULT_MAX_AGGREGATIONS,
            flush_interval: EvaluationAggregatorConfig::DEFAULT_FLUSH_INTERVAL,
        }
    }
}

/// Batches flag-evaluation telemetry before handing it to an event writer.
///
/// Evaluations sharing an [`AggregationKey`] fold into a single wire event carrying an
/// `evaluation_count`. The map is drained on whichever comes first: an explicit
/// [`send_evaluations`][EvaluationAggregator::send_evaluations] call, the entry count reaching
/// `max_aggregations`, the periodic flush timer, or teardown. Every teardown path flushes:
/// [`stop`][EvaluationAggregator::stop], [`shutdown`][EvaluationAggregator::shutdown], and
/// dropping the aggregator without either.
///
/// `record_evaluation` may be called from arbitrary threads; one mutex guards the whole map and
/// no I/O happens while it is held.
pub struct EvaluationAggregator {
    inner: Arc<AggregatorInner>,
    join_handle: std::thread::JoinHandle<()>,

    /// Used to send a stop command to the flusher thread.
    stop_sender: std::sync::mpsc::SyncSender<()>,
}

struct AggregatorInner {
    aggregations: Mutex<AggregationMap<AggregationKey, EvaluationPayload>>,
    writer: Box<dyn EventWriter<EvaluationEvent> + Send + Sync>,
    clock: Arc<dyn Clock>,
    max_aggregations: usize,
    stopped: AtomicBool,
}

impl EvaluationAggregator {
    /// Starts the aggregator and its background flusher thread, timestamping evaluations with the
    /// system clock.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the flusher thread failed to start.
    pub fn start(
        config: EvaluationAggregatorConfig,
        writer: Box<dyn EventWriter<EvaluationEvent> + Send + Sync>,
    ) -> std::io::Result<EvaluationAggregator> {
        EvaluationAggregator::start_with_clock(config, writer, Arc::new(SystemClock))
    }

    /// Starts the aggregator with the provided clock.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the flusher thread failed to start.
    pub fn start_with_clock(
        config: EvaluationAggregatorConfig,
        writer: Box<dyn EventWriter<EvaluationEvent> + Send + Sync>,
        clock: Arc<dyn Clock>,
    ) -> std::io::Result<EvaluationAggregator> {
        let flush_interval = config.sanitized_flush_interval();

        let inner = Arc::new(AggregatorInner {
            aggregations: Mutex::new(AggregationMap::new()),
            writer,
            clock,
            max_aggregations: config.sanitized_max_aggregations(),
            stopped: AtomicBool::new(false),
        });

        // Using `sync_channel` here as it makes `stop_sender` `Sync` (shareable between
        // threads). Buffer size of 1 is enough: we can `try_send()` and ignore a full buffer
        // (another thread has sent a stop command already).
        let (stop_sender, stop_receiver) = std::sync::mpsc::sync_channel::<()>(1);

        let join_handle = {
            let inner = Arc::clone(&inner);
            std::thread::Builder::new()
                .name("rum-flusher".to_owned())
                .spawn(move || loop {
                    match stop_receiver.recv_timeout(flush_interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            inner.flush();
                        }
                        Ok(()) => {
                            log::debug!(target: "rum", "flusher thread received stop command");
                            // Flush-then-stop: pending aggregates recorded before the stop
                            // command must not be dropped.
                            inner.flush();
                            return;
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            log::debug!(target: "rum", "flusher thread received disconnected");
                            // All senders gone: the aggregator was dropped without a stop
                            // command. Pending aggregates recorded before the drop must not
                            // be lost.
                            inner.flush();
                            return;
                        }
                    }
                })?
        };

        Ok(EvaluationAggregator {
            inner,
            join_handle,
            stop_sender,
        })
    }

    /// Records one flag evaluation.
    ///
    /// This call never blocks on I/O and never fails. The only wait is the map mutex, held by
    /// other callers for the duration of a map operation. When this evaluation fills the map to
    /// `max_aggregations`, the forced flush runs synchronously on the calling thread.
    ///
    /// Calls made after [`stop`][EvaluationAggregator::stop] are no-ops.
    pub fn record_evaluation(
        &self,
        flag_key: &Str,
        assignment: &FlagAssignment,
        context: &EvaluationContext,
        error: Option<&FlagEvaluationError>,
    ) {
        self.inner
            .record_evaluation(flag_key, assignment, context, error)
    }

    /// Drains all pending aggregates and forwards them to the event writer.
    pub fn send_evaluations(&self) {
        self.inner.flush()
    }

    /// Stop the flusher thread.
    ///
    /// Pending aggregates are flushed by the flusher thread before it exits. This function does
    /// not wait for the thread to actually stop.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        // Error means that the receiver was dropped (thread exited) or the channel buffer is
        // full. Both can be ignored: the thread is stopped or another stop command is in flight.
        let _ = self.stop_sender.try_send(());
    }

    /// Stop the flusher thread and block waiting for it to exit, flushing anything it left
    /// behind.
    ///
    /// If you don't need to wait, use [`EvaluationAggregator::stop`] instead.
    pub fn shutdown(self) {
        self.stop();

        // Error means the flusher thread panicked. Pending aggregates are still drained below.
        if self.join_handle.join().is_err() {
            log::warn!(target: "rum", "flusher thread panicked");
        }

        // Records racing with the stop command may have landed after the thread's final flush.
        self.inner.flush();
    }
}

impl AggregatorInner {
    fn record_evaluation(
        &self,
        flag_key: &Str,
        assignment: &FlagAssignment,
        context: &EvaluationContext,
        error: Option<&FlagEvaluationError>,
    ) {
        if self.stopped.load(Ordering::Acquire) {
            log::trace!(target: "rum", flag_key:display; "evaluation recorded after aggregator stop, ignoring");
            return;
        }

        let key = AggregationKey::new(flag_key, assignment, context, error);
        let now = self.clock.now();

        let forced = {
            let mut aggregations = self
                .aggregations
                .lock()
                .expect("thread holding aggregations lock should not panic");
            aggregations.record(key, now, || EvaluationPayload {
                value: assignment.value.clone(),
                runtime_default_used: assignment.reason.is_runtime_default(),
                attributes: Arc::clone(&context.attributes),
            });
            if aggregations.len() >= self.max_aggregations {
                aggregations.drain()
            } else {
                Vec::new()
            }
        };

        if !forced.is_empty() {
            log::debug!(target: "rum", "evaluation aggregator reached max entries, flushing");
            self.write_events(forced);
        }
    }

    fn flush(&self) {
        let drained = self
            .aggregations
            .lock()
            .expect("thread holding aggregations lock should not panic")
            .drain();
        self.write_events(drained);
    }

    /// Called outside the aggregations lock: the writer is allowed to take its own time.
    fn write_events(&self, entries: Vec<(AggregationKey, Aggregated<EvaluationPayload>)>) {
        for (key, aggregated) in entries {
            self.writer.write(into_event(key, aggregated));
        }
    }
}

fn into_event(key: AggregationKey, aggregated: Aggregated<EvaluationPayload>) -> EvaluationEvent {
    let AggregationKey {
        flag_key,
        variation_key,
        allocation_key,
        subject_key,
        error_message,
        context_attributes: _,
    } = key;
    let EvaluationPayload {
        value,
        runtime_default_used,
        attributes,
    } = aggregated.representative;
    let context = if attributes.is_empty() {
        None
    } else {
        Some(EvaluationEventContext {
            evaluation: attributes,
        })
    };
    EvaluationEvent {
        timestamp: aggregated.first_seen,
        flag_key,
        variation_key,
        allocation_key,
        subject_key,
        value,
        error_message,
        runtime_default_used,
        evaluation_count: aggregated.count,
        first_evaluation: aggregated.first_seen,
        last_evaluation: aggregated.last_seen,
        context,
    }
}
