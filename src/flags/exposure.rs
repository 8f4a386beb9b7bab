use std::sync::Arc;

use crate::{Clock, EventWriter, Str, SystemClock};

use super::assignment::{EvaluationContext, FlagAssignment};
use super::events::ExposureEvent;

/// Identity of the last logged exposure.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ExposureKey {
    flag_key: Str,
    variation_key: Option<Str>,
    allocation_key: Option<Str>,
    subject_key: Str,
}

/// Deduplicating sink for flag exposures.
///
/// Exposures are the subset of evaluations that represent a genuine, user-visible assignment
/// (`do_log == true`). The logger keeps a single last-logged slot, not a map: an exposure is
/// suppressed iff it matches the slot exactly, and every emitted exposure overwrites the slot.
/// Logging a different flag (or any changed field) re-arms deduplication for the previous one.
///
/// Intended for single-threaded use on the host's event-processing queue; it carries no internal
/// lock.
pub struct ExposureLogger {
    writer: Box<dyn EventWriter<ExposureEvent> + Send + Sync>,
    clock: Arc<dyn Clock>,
    /// Additive correction from device time to server time.
    server_time_offset: chrono::Duration,
    last_logged: Option<ExposureKey>,
}

impl ExposureLogger {
    /// Creates a logger timestamping exposures with the system clock.
    pub fn new(writer: Box<dyn EventWriter<ExposureEvent> + Send + Sync>) -> ExposureLogger {
        ExposureLogger::with_clock(writer, Arc::new(SystemClock))
    }

    /// Creates a logger with the provided clock.
    pub fn with_clock(
        writer: Box<dyn EventWriter<ExposureEvent> + Send + Sync>,
        clock: Arc<dyn Clock>,
    ) -> ExposureLogger {
        ExposureLogger {
            writer,
            clock,
            server_time_offset: chrono::Duration::zero(),
            last_logged: None,
        }
    }

    /// Updates the additive device-to-server time correction applied to exposure timestamps.
    pub fn set_server_time_offset(&mut self, offset: chrono::Duration) {
        self.server_time_offset = offset;
    }

    /// Logs one exposure, unless it is an immediate repeat of the previous one.
    ///
    /// Assignments with `do_log == false` never produce an event and leave the dedup slot
    /// untouched.
    pub fn log_exposure(
        &mut self,
        flag_key: &Str,
        assignment: &FlagAssignment,
        context: &EvaluationContext,
    ) {
        if !assignment.do_log {
            return;
        }

        let key = ExposureKey {
            flag_key: flag_key.clone(),
            variation_key: assignment.variation_key.clone(),
            allocation_key: assignment.allocation_key.clone(),
            subject_key: context.subject_key.clone(),
        };
        if self.last_logged.as_ref() == Some(&key) {
            log::trace!(target: "rum", flag_key:display; "suppressing repeated exposure");
            return;
        }

        let event = ExposureEvent {
            timestamp: self.clock.now() + self.server_time_offset,
            flag_key: key.flag_key.clone(),
            variation_key: key.variation_key.clone(),
            allocation_key: key.allocation_key.clone(),
            subject_key: key.subject_key.clone(),
            value: assignment.value.clone(),
        };
        log::trace!(target: "rum", flag_key:display; "logging exposure");
        self.writer.write(event);
        self.last_logged = Some(key);
    }
}
