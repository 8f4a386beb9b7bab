//! `rum_core` is a common library to build mobile observability SDKs for different platforms. If
//! you are instrumenting an application, you probably want one of the platform SDKs built on top of
//! it.
//!
//! # Overview
//!
//! `rum_core` is organized as a set of building blocks that platform SDKs assemble. Different
//! platforms have different constraints, so some reimplement pieces in the host language and only
//! use the parts below that fit.
//!
//! The [`flags`] module batches flag-evaluation telemetry.
//! [`EvaluationAggregator`](flags::EvaluationAggregator) merges evaluations sharing the same
//! identity into counted aggregates and flushes them on a timer, on a size bound, or on shutdown.
//! [`ExposureLogger`](flags::ExposureLogger) emits exposure events with last-write deduplication.
//! [`FlagAssignmentsRepository`](flags::FlagAssignmentsRepository) keeps per-subject precomputed
//! assignments fresh and warm-starts them from persisted state.
//!
//! The [`rum`] module derives view-linked performance metrics from timestamped view, action, and
//! resource callbacks ([`NetworkSettledMetric`](rum::metrics::NetworkSettledMetric),
//! [`InteractionToNextViewMetric`](rum::metrics::InteractionToNextViewMetric)) and reconciles
//! crash reports captured in a previous process against the session state that process persisted
//! ([`CrashReconciler`](rum::crash::CrashReconciler)).
//!
//! Collaborators are injected through narrow traits: [`EventWriter`] for event sinks,
//! [`KeyValueStorage`] for persistence, and [`Clock`] for time. Hosts drive every component from
//! their own threads; only the evaluation aggregator locks internally (it is written from
//! arbitrary threads), everything else expects external serialization by the caller's event
//! queue.
//!
//! # Versioning
//!
//! This library follows semver. However, it is considered an internal library, so expect frequent
//! breaking changes and major version bumps.

#![warn(rustdoc::missing_crate_level_docs)]

pub mod flags;
pub mod rum;

mod attributes;
mod clock;
mod error;
mod event_writer;
mod storage;
mod str;

pub use crate::str::Str;
pub use attributes::{AttributeValue, Attributes};
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use error::{Error, Result};
pub use event_writer::{EventWriter, NoopEventWriter};
pub use storage::{InMemoryStorage, KeyValueStorage};
