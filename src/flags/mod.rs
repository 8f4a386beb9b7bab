//! Flag-evaluation telemetry: assignment model, evaluation aggregation, exposure logging, and the
//! per-subject assignments repository.

mod aggregation;
mod aggregator;
mod assignment;
mod events;
mod exposure;
mod repository;
mod uploader;

pub use aggregation::{Aggregated, AggregationMap};
pub use aggregator::{AggregationKey, EvaluationAggregator, EvaluationAggregatorConfig};
pub use assignment::{
    AssignmentReason, EvaluationContext, FlagAssignment, FlagEvaluationError, FlagValue,
    FlagValueType, ValueWire,
};
pub use events::{
    BatchContext, EvaluationBatch, EvaluationEvent, EvaluationEventContext, ExposureEvent,
};
pub use exposure::ExposureLogger;
pub use repository::{
    AssignmentWire, FlagAssignments, FlagAssignmentsFetcher, FlagAssignmentsFetcherConfig,
    FlagAssignmentsRepository, FlagAssignmentsStore, RefreshThread, RefreshThreadConfig, TryParse,
    DEFAULT_BASE_URL,
};
pub use uploader::{EvaluationIntake, EvaluationIntakeConfig};
