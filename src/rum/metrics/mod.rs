//! View-linked performance metrics.
//!
//! Each metric derives one scalar per view from the stream of timestamped view, resource, and
//! action callbacks. Metrics are pure functions of the timeline they were fed: when the
//! conditions for a value are not met they answer with a reason instead of a value, and a value,
//! once derived, never changes retroactively.

pub mod network_settled;
pub mod next_view;

pub use network_settled::NetworkSettledMetric;
pub use next_view::InteractionToNextViewMetric;
