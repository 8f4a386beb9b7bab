/// A trait for forwarding events produced by this core to the host's storage or upload pipeline.
///
/// Implementations must be fire-and-forget: `write` is called inline from instrumentation
/// callbacks and from the aggregator's flush path, so it must not block on I/O. The host is
/// expected to buffer, persist, and batch events for upload on its own schedule.
///
/// Closures implement this trait, which is handy in tests and simple hosts:
///
/// ```
/// # use rum_core::EventWriter;
/// fn takes_writer(writer: impl EventWriter<String>) {}
/// takes_writer(|event: String| println!("{event}"));
/// ```
pub trait EventWriter<E> {
    /// Accepts one event. Must not block and must not panic.
    fn write(&self, event: E);
}

/// A writer that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventWriter;

impl<E> EventWriter<E> for NoopEventWriter {
    fn write(&self, _event: E) {}
}

impl<E, F: Fn(E)> EventWriter<E> for F {
    fn write(&self, event: E) {
        self(event);
    }
}
