use std::collections::HashMap;
use std::sync::Mutex;

/// A trait for the host's key-value persistence.
///
/// The core uses it to persist the crash-context snapshot and the last fetched flag assignments,
/// both of which are read back at the next process launch. Implementations are expected to be
/// synchronous-enough for read-at-startup use; `set` may buffer as long as `flush` makes the data
/// durable.
pub trait KeyValueStorage: Send + Sync {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: Vec<u8>);

    /// Makes previous `set` calls durable. The default implementation is a no-op for backends
    /// that write through.
    fn flush(&self) {}
}

/// A `HashMap`-backed storage. Useful in tests and for hosts that wire durable storage later.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryStorage {
    pub fn new() -> InMemoryStorage {
        InMemoryStorage::default()
    }
}

impl KeyValueStorage for InMemoryStorage {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self
            .entries
            .lock()
            .expect("thread holding storage lock should not panic");
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: Vec<u8>) {
        let mut entries = self
            .entries
            .lock()
            .expect("thread holding storage lock should not panic");
        entries.insert(key.to_owned(), value);
    }
}
