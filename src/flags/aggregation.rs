use std::collections::HashMap;
use std::hash::Hash;

use crate::Timestamp;

/// An aggregated payload together with occurrence accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregated<P> {
    /// Number of occurrences folded into this entry.
    pub count: u64,
    /// Timestamp of the first occurrence.
    pub first_seen: Timestamp,
    /// Timestamp of the latest occurrence.
    pub last_seen: Timestamp,
    /// Payload captured from the first occurrence.
    pub representative: P,
}

/// Occurrence-folding map keyed by an aggregation key.
///
/// The first occurrence of a key captures its payload; later occurrences with the same key only
/// bump the count and extend `last_seen`. Payloads of later occurrences are discarded, so the
/// representative always describes the evaluation that opened the entry.
#[derive(Debug)]
pub struct AggregationMap<K, P> {
    entries: HashMap<K, Aggregated<P>>,
}

impl<K: Eq + Hash, P> AggregationMap<K, P> {
    pub fn new() -> AggregationMap<K, P> {
        AggregationMap {
            entries: HashMap::new(),
        }
    }

    /// Number of distinct keys currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold an occurrence of `key` observed at `at` into the map.
    ///
    /// `payload` is only invoked when the key opens a new entry.
    pub fn record(&mut self, key: K, at: Timestamp, payload: impl FnOnce() -> P) {
        match self.entries.entry(key) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                let aggregated = entry.get_mut();
                aggregated.count += 1;
                if at > aggregated.last_seen {
                    aggregated.last_seen = at;
                }
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(Aggregated {
                    count: 1,
                    first_seen: at,
                    last_seen: at,
                    representative: payload(),
                });
            }
        }
    }

    /// Remove and return all entries, leaving the map empty.
    pub fn drain(&mut self) -> Vec<(K, Aggregated<P>)> {
        self.entries.drain().collect()
    }
}

impl<K: Eq + Hash, P> Default for AggregationMap<K, P> {
    fn default() -> AggregationMap<K, P> {
        AggregationMap::new()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn repeated_keys_fold_into_one_entry() {
        let mut map = AggregationMap::<&str, u32>::new();
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let t1 = t0 + chrono::Duration::seconds(3);
        let t2 = t0 + chrono::Duration::seconds(7);

        map.record("banner", t0, || 1);
        map.record("banner", t1, || 2);
        map.record("banner", t2, || 3);

        assert_eq!(map.len(), 1);
        let entries = map.drain();
        let (_, aggregated) = &entries[0];
        assert_eq!(aggregated.count, 3);
        assert_eq!(aggregated.first_seen, t0);
        assert_eq!(aggregated.last_seen, t2);
        // Payload comes from the occurrence that opened the entry.
        assert_eq!(aggregated.representative, 1);
    }

    #[test]
    fn distinct_keys_stay_separate() {
        let mut map = AggregationMap::<&str, ()>::new();
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        map.record("banner", t0, || ());
        map.record("checkout", t0, || ());

        assert_eq!(map.len(), 2);
    }

    #[test]
    fn drain_empties_the_map() {
        let mut map = AggregationMap::<&str, ()>::new();
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        map.record("banner", t0, || ());

        assert_eq!(map.drain().len(), 1);
        assert!(map.is_empty());
    }

    #[test]
    fn out_of_order_timestamps_keep_max_last_seen() {
        let mut map = AggregationMap::<&str, ()>::new();
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let earlier = t0 - chrono::Duration::seconds(5);

        map.record("banner", t0, || ());
        map.record("banner", earlier, || ());

        let entries = map.drain();
        let (_, aggregated) = &entries[0];
        // first_seen is the occurrence that opened the entry, even if a later
        // occurrence carries an earlier timestamp.
        assert_eq!(aggregated.first_seen, t0);
        assert_eq!(aggregated.last_seen, t0);
        assert_eq!(aggregated.count, 2);
    }
}
