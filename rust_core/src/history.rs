//! Bounded in-memory history.
//!
//! [`BoundedSeries`] is a fixed-capacity ring over a `VecDeque`: appends go to
//! the back and, once full, each append evicts exactly one point from the
//! front. [`HistoryStore`] keeps one series per key behind a lock and hands out
//! defensive copies, so a reader never sees a half-updated series.

use crate::error::HistoryError;
use parking_lot::RwLock;
use std::collections::{BTreeMap, VecDeque};

/// Full key -> ordered points copy handed to export sinks
pub type SeriesSnapshot<T> = BTreeMap<String, Vec<T>>;

/// Append-only series that keeps at most `capacity` newest points
#[derive(Debug, Clone)]
pub struct BoundedSeries<T> {
    points: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedSeries<T> {
    pub fn new(capacity: usize) -> Result<Self, HistoryError> {
        if capacity == 0 {
            return Err(HistoryError::ZeroCapacity);
        }
        Ok(Self {
            points: VecDeque::new(),
            capacity,
        })
    }

    /// Append a point, returning the evicted oldest point if the series was full
    pub fn push(&mut self, point: T) -> Option<T> {
        self.points.push_back(point);
        if self.points.len() > self.capacity {
            self.points.pop_front()
        } else {
            None
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> Option<&T> {
        self.points.back()
    }
}

impl<T: Clone> BoundedSeries<T> {
    /// Oldest to newest
    pub fn to_vec(&self) -> Vec<T> {
        self.points.iter().cloned().collect()
    }
}

/// Keyed collection of bounded series sharing one capacity policy
#[derive(Debug)]
pub struct HistoryStore<T> {
    capacity: usize,
    series: RwLock<BTreeMap<String, BoundedSeries<T>>>,
}

impl<T> HistoryStore<T> {
    pub fn new(capacity: usize) -> Result<Self, HistoryError> {
        if capacity == 0 {
            return Err(HistoryError::ZeroCapacity);
        }
        Ok(Self {
            capacity,
            series: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn append(&self, key: &str, point: T) {
        let mut series = self.series.write();
        match series.get_mut(key) {
            Some(existing) => {
                existing.push(point);
            }
            None => {
                let mut created = BoundedSeries {
                    points: VecDeque::new(),
                    capacity: self.capacity,
                };
                created.push(point);
                series.insert(key.to_string(), created);
            }
        }
    }

    /// Remove every series (start a fresh window)
    pub fn clear(&self) {
        self.series.write().clear();
    }

    pub fn total_points(&self) -> usize {
        self.series.read().values().map(BoundedSeries::len).sum()
    }

    pub fn series_count(&self) -> usize {
        self.series.read().len()
    }

    pub fn len(&self, key: &str) -> usize {
        self.series.read().get(key).map_or(0, BoundedSeries::len)
    }

    pub fn is_empty(&self) -> bool {
        self.series.read().values().all(BoundedSeries::is_empty)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

}

impl<T: Clone> HistoryStore<T> {
    /// Defensive copy of every series, taken under a single read lock
    pub fn snapshot(&self) -> SeriesSnapshot<T> {
        self.series
            .read()
            .iter()
            .map(|(key, series)| (key.clone(), series.to_vec()))
            .collect()
    }

    /// Newest point of every non-empty series
    pub fn latest_per_key(&self) -> BTreeMap<String, T> {
        self.series
            .read()
            .iter()
            .filter_map(|(key, series)| series.latest().map(|p| (key.clone(), p.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_capacity_three_keeps_last_three() {
        let mut series = BoundedSeries::new(3).unwrap();
        assert_eq!(series.push("P1"), None);
        assert_eq!(series.push("P2"), None);
        assert_eq!(series.push("P3"), None);
        assert_eq!(series.push("P4"), Some("P1"));
        assert_eq!(series.to_vec(), vec!["P2", "P3", "P4"]);
        assert_eq!(series.latest(), Some(&"P4"));
    }

    #[test]
    fn test_length_is_min_of_appends_and_capacity() {
        for capacity in 1..=6 {
            for appends in 0..=15usize {
                let mut series = BoundedSeries::new(capacity).unwrap();
                for n in 0..appends {
                    series.push(n);
                }
                assert_eq!(series.len(), appends.min(capacity));

                let expected: Vec<usize> =
                    (appends.saturating_sub(capacity)..appends).collect();
                assert_eq!(series.to_vec(), expected);
            }
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(
            BoundedSeries::<u8>::new(0).unwrap_err(),
            HistoryError::ZeroCapacity
        );
        assert!(HistoryStore::<u8>::new(0).is_err());
    }

    #[test]
    fn test_store_keys_are_independent() {
        let store = HistoryStore::new(2).unwrap();
        for n in 0..5 {
            store.append("SOL", n);
        }
        store.append("JUP", 100);

        assert_eq!(store.len("SOL"), 2);
        assert_eq!(store.len("JUP"), 1);
        assert_eq!(store.len("WIF"), 0);
        assert_eq!(store.total_points(), 3);
        assert_eq!(store.series_count(), 2);

        let snapshot = store.snapshot();
        assert_eq!(snapshot["SOL"], vec![3, 4]);
        assert_eq!(snapshot["JUP"], vec![100]);
    }

    #[test]
    fn test_two_stores_keep_their_own_capacity() {
        let session = HistoryStore::new(1000).unwrap();
        let consolidated = HistoryStore::new(3).unwrap();
        for n in 0..10 {
            session.append("SOL", n);
            consolidated.append("SOL", n);
        }
        assert_eq!(session.len("SOL"), 10);
        assert_eq!(consolidated.len("SOL"), 3);
        assert_eq!(session.capacity(), 1000);
        assert_eq!(consolidated.capacity(), 3);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let store = HistoryStore::new(10).unwrap();
        store.append("SOL", 1);
        let snapshot = store.snapshot();
        store.append("SOL", 2);
        store.clear();

        assert_eq!(snapshot["SOL"], vec![1]);
        assert!(store.is_empty());
        assert_eq!(store.total_points(), 0);
    }

    #[test]
    fn test_latest_per_key() {
        let store = HistoryStore::new(10).unwrap();
        store.append("SOL", 1);
        store.append("SOL", 2);
        store.append("JUP", 7);

        let latest = store.latest_per_key();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest["SOL"], 2);
        assert_eq!(latest["JUP"], 7);
    }

    #[test]
    fn test_snapshot_never_sees_partial_series() {
        let store = Arc::new(HistoryStore::new(64).unwrap());
        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for n in 0..5_000u32 {
                    store.append("SOL", n);
                }
            })
        };

        for _ in 0..200 {
            let snapshot = store.snapshot();
            if let Some(points) = snapshot.get("SOL") {
                assert!(points.len() <= 64);
                assert!(points.windows(2).all(|w| w[1] == w[0] + 1));
            }
        }
        writer.join().unwrap();
        assert_eq!(store.len("SOL"), 64);
    }
}
