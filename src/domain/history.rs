// Bounded telemetry history feeding the chart renderers
use crate::domain::telemetry::TelemetrySample;
use std::collections::VecDeque;

pub const DEFAULT_HISTORY_CAPACITY: usize = 500;

/// Arrival-ordered sample buffer that never grows past its capacity.
///
/// Once full, every append evicts the oldest sample. Samples are never
/// mutated after insertion.
#[derive(Debug, Clone)]
pub struct TelemetryHistory {
    samples: VecDeque<TelemetrySample>,
    capacity: usize,
}

impl TelemetryHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, sample: TelemetrySample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn extend<I>(&mut self, samples: I)
    where
        I: IntoIterator<Item = TelemetrySample>,
    {
        for sample in samples {
            self.append(sample);
        }
    }

    /// Merge a backend history fetch (oldest first) in front of the samples
    /// already buffered. Only samples strictly older than the current front
    /// are taken, so a live sample never ends up behind a fetched one.
    /// Timestamps come from one producer in ISO form and compare as strings.
    ///
    /// Returns how many fetched samples were taken.
    pub fn backfill(&mut self, fetched: Vec<TelemetrySample>) -> usize {
        let older: Vec<TelemetrySample> = match self.samples.front() {
            Some(front) => fetched
                .into_iter()
                .filter(|sample| sample.timestamp < front.timestamp)
                .collect(),
            None => fetched,
        };
        if older.is_empty() {
            return 0;
        }

        let taken = older.len();
        let live = std::mem::take(&mut self.samples);
        let mut merged = Self::new(self.capacity);
        merged.extend(older);
        merged.extend(live);
        *self = merged;
        taken
    }

    pub fn latest(&self) -> Option<&TelemetrySample> {
        self.samples.back()
    }

    /// Project one scalar channel as `(index, value)` pairs in arrival order.
    ///
    /// Samples for which `extractor` yields nothing are skipped, but keep their
    /// index so charts stay aligned with the buffer. The returned iterator is
    /// cloneable, so a renderer can walk it more than once.
    pub fn series<'a, F>(&'a self, extractor: F) -> impl Iterator<Item = (usize, f64)> + Clone + 'a
    where
        F: Fn(&TelemetrySample) -> Option<f64> + Clone + 'a,
    {
        self.samples
            .iter()
            .enumerate()
            .filter_map(move |(index, sample)| extractor(sample).map(|value| (index, value)))
    }

    pub fn snapshot(&self) -> Vec<TelemetrySample> {
        self.samples.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for TelemetryHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::telemetry::{Channel, PyrometerReading};

    fn sample(seq: usize) -> TelemetrySample {
        let mut sample = TelemetrySample::new(format!("2025-03-01T10:00:{:02}", seq % 60));
        sample.pyrometer_data = Some(PyrometerReading {
            mpt: Some(1000.0 + seq as f64),
            ..PyrometerReading::default()
        });
        sample
    }

    #[test]
    fn test_append_keeps_last_n_in_arrival_order() {
        let capacity = 5;
        for extra in [0, 1, 3, 12] {
            let mut history = TelemetryHistory::new(capacity);
            let total = capacity + extra;
            for seq in 0..total {
                history.append(sample(seq));
            }

            assert_eq!(history.len(), capacity);
            let expected: Vec<_> = (total - capacity..total).map(sample).collect();
            assert_eq!(history.snapshot(), expected);
        }
    }

    #[test]
    fn test_partial_fill_keeps_everything() {
        let mut history = TelemetryHistory::new(DEFAULT_HISTORY_CAPACITY);
        for seq in 0..3 {
            history.append(sample(seq));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.capacity(), 500);
    }

    #[test]
    fn test_latest_returns_appended_sample_unchanged() {
        let mut history = TelemetryHistory::default();
        assert!(history.latest().is_none());

        let appended = sample(7);
        history.append(appended.clone());
        assert_eq!(history.latest(), Some(&appended));
    }

    #[test]
    fn test_series_skips_missing_channel_and_is_restartable() {
        let mut history = TelemetryHistory::new(10);
        history.append(sample(0));
        history.append(TelemetrySample::new("no pyrometer"));
        history.append(sample(2));

        let series = history.series(|s| Channel::MeltPoolTemperature.extract(s));
        let first: Vec<_> = series.clone().collect();
        let second: Vec<_> = series.collect();

        assert_eq!(first, vec![(0, 1000.0), (2, 1002.0)]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_backfill_goes_in_front_of_live_samples() {
        let mut history = TelemetryHistory::new(4);
        history.append(sample(5));
        history.append(sample(6));

        let taken = history.backfill(vec![sample(2), sample(3), sample(4), sample(5), sample(6)]);

        assert_eq!(taken, 3);
        // Capacity 4: the oldest fetched sample is evicted, live ones stay last
        assert_eq!(history.snapshot(), vec![sample(3), sample(4), sample(5), sample(6)]);
        assert_eq!(history.latest(), Some(&sample(6)));
    }

    #[test]
    fn test_backfill_into_empty_history_takes_everything() {
        let mut history = TelemetryHistory::new(10);
        assert!(history.is_empty());
        assert_eq!(history.backfill(vec![sample(1), sample(2)]), 2);
        assert_eq!(history.snapshot(), vec![sample(1), sample(2)]);
    }

    #[test]
    fn test_backfill_of_newer_samples_changes_nothing() {
        let mut history = TelemetryHistory::new(10);
        history.append(sample(1));
        assert_eq!(history.backfill(vec![sample(1), sample(2)]), 0);
        assert_eq!(history.snapshot(), vec![sample(1)]);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut history = TelemetryHistory::new(0);
        history.append(sample(1));
        history.append(sample(2));
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest(), Some(&sample(2)));
    }
}
