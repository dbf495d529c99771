// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A bounded, time-ordered sample buffer.
//!
//! Samples are appended at the tail and evicted at the head under two rules
//! enforced simultaneously: a count cap and an age cap. BBR keeps its
//! bandwidth samples in such a window (10 samples, 60s) and Copa/Vegas keep
//! their RTT samples in one (100 samples, 10s).

use std::collections::VecDeque;
use std::time::Duration;
use std::time::Instant;

/// A single measurement with the instant it was taken.
#[derive(Debug, Clone, Copy)]
struct Sample<T> {
    value: T,
    ts: Instant,
}

/// A windowed sequence of samples bounded by both count and age.
#[derive(Debug)]
pub struct SampleWindow<T> {
    /// Live samples, oldest at the head.
    samples: VecDeque<Sample<T>>,

    /// Maximum number of retained samples.
    max_samples: usize,

    /// Maximum age of a retained sample.
    max_age: Duration,
}

impl<T: Copy + Ord + Into<u64>> SampleWindow<T> {
    pub fn new(max_samples: usize, max_age: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
            max_age,
        }
    }

    /// Append a sample taken at `now`, evicting from the head to honor the
    /// count cap. Sample timestamps are expected to be non-decreasing.
    pub fn push(&mut self, now: Instant, value: T) {
        while self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample { value, ts: now });
    }

    /// Evict samples older than the age cap, as seen from `now`.
    pub fn evict_expired(&mut self, now: Instant) {
        while let Some(head) = self.samples.front() {
            if now.saturating_duration_since(head.ts) > self.max_age {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Largest live sample.
    pub fn max(&self) -> Option<T> {
        self.samples.iter().map(|s| s.value).max()
    }

    /// Smallest live sample.
    pub fn min(&self) -> Option<T> {
        self.samples.iter().map(|s| s.value).min()
    }

    /// Mean of the live samples.
    pub fn mean(&self) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: u64 = self.samples.iter().map(|s| s.value.into()).sum();
        Some(sum / self.samples.len() as u64)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_window_count_cap() {
        let now = Instant::now();
        let mut win: SampleWindow<u64> = SampleWindow::new(3, Duration::from_secs(60));

        for v in 1..=5u64 {
            win.push(now, v);
        }

        // Only the newest three survive.
        assert_eq!(win.len(), 3);
        assert_eq!(win.min(), Some(3));
        assert_eq!(win.max(), Some(5));
        assert_eq!(win.mean(), Some(4));
    }

    #[test]
    fn sample_window_age_cap() {
        let now = Instant::now();
        let mut win: SampleWindow<u32> = SampleWindow::new(10, Duration::from_secs(10));

        win.push(now, 100);
        win.push(now + Duration::from_secs(4), 200);
        win.push(now + Duration::from_secs(8), 300);

        // Nothing has aged out yet.
        win.evict_expired(now + Duration::from_secs(9));
        assert_eq!(win.len(), 3);

        // The first sample is now older than the window.
        win.evict_expired(now + Duration::from_secs(11));
        assert_eq!(win.len(), 2);
        assert_eq!(win.min(), Some(200));

        // All samples aged out.
        win.evict_expired(now + Duration::from_secs(30));
        assert!(win.is_empty());
        assert_eq!(win.max(), None);
        assert_eq!(win.mean(), None);
    }

    #[test]
    fn sample_window_push_past_capacity_is_bounded() {
        let now = Instant::now();
        let mut win: SampleWindow<u32> = SampleWindow::new(4, Duration::from_secs(10));

        for v in 0..1000u32 {
            win.push(now, v);
        }
        assert_eq!(win.len(), 4);
        assert_eq!(win.min(), Some(996));
        assert_eq!(win.max(), Some(999));
    }
}
