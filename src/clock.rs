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

//! Monotonic clock abstraction.
//!
//! Controllers never sleep and own no timers; time only advances when the
//! stack calls in. Every time comparison (sample age, min-RTT staleness,
//! ProbeBW gain cadence, ProbeRTT duration, epoch starts) reads the same
//! injected clock handle, so tests can drive the state machines with a
//! manual clock.

use std::fmt;
use std::time::Instant;

/// A source of monotonic timestamps.
pub trait Clock: fmt::Debug + Send + Sync {
    /// Return the current instant.
    fn now(&self) -> Instant;
}

/// The default clock, backed by `std::time::Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ManualClock;
    use super::*;
    use std::time::Duration;

    #[test]
    fn system_clock_monotonic() {
        let clock = SystemClock;
        let t1 = clock.now();
        let t2 = clock.now();
        assert!(t2 >= t1);
    }

    #[test]
    fn manual_clock_advance() {
        let clock = ManualClock::new();
        let t1 = clock.now();

        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now() - t1, Duration::from_millis(250));

        clock.advance(Duration::from_secs(10));
        assert_eq!(clock.now() - t1, Duration::from_millis(10250));
    }
}
