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

//! Vegas congestion control.
//!
//! Vegas compares the measured RTT against a base (propagation) RTT and
//! keeps the number of queued segments between `alpha` and `beta`: below
//! `alpha` the path is underused and the window grows, above `beta` queues
//! are building and it shrinks. While no base RTT is known, or after loss
//! signals, Vegas-mode is off and the Reno laws apply.
//!
//! See <https://ieeexplore.ieee.org/document/464716>.

use std::cmp;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use log::*;

use super::sample_window::SampleWindow;
use super::update_rtt_and_rto;
use super::CongestionControl;
use super::CongestionControlAlgorithm;
use crate::clock::Clock;
use crate::clock::SystemClock;
use crate::CongestionEvent;
use crate::SocketState;
use crate::TcpState;

/// Alpha: grow the window while fewer segments than this are queued.
const ALPHA: u32 = 2;

/// Beta: shrink the window once more segments than this are queued.
const BETA: u32 = 4;

/// Gamma: leave slow start once more segments than this are queued.
const GAMMA: u32 = 1;

/// Validity window of the base RTT before it is recomputed from the
/// sample buffer.
const BASE_RTT_WINDOW: Duration = Duration::from_secs(10);

/// Max number of retained RTT samples.
const RTT_WINDOW_LEN: usize = 100;

/// Max age of a retained RTT sample.
const RTT_WINDOW_AGE: Duration = Duration::from_secs(10);

/// Nominal segment size used by the diff calculation, independent of the
/// configured MSS.
const SEGMENT_SCALE_BYTES: u32 = 1460;

/// Sentinel for an unknown base RTT.
const BASE_RTT_UNSET: u32 = u32::MAX;

/// Vegas configurable parameters, all in segments.
#[derive(Debug)]
pub struct VegasConfig {
    /// Lower queueing bound.
    alpha: u32,

    /// Upper queueing bound.
    beta: u32,

    /// Slow start exit bound.
    gamma: u32,
}

impl VegasConfig {
    /// Update alpha.
    pub fn set_alpha(&mut self, alpha: u32) -> &mut Self {
        self.alpha = alpha;
        self
    }

    /// Update beta.
    pub fn set_beta(&mut self, beta: u32) -> &mut Self {
        self.beta = beta;
        self
    }

    /// Update gamma.
    pub fn set_gamma(&mut self, gamma: u32) -> &mut Self {
        self.gamma = gamma;
        self
    }
}

impl Default for VegasConfig {
    fn default() -> Self {
        Self {
            alpha: ALPHA,
            beta: BETA,
            gamma: GAMMA,
        }
    }
}

/// Vegas congestion control algorithm.
#[derive(Debug)]
pub struct Vegas {
    /// Configurable parameters.
    config: VegasConfig,

    /// Monotonic clock handle.
    clock: Arc<dyn Clock>,

    /// Last installed slow start threshold in bytes.
    ssthresh: u32,

    /// Windowed RTT samples in microseconds.
    rtt_filter: SampleWindow<u32>,

    /// Base RTT: the propagation delay estimate, in microseconds.
    base_rtt_us: u32,

    /// When the base RTT was last lowered or recomputed.
    base_rtt_ts: Instant,

    /// The most recent RTT sample, in microseconds.
    current_rtt_us: u32,

    /// Whether the Vegas delay logic is active.
    doing_vegas: bool,
}

impl Vegas {
    pub fn new(config: VegasConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: VegasConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();

        Self {
            config,
            clock,
            ssthresh: crate::INITIAL_SSTHRESH,
            rtt_filter: SampleWindow::new(RTT_WINDOW_LEN, RTT_WINDOW_AGE),
            base_rtt_us: BASE_RTT_UNSET,
            base_rtt_ts: now,
            current_rtt_us: 0,
            doing_vegas: false,
        }
    }

    /// Fold one RTT sample into the window and refresh the base RTT,
    /// recomputing it from the live samples once the validity window ends.
    fn update_base_rtt(&mut self, rtt_us: u32) {
        if rtt_us == 0 {
            return;
        }

        let now = self.clock.now();

        self.rtt_filter.push(now, rtt_us);
        self.rtt_filter.evict_expired(now);

        if rtt_us < self.base_rtt_us {
            self.base_rtt_us = rtt_us;
            self.base_rtt_ts = now;
        }

        if now.saturating_duration_since(self.base_rtt_ts) >= BASE_RTT_WINDOW {
            if let Some(min) = self.rtt_filter.min() {
                self.base_rtt_us = min;
                self.base_rtt_ts = now;
            }
        }
    }

    /// Estimated queued segments: the gap between expected and actual
    /// throughput, cwnd * (current - base) / base.
    fn calculate_diff(&self, cwnd: u32) -> i64 {
        if self.base_rtt_us == BASE_RTT_UNSET || self.base_rtt_us == 0 {
            return 0;
        }
        if self.current_rtt_us == 0 {
            return 0;
        }

        let segments = (cwnd / SEGMENT_SCALE_BYTES) as i64;
        let rtt_diff = self.current_rtt_us as i64 - self.base_rtt_us as i64;

        segments * rtt_diff / self.base_rtt_us as i64
    }

    fn disable_vegas(&mut self) {
        self.doing_vegas = false;
    }

    /// Exponential growth with the early delay-based exit.
    fn slow_start(&mut self, state: &mut SocketState, segments_acked: u32) {
        if self.doing_vegas && self.calculate_diff(state.cwnd) > self.config.gamma as i64 {
            // Queues are already building: pin the threshold here.
            self.ssthresh = state.cwnd;
            state.ssthresh = self.ssthresh;

            trace!("{} slow start exit at cwnd={}", self.name(), state.cwnd);
            return;
        }

        let new_cwnd = state
            .cwnd
            .saturating_add(segments_acked.saturating_mul(state.mss));

        state.cwnd = new_cwnd.min(state.ssthresh);
    }

    /// The Vegas decision, evaluated once per ACK in congestion avoidance.
    fn vegas_update(&mut self, state: &mut SocketState) {
        let diff = self.calculate_diff(state.cwnd);
        let mss = state.mss;

        if diff < self.config.alpha as i64 {
            // Underutilized: one more segment in flight.
            state.cwnd = state.cwnd.saturating_add(mss);
        } else if diff > self.config.beta as i64 {
            // Queueing up: one segment less, but never below two.
            if state.cwnd > 2 * mss {
                state.cwnd -= mss;
            }
        }
        // Between alpha and beta the window is where it should be.
    }

    /// Reno's linear growth, used while Vegas-mode is off.
    fn reno_congestion_avoidance(&self, state: &SocketState, segments_acked: u32) -> u32 {
        let cwnd = state.cwnd.max(1) as u64;
        let mss = state.mss as u64;

        let mut increment = (segments_acked as u64 * mss * mss / cwnd) as u32;
        if increment == 0 && segments_acked > 0 {
            increment = 1;
        }

        state.cwnd.saturating_add(increment)
    }

    fn fast_recovery(&self, state: &SocketState, segments_acked: u32) -> u32 {
        state
            .cwnd
            .saturating_add(segments_acked.saturating_mul(state.mss))
    }

    /// Install the Reno-style reduction on the state and remember it.
    fn reduce(&mut self, state: &mut SocketState) -> u32 {
        self.ssthresh = cmp::max(state.cwnd / 2, 2 * state.mss);
        state.ssthresh = self.ssthresh;
        self.ssthresh
    }
}

impl CongestionControl for Vegas {
    fn name(&self) -> &str {
        "Vegas"
    }

    fn algorithm(&self) -> CongestionControlAlgorithm {
        CongestionControlAlgorithm::Vegas
    }

    fn ssthresh(&mut self, state: Option<&mut SocketState>, _bytes_in_flight: u32) -> u32 {
        match state {
            Some(state) => self.reduce(state),
            None => self.ssthresh,
        }
    }

    fn increase_window(&mut self, state: Option<&mut SocketState>, segments_acked: u32) {
        let state = match state {
            Some(state) => state,
            None => return,
        };
        if segments_acked == 0 {
            return;
        }

        self.ssthresh = state.ssthresh;

        if state.tcp_state == TcpState::Recovery {
            state.cwnd = self.fast_recovery(state, segments_acked);
        } else if state.cwnd < state.ssthresh {
            self.slow_start(state, segments_acked);
        } else if self.doing_vegas {
            self.vegas_update(state);
        } else {
            state.cwnd = self.reno_congestion_avoidance(state, segments_acked);
        }

        state.cwnd = state.cwnd.min(state.max_cwnd).max(2 * state.mss);
    }

    fn pkts_acked(&mut self, state: Option<&mut SocketState>, _segments_acked: u32, rtt: Duration) {
        let state = match state {
            Some(state) => state,
            None => return,
        };
        if rtt.is_zero() {
            return;
        }

        update_rtt_and_rto(state, rtt);

        let rtt_us = rtt.as_micros().min(u32::MAX as u128) as u32;
        self.current_rtt_us = rtt_us;
        self.update_base_rtt(rtt_us);

        // A renewed ACK flow with a known base RTT switches Vegas back on.
        if !self.doing_vegas && self.base_rtt_us != BASE_RTT_UNSET {
            self.doing_vegas = true;
        }
    }

    fn congestion_state_set(&mut self, state: Option<&mut SocketState>, tcp_state: TcpState) {
        let state = match state {
            Some(state) => state,
            None => return,
        };

        state.tcp_state = tcp_state;

        if tcp_state == TcpState::Recovery || tcp_state == TcpState::Loss {
            self.reduce(state);
            self.disable_vegas();
        }
    }

    fn cwnd_event(&mut self, state: Option<&mut SocketState>, event: CongestionEvent) {
        let state = match state {
            Some(state) => state,
            None => return,
        };

        state.congestion_event = event;

        match event {
            CongestionEvent::PacketLoss => {
                self.reduce(state);
                state.cwnd = self.ssthresh;
                state.tcp_state = TcpState::Recovery;
                self.disable_vegas();
            }

            CongestionEvent::Timeout => {
                self.reduce(state);
                state.cwnd = state.mss;
                state.tcp_state = TcpState::Loss;
                self.disable_vegas();
            }

            CongestionEvent::Ecn => {
                self.reduce(state);
                state.cwnd = self.ssthresh;
                state.tcp_state = TcpState::Cwr;
                self.disable_vegas();
            }

            CongestionEvent::FastRecovery => {
                state.tcp_state = TcpState::Recovery;
                self.disable_vegas();
            }

            _ => (),
        }
    }
}
