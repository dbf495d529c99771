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

//! CUBIC congestion control.
//!
//! CUBIC replaces the linear window growth of standard TCP with a cubic
//! function centered on the window size at the last congestion event, so
//! that growth is fast far from the saturation point and cautious near it.
//! Optional features: fast convergence, a TCP-friendly window floor, and
//! HyStart delay-spread slow start exit.
//!
//! See <https://www.rfc-editor.org/rfc/rfc9438.html>.

use std::cmp;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use log::*;

use super::update_rtt_and_rto;
use super::CongestionControl;
use super::CongestionControlAlgorithm;
use crate::clock::Clock;
use crate::clock::SystemClock;
use crate::CongestionEvent;
use crate::SocketState;
use crate::TcpState;

/// Cubic constant C, which determines the aggressiveness of window growth.
const C: f64 = 0.4;

/// Cubic multiplicative decrease factor beta.
const BETA: f64 = 0.7;

/// Nominal segment size used by the cubic curve and the K calculation,
/// independent of the configured MSS.
const SEGMENT_SCALE_BYTES: f64 = 1460.0;

/// Delay spread (in microseconds) above which HyStart leaves slow start.
const HYSTART_ACK_DELTA: u32 = 2;

/// Sentinel for an unset HyStart round minimum.
const DELAY_UNSET: u32 = u32::MAX;

/// Cubic configurable parameters.
#[derive(Debug)]
pub struct CubicConfig {
    /// Constant C.
    c: f64,

    /// Beta.
    beta: f64,

    /// Enable Hystart slow start exit, default to true.
    hystart_enabled: bool,

    /// Delay spread threshold for Hystart in microseconds.
    hystart_ack_delta: u32,

    /// Enable fast convergence, default to true.
    fast_convergence_enabled: bool,

    /// Enable the TCP-friendly window floor, default to true.
    tcp_friendly_enabled: bool,
}

impl CubicConfig {
    /// Update C.
    pub fn set_c(&mut self, c: f64) -> &mut Self {
        self.c = c;
        self
    }

    /// Update beta.
    pub fn set_beta(&mut self, beta: f64) -> &mut Self {
        self.beta = beta;
        self
    }

    /// Enable hystart.
    pub fn enable_hystart(&mut self, enable: bool) -> &mut Self {
        self.hystart_enabled = enable;
        self
    }

    /// Update the hystart delay spread threshold in microseconds.
    pub fn set_hystart_ack_delta(&mut self, delta: u32) -> &mut Self {
        self.hystart_ack_delta = delta;
        self
    }

    /// Enable fast convergence.
    pub fn enable_fast_convergence(&mut self, enable: bool) -> &mut Self {
        self.fast_convergence_enabled = enable;
        self
    }

    /// Enable the TCP-friendly floor.
    pub fn enable_tcp_friendly(&mut self, enable: bool) -> &mut Self {
        self.tcp_friendly_enabled = enable;
        self
    }
}

impl Default for CubicConfig {
    fn default() -> Self {
        Self {
            c: C,
            beta: BETA,
            hystart_enabled: true,
            hystart_ack_delta: HYSTART_ACK_DELTA,
            fast_convergence_enabled: true,
            tcp_friendly_enabled: true,
        }
    }
}

/// Cubic congestion control algorithm.
#[derive(Debug)]
pub struct Cubic {
    /// Configuration.
    config: CubicConfig,

    /// Monotonic clock handle.
    clock: Arc<dyn Clock>,

    /// Last installed slow start threshold in bytes.
    ssthresh: u32,

    /// W_max: the window just before the last reduction, in bytes.
    last_max_cwnd: u32,

    /// K: the time period the cubic function takes to grow back to W_max.
    k: f64,

    /// Estimated window of a Reno flow over the same path, in bytes.
    tcp_cwnd: u32,

    /// ACKs counted towards the next window increment.
    ack_count: u32,

    /// Start of the current congestion avoidance epoch.
    epoch_start: Instant,

    /// Smallest delay seen in the current slow start round, in microseconds.
    hystart_delay_min: u32,

    /// Largest delay seen in the current slow start round, in microseconds.
    hystart_delay_max: u32,
}

impl Cubic {
    pub fn new(config: CubicConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CubicConfig, clock: Arc<dyn Clock>) -> Self {
        let epoch_start = clock.now();
        Self {
            config,
            clock,
            ssthresh: crate::INITIAL_SSTHRESH,
            last_max_cwnd: 0,
            k: 0.0,
            tcp_cwnd: 0,
            ack_count: 0,
            epoch_start,
            hystart_delay_min: DELAY_UNSET,
            hystart_delay_max: 0,
        }
    }

    /// The cubic curve at time `t` since the epoch start, in bytes.
    fn w_cubic(&self, t: f64) -> u32 {
        // W_cubic(t) = C*(t-K)^3 + W_max
        let delta_t = t - self.k;
        let target =
            self.last_max_cwnd as f64 + self.config.c * delta_t.powi(3) * SEGMENT_SCALE_BYTES;

        target.max(0.0) as u32
    }

    /// Recompute K, the inflection point of the curve.
    fn calculate_k(&mut self) {
        // K = cubic_root(W_max*(1-beta)/C), with W_max in segments.
        if self.last_max_cwnd == 0 || self.config.c == 0.0 {
            self.k = 0.0;
            return;
        }

        let w_max_segments = self.last_max_cwnd as f64 / SEGMENT_SCALE_BYTES;
        let k_cubed = w_max_segments * (1.0 - self.config.beta) / self.config.c;

        self.k = if k_cubed < 0.0 { 0.0 } else { k_cubed.cbrt() };
    }

    /// Multiplicative decrease: update W_max (with fast convergence),
    /// install the new threshold, and recompute K.
    fn reduce(&mut self, state: &mut SocketState) -> u32 {
        self.last_max_cwnd =
            if self.config.fast_convergence_enabled && state.cwnd < self.last_max_cwnd {
                (state.cwnd as f64 * (2.0 - self.config.beta) / 2.0) as u32
            } else {
                state.cwnd
            };

        self.ssthresh = cmp::max(
            (state.cwnd as f64 * self.config.beta).round() as u32,
            2 * state.mss,
        );
        state.ssthresh = self.ssthresh;

        self.calculate_k();

        self.ssthresh
    }

    /// Exponential growth, clamped at the slow start threshold.
    fn slow_start(&mut self, state: &SocketState, segments_acked: u32) -> u32 {
        let mut new_cwnd = state
            .cwnd
            .saturating_add(segments_acked.saturating_mul(state.mss));

        if new_cwnd > state.ssthresh {
            new_cwnd = state.ssthresh;
            self.reset_hystart_bounds();
        }

        new_cwnd
    }

    fn fast_recovery(&self, state: &SocketState, segments_acked: u32) -> u32 {
        state
            .cwnd
            .saturating_add(segments_acked.saturating_mul(state.mss))
    }

    /// The cubic window update, run once per ACK in congestion avoidance.
    fn cubic_update(&mut self, state: &mut SocketState) {
        if state.mss == 0 {
            return;
        }

        self.ack_count = self.ack_count.saturating_add(1);

        let now = self.clock.now();
        let t = now.saturating_duration_since(self.epoch_start).as_secs_f64();

        let mut target = self.w_cubic(t);

        // The TCP-friendly region keeps cwnd at least at what a Reno flow
        // would have reached: W_tcp(t) = W_max*(1-beta) + 3*beta/(2-beta)*t/RTT.
        if self.config.tcp_friendly_enabled && state.rtt_us > 0 {
            let rtt_sec = state.rtt_us as f64 / 1_000_000.0;
            let beta = self.config.beta;
            let tcp_increment = 3.0 * beta / (2.0 - beta) * (t / rtt_sec) * state.mss as f64;

            self.tcp_cwnd =
                (self.last_max_cwnd as f64 * (1.0 - beta) + tcp_increment).min(u32::MAX as f64) as u32;

            if self.tcp_cwnd > target {
                target = self.tcp_cwnd;
            }
        }

        if target > state.cwnd {
            // Spread the climb to the target over cwnd/delta ACKs.
            let delta = target - state.cwnd;
            let cnt = cmp::max(1, state.cwnd / delta);

            if self.ack_count >= cnt {
                state.cwnd = state.cwnd.saturating_add(state.mss);
                self.ack_count = 0;
            }
        } else {
            // Above the curve: grow by one segment per window at most.
            if self.ack_count >= state.cwnd / state.mss {
                state.cwnd = state.cwnd.saturating_add(state.mss);
                self.ack_count = 0;
            }
        }
    }

    fn reset_hystart_bounds(&mut self) {
        self.hystart_delay_min = DELAY_UNSET;
        self.hystart_delay_max = 0;
    }

    /// Per-round delay spread tracking. A spread above the threshold means
    /// queues are building, so slow start ends at the current window.
    fn hystart_on_ack(&mut self, state: &mut SocketState, rtt_us: u32) {
        if rtt_us < self.hystart_delay_min {
            self.hystart_delay_min = rtt_us;
        }
        if rtt_us > self.hystart_delay_max {
            self.hystart_delay_max = rtt_us;
        }

        if self.hystart_delay_min != DELAY_UNSET
            && self.hystart_delay_max - self.hystart_delay_min > self.config.hystart_ack_delta
        {
            trace!(
                "{} hystart exit: delay spread {}us cwnd={}",
                self.name(),
                self.hystart_delay_max - self.hystart_delay_min,
                state.cwnd
            );

            self.ssthresh = state.cwnd;
            state.ssthresh = self.ssthresh;
        }
    }

    /// Drop all curve state, e.g. after a timeout.
    fn cubic_reset(&mut self) {
        self.last_max_cwnd = 0;
        self.k = 0.0;
        self.tcp_cwnd = 0;
        self.ack_count = 0;
        self.epoch_start = self.clock.now();
        self.reset_hystart_bounds();
    }
}

impl CongestionControl for Cubic {
    fn name(&self) -> &str {
        "CUBIC"
    }

    fn algorithm(&self) -> CongestionControlAlgorithm {
        CongestionControlAlgorithm::Cubic
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
            state.cwnd = self.fast_recovery(state, segments_acked).min(state.max_cwnd);
        } else if state.cwnd < state.ssthresh {
            state.cwnd = self.slow_start(state, segments_acked).min(state.max_cwnd);
        } else {
            self.cubic_update(state);
            state.cwnd = state.cwnd.min(state.max_cwnd);
        }
    }

    fn pkts_acked(&mut self, state: Option<&mut SocketState>, segments_acked: u32, rtt: Duration) {
        let state = match state {
            Some(state) => state,
            None => return,
        };

        update_rtt_and_rto(state, rtt);

        if self.config.hystart_enabled && state.cwnd < state.ssthresh && !rtt.is_zero() {
            let rtt_us = rtt.as_micros().min(u32::MAX as u128) as u32;
            self.hystart_on_ack(state, rtt_us);
        }

        self.ack_count = self.ack_count.saturating_add(segments_acked);
    }

    fn congestion_state_set(&mut self, state: Option<&mut SocketState>, tcp_state: TcpState) {
        let state = match state {
            Some(state) => state,
            None => return,
        };

        state.tcp_state = tcp_state;

        if tcp_state == TcpState::Recovery || tcp_state == TcpState::Loss {
            self.reduce(state);
        }
    }

    fn cwnd_event(&mut self, state: Option<&mut SocketState>, event: CongestionEvent) {
        let state = match state {
            Some(state) => state,
            None => return,
        };

        state.congestion_event = event;

        match event {
            CongestionEvent::PacketLoss | CongestionEvent::Timeout => {
                self.reduce(state);

                if event == CongestionEvent::Timeout {
                    state.cwnd = state.mss;
                    state.tcp_state = TcpState::Loss;
                    self.cubic_reset();
                } else {
                    state.cwnd = self.ssthresh;
                    state.tcp_state = TcpState::Recovery;
                }

                self.epoch_start = self.clock.now();
                self.ack_count = 0;
                self.tcp_cwnd = 0;
                self.reset_hystart_bounds();

                trace!(
                    "{} {:?}: ssthresh={} cwnd={} w_max={} k={}",
                    self.name(),
                    event,
                    state.ssthresh,
                    state.cwnd,
                    self.last_max_cwnd,
                    self.k
                );
            }

            CongestionEvent::Ecn => {
                self.reduce(state);
                state.cwnd = self.ssthresh;
                state.tcp_state = TcpState::Cwr;
                self.epoch_start = self.clock.now();
                self.ack_count = 0;
            }

            CongestionEvent::FastRecovery => {
                state.tcp_state = TcpState::Recovery;
            }

            _ => (),
        }
    }
}
