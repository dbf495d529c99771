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

//! BIC congestion control.
//!
//! BIC (Binary Increase Congestion control) treats congestion avoidance as a
//! search problem: far below the last saturation point it grows additively
//! by `Smax` segments, close to it the distance is halved per ACK, and past
//! it the window probes carefully before returning to additive growth.
//!
//! See <https://ieeexplore.ieee.org/document/1354672>.

use std::cmp;
use std::time::Duration;

use log::*;

use super::update_rtt_and_rto;
use super::CongestionControl;
use super::CongestionControlAlgorithm;
use crate::CongestionEvent;
use crate::SocketState;
use crate::TcpState;

/// Multiplicative decrease factor. BIC reduces less aggressively than Reno
/// so the binary search restarts near the old operating point.
const BETA: f64 = 0.8;

/// Smax: the maximum increment per ACK, in segments.
const MAX_INCREMENT: u32 = 32;

/// Smin: the minimum increment per ACK, in segments.
const MIN_INCREMENT: u32 = 1;

/// Below this window (in segments) BIC behaves like standard TCP on
/// reductions.
const LOW_WINDOW: u32 = 14;

/// BIC configurable parameters.
#[derive(Debug)]
pub struct BicConfig {
    /// Multiplicative decrease factor.
    beta: f64,

    /// Smax in segments.
    max_increment: u32,

    /// Smin in segments.
    min_increment: u32,

    /// Low window threshold in segments.
    low_window: u32,
}

impl BicConfig {
    /// Update beta.
    pub fn set_beta(&mut self, beta: f64) -> &mut Self {
        self.beta = beta;
        self
    }

    /// Update the maximum increment in segments.
    pub fn set_max_increment(&mut self, max_increment: u32) -> &mut Self {
        self.max_increment = max_increment.max(1);
        self
    }

    /// Update the minimum increment in segments.
    pub fn set_min_increment(&mut self, min_increment: u32) -> &mut Self {
        self.min_increment = min_increment.max(1);
        self
    }

    /// Update the low window threshold in segments.
    pub fn set_low_window(&mut self, low_window: u32) -> &mut Self {
        self.low_window = low_window;
        self
    }
}

impl Default for BicConfig {
    fn default() -> Self {
        Self {
            beta: BETA,
            max_increment: MAX_INCREMENT,
            min_increment: MIN_INCREMENT,
            low_window: LOW_WINDOW,
        }
    }
}

/// BIC congestion control algorithm.
#[derive(Debug)]
pub struct Bic {
    /// Configurable parameters.
    config: BicConfig,

    /// Last installed slow start threshold in bytes.
    ssthresh: u32,

    /// W_max: the window just before the last reduction, in bytes.
    last_max_cwnd: u32,

    /// Lower bound for the window after a reduction, in bytes.
    min_win: u32,

    /// Whether the binary search has reached its target since the last
    /// reduction.
    found_new_max: bool,
}

impl Bic {
    pub fn new(config: BicConfig) -> Self {
        Self {
            config,
            ssthresh: crate::INITIAL_SSTHRESH,
            last_max_cwnd: 0,
            min_win: 0,
            found_new_max: false,
        }
    }

    /// Exponential growth, clamped at the slow start threshold.
    fn slow_start(&self, state: &SocketState, segments_acked: u32) -> u32 {
        let new_cwnd = state
            .cwnd
            .saturating_add(segments_acked.saturating_mul(state.mss));

        new_cwnd.min(state.ssthresh)
    }

    fn fast_recovery(&self, state: &SocketState, segments_acked: u32) -> u32 {
        state
            .cwnd
            .saturating_add(segments_acked.saturating_mul(state.mss))
    }

    /// The binary-search window update, run once per ACK in congestion
    /// avoidance.
    fn bic_update(&mut self, state: &mut SocketState) {
        if state.mss == 0 {
            return;
        }

        let mss = state.mss;
        let smax = self.config.max_increment;
        let smin = self.config.min_increment;
        let mut cwnd = state.cwnd;

        // Search towards W_max once it is known, otherwise keep pushing the
        // target Smax segments ahead of the current window.
        let target = if self.found_new_max && self.last_max_cwnd > 0 {
            self.last_max_cwnd
        } else {
            cwnd.saturating_add(smax.saturating_mul(mss))
        };

        let dist = (target as i64 - cwnd as i64) / mss as i64;

        if dist > smax as i64 {
            // Far from the target: additive increase.
            cwnd = cwnd.saturating_add(smax.saturating_mul(mss));
        } else if dist > 0 {
            // Binary search: halve the remaining distance, at least Smin.
            let increment = if dist > smin as i64 {
                cmp::max((dist as u32 / 2).saturating_mul(mss), smin * mss)
            } else {
                smin * mss
            };
            cwnd = cwnd.saturating_add(increment);
        } else {
            // Reached or passed the target.
            if !self.found_new_max {
                self.found_new_max = true;
                self.last_max_cwnd = cwnd;
            }

            // Probe slowly just past the old maximum, then return to
            // additive steps.
            if cwnd < self.last_max_cwnd.saturating_add(smax.saturating_mul(mss)) {
                cwnd = cwnd.saturating_add(smin * mss);
            } else {
                cwnd = cwnd.saturating_add(smax.saturating_mul(mss));
                self.last_max_cwnd = cwnd;
            }
        }

        state.cwnd = cwnd.max(self.min_win);
    }

    /// Drop all search state, e.g. after a timeout.
    fn bic_reset(&mut self) {
        self.last_max_cwnd = 0;
        self.min_win = 0;
        self.found_new_max = false;
    }

    /// Install a reduced threshold on the state and remember it.
    fn reduce(&mut self, state: &mut SocketState) -> u32 {
        // Small windows get the standard halving; the gentle beta reduction
        // only pays off once the search has room to work.
        self.ssthresh = if state.cwnd <= self.config.low_window.saturating_mul(state.mss) {
            cmp::max(state.cwnd / 2, 2 * state.mss)
        } else {
            cmp::max(
                (state.cwnd as f64 * self.config.beta) as u32,
                2 * state.mss,
            )
        };
        state.ssthresh = self.ssthresh;
        self.ssthresh
    }
}

impl CongestionControl for Bic {
    fn name(&self) -> &str {
        "BIC"
    }

    fn algorithm(&self) -> CongestionControlAlgorithm {
        CongestionControlAlgorithm::Bic
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
            self.bic_update(state);
            state.cwnd = state.cwnd.min(state.max_cwnd);
        }
    }

    fn pkts_acked(&mut self, state: Option<&mut SocketState>, _segments_acked: u32, rtt: Duration) {
        if let Some(state) = state {
            update_rtt_and_rto(state, rtt);
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
            self.min_win = self.ssthresh;
            self.found_new_max = false;
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
                self.last_max_cwnd = cmp::max(state.cwnd, self.last_max_cwnd);

                self.reduce(state);
                self.min_win = self.ssthresh;
                self.found_new_max = false;

                if event == CongestionEvent::Timeout {
                    state.cwnd = state.mss;
                    state.tcp_state = TcpState::Loss;
                    self.bic_reset();
                } else {
                    state.cwnd = self.ssthresh;
                    state.tcp_state = TcpState::Recovery;
                }

                trace!(
                    "{} {:?}: ssthresh={} cwnd={} w_max={}",
                    self.name(),
                    event,
                    state.ssthresh,
                    state.cwnd,
                    self.last_max_cwnd
                );
            }

            CongestionEvent::Ecn => {
                self.last_max_cwnd = cmp::max(state.cwnd, self.last_max_cwnd);

                self.reduce(state);
                state.cwnd = self.ssthresh;
                state.tcp_state = TcpState::Cwr;
                self.min_win = self.ssthresh;
                self.found_new_max = false;
            }

            CongestionEvent::FastRecovery => {
                state.tcp_state = TcpState::Recovery;
            }

            _ => (),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn socket_state(cwnd: u32) -> SocketState {
        SocketState {
            cwnd,
            max_cwnd: u32::MAX,
            ..SocketState::default()
        }
    }

    #[test]
    fn bic_reduction_beta() {
        let mut bic = Bic::new(BicConfig::default());
        let mut state = socket_state(20 * 1460);

        bic.cwnd_event(Some(&mut state), CongestionEvent::PacketLoss);

        // 20 segments is above the low window: beta reduction.
        assert_eq!(state.ssthresh, (20.0 * 1460.0 * 0.8) as u32);
        assert_eq!(state.cwnd, state.ssthresh);
        assert_eq!(state.tcp_state, TcpState::Recovery);
        assert_eq!(bic.last_max_cwnd, 20 * 1460);
        assert!(!bic.found_new_max);
    }

    #[test]
    fn bic_reduction_low_window() {
        let mut bic = Bic::new(BicConfig::default());
        let mut state = socket_state(10 * 1460);

        let ssthresh = bic.ssthresh(Some(&mut state), 0);

        // At or below 14 segments BIC halves like standard TCP.
        assert_eq!(ssthresh, 5 * 1460);
        assert_eq!(bic.ssthresh(None, 0), 5 * 1460);
    }

    #[test]
    fn bic_additive_then_binary_search() {
        let mut bic = Bic::new(BicConfig::default());
        let mut state = socket_state(100 * 1460);
        state.ssthresh = 2 * 1460;

        // W_max is known and far away: additive Smax steps first.
        bic.found_new_max = true;
        bic.last_max_cwnd = 200 * 1460;

        for expected in [132, 164, 196] {
            bic.increase_window(Some(&mut state), 1);
            assert_eq!(state.cwnd, expected * 1460);
        }

        // dist = 4 segments: binary search halves the distance.
        bic.increase_window(Some(&mut state), 1);
        assert_eq!(state.cwnd, 198 * 1460);

        // dist = 2: halves again, then creeps by Smin to the target.
        bic.increase_window(Some(&mut state), 1);
        assert_eq!(state.cwnd, 199 * 1460);
        bic.increase_window(Some(&mut state), 1);
        assert_eq!(state.cwnd, 200 * 1460);
    }

    #[test]
    fn bic_monotone_between_losses() {
        let mut bic = Bic::new(BicConfig::default());
        let mut state = socket_state(30 * 1460);

        bic.cwnd_event(Some(&mut state), CongestionEvent::PacketLoss);
        state.tcp_state = TcpState::Open;

        let mut prev = state.cwnd;
        for _ in 0..64 {
            bic.increase_window(Some(&mut state), 1);
            assert!(state.cwnd >= prev);
            prev = state.cwnd;
        }
    }

    #[test]
    fn bic_max_probe_region() {
        let mut bic = Bic::new(BicConfig::default());
        let mut state = socket_state(50 * 1460);
        state.ssthresh = 2 * 1460;

        // Fresh search without a known maximum: the target sits Smax ahead,
        // so the first ACK halves the distance.
        bic.increase_window(Some(&mut state), 1);
        assert_eq!(state.cwnd, 66 * 1460);
        assert!(!bic.found_new_max);

        // Reaching the target records the new maximum.
        bic.found_new_max = true;
        bic.last_max_cwnd = state.cwnd;
        bic.increase_window(Some(&mut state), 1);
        assert_eq!(state.cwnd, 67 * 1460);
        assert_eq!(bic.last_max_cwnd, 66 * 1460);

        // Slow probing continues one segment at a time.
        bic.increase_window(Some(&mut state), 1);
        assert_eq!(state.cwnd, 68 * 1460);
    }

    #[test]
    fn bic_timeout_resets_search() {
        let mut bic = Bic::new(BicConfig::default());
        let mut state = socket_state(40 * 1460);
        bic.found_new_max = true;
        bic.last_max_cwnd = 40 * 1460;

        bic.cwnd_event(Some(&mut state), CongestionEvent::Timeout);

        assert_eq!(state.cwnd, 1460);
        assert_eq!(state.tcp_state, TcpState::Loss);
        assert_eq!(bic.last_max_cwnd, 0);
        assert_eq!(bic.min_win, 0);
        assert!(!bic.found_new_max);
    }

    #[test]
    fn bic_ecn() {
        let mut bic = Bic::new(BicConfig::default());
        let mut state = socket_state(20 * 1460);

        bic.cwnd_event(Some(&mut state), CongestionEvent::Ecn);

        assert_eq!(state.cwnd, state.ssthresh);
        assert_eq!(state.tcp_state, TcpState::Cwr);
        assert_eq!(bic.min_win, state.ssthresh);
    }

    #[test]
    fn bic_slow_start() {
        let mut bic = Bic::new(BicConfig::default());
        let mut state = socket_state(2 * 1460);

        bic.increase_window(Some(&mut state), 2);
        assert_eq!(state.cwnd, 4 * 1460);
    }

    #[test]
    fn bic_config() {
        let mut config = BicConfig::default();
        config
            .set_beta(0.5)
            .set_max_increment(16)
            .set_min_increment(2)
            .set_low_window(0);

        assert_eq!(config.beta, 0.5);
        assert_eq!(config.max_increment, 16);
        assert_eq!(config.min_increment, 2);
        assert_eq!(config.low_window, 0);
    }
}
