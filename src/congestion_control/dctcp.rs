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

//! DCTCP congestion control.
//!
//! DCTCP estimates the fraction of bytes that encountered congestion from
//! per-window ECN marks and reduces the window in proportion to that
//! fraction, `cwnd * (1 - alpha/2)`, instead of halving it. The window laws
//! outside reductions are those of Reno.
//!
//! The stack conveys per-ACK ECE marks through
//! [`pkts_acked_ecn`](CongestionControl::pkts_acked_ecn); a plain
//! [`pkts_acked`](CongestionControl::pkts_acked) batch counts as unmarked.
//!
//! See <https://www.rfc-editor.org/rfc/rfc8257>.

use std::cmp;
use std::time::Duration;

use log::*;

use super::update_rtt_and_rto;
use super::CongestionControl;
use super::CongestionControlAlgorithm;
use crate::CongestionEvent;
use crate::SocketState;
use crate::TcpState;

/// EWMA weight g for the marked-fraction estimate, 1/16.
const DEFAULT_G: f64 = 0.0625;

/// DCTCP configurable parameters.
#[derive(Debug)]
pub struct DctcpConfig {
    /// EWMA weight for the marked-fraction estimate.
    g: f64,
}

impl DctcpConfig {
    /// Update the EWMA weight.
    pub fn set_g(&mut self, g: f64) -> &mut Self {
        self.g = g.clamp(0.0, 1.0);
        self
    }
}

impl Default for DctcpConfig {
    fn default() -> Self {
        Self { g: DEFAULT_G }
    }
}

/// DCTCP congestion control algorithm.
#[derive(Debug)]
pub struct Dctcp {
    /// Configurable parameters.
    config: DctcpConfig,

    /// Last installed slow start threshold in bytes.
    ssthresh: u32,

    /// Alpha: the EWMA of the per-window ECN-marked byte fraction. Starts
    /// at the conservative maximum.
    alpha: f64,

    /// Bytes acknowledged in the current window.
    acked_bytes_total: u64,

    /// ECN-marked bytes acknowledged in the current window.
    acked_bytes_ecn: u64,
}

impl Dctcp {
    pub fn new(config: DctcpConfig) -> Self {
        Self {
            config,
            ssthresh: crate::INITIAL_SSTHRESH,
            alpha: 1.0,
            acked_bytes_total: 0,
            acked_bytes_ecn: 0,
        }
    }

    fn in_slow_start(&self, state: &SocketState) -> bool {
        state.cwnd < state.ssthresh
    }

    /// Fold the finished window's marked fraction into alpha:
    /// alpha = (1-g)*alpha + g*F.
    fn update_alpha(&mut self) {
        if self.acked_bytes_total == 0 {
            return;
        }

        let fraction = self.acked_bytes_ecn as f64 / self.acked_bytes_total as f64;
        self.alpha = ((1.0 - self.config.g) * self.alpha + self.config.g * fraction)
            .clamp(0.0, 1.0);

        trace!("{} alpha={} F={}", self.name(), self.alpha, fraction);
    }

    fn reset_window_counters(&mut self) {
        self.acked_bytes_total = 0;
        self.acked_bytes_ecn = 0;
    }

    /// Install the proportional reduction on the state and remember it.
    fn reduce(&mut self, state: &mut SocketState) -> u32 {
        self.ssthresh = cmp::max(
            (state.cwnd as f64 * (1.0 - self.alpha / 2.0)) as u32,
            2 * state.mss,
        );
        state.ssthresh = self.ssthresh;
        self.ssthresh
    }

    /// Exponential growth, clamped at the slow start threshold.
    fn slow_start(&self, state: &SocketState, segments_acked: u32) -> u32 {
        let new_cwnd = state
            .cwnd
            .saturating_add(segments_acked.saturating_mul(state.mss));

        new_cwnd.min(state.ssthresh)
    }

    /// Linear growth, as in Reno.
    fn congestion_avoidance(&self, state: &SocketState, segments_acked: u32) -> u32 {
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

    /// Shared ACK path for marked and unmarked batches.
    fn on_acked(
        &mut self,
        state: Option<&mut SocketState>,
        segments_acked: u32,
        ecn_segments: u32,
        rtt: Duration,
    ) {
        let state = match state {
            Some(state) => state,
            None => return,
        };
        if segments_acked == 0 {
            return;
        }

        update_rtt_and_rto(state, rtt);

        let acked_bytes = segments_acked as u64 * state.mss as u64;
        let ecn_bytes = ecn_segments.min(segments_acked) as u64 * state.mss as u64;

        self.acked_bytes_total = self.acked_bytes_total.saturating_add(acked_bytes);
        self.acked_bytes_ecn = self.acked_bytes_ecn.saturating_add(ecn_bytes);

        // Roughly once per RTT a full window has been acknowledged.
        if self.acked_bytes_total >= state.cwnd as u64 {
            self.update_alpha();
            self.reset_window_counters();
        }
    }
}

impl CongestionControl for Dctcp {
    fn name(&self) -> &str {
        "DCTCP"
    }

    fn algorithm(&self) -> CongestionControlAlgorithm {
        CongestionControlAlgorithm::Dctcp
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

        let new_cwnd = if state.tcp_state == TcpState::Recovery {
            self.fast_recovery(state, segments_acked)
        } else if self.in_slow_start(state) {
            self.slow_start(state, segments_acked)
        } else {
            self.congestion_avoidance(state, segments_acked)
        };

        state.cwnd = new_cwnd.min(state.max_cwnd);
    }

    fn pkts_acked(&mut self, state: Option<&mut SocketState>, segments_acked: u32, rtt: Duration) {
        self.on_acked(state, segments_acked, 0, rtt);
    }

    fn pkts_acked_ecn(
        &mut self,
        state: Option<&mut SocketState>,
        segments_acked: u32,
        ecn_segments: u32,
        rtt: Duration,
    ) {
        self.on_acked(state, segments_acked, ecn_segments, rtt);
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
            CongestionEvent::PacketLoss => {
                self.reduce(state);
                state.cwnd = self.ssthresh;
                state.tcp_state = TcpState::Recovery;
            }

            CongestionEvent::Timeout => {
                self.ssthresh = cmp::max(state.cwnd / 2, 2 * state.mss);
                state.ssthresh = self.ssthresh;
                state.cwnd = state.mss;
                state.tcp_state = TcpState::Loss;

                // Severe congestion: back to the conservative estimate.
                self.alpha = 1.0;
                self.reset_window_counters();
            }

            CongestionEvent::Ecn => {
                // The proportional reduction applies in congestion
                // avoidance only; slow start keeps growing while alpha
                // tracks the marks.
                if !self.in_slow_start(state) {
                    self.reduce(state);
                    state.cwnd = self.ssthresh;
                }
                state.tcp_state = TcpState::Cwr;
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
    fn dctcp_alpha_ewma() {
        let mut dctcp = Dctcp::new(DctcpConfig::default());
        let mut state = socket_state(20 * 1460);
        let rtt = Duration::from_millis(1);

        assert_eq!(dctcp.alpha, 1.0);

        // Half of a 29200-byte window arrives marked: F = 0.5, and
        // alpha = (15/16)*1 + (1/16)*0.5.
        dctcp.pkts_acked_ecn(Some(&mut state), 10, 10, rtt);
        assert_eq!(dctcp.alpha, 1.0);

        dctcp.pkts_acked_ecn(Some(&mut state), 10, 0, rtt);
        assert_eq!(dctcp.alpha, 0.96875);
        assert_eq!(dctcp.acked_bytes_total, 0);
        assert_eq!(dctcp.acked_bytes_ecn, 0);
    }

    #[test]
    fn dctcp_alpha_decays_without_marks() {
        let mut dctcp = Dctcp::new(DctcpConfig::default());
        let mut state = socket_state(1460);
        let rtt = Duration::from_millis(1);

        // Mark-free windows pull alpha towards zero geometrically.
        dctcp.pkts_acked(Some(&mut state), 1, rtt);
        assert_eq!(dctcp.alpha, 1.0 - 0.0625);

        dctcp.pkts_acked(Some(&mut state), 1, rtt);
        assert_eq!(dctcp.alpha, (1.0 - 0.0625) * (1.0 - 0.0625));
    }

    #[test]
    fn dctcp_excess_ecn_segments_clamped() {
        let mut dctcp = Dctcp::new(DctcpConfig::default());
        let mut state = socket_state(1460);

        // More marked than acked segments cannot push F above 1.
        dctcp.pkts_acked_ecn(Some(&mut state), 1, 5, Duration::from_millis(1));
        assert!(dctcp.alpha <= 1.0);
    }

    #[test]
    fn dctcp_ecn_reduction_in_congestion_avoidance() {
        let mut dctcp = Dctcp::new(DctcpConfig::default());
        let mut state = socket_state(20 * 1460);
        state.ssthresh = 10 * 1460;
        dctcp.alpha = 0.5;

        dctcp.cwnd_event(Some(&mut state), CongestionEvent::Ecn);

        // cwnd * (1 - 0.5/2) = 0.75x.
        assert_eq!(state.ssthresh, (20.0 * 1460.0 * 0.75) as u32);
        assert_eq!(state.cwnd, state.ssthresh);
        assert_eq!(state.tcp_state, TcpState::Cwr);
    }

    #[test]
    fn dctcp_ecn_in_slow_start_keeps_window() {
        let mut dctcp = Dctcp::new(DctcpConfig::default());
        let mut state = socket_state(20 * 1460);

        dctcp.cwnd_event(Some(&mut state), CongestionEvent::Ecn);

        assert_eq!(state.cwnd, 20 * 1460);
        assert_eq!(state.ssthresh, crate::INITIAL_SSTHRESH);
        assert_eq!(state.tcp_state, TcpState::Cwr);
    }

    #[test]
    fn dctcp_loss_uses_alpha_formula() {
        let mut dctcp = Dctcp::new(DctcpConfig::default());
        let mut state = socket_state(20 * 1460);
        state.ssthresh = 10 * 1460;
        dctcp.alpha = 0.25;

        dctcp.cwnd_event(Some(&mut state), CongestionEvent::PacketLoss);

        // cwnd * (1 - 0.25/2) = 0.875x.
        assert_eq!(state.ssthresh, (20.0 * 1460.0 * 0.875) as u32);
        assert_eq!(state.cwnd, state.ssthresh);
        assert_eq!(state.tcp_state, TcpState::Recovery);
    }

    #[test]
    fn dctcp_timeout() {
        let mut dctcp = Dctcp::new(DctcpConfig::default());
        let mut state = socket_state(20 * 1460);
        dctcp.alpha = 0.1;
        dctcp.acked_bytes_total = 5000;

        dctcp.cwnd_event(Some(&mut state), CongestionEvent::Timeout);

        assert_eq!(state.ssthresh, 10 * 1460);
        assert_eq!(state.cwnd, 1460);
        assert_eq!(state.tcp_state, TcpState::Loss);
        assert_eq!(dctcp.alpha, 1.0);
        assert_eq!(dctcp.acked_bytes_total, 0);
    }

    #[test]
    fn dctcp_window_laws_follow_reno() {
        let mut dctcp = Dctcp::new(DctcpConfig::default());
        let mut state = socket_state(1460);

        // Slow start.
        dctcp.increase_window(Some(&mut state), 1);
        assert_eq!(state.cwnd, 2 * 1460);

        // Congestion avoidance.
        state.cwnd = 10 * 1460;
        state.ssthresh = 10 * 1460;
        dctcp.increase_window(Some(&mut state), 2);
        assert_eq!(state.cwnd, 10 * 1460 + 2 * 1460 / 10);

        // Fast recovery inflation.
        let cwnd = state.cwnd;
        state.tcp_state = TcpState::Recovery;
        dctcp.increase_window(Some(&mut state), 1);
        assert_eq!(state.cwnd, cwnd + 1460);
    }

    #[test]
    fn dctcp_ssthresh_absent_state() {
        let mut dctcp = Dctcp::new(DctcpConfig::default());
        let mut state = socket_state(20 * 1460);
        dctcp.alpha = 0.5;

        let installed = dctcp.ssthresh(Some(&mut state), 0);
        assert_eq!(dctcp.ssthresh(None, 0), installed);
    }
}
