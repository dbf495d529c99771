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

//! Reno congestion control.
//!
//! The classic loss-based AIMD baseline: exponential slow start below the
//! threshold, linear congestion avoidance above it, window inflation during
//! fast recovery, and multiplicative decrease on loss signals.
//!
//! See <https://www.rfc-editor.org/rfc/rfc5681>.

use std::cmp;
use std::time::Duration;

use log::*;

use super::update_rtt_and_rto;
use super::CongestionControl;
use super::CongestionControlAlgorithm;
use crate::CongestionEvent;
use crate::SocketState;
use crate::TcpState;

/// Reno congestion control algorithm.
#[derive(Debug)]
pub struct Reno {
    /// Last installed slow start threshold in bytes.
    ssthresh: u32,
}

impl Default for Reno {
    fn default() -> Self {
        Self::new()
    }
}

impl Reno {
    pub fn new() -> Self {
        Self {
            ssthresh: crate::INITIAL_SSTHRESH,
        }
    }

    /// Exponential growth, clamped at the slow start threshold.
    fn slow_start(&self, state: &SocketState, segments_acked: u32) -> u32 {
        let new_cwnd = state
            .cwnd
            .saturating_add(segments_acked.saturating_mul(state.mss));

        new_cwnd.min(state.ssthresh)
    }

    /// Linear growth of roughly one MSS per RTT, with a minimum increment of
    /// one byte so small windows still make progress.
    fn congestion_avoidance(&self, state: &SocketState, segments_acked: u32) -> u32 {
        let cwnd = state.cwnd.max(1) as u64;
        let mss = state.mss as u64;

        let mut increment = (segments_acked as u64 * mss * mss / cwnd) as u32;
        if increment == 0 && segments_acked > 0 {
            increment = 1;
        }

        state.cwnd.saturating_add(increment)
    }

    /// Inflate the window for each additional duplicate ACK until the loss
    /// is repaired.
    fn fast_recovery(&self, state: &SocketState, segments_acked: u32) -> u32 {
        state
            .cwnd
            .saturating_add(segments_acked.saturating_mul(state.mss))
    }

    /// Duplicate-ACK triggered retransmit: halve the threshold, enter fast
    /// recovery, and inflate the window three segments above the new
    /// threshold. Returns the new window.
    pub fn fast_retransmit(&mut self, state: Option<&mut SocketState>) -> u32 {
        let state = match state {
            Some(state) => state,
            None => return self.ssthresh,
        };

        self.ssthresh = cmp::max(state.cwnd / 2, 2 * state.mss);
        state.ssthresh = self.ssthresh;
        state.tcp_state = TcpState::Recovery;

        state.cwnd = self
            .ssthresh
            .saturating_add(3 * state.mss)
            .min(state.max_cwnd);
        state.cwnd
    }
}

impl CongestionControl for Reno {
    fn name(&self) -> &str {
        "Reno"
    }

    fn algorithm(&self) -> CongestionControlAlgorithm {
        CongestionControlAlgorithm::Reno
    }

    fn ssthresh(&mut self, state: Option<&mut SocketState>, _bytes_in_flight: u32) -> u32 {
        if let Some(state) = state {
            self.ssthresh = cmp::max(state.cwnd / 2, 2 * state.mss);
            state.ssthresh = self.ssthresh;
        }

        self.ssthresh
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
        } else if state.cwnd < state.ssthresh {
            self.slow_start(state, segments_acked)
        } else {
            self.congestion_avoidance(state, segments_acked)
        };

        state.cwnd = new_cwnd.min(state.max_cwnd);
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
            self.ssthresh = cmp::max(state.cwnd / 2, 2 * state.mss);
            state.ssthresh = self.ssthresh;
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
                self.ssthresh = cmp::max(state.cwnd / 2, 2 * state.mss);
                state.ssthresh = self.ssthresh;

                if event == CongestionEvent::Timeout {
                    // Timeout collapses the window to one segment.
                    state.cwnd = state.mss;
                    state.tcp_state = TcpState::Loss;
                } else {
                    state.tcp_state = TcpState::Recovery;
                }

                trace!(
                    "{} {:?}: ssthresh={} cwnd={}",
                    self.name(),
                    event,
                    state.ssthresh,
                    state.cwnd
                );
            }

            CongestionEvent::Ecn => {
                self.ssthresh = cmp::max(state.cwnd / 2, 2 * state.mss);
                state.ssthresh = self.ssthresh;
                state.cwnd = self.ssthresh;
                state.tcp_state = TcpState::Cwr;
            }

            CongestionEvent::FastRecovery => {
                state.tcp_state = TcpState::Recovery;
            }

            _ => (),
        }
    }
}
