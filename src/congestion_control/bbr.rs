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

//! BBR congestion control.
//!
//! BBR uses recent measurements of a transport connection's delivery rate
//! and round-trip time to build an explicit model that includes both the
//! maximum recent bandwidth available to that connection, and its minimum
//! recent round-trip delay. BBR then uses this model to control both how
//! fast it sends data and the maximum amount of data it allows in flight in
//! the network at any time.
//!
//! See <https://datatracker.ietf.org/doc/html/draft-cardwell-iccrg-bbr-congestion-control-00>.

extern crate rand;

use std::cmp;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use log::*;
use rand::Rng;

use super::sample_window::SampleWindow;
use super::update_rtt_and_rto;
use super::CongestionControl;
use super::CongestionControlAlgorithm;
use crate::clock::Clock;
use crate::clock::SystemClock;
use crate::CongestionEvent;
use crate::SocketState;
use crate::TcpState;

/// The minimum gain (in percent) that allows the sending rate to double each
/// round: 2/ln(2) ~= 2.89. Used for pacing during Startup.
const HIGH_GAIN: u32 = 289;

/// Default congestion window gain in percent.
const CWND_GAIN: u32 = 200;

/// Pacing gain while draining the queue built up during Startup, the
/// inverse of the Startup gain.
const DRAIN_PACING_GAIN: u32 = 100 * 100 / HIGH_GAIN;

/// Congestion window gain while probing for the minimum RTT.
const PROBE_RTT_CWND_GAIN: u32 = 50;

/// The number of phases in the ProbeBW gain cycle.
const GAIN_CYCLE_LEN: usize = 8;

/// Pacing gain cycle for ProbeBW, in percent. Each phase normally lasts for
/// roughly one min_rtt.
const PACING_GAIN_CYCLE: [u32; GAIN_CYCLE_LEN] = [125, 75, 100, 100, 100, 100, 100, 100];

/// Bandwidth growth factor below which a round counts as "no growth".
const FULL_PIPE_GROWTH: f64 = 1.25;

/// Rounds without bandwidth growth before the pipe is considered full.
const FULL_PIPE_ROUND_THRESHOLD: u32 = 3;

/// Sentinel for an unknown minimum RTT.
const MIN_RTT_UNSET: u32 = u32::MAX;

/// Fallback minimum RTT in microseconds until the first real sample arrives.
const FALLBACK_MIN_RTT_US: u32 = 10_000;

/// Fallback pacing rate in bytes per second before any bandwidth sample.
const FALLBACK_PACING_RATE: u64 = 1_000_000;

/// BBR configurable parameters.
#[derive(Debug)]
pub struct BbrConfig {
    /// Max number of retained bandwidth samples.
    bandwidth_window_len: usize,

    /// Max age of a retained bandwidth sample.
    bandwidth_window_age: Duration,

    /// Validity window of the minimum RTT; exceeding it triggers ProbeRTT.
    min_rtt_window: Duration,

    /// Minimum time spent in ProbeRTT at the reduced window.
    probe_rtt_duration: Duration,
}

impl BbrConfig {
    /// Update the minimum RTT validity window.
    pub fn set_min_rtt_window(&mut self, window: Duration) -> &mut Self {
        self.min_rtt_window = window;
        self
    }

    /// Update the ProbeRTT dwell time.
    pub fn set_probe_rtt_duration(&mut self, duration: Duration) -> &mut Self {
        self.probe_rtt_duration = duration;
        self
    }
}

impl Default for BbrConfig {
    fn default() -> Self {
        Self {
            bandwidth_window_len: 10,
            bandwidth_window_age: Duration::from_secs(60),
            min_rtt_window: Duration::from_secs(10),
            probe_rtt_duration: Duration::from_millis(200),
        }
    }
}

/// BBR state machine.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum BbrStateMachine {
    Startup,
    Drain,
    ProbeBW,
    ProbeRTT,
}

/// BBR congestion control algorithm.
#[derive(Debug)]
pub struct Bbr {
    /// Configurable parameters.
    config: BbrConfig,

    /// Monotonic clock handle.
    clock: Arc<dyn Clock>,

    /// Current state machine mode.
    mode: BbrStateMachine,

    /// Windowed bandwidth samples in bytes per second.
    bandwidth_filter: SampleWindow<u64>,

    /// Estimated bottleneck bandwidth in bytes per second, the windowed
    /// maximum of the sampled delivery rates.
    max_bandwidth: u64,

    /// Windowed maximum of the previous update, for plateau detection.
    prev_max_bandwidth: u64,

    /// Consecutive updates without much bandwidth growth during Startup.
    rounds_without_growth: u32,

    /// Minimum RTT observed within the validity window, in microseconds.
    min_rtt_us: u32,

    /// When the minimum RTT was last lowered or refreshed.
    min_rtt_ts: Instant,

    /// Current pacing rate in bytes per second.
    pacing_rate: u64,

    /// Dynamic pacing gain in percent.
    pacing_gain: u32,

    /// Dynamic congestion window gain in percent.
    cwnd_gain: u32,

    /// Current index into the ProbeBW gain cycle.
    cycle_index: usize,

    /// When the current gain cycle phase started.
    cycle_stamp: Instant,

    /// When the current ProbeRTT dwell started.
    probe_rtt_start: Instant,

    /// Total bytes delivered to the peer.
    delivered_bytes: u64,
}

impl Bbr {
    pub fn new(config: BbrConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: BbrConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let bandwidth_filter =
            SampleWindow::new(config.bandwidth_window_len, config.bandwidth_window_age);

        Self {
            config,
            clock,
            mode: BbrStateMachine::Startup,
            bandwidth_filter,
            max_bandwidth: 0,
            prev_max_bandwidth: 0,
            rounds_without_growth: 0,
            min_rtt_us: MIN_RTT_UNSET,
            min_rtt_ts: now,
            pacing_rate: FALLBACK_PACING_RATE,
            pacing_gain: HIGH_GAIN,
            cwnd_gain: CWND_GAIN,
            cycle_index: 0,
            cycle_stamp: now,
            probe_rtt_start: now,
            delivered_bytes: 0,
        }
    }

    fn enter_startup(&mut self) {
        self.mode = BbrStateMachine::Startup;
        self.pacing_gain = HIGH_GAIN;
        self.cwnd_gain = CWND_GAIN;
        self.rounds_without_growth = 0;
        self.prev_max_bandwidth = 0;
    }

    fn enter_drain(&mut self) {
        self.mode = BbrStateMachine::Drain;

        // Drain the Startup queue with the inverse of the Startup gain.
        self.pacing_gain = DRAIN_PACING_GAIN;
        self.cwnd_gain = CWND_GAIN;
    }

    fn enter_probe_bw(&mut self, now: Instant) {
        self.mode = BbrStateMachine::ProbeBW;
        self.pacing_gain = 100;
        self.cwnd_gain = CWND_GAIN;

        // Randomize the entry phase, from among all but the 3/4 phase, to
        // improve mixing between flows sharing a bottleneck.
        self.cycle_index =
            GAIN_CYCLE_LEN - 1 - rand::thread_rng().gen_range(0..GAIN_CYCLE_LEN - 1);
        self.advance_cycle_phase(now);
    }

    fn enter_probe_rtt(&mut self, now: Instant) {
        self.mode = BbrStateMachine::ProbeRTT;
        self.pacing_gain = 100;
        self.cwnd_gain = PROBE_RTT_CWND_GAIN;
        self.probe_rtt_start = now;
    }

    /// Minimum RTT in microseconds, with a safe fallback until the first
    /// real sample arrives.
    fn min_rtt(&self) -> u32 {
        if self.min_rtt_us != MIN_RTT_UNSET {
            self.min_rtt_us
        } else {
            FALLBACK_MIN_RTT_US
        }
    }

    fn is_full_pipe(&self) -> bool {
        self.rounds_without_growth >= FULL_PIPE_ROUND_THRESHOLD
    }

    /// Fold one delivery rate sample into the windowed maximum and track
    /// the Startup bandwidth plateau.
    fn update_bandwidth(&mut self, acked_bytes: u64, rtt: Duration) {
        if acked_bytes == 0 || rtt.is_zero() {
            return;
        }

        let now = self.clock.now();
        let bandwidth = acked_bytes * 1_000_000 / rtt.as_micros().max(1) as u64;
        self.bandwidth_filter.push(now, bandwidth);

        let new_max = self.bandwidth_filter.max().unwrap_or(0);

        if self.mode == BbrStateMachine::Startup {
            // The pipe is considered full once the estimate stops growing by
            // at least 25% per round for three rounds.
            if (new_max as f64) < self.prev_max_bandwidth as f64 * FULL_PIPE_GROWTH {
                self.rounds_without_growth += 1;
            } else {
                self.rounds_without_growth = 0;
            }
            self.prev_max_bandwidth = new_max;
        }

        self.max_bandwidth = new_max;
    }

    fn update_min_rtt(&mut self, rtt: Duration) {
        if rtt.is_zero() {
            return;
        }

        let rtt_us = rtt.as_micros().min(u32::MAX as u128) as u32;
        if rtt_us < self.min_rtt_us {
            self.min_rtt_us = rtt_us;
            self.min_rtt_ts = self.clock.now();
        }
    }

    /// Target congestion window for the given gain: the estimated BDP scaled
    /// by the gain, floored at four segments.
    fn target_cwnd(&self, gain_percent: u32, mss: u32, max_cwnd: u32) -> u32 {
        let floor = 4u64 * mss as u64;

        if self.max_bandwidth == 0 || self.min_rtt_us == MIN_RTT_UNSET {
            // No measurements yet.
            return cmp::min(floor, max_cwnd as u64) as u32;
        }

        let bdp = self.max_bandwidth * self.min_rtt_us as u64 / 1_000_000;
        let target = cmp::max(bdp * gain_percent as u64 / 100, floor);

        cmp::min(target, max_cwnd as u64) as u32
    }

    fn calc_pacing_rate(&self, gain_percent: u32) -> u64 {
        if self.max_bandwidth == 0 {
            return FALLBACK_PACING_RATE;
        }

        cmp::max(self.max_bandwidth * gain_percent as u64 / 100, 1000)
    }

    fn advance_cycle_phase(&mut self, now: Instant) {
        self.cycle_stamp = now;
        self.cycle_index = (self.cycle_index + 1) % GAIN_CYCLE_LEN;
        self.pacing_gain = PACING_GAIN_CYCLE[self.cycle_index];
    }

    /// Advance the ProbeBW gain cycle once the current phase has lasted for
    /// roughly one min_rtt.
    fn check_cycle_phase(&mut self, now: Instant) {
        let mut min_rtt_ms = self.min_rtt() / 1000;
        if min_rtt_ms == 0 {
            min_rtt_ms = 100;
        }

        if now.saturating_duration_since(self.cycle_stamp)
            >= Duration::from_millis(min_rtt_ms as u64)
        {
            self.advance_cycle_phase(now);
        }
    }

    fn is_min_rtt_stale(&self, now: Instant) -> bool {
        self.min_rtt_us != MIN_RTT_UNSET
            && now.saturating_duration_since(self.min_rtt_ts) >= self.config.min_rtt_window
    }

    /// Mode dispatch, run after the model update on every ACK.
    fn update_state_machine(&mut self, state: &SocketState, now: Instant) {
        match self.mode {
            BbrStateMachine::Startup => {
                if self.is_full_pipe() {
                    self.enter_drain();
                }
            }

            BbrStateMachine::Drain => {
                // The queue is drained once inflight fits the estimated BDP.
                if state.cwnd <= self.target_cwnd(100, state.mss, state.max_cwnd) {
                    self.enter_probe_bw(now);
                }
            }

            BbrStateMachine::ProbeBW => {
                self.check_cycle_phase(now);

                if self.is_min_rtt_stale(now) {
                    self.enter_probe_rtt(now);
                }
            }

            BbrStateMachine::ProbeRTT => {
                if now.saturating_duration_since(self.probe_rtt_start)
                    >= self.config.probe_rtt_duration
                {
                    self.min_rtt_ts = now;

                    if self.is_full_pipe() {
                        self.enter_probe_bw(now);
                    } else {
                        self.enter_startup();
                    }
                }
            }
        }
    }
}

impl CongestionControl for Bbr {
    fn name(&self) -> &str {
        "BBR"
    }

    fn algorithm(&self) -> CongestionControlAlgorithm {
        CongestionControlAlgorithm::Bbr
    }

    fn ssthresh(&mut self, _state: Option<&mut SocketState>, _bytes_in_flight: u32) -> u32 {
        // BBR does not use a slow start threshold.
        i32::MAX as u32
    }

    fn increase_window(&mut self, state: Option<&mut SocketState>, segments_acked: u32) {
        let state = match state {
            Some(state) => state,
            None => return,
        };
        if segments_acked == 0 {
            return;
        }

        let mut target = self.target_cwnd(self.cwnd_gain, state.mss, state.max_cwnd);

        // ProbeRTT holds the window well below the BDP so the queue drains
        // and a fresh propagation delay can be observed.
        if self.mode == BbrStateMachine::ProbeRTT {
            target = cmp::max(4 * state.mss, target / 2);
        }

        let mut cwnd = state.cwnd;
        if cwnd < target {
            cwnd = cmp::min(
                cwnd.saturating_add(segments_acked.saturating_mul(state.mss)),
                target,
            );
        } else {
            cwnd = target;
        }

        state.cwnd = cwnd.min(state.max_cwnd).max(4 * state.mss);
    }

    fn pkts_acked(&mut self, state: Option<&mut SocketState>, segments_acked: u32, rtt: Duration) {
        let state = match state {
            Some(state) => state,
            None => return,
        };
        if segments_acked == 0 {
            return;
        }

        update_rtt_and_rto(state, rtt);

        let acked_bytes = segments_acked as u64 * state.mss as u64;
        self.delivered_bytes = self.delivered_bytes.saturating_add(acked_bytes);

        let now = self.clock.now();

        self.update_bandwidth(acked_bytes, rtt);
        self.update_min_rtt(rtt);
        self.bandwidth_filter.evict_expired(now);

        self.pacing_rate = self.calc_pacing_rate(self.pacing_gain);

        self.update_state_machine(state, now);

        trace!(
            "{} ack: mode={:?} max_bw={} min_rtt={}us pacing={} gains=({},{}) delivered={}",
            self.name(),
            self.mode,
            self.max_bandwidth,
            self.min_rtt(),
            self.pacing_rate,
            self.pacing_gain,
            self.cwnd_gain,
            self.delivered_bytes
        );
    }

    fn congestion_state_set(&mut self, state: Option<&mut SocketState>, tcp_state: TcpState) {
        // BBR is insensitive to the coarse TCP states; just record them.
        if let Some(state) = state {
            state.tcp_state = tcp_state;
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
                // Loss is expected while probing for bandwidth; the model,
                // not the loss signal, drives the window.
            }

            CongestionEvent::Timeout => {
                state.cwnd = 4 * state.mss;
                self.enter_startup();

                trace!("{} timeout: cwnd={} restart startup", self.name(), state.cwnd);
            }

            CongestionEvent::Ecn => {
                // Recorded, but no aggressive reduction.
            }

            _ => (),
        }
    }

    fn pacing_rate(&self) -> Option<u64> {
        Some(self.pacing_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;

    fn socket_state() -> SocketState {
        SocketState {
            cwnd: 10 * 1460,
            max_cwnd: u32::MAX,
            ..SocketState::default()
        }
    }

    fn bbr_with_clock() -> (Bbr, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let bbr = Bbr::with_clock(BbrConfig::default(), clock.clone());
        (bbr, clock)
    }

    #[test]
    fn bbr_startup_to_drain() {
        let (mut bbr, _clock) = bbr_with_clock();
        let mut state = socket_state();
        let rtt = Duration::from_millis(100);

        // The first sample sets the plateau baseline.
        bbr.pkts_acked(Some(&mut state), 1, rtt);
        assert_eq!(bbr.mode, BbrStateMachine::Startup);
        assert_eq!(bbr.rounds_without_growth, 0);

        // Three flat rounds (growth < 1.25x) declare the pipe full; the
        // dispatch on the third one enters Drain.
        bbr.pkts_acked(Some(&mut state), 1, rtt);
        bbr.pkts_acked(Some(&mut state), 1, rtt);
        assert_eq!(bbr.mode, BbrStateMachine::Startup);

        bbr.pkts_acked(Some(&mut state), 1, rtt);
        assert_eq!(bbr.mode, BbrStateMachine::Drain);
        assert_eq!(bbr.pacing_gain, 100 * 100 / 289);
        assert_eq!(bbr.cwnd_gain, 200);
    }

    #[test]
    fn bbr_growing_bandwidth_stays_in_startup() {
        let (mut bbr, _clock) = bbr_with_clock();
        let mut state = socket_state();

        // Each ACK batch doubles the delivery rate, so the windowed max
        // keeps growing and the plateau counter never advances.
        let mut segments = 10;
        for _ in 0..8 {
            bbr.pkts_acked(Some(&mut state), segments, Duration::from_millis(100));
            segments *= 2;
        }

        assert_eq!(bbr.mode, BbrStateMachine::Startup);
        assert_eq!(bbr.rounds_without_growth, 0);
    }

    #[test]
    fn bbr_drain_to_probe_bw() {
        let (mut bbr, _clock) = bbr_with_clock();
        let mut state = socket_state();
        let rtt = Duration::from_millis(100);

        for _ in 0..4 {
            bbr.pkts_acked(Some(&mut state), 1, rtt);
        }
        assert_eq!(bbr.mode, BbrStateMachine::Drain);

        // Inflight still above the BDP target: stay in Drain.
        bbr.pkts_acked(Some(&mut state), 1, rtt);
        assert_eq!(bbr.mode, BbrStateMachine::Drain);

        // Once the window fits the BDP, ProbeBW begins with cwnd_gain 2x
        // and a gain cycle phase other than 3/4.
        state.cwnd = 4 * 1460;
        bbr.pkts_acked(Some(&mut state), 1, rtt);
        assert_eq!(bbr.mode, BbrStateMachine::ProbeBW);
        assert_eq!(bbr.cwnd_gain, 200);
        assert_ne!(bbr.cycle_index, 1);
        assert!(bbr.pacing_gain == 100 || bbr.pacing_gain == 125);
    }

    #[test]
    fn bbr_probe_bw_gain_cycle() {
        let (mut bbr, clock) = bbr_with_clock();
        let mut state = socket_state();

        bbr.mode = BbrStateMachine::ProbeBW;
        bbr.min_rtt_us = 100_000;
        bbr.min_rtt_ts = clock.now();
        bbr.cycle_index = 0;
        bbr.pacing_gain = PACING_GAIN_CYCLE[0];
        bbr.cycle_stamp = clock.now();

        // Short of one min_rtt: the phase holds.
        clock.advance(Duration::from_millis(50));
        bbr.pkts_acked(Some(&mut state), 1, Duration::from_millis(150));
        assert_eq!(bbr.cycle_index, 0);

        // A full min_rtt later the cycle advances to the 3/4 phase.
        clock.advance(Duration::from_millis(100));
        bbr.pkts_acked(Some(&mut state), 1, Duration::from_millis(150));
        assert_eq!(bbr.cycle_index, 1);
        assert_eq!(bbr.pacing_gain, 75);
    }

    #[test]
    fn bbr_probe_rtt_roundtrip() {
        let (mut bbr, clock) = bbr_with_clock();
        let mut state = socket_state();

        bbr.mode = BbrStateMachine::ProbeBW;
        bbr.min_rtt_us = 100_000;
        bbr.min_rtt_ts = clock.now();
        bbr.cycle_stamp = clock.now();
        bbr.rounds_without_growth = 3;

        // The min RTT has not been refreshed for the whole validity window.
        clock.advance(Duration::from_secs(10));
        bbr.pkts_acked(Some(&mut state), 1, Duration::from_millis(150));
        assert_eq!(bbr.mode, BbrStateMachine::ProbeRTT);
        assert_eq!(bbr.cwnd_gain, PROBE_RTT_CWND_GAIN);

        // The reduced window halves the target and floors at four segments.
        bbr.increase_window(Some(&mut state), 1);
        assert!(state.cwnd >= 4 * state.mss);

        // Dwell not yet over.
        clock.advance(Duration::from_millis(100));
        bbr.pkts_acked(Some(&mut state), 1, Duration::from_millis(150));
        assert_eq!(bbr.mode, BbrStateMachine::ProbeRTT);

        // After 200ms the min RTT stamp refreshes and, with a full pipe,
        // ProbeBW resumes.
        clock.advance(Duration::from_millis(100));
        bbr.pkts_acked(Some(&mut state), 1, Duration::from_millis(150));
        assert_eq!(bbr.mode, BbrStateMachine::ProbeBW);
        assert_eq!(bbr.min_rtt_ts, clock.now());
    }

    #[test]
    fn bbr_increase_window_moves_to_target() {
        let (mut bbr, _clock) = bbr_with_clock();
        let mut state = socket_state();

        // BDP = 1.46MB/s * 100ms = 146000 bytes; gain 2x -> 292000.
        bbr.max_bandwidth = 1_460_000;
        bbr.min_rtt_us = 100_000;
        bbr.mode = BbrStateMachine::ProbeBW;

        state.cwnd = 280_000;
        bbr.increase_window(Some(&mut state), 5);
        assert_eq!(state.cwnd, 287_300);

        // The climb never overshoots the target.
        bbr.increase_window(Some(&mut state), 5);
        assert_eq!(state.cwnd, 292_000);

        // Above the target the window snaps back down.
        state.cwnd = 400_000;
        bbr.increase_window(Some(&mut state), 1);
        assert_eq!(state.cwnd, 292_000);
    }

    #[test]
    fn bbr_target_cwnd_fallback() {
        let (bbr, _clock) = bbr_with_clock();

        // No measurements yet: four segments.
        assert_eq!(bbr.target_cwnd(200, 1460, u32::MAX), 4 * 1460);
    }

    #[test]
    fn bbr_timeout_restarts_startup() {
        let (mut bbr, _clock) = bbr_with_clock();
        let mut state = socket_state();

        bbr.mode = BbrStateMachine::ProbeBW;
        bbr.rounds_without_growth = 3;

        bbr.cwnd_event(Some(&mut state), CongestionEvent::Timeout);

        assert_eq!(state.cwnd, 4 * 1460);
        assert_eq!(bbr.mode, BbrStateMachine::Startup);
        assert_eq!(bbr.pacing_gain, HIGH_GAIN);
        assert_eq!(bbr.cwnd_gain, CWND_GAIN);
        assert_eq!(bbr.rounds_without_growth, 0);
    }

    #[test]
    fn bbr_loss_and_ecn_tolerated() {
        let (mut bbr, _clock) = bbr_with_clock();
        let mut state = socket_state();
        let cwnd = state.cwnd;

        bbr.cwnd_event(Some(&mut state), CongestionEvent::PacketLoss);
        assert_eq!(state.cwnd, cwnd);
        assert_eq!(bbr.mode, BbrStateMachine::Startup);

        bbr.cwnd_event(Some(&mut state), CongestionEvent::Ecn);
        assert_eq!(state.cwnd, cwnd);
        assert_eq!(state.congestion_event, CongestionEvent::Ecn);
    }

    #[test]
    fn bbr_pacing_rate() {
        let (mut bbr, _clock) = bbr_with_clock();
        let mut state = socket_state();

        // Fallback before any bandwidth sample.
        assert_eq!(bbr.pacing_rate(), Some(FALLBACK_PACING_RATE));

        // One segment per 100ms -> 14600 B/s, scaled by the Startup gain.
        bbr.pkts_acked(Some(&mut state), 1, Duration::from_millis(100));
        assert_eq!(bbr.pacing_rate(), Some(14_600 * 289 / 100));
    }

    #[test]
    fn bbr_ssthresh_unused() {
        let (mut bbr, _clock) = bbr_with_clock();
        let mut state = socket_state();

        assert_eq!(bbr.ssthresh(Some(&mut state), 0), i32::MAX as u32);
        assert_eq!(state.ssthresh, crate::INITIAL_SSTHRESH);
    }

    #[test]
    fn bbr_bandwidth_samples_age_out() {
        let (mut bbr, clock) = bbr_with_clock();
        let mut state = socket_state();

        bbr.pkts_acked(Some(&mut state), 10, Duration::from_millis(100));
        assert!(bbr.bandwidth_filter.len() == 1);

        // Samples older than a minute are dropped on the next ACK.
        clock.advance(Duration::from_secs(61));
        bbr.pkts_acked(Some(&mut state), 1, Duration::from_millis(100));
        assert!(bbr.bandwidth_filter.len() == 1);
    }
}
