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

//! Copa: practical delay-based congestion control.
//!
//! Copa steers the sending rate towards a target rate derived from the
//! measured queueing delay (standing RTT minus the base RTT), using a
//! velocity term that accelerates while the rate keeps moving in the same
//! direction and resets when it flips.
//!
//! See <https://web.mit.edu/copa/>.

use std::cmp;
use std::sync::Arc;
use std::time::Duration;

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

/// Delta: the target queueing delay as a fraction of the RTT. Determines
/// how much to weigh delay compared to throughput.
pub const COPA_DELTA: f64 = 0.5;

/// Gain applied to each velocity adjustment.
const VELOCITY_GAIN: f64 = 1.0;

/// Queueing delay (in microseconds) above which slow start ends.
const SLOW_START_EXIT_DELAY_US: u32 = 1000;

/// Max number of retained RTT samples.
const RTT_WINDOW_LEN: usize = 100;

/// Max age of a retained RTT sample.
const RTT_WINDOW_AGE: Duration = Duration::from_secs(10);

/// Sentinel for an unknown minimum RTT.
const MIN_RTT_UNSET: u32 = u32::MAX;

/// Fallback minimum RTT in microseconds until the first real sample arrives.
const FALLBACK_MIN_RTT_US: u32 = 10_000;

/// Copa configurable parameters.
#[derive(Debug)]
pub struct CopaConfig {
    /// Delta, the delay-throughput trade-off knob. A larger delta signifies
    /// that lower packet delays are preferable.
    delta: f64,

    /// Velocity adjustment gain.
    velocity_gain: f64,

    /// Slow start exit threshold in microseconds of queueing delay.
    slow_start_exit_delay_us: u32,

    /// Steer into competitive mode for paths shared with buffer-filling
    /// flows. The update law is identical; only the steady mode label
    /// changes.
    competitive: bool,
}

impl CopaConfig {
    /// Update delta.
    pub fn set_delta(&mut self, delta: f64) -> &mut Self {
        self.delta = delta;
        self
    }

    /// Select competitive mode as the steady state.
    pub fn set_competitive(&mut self, competitive: bool) -> &mut Self {
        self.competitive = competitive;
        self
    }
}

impl Default for CopaConfig {
    fn default() -> Self {
        Self {
            delta: COPA_DELTA,
            velocity_gain: VELOCITY_GAIN,
            slow_start_exit_delay_us: SLOW_START_EXIT_DELAY_US,
            competitive: false,
        }
    }
}

/// Copa operating modes.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum CopaMode {
    /// Exponential growth until queueing is observed.
    SlowStart,

    /// Default steady state: velocity-driven rate control.
    Velocity,

    /// Steady state when competing with buffer-filling flows.
    Competitive,
}

/// Copa congestion control algorithm.
#[derive(Debug)]
pub struct Copa {
    /// Configurable parameters.
    config: CopaConfig,

    /// Monotonic clock handle.
    clock: Arc<dyn Clock>,

    /// Current operating mode.
    mode: CopaMode,

    /// Last installed slow start threshold in bytes.
    ssthresh: u32,

    /// Windowed RTT samples in microseconds.
    rtt_filter: SampleWindow<u32>,

    /// Base RTT: the smallest sample observed, in microseconds.
    min_rtt_us: u32,

    /// Standing RTT: the mean of the live sample window, in microseconds.
    standing_rtt_us: u32,

    /// Velocity term, clamped to [-1, 1].
    velocity: f64,

    /// Direction of the previous velocity update.
    prev_direction: i32,

    /// Target sending rate in bytes per second.
    target_rate: u64,
}

impl Copa {
    pub fn new(config: CopaConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CopaConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            mode: CopaMode::SlowStart,
            ssthresh: crate::INITIAL_SSTHRESH,
            rtt_filter: SampleWindow::new(RTT_WINDOW_LEN, RTT_WINDOW_AGE),
            min_rtt_us: MIN_RTT_UNSET,
            standing_rtt_us: 0,
            velocity: 0.0,
            prev_direction: 0,
            target_rate: 0,
        }
    }

    /// The steady mode this flow settles into after slow start.
    fn steady_mode(&self) -> CopaMode {
        if self.config.competitive {
            CopaMode::Competitive
        } else {
            CopaMode::Velocity
        }
    }

    fn enter_slow_start(&mut self) {
        self.mode = CopaMode::SlowStart;
        self.velocity = 0.0;
        self.prev_direction = 0;
    }

    fn enter_steady_mode(&mut self) {
        self.mode = self.steady_mode();
        self.velocity = 0.0;
    }

    /// Base RTT in microseconds, with a safe fallback until the first real
    /// sample arrives.
    fn min_rtt(&self) -> u32 {
        if self.min_rtt_us != MIN_RTT_UNSET {
            self.min_rtt_us
        } else {
            FALLBACK_MIN_RTT_US
        }
    }

    /// Standing queueing delay in microseconds.
    fn queueing_delay_us(&self) -> u32 {
        if self.min_rtt_us == MIN_RTT_UNSET || self.standing_rtt_us == 0 {
            return 0;
        }

        self.standing_rtt_us.saturating_sub(self.min_rtt_us)
    }

    /// Queueing delay as a fraction of the base RTT.
    fn queueing_delay_fraction(&self) -> f64 {
        self.queueing_delay_us() as f64 / self.min_rtt().max(1) as f64
    }

    /// Fold one RTT sample into the window and refresh the base and
    /// standing estimates.
    fn update_rtt_samples(&mut self, rtt: Duration) {
        if rtt.is_zero() {
            return;
        }

        let now = self.clock.now();
        let rtt_us = rtt.as_micros().min(u32::MAX as u128) as u32;

        self.rtt_filter.push(now, rtt_us);
        self.rtt_filter.evict_expired(now);

        if rtt_us < self.min_rtt_us {
            self.min_rtt_us = rtt_us;
        }

        self.standing_rtt_us = self.rtt_filter.mean().unwrap_or(0) as u32;
    }

    /// Velocity update: accelerate while the queueing delay keeps the rate
    /// moving in one direction, reset on a flip.
    fn update_velocity(&mut self) {
        let fraction = self.queueing_delay_fraction();

        let direction = if fraction < self.config.delta {
            1
        } else if fraction > self.config.delta {
            -1
        } else {
            0
        };

        let update = if direction != self.prev_direction && self.prev_direction != 0 {
            self.config.delta * direction as f64
        } else if direction != 0 {
            0.5 * self.config.delta * direction as f64
        } else {
            0.0
        };

        self.velocity =
            (self.velocity + update * self.config.velocity_gain).clamp(-1.0, 1.0);
        self.prev_direction = direction;
    }

    /// Target rate: the current rate scaled by the velocity term.
    fn update_target_rate(&mut self, cwnd: u32) {
        if self.min_rtt_us == MIN_RTT_UNSET || self.min_rtt_us == 0 {
            self.target_rate = cwnd as u64 * 1000;
            return;
        }

        let current_rate = cwnd as f64 * 1_000_000.0 / self.min_rtt_us as f64;
        let target = current_rate * (1.0 + self.velocity * self.config.delta);

        self.target_rate = target.max(1000.0) as u64;
    }

    /// Move the window one segment towards the rate-derived target.
    fn update_cwnd_from_rate(&self, state: &mut SocketState) {
        if self.target_rate == 0 || self.min_rtt_us == MIN_RTT_UNSET {
            return;
        }

        let target_cwnd = self.target_rate * self.min_rtt_us as u64 / 1_000_000;
        let target_cwnd = target_cwnd.min(u32::MAX as u64) as u32;

        if target_cwnd > state.cwnd {
            state.cwnd = cmp::min(target_cwnd, state.cwnd.saturating_add(state.mss));
        } else if target_cwnd < state.cwnd {
            state.cwnd = cmp::max(target_cwnd, state.cwnd.saturating_sub(state.mss));
        }
    }

    fn should_exit_slow_start(&self) -> bool {
        self.queueing_delay_us() > self.config.slow_start_exit_delay_us
    }

    /// Install the Copa reduction on the state and remember it.
    fn reduce(&mut self, state: &mut SocketState) -> u32 {
        self.ssthresh = cmp::max(
            (state.cwnd as f64 * (1.0 - self.config.delta / 2.0)) as u32,
            2 * state.mss,
        );
        state.ssthresh = self.ssthresh;
        self.ssthresh
    }
}

impl CongestionControl for Copa {
    fn name(&self) -> &str {
        "COPA"
    }

    fn algorithm(&self) -> CongestionControlAlgorithm {
        CongestionControlAlgorithm::Copa
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

        if self.mode == CopaMode::SlowStart {
            state.cwnd = state
                .cwnd
                .saturating_add(segments_acked.saturating_mul(state.mss));

            if self.should_exit_slow_start() {
                self.enter_steady_mode();
            }
        } else {
            self.update_cwnd_from_rate(state);
        }

        state.cwnd = state.cwnd.min(state.max_cwnd).max(2 * state.mss);
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
        self.update_rtt_samples(rtt);

        if self.mode == CopaMode::SlowStart && self.should_exit_slow_start() {
            self.enter_steady_mode();
        }

        if self.mode != CopaMode::SlowStart {
            self.update_velocity();
            self.update_target_rate(state.cwnd);
        }

        trace!(
            "{} ack: mode={:?} min_rtt={}us standing={}us qdf={:.3} v={:.3} target_rate={}",
            self.name(),
            self.mode,
            self.min_rtt(),
            self.standing_rtt_us,
            self.queueing_delay_fraction(),
            self.velocity,
            self.target_rate
        );
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
                state.cwnd = cmp::max(
                    (state.cwnd as f64 * (1.0 - self.config.delta / 2.0)) as u32,
                    4 * state.mss,
                );
                self.velocity = 0.0;
                self.prev_direction = 0;
            }

            CongestionEvent::Timeout => {
                state.cwnd = 4 * state.mss;
                state.tcp_state = TcpState::Loss;
                self.enter_slow_start();
            }

            CongestionEvent::Ecn => {
                state.cwnd = cmp::max(
                    (state.cwnd as f64 * (1.0 - self.config.delta / 2.0)) as u32,
                    4 * state.mss,
                );
                state.tcp_state = TcpState::Cwr;
                self.velocity = 0.0;
                self.prev_direction = 0;
            }

            CongestionEvent::FastRecovery => {
                state.tcp_state = TcpState::Recovery;
            }

            _ => (),
        }
    }

    fn pacing_rate(&self) -> Option<u64> {
        Some(self.target_rate)
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

    fn copa_with_clock() -> (Copa, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let copa = Copa::with_clock(CopaConfig::default(), clock.clone());
        (copa, clock)
    }

    #[test]
    fn copa_slow_start_growth() {
        let (mut copa, _clock) = copa_with_clock();
        let mut state = socket_state();

        copa.pkts_acked(Some(&mut state), 1, Duration::from_millis(100));
        assert_eq!(copa.mode, CopaMode::SlowStart);

        copa.increase_window(Some(&mut state), 4);
        assert_eq!(state.cwnd, 14 * 1460);
    }

    #[test]
    fn copa_slow_start_exit_on_queueing() {
        let (mut copa, _clock) = copa_with_clock();
        let mut state = socket_state();

        // Flat RTT: no queueing delay, slow start continues.
        copa.pkts_acked(Some(&mut state), 1, Duration::from_millis(100));
        assert_eq!(copa.mode, CopaMode::SlowStart);

        // The mean climbs 1.5ms above the base RTT: queueing detected.
        copa.pkts_acked(Some(&mut state), 1, Duration::from_millis(103));
        assert_eq!(copa.queueing_delay_us(), 1500);
        assert_eq!(copa.mode, CopaMode::Velocity);
    }

    #[test]
    fn copa_competitive_steady_mode() {
        let clock = Arc::new(ManualClock::new());
        let mut config = CopaConfig::default();
        config.set_competitive(true);
        let mut copa = Copa::with_clock(config, clock);
        let mut state = socket_state();

        copa.pkts_acked(Some(&mut state), 1, Duration::from_millis(100));
        copa.pkts_acked(Some(&mut state), 1, Duration::from_millis(103));
        assert_eq!(copa.mode, CopaMode::Competitive);
    }

    #[test]
    fn copa_velocity_direction_changes() {
        let (mut copa, _clock) = copa_with_clock();

        copa.min_rtt_us = 100_000;

        // Queueing delay fraction 0.2 < delta: push the rate up.
        copa.standing_rtt_us = 120_000;
        copa.update_velocity();
        assert_eq!(copa.velocity, 0.25);
        assert_eq!(copa.prev_direction, 1);

        // Same direction again: keep accelerating.
        copa.update_velocity();
        assert_eq!(copa.velocity, 0.5);

        // Fraction 0.8 > delta: the direction flips with a full step.
        copa.standing_rtt_us = 180_000;
        copa.update_velocity();
        assert_eq!(copa.velocity, 0.0);
        assert_eq!(copa.prev_direction, -1);
    }

    #[test]
    fn copa_velocity_clamped() {
        let (mut copa, _clock) = copa_with_clock();

        copa.min_rtt_us = 100_000;
        copa.standing_rtt_us = 100_000;

        for _ in 0..16 {
            copa.update_velocity();
        }
        assert!(copa.velocity <= 1.0);

        copa.standing_rtt_us = 500_000;
        for _ in 0..16 {
            copa.update_velocity();
        }
        assert!(copa.velocity >= -1.0);
    }

    #[test]
    fn copa_velocity_steady_at_target_delay() {
        let (mut copa, _clock) = copa_with_clock();

        // Queueing delay fraction exactly delta: no direction, velocity
        // holds and the window stabilises.
        copa.min_rtt_us = 100_000;
        copa.standing_rtt_us = 150_000;
        copa.velocity = 0.0;
        copa.prev_direction = 0;

        copa.update_velocity();
        assert_eq!(copa.velocity, 0.0);
        assert_eq!(copa.prev_direction, 0);
    }

    #[test]
    fn copa_target_rate() {
        let (mut copa, _clock) = copa_with_clock();

        copa.min_rtt_us = 100_000;

        // v = 0: the target is the current rate, cwnd/min_rtt.
        copa.velocity = 0.0;
        copa.update_target_rate(100_000);
        assert_eq!(copa.target_rate, 1_000_000);
        assert_eq!(copa.pacing_rate(), Some(1_000_000));

        // v = 0.5 with delta 0.5: a 25% push upward.
        copa.velocity = 0.5;
        copa.update_target_rate(100_000);
        assert_eq!(copa.target_rate, 1_250_000);
    }

    #[test]
    fn copa_cwnd_steps_towards_target() {
        let (mut copa, _clock) = copa_with_clock();
        let mut state = socket_state();
        state.cwnd = 100_000;

        copa.mode = CopaMode::Velocity;
        copa.min_rtt_us = 100_000;
        copa.target_rate = 1_250_000;

        // Target cwnd 125000, but only one segment per call.
        copa.increase_window(Some(&mut state), 1);
        assert_eq!(state.cwnd, 101_460);

        // Downward the stepping mirrors.
        copa.target_rate = 500_000;
        copa.increase_window(Some(&mut state), 1);
        assert_eq!(state.cwnd, 100_000);
    }

    #[test]
    fn copa_loss_reduction() {
        let (mut copa, _clock) = copa_with_clock();
        let mut state = socket_state();
        state.cwnd = 20 * 1460;
        copa.velocity = 0.7;
        copa.prev_direction = 1;

        copa.cwnd_event(Some(&mut state), CongestionEvent::PacketLoss);

        // cwnd * (1 - delta/2) = 0.75x.
        assert_eq!(state.cwnd, (20.0 * 1460.0 * 0.75) as u32);
        assert_eq!(copa.velocity, 0.0);
        assert_eq!(copa.prev_direction, 0);
    }

    #[test]
    fn copa_loss_floor() {
        let (mut copa, _clock) = copa_with_clock();
        let mut state = socket_state();
        state.cwnd = 4 * 1460;

        copa.cwnd_event(Some(&mut state), CongestionEvent::PacketLoss);
        assert_eq!(state.cwnd, 4 * 1460);
    }

    #[test]
    fn copa_timeout() {
        let (mut copa, _clock) = copa_with_clock();
        let mut state = socket_state();
        copa.mode = CopaMode::Velocity;
        copa.velocity = 0.3;

        copa.cwnd_event(Some(&mut state), CongestionEvent::Timeout);

        assert_eq!(state.cwnd, 4 * 1460);
        assert_eq!(state.tcp_state, TcpState::Loss);
        assert_eq!(copa.mode, CopaMode::SlowStart);
        assert_eq!(copa.velocity, 0.0);
    }

    #[test]
    fn copa_ssthresh() {
        let (mut copa, _clock) = copa_with_clock();
        let mut state = socket_state();
        state.cwnd = 20 * 1460;

        let ssthresh = copa.ssthresh(Some(&mut state), 0);
        assert_eq!(ssthresh, (20.0 * 1460.0 * 0.75) as u32);
        assert_eq!(copa.ssthresh(None, 0), ssthresh);
    }

    #[test]
    fn copa_rtt_samples_age_out() {
        let (mut copa, clock) = copa_with_clock();
        let mut state = socket_state();

        copa.pkts_acked(Some(&mut state), 1, Duration::from_millis(100));
        assert_eq!(copa.rtt_filter.len(), 1);

        // Past the 10s window the old sample is gone and the standing RTT
        // follows only the fresh one.
        clock.advance(Duration::from_secs(11));
        copa.pkts_acked(Some(&mut state), 1, Duration::from_millis(200));
        assert_eq!(copa.rtt_filter.len(), 1);
        assert_eq!(copa.standing_rtt_us, 200_000);
    }
}
