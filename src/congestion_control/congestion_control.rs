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

use core::str::FromStr;
use std::fmt;
use std::time::Duration;

use strum_macros::EnumIter;

use crate::CongestionEvent;
use crate::Error;
use crate::Result;
use crate::RttSample;
use crate::SocketState;
use crate::TcpState;
pub use bbr::Bbr;
pub use bbr::BbrConfig;
pub use bic::Bic;
pub use bic::BicConfig;
pub use copa::Copa;
pub use copa::CopaConfig;
pub use copa::COPA_DELTA;
pub use cubic::Cubic;
pub use cubic::CubicConfig;
pub use dctcp::Dctcp;
pub use dctcp::DctcpConfig;
pub use reno::Reno;
pub use vegas::Vegas;
pub use vegas::VegasConfig;

/// Available congestion control algorithms.
///
/// The discriminants are a stable ABI surface exposed through
/// [`CongestionControl::type_id`]; they are fixed once and never renumbered.
#[repr(u64)]
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, EnumIter)]
pub enum CongestionControlAlgorithm {
    /// Reno is the classic loss-based AIMD algorithm: exponential slow
    /// start, linear congestion avoidance, and multiplicative decrease on
    /// loss.
    #[default]
    Reno = 0,

    /// BIC probes for the last known saturation point with a binary search
    /// over the window, combining fast additive growth far from the target
    /// with careful convergence near it.
    Bic = 1,

    /// CUBIC uses a cubic function instead of a linear window increase
    /// function of the current TCP standards to improve scalability and
    /// stability under fast and long-distance networks.
    Cubic = 2,

    /// BBR uses recent measurements of a transport connection's delivery
    /// rate and round-trip time to build an explicit model of the network
    /// path. The model is then used to control data transmission speed and
    /// the maximum volume of data allowed in flight in the network at any
    /// time.
    Bbr = 3,

    /// COPA is a tunable delay-based congestion control algorithm. COPA is
    /// based on an objective function where the trade-off between throughput
    /// and delay can be configured via a user-specified parameter.
    Copa = 4,

    /// DCTCP scales the window reduction with the fraction of ECN-marked
    /// bytes per window, keeping datacenter queues short without giving up
    /// throughput.
    Dctcp = 5,

    /// Vegas compares the measured RTT against a base (propagation) RTT and
    /// adjusts the window to keep a small, fixed number of segments queued
    /// in the network.
    Vegas = 6,
}

impl FromStr for CongestionControlAlgorithm {
    type Err = Error;

    fn from_str(algor: &str) -> Result<CongestionControlAlgorithm> {
        if algor.eq_ignore_ascii_case("reno") {
            Ok(CongestionControlAlgorithm::Reno)
        } else if algor.eq_ignore_ascii_case("bic") {
            Ok(CongestionControlAlgorithm::Bic)
        } else if algor.eq_ignore_ascii_case("cubic") {
            Ok(CongestionControlAlgorithm::Cubic)
        } else if algor.eq_ignore_ascii_case("bbr") {
            Ok(CongestionControlAlgorithm::Bbr)
        } else if algor.eq_ignore_ascii_case("copa") {
            Ok(CongestionControlAlgorithm::Copa)
        } else if algor.eq_ignore_ascii_case("dctcp") {
            Ok(CongestionControlAlgorithm::Dctcp)
        } else if algor.eq_ignore_ascii_case("vegas") {
            Ok(CongestionControlAlgorithm::Vegas)
        } else {
            Err(Error::InvalidConfig("unknown".into()))
        }
    }
}

/// Congestion control interfaces shared by different algorithms.
///
/// The stack invokes the controller synchronously from exactly one context
/// at a time for a given [`SocketState`]. Every method is a no-op when the
/// state is absent, and a zero `segments_acked` never mutates the window.
pub trait CongestionControl {
    /// Name of congestion control algorithm.
    fn name(&self) -> &str;

    /// The algorithm implemented by this controller.
    fn algorithm(&self) -> CongestionControlAlgorithm;

    /// Stable integer tag of the algorithm.
    fn type_id(&self) -> u64 {
        self.algorithm() as u64
    }

    /// Recompute and install a new slow start threshold on the state.
    ///
    /// Returns the installed value, or the last known one when the state is
    /// absent.
    fn ssthresh(&mut self, state: Option<&mut SocketState>, bytes_in_flight: u32) -> u32;

    /// Update the congestion window for a positive ACK batch.
    fn increase_window(&mut self, state: Option<&mut SocketState>, segments_acked: u32);

    /// Ingest an ACK batch together with its RTT sample. Updates the
    /// controller's estimators as well as `rtt_us`/`rtt_var_us`/`rto_us` on
    /// the state.
    fn pkts_acked(&mut self, state: Option<&mut SocketState>, segments_acked: u32, rtt: Duration);

    /// Ingest an ACK batch of which `ecn_segments` carried an ECE mark.
    ///
    /// Only DCTCP consumes the mark count; the default implementation
    /// forwards to [`pkts_acked`](Self::pkts_acked).
    fn pkts_acked_ecn(
        &mut self,
        state: Option<&mut SocketState>,
        segments_acked: u32,
        _ecn_segments: u32,
        rtt: Duration,
    ) {
        self.pkts_acked(state, segments_acked, rtt);
    }

    /// The stack declares a TCP state transition; the controller may cascade
    /// further window adjustments.
    fn congestion_state_set(&mut self, state: Option<&mut SocketState>, tcp_state: TcpState);

    /// The stack reports a categorised congestion event.
    fn cwnd_event(&mut self, state: Option<&mut SocketState>, event: CongestionEvent);

    /// Convenience combinator: handle the event, then ingest the RTT sample
    /// as a single-segment ACK when it is non-zero.
    fn cong_control(
        &mut self,
        mut state: Option<&mut SocketState>,
        event: CongestionEvent,
        rtt: RttSample,
    ) {
        self.cwnd_event(state.as_deref_mut(), event);

        if !rtt.rtt.is_zero() {
            self.pkts_acked(state, 1, rtt.rtt);
        }
    }

    /// Check if the controller drives the window itself.
    fn has_cong_control(&self) -> bool {
        true
    }

    /// Current pacing rate estimated by the algorithm, in bytes per second.
    /// Algorithms that only drive the window return None.
    fn pacing_rate(&self) -> Option<u64> {
        None
    }
}

impl fmt::Debug for dyn CongestionControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "congestion controller.")
    }
}

/// Build a congestion controller with default per-algorithm configuration.
pub fn build_congestion_control(algor: CongestionControlAlgorithm) -> Box<dyn CongestionControl> {
    match algor {
        CongestionControlAlgorithm::Reno => Box::new(Reno::new()),
        CongestionControlAlgorithm::Bic => Box::new(Bic::new(BicConfig::default())),
        CongestionControlAlgorithm::Cubic => Box::new(Cubic::new(CubicConfig::default())),
        CongestionControlAlgorithm::Bbr => Box::new(Bbr::new(BbrConfig::default())),
        CongestionControlAlgorithm::Copa => Box::new(Copa::new(CopaConfig::default())),
        CongestionControlAlgorithm::Dctcp => Box::new(Dctcp::new(DctcpConfig::default())),
        CongestionControlAlgorithm::Vegas => Box::new(Vegas::new(VegasConfig::default())),
    }
}

/// Fold an RTT sample into the socket's smoothed estimate.
///
/// A zero sample leaves the state untouched. `rtt_var` seeds at `rtt/2` and
/// then follows `(3*rtt_var + rtt) / 4`; `rto` is `rtt + 4*rtt_var`.
pub(crate) fn update_rtt_and_rto(state: &mut SocketState, rtt: Duration) {
    if rtt.is_zero() {
        return;
    }

    let rtt_us = rtt.as_micros().min(u32::MAX as u128) as u32;

    state.rtt_us = rtt_us;
    state.rtt_var_us = if state.rtt_var_us == 0 {
        rtt_us / 2
    } else {
        ((3 * state.rtt_var_us as u64 + rtt_us as u64) / 4) as u32
    };
    state.rto_us = state.rtt_us.saturating_add(state.rtt_var_us.saturating_mul(4));
}


mod bbr;
mod bic;
mod copa;
mod cubic;
mod dctcp;
mod reno;
mod sample_window;
mod vegas;
