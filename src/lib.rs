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

//! A pluggable TCP congestion control library.
//!
//! The crate implements a family of congestion control algorithms — Reno,
//! BIC, CUBIC, BBR, Copa, DCTCP and Vegas — behind one event-driven
//! interface. Each controller observes per-connection transport events
//! (acknowledgements, losses, timeouts, ECN marks, RTT samples) and decides
//! how the sender's congestion window, and for the rate-based variants the
//! pacing rate, should evolve.
//!
//! The TCP stack itself stays outside: packet framing, retransmissions, ACK
//! parsing and the pacing timer belong to the caller. The stack delivers
//! events through the [`CongestionControl`] interface and reads the results
//! (`cwnd`, `ssthresh`, `rto_us`, pacing rate) from the shared
//! [`SocketState`] block, which is exclusively owned by one connection and
//! paired 1:1 with one controller instance.
//!
//! ```
//! use std::time::Duration;
//! use tcp_cc::{build_congestion_control, CongestionControlAlgorithm, SocketState};
//!
//! let mut cc = build_congestion_control(CongestionControlAlgorithm::Cubic);
//! let mut state = SocketState::default();
//!
//! cc.pkts_acked(Some(&mut state), 10, Duration::from_millis(30));
//! cc.increase_window(Some(&mut state), 10);
//!
//! assert!(state.cwnd > 0);
//! assert_eq!(state.rto_us, state.rtt_us + 4 * state.rtt_var_us);
//! ```
//!
//! Controllers never block, own no timers and spawn no threads; time only
//! advances when the stack calls in, and all age-based windowing reads one
//! injected monotonic [`Clock`].

use std::time::Duration;

/// Initial slow start threshold, effectively no limit.
pub const INITIAL_SSTHRESH: u32 = 0x7fff_ffff;

/// Default maximum segment size in bytes.
pub const DEFAULT_MSS: u32 = 1460;

/// Default hard ceiling for the congestion window in bytes.
pub const DEFAULT_MAX_CWND: u32 = 65535;

/// Default initial congestion window of ten segments.
/// See RFC 6928.
const INITIAL_WINDOW_SEGMENTS: u32 = 10;

/// A specialized Result type for congestion control operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse TCP sender states as seen by the controller.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    /// Normal operation, nothing outstanding.
    #[default]
    Open,

    /// Reordering observed, e.g. duplicate ACKs or SACKs.
    Disorder,

    /// Window reduced in response to an ECN mark.
    Cwr,

    /// Fast retransmit is repairing a loss.
    Recovery,

    /// A retransmission timeout fired.
    Loss,
}

/// Congestion events reported by the stack.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CongestionEvent {
    /// Entered slow start.
    #[default]
    SlowStart,

    /// Entered congestion avoidance.
    CongestionAvoidance,

    /// Entered fast recovery.
    FastRecovery,

    /// A retransmission timeout fired.
    Timeout,

    /// An ECN congestion mark arrived.
    Ecn,

    /// Packet loss was detected.
    PacketLoss,

    /// Packet reordering was detected.
    Reordering,
}

/// One RTT measurement handed to [`CongestionControl::cong_control`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RttSample {
    /// The measured round trip time; zero means no sample.
    pub rtt: Duration,
}

impl RttSample {
    pub fn new(rtt: Duration) -> Self {
        Self { rtt }
    }
}

/// The per-connection handoff record between the TCP stack and a
/// congestion controller.
///
/// The stack writes the inputs (`mss`, initial `cwnd`/`ssthresh`, state
/// transitions); the controller maintains `cwnd`, `ssthresh`, `rtt_us`,
/// `rtt_var_us` and `rto_us`. Each connection exclusively owns one of
/// these, paired with exactly one controller instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketState {
    /// Coarse sender state.
    pub tcp_state: TcpState,

    /// Last congestion event seen.
    pub congestion_event: CongestionEvent,

    /// Congestion window in bytes.
    pub cwnd: u32,

    /// Slow start threshold in bytes.
    pub ssthresh: u32,

    /// Hard ceiling for the congestion window in bytes.
    pub max_cwnd: u32,

    /// Maximum segment size in bytes.
    pub mss: u32,

    /// Smoothed RTT in microseconds, from the last sample.
    pub rtt_us: u32,

    /// RTT variance in microseconds.
    pub rtt_var_us: u32,

    /// Retransmission timeout in microseconds.
    pub rto_us: u32,
}

impl Default for SocketState {
    fn default() -> Self {
        Self {
            tcp_state: TcpState::Open,
            congestion_event: CongestionEvent::SlowStart,
            cwnd: INITIAL_WINDOW_SEGMENTS * DEFAULT_MSS,
            ssthresh: INITIAL_SSTHRESH,
            max_cwnd: DEFAULT_MAX_CWND,
            mss: DEFAULT_MSS,
            rtt_us: 0,
            rtt_var_us: 0,
            rto_us: 0,
        }
    }
}

impl SocketState {
    /// A state block for a connection with the given segment size and
    /// window ceiling.
    pub fn new(mss: u32, max_cwnd: u32) -> Self {
        Self {
            cwnd: INITIAL_WINDOW_SEGMENTS.saturating_mul(mss),
            max_cwnd,
            mss,
            ..Self::default()
        }
    }
}


mod clock;
#[path = "congestion_control/congestion_control.rs"]
mod congestion_control;
pub mod error;

pub use crate::clock::Clock;
pub use crate::clock::SystemClock;
pub use crate::congestion_control::build_congestion_control;
pub use crate::congestion_control::Bbr;
pub use crate::congestion_control::BbrConfig;
pub use crate::congestion_control::Bic;
pub use crate::congestion_control::BicConfig;
pub use crate::congestion_control::CongestionControl;
pub use crate::congestion_control::CongestionControlAlgorithm;
pub use crate::congestion_control::Copa;
pub use crate::congestion_control::CopaConfig;
pub use crate::congestion_control::Cubic;
pub use crate::congestion_control::CubicConfig;
pub use crate::congestion_control::Dctcp;
pub use crate::congestion_control::DctcpConfig;
pub use crate::congestion_control::Reno;
pub use crate::congestion_control::Vegas;
pub use crate::congestion_control::VegasConfig;
pub use crate::congestion_control::COPA_DELTA;
pub use crate::error::Error;
