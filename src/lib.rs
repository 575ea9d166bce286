//! Bidirectional, fixed-shape, CRC-protected UDP transport used for live
//! teleoperation and orientation mirroring between a miniature excavator and
//! its motion platform.
//!
//! The transport is point-to-point, single-shape and best-effort: no
//! retransmission, ordering, fragmentation, encryption or NAT traversal. A
//! session negotiates its shape with a one-round-trip handshake, then runs a
//! dedicated receive thread and (for endpoints that expect data) a heartbeat
//! watchdog that reports self-termination on a loopback TCP back-channel.

mod backchannel;
mod codec;
mod crc;
mod error;
mod handshake;
mod options;
mod receive;
mod session;
mod socket;
mod stats;
mod watchdog;

pub use codec::TypeTag;
pub use error::{Error, Result};
pub use options::SessionOptions;
pub use session::UdpSession;
pub use stats::{IntervalStats, Status};
