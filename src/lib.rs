//! qosprobe - Bidirectional UDP quality-of-service probe
//!
//! Runs four concurrent iperf3 UDP sessions against one server (voice and
//! background traffic, each in both directions), parses their interval
//! reports as they stream in, and prints the latest jitter and loss of every
//! stream on a fixed cadence until all sessions have finished.

pub mod probe;
pub mod protocol;
