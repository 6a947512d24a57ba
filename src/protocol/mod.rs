//! Parsing of the text reports emitted by iperf3 measurement sessions

pub mod error;
pub mod interval;

pub use error::ParseError;
pub use interval::{parse_line, IntervalReport};
