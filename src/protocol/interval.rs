use crate::protocol::error::{ParseError, Result};
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Interval report line as printed by iperf3 in UDP mode, e.g.
///
/// ```text
/// [  5]   0.00-10.00 sec  7.65 MBytes  6.41 Mbits/sec  0.089 ms  0/555 (0%)
/// ```
///
/// Only the prefix is anchored, so the per-stream `sender`/`receiver` total
/// rows are accepted; in forward mode they are the only rows with a jitter
/// column. `[SUM]` rows never match.
static INTERVAL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^\[\s*\d+\]\s+(?P<interval>[\d.]+-[\d.]+)\s+sec\s+",
        r"[\d.]+\s+\S+\s+(?P<bandwidth>[\d.]+\s+\S+)\s+",
        r"(?P<jitter>[\d.]+)\s+ms\s+(?P<lost>\d+)/(?P<total>\d+)\s+",
        r"\((?P<loss_percent>[\d.]+(?:e[+-]?\d+)?)%\)",
    ))
    .expect("interval report pattern is valid")
});

/// Metrics extracted from one interval report line
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalReport {
    /// Reporting window, e.g. `0.00-10.00`
    pub interval: String,
    /// Achieved bandwidth, with unit (`6.41 Mbits/sec`)
    pub bandwidth: String,
    pub jitter_ms: f64,
    pub lost: u64,
    pub total: u64,
    /// Whole-number loss percentage, 0 to 100
    pub loss_percent: u32,
}

/// Parse a single line of iperf3 output.
///
/// Returns `Ok(None)` for anything that is not an interval data line (banners,
/// headers, blank lines). A line that has the right shape but carries numbers
/// that cannot be converted yields a [`ParseError`].
pub fn parse_line(line: &str) -> Result<Option<IntervalReport>> {
    let Some(caps) = INTERVAL_LINE.captures(line) else {
        return Ok(None);
    };

    let jitter_ms: f64 = number(&caps, "jitter")?;
    let lost: u64 = number(&caps, "lost")?;
    let total: u64 = number(&caps, "total")?;
    let loss: f64 = number(&caps, "loss_percent")?;

    if lost > total {
        return Err(ParseError::Inconsistent { lost, total });
    }

    // Newer iperf3 builds print fractional percentages such as `(0.18%)`
    let rounded = loss.round();
    if rounded > 100.0 {
        return Err(ParseError::LossOutOfRange(rounded as u32));
    }

    Ok(Some(IntervalReport {
        interval: caps["interval"].to_string(),
        bandwidth: caps["bandwidth"].to_string(),
        jitter_ms,
        lost,
        total,
        loss_percent: rounded as u32,
    }))
}

fn number<T: std::str::FromStr>(caps: &Captures<'_>, field: &'static str) -> Result<T> {
    let value = &caps[field];
    value.parse().map_err(|_| ParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}
