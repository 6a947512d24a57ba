//! Constants used throughout the probe

/// Reporting interval requested from iperf3 (`-i`), in seconds
pub const IPERF_REPORT_INTERVAL_SECS: u64 = 10;

/// Default period of the live report, in seconds
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 10;

/// Default IP TOS byte applied to voice streams (DSCP EF, 46 << 2)
pub const DEFAULT_VOICE_TOS: u8 = 184;

/// Extra time a session may run past its configured duration before the
/// watchdog kills it, in seconds
pub const DEFAULT_WATCHDOG_GRACE_SECS: u64 = 30;

/// Largest UDP payload iperf3 can send over IPv4
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Loss percentage at or above which a stream is highlighted as degraded
pub const LOSS_WARN_PERCENT: u32 = 1;

/// Loss percentage at or above which a stream is highlighted as failing
pub const LOSS_FAIL_PERCENT: u32 = 5;

/// Jitter above which a voice stream is highlighted, in milliseconds
pub const VOICE_JITTER_WARN_MS: f64 = 30.0;
