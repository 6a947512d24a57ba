use crate::probe::constants::*;
use crate::probe::error::{ProbeError, Result};
use clap::Parser;
use std::time::Duration;
use tracing::debug;

#[derive(Parser, Debug, Clone)]
#[command(name = "qosprobe")]
#[command(about = "Bidirectional UDP QoS test with periodic reporting")]
pub struct Config {
    /// iperf3 server address (IP or hostname)
    #[arg(short, long)]
    pub server: String,

    /// Test duration in seconds
    #[arg(short = 't', long = "duration", default_value_t = 60)]
    pub duration_secs: u64,

    /// Bandwidth for the voice streams (e.g. '64k')
    #[arg(long, alias = "voice_bandwidth", default_value = "64k")]
    pub voice_bandwidth: String,

    /// Packet size for the voice streams in bytes
    #[arg(long, alias = "voice_packet_size", default_value_t = 160)]
    pub voice_packet_size: usize,

    /// Server port for the voice forward stream
    #[arg(long, alias = "voice_forward_port", default_value_t = 5201)]
    pub voice_forward_port: u16,

    /// Server port for the voice reverse stream
    #[arg(long, alias = "voice_reverse_port", default_value_t = 5202)]
    pub voice_reverse_port: u16,

    /// IP TOS byte used to mark voice traffic
    #[arg(long, default_value_t = DEFAULT_VOICE_TOS)]
    pub voice_tos: u8,

    /// Bandwidth for the background streams (e.g. '100M')
    #[arg(long, alias = "bg_bandwidth", default_value = "100M")]
    pub bg_bandwidth: String,

    /// Packet size for the background streams in bytes
    #[arg(long, alias = "bg_packet_size", default_value_t = 1400)]
    pub bg_packet_size: usize,

    /// Server port for the background forward stream
    #[arg(long, alias = "bg_forward_port", default_value_t = 5203)]
    pub bg_forward_port: u16,

    /// Server port for the background reverse stream
    #[arg(long, alias = "bg_reverse_port", default_value_t = 5204)]
    pub bg_reverse_port: u16,

    /// Live report period in seconds
    #[arg(long, default_value_t = DEFAULT_REPORT_INTERVAL_SECS)]
    pub report_interval: u64,

    /// Path to the iperf3 executable
    #[arg(long, default_value = "iperf3")]
    pub iperf: String,

    /// Run iperf3 directly with --forceflush instead of under `stdbuf -oL`
    #[arg(long)]
    pub no_stdbuf: bool,

    /// Seconds a session may overrun its duration before it is killed (0 disables)
    #[arg(long, default_value_t = DEFAULT_WATCHDOG_GRACE_SECS)]
    pub watchdog_grace: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log format (text or json)
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub log_format: String,
}

impl Config {
    /// Returns the configured test duration
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Returns the live report period
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval)
    }

    /// Returns the watchdog grace period, or `None` when disabled
    pub fn watchdog_grace(&self) -> Option<Duration> {
        (self.watchdog_grace > 0).then(|| Duration::from_secs(self.watchdog_grace))
    }

    /// Returns true if JSON format logging is enabled
    pub fn is_json_format(&self) -> bool {
        self.log_format.to_lowercase() == "json"
    }

    /// Validates the configuration values
    pub fn validate(&self) -> Result<()> {
        debug!("Validating configuration");

        if self.server.trim().is_empty() {
            return Err(ProbeError::Config("server must not be empty".into()));
        }
        if self.duration_secs == 0 {
            return Err(ProbeError::Config("duration must be > 0".into()));
        }
        if self.report_interval == 0 {
            return Err(ProbeError::Config("report_interval must be > 0".into()));
        }

        for (name, size) in [
            ("voice_packet_size", self.voice_packet_size),
            ("bg_packet_size", self.bg_packet_size),
        ] {
            if size == 0 || size > MAX_UDP_PAYLOAD {
                return Err(ProbeError::Config(format!(
                    "{} must be between 1 and {}",
                    name, MAX_UDP_PAYLOAD
                )));
            }
        }

        for (name, bandwidth) in [
            ("voice_bandwidth", &self.voice_bandwidth),
            ("bg_bandwidth", &self.bg_bandwidth),
        ] {
            if !is_valid_bandwidth(bandwidth) {
                return Err(ProbeError::Config(format!(
                    "{} must be a number with an optional K/M/G suffix, got {:?}",
                    name, bandwidth
                )));
            }
        }

        let ports = [
            ("voice_forward_port", self.voice_forward_port),
            ("voice_reverse_port", self.voice_reverse_port),
            ("bg_forward_port", self.bg_forward_port),
            ("bg_reverse_port", self.bg_reverse_port),
        ];
        for (i, (name, port)) in ports.iter().enumerate() {
            if *port == 0 {
                return Err(ProbeError::Config(format!("{} must be > 0", name)));
            }
            if let Some((other, _)) = ports[i + 1..].iter().find(|(_, p)| p == port) {
                return Err(ProbeError::Config(format!(
                    "{} and {} must differ (both {})",
                    name, other, port
                )));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ProbeError::Config(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        debug!("Configuration validated successfully");
        Ok(())
    }
}

/// Accepts iperf3 rate notation: a positive number with an optional K/M/G suffix
fn is_valid_bandwidth(value: &str) -> bool {
    let number = value.trim_end_matches(['k', 'K', 'm', 'M', 'g', 'G']);
    if number.len() + 1 < value.len() || number.is_empty() {
        return false;
    }
    number.chars().all(|c| c.is_ascii_digit() || c == '.')
        && number.parse::<f64>().map(|n| n > 0.0).unwrap_or(false)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_config() -> Config {
        Config {
            server: "192.0.2.10".to_string(),
            duration_secs: 60,
            voice_bandwidth: "64k".to_string(),
            voice_packet_size: 160,
            voice_forward_port: 5201,
            voice_reverse_port: 5202,
            voice_tos: DEFAULT_VOICE_TOS,
            bg_bandwidth: "100M".to_string(),
            bg_packet_size: 1400,
            bg_forward_port: 5203,
            bg_reverse_port: 5204,
            report_interval: 10,
            iperf: "iperf3".to_string(),
            no_stdbuf: false,
            watchdog_grace: 30,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }

    #[test]
    fn test_defaults_from_cli() {
        let config = Config::try_parse_from(["qosprobe", "-s", "192.0.2.10"]).unwrap();
        assert_eq!(config.duration_secs, 60);
        assert_eq!(config.voice_bandwidth, "64k");
        assert_eq!(config.voice_packet_size, 160);
        assert_eq!(config.voice_forward_port, 5201);
        assert_eq!(config.voice_reverse_port, 5202);
        assert_eq!(config.voice_tos, 184);
        assert_eq!(config.bg_bandwidth, "100M");
        assert_eq!(config.bg_packet_size, 1400);
        assert_eq!(config.bg_forward_port, 5203);
        assert_eq!(config.bg_reverse_port, 5204);
        assert_eq!(config.report_interval(), Duration::from_secs(10));
        assert_eq!(config.watchdog_grace(), Some(Duration::from_secs(30)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_is_required() {
        assert!(Config::try_parse_from(["qosprobe"]).is_err());
    }

    #[test]
    fn test_underscore_aliases() {
        let config = Config::try_parse_from([
            "qosprobe",
            "--server",
            "example.net",
            "-t",
            "30",
            "--voice_bandwidth",
            "128k",
            "--bg_reverse_port",
            "6000",
        ])
        .unwrap();
        assert_eq!(config.duration(), Duration::from_secs(30));
        assert_eq!(config.voice_bandwidth, "128k");
        assert_eq!(config.bg_reverse_port, 6000);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = test_config();
        config.duration_secs = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.bg_packet_size = 70_000;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.voice_bandwidth = "fast".to_string();
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.bg_forward_port = config.voice_forward_port;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_watchdog_can_be_disabled() {
        let mut config = test_config();
        config.watchdog_grace = 0;
        assert_eq!(config.watchdog_grace(), None);
    }

    #[test]
    fn test_bandwidth_notation() {
        assert!(is_valid_bandwidth("64k"));
        assert!(is_valid_bandwidth("100M"));
        assert!(is_valid_bandwidth("1.5G"));
        assert!(is_valid_bandwidth("1000000"));
        assert!(!is_valid_bandwidth(""));
        assert!(!is_valid_bandwidth("M"));
        assert!(!is_valid_bandwidth("10kk"));
        assert!(!is_valid_bandwidth("0"));
        assert!(!is_valid_bandwidth("-5M"));
    }
}
