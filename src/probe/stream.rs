use crate::probe::config::Config;
use crate::probe::constants::IPERF_REPORT_INTERVAL_SECS;
use std::fmt;
use std::time::Duration;

/// Identifier of one of the four fixed measurement streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamId {
    VoiceForward,
    VoiceReverse,
    BgForward,
    BgReverse,
}

impl StreamId {
    /// All streams, in report order
    pub const ALL: [StreamId; 4] = [
        StreamId::VoiceForward,
        StreamId::VoiceReverse,
        StreamId::BgForward,
        StreamId::BgReverse,
    ];

    /// Position of this stream in [`StreamId::ALL`]
    pub fn index(self) -> usize {
        match self {
            StreamId::VoiceForward => 0,
            StreamId::VoiceReverse => 1,
            StreamId::BgForward => 2,
            StreamId::BgReverse => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamId::VoiceForward => "voice_forward",
            StreamId::VoiceReverse => "voice_reverse",
            StreamId::BgForward => "bg_forward",
            StreamId::BgReverse => "bg_reverse",
        }
    }

    /// Human-readable label used in reports
    pub fn title(self) -> &'static str {
        match self {
            StreamId::VoiceForward => "Voice Forward",
            StreamId::VoiceReverse => "Voice Reverse",
            StreamId::BgForward => "Bg Forward",
            StreamId::BgReverse => "Bg Reverse",
        }
    }

    pub fn class(self) -> TrafficClass {
        match self {
            StreamId::VoiceForward | StreamId::VoiceReverse => TrafficClass::Voice,
            StreamId::BgForward | StreamId::BgReverse => TrafficClass::Background,
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            StreamId::VoiceForward | StreamId::BgForward => Direction::Forward,
            StreamId::VoiceReverse | StreamId::BgReverse => Direction::Reverse,
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficClass {
    Voice,
    Background,
}

/// Direction of traffic relative to the local host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Local host sends, server receives
    Forward,
    /// Server sends, local host receives (iperf3 `-R`)
    Reverse,
}

/// Fully-resolved parameters for one iperf3 session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub id: StreamId,
    pub server: String,
    pub port: u16,
    pub duration: Duration,
    /// Target bandwidth in iperf3 notation, e.g. `64k` or `100M`
    pub bandwidth: String,
    pub packet_size: usize,
    /// IP TOS byte; only voice streams carry one
    pub tos: Option<u8>,
    pub direction: Direction,
}

impl StreamConfig {
    /// Build the four stream configurations for a run
    pub fn for_run(config: &Config) -> [StreamConfig; 4] {
        StreamId::ALL.map(|id| {
            let (port, bandwidth, packet_size, tos) = match id {
                StreamId::VoiceForward => (
                    config.voice_forward_port,
                    &config.voice_bandwidth,
                    config.voice_packet_size,
                    Some(config.voice_tos),
                ),
                StreamId::VoiceReverse => (
                    config.voice_reverse_port,
                    &config.voice_bandwidth,
                    config.voice_packet_size,
                    Some(config.voice_tos),
                ),
                StreamId::BgForward => (
                    config.bg_forward_port,
                    &config.bg_bandwidth,
                    config.bg_packet_size,
                    None,
                ),
                StreamId::BgReverse => (
                    config.bg_reverse_port,
                    &config.bg_bandwidth,
                    config.bg_packet_size,
                    None,
                ),
            };

            StreamConfig {
                id,
                server: config.server.clone(),
                port,
                duration: config.duration(),
                bandwidth: bandwidth.clone(),
                packet_size,
                tos,
                direction: id.direction(),
            }
        })
    }

    /// Arguments passed to iperf3 for this stream
    pub fn iperf_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c".to_string(),
            self.server.clone(),
            "-p".to_string(),
            self.port.to_string(),
            "-u".to_string(),
            "-t".to_string(),
            self.duration.as_secs().to_string(),
            "-i".to_string(),
            IPERF_REPORT_INTERVAL_SECS.to_string(),
            "-b".to_string(),
            self.bandwidth.clone(),
            "-l".to_string(),
            self.packet_size.to_string(),
        ];
        if let Some(tos) = self.tos {
            args.push("-S".to_string());
            args.push(tos.to_string());
        }
        if self.direction == Direction::Reverse {
            args.push("-R".to_string());
        }
        args
    }
}
