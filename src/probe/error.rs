use crate::probe::stream::StreamId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to start iperf3 for {stream}: {source}")]
    Launch {
        stream: StreamId,
        #[source]
        source: std::io::Error,
    },

    #[error("Thread error: {0}")]
    Thread(String),
}

pub type Result<T> = std::result::Result<T, ProbeError>;
