//! Drives the four iperf3 measurement streams and reports their metrics

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod reporter;
pub mod runner;
pub mod session;
pub mod store;
pub mod stream;

pub use config::Config;
pub use constants::*;
pub use error::{ProbeError, Result};
pub use logging::init_logging_with_config;
pub use orchestrator::{Orchestrator, RunSummary, SharedOutput};
pub use reporter::{render_final, render_report, Reporter, ReporterState};
pub use runner::{consume_output, LineCounts, StreamOutcome, StreamRunner};
pub use session::{Iperf3Launcher, Session, SessionLauncher, SessionProcess};
pub use store::{ResultStore, Snapshot, StreamStatus};
pub use stream::{Direction, StreamConfig, StreamId, TrafficClass};
