use crate::probe::constants::*;
use crate::probe::error::Result;
use crate::probe::store::{ResultStore, Snapshot, StreamStatus};
use crate::probe::stream::TrafficClass;
use crate::protocol::IntervalReport;
use colored::*;
use std::io::Write;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Reporter lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterState {
    Running,
    Stopped,
}

/// Periodically renders the latest metrics of every stream.
///
/// The reporter only reads the store and only waits on its own timer; it stops
/// once the store shows every stream as done, or when its stop channel is
/// signaled or dropped.
pub struct Reporter {
    store: Arc<ResultStore>,
    interval: Duration,
    started: Instant,
    stop: Option<Receiver<()>>,
}

impl Reporter {
    pub fn new(store: Arc<ResultStore>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            started: Instant::now(),
            stop: None,
        }
    }

    /// Measure elapsed time from `started` instead of construction time
    pub fn with_start(mut self, started: Instant) -> Self {
        self.started = started;
        self
    }

    /// Stop as soon as `stop` receives a message or its sender is dropped,
    /// instead of waiting out the current interval
    pub fn with_stop(mut self, stop: Receiver<()>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Render one report to `out` unless every stream has finished
    pub fn tick<W: Write>(&self, out: &mut W) -> Result<ReporterState> {
        let snapshot = self.store.snapshot();
        if snapshot.all_done() {
            debug!("All streams done, reporter stopping");
            return Ok(ReporterState::Stopped);
        }

        let report = render_report(self.started.elapsed(), &snapshot);
        out.write_all(report.as_bytes())?;
        out.flush()?;
        Ok(ReporterState::Running)
    }

    /// Tick immediately, then once per interval, until stopped.
    ///
    /// Returns the number of reports rendered.
    pub fn run<W: Write>(&self, out: &mut W) -> Result<usize> {
        let mut rendered = 0;
        while self.tick(out)? == ReporterState::Running {
            rendered += 1;
            if !self.wait_interval() {
                debug!("Reporter stop requested");
                break;
            }
        }
        Ok(rendered)
    }

    /// Wait one interval; false when a stop was requested meanwhile
    fn wait_interval(&self) -> bool {
        match &self.stop {
            Some(stop) => matches!(stop.recv_timeout(self.interval), Err(RecvTimeoutError::Timeout)),
            None => {
                thread::sleep(self.interval);
                true
            }
        }
    }
}

/// Periodic report block, headed by the elapsed run time
pub fn render_report(elapsed: Duration, snapshot: &Snapshot) -> String {
    let header = format!("--- Report at {} seconds ---", elapsed.as_secs());
    render_block(&header, snapshot, "No data yet.")
}

/// Final results block printed once all streams have finished
pub fn render_final(snapshot: &Snapshot) -> String {
    render_block("--- Final Results ---", snapshot, "No data available.")
}

fn render_block(header: &str, snapshot: &Snapshot, placeholder: &str) -> String {
    let mut block = format!("\n{}\n", header.cyan().bold());
    for status in &snapshot.streams {
        block.push_str(&render_stream(status, placeholder));
        block.push('\n');
    }
    block
}

/// One line for one stream, e.g.
/// `Voice Forward: Interval 0.00-10.00 sec, Jitter: 0.089 ms, Lost: 0 / 555, Loss%: 0%`
pub fn render_stream(status: &StreamStatus, placeholder: &str) -> String {
    let title = status.id.title();
    match (&status.latest, &status.failure) {
        (Some(report), _) => format!(
            "{}: Interval {} sec, Jitter: {} ms, Lost: {} / {}, Loss%: {}, Bandwidth: {}",
            title,
            report.interval,
            colorize_jitter(report, status.id.class()),
            report.lost,
            report.total,
            colorize_loss(report.loss_percent),
            report.bandwidth
        ),
        (None, Some(reason)) => format!("{}: {} {}", title, "Failed to start:".red(), reason),
        (None, None) => format!("{}: {}", title, placeholder),
    }
}

fn colorize_loss(loss_percent: u32) -> ColoredString {
    let text = format!("{}%", loss_percent);
    if loss_percent >= LOSS_FAIL_PERCENT {
        text.red().bold()
    } else if loss_percent >= LOSS_WARN_PERCENT {
        text.yellow()
    } else {
        text.green()
    }
}

fn colorize_jitter(report: &IntervalReport, class: TrafficClass) -> ColoredString {
    let text = format!("{:.3}", report.jitter_ms);
    if class == TrafficClass::Voice && report.jitter_ms > VOICE_JITTER_WARN_MS {
        text.yellow()
    } else {
        text.normal()
    }
}
