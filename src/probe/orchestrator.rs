use crate::probe::config::Config;
use crate::probe::constants::DEFAULT_REPORT_INTERVAL_SECS;
use crate::probe::error::{ProbeError, Result};
use crate::probe::reporter::{render_final, Reporter};
use crate::probe::runner::{StreamOutcome, StreamRunner};
use crate::probe::session::{Iperf3Launcher, SessionLauncher};
use crate::probe::store::{ResultStore, Snapshot};
use crate::probe::stream::{StreamConfig, StreamId};
use std::fmt;
use std::io::{self, Write};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Cloneable writer handle shared by the reporter thread and the final summary.
///
/// Each `write_all` holds the lock for the whole buffer, and `write!` formats
/// into one buffer first, so lines and report blocks are never interleaved.
pub struct SharedOutput<W> {
    inner: Arc<Mutex<W>>,
}

impl<W> SharedOutput<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Run `f` against the underlying writer
    pub fn with<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl<W> Clone for SharedOutput<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: Write> Write for SharedOutput<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with(|w| w.write(buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.with(|w| w.write_all(buf))
    }

    fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        self.write_all(fmt::format(args).as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with(|w| w.flush())
    }
}

/// Result of a complete run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Store contents after every stream finished
    pub snapshot: Snapshot,
    pub outcomes: Vec<(StreamId, StreamOutcome)>,
    pub elapsed: Duration,
}

/// Runs the four measurement streams concurrently alongside the reporter
pub struct Orchestrator {
    streams: [StreamConfig; 4],
    launcher: Arc<dyn SessionLauncher>,
    report_interval: Duration,
    watchdog_grace: Option<Duration>,
}

impl Orchestrator {
    pub fn new(streams: [StreamConfig; 4], launcher: Arc<dyn SessionLauncher>) -> Self {
        Self {
            streams,
            launcher,
            report_interval: Duration::from_secs(DEFAULT_REPORT_INTERVAL_SECS),
            watchdog_grace: None,
        }
    }

    /// Orchestrator for a validated command-line configuration, launching iperf3
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            StreamConfig::for_run(config),
            Arc::new(Iperf3Launcher::from_config(config)),
        )
        .with_report_interval(config.report_interval())
        .with_watchdog(config.watchdog_grace())
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn with_watchdog(mut self, grace: Option<Duration>) -> Self {
        self.watchdog_grace = grace;
        self
    }

    pub fn streams(&self) -> &[StreamConfig; 4] {
        &self.streams
    }

    /// Run to completion, reporting on stdout
    pub fn run(self) -> Result<RunSummary> {
        self.run_to(SharedOutput::new(io::stdout()))
    }

    /// Run to completion, reporting on `out`.
    ///
    /// Blocks until every stream runner has returned, stops and joins the
    /// reporter, then writes the final results.
    pub fn run_to<W: Write + Send + 'static>(self, mut out: SharedOutput<W>) -> Result<RunSummary> {
        let started = Instant::now();
        let store = Arc::new(ResultStore::new());

        let (stop_reporter, stop) = mpsc::channel::<()>();
        let reporter = Reporter::new(Arc::clone(&store), self.report_interval)
            .with_start(started)
            .with_stop(stop);
        let mut reporter_out = out.clone();
        let reporter_handle = thread::Builder::new()
            .name("reporter".to_string())
            .spawn(move || match reporter.run(&mut reporter_out) {
                Ok(rendered) => info!(reports = rendered, "Reporter stopped"),
                Err(e) => error!(error = %e, "Reporter failed"),
            })
            .map_err(|e| ProbeError::Thread(format!("failed to spawn reporter: {}", e)))?;

        let mut handles = Vec::with_capacity(self.streams.len());
        for config in self.streams {
            let id = config.id;
            let announcement = format!(
                "Starting UDP test for {}: {}\n",
                id,
                self.launcher.describe(&config)
            );
            out.write_all(announcement.as_bytes())?;

            let runner = StreamRunner::new(config, Arc::clone(&store), Arc::clone(&self.launcher))
                .with_watchdog(self.watchdog_grace);
            match thread::Builder::new()
                .name(format!("stream-{}", id))
                .spawn(move || runner.run())
            {
                Ok(handle) => handles.push((id, handle)),
                Err(e) => {
                    error!(stream = %id, error = %e, "Failed to spawn stream runner");
                    store.mark_failed(id, format!("failed to spawn runner thread: {}", e));
                }
            }
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            match handle.join() {
                Ok(outcome) => outcomes.push((id, outcome)),
                Err(_) => {
                    warn!(stream = %id, "Stream runner panicked");
                    store.mark_failed(id, "stream runner panicked");
                }
            }
        }

        // Periodic rendering ends before the final view is written
        drop(stop_reporter);
        if reporter_handle.join().is_err() {
            warn!("Reporter thread panicked");
        }

        let snapshot = store.snapshot();
        out.write_all(render_final(&snapshot).as_bytes())?;
        out.flush()?;

        let elapsed = started.elapsed();
        info!(elapsed_secs = elapsed.as_secs_f64(), "All streams finished");
        Ok(RunSummary {
            snapshot,
            outcomes,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::config::tests::test_config;
    use crate::probe::session::Session;
    use std::io::Cursor;

    struct CannedLauncher;

    impl SessionLauncher for CannedLauncher {
        fn launch(&self, config: &StreamConfig) -> Result<Session> {
            if config.id == StreamId::BgReverse {
                return Err(ProbeError::Launch {
                    stream: config.id,
                    source: io::Error::from(io::ErrorKind::NotFound),
                });
            }
            let line = format!(
                "[  5]   0.00-10.00  sec  78.1 KBytes  64.0 Kbits/sec  0.089 ms  0/{} (0%)\n",
                config.port
            );
            Ok(Session::from_reader(Cursor::new(line)))
        }
    }

    #[test]
    fn test_from_config_builds_four_streams() {
        let orchestrator = Orchestrator::from_config(&test_config());
        let ids: Vec<StreamId> = orchestrator.streams().iter().map(|s| s.id).collect();
        assert_eq!(ids, StreamId::ALL.to_vec());
        assert_eq!(orchestrator.report_interval, Duration::from_secs(10));
        assert_eq!(orchestrator.watchdog_grace, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_run_terminates_with_launch_failure() -> Result<()> {
        colored::control::set_override(false);
        let orchestrator = Orchestrator::new(
            StreamConfig::for_run(&test_config()),
            Arc::new(CannedLauncher),
        )
        .with_report_interval(Duration::from_millis(5));
        let out = SharedOutput::new(Vec::new());

        let summary = orchestrator.run_to(out.clone())?;

        assert!(summary.snapshot.all_done());
        assert_eq!(summary.outcomes.len(), 4);
        let failed = summary.snapshot.get(StreamId::BgReverse);
        assert!(failed.failure.is_some());
        assert_eq!(
            summary.snapshot.get(StreamId::BgForward).latest.as_ref().map(|r| r.total),
            Some(5203)
        );

        let text = out.with(|buf| String::from_utf8_lossy(buf).into_owned());
        assert!(text.contains("Starting UDP test for voice_forward: -c 192.0.2.10 -p 5201"));
        assert!(text.contains("--- Final Results ---"));
        assert!(text.contains("Bg Reverse: Failed to start:"));
        Ok(())
    }

    /// Writer that yields between partial writes, widening any window in which
    /// another thread could splice output into a half-written line
    struct SlowWriter {
        inner: Vec<u8>,
    }

    impl Write for SlowWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            std::thread::sleep(Duration::from_micros(200));
            let n = buf.len().min(16);
            self.inner.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_announcements_are_not_split_by_reports() -> Result<()> {
        colored::control::set_override(false);
        let streams = StreamConfig::for_run(&test_config());
        let expected: Vec<String> = streams
            .iter()
            .map(|config| {
                format!(
                    "Starting UDP test for {}: {}",
                    config.id,
                    CannedLauncher.describe(config)
                )
            })
            .collect();

        for _ in 0..10 {
            let out = SharedOutput::new(SlowWriter { inner: Vec::new() });
            Orchestrator::new(streams.clone(), Arc::new(CannedLauncher))
                .with_report_interval(Duration::from_micros(50))
                .run_to(out.clone())?;

            let text = out.with(|w| String::from_utf8_lossy(&w.inner).into_owned());
            let announced: Vec<&str> = text
                .lines()
                .filter(|line| line.contains("Starting UDP test"))
                .collect();
            assert_eq!(announced, expected, "output:\n{}", text);
        }
        Ok(())
    }

    #[test]
    fn test_no_periodic_report_after_final_results() -> Result<()> {
        colored::control::set_override(false);
        for _ in 0..200 {
            let out = SharedOutput::new(Vec::new());
            Orchestrator::new(StreamConfig::for_run(&test_config()), Arc::new(CannedLauncher))
                .with_report_interval(Duration::from_micros(50))
                .run_to(out.clone())?;

            let text = out.with(|buf| String::from_utf8_lossy(buf).into_owned());
            let final_at = text.find("--- Final Results ---").expect("final results present");
            assert!(!text[final_at..].contains("--- Report at"), "output:\n{}", text);
        }
        Ok(())
    }
}
