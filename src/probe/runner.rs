use crate::probe::error::ProbeError;
use crate::probe::session::{SessionLauncher, SessionProcess};
use crate::probe::store::ResultStore;
use crate::probe::stream::{StreamConfig, StreamId};
use crate::protocol::parse_line;
use std::io::{BufRead, ErrorKind};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Exit codes a shell or `stdbuf` uses when the wrapped program could not be run
const EXEC_FAILURE_CODES: [i32; 2] = [126, 127];

/// How a stream's session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The session ran and its output reached end-of-stream
    Completed {
        reports: usize,
        parse_errors: usize,
        exit_code: Option<i32>,
    },
    /// The session could not be started
    LaunchFailed(String),
}

/// Counters for one pass over a session's output
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LineCounts {
    pub lines: usize,
    pub reports: usize,
    pub parse_errors: usize,
}

/// Drives a single measurement stream from launch to completion
pub struct StreamRunner {
    config: StreamConfig,
    store: Arc<ResultStore>,
    launcher: Arc<dyn SessionLauncher>,
    watchdog_grace: Option<Duration>,
}

impl StreamRunner {
    pub fn new(
        config: StreamConfig,
        store: Arc<ResultStore>,
        launcher: Arc<dyn SessionLauncher>,
    ) -> Self {
        Self {
            config,
            store,
            launcher,
            watchdog_grace: None,
        }
    }

    /// Kill the session if it is still running `grace` after its configured
    /// duration has elapsed
    pub fn with_watchdog(mut self, grace: Option<Duration>) -> Self {
        self.watchdog_grace = grace;
        self
    }

    /// Run the stream to completion.
    ///
    /// Every path marks the stream done in the store, so the reporter always
    /// observes termination.
    pub fn run(self) -> StreamOutcome {
        let id = self.config.id;
        info!(
            stream = %id,
            server = %self.config.server,
            port = self.config.port,
            bandwidth = %self.config.bandwidth,
            packet_size = self.config.packet_size,
            "Starting UDP test"
        );

        let session = match self.launcher.launch(&self.config) {
            Ok(session) => session,
            Err(e) => {
                error!(stream = %id, error = %e, "Failed to start measurement session");
                let reason = match &e {
                    ProbeError::Launch { source, .. } => source.to_string(),
                    other => other.to_string(),
                };
                self.store.mark_failed(id, reason.clone());
                return StreamOutcome::LaunchFailed(reason);
            }
        };

        let (mut output, process) = session.into_parts();
        let watchdog = process.as_ref().and_then(|p| self.spawn_watchdog(p.clone()));

        let counts = consume_output(id, output.as_mut(), &self.store);
        drop(output);

        if let Some((cancel, handle)) = watchdog {
            drop(cancel);
            if handle.join().is_err() {
                warn!(stream = %id, "Watchdog thread panicked");
            }
        }

        let exit_code = process.and_then(|p| reap(id, &p));

        match exit_code {
            Some(code) if EXEC_FAILURE_CODES.contains(&code) && counts.reports == 0 => {
                let reason = format!("measurement tool could not be executed (exit code {})", code);
                error!(stream = %id, exit_code = code, "Measurement tool could not be executed");
                self.store.mark_failed(id, reason);
            }
            _ => self.store.mark_done(id),
        }

        info!(
            stream = %id,
            lines = counts.lines,
            reports = counts.reports,
            parse_errors = counts.parse_errors,
            "UDP test finished"
        );

        StreamOutcome::Completed {
            reports: counts.reports,
            parse_errors: counts.parse_errors,
            exit_code,
        }
    }

    fn spawn_watchdog(&self, process: SessionProcess) -> Option<(Sender<()>, JoinHandle<()>)> {
        let grace = self.watchdog_grace?;
        let id = self.config.id;
        let deadline = self.config.duration + grace;
        let (cancel, cancelled) = mpsc::channel::<()>();

        let spawned = thread::Builder::new()
            .name(format!("watchdog-{}", id))
            .spawn(move || {
                // Disconnection means the session ended on its own
                if let Err(RecvTimeoutError::Timeout) = cancelled.recv_timeout(deadline) {
                    warn!(
                        stream = %id,
                        pid = process.id(),
                        deadline_secs = deadline.as_secs(),
                        "Session overran its deadline, killing it"
                    );
                    if let Err(e) = process.kill() {
                        warn!(stream = %id, error = %e, "Failed to kill session");
                    }
                }
            });

        match spawned {
            Ok(handle) => Some((cancel, handle)),
            Err(e) => {
                warn!(stream = %id, error = %e, "Failed to start watchdog, continuing without it");
                None
            }
        }
    }
}

/// Read `output` to end-of-stream, storing every interval report found
pub fn consume_output(id: StreamId, output: &mut dyn BufRead, store: &ResultStore) -> LineCounts {
    let mut counts = LineCounts::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match output.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(stream = %id, error = %e, "Failed to read session output");
                break;
            }
        }

        counts.lines += 1;
        let text = String::from_utf8_lossy(&buf);
        let line = text.trim();
        debug!(stream = %id, line, "Session output");

        match parse_line(line) {
            Ok(Some(report)) => {
                counts.reports += 1;
                store.update(id, report);
            }
            Ok(None) => {}
            Err(e) => {
                counts.parse_errors += 1;
                warn!(stream = %id, line, error = %e, "Error parsing interval line");
            }
        }
    }

    counts
}

fn reap(id: StreamId, process: &SessionProcess) -> Option<i32> {
    match process.wait() {
        Ok(status) if status.success() => {
            debug!(stream = %id, "Session exited successfully");
            status.code()
        }
        Ok(status) => {
            warn!(stream = %id, status = %status, "Session exited abnormally");
            status.code()
        }
        Err(e) => {
            warn!(stream = %id, error = %e, "Failed to wait for session");
            None
        }
    }
}
