use crate::probe::config::Config;
use crate::probe::error::{ProbeError, Result};
use crate::probe::stream::StreamConfig;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Trait for starting the external measurement session of one stream
pub trait SessionLauncher: Send + Sync {
    /// Start a session for `config`, returning its merged output stream
    fn launch(&self, config: &StreamConfig) -> Result<Session>;

    /// Command announced before the stream starts
    fn describe(&self, config: &StreamConfig) -> String {
        config.iperf_args().join(" ")
    }
}

/// A running measurement session: its combined stdout/stderr, plus the child
/// process when there is one
pub struct Session {
    output: Box<dyn BufRead + Send>,
    process: Option<SessionProcess>,
}

impl Session {
    /// Wrap a spawned child whose output is readable through `output`
    pub fn from_child(child: Child, output: impl Read + Send + 'static) -> Self {
        Self {
            output: Box::new(BufReader::new(output)),
            process: Some(SessionProcess {
                child: Arc::new(Mutex::new(child)),
            }),
        }
    }

    /// A session with no process behind it, e.g. replayed or scripted output
    pub fn from_reader(output: impl BufRead + Send + 'static) -> Self {
        Self {
            output: Box::new(output),
            process: None,
        }
    }

    pub fn into_parts(self) -> (Box<dyn BufRead + Send>, Option<SessionProcess>) {
        (self.output, self.process)
    }
}

/// Shared handle to a session's child process
#[derive(Clone)]
pub struct SessionProcess {
    child: Arc<Mutex<Child>>,
}

impl SessionProcess {
    fn child(&self) -> std::sync::MutexGuard<'_, Child> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> u32 {
        self.child().id()
    }

    /// Kill the child if it is still running
    pub fn kill(&self) -> io::Result<()> {
        let mut child = self.child();
        match child.try_wait()? {
            Some(_) => Ok(()),
            None => child.kill(),
        }
    }

    /// Block until the child exits and reap it
    pub fn wait(&self) -> io::Result<ExitStatus> {
        self.child().wait()
    }
}

/// Launches iperf3 as a child process
#[derive(Debug, Clone)]
pub struct Iperf3Launcher {
    program: String,
    line_buffered: bool,
}

impl Iperf3Launcher {
    /// `line_buffered` runs iperf3 under `stdbuf -oL`; otherwise iperf3 is
    /// started directly with `--forceflush`.
    pub fn new(program: impl Into<String>, line_buffered: bool) -> Self {
        Self {
            program: program.into(),
            line_buffered,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.iperf.clone(), !config.no_stdbuf)
    }

    /// Program and arguments for one stream, in execution order
    pub fn command_line(&self, config: &StreamConfig) -> Vec<String> {
        let mut argv = Vec::new();
        if self.line_buffered {
            argv.push("stdbuf".to_string());
            argv.push("-oL".to_string());
        }
        argv.push(self.program.clone());
        argv.extend(config.iperf_args());
        if !self.line_buffered {
            argv.push("--forceflush".to_string());
        }
        argv
    }
}

impl SessionLauncher for Iperf3Launcher {
    fn launch(&self, config: &StreamConfig) -> Result<Session> {
        let launch_error = |source| ProbeError::Launch {
            stream: config.id,
            source,
        };

        let argv = self.command_line(config);
        let (reader, writer) = io::pipe().map_err(launch_error)?;

        let child = {
            let mut command = Command::new(&argv[0]);
            command
                .args(&argv[1..])
                .stdin(Stdio::null())
                .stdout(writer.try_clone().map_err(launch_error)?)
                .stderr(writer);
            // The command owns the parent's copies of the write end; it must be
            // dropped before reading or end-of-stream is never observed.
            command.spawn().map_err(|e| {
                warn!(stream = %config.id, error = %e, "Failed to spawn session");
                launch_error(e)
            })?
        };

        debug!(stream = %config.id, pid = child.id(), "Session spawned");
        Ok(Session::from_child(child, reader))
    }

    fn describe(&self, config: &StreamConfig) -> String {
        self.command_line(config).join(" ")
    }
}
