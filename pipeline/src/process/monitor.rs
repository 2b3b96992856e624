//! Polls renderer subprocesses from the host thread.
//!
//! Output is read on helper threads and forwarded over a channel, so a tick
//! never blocks on a pipe. Each record is finalized exactly once: on exit, or
//! on an explicit kill.

use std::collections::{HashMap, VecDeque};
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, ExitStatus};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use super::{parse_status_line, ProcessError};
use crate::host::{PropertyPath, PropertyValue, ReportLevel, SceneHost};

/// Stderr lines kept for the failure report
const STDERR_TAIL: usize = 20;
/// Ticks to wait for output readers after the process exited
const READER_GRACE_TICKS: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ProcessKind {
    Thumbnailer,
    Upload,
}

enum Output {
    Stdout(String),
    Stderr(String),
    Closed,
}

enum Exit {
    Status(ExitStatus),
    Lost(String),
    Killed,
}

struct TrackedProcess {
    kind: ProcessKind,
    child: Child,
    busy: PropertyPath,
    status: PropertyPath,
    output: UnboundedReceiver<Output>,
    open_streams: usize,
    stderr_tail: VecDeque<String>,
    exit: Option<Exit>,
    grace_ticks: u8,
}

impl TrackedProcess {
    fn drain_output(&mut self, host: &mut dyn SceneHost) {
        loop {
            match self.output.try_recv() {
                Ok(Output::Stdout(line)) => match parse_status_line(&line) {
                    Some(text) => {
                        set_property(host, &self.status, PropertyValue::Text(text.into()))
                    }
                    None => debug!("[{}] {}", self.kind, line),
                },
                Ok(Output::Stderr(line)) => {
                    debug!("[{} stderr] {}", self.kind, line);
                    if self.stderr_tail.len() == STDERR_TAIL {
                        self.stderr_tail.pop_front();
                    }
                    self.stderr_tail.push_back(line);
                }
                Ok(Output::Closed) => self.open_streams = self.open_streams.saturating_sub(1),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.open_streams = 0;
                    break;
                }
            }
        }
    }

    /// Returns true once the record is finalized and can be dropped
    fn poll(&mut self, host: &mut dyn SceneHost) -> bool {
        self.drain_output(host);

        if self.exit.is_none() {
            self.exit = match self.child.try_wait() {
                Ok(Some(status)) => Some(Exit::Status(status)),
                Ok(None) => None,
                Err(e) => Some(Exit::Lost(e.to_string())),
            };
        }
        if self.exit.is_none() {
            return false;
        }

        // Let readers deliver the last lines; a grandchild holding the pipe
        // open must not keep the record alive.
        if self.open_streams > 0 && self.grace_ticks < READER_GRACE_TICKS {
            self.grace_ticks += 1;
            return false;
        }

        self.finalize(host);
        true
    }

    fn finalize(&mut self, host: &mut dyn SceneHost) {
        let (succeeded, text) = match &self.exit {
            Some(Exit::Status(status)) if status.success() => {
                (true, format!("{} finished successfully", self.kind))
            }
            Some(Exit::Status(status)) => (false, self.failure_text(&status.to_string())),
            Some(Exit::Lost(reason)) => (false, self.failure_text(reason)),
            Some(Exit::Killed) | None => (false, format!("{} canceled", self.kind)),
        };

        set_property(host, &self.busy, PropertyValue::Bool(false));
        set_property(host, &self.status, PropertyValue::Text(text.clone()));

        if succeeded {
            info!("{}", text);
        } else if !matches!(self.exit, Some(Exit::Killed)) {
            host.report(ReportLevel::Error, &text);
        }
    }

    fn failure_text(&self, fallback: &str) -> String {
        let tail: Vec<&str> = self
            .stderr_tail
            .iter()
            .rev()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .take(3)
            .collect();
        if tail.is_empty() {
            format!("{} failed: {}", self.kind, fallback)
        } else {
            let lines: Vec<&str> = tail.into_iter().rev().collect();
            format!("{} failed: {}", self.kind, lines.join(" | "))
        }
    }
}

fn set_property(host: &mut dyn SceneHost, path: &PropertyPath, value: PropertyValue) {
    if let Err(e) = host.set_property(path, value) {
        warn!("Failed to update {}: {}", path, e);
    }
}

fn spawn_reader<R, F>(
    stream: R,
    name: &str,
    tx: UnboundedSender<Output>,
    wrap: F,
) -> Result<(), ProcessError>
where
    R: Read + Send + 'static,
    F: Fn(String) -> Output + Send + 'static,
{
    thread::Builder::new().name(name.to_string()).spawn(move || {
        for line in BufReader::new(stream).lines() {
            match line {
                Ok(line) => {
                    if tx.send(wrap(line)).is_err() {
                        return;
                    }
                }
                Err(_) => break,
            }
        }
        let _ = tx.send(Output::Closed);
    })?;
    Ok(())
}

/// Start reader threads for the piped streams of `child`.
/// Returns how many streams are being read.
fn forward_output(child: &mut Child, tx: &UnboundedSender<Output>) -> Result<usize, ProcessError> {
    let mut open_streams = 0;
    if let Some(stdout) = child.stdout.take() {
        spawn_reader(stdout, "process-stdout", tx.clone(), Output::Stdout)?;
        open_streams += 1;
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_reader(stderr, "process-stderr", tx.clone(), Output::Stderr)?;
        open_streams += 1;
    }
    Ok(open_streams)
}

/// Background renderer processes keyed by the host object they work on
pub struct ProcessMonitor {
    processes: HashMap<PropertyPath, TrackedProcess>,
    active_interval: Duration,
    idle_interval: Duration,
}

impl ProcessMonitor {
    pub fn new(active_interval: Duration, idle_interval: Duration) -> Self {
        Self {
            processes: HashMap::new(),
            active_interval,
            idle_interval,
        }
    }

    /// Track a spawned process.
    ///
    /// `busy` and `status` are the host properties kept up to date while it
    /// runs. Piped stdout/stderr are taken from `child`.
    pub fn add_process(
        &mut self,
        id: PropertyPath,
        mut child: Child,
        busy: PropertyPath,
        status: PropertyPath,
        kind: ProcessKind,
        host: &mut dyn SceneHost,
    ) -> Result<(), ProcessError> {
        if self.processes.contains_key(&id) {
            warn!("{} for {} already running, killing it", kind, id);
            self.kill(&id, host);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let open_streams = match forward_output(&mut child, &tx) {
            Ok(count) => count,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };

        info!("Tracking {} process {} for {}", kind, child.id(), id);
        self.processes.insert(
            id,
            TrackedProcess {
                kind,
                child,
                busy,
                status,
                output: rx,
                open_streams,
                stderr_tail: VecDeque::new(),
                exit: None,
                grace_ticks: 0,
            },
        );
        Ok(())
    }

    /// Poll every process, finalizing those that exited.
    /// Returns the delay until the next poll.
    pub fn tick(&mut self, host: &mut dyn SceneHost) -> Duration {
        self.processes.retain(|_, process| !process.poll(&mut *host));
        if self.processes.is_empty() {
            self.idle_interval
        } else {
            self.active_interval
        }
    }

    /// Terminate the process for `id` and clean up as for a failed exit.
    /// Returns false when nothing was tracked under `id`.
    pub fn kill(&mut self, id: &PropertyPath, host: &mut dyn SceneHost) -> bool {
        let Some(mut process) = self.processes.remove(id) else {
            debug!("No process to kill for {}", id);
            return false;
        };

        if let Err(e) = process.child.kill() {
            // Already exited
            debug!("Kill of {} process: {}", process.kind, e);
        }
        if let Err(e) = process.child.wait() {
            warn!("Failed to reap {} process: {}", process.kind, e);
        }
        process.drain_output(host);
        process.exit = Some(Exit::Killed);
        process.finalize(host);
        info!("Killed {} process for {}", process.kind, id);
        true
    }

    pub fn kill_all(&mut self, host: &mut dyn SceneHost) {
        let ids: Vec<PropertyPath> = self.processes.keys().cloned().collect();
        for id in ids {
            self.kill(&id, host);
        }
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn contains(&self, id: &PropertyPath) -> bool {
        self.processes.contains_key(id)
    }
}
