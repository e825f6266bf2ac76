//! Child-process helpers: bounded captures for short queries and the
//! watchdog-supervised runner used for agent turns.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::types::TimeoutKind;
use crate::core::watchdog::{Escalation, Stage, WatchdogPolicy};

/// Exit code reported when the child could not be started.
pub const SPAWN_FAILURE_CODE: i32 = 127;

const READ_CHUNK: usize = 8192;
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Captured output of a short-lived command.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success() && !self.timed_out
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Spawn failures are returned as `io::Error` in the chain so callers can
/// tell a missing executable apart from a failing one.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs()))]
pub fn run_captured(mut cmd: Command, timeout: Duration) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            debug!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_to_end(stdout));
    let stderr_handle = thread::spawn(move || read_to_end(stderr));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let stdout = join_output(stdout_handle).context("join stdout")?;
    let stderr = join_output(stderr_handle).context("join stderr")?;

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

fn read_to_end<R: Read>(mut reader: R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).context("read output")?;
    Ok(buf)
}

fn join_output(handle: thread::JoinHandle<Result<Vec<u8>>>) -> Result<Vec<u8>> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// How a supervised turn is run.
#[derive(Debug, Clone)]
pub struct SupervisedRun {
    /// Truncated at start; receives every output byte plus watchdog diagnostics.
    pub log_path: PathBuf,
    pub policy: WatchdogPolicy,
    /// Also copy output to our stdout as it arrives.
    pub mirror_output: bool,
}

/// Result of a supervised turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisedExit {
    /// Exit code, or 0 when the platform reports none (signal death).
    pub code: i32,
    /// Set when the watchdog ended the turn.
    pub timeout: Option<TimeoutKind>,
}

impl SupervisedExit {
    pub fn exited(code: i32) -> Self {
        Self {
            code,
            timeout: None,
        }
    }

    /// A watchdog kill is never a success, whatever code the child reported.
    pub fn success(&self) -> bool {
        self.code == 0 && self.timeout.is_none()
    }
}

/// Turn log shared with the reader threads. `None` once the turn is over, so
/// readers detached from a previous turn drop their bytes.
type SharedLog = Arc<Mutex<Option<BufWriter<File>>>>;

/// Run `cmd` under the output/duration watchdog.
///
/// Never fails: a log that cannot be created reports code 1 and a spawn
/// failure reports [`SPAWN_FAILURE_CODE`] after writing the reason to the log.
#[instrument(skip_all, fields(log = %run.log_path.display()))]
pub fn run_supervised(mut cmd: Command, run: &SupervisedRun) -> SupervisedExit {
    let file = match File::create(&run.log_path) {
        Ok(file) => file,
        Err(err) => {
            error!(err = %err, "failed to create turn log");
            return SupervisedExit::exited(1);
        }
    };
    let log: SharedLog = Arc::new(Mutex::new(Some(BufWriter::new(file))));

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning supervised child");
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(err = %err, "failed to spawn agent");
            write_log_line(&log, &format!("[vibepup] failed to start agent: {err}"));
            close_log(&log);
            return SupervisedExit::exited(SPAWN_FAILURE_CODE);
        }
    };

    let started = Instant::now();
    let last_output = Arc::new(Mutex::new(started));
    let (done_tx, done_rx) = mpsc::channel();
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, &log, &last_output, run.mirror_output, done_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, &log, &last_output, run.mirror_output, done_tx.clone()));
    }
    drop(done_tx);

    let mut timeout = None;
    let mut escalation: Option<(Instant, Escalation)> = None;
    let waited = loop {
        let slice = escalation
            .as_ref()
            .and_then(|(fired, esc)| esc.next_due_in(fired.elapsed()))
            .map_or(run.policy.poll_interval, |due| due.min(run.policy.poll_interval));

        match child.wait_timeout(slice) {
            Ok(Some(status)) => break Ok(status),
            Ok(None) => {}
            Err(err) => {
                abandon_child(&mut child);
                break Err(err);
            }
        }

        if escalation.is_none() {
            let since_output = last_output
                .lock()
                .map(|at| at.elapsed())
                .unwrap_or_default();
            if let Some(kind) = run.policy.check(started.elapsed(), since_output) {
                warn!(?kind, "watchdog fired, stopping agent");
                write_log_line(&log, &diagnostic_line(kind, &run.policy));
                timeout = Some(kind);
                escalation = Some((Instant::now(), Escalation::new(&run.policy)));
            }
        }

        if let Some((fired, esc)) = escalation.as_mut() {
            for stage in esc.take_due(fired.elapsed()) {
                send_stage(&mut child, stage);
            }
        }
    };

    drain_readers(readers, &done_rx);
    close_log(&log);

    let code = match waited {
        Ok(status) => status.code().unwrap_or(0),
        Err(err) => {
            error!(err = %err, "failed to wait for agent");
            1
        }
    };
    debug!(code, ?timeout, elapsed_ms = started.elapsed().as_millis() as u64, "supervised child finished");
    SupervisedExit { code, timeout }
}

/// Best-effort kill and reap once the child can no longer be waited on, so
/// it does not outlive the turn.
fn abandon_child(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!(err = %err, "kill after failed wait");
    }
    if let Err(err) = child.try_wait() {
        debug!(err = %err, "reap after failed wait");
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    mut reader: R,
    log: &SharedLog,
    last_output: &Arc<Mutex<Instant>>,
    mirror: bool,
    done: Sender<()>,
) -> thread::JoinHandle<()> {
    let log = Arc::clone(log);
    let last_output = Arc::clone(last_output);
    thread::spawn(move || {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let n = match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(err = %err, "agent output read failed");
                    break;
                }
            };
            if let Ok(mut at) = last_output.lock() {
                *at = Instant::now();
            }
            if let Ok(mut guard) = log.lock()
                && let Some(writer) = guard.as_mut()
                && let Err(err) = writer.write_all(&chunk[..n]).and_then(|()| writer.flush())
            {
                warn!(err = %err, "failed to write turn log");
            }
            if mirror {
                let mut stdout = io::stdout().lock();
                if let Err(err) = stdout.write_all(&chunk[..n]).and_then(|()| stdout.flush()) {
                    debug!(err = %err, "failed to mirror agent output");
                }
            }
        }
        let _ = done.send(());
    })
}

/// Wait for readers to hit EOF. Descendants that inherited the pipes can
/// keep them open after the child exits, so readers still running after the
/// grace period are detached.
fn drain_readers(readers: Vec<thread::JoinHandle<()>>, done: &Receiver<()>) {
    let deadline = Instant::now() + DRAIN_GRACE;
    let mut finished = 0;
    while finished < readers.len() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match done.recv_timeout(remaining) {
            Ok(()) => finished += 1,
            Err(_) => break,
        }
    }
    if finished < readers.len() {
        warn!(
            pending = readers.len() - finished,
            "output pipes still open after exit, detaching readers"
        );
        return;
    }
    for reader in readers {
        let _ = reader.join();
    }
}

fn diagnostic_line(kind: TimeoutKind, policy: &WatchdogPolicy) -> String {
    match kind {
        TimeoutKind::NoOutput => format!(
            "[vibepup] NO OUTPUT: silent for {}s, likely waiting for input / hung tool",
            policy.no_output_timeout.as_secs()
        ),
        TimeoutKind::MaxDuration => format!(
            "[vibepup] TIMEOUT: turn exceeded {}s, killing agent",
            policy.max_duration.as_secs()
        ),
    }
}

fn write_log_line(log: &SharedLog, line: &str) {
    if let Ok(mut guard) = log.lock()
        && let Some(writer) = guard.as_mut()
        && let Err(err) = writeln!(writer, "{line}").and_then(|()| writer.flush())
    {
        warn!(err = %err, "failed to write turn log");
    }
}

/// Flush and drop the writer; later writes from detached readers are discarded.
fn close_log(log: &SharedLog) {
    let writer = match log.lock() {
        Ok(mut guard) => guard.take(),
        Err(_) => return,
    };
    if let Some(mut writer) = writer
        && let Err(err) = writer.flush()
    {
        warn!(err = %err, "failed to flush turn log");
    }
}

#[cfg(unix)]
fn send_stage(child: &mut Child, stage: Stage) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let signal = match stage {
        Stage::Interrupt => Signal::SIGINT,
        Stage::Terminate => Signal::SIGTERM,
        Stage::Kill => Signal::SIGKILL,
    };
    let Ok(raw) = i32::try_from(child.id()) else {
        warn!(pid = child.id(), "pid out of range, cannot signal");
        return;
    };
    match kill(Pid::from_raw(raw), signal) {
        Ok(()) => debug!(?signal, pid = raw, "signalled agent"),
        Err(Errno::ESRCH) => debug!(?signal, "agent already gone"),
        Err(err) => warn!(?signal, err = %err, "failed to signal agent"),
    }
}

#[cfg(not(unix))]
fn send_stage(child: &mut Child, stage: Stage) {
    // Only a hard kill is available here.
    if stage == Stage::Kill
        && let Err(err) = child.kill()
    {
        warn!(err = %err, "failed to kill agent");
    }
}
