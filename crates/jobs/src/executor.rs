//! Process execution for a single job.
//!
//! [`run`] is spawned once per submitted job. It waits for a concurrency
//! slot when the registry is bounded, spawns the command, streams each
//! stdout/stderr line into the registry, and reports the exit as soon as
//! the process is reaped. Spawn, read and wait failures are recorded on
//! the job, never returned to the submitter.

use std::collections::BTreeMap;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use refinery_core::log_buffer::LogStream;
use refinery_core::types::JobId;
use tokio::io::AsyncRead;
use tokio::process::Command;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, FramedRead};

use crate::registry::JobRegistry;

/// Longest output line kept, in bytes; the rest of the line is dropped.
pub(crate) const MAX_LINE_BYTES: usize = 16 * 1024;

/// How long output may keep flowing after the process has exited.
const OUTPUT_DRAIN: Duration = Duration::from_secs(1);

/// What the executor needs to launch a job.
#[derive(Debug, Clone)]
pub(crate) struct LaunchSpec {
    pub command: Vec<String>,
    pub cwd: String,
    pub env: BTreeMap<String, String>,
}

/// Concurrency slot handed from `submit` to the executor task.
pub(crate) enum Slot {
    /// No limit configured.
    Unlimited,
    /// A permit was free at submission time.
    Ready(OwnedSemaphorePermit),
    /// All permits were taken; wait on the semaphore.
    Pending(Arc<Semaphore>),
}

/// Drive one job from `queued` to a terminal status.
pub(crate) async fn run(registry: Arc<JobRegistry>, job_id: JobId, slot: Slot) {
    // Held until the process has exited.
    let _permit = match slot {
        Slot::Unlimited => None,
        Slot::Ready(permit) => Some(permit),
        Slot::Pending(semaphore) => {
            tracing::debug!(job_id = %job_id, "Waiting for a free job slot");
            semaphore.acquire_owned().await.ok()
        }
    };

    let Some(spec) = registry.launch_spec(&job_id) else {
        tracing::error!(job_id = %job_id, "Job vanished before launch");
        return;
    };

    let Some((program, args)) = spec.command.split_first() else {
        registry.mark_started(&job_id, None);
        fail(&registry, &job_id, "command is empty".to_string());
        return;
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(&spec.cwd)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            registry.mark_started(&job_id, None);
            fail(&registry, &job_id, format!("failed to spawn '{program}': {e}"));
            return;
        }
    };

    registry.mark_started(&job_id, child.id());

    let pumps = vec![
        tokio::spawn(pump(
            Arc::clone(&registry),
            job_id.clone(),
            LogStream::Stdout,
            child.stdout.take(),
        )),
        tokio::spawn(pump(
            Arc::clone(&registry),
            job_id.clone(),
            LogStream::Stderr,
            child.stderr.take(),
        )),
    ];

    let status = child.wait().await;
    drain(&job_id, pumps).await;

    match status {
        Ok(status) => {
            let (exit_code, signal) = exit_parts(status);
            registry.finish(&job_id, exit_code, signal, None);
        }
        Err(e) => fail(&registry, &job_id, format!("failed to wait for process: {e}")),
    }
}

/// Record an execution failure: `error` event, then `finished` as failed.
fn fail(registry: &JobRegistry, job_id: &str, message: String) {
    tracing::warn!(job_id, error = %message, "Job failed to run");
    registry.report_error(job_id, &message);
    registry.finish(job_id, None, None, Some(message));
}

/// Let the output pumps catch up after the process exited.
///
/// Pipes inherited by a backgrounded grandchild stay open past the exit,
/// so reading stops after [`OUTPUT_DRAIN`]. Aborted pumps are awaited so
/// no log line can land after `finished`.
async fn drain(job_id: &str, pumps: Vec<JoinHandle<()>>) {
    let deadline = Instant::now() + OUTPUT_DRAIN;
    for mut handle in pumps {
        if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
            tracing::debug!(job_id, "Output still open after exit, detaching");
            handle.abort();
            let _ = handle.await;
        }
    }
}

/// Forward every line of `reader` into the job's log.
///
/// Blank lines are kept. A read failure is reported on the job as an
/// `error` event; the job still finishes with the process exit.
async fn pump<R>(registry: Arc<JobRegistry>, job_id: JobId, stream: LogStream, reader: Option<R>)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };
    let mut lines = FramedRead::new(reader, OutputLineCodec::new(MAX_LINE_BYTES));
    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => registry.append_log(&job_id, stream, line),
            Err(e) => {
                tracing::warn!(
                    job_id = %job_id,
                    stream = stream.as_str(),
                    error = %e,
                    "Failed reading process output"
                );
                registry.report_error(
                    &job_id,
                    &format!("failed reading {}: {e}", stream.as_str()),
                );
                break;
            }
        }
    }
}

/// Newline-delimited output decoder with a hard per-line byte cap.
///
/// A line longer than the cap yields its first `max_len` bytes (marked
/// with a trailing `…`) and the remainder up to the next newline is
/// dropped, so the read buffer never holds more than one capped line.
#[derive(Debug)]
pub(crate) struct OutputLineCodec {
    max_len: usize,
    /// Bytes already searched for a newline.
    scanned: usize,
    /// Skipping the tail of an oversized line.
    discarding: bool,
}

impl OutputLineCodec {
    pub(crate) fn new(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(1),
            scanned: 0,
            discarding: false,
        }
    }
}

impl Decoder for OutputLineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        loop {
            let newline = src[self.scanned..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|i| i + self.scanned);

            match (self.discarding, newline) {
                (true, Some(i)) => {
                    src.advance(i + 1);
                    self.scanned = 0;
                    self.discarding = false;
                }
                (true, None) => {
                    src.advance(src.len());
                    self.scanned = 0;
                    return Ok(None);
                }
                (false, Some(i)) => {
                    let raw = src.split_to(i + 1);
                    self.scanned = 0;
                    return Ok(Some(decode_line(&raw, self.max_len)));
                }
                (false, None) if src.len() > self.max_len => {
                    let raw = src.split_to(src.len());
                    self.scanned = 0;
                    self.discarding = true;
                    return Ok(Some(decode_line(&raw, self.max_len)));
                }
                (false, None) => {
                    self.scanned = src.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        self.scanned = 0;
        if src.is_empty() {
            return Ok(None);
        }
        let raw = src.split_to(src.len());
        Ok(Some(decode_line(&raw, self.max_len)))
    }
}

/// Strip the line terminator, cap at `max_len` bytes, and decode lossily.
fn decode_line(raw: &[u8], max_len: usize) -> String {
    let mut end = raw.len();
    while end > 0 && matches!(raw[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    if end <= max_len {
        return String::from_utf8_lossy(&raw[..end]).into_owned();
    }
    let mut cut = String::from_utf8_lossy(&raw[..max_len]).into_owned();
    cut.push('…');
    cut
}

fn exit_parts(status: ExitStatus) -> (Option<i32>, Option<String>) {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        (status.code(), status.signal().map(signal_name))
    }
    #[cfg(not(unix))]
    {
        (status.code(), None)
    }
}

#[cfg(unix)]
fn signal_name(signal: i32) -> String {
    match signal {
        1 => "SIGHUP".to_string(),
        2 => "SIGINT".to_string(),
        3 => "SIGQUIT".to_string(),
        6 => "SIGABRT".to_string(),
        9 => "SIGKILL".to_string(),
        11 => "SIGSEGV".to_string(),
        13 => "SIGPIPE".to_string(),
        14 => "SIGALRM".to_string(),
        15 => "SIGTERM".to_string(),
        other => format!("SIG{other}"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
