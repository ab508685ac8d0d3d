//! Shared plumbing for driving external tools.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use extracta_core::defaults::{DIAGNOSTIC_MAX_CHARS, OUTPUT_DRAIN_GRACE_MS};
use extracta_core::{Error, Result};

use crate::handler::ExecutionContext;

/// Build a command for `program` with piped output, in its own process group.
pub(crate) fn command(program: &str) -> Command {
    let mut cmd = Command::new(program);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

/// Spawn `cmd`, mapping failures to [`Error::ProcessLaunch`].
pub(crate) fn spawn(cmd: &mut Command, tool: &str) -> Result<Child> {
    cmd.spawn()
        .map_err(|e| Error::ProcessLaunch(format!("failed to start {tool}: {e}")))
}

/// SIGKILL every process left in the group led by `pid`.
///
/// `pid` must be taken right after spawn: a reaped child no longer reports it,
/// while its descendants may still hold the group (and the output pipes).
pub(crate) fn kill_group(pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        // SAFETY: plain syscall; the child leads its own group (process_group(0)).
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                debug!(pid, error = %err, "killpg failed");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

/// Kill the child and everything it spawned, then reap it.
pub(crate) async fn terminate(child: &mut Child, pid: Option<u32>) {
    kill_group(pid.or(child.id()));
    let _ = child.kill().await;
}

/// Await a pipe reader after its tool has exited.
///
/// Gives up after a short grace period, or with the stop reason once the
/// run is cancelled or past its deadline. `None` means the output was lost.
pub(crate) async fn drain<T>(
    reader: JoinHandle<T>,
    execution: &ExecutionContext,
) -> Result<Option<T>> {
    drain_within(reader, execution, Duration::from_millis(OUTPUT_DRAIN_GRACE_MS)).await
}

async fn drain_within<T>(
    reader: JoinHandle<T>,
    execution: &ExecutionContext,
    grace: Duration,
) -> Result<Option<T>> {
    let abort = reader.abort_handle();
    let drained = tokio::select! {
        joined = tokio::time::timeout(grace, reader) => match joined {
            Ok(joined) => Ok(joined.ok()),
            Err(_) => {
                debug!(grace_ms = grace.as_millis() as u64, "Output pipes still open after exit");
                Ok(None)
            }
        },
        reason = execution.done() => Err(reason),
    };
    abort.abort();
    drained
}

/// Last non-empty line of `output`, truncated for use in an error message.
pub fn compact_log_line(output: &str) -> Option<String> {
    let line = output.lines().map(str::trim).rfind(|l| !l.is_empty())?;
    if line.chars().count() > DIAGNOSTIC_MAX_CHARS {
        let truncated: String = line.chars().take(DIAGNOSTIC_MAX_CHARS).collect();
        Some(format!("{truncated}..."))
    } else {
        Some(line.to_string())
    }
}

/// Error for a tool that exited unsuccessfully.
pub(crate) fn execution_error(tool: &str, diagnostic: Option<String>, status: ExitStatus) -> Error {
    match diagnostic {
        Some(line) => Error::ProcessExecution(format!("{tool} failed: {line}")),
        None => Error::ProcessExecution(format!("{tool} failed ({status})")),
    }
}

/// Read a stream to the end, keeping only its last diagnostic line.
pub(crate) async fn last_line<R>(reader: R) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut last = None;
    while let Ok(Some(line)) = lines.next_line().await {
        if !line.trim().is_empty() {
            last = Some(line);
        }
    }
    last.and_then(|l| compact_log_line(&l))
}

/// Read two streams to the end, interleaving their lines as they arrive.
pub(crate) async fn collect_output<A, B>(stdout: A, stderr: B) -> String
where
    A: AsyncRead + Unpin,
    B: AsyncRead + Unpin,
{
    let mut out = BufReader::new(stdout).lines();
    let mut err = BufReader::new(stderr).lines();
    let (mut out_open, mut err_open) = (true, true);
    let mut combined = String::new();

    while out_open || err_open {
        tokio::select! {
            line = out.next_line(), if out_open => match line {
                Ok(Some(line)) => push_line(&mut combined, &line),
                _ => out_open = false,
            },
            line = err.next_line(), if err_open => match line {
                Ok(Some(line)) => push_line(&mut combined, &line),
                _ => err_open = false,
            },
        }
    }
    combined
}

fn push_line(buffer: &mut String, line: &str) {
    buffer.push_str(line);
    buffer.push('\n');
}
