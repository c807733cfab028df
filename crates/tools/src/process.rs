//! Shell process runner with a timeout and capped output capture.

use crate::error::ToolError;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::{timeout, Duration, Instant};

/// How long to keep draining pipes after the child has been killed.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub command: String,
    pub cwd: PathBuf,
    pub timeout_ms: u64,
    pub max_output_bytes: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub truncated: bool,
    pub duration_ms: u64,
}

impl ProcessOutput {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Kills the child's whole process group if dropped while still armed, so
/// a cancelled or timed-out command takes its descendants with it.
struct ProcessGroupGuard {
    pid: Option<u32>,
}

impl ProcessGroupGuard {
    fn kill(&mut self) {
        #[cfg(unix)]
        {
            if let Some(pid) = self.pid.take() {
                // The child called setsid, so its pid is also its group id.
                unsafe {
                    libc::killpg(pid as libc::pid_t, libc::SIGKILL);
                }
            }
        }
        #[cfg(not(unix))]
        {
            self.pid = None;
        }
    }

    fn disarm(&mut self) {
        self.pid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Run `sh -c <command>` in `cwd`.
pub async fn run_shell(spec: &ProcessSpec) -> Result<ProcessOutput, ToolError> {
    let started = Instant::now();

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&spec.command)
        .current_dir(&spec.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // New session so the whole tree can be killed together
    #[cfg(unix)]
    {
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| ToolError::Execution(format!("Failed to spawn shell: {}", e)))?;
    let mut group = ProcessGroupGuard { pid: child.id() };

    let limit = spec.max_output_bytes;
    let stdout = child
        .stdout
        .take()
        .map(|out| tokio::spawn(read_capped(out, limit)));
    let stderr = child
        .stderr
        .take()
        .map(|err| tokio::spawn(read_capped(err, limit)));

    let (exit_code, timed_out) =
        match timeout(Duration::from_millis(spec.timeout_ms), child.wait()).await {
            Ok(status) => {
                let status =
                    status.map_err(|e| ToolError::Execution(format!("Failed to wait: {}", e)))?;
                group.disarm();
                (status.code(), false)
            }
            Err(_) => {
                tracing::warn!(command = %spec.command, timeout_ms = spec.timeout_ms, "Command timed out");
                group.kill();
                let _ = child.kill().await;
                (None, true)
            }
        };

    let (stdout, out_truncated) = collect(stdout).await;
    let (stderr, err_truncated) = collect(stderr).await;

    Ok(ProcessOutput {
        exit_code,
        stdout,
        stderr,
        timed_out,
        truncated: out_truncated || err_truncated,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}

async fn collect(handle: Option<tokio::task::JoinHandle<(Vec<u8>, bool)>>) -> (String, bool) {
    let Some(handle) = handle else {
        return (String::new(), false);
    };
    match timeout(DRAIN_GRACE, handle).await {
        Ok(Ok((bytes, truncated))) => (String::from_utf8_lossy(&bytes).into_owned(), truncated),
        _ => (String::new(), false),
    }
}

/// Read a stream to the end, keeping at most `limit` bytes.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> (Vec<u8>, bool) {
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = limit.saturating_sub(kept.len());
                if n > room {
                    truncated = true;
                }
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }
    (kept, truncated)
}
