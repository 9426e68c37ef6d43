use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// How process trees are torn down on cancellation. Selected once from
/// configuration; the rest of the code never branches on the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KillStrategy {
    /// Signal the child's process group (unix). The child is spawned into
    /// its own group so yt-dlp's ffmpeg helpers die with it.
    ProcessGroup,
    /// `taskkill /pid <pid> /T /F` (windows).
    Taskkill,
}

impl KillStrategy {
    pub fn platform_default() -> Self {
        if cfg!(windows) {
            KillStrategy::Taskkill
        } else {
            KillStrategy::ProcessGroup
        }
    }
}

/// Live reference to a spawned external process. Holds the job's weak
/// back-reference data (url, prefix), never the job record itself.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub command: String,
    pub url: String,
    pub prefix: String,
    /// True once at least one meaningful progress signal was observed;
    /// distinguishes "stalled before any data" from "actively working".
    pub producing_output: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct Supervisor {
    strategy: KillStrategy,
}

const KILL_GRACE: Duration = Duration::from_millis(1000);

impl Supervisor {
    pub fn new(strategy: KillStrategy) -> Self {
        Self { strategy }
    }

    /// Spawns the external process with piped stdout/stderr. Never blocks;
    /// the caller owns the returned child and is responsible for reaping it.
    pub fn spawn(&self, program: &str, args: &[String]) -> std::io::Result<Child> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);
        cmd.spawn()
    }

    /// Forcefully kills the process and its descendant tree. Idempotent:
    /// terminating an already-dead process is not an error. Re-verifies
    /// death after a grace delay and retries the kill once; failures are
    /// logged, never propagated.
    pub async fn terminate(&self, handle: &ProcessHandle) {
        if handle.pid == 0 {
            // Signalling group 0 would hit our own process group.
            warn!("refusing to kill unknown pid 0");
            return;
        }
        info!(pid = handle.pid, "killing process tree");
        self.kill_tree(handle.pid);

        tokio::time::sleep(KILL_GRACE).await;
        if is_alive(handle.pid) {
            warn!(pid = handle.pid, "process still alive after kill, retrying");
            self.kill_tree(handle.pid);
        }
    }

    fn kill_tree(&self, pid: u32) {
        match self.strategy {
            KillStrategy::ProcessGroup => kill_process_group(pid),
            KillStrategy::Taskkill => taskkill(pid),
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    // The child was spawned with process_group(0), so its pid is the pgid.
    unsafe {
        libc::kill(-(pid as i32), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(pid: u32) {
    taskkill(pid)
}

fn taskkill(pid: u32) {
    let result = std::process::Command::new("taskkill")
        .args(["/pid", &pid.to_string(), "/T", "/F"])
        .output();
    if let Err(e) = result {
        warn!(pid, "taskkill failed: {e}");
    }
}

#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    // Signal 0 checks existence without delivering anything.
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
pub fn is_alive(pid: u32) -> bool {
    match std::process::Command::new("tasklist")
        .args(["/FI", &format!("PID eq {pid}"), "/NH"])
        .output()
    {
        Ok(out) => String::from_utf8_lossy(&out.stdout).contains(&pid.to_string()),
        Err(_) => false,
    }
}
