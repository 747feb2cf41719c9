//! Per-job registry of running FFmpeg processes.
//!
//! Every process a job starts is spawned through its [`ProcessGroup`], so a
//! concurrent cancellation always sees it. Spawning and cancelling share one
//! lock: a process is either registered before the group is cancelled (and
//! gets signalled) or is refused with [`MediaError::Cancelled`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

#[derive(Debug, Default)]
struct GroupState {
    cancelled: bool,
    pids: HashSet<u32>,
}

/// Processes owned by one job.
#[derive(Debug, Clone, Default)]
pub struct ProcessGroup {
    inner: Arc<Mutex<GroupState>>,
}

impl ProcessGroup {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GroupState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn `command` and register its pid.
    pub fn spawn(&self, command: &mut Command) -> MediaResult<Child> {
        let mut state = self.lock();
        if state.cancelled {
            return Err(MediaError::Cancelled);
        }

        let child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MediaError::FfmpegNotFound
            } else {
                MediaError::Io(e)
            }
        })?;
        if let Some(pid) = child.id() {
            state.pids.insert(pid);
        }
        Ok(child)
    }

    /// Forget a process once it has exited.
    pub fn release(&self, pid: u32) {
        self.lock().pids.remove(&pid);
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    /// Number of registered processes still running.
    pub fn active(&self) -> usize {
        self.lock().pids.len()
    }

    /// Mark the group cancelled and send SIGTERM to every registered process.
    ///
    /// Returns the number of processes signalled. Safe to call repeatedly.
    pub fn terminate_all(&self) -> usize {
        let mut state = self.lock();
        state.cancelled = true;
        state.pids.iter().filter(|pid| send_terminate(**pid)).count()
    }

    /// Send SIGKILL to every process still registered.
    pub fn kill_remaining(&self) -> usize {
        let state = self.lock();
        state.pids.iter().filter(|pid| send_kill(**pid)).count()
    }
}

#[cfg(unix)]
fn signal(pid: u32, sig: nix::sys::signal::Signal) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };

    match kill(Pid::from_raw(raw), sig) {
        Ok(()) => {
            debug!(pid, signal = ?sig, "Signalled FFmpeg process");
            true
        }
        // Already exited
        Err(Errno::ESRCH) => false,
        Err(e) => {
            warn!(pid, signal = ?sig, "Failed to signal process: {}", e);
            false
        }
    }
}

#[cfg(unix)]
fn send_terminate(pid: u32) -> bool {
    signal(pid, nix::sys::signal::Signal::SIGTERM)
}

#[cfg(unix)]
fn send_kill(pid: u32) -> bool {
    signal(pid, nix::sys::signal::Signal::SIGKILL)
}

#[cfg(not(unix))]
fn send_terminate(pid: u32) -> bool {
    warn!(pid, "Graceful termination is not supported on this platform");
    false
}

#[cfg(not(unix))]
fn send_kill(pid: u32) -> bool {
    warn!(pid, "Forced termination is not supported on this platform");
    false
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::time::Duration;

    #[tokio::test]
    async fn test_terminate_signals_registered_process() {
        let group = ProcessGroup::new();
        let mut child = group.spawn(Command::new("sleep").arg("30")).unwrap();
        let pid = child.id().unwrap();
        assert_eq!(group.active(), 1);

        assert_eq!(group.terminate_all(), 1);
        let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.signal(), Some(nix::libc::SIGTERM));

        group.release(pid);
        assert_eq!(group.active(), 0);
        // Second cancel is a no-op
        assert_eq!(group.terminate_all(), 0);
    }

    #[tokio::test]
    async fn test_spawn_after_cancel_is_refused() {
        let group = ProcessGroup::new();
        group.terminate_all();
        let result = group.spawn(Command::new("sleep").arg("30"));
        assert!(matches!(result, Err(MediaError::Cancelled)));
        assert!(group.is_cancelled());
    }

    #[tokio::test]
    async fn test_kill_remaining_stops_process_ignoring_sigterm() {
        let group = ProcessGroup::new();
        let mut child = group
            .spawn(Command::new("sh").args(["-c", "trap '' TERM; sleep 5"]))
            .unwrap();
        // Give the shell time to install the trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        group.terminate_all();
        let still_running = tokio::time::timeout(Duration::from_millis(300), child.wait()).await;
        assert!(still_running.is_err());

        assert_eq!(group.kill_remaining(), 1);
        let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.signal(), Some(nix::libc::SIGKILL));
    }

    #[tokio::test]
    async fn test_signalling_exited_process_is_harmless() {
        let group = ProcessGroup::new();
        let mut child = group.spawn(&mut Command::new("true")).unwrap();
        child.wait().await.unwrap();
        assert_eq!(group.terminate_all(), 0);
        assert_eq!(group.kill_remaining(), 0);
    }
}
