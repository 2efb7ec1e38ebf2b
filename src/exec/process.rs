// src/exec/process.rs

//! Spawning and terminating task shells.
//!
//! On unix every shell leads its own process group (`setpgid(0, 0)` via
//! `process_group(0)`), so terminating a task reaches the programs the shell
//! started and not only the shell itself.

use tokio::process::{Child, Command};

/// Build a shell command appropriate for the platform.
#[cfg(unix)]
pub fn shell_command(cmd: &str) -> Command {
    let mut c = Command::new("sh");
    c.arg("-c").arg(cmd).process_group(0);
    c
}

/// Build a shell command appropriate for the platform.
#[cfg(not(unix))]
pub fn shell_command(cmd: &str) -> Command {
    let mut c = Command::new("cmd");
    c.arg("/C").arg(cmd);
    c
}

/// Kill a shell spawned by [`shell_command`] together with everything it
/// started, then reap the shell.
pub async fn kill_process_tree(child: &mut Child) -> std::io::Result<()> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        kill_process_group(pid);
    }
    child.kill().await
}

/// Kills the process group of a spawned shell when dropped.
///
/// Call [`ProcessGroupGuard::disarm`] once the shell has been waited on; the
/// pid may be reused after that.
#[derive(Debug)]
pub struct ProcessGroupGuard {
    pid: Option<u32>,
}

impl ProcessGroupGuard {
    pub fn new(child: &Child) -> Self {
        Self { pid: child.id() }
    }

    pub fn disarm(&mut self) {
        self.pid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid.take() {
            kill_process_group(pid);
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = i32::try_from(pid) else {
        return;
    };

    // SAFETY: a negative pid addresses the process group led by our own
    // child, which has not been reaped yet.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(
            pid,
            error = %std::io::Error::last_os_error(),
            "process group already gone"
        );
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn killing_the_shell_reaches_its_children() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("late");
        let mut child = shell_command(&format!("(sleep 1; touch '{}'); true", marker.display()))
            .spawn()
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        kill_process_tree(&mut child).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists(), "background work survived the kill");
    }

    #[tokio::test]
    async fn dropping_an_armed_guard_kills_the_group() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("late");
        let child = shell_command(&format!("sleep 1; touch '{}'", marker.display()))
            .kill_on_drop(true)
            .spawn()
            .unwrap();

        let guard = ProcessGroupGuard::new(&child);
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(guard);
        drop(child);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }
}
