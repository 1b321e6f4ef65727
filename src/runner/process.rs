//! Process runner implementation
//!
//! Spawns the launcher directly (no shell), in its own process group, and bounds
//! its total lifetime. When the deadline passes, or the call fails or is
//! cancelled, the whole group is killed, so a runtime that forks helpers cannot
//! outlive the call.
//!
//! After a normal exit the group is left alone. The leader has been reaped by
//! then, and once the group is empty its id may be reused by an unrelated
//! process. Helpers still writing to the pipes keep the call waiting until the
//! deadline, so they are killed through the timeout path instead.

use async_trait::async_trait;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{CommandSpec, RunOutcome, RunStatus, Runner};
use crate::error::SandboxError;

/// Runner that executes the launcher as a supervised child process
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run a program, draining stdout/stderr while waiting for it to exit
    pub async fn execute(
        &self,
        cmd: &CommandSpec,
        timeout: Duration,
    ) -> Result<RunOutcome, SandboxError> {
        debug!(
            "Running {:?} with {} args (timeout {:?})",
            cmd.program,
            cmd.args.len(),
            timeout
        );

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| SandboxError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;
        let mut group = ProcessGroup::new(child.id());
        info!("Spawned {} (pid {:?})", cmd.program, child.id());

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let collected = tokio::time::timeout(
            timeout,
            collect(&mut child, stdout.as_mut(), stderr.as_mut()),
        )
        .await;

        // Close our ends of the pipes on every path
        drop(stdout);
        drop(stderr);

        match collected {
            Ok(Ok((status, out, err))) => {
                group.disarm();
                let status = run_status(status);
                debug!("{} finished: {:?}", cmd.program, status);
                Ok(RunOutcome {
                    status,
                    stdout: String::from_utf8_lossy(&out).into_owned(),
                    stderr: String::from_utf8_lossy(&err).into_owned(),
                })
            }
            Ok(Err(source)) => {
                terminate(&mut child, group.pgid).await;
                Err(SandboxError::Io {
                    program: cmd.program.clone(),
                    source,
                })
            }
            Err(_) => {
                warn!(
                    "{} exceeded {:?}, killing process group {:?}",
                    cmd.program, timeout, group.pgid
                );
                terminate(&mut child, group.pgid).await;
                Ok(RunOutcome::timed_out())
            }
        }
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn run(&self, cmd: &CommandSpec, timeout: Duration) -> Result<RunOutcome, SandboxError> {
        self.execute(cmd, timeout).await
    }
}

/// Wait for exit while reading both pipes, so neither can fill up and stall the child
async fn collect<O, E>(
    child: &mut Child,
    stdout: Option<&mut O>,
    stderr: Option<&mut E>,
) -> io::Result<(ExitStatus, Vec<u8>, Vec<u8>)>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut out = Vec::new();
    let mut err = Vec::new();

    let read_out = async {
        match stdout {
            Some(pipe) => pipe.read_to_end(&mut out).await.map(drop),
            None => Ok(()),
        }
    };
    let read_err = async {
        match stderr {
            Some(pipe) => pipe.read_to_end(&mut err).await.map(drop),
            None => Ok(()),
        }
    };

    let (status, (), ()) = tokio::try_join!(child.wait(), read_out, read_err)?;
    Ok((status, out, err))
}

fn run_status(status: ExitStatus) -> RunStatus {
    if let Some(code) = status.code() {
        return RunStatus::Exited(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return RunStatus::Signaled(signal);
        }
    }
    RunStatus::Exited(-1)
}

/// Kill the group, then kill and reap the direct child
async fn terminate(child: &mut Child, pgid: Option<u32>) {
    if let Some(pgid) = pgid {
        kill_process_group(pgid);
    }
    if let Err(e) = child.kill().await {
        debug!("Failed to kill child: {}", e);
    }
}

/// Process group of a spawned child; whatever is left of it is killed on drop,
/// including when the surrounding future is cancelled. Disarmed once the child
/// has exited and both pipes are closed.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid {
            kill_process_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        warn!("Process group id {} is out of range, not killing", pgid);
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to kill process group {}: {}", pgid, e),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}
