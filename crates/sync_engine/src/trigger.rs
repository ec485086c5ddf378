//! Remote Trigger
//!
//! Starts the acquisition run on the device over a command channel. The
//! artifact directory is emptied in the same command so markers left over
//! from a previous run can never be mistaken for new ones. Output lines are
//! forwarded to tracing under the `remote` target while the run is alive.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::error::{Result, SyncError};

/// Login material for the command channel
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub user: String,
    pub identity_file: Option<PathBuf>,
    pub port: Option<u16>,
}

/// Builds the process that executes a command on the device
pub trait CommandChannel: Send + Sync {
    /// Channel name (used for logging)
    fn name(&self) -> &str;

    /// Process running `command` on `host`
    fn build(&self, host: &str, credentials: &Credentials, command: &str) -> Command;
}

/// System `ssh` client
#[derive(Debug, Clone, Default)]
pub struct SshChannel;

impl CommandChannel for SshChannel {
    fn name(&self) -> &str {
        "ssh"
    }

    fn build(&self, host: &str, credentials: &Credentials, command: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("ServerAliveInterval=1");
        if let Some(port) = credentials.port {
            cmd.arg("-p").arg(port.to_string());
        }
        if let Some(identity) = &credentials.identity_file {
            cmd.arg("-i").arg(identity);
        }
        let target = if credentials.user.is_empty() {
            host.to_string()
        } else {
            format!("{}@{}", credentials.user, host)
        };
        cmd.arg(target).arg(command);
        cmd
    }
}

/// Local `sh -c`, for dry runs and tests
#[derive(Debug, Clone, Default)]
pub struct LocalShell;

impl CommandChannel for LocalShell {
    fn name(&self) -> &str {
        "local"
    }

    fn build(&self, _host: &str, _credentials: &Credentials, command: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

/// Exit information of a finished run
#[derive(Debug, Clone, Default)]
pub struct RunExit {
    /// Process exit code (`None` when killed by a signal)
    pub code: Option<i32>,
    /// Whether the run succeeded
    pub success: bool,
    /// Output lines forwarded to the log
    pub lines: usize,
}

/// Handle to a running remote acquisition
///
/// Dropping the handle kills the remote session.
pub struct RunHandle {
    task: Option<JoinHandle<Result<RunExit>>>,
}

impl RunHandle {
    /// Wrap an in-process run (simulated device, tests)
    pub fn from_future<F>(run: F) -> Self
    where
        F: Future<Output = Result<RunExit>> + Send + 'static,
    {
        Self {
            task: Some(tokio::spawn(run)),
        }
    }

    /// Non-blocking liveness check
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Wait for the run to end
    pub async fn wait(mut self) -> Result<RunExit> {
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| SyncError::trigger("remote", format!("run task failed: {e}")))?,
            None => Ok(RunExit::default()),
        }
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Remote Trigger
pub struct RemoteTrigger<C> {
    channel: C,
    artifact_dir: PathBuf,
}

impl<C: CommandChannel> RemoteTrigger<C> {
    /// Create a trigger clearing `artifact_dir` before every run
    pub fn new(channel: C, artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            channel,
            artifact_dir: artifact_dir.into(),
        }
    }

    /// Full command executed on the device
    pub fn compose_command(&self, launch_command: &str) -> String {
        compose_command(&self.artifact_dir, launch_command)
    }

    /// Start `launch_command` on `host`
    ///
    /// # Errors
    /// Returns `SyncError::Trigger` if the channel process cannot be spawned.
    #[instrument(
        name = "remote_trigger_start",
        skip(self, credentials, launch_command),
        fields(channel = self.channel.name(), host = %host)
    )]
    pub fn start_run(
        &self,
        host: &str,
        credentials: &Credentials,
        launch_command: &str,
    ) -> Result<RunHandle> {
        let command = self.compose_command(launch_command);
        let mut child = self
            .channel
            .build(host, credentials, &command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SyncError::trigger(host, e.to_string()))?;

        info!(command = %command, "Remote run started");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let task = tokio::spawn(async move {
            let (out_lines, err_lines) = tokio::join!(
                forward_lines(stdout, "stdout"),
                forward_lines(stderr, "stderr")
            );
            let status = child.wait().await?;
            let exit = RunExit {
                code: status.code(),
                success: status.success(),
                lines: out_lines + err_lines,
            };
            if exit.success {
                info!(lines = exit.lines, "Remote run finished");
            } else {
                warn!(code = ?exit.code, "Remote run exited with failure");
            }
            Ok(exit)
        });

        Ok(RunHandle { task: Some(task) })
    }
}

/// `rm -f '<dir>'/*; <launch>`
pub fn compose_command(artifact_dir: &Path, launch_command: &str) -> String {
    let dir = artifact_dir.to_string_lossy();
    let dir = dir.trim_end_matches('/');
    format!("rm -f {}/*; {}", shell_quote(dir), launch_command)
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

async fn forward_lines<R>(stream: Option<R>, stream_name: &'static str) -> usize
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return 0;
    };

    let mut lines = BufReader::new(stream).lines();
    let mut count = 0;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                count += 1;
                info!(target: "remote", stream = stream_name, "{}", line);
            }
            Ok(None) => break,
            Err(e) => {
                warn!(target: "remote", stream = stream_name, error = %e, "Output stream error");
                break;
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_compose_command_clears_directory_first() {
        let cmd = compose_command(Path::new("/var/www/fpm_data/"), "fpm-sync acquire");
        assert_eq!(cmd, "rm -f '/var/www/fpm_data'/*; fpm-sync acquire");

        let quoted = compose_command(Path::new("/tmp/it's"), "run");
        assert_eq!(quoted, r"rm -f '/tmp/it'\''s'/*; run");
    }

    #[test]
    fn test_ssh_arguments() {
        let credentials = Credentials {
            user: "pi".into(),
            identity_file: Some(PathBuf::from("/home/me/.ssh/id_fpm")),
            port: Some(2222),
        };
        let cmd = SshChannel.build("fpmscope.local", &credentials, "echo hi");
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-o",
                "BatchMode=yes",
                "-o",
                "ServerAliveInterval=1",
                "-p",
                "2222",
                "-i",
                "/home/me/.ssh/id_fpm",
                "pi@fpmscope.local",
                "echo hi"
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_run_clears_stale_files_and_reports_exit() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("img0_1000us.done"), b"").unwrap();

        let trigger = RemoteTrigger::new(LocalShell, dir.path());
        let handle = trigger
            .start_run("localhost", &Credentials::default(), "echo one; echo two >&2; sleep 0.1")
            .unwrap();
        assert!(handle.is_running());

        let exit = handle.wait().await.unwrap();
        assert!(exit.success);
        assert_eq!(exit.code, Some(0));
        assert_eq!(exit.lines, 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_run_reports_code() {
        let dir = tempdir().unwrap();
        let trigger = RemoteTrigger::new(LocalShell, dir.path());
        let handle = trigger
            .start_run("localhost", &Credentials::default(), "exit 7")
            .unwrap();
        let exit = handle.wait().await.unwrap();
        assert!(!exit.success);
        assert_eq!(exit.code, Some(7));
    }

    #[tokio::test]
    async fn test_in_process_run_handle() {
        let handle = RunHandle::from_future(async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(RunExit {
                code: Some(0),
                success: true,
                lines: 0,
            })
        });
        assert!(handle.is_running());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!handle.is_running());
        assert!(handle.wait().await.unwrap().success);
    }
}
