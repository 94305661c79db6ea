// datastore-backup/src/utils/process.rs
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::errors::{AppError, Result};

/// Runs `cmd` to completion under a hard deadline and returns its output.
///
/// The child is killed if the deadline passes. A non-zero exit is reported as
/// `AppError::Command` carrying the captured stderr.
pub async fn run_with_timeout(mut cmd: Command, tool: &str, limit: Duration) -> Result<Output> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| AppError::Command {
        tool: tool.to_string(),
        stderr: format!("failed to start: {}", e),
    })?;
    debug!("Spawned {} (pid {:?}), deadline {}s", tool, child.id(), limit.as_secs());

    // Dropping the wait future on timeout drops the child, which kills it.
    let output = match timeout(limit, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(AppError::Timeout {
                tool: tool.to_string(),
                seconds: limit.as_secs(),
            });
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(AppError::Command {
            tool: tool.to_string(),
            stderr: if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            },
        });
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn successful_command_returns_output() -> Result<()> {
        let output = run_with_timeout(sh("echo ready"), "sh", Duration::from_secs(5)).await?;
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "ready");
        Ok(())
    }

    #[tokio::test]
    async fn non_zero_exit_captures_stderr() {
        let err = run_with_timeout(sh("echo 'connection refused' >&2; exit 3"), "sh", Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            AppError::Command { stderr, .. } => assert_eq!(stderr, "connection refused"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn deadline_expiry_is_a_timeout() {
        let err = run_with_timeout(sh("sleep 5"), "sh", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_binary_is_a_command_error() {
        let cmd = Command::new("/nonexistent/definitely-not-a-tool");
        let err = run_with_timeout(cmd, "ghost", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, AppError::Command { .. }));
    }
}
