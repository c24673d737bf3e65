//! Trusted local execution: run a host shell command.

use std::path::Path;

use tokio::process::Command;
use tracing::info;

use crate::error::{BridgeError, BridgeResult};

/// Run `cmd` through the platform shell in `cwd`. Success yields trimmed
/// stdout followed by stderr; a non-zero exit yields the command and its
/// stderr as the error.
pub async fn run(cmd: &str, cwd: &Path) -> BridgeResult<String> {
    let cmd = cmd.trim();
    info!(command = cmd, "running shell escape");
    let output = shell_command(cmd)
        .current_dir(cwd)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| BridgeError::Execution(e.to_string()))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if output.status.success() {
        Ok(format!("{stdout}{stderr}").trim().to_string())
    } else {
        Err(BridgeError::Execution(
            format!("Command failed: {cmd}\n{stderr}").trim_end().to_string(),
        ))
    }
}

fn shell_command(cmd: &str) -> Command {
    if cfg!(windows) {
        // PSModulePath is only set inside PowerShell sessions
        let prefer_ps = !std::env::var("PSModulePath").unwrap_or_default().is_empty();
        if prefer_ps {
            let mut c = Command::new("powershell.exe");
            c.args(["-NoLogo", "-NoProfile", "-Command", cmd]);
            c
        } else {
            let mut c = Command::new("cmd.exe");
            c.args(["/c", cmd]);
            c
        }
    } else {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".into());
        let mut c = Command::new(shell);
        c.arg("-c").arg(cmd);
        c
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stdout_and_stderr_are_joined() {
        let dir = tempfile::tempdir().unwrap();
        let out = run("echo out; echo err 1>&2", dir.path()).await.unwrap();
        assert_eq!(out, "out\nerr");
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let out = run("ls", dir.path()).await.unwrap();
        assert_eq!(out, "marker.txt");
    }

    #[tokio::test]
    async fn test_failure_reports_command() {
        let dir = tempfile::tempdir().unwrap();
        let err = run("exit 3", dir.path()).await.unwrap_err();
        assert!(err.to_string().starts_with("Command failed: exit 3"), "got: {err}");
    }
}
