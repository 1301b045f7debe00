use std::time::Duration;

use anyhow::{bail, Context, Result as AnyhowResult};
use tokio::process::Command;

/// Run a command with a timeout, returning its output.
pub async fn run_cmd_timeout(
    cmd: &mut Command,
    timeout: Duration,
) -> AnyhowResult<std::process::Output> {
    cmd.kill_on_drop(true);
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => result.context("subprocess failed to execute"),
        Err(_) => bail!("subprocess timed out after {}ms", timeout.as_millis()),
    }
}

/// Run a command and return its trimmed stdout, failing on a non-zero exit.
pub async fn run_cmd_stdout(cmd: &mut Command, timeout: Duration) -> AnyhowResult<String> {
    let output = run_cmd_timeout(cmd, timeout).await?;
    if !output.status.success() {
        bail!(
            "subprocess exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
