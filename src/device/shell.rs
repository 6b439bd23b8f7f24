// Host-side command execution for adb/hdc transports.
use tokio::process::Command;

use crate::errors::{SinanError, SinanResult};

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Runs `program args...` to completion and captures its output.
/// A non-zero exit is reported through `success`, not as an error.
pub async fn run(program: &str, args: &[&str]) -> SinanResult<CommandOutput> {
    tracing::trace!(program, ?args, "spawning");
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                SinanError::Device(format!("`{program}` not found on PATH"))
            }
            _ => SinanError::Io(e),
        })?;

    let result = CommandOutput {
        success: output.status.success(),
        stdout: output.stdout,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    };
    if !result.success {
        tracing::debug!(program, ?args, stderr = %result.stderr, "command exited non-zero");
    }
    Ok(result)
}

/// Like [`run`] but turns a non-zero exit into a device error.
pub async fn run_checked(program: &str, args: &[&str]) -> SinanResult<CommandOutput> {
    let output = run(program, args).await?;
    if output.success {
        Ok(output)
    } else {
        Err(SinanError::Device(format!(
            "{program} {} failed: {}",
            args.join(" "),
            output.stderr
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_is_a_device_error() {
        let err = run("sinan-definitely-not-installed", &["x"]).await.unwrap_err();
        assert!(matches!(err, SinanError::Device(_)), "got {err:?}");
    }
}
