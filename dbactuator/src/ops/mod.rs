// Concrete operations exposed by the command surface

pub mod crypt;
pub mod mongodb;
pub mod mysql;
pub mod sys;

use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Command, Output};
use tracing::debug;

/// Run an external program to completion, failing on a non-zero exit status
///
/// `redacted` replaces the argument list in the log line when it carries secrets.
pub(crate) fn run_program(mut command: Command, redacted: Option<&str>) -> Result<Output> {
    let program = command.get_program().to_string_lossy().into_owned();
    match redacted {
        Some(shown) => debug!(program = %program, args = shown, "Running external program"),
        None => debug!(program = %program, args = ?command.get_args().collect::<Vec<_>>(), "Running external program"),
    }

    let output = command
        .output()
        .with_context(|| format!("Failed to start {}", program))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{} exited with {}: {}", program, output.status, stderr.trim());
    }
    Ok(output)
}

/// Fail unless `path` is an existing regular file
pub(crate) fn ensure_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        anyhow::bail!("{} not found", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_program_captures_stdout() {
        let mut command = Command::new("sh");
        command.arg("-c").arg("printf hello");
        let output = run_program(command, None).unwrap();
        assert_eq!(output.stdout, b"hello");
    }

    #[test]
    fn test_run_program_reports_exit_status_and_stderr() {
        let mut command = Command::new("sh");
        command.arg("-c").arg("echo broken >&2; exit 3");
        let err = run_program(command, Some("<hidden>")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("broken"));
        assert!(message.contains('3'));
    }

    #[test]
    fn test_ensure_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ensure_file(dir.path()).is_err());

        let file = dir.path().join("tool");
        std::fs::write(&file, b"#!/bin/sh\n").unwrap();
        assert!(ensure_file(&file).is_ok());
    }
}
