use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

const STDERR_TAIL_LINES: usize = 5;

/// Captured output of a finished external tool.
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run an external tool to completion.
///
/// The child is killed when the returned future is dropped, so an abandoned
/// episode task never leaves a converter or recognizer running.
pub async fn run_tool<I, S>(program: &Path, args: I) -> Result<ToolOutput, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let name = program.display().to_string();
    log::debug!("Running {}", name);

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| format!("Failed to spawn {}: {}", name, e))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if !output.status.success() {
        return Err(format!(
            "{} failed with status: {}{}",
            name,
            output.status,
            stderr_suffix(&stderr)
        ));
    }

    Ok(ToolOutput { stdout, stderr })
}

fn stderr_suffix(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return String::new();
    }
    let tail = &lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..];
    format!(" ({})", tail.join(" | "))
}
