//! External command execution.
//!
//! Collaborators such as the stylesheet preprocessor are driven as child
//! processes: input on stdin, result on stdout, diagnostics on stderr.

use anyhow::{Context, Result, bail};
use std::{
    ffi::OsString,
    io::Write,
    path::Path,
    process::{Command, Stdio},
    thread,
};

/// Run `cmd` with extra `args`, feed `input` on stdin and return stdout.
///
/// Stdin is written from a helper thread so a child that streams output
/// while still reading input cannot deadlock on a full pipe.
///
/// # Errors
/// Fails if the command cannot be spawned or exits with a non-zero status;
/// the error carries the command's stderr.
pub fn run_with_stdin(
    root: Option<&Path>,
    cmd: &[String],
    args: &[OsString],
    input: &[u8],
) -> Result<Vec<u8>> {
    let (name, mut command) = prepare(root, cmd, args)?;

    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn `{name}`"))?;

    let mut stdin = child.stdin.take().context("Failed to acquire stdin")?;
    let input = input.to_vec();
    let writer = thread::spawn(move || stdin.write_all(&input));

    let output = child
        .wait_with_output()
        .with_context(|| format!("`{name}` did not finish"))?;
    // A child that exits early closes the pipe; its status tells the story.
    let _ = writer.join();

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("`{name}` exited with {}: {}", output.status, stderr.trim());
    }
    Ok(output.stdout)
}

/// Check that the first element of `cmd` resolves to an executable.
pub fn is_installed(cmd: &[String]) -> bool {
    cmd.first().is_some_and(|bin| which::which(bin).is_ok())
}

/// Prepare a Command from components.
fn prepare(root: Option<&Path>, cmd: &[String], args: &[OsString]) -> Result<(String, Command)> {
    let Some((bin, fixed)) = cmd.split_first() else {
        bail!("Empty command");
    };

    let mut command = Command::new(bin);
    command.args(fixed).args(args);
    if let Some(dir) = root {
        command.current_dir(dir);
    }
    Ok((bin.clone(), command))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn cmd(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn test_run_with_stdin_roundtrip() {
        let out = run_with_stdin(None, &cmd(&["cat"]), &[], b"a { b: c }").unwrap();
        assert_eq!(out, b"a { b: c }");
    }

    #[test]
    fn test_run_with_stdin_nonzero_exit() {
        let err = run_with_stdin(None, &cmd(&["sh", "-c", "echo broken >&2; exit 3"]), &[], b"")
            .unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_empty_command() {
        assert!(run_with_stdin(None, &[], &[], b"").is_err());
        assert!(!is_installed(&[]));
    }
}
