//! Synchronous external command execution.
//!
//! [`Cmd`] builds a command line, a [`CommandRunner`] executes it and hands
//! back captured output. Everything blocks until the child exits; there is no
//! timeout. The only early cancellation is [`CommandRunner::peek_lines`],
//! which stops reading after a fixed number of lines and kills the child.
//!
//! # Example
//!
//! ```rust,ignore
//! use treepack::process::Cmd;
//!
//! let listing = Cmd::new("tar")
//!     .args(["--list", "--file"])
//!     .arg_path(Path::new("pkg.tar.gz"))
//!     .error_msg("listing failed")
//!     .run()?;
//! for line in listing.lines() {
//!     println!("{line}");
//! }
//! ```

use std::ffi::{OsStr, OsString};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use crate::error::{ArchiveError, Result};

/// A command line to run, built up fluently.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: PathBuf,
    args: Vec<OsString>,
    error_msg: Option<String>,
}

/// Captured outcome of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdResult {
    /// Exit code; `None` when the child was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Outcome of a [`CommandRunner::peek_lines`] request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Peek {
    pub lines: Vec<String>,
    /// Set when the child exited on its own before `max_lines` were read;
    /// `None` when it was cancelled.
    pub exit: Option<CmdResult>,
}

impl Cmd {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: PathBuf::from(program.as_ref()),
            args: Vec::new(),
            error_msg: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.as_os_str())
    }

    /// Context prepended to the captured output when the command fails.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    pub fn arg_list(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// Shell-like rendering for messages.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.arg_list());
        parts.join(" ")
    }

    /// Run with the host process runner.
    pub fn run(&self) -> Result<CmdResult> {
        self.run_with(&SystemRunner)
    }

    /// Run with `runner`, failing on a non-zero exit.
    pub fn run_with(&self, runner: &dyn CommandRunner) -> Result<CmdResult> {
        let result = runner.run(self)?;
        self.check(result)
    }

    pub(crate) fn check(&self, result: CmdResult) -> Result<CmdResult> {
        if result.success() {
            return Ok(result);
        }
        let mut output = result.combined();
        if let Some(msg) = &self.error_msg {
            output = format!("{msg}\n{output}");
        }
        Err(ArchiveError::ToolFailed {
            command: self.display(),
            code: result.code.unwrap_or(-1),
            output: output.trim_end().to_string(),
        })
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl CmdResult {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Standard output followed by standard error.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }

    /// Non-empty lines of the combined output.
    pub fn lines(&self) -> Vec<String> {
        self.combined()
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Executes [`Cmd`]s. The seam between codecs and the host.
pub trait CommandRunner {
    /// Run to completion, capturing output. Exit status is reported, not
    /// judged.
    fn run(&self, cmd: &Cmd) -> Result<CmdResult>;

    /// Read at most `max_lines` lines of standard output, then cancel the
    /// command.
    fn peek_lines(&self, cmd: &Cmd, max_lines: usize) -> Result<Peek>;
}

/// Runs commands as host child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &Cmd) -> Result<CmdResult> {
        log::debug!("running {}", cmd.display());
        let output = cmd.to_command().output()?;
        Ok(CmdResult {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn peek_lines(&self, cmd: &Cmd, max_lines: usize) -> Result<Peek> {
        log::debug!("peeking {} line(s) of {}", max_lines, cmd.display());
        let mut child = cmd
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "child stdout unavailable"))?;
        // Drained concurrently so a chatty stderr cannot block the child.
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                pipe.read_to_end(&mut buf).map(|_| buf)
            })
        });

        let mut lines = Vec::new();
        for line in BufReader::new(stdout).lines().take(max_lines) {
            lines.push(line?);
        }

        if lines.len() == max_lines {
            // Enough read: the rest of the listing is not needed.
            let _ = child.kill();
            let _ = child.wait();
            return Ok(Peek { lines, exit: None });
        }

        let status = child.wait()?;
        let stderr = match stderr {
            Some(reader) => reader
                .join()
                .map_err(|_| io::Error::other("stderr reader panicked"))??,
            None => Vec::new(),
        };
        let exit = CmdResult {
            code: status.code(),
            stdout: lines.join("\n"),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        };
        Ok(Peek {
            lines,
            exit: Some(exit),
        })
    }
}

/// Locate `program` on `PATH`.
pub fn find_program(program: &str) -> Result<PathBuf> {
    which::which(program).map_err(|source| ArchiveError::ToolNotFound {
        program: program.to_string(),
        source,
    })
}

/// Fail with `NotFound` when `path` does not exist.
pub fn ensure_exists(path: &Path, what: &str) -> io::Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} not found: {}", what, path.display()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn builder_renders_command_line() {
        let cmd = Cmd::new("tar")
            .arg("--list")
            .args(["--file", "a.tar"])
            .arg_path(Path::new("/tmp/b"));
        assert_eq!(cmd.display(), "tar --list --file a.tar /tmp/b");
        assert_eq!(cmd.arg_list(), ["--list", "--file", "a.tar", "/tmp/b"]);
    }

    #[test]
    fn combined_output_joins_streams() {
        let result = CmdResult {
            code: Some(0),
            stdout: "a\nb".into(),
            stderr: "c\n".into(),
        };
        assert_eq!(result.combined(), "a\nb\nc\n");
        assert_eq!(result.lines(), ["a", "b", "c"]);
    }

    #[test]
    fn failing_command_is_reported_with_output() {
        let cmd = Cmd::new("tar").arg("--bogus").error_msg("tar failed");
        let result = CmdResult {
            code: Some(2),
            stdout: String::new(),
            stderr: "tar: unrecognized option".into(),
        };
        match cmd.check(result).unwrap_err() {
            ArchiveError::ToolFailed {
                command,
                code,
                output,
            } => {
                assert_eq!(command, "tar --bogus");
                assert_eq!(code, 2);
                assert!(output.starts_with("tar failed"));
                assert!(output.contains("unrecognized option"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn signal_exit_is_reported_as_minus_one() {
        let cmd = Cmd::new("tar");
        let result = CmdResult {
            code: None,
            ..Default::default()
        };
        assert!(matches!(
            cmd.check(result).unwrap_err(),
            ArchiveError::ToolFailed { code: -1, .. }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_captures_output() {
        let result = Cmd::new("sh").args(["-c", "echo out; echo err >&2"]).run().unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_reports_non_zero_exit() {
        let err = Cmd::new("sh").args(["-c", "exit 3"]).run().unwrap_err();
        assert!(matches!(err, ArchiveError::ToolFailed { code: 3, .. }));
    }

    #[cfg(unix)]
    #[test]
    fn peek_cancels_after_enough_lines() {
        let cmd = Cmd::new("sh").args(["-c", "echo one; echo two; echo three; sleep 30"]);
        let peek = SystemRunner.peek_lines(&cmd, 2).unwrap();
        assert_eq!(peek.lines, ["one", "two"]);
        assert!(peek.exit.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn peek_reports_early_exit() {
        let cmd = Cmd::new("sh").args(["-c", "echo only; echo oops >&2; exit 1"]);
        let peek = SystemRunner.peek_lines(&cmd, 2).unwrap();
        assert_eq!(peek.lines, ["only"]);
        let exit = peek.exit.unwrap();
        assert_eq!(exit.code, Some(1));
        assert_eq!(exit.stderr, "oops\n");
    }

    #[cfg(unix)]
    #[test]
    fn peek_survives_large_stderr() {
        let cmd = Cmd::new("sh").args(["-c", "yes x | head -c 200000 >&2; echo done"]);
        let peek = SystemRunner.peek_lines(&cmd, 2).unwrap();
        assert_eq!(peek.lines, ["done"]);
        let exit = peek.exit.unwrap();
        assert!(exit.success());
        assert_eq!(exit.stderr.len(), 200000);
    }

    #[test]
    fn ensure_exists_reports_missing_path() {
        let temp = TempDir::new().unwrap();
        ensure_exists(temp.path(), "directory").unwrap();
        let err = ensure_exists(&temp.path().join("nope"), "directory").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn find_program_reports_missing_tool() {
        let err = find_program("definitely_not_a_real_command_12345").unwrap_err();
        assert!(matches!(err, ArchiveError::ToolNotFound { .. }));
    }
}
