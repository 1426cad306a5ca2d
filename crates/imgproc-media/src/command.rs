//! External tool command builder and runner.
//!
//! Every tool invocation goes through [`ToolCommand`]. Children are spawned
//! with `kill_on_drop`, and every run races a [`CancellationToken`], so a
//! cancelled scope tears down the process instead of waiting for it.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Builder for one external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
}

/// Captured output of a finished tool.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// stdout followed by stderr, the way the tools interleave on a terminal.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        out.push_str(&self.stderr);
        out
    }
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a path argument.
    pub fn path(self, path: impl AsRef<Path>) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn build_args(&self) -> &[String] {
        &self.args
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, err: std::io::Error) -> MediaError {
        if err.kind() == std::io::ErrorKind::NotFound {
            MediaError::ToolNotFound(self.program.clone())
        } else {
            MediaError::Io(err)
        }
    }

    /// Run to completion and capture output. Non-zero exit is an error.
    pub async fn output(&self, cancel: &CancellationToken) -> MediaResult<ToolOutput> {
        if cancel.is_cancelled() {
            return Err(MediaError::Cancelled);
        }

        debug!("Running {} {}", self.program, self.args.join(" "));

        let child = self.command().spawn().map_err(|e| self.spawn_error(e))?;

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(program = %self.program, "Cancelled, killing process");
                return Err(MediaError::Cancelled);
            }
            output = child.wait_with_output() => output?,
        };

        let result = ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if output.status.success() {
            Ok(result)
        } else {
            Err(MediaError::tool_failed(
                &self.program,
                result.combined(),
                output.status.code(),
            ))
        }
    }

    /// Run to completion, discarding output.
    pub async fn run(&self, cancel: &CancellationToken) -> MediaResult<()> {
        self.output(cancel).await.map(|_| ())
    }
}

/// Run `producer | consumer`.
///
/// Both processes are always awaited; if either fails the error names both
/// programs and carries both stderr texts.
pub async fn run_pipe(
    producer: &ToolCommand,
    consumer: &ToolCommand,
    cancel: &CancellationToken,
) -> MediaResult<()> {
    if cancel.is_cancelled() {
        return Err(MediaError::Cancelled);
    }

    debug!(
        "Running {} {} | {} {}",
        producer.program,
        producer.args.join(" "),
        consumer.program,
        consumer.args.join(" ")
    );

    let mut producer_child = producer
        .command()
        .spawn()
        .map_err(|e| producer.spawn_error(e))?;
    let mut consumer_child = consumer
        .command()
        .stdin(Stdio::piped())
        .spawn()
        .map_err(|e| consumer.spawn_error(e))?;

    let mut source = producer_child
        .stdout
        .take()
        .ok_or_else(|| MediaError::internal("producer stdout not captured"))?;
    let mut sink = consumer_child
        .stdin
        .take()
        .ok_or_else(|| MediaError::internal("consumer stdin not captured"))?;

    let copy = async move {
        let copied = tokio::io::copy(&mut source, &mut sink).await;
        // Close the consumer's stdin so it sees EOF.
        drop(sink);
        copied
    };

    let work = async {
        tokio::join!(
            copy,
            producer_child.wait_with_output(),
            consumer_child.wait_with_output()
        )
    };

    let (copied, produced, consumed) = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(MediaError::Cancelled),
        results = work => results,
    };

    let produced = produced?;
    let consumed = consumed?;

    if produced.status.success() && consumed.status.success() {
        copied?;
        return Ok(());
    }

    let exit_code = if produced.status.success() {
        consumed.status.code()
    } else {
        produced.status.code()
    };

    Err(MediaError::tool_failed(
        format!("{} | {}", producer.program, consumer.program),
        format!(
            "{}: {}\n{}: {}{}",
            producer.program,
            String::from_utf8_lossy(&produced.stderr).trim_end(),
            consumer.program,
            String::from_utf8_lossy(&consumed.stdout),
            String::from_utf8_lossy(&consumed.stderr).trim_end(),
        ),
        exit_code,
    ))
}

/// Locate a tool on `PATH`.
pub fn check_tool(program: &str) -> MediaResult<PathBuf> {
    which::which(program).map_err(|_| MediaError::ToolNotFound(program.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = ToolCommand::new("optipng")
            .arg("-o7")
            .path(Path::new("/tmp/work/1x.png"));

        assert_eq!(cmd.program(), "optipng");
        assert_eq!(cmd.build_args(), ["-o7", "/tmp/work/1x.png"]);
    }

    #[tokio::test]
    async fn test_missing_tool_is_reported() {
        let cmd = ToolCommand::new("imgproc-definitely-not-a-tool");
        let err = cmd.run(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, MediaError::ToolNotFound(ref p) if p == "imgproc-definitely-not-a-tool"));
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = ToolCommand::new("sleep").arg("5").run(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_kills_running_process() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = ToolCommand::new("sleep").arg("30").run(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_carries_output() {
        let cmd = ToolCommand::new("sh").args(["-c", "echo broken >&2; exit 3"]);
        let err = cmd.run(&CancellationToken::new()).await.unwrap_err();
        match err {
            MediaError::ToolFailed {
                program,
                stderr,
                exit_code,
            } => {
                assert_eq!(program, "sh");
                assert!(stderr.contains("broken"));
                assert_eq!(exit_code, Some(3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pipe_reports_both_sides() {
        let producer = ToolCommand::new("sh").args(["-c", "echo data; echo left >&2; exit 1"]);
        let consumer = ToolCommand::new("sh").args(["-c", "cat >/dev/null; echo right >&2; exit 2"]);
        let err = run_pipe(&producer, &consumer, &CancellationToken::new())
            .await
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("left"));
        assert!(text.contains("right"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pipe_success() {
        let producer = ToolCommand::new("sh").args(["-c", "echo frame"]);
        let consumer = ToolCommand::new("sh").args(["-c", "grep -q frame"]);
        run_pipe(&producer, &consumer, &CancellationToken::new())
            .await
            .unwrap();
    }
}
