//! External command execution

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::deploy::remote::shell_quote;
use crate::errors::DeployError;
use crate::utils::redact;

/// Exit status reported when a program cannot be started at all
const EXIT_NOT_FOUND: i32 = 127;

/// A program invocation with everything needed to run and report it
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Pipeline step the command belongs to, used in errors
    pub step: &'static str,
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Fed to the child's stdin, then closed
    pub stdin: Option<String>,
    /// Log output at debug instead of info
    pub quiet: bool,
    secrets: Vec<SecretString>,
}

impl CommandSpec {
    pub fn new(step: &'static str, program: impl Into<String>) -> Self {
        Self {
            step,
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: Vec::new(),
            stdin: None,
            quiet: false,
            secrets: Vec::new(),
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

    /// Pass a secret argument; it is masked wherever the command is shown
    pub fn secret_arg(mut self, secret: &SecretString) -> Self {
        self.args.push(secret.expose_secret().to_string());
        self.secrets.push(secret.clone());
        self
    }

    /// Mask these values in the displayed command and captured output
    pub fn redacting(mut self, secrets: &[SecretString]) -> Self {
        self.secrets.extend(secrets.iter().cloned());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Shell-like rendering with secrets masked
    pub fn display(&self) -> String {
        let rendered = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ");
        self.redact(&rendered)
    }

    pub fn redact(&self, text: &str) -> String {
        redact(text, &self.secrets)
    }

    /// Error describing a completed but unsuccessful run
    pub fn failure(&self, output: &CommandOutput) -> DeployError {
        DeployError::Command {
            step: self.step,
            command: self.display(),
            code: output.code,
            stderr: tail(&self.redact(&output.stderr), 20),
        }
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external programs (git, ssh, scp)
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command and capture its output, whatever its exit status
    async fn output(&self, spec: &CommandSpec) -> Result<CommandOutput, DeployError>;

    /// Run the command, treating a non-zero exit status as an error
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, DeployError> {
        let output = self.output(spec).await?;
        if output.is_success() {
            Ok(output)
        } else {
            Err(spec.failure(&output))
        }
    }
}

/// Runs commands as child processes, streaming their output into the log
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn output(&self, spec: &CommandSpec) -> Result<CommandOutput, DeployError> {
        debug!("Running: {}", spec.display());

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Err(DeployError::Command {
                    step: spec.step,
                    command: spec.display(),
                    code: Some(EXIT_NOT_FOUND),
                    stderr: format!("failed to start {}: {}", spec.program, e),
                })
            }
        };

        let stdin = child.stdin.take();
        let feed = async {
            if let (Some(input), Some(mut stdin)) = (&spec.stdin, stdin) {
                stdin.write_all(input.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (fed, stdout, stderr) = tokio::join!(
            feed,
            forward_lines(stdout, spec, false),
            forward_lines(stderr, spec, true)
        );
        let status = child.wait().await?;

        // A child that exits without reading its input is judged by its status
        match fed {
            Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e.into()),
            _ => {}
        }

        Ok(CommandOutput {
            code: status.code(),
            stdout: stdout?,
            stderr: stderr?,
        })
    }
}

/// Read a child stream line by line, logging each line and collecting all.
///
/// Bytes that are not valid UTF-8 are replaced, never treated as an error;
/// the stream is always drained so the child is not cut off mid-write.
async fn forward_lines<R>(
    stream: Option<R>,
    spec: &CommandSpec,
    is_stderr: bool,
) -> Result<String, DeployError>
where
    R: AsyncRead + Unpin,
{
    let mut collected = String::new();
    let Some(stream) = stream else {
        return Ok(collected);
    };

    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let raw = String::from_utf8_lossy(&buf);
        let line = spec.redact(raw.trim_end_matches(['\n', '\r']));
        if spec.quiet || is_stderr {
            debug!("  {}", line);
        } else {
            info!("  {}", line);
        }
        collected.push_str(&line);
        collected.push('\n');
    }
    Ok(collected)
}

/// Logs commands instead of running them
pub struct DryRunRunner;

#[async_trait]
impl CommandRunner for DryRunRunner {
    async fn output(&self, spec: &CommandSpec) -> Result<CommandOutput, DeployError> {
        info!("[dry-run] {}", spec.display());
        if let Some(input) = &spec.stdin {
            for line in input.lines() {
                info!("[dry-run]   | {}", spec.redact(line));
            }
        }
        Ok(CommandOutput::success())
    }
}

fn tail(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
