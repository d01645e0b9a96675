//! Subprocess runner for the alignment tools.
//!
//! The tool runs with stdout and stderr sharing one pipe, so its output
//! arrives interleaved exactly as it was written. A reader thread drains the
//! pipe line by line; the calling thread collects the lines, forwards them to
//! an [`OutputSink`] and enforces the timeout and cancellation.
//!
//! The tool is started in its own process group so that termination reaches
//! every process it spawned.

use crate::error::{Result, WgaError};
use crate::tool::{AlignmentTool, ToolInvocation};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io::{BufRead, BufReader};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Receives every line the tool prints, as it is printed.
pub trait OutputSink {
    fn line(&mut self, tool: AlignmentTool, line: &str);
}

/// Default sink: forwards tool output to the `tool` log target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl OutputSink for LogSink {
    fn line(&mut self, tool: AlignmentTool, line: &str) {
        log::info!(target: "tool", "[{tool}] {line}");
    }
}

impl<F> OutputSink for F
where
    F: FnMut(AlignmentTool, &str),
{
    fn line(&mut self, tool: AlignmentTool, line: &str) {
        self(tool, line)
    }
}

/// Shared flag used to abort a running tool from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Exit status and captured output of a finished tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRunResult {
    pub exit_code: i32,
    pub combined_output_lines: Vec<String>,
}

impl ToolRunResult {
    pub fn output_text(&self) -> String {
        self.combined_output_lines.join("\n")
    }

    /// Turns a non-zero exit into [`WgaError::ToolExecution`].
    pub fn into_success(self, tool: AlignmentTool) -> Result<Self> {
        if self.exit_code != 0 {
            return Err(WgaError::ToolExecution {
                tool: tool.program().to_string(),
                exit_code: self.exit_code,
                output: self.output_text(),
            });
        }
        Ok(self)
    }
}

/// Runs one tool invocation to completion.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    program: PathBuf,
    working_dir: PathBuf,
    timeout: Option<Duration>,
    cancel: CancelToken,
}

impl ToolRunner {
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        ToolRunner {
            program: program.into(),
            working_dir: working_dir.into(),
            timeout: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Executes `invocation`, failing on spawn errors, timeout, cancellation
    /// or a non-zero exit status.
    pub fn run(
        &self,
        invocation: &ToolInvocation,
        sink: &mut dyn OutputSink,
    ) -> Result<ToolRunResult> {
        let tool = invocation.tool;
        let (reader, writer) = std::io::pipe()?;
        let writer_err = writer.try_clone()?;

        let mut cmd = Command::new(&self.program);
        cmd.args(invocation.args())
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(writer))
            .stderr(Stdio::from(writer_err))
            .process_group(0);

        log::info!("CMD: {}", invocation.command_line());
        let spawned = cmd.spawn();
        // Our copies of the write end must be closed or the reader never sees EOF
        drop(cmd);
        let mut child = spawned.map_err(|e| {
            WgaError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to run {}: {e}", self.program.display()),
            ))
        })?;

        let (tx, rx) = mpsc::channel::<String>();
        thread::spawn(move || {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        let line = line.trim_end_matches(['\n', '\r']).to_string();
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let started = Instant::now();
        let mut lines = Vec::new();
        let mut output_open = true;
        let status = loop {
            if self.cancel.is_cancelled() {
                terminate(&mut child);
                return Err(WgaError::Cancelled);
            }
            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    log::warn!("{tool} exceeded {}s, terminating", limit.as_secs());
                    terminate(&mut child);
                    return Err(WgaError::Timeout {
                        tool: tool.program().to_string(),
                        seconds: limit.as_secs(),
                    });
                }
            }

            if output_open {
                match rx.recv_timeout(POLL_INTERVAL) {
                    Ok(line) => {
                        sink.line(tool, &line);
                        lines.push(line);
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    Err(mpsc::RecvTimeoutError::Disconnected) => output_open = false,
                }
            } else if let Some(status) = child.try_wait()? {
                break status;
            } else {
                // Output closed but the tool is still running
                thread::sleep(POLL_INTERVAL);
            }
        };

        let exit_code = exit_code(status);
        log::debug!("return code: {exit_code}");

        ToolRunResult {
            exit_code,
            combined_output_lines: lines,
        }
        .into_success(tool)
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

/// SIGTERM to the tool's process group, then SIGKILL to whatever is left
/// after a grace period.
fn terminate(child: &mut Child) {
    let group = Pid::from_raw(child.id() as i32);
    if signal::killpg(group, Signal::SIGTERM).is_ok() {
        let deadline = Instant::now() + TERMINATE_GRACE;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = child.try_wait() {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
    let _ = signal::killpg(group, Signal::SIGKILL);
    let _ = child.kill();
    let _ = child.wait();
}
