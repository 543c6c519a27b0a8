use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, Command},
    time::timeout,
};

use super::Action;
use crate::{
    config,
    core::error::{CompileError, CompileResult, ErrorContext},
};

const READ_CHUNK: usize = 8 * 1024;

/// How one toolchain invocation ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Invocation {
    /// The process exited on its own. `exit_code` is `None` when it was ended by a signal.
    Completed {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// The time bound expired and the process group was killed. Output is discarded.
    TimedOut,
    /// The binary could not be found or started.
    LaunchFailed { reason: String },
}

/// Runs the external compiler against a source file.
///
/// Anticipated failures (timeout, missing binary) are reported through
/// [`Invocation`]; `Err` is reserved for unexpected I/O faults.
#[async_trait]
pub trait Toolchain: Send + Sync {
    async fn invoke(&self, source: &Path, action: Action) -> CompileResult<Invocation>;

    /// The wall-clock bound applied to every invocation.
    fn timeout(&self) -> Duration;
}

/// Invokes the compiler as a child process.
pub struct ProcessToolchain {
    binary: PathBuf,
    working_dir: PathBuf,
    timeout: Duration,
    max_output_bytes: usize,
}

impl ProcessToolchain {
    pub fn new(
        binary: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
        timeout: Duration,
        max_output_bytes: usize,
    ) -> Self {
        Self {
            binary: binary.into(),
            working_dir: working_dir.into(),
            timeout,
            max_output_bytes,
        }
    }

    pub fn from_config(cfg: &config::Toolchain) -> Self {
        Self::new(
            &cfg.binary,
            cfg.resolved_working_dir(),
            cfg.timeout(),
            cfg.max_output_bytes,
        )
    }

    /// Arguments following the binary: `[flag] <source>`.
    pub fn command_args(source: &Path, action: Action) -> Vec<OsString> {
        let mut args = Vec::with_capacity(2);
        if let Some(flag) = action.flag() {
            args.push(OsString::from(flag));
        }
        args.push(source.as_os_str().to_os_string());
        args
    }

    /// Binary path as it will be executed.
    ///
    /// Relative paths with a directory part are anchored at the working directory;
    /// bare names are left for `PATH` lookup.
    pub fn program(&self) -> PathBuf {
        let has_dir = self
            .binary
            .parent()
            .is_some_and(|dir| !dir.as_os_str().is_empty());

        if self.binary.is_relative() && has_dir {
            self.working_dir.join(&self.binary)
        } else {
            self.binary.clone()
        }
    }

    /// Whether the binary exists. Bare names resolved through `PATH` are assumed present.
    pub fn is_available(&self) -> bool {
        let program = self.program();
        if program.parent().is_some_and(|dir| !dir.as_os_str().is_empty()) {
            program.is_file()
        } else {
            true
        }
    }

    fn command(&self, source: &Path, action: Action) -> Command {
        let mut command = Command::new(self.program());
        command
            .args(Self::command_args(source, action))
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so a timeout can take down anything the compiler spawned.
        #[cfg(unix)]
        command.process_group(0);

        command
    }
}

#[async_trait]
impl Toolchain for ProcessToolchain {
    async fn invoke(&self, source: &Path, action: Action) -> CompileResult<Invocation> {
        let mut child = match self.command(source, action).spawn() {
            Ok(child) => child,
            Err(e) => {
                log::warn!(
                    "Failed to launch toolchain {}: {e}",
                    self.program().display()
                );
                return Ok(Invocation::LaunchFailed {
                    reason: e.to_string(),
                });
            }
        };
        let pid = child.id();

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CompileError::Internal("toolchain stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CompileError::Internal("toolchain stderr was not captured".into()))?;

        let cap = self.max_output_bytes;
        let waited = timeout(self.timeout, async {
            let (status, stdout, stderr) = tokio::join!(
                child.wait(),
                read_capped(stdout, cap),
                read_capped(stderr, cap)
            );
            Ok::<_, CompileError>((
                status.with_context("waiting on toolchain")?,
                stdout.with_context("reading toolchain stdout")?,
                stderr.with_context("reading toolchain stderr")?,
            ))
        })
        .await;

        match waited {
            Ok(Ok((status, stdout, stderr))) => {
                log::debug!("Toolchain exited with {status}");
                Ok(Invocation::Completed {
                    exit_code: status.code(),
                    stdout,
                    stderr,
                })
            }
            Ok(Err(e)) => {
                terminate(&mut child, pid).await;
                Err(e)
            }
            Err(_) => {
                log::warn!(
                    "Toolchain exceeded {}s on {}, killing it",
                    self.timeout.as_secs(),
                    source.display()
                );
                terminate(&mut child, pid).await;
                Ok(Invocation::TimedOut)
            }
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Kills the child's process group, then the child itself, and reaps it.
async fn terminate(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        use nix::{
            sys::signal::{killpg, Signal},
            unistd::Pid,
        };

        if let Some(pid) = pid {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                log::debug!("killpg({pid}) failed: {e}");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    if let Err(e) = child.kill().await {
        log::debug!("Failed to kill toolchain process: {e}");
    }
}

/// Reads a stream to EOF, keeping at most `cap` bytes.
///
/// The rest is drained so the child never blocks on a full pipe.
async fn read_capped<R>(mut reader: R, cap: usize) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut captured = Vec::new();
    let mut buf = [0u8; READ_CHUNK];
    let mut dropped = 0usize;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let keep = n.min(cap.saturating_sub(captured.len()));
        captured.extend_from_slice(&buf[..keep]);
        dropped += n - keep;
    }

    if dropped > 0 {
        log::debug!("Toolchain output truncated, {dropped} bytes dropped");
    }

    // Invalid UTF-8 becomes U+FFFD rather than failing the compile.
    Ok(String::from_utf8_lossy(&captured).into_owned())
}
