//! Running the external package manager.
//!
//! [`Installer`] is the seam between install coordination and the process that actually
//! materializes an environment. [`PixiInstaller`] is the production implementation; tests
//! substitute counting or failing installers.
//!
//! A non-zero exit is *not* an error at this level: [`Installer::run`] returns a
//! [`ProcessOutput`] with `success == false` and the coordinator decides what it means.
//! Errors are reserved for failures to run the process at all, timeouts and cancellation.

use crate::constants::{DEFAULT_INSTALLER, INSTALL_ARGS, INSTALL_TIMEOUT};
use crate::core::{CancelToken, EnvError, EnvResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// One installer invocation.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    /// Directory the installer runs in (the cache slot)
    pub working_dir: PathBuf,
    /// Extra environment variables for the subprocess
    pub env: Vec<(String, String)>,
    /// Upper bound on the run time; the process is killed afterwards
    pub timeout: Duration,
    /// Stops the run early, killing the process
    pub cancel: CancelToken,
}

impl InstallRequest {
    /// A request for `working_dir` with the default timeout and no extra variables.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            env: Vec::new(),
            timeout: INSTALL_TIMEOUT,
            cancel: CancelToken::new(),
        }
    }

    /// Add an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Override the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Result of a completed installer process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Whether the process exited with status 0
    pub success: bool,
    /// Exit code, `-1` when the process was terminated by a signal
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl ProcessOutput {
    /// Convert an unsuccessful run into [`EnvError::ProcessFailure`].
    pub fn into_result(self) -> EnvResult<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(EnvError::ProcessFailure {
                exit_code: self.exit_code,
                stdout: self.stdout,
                stderr: self.stderr,
            })
        }
    }
}

/// Something that can install an environment into a prepared directory.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Run one installation.
    ///
    /// # Errors
    ///
    /// [`EnvError::InstallerNotFound`], [`EnvError::Io`], [`EnvError::Timeout`] or
    /// [`EnvError::Cancelled`]. A non-zero exit is reported through [`ProcessOutput`].
    async fn run(&self, request: InstallRequest) -> EnvResult<ProcessOutput>;
}

/// Runs `pixi install --frozen` in the slot directory.
///
/// The executable is located once per object (a configured path, otherwise a `PATH`
/// lookup) and reused for every later run.
#[derive(Debug, Default)]
pub struct PixiInstaller {
    configured: Option<PathBuf>,
    resolved: OnceLock<PathBuf>,
}

impl PixiInstaller {
    /// Look `pixi` up on `PATH` on first use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit executable.
    pub fn with_executable(path: impl Into<PathBuf>) -> Self {
        Self {
            configured: Some(path.into()),
            resolved: OnceLock::new(),
        }
    }

    /// The absolute path of the executable, resolving it on first call.
    pub fn executable(&self) -> EnvResult<&Path> {
        if let Some(path) = self.resolved.get() {
            return Ok(path);
        }
        let found = match &self.configured {
            Some(path) => which::which(path).map_err(|_| EnvError::InstallerNotFound {
                name: path.display().to_string(),
            })?,
            None => which::which(DEFAULT_INSTALLER).map_err(|_| EnvError::InstallerNotFound {
                name: DEFAULT_INSTALLER.to_string(),
            })?,
        };
        tracing::debug!(target: "installer", "Using installer at {}", found.display());
        Ok(self.resolved.get_or_init(|| found))
    }
}

#[async_trait]
impl Installer for PixiInstaller {
    async fn run(&self, request: InstallRequest) -> EnvResult<ProcessOutput> {
        let exe = self.executable()?.to_path_buf();

        let mut cmd = Command::new(&exe);
        cmd.args(INSTALL_ARGS)
            .current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &request.env {
            tracing::trace!(target: "installer", "Setting env var: {key}={value}");
            cmd.env(key, value);
        }

        tracing::debug!(
            target: "installer",
            "Executing: {} {} (in {})",
            exe.display(),
            INSTALL_ARGS.join(" "),
            request.working_dir.display()
        );
        let start = std::time::Instant::now();

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EnvError::InstallerNotFound {
                    name: exe.display().to_string(),
                }
            } else {
                EnvError::io("starting installer", &exe, e)
            }
        })?;

        let mut stdout_task = tokio::spawn(drain(child.stdout.take(), exe.clone()));
        let mut stderr_task = tokio::spawn(drain(child.stderr.take(), exe.clone()));
        let deadline = tokio::time::Instant::now() + request.timeout;

        // The deadline covers the drains too: a grandchild holding the pipes open must not
        // outlive the timeout.
        let ending = {
            let finished = async {
                let status = child
                    .wait()
                    .await
                    .map_err(|e| EnvError::io("waiting for installer", &exe, e))?;
                let stdout = (&mut stdout_task).await??;
                let stderr = (&mut stderr_task).await??;
                Ok::<_, EnvError>((status, stdout, stderr))
            };
            tokio::select! {
                result = finished => Ending::Finished(result),
                () = tokio::time::sleep_until(deadline) => Ending::TimedOut,
                () = request.cancel.cancelled() => Ending::Cancelled,
            }
        };

        let (status, stdout, stderr) = match ending {
            Ending::Finished(result) => {
                stdout_task.abort();
                stderr_task.abort();
                result?
            }
            Ending::TimedOut => {
                let _ = child.kill().await;
                stdout_task.abort();
                stderr_task.abort();
                tracing::warn!(
                    target: "installer",
                    "Installer timed out after {}s in {}, killed it",
                    request.timeout.as_secs(),
                    request.working_dir.display()
                );
                return Err(EnvError::Timeout(request.timeout));
            }
            Ending::Cancelled => {
                let _ = child.kill().await;
                stdout_task.abort();
                stderr_task.abort();
                tracing::info!(target: "installer", "Installer cancelled, killed it");
                return Err(EnvError::Cancelled);
            }
        };

        let exit_code = status.code().unwrap_or(-1);

        tracing::debug!(
            target: "installer",
            "Installer exited with code {exit_code} after {:.1}s",
            start.elapsed().as_secs_f64()
        );
        if !status.success() && !stderr.is_empty() {
            tracing::debug!(target: "installer", "Installer stderr: {}", stderr.trim());
        }

        Ok(ProcessOutput {
            success: status.success(),
            exit_code,
            stdout,
            stderr,
        })
    }
}

/// How the wait on the installer process ended.
enum Ending {
    Finished(EnvResult<(std::process::ExitStatus, String, String)>),
    TimedOut,
    Cancelled,
}

/// Read a pipe to the end, lossily decoding it as UTF-8.
async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>, exe: PathBuf) -> EnvResult<String> {
    let Some(mut pipe) = pipe else {
        return Ok(String::new());
    };
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf)
        .await
        .map_err(|e| EnvError::io("reading installer output", &exe, e))?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
