//! Test utilities for envslot
//!
//! Shared by unit tests and the integration test target (through the `test-utils` feature):
//!
//! - [`init_test_logging`] for opt-in tracing output in tests
//! - [`sample_lockfile`] and [`sample_manifest`] fixtures
//! - [`CountingInstaller`], an in-process [`Installer`] that records its calls
//! - [`write_fake_pixi`], a shell script standing in for the real installer (Unix only)

use crate::core::{EnvError, EnvResult};
use crate::installer::{InstallRequest, Installer, ProcessOutput};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initialize tracing for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; does nothing when neither is set.
/// Only the first call in a test binary has an effect.
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// A version 6 lockfile with two environments, conda and pypi packages.
#[must_use]
pub fn sample_lockfile() -> String {
    r"version: 6
environments:
  default:
    channels:
    - url: https://conda.anaconda.org/conda-forge/
    indexes:
    - https://pypi.org/simple
    packages:
      linux-64:
      - conda: https://conda.anaconda.org/conda-forge/linux-64/python-3.12.7-hc5c86c4_0_cpython.conda
      - conda: https://conda.anaconda.org/conda-forge/noarch/tzdata-2024b-hc8b5060_0.conda
      - pypi: https://files.pythonhosted.org/packages/4b/d7/ecf66c1cd12dc28b4040b15ab4d17b773b87fa9d29ca16125de01adb36cd/numpy-2.1.2-cp312-cp312-manylinux_2_17_x86_64.manylinux2014_x86_64.whl
      osx-arm64:
      - conda: https://conda.anaconda.org/conda-forge/osx-arm64/python-3.12.7-h739c21a_0_cpython.conda
      - conda: https://conda.anaconda.org/conda-forge/noarch/tzdata-2024b-hc8b5060_0.conda
  docs:
    channels:
    - url: https://conda.anaconda.org/conda-forge/
    find-links:
    - path: ./wheels
    packages:
      linux-64:
      - conda: https://conda.anaconda.org/conda-forge/noarch/mkdocs-1.6.1-pyhd8ed1ab_0.conda
packages:
- conda: https://conda.anaconda.org/conda-forge/linux-64/python-3.12.7-hc5c86c4_0_cpython.conda
  sha256: 674be31ff152d9f0e0fe16959a45e3803a730fc4f54d87df6a9ac4e6a698c41d
  md5: 0515111a9cdf69f83278f7c197db9807
  depends:
  - libgcc >=13
  license: Python-2.0
- conda: https://conda.anaconda.org/conda-forge/noarch/tzdata-2024b-hc8b5060_0.conda
  sha256: 4fde5c3008bf5d2db82f2b50204464314cc3c91c1d953652f7bd01d9e52aefdf
  md5: 8ac3367aafb1cc0a068483c580af8015
  channel: https://conda.anaconda.org/conda-forge/
  license: LicenseRef-Public-Domain
- conda: https://conda.anaconda.org/conda-forge/osx-arm64/python-3.12.7-h739c21a_0_cpython.conda
  sha256: 45d7ca2074aa92594bd2f91a9003b338cc1df8a46b9492b7fc8167110783c3ef
  md5: e0d82e57ebb456077565e6d82cd4a323
- conda: https://conda.anaconda.org/conda-forge/noarch/mkdocs-1.6.1-pyhd8ed1ab_0.conda
  sha256: 902d2e251f9a7ffa7d86a3e62be5b2395e28614bd4dbe5f50acf921fd64a8c35
- pypi: https://files.pythonhosted.org/packages/4b/d7/ecf66c1cd12dc28b4040b15ab4d17b773b87fa9d29ca16125de01adb36cd/numpy-2.1.2-cp312-cp312-manylinux_2_17_x86_64.manylinux2014_x86_64.whl
  name: numpy
  version: 2.1.2
  sha256: 9a5c7ab6bbf4cabe5b9f6880cf25c31b5d2bb6b4a7d8b8c8d5b5f5b5d5b5f5b5
  requires_python: '>=3.10'
"
    .to_string()
}

/// A minimal pixi manifest matching [`sample_lockfile`].
#[must_use]
pub fn sample_manifest() -> String {
    "[workspace]\nname = \"sample\"\nchannels = [\"conda-forge\"]\nplatforms = [\"linux-64\", \"osx-arm64\"]\n\n[dependencies]\npython = \"3.12.*\"\n".to_string()
}

/// Write the installed marker for `environment` inside `slot`.
pub fn write_installed_marker(slot: &Path, environment: &str) -> std::io::Result<PathBuf> {
    let marker = crate::installer::installed_marker(&crate::installer::environment_dir(
        slot,
        environment,
    ));
    if let Some(parent) = marker.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&marker, "// installed by test\n")?;
    Ok(marker)
}

/// In-process installer that counts its runs.
///
/// A succeeding instance writes the installed marker of the `default` environment into
/// the request's working directory, like a real installation would.
#[derive(Debug)]
pub struct CountingInstaller {
    calls: AtomicUsize,
    delay: Duration,
    failure: Option<(i32, String)>,
    last_request: Mutex<Option<InstallRequest>>,
}

impl CountingInstaller {
    /// Always exits 0.
    #[must_use]
    pub fn succeeding() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            failure: None,
            last_request: Mutex::new(None),
        }
    }

    /// Always exits with `exit_code` and `stderr`.
    #[must_use]
    pub fn failing(exit_code: i32, stderr: &str) -> Self {
        Self {
            failure: Some((exit_code, stderr.to_string())),
            ..Self::succeeding()
        }
    }

    /// Sleep for `delay` inside every run.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// How many times [`Installer::run`] was entered.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The most recent request.
    pub fn last_request(&self) -> Option<InstallRequest> {
        self.last_request.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl Installer for CountingInstaller {
    async fn run(&self, request: InstallRequest) -> EnvResult<ProcessOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_request.lock() {
            *guard = Some(request.clone());
        }

        if !self.delay.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(self.delay) => {}
                () = request.cancel.cancelled() => return Err(EnvError::Cancelled),
            }
        }

        if let Some((exit_code, stderr)) = &self.failure {
            return Ok(ProcessOutput {
                success: false,
                exit_code: *exit_code,
                stdout: String::new(),
                stderr: stderr.clone(),
            });
        }

        write_installed_marker(&request.working_dir, crate::constants::DEFAULT_ENVIRONMENT)
            .map_err(|e| EnvError::io("writing installed marker", &request.working_dir, e))?;
        Ok(ProcessOutput {
            success: true,
            exit_code: 0,
            stdout: "installed\n".to_string(),
            stderr: String::new(),
        })
    }
}

/// Write an executable shell script named `pixi` into `dir`.
///
/// The script appends one line to `<dir>/invocations.log` per run, then executes `body`.
#[cfg(unix)]
pub fn write_fake_pixi(dir: &Path, body: &str) -> std::io::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(dir)?;
    let path = dir.join("pixi");
    let log = dir.join("invocations.log");
    let script = format!("#!/bin/sh\necho \"$PWD $*\" >> '{}'\n{body}\n", log.display());
    std::fs::write(&path, script)?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

/// Shell body for [`write_fake_pixi`] that creates the default environment's marker.
pub const FAKE_PIXI_SUCCESS: &str =
    "sleep 0.2\nmkdir -p .pixi/envs/default/conda-meta\ntouch .pixi/envs/default/conda-meta/history\n";

/// Number of runs recorded by a script from [`write_fake_pixi`].
pub fn fake_pixi_invocations(dir: &Path) -> usize {
    std::fs::read_to_string(dir.join("invocations.log"))
        .map(|log| log.lines().count())
        .unwrap_or(0)
}
