//! Single-flight environment installation.
//!
//! [`InstallCoordinator`] is the process-wide registry: it owns the slot resolver, the
//! installer and one [`SingleFlight`] keyed by slot directory. Callers get an
//! [`EnvironmentHandle`] per environment spec and call
//! [`ensure_installed`](EnvironmentHandle::ensure_installed) as often and from as many tasks
//! as they like.
//!
//! # Two Tiers
//!
//! ```text
//! handle A ──┐ local flight (per handle) ──┐
//! handle A ──┘                             ├── global flight (per slot) ── installer
//! handle B ─── local flight (per handle) ──┘
//! ```
//!
//! 1. A handle whose own flight already succeeded returns immediately
//! 2. An installed marker on disk (`.pixi/envs/<env>/conda-meta/history`) is trusted and
//!    recorded as success in both tiers without running anything
//! 3. Concurrent calls on one handle share the handle's local flight
//! 4. The local leader joins the global flight for the slot; the global leader writes the
//!    manifest and the localized lockfile into the slot and runs the installer
//!
//! A failure clears both tiers so the next call retries from scratch. Files already
//! written into the slot are left in place and overwritten by the retry.
//!
//! # Cancellation
//!
//! Only the caller's own wait observes its token. The install itself runs on a detached
//! task and is only stopped by [`InstallCoordinator::shutdown`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use envslot::cache::SlotResolver;
//! use envslot::core::CancelToken;
//! use envslot::installer::{InstallCoordinator, InstallOptions, PixiInstaller};
//! use envslot::manifest::EnvironmentSpec;
//! use envslot::utils::NoProgress;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> envslot::core::EnvResult<()> {
//! let coordinator = Arc::new(InstallCoordinator::new(
//!     Arc::new(SlotResolver::new("/var/cache/envslot")),
//!     Arc::new(PixiInstaller::new()),
//!     InstallOptions::new("/opt/mirror"),
//! ));
//!
//! let spec = EnvironmentSpec::from_files(Path::new("pixi.lock"), None)?;
//! let handle = coordinator.handle(spec).await?;
//! handle.ensure_installed(Arc::new(NoProgress), &CancelToken::new()).await?;
//! println!("python: {}", handle.python_executable().display());
//! # Ok(())
//! # }
//! ```

pub mod command;

pub use command::{InstallRequest, Installer, PixiInstaller, ProcessOutput};

use crate::cache::{SingleFlight, SlotResolver};
use crate::constants::{
    DEFAULT_ENVIRONMENT, INSTALL_TIMEOUT, INSTALLER_CACHE_DIR, LOCKFILE_NAME, MANIFEST_NAME,
};
use crate::core::{CancelToken, EnvResult};
use crate::lockfile::{LockfileDocument, localize};
use crate::manifest::EnvironmentSpec;
use crate::utils::fs::atomic_write;
use crate::utils::platform::python_executable;
use crate::utils::progress::ProgressSink;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How environments are materialized and installed.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Root of the offline mirror (`channel/` and `pypi/` below it)
    pub resource_root: PathBuf,
    /// Environment of the lockfile to install
    pub environment: String,
    /// Timeout for one installer run
    pub timeout: Duration,
    /// Extra environment variables for the installer
    pub extra_env: Vec<(String, String)>,
}

impl InstallOptions {
    /// Defaults for everything except the mirror location.
    pub fn new(resource_root: impl Into<PathBuf>) -> Self {
        Self {
            resource_root: resource_root.into(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            timeout: INSTALL_TIMEOUT,
            extra_env: Vec::new(),
        }
    }

    /// Install a different lockfile environment.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Override the installer timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Process-wide install registry.
pub struct InstallCoordinator {
    resolver: Arc<SlotResolver>,
    installer: Arc<dyn Installer>,
    options: InstallOptions,
    flights: SingleFlight<PathBuf, PathBuf>,
    shutdown: CancelToken,
}

impl std::fmt::Debug for InstallCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallCoordinator")
            .field("root", &self.resolver.root())
            .field("options", &self.options)
            .field("flights", &self.flights.len())
            .finish_non_exhaustive()
    }
}

impl InstallCoordinator {
    /// Create a coordinator. Share it behind an [`Arc`] between all callers of a process.
    pub fn new(
        resolver: Arc<SlotResolver>,
        installer: Arc<dyn Installer>,
        options: InstallOptions,
    ) -> Self {
        Self {
            resolver,
            installer,
            options,
            flights: SingleFlight::new(),
            shutdown: CancelToken::new(),
        }
    }

    /// The slot resolver.
    #[must_use]
    pub fn resolver(&self) -> &Arc<SlotResolver> {
        &self.resolver
    }

    /// The install options.
    #[must_use]
    pub const fn options(&self) -> &InstallOptions {
        &self.options
    }

    /// Resolve `spec` to its slot and return a handle for it.
    pub async fn handle(self: &Arc<Self>, spec: EnvironmentSpec) -> EnvResult<EnvironmentHandle> {
        let slot = self.resolver.resolve_async(spec.identity_bytes()).await?;
        Ok(EnvironmentHandle {
            env_dir: environment_dir(&slot, &self.options.environment),
            slot,
            spec: Arc::new(spec),
            coordinator: Arc::clone(self),
            local: SingleFlight::new(),
        })
    }

    /// Kill any installer that is still running.
    ///
    /// Waiters on those installs see [`EnvError::Cancelled`](crate::core::EnvError::Cancelled).
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Join or start the global flight for `slot`.
    async fn install_slot(
        self: Arc<Self>,
        spec: Arc<EnvironmentSpec>,
        slot: PathBuf,
        progress: Arc<dyn ProgressSink>,
    ) -> EnvResult<PathBuf> {
        let coordinator = Arc::clone(&self);
        let key = slot.clone();
        let work = move || coordinator.materialize_and_install(spec, slot, progress);
        // The caller's token is observed by the local tier only.
        self.flights.run(key, work, &CancelToken::new()).await
    }

    /// The global leader's work: write the slot files and run the installer.
    async fn materialize_and_install(
        self: Arc<Self>,
        spec: Arc<EnvironmentSpec>,
        slot: PathBuf,
        progress: Arc<dyn ProgressSink>,
    ) -> EnvResult<PathBuf> {
        let env_name = self.options.environment.clone();
        progress.begin(&format!("Installing environment '{env_name}'"));
        info!(target: "installer", "Installing environment '{env_name}' into {}", slot.display());

        let result = self.run_install(&spec, &slot, progress.as_ref()).await;
        match &result {
            Ok(_) => progress.finish(&format!("Installed environment '{env_name}'"), true),
            Err(e) => {
                warn!(target: "installer", "Installation into {} failed: {e}", slot.display());
                progress.finish(&format!("Failed to install environment '{env_name}'"), false);
            }
        }
        result
    }

    async fn run_install(
        &self,
        spec: &Arc<EnvironmentSpec>,
        slot: &Path,
        progress: &dyn ProgressSink,
    ) -> EnvResult<PathBuf> {
        progress.update("Preparing offline lockfile");
        let spec_for_write = Arc::clone(spec);
        let slot_for_write = slot.to_path_buf();
        let options = self.options.clone();
        tokio::task::spawn_blocking(move || {
            materialize(&spec_for_write, &slot_for_write, &options)
        })
        .await??;

        let cache_dir = self.resolver.root().join(INSTALLER_CACHE_DIR);
        let cache_dir = cache_dir.to_string_lossy();
        let mut request = InstallRequest::new(slot)
            .env("PIXI_CACHE_DIR", cache_dir.as_ref())
            .env("RATTLER_CACHE_DIR", cache_dir.as_ref())
            .with_timeout(self.options.timeout)
            .with_cancel(self.shutdown.child_token());
        for (key, value) in &self.options.extra_env {
            request = request.env(key, value);
        }

        progress.update("Running installer");
        self.installer.run(request).await?.into_result()?;

        let env_dir = environment_dir(slot, &self.options.environment);
        if !installed_marker(&env_dir).exists() {
            warn!(
                target: "installer",
                "Installer succeeded but {} is missing",
                installed_marker(&env_dir).display()
            );
        }
        Ok(env_dir)
    }
}

/// Write the manifest and the localized lockfile into `slot`.
fn materialize(spec: &EnvironmentSpec, slot: &Path, options: &InstallOptions) -> EnvResult<()> {
    if let Some(manifest) = spec.manifest() {
        atomic_write(&slot.join(MANIFEST_NAME), manifest.as_bytes())?;
    }
    let doc = LockfileDocument::parse(spec.lock())?;
    let localized = localize(doc, &options.environment, &options.resource_root)?;
    localized.write_to(&slot.join(LOCKFILE_NAME))?;
    debug!(target: "installer", "Materialized lockfile into {}", slot.display());
    Ok(())
}

/// `<slot>/.pixi/envs/<environment>`
#[must_use]
pub fn environment_dir(slot: &Path, environment: &str) -> PathBuf {
    slot.join(".pixi").join("envs").join(environment)
}

/// File whose presence marks an environment directory as installed.
#[must_use]
pub fn installed_marker(env_dir: &Path) -> PathBuf {
    env_dir.join("conda-meta").join("history")
}

/// One environment spec bound to its cache slot.
///
/// Handles are cheap; every handle for the same spec shares the coordinator's global
/// flight, while concurrent calls on one handle also share its local flight.
pub struct EnvironmentHandle {
    spec: Arc<EnvironmentSpec>,
    slot: PathBuf,
    env_dir: PathBuf,
    coordinator: Arc<InstallCoordinator>,
    local: SingleFlight<(), PathBuf>,
}

impl std::fmt::Debug for EnvironmentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentHandle")
            .field("slot", &self.slot)
            .field("env_dir", &self.env_dir)
            .finish_non_exhaustive()
    }
}

impl EnvironmentHandle {
    /// The cache slot directory.
    #[must_use]
    pub fn slot_dir(&self) -> &Path {
        &self.slot
    }

    /// The installed environment directory.
    #[must_use]
    pub fn environment_dir(&self) -> &Path {
        &self.env_dir
    }

    /// The environment's Python interpreter.
    #[must_use]
    pub fn python_executable(&self) -> PathBuf {
        python_executable(&self.env_dir)
    }

    /// The spec this handle installs.
    #[must_use]
    pub fn spec(&self) -> &EnvironmentSpec {
        &self.spec
    }

    /// Whether the installed marker is present on disk.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        installed_marker(&self.env_dir).exists()
    }

    /// Make sure the environment is installed, installing it at most once per slot.
    ///
    /// Returns the environment directory.
    ///
    /// # Errors
    ///
    /// - [`EnvError::Cancelled`](crate::core::EnvError::Cancelled) if `cancel` fires first
    /// - [`EnvError::Validation`](crate::core::EnvError::Validation) for a lockfile that
    ///   cannot be localized
    /// - [`EnvError::ProcessFailure`](crate::core::EnvError::ProcessFailure),
    ///   [`EnvError::Timeout`](crate::core::EnvError::Timeout) or
    ///   [`EnvError::Io`](crate::core::EnvError::Io) from the installation itself
    pub async fn ensure_installed(
        &self,
        progress: Arc<dyn ProgressSink>,
        cancel: &CancelToken,
    ) -> EnvResult<PathBuf> {
        if self.local.succeeded(&()) {
            return Ok(self.env_dir.clone());
        }

        if self.is_installed() {
            debug!(target: "installer", "{} already installed", self.env_dir.display());
            self.local.complete((), self.env_dir.clone());
            self.coordinator.flights.complete(self.slot.clone(), self.env_dir.clone());
            return Ok(self.env_dir.clone());
        }

        let coordinator = Arc::clone(&self.coordinator);
        let spec = Arc::clone(&self.spec);
        let slot = self.slot.clone();
        self.local
            .run((), move || coordinator.install_slot(spec, slot, progress), cancel)
            .await
    }
}
