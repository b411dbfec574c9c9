//! Integration tests for single-flight installation.

use anyhow::Result;
use envslot::cache::SlotResolver;
use envslot::core::{CancelToken, EnvError};
use envslot::installer::{InstallCoordinator, InstallOptions, Installer};
use envslot::manifest::EnvironmentSpec;
use envslot::test_utils::{
    CountingInstaller, init_test_logging, sample_lockfile, sample_manifest, write_installed_marker,
};
use envslot::utils::NoProgress;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn coordinator(temp: &TempDir, installer: Arc<dyn Installer>) -> Arc<InstallCoordinator> {
    Arc::new(InstallCoordinator::new(
        Arc::new(SlotResolver::new(temp.path().join("cache"))),
        installer,
        InstallOptions::new(temp.path().join("mirror")),
    ))
}

fn spec() -> EnvironmentSpec {
    EnvironmentSpec::with_manifest(sample_lockfile(), sample_manifest())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_handles_install_once() -> Result<()> {
    init_test_logging(None);
    let temp = TempDir::new()?;
    let installer = Arc::new(CountingInstaller::succeeding().with_delay(Duration::from_millis(200)));
    let coordinator = coordinator(&temp, installer.clone());

    let tasks = (0..8).map(|_| {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            let handle = coordinator.handle(spec()).await?;
            handle.ensure_installed(Arc::new(NoProgress), &CancelToken::new()).await
        })
    });

    let mut dirs = Vec::new();
    for joined in join_all(tasks).await {
        dirs.push(joined??);
    }
    assert_eq!(installer.calls(), 1);
    assert!(dirs.windows(2).all(|pair| pair[0] == pair[1]));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_on_one_handle_install_once() -> Result<()> {
    let temp = TempDir::new()?;
    let installer = Arc::new(CountingInstaller::succeeding().with_delay(Duration::from_millis(100)));
    let coordinator = coordinator(&temp, installer.clone());
    let handle = Arc::new(coordinator.handle(spec()).await?);

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let handle = Arc::clone(&handle);
        tasks.push(tokio::spawn(async move {
            handle.ensure_installed(Arc::new(NoProgress), &CancelToken::new()).await
        }));
    }
    for task in tasks {
        task.await??;
    }
    assert_eq!(installer.calls(), 1);
    assert!(handle.is_installed());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_is_shared_then_retried() -> Result<()> {
    let temp = TempDir::new()?;
    let installer = Arc::new(
        CountingInstaller::failing(1, "network unreachable").with_delay(Duration::from_millis(100)),
    );
    let coordinator = coordinator(&temp, installer.clone());

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let coordinator = Arc::clone(&coordinator);
        tasks.push(tokio::spawn(async move {
            let handle = coordinator.handle(spec()).await?;
            handle.ensure_installed(Arc::new(NoProgress), &CancelToken::new()).await
        }));
    }
    for task in tasks {
        let err = task.await?.unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, EnvError::ProcessFailure { exit_code: 1, .. }));
        assert!(message.contains('1') && message.contains("network unreachable"), "{message}");
    }
    assert_eq!(installer.calls(), 1);

    // The failed attempt was cleared, so a later call runs the installer again.
    let handle = coordinator.handle(spec()).await?;
    assert!(handle.ensure_installed(Arc::new(NoProgress), &CancelToken::new()).await.is_err());
    assert_eq!(installer.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn test_marker_short_circuits_new_coordinator() -> Result<()> {
    let temp = TempDir::new()?;
    let first = Arc::new(CountingInstaller::succeeding());
    let handle = coordinator(&temp, first.clone()).handle(spec()).await?;
    handle.ensure_installed(Arc::new(NoProgress), &CancelToken::new()).await?;
    assert_eq!(first.calls(), 1);

    // A new registry in the same cache root trusts the marker on disk.
    let second = Arc::new(CountingInstaller::succeeding());
    let handle = coordinator(&temp, second.clone()).handle(spec()).await?;
    handle.ensure_installed(Arc::new(NoProgress), &CancelToken::new()).await?;
    assert_eq!(second.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_preexisting_marker_skips_installer() -> Result<()> {
    let temp = TempDir::new()?;
    let installer = Arc::new(CountingInstaller::succeeding());
    let coordinator = coordinator(&temp, installer.clone());
    let handle = coordinator.handle(spec()).await?;

    write_installed_marker(handle.slot_dir(), "default")?;
    let env_dir = handle.ensure_installed(Arc::new(NoProgress), &CancelToken::new()).await?;
    assert_eq!(env_dir, handle.environment_dir());
    assert_eq!(installer.calls(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancelled_waiter_leaves_install_running() -> Result<()> {
    let temp = TempDir::new()?;
    let installer = Arc::new(CountingInstaller::succeeding().with_delay(Duration::from_millis(300)));
    let coordinator = coordinator(&temp, installer.clone());

    let impatient = coordinator.handle(spec()).await?;
    let patient = coordinator.handle(spec()).await?;

    let cancel = CancelToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let never = CancelToken::new();
    let (cancelled, completed) = tokio::join!(
        impatient.ensure_installed(Arc::new(NoProgress), &cancel),
        patient.ensure_installed(Arc::new(NoProgress), &never),
    );
    assert!(matches!(cancelled, Err(EnvError::Cancelled)));
    assert_eq!(completed?, patient.environment_dir());
    assert_eq!(installer.calls(), 1);

    // The cancelled handle can pick the result up afterwards.
    impatient.ensure_installed(Arc::new(NoProgress), &CancelToken::new()).await?;
    assert_eq!(installer.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_different_specs_install_separately() -> Result<()> {
    let temp = TempDir::new()?;
    let installer = Arc::new(CountingInstaller::succeeding());
    let coordinator = coordinator(&temp, installer.clone());

    let a = coordinator.handle(spec()).await?;
    let b = coordinator.handle(EnvironmentSpec::new(sample_lockfile())).await?;
    assert_ne!(a.slot_dir(), b.slot_dir());

    a.ensure_installed(Arc::new(NoProgress), &CancelToken::new()).await?;
    b.ensure_installed(Arc::new(NoProgress), &CancelToken::new()).await?;
    assert_eq!(installer.calls(), 2);
    Ok(())
}

#[cfg(unix)]
mod real_process {
    use super::*;
    use envslot::installer::PixiInstaller;
    use envslot::test_utils::{FAKE_PIXI_SUCCESS, fake_pixi_invocations, write_fake_pixi};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fake_pixi_runs_once_for_concurrent_callers() -> Result<()> {
        let temp = TempDir::new()?;
        let bin = temp.path().join("bin");
        let exe = write_fake_pixi(&bin, FAKE_PIXI_SUCCESS)?;
        let coordinator = coordinator(&temp, Arc::new(PixiInstaller::with_executable(exe)));

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let coordinator = Arc::clone(&coordinator);
            tasks.push(tokio::spawn(async move {
                let handle = coordinator.handle(spec()).await?;
                handle.ensure_installed(Arc::new(NoProgress), &CancelToken::new()).await?;
                Ok::<_, EnvError>(handle)
            }));
        }
        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await??);
        }

        assert_eq!(fake_pixi_invocations(&bin), 1);
        let handle = &handles[0];
        assert!(handle.is_installed());
        assert!(handle.slot_dir().join("pixi.toml").exists());
        assert!(std::fs::read_to_string(handle.slot_dir().join("pixi.lock"))?.contains("file://"));

        let log = std::fs::read_to_string(bin.join("invocations.log"))?;
        assert!(log.contains("install --frozen --no-progress --color never"));
        Ok(())
    }

    #[tokio::test]
    async fn test_fake_pixi_failure_surfaces_exit_code_and_stderr() -> Result<()> {
        let temp = TempDir::new()?;
        let bin = temp.path().join("bin");
        let exe = write_fake_pixi(&bin, "echo 'network unreachable' >&2\nexit 1")?;
        let coordinator = coordinator(&temp, Arc::new(PixiInstaller::with_executable(exe)));

        let handle = coordinator.handle(spec()).await?;
        let err = handle
            .ensure_installed(Arc::new(NoProgress), &CancelToken::new())
            .await
            .unwrap_err();
        match &err {
            EnvError::ProcessFailure {
                exit_code,
                stderr,
                ..
            } => {
                assert_eq!(*exit_code, 1);
                assert_eq!(stderr.trim(), "network unreachable");
            }
            other => panic!("expected ProcessFailure, got {other:?}"),
        }
        assert!(err.to_string().contains("exit code 1"));
        assert!(!handle.is_installed());
        Ok(())
    }
}
