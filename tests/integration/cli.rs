//! End-to-end tests for the `envslot` binary.

use crate::common::TestCache;
use anyhow::Result;
use assert_cmd::Command;
use envslot::test_utils::{sample_lockfile, sample_manifest};
use predicates::prelude::*;

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("envslot")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("resolve"))
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("localize"));
}

#[test]
fn test_resolve_allocates_slots_in_order() -> Result<()> {
    let cache = TestCache::new()?;
    let lock_a = cache.write_file("a.lock", &sample_lockfile())?;
    let lock_b = cache.write_file("b.lock", "version: 6\nenvironments: {}\npackages: []\n")?;

    let first = cache.run_envslot(&["resolve", "--lock", &lock_a.to_string_lossy()])?;
    first.assert_success();
    assert_eq!(first.stdout.trim(), cache.cache_dir.join("0").display().to_string());

    let second = cache.run_envslot(&["resolve", "--lock", &lock_b.to_string_lossy()])?;
    second.assert_success();
    assert_eq!(second.stdout.trim(), cache.cache_dir.join("1").display().to_string());

    // Adding a manifest changes the identity.
    let manifest = cache.write_file("pixi.toml", &sample_manifest())?;
    let third = cache.run_envslot(&[
        "resolve",
        "--lock",
        &lock_a.to_string_lossy(),
        "--manifest",
        &manifest.to_string_lossy(),
    ])?;
    third.assert_success();
    assert_eq!(third.stdout.trim(), cache.cache_dir.join("2").display().to_string());

    let again = cache.run_envslot(&["resolve", "--lock", &lock_a.to_string_lossy()])?;
    assert_eq!(again.stdout, first.stdout);
    Ok(())
}

#[test]
fn test_resolve_missing_lockfile_fails() -> Result<()> {
    let cache = TestCache::new()?;
    let missing = cache.root.join("missing.lock");

    let output = cache.run_envslot(&["resolve", "--lock", &missing.to_string_lossy()])?;
    assert!(!output.success);
    assert_eq!(output.code, Some(1));
    assert!(output.stderr.contains("missing.lock"), "{}", output.stderr);
    Ok(())
}

#[test]
fn test_localize_prints_local_references() -> Result<()> {
    let cache = TestCache::new()?;
    let lock = cache.write_file("pixi.lock", &sample_lockfile())?;

    let output = cache.run_envslot(&["localize", "--lock", &lock.to_string_lossy()])?;
    output
        .assert_success()
        .assert_stdout_contains("file://")
        .assert_stdout_contains("version: 6");
    assert!(!output.stdout.contains("https://"), "{}", output.stdout);
    assert!(!output.stdout.contains("docs:"));
    Ok(())
}

#[test]
fn test_localize_writes_output_file() -> Result<()> {
    let cache = TestCache::new()?;
    let lock = cache.write_file("pixi.lock", &sample_lockfile())?;
    let out = cache.root.join("out").join("pixi.lock");

    cache
        .run_envslot(&[
            "localize",
            "--lock",
            &lock.to_string_lossy(),
            "-e",
            "docs",
            "-o",
            &out.to_string_lossy(),
        ])?
        .assert_success();

    let written = std::fs::read_to_string(&out)?;
    assert!(written.contains("docs:"));
    assert!(written.contains("mkdocs-1.6.1-pyhd8ed1ab_0.conda"));
    Ok(())
}

#[test]
fn test_localize_rejects_old_version() -> Result<()> {
    let cache = TestCache::new()?;
    let lock = cache.write_file("old.lock", "version: 4\nenvironments: {}\npackages: []\n")?;

    let output = cache.run_envslot(&["localize", "--lock", &lock.to_string_lossy()])?;
    assert!(!output.success);
    assert!(output.stderr.contains("version 6"), "{}", output.stderr);
    Ok(())
}

#[test]
fn test_list_reports_slots() -> Result<()> {
    let cache = TestCache::new()?;
    cache
        .run_envslot(&["list"])?
        .assert_success()
        .assert_stdout_contains("No cache slots");

    let lock = cache.write_file("pixi.lock", &sample_lockfile())?;
    cache.run_envslot(&["resolve", "--lock", &lock.to_string_lossy()])?.assert_success();

    let output = cache.run_envslot(&["list", "--json"])?;
    output.assert_success();
    let rows: serde_json::Value = serde_json::from_str(&output.stdout)?;
    let rows = rows.as_array().cloned().unwrap_or_default();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["slot"], "0");
    assert_eq!(rows[0]["installed"], false);
    assert_eq!(rows[0]["hash"].as_str().map(str::len), Some(64));
    Ok(())
}

#[test]
fn test_list_tolerates_hand_edited_mapping() -> Result<()> {
    let cache = TestCache::new()?;
    std::fs::create_dir_all(cache.cache_dir.join("0"))?;
    std::fs::write(cache.cache_dir.join("slot-mapping.txt"), "aéééééééééé=0\n")?;

    cache
        .run_envslot(&["list"])?
        .assert_success()
        .assert_stdout_contains("aéééééééééé");
    Ok(())
}

#[test]
fn test_config_subcommands() -> Result<()> {
    let cache = TestCache::new()?;

    cache
        .run_envslot(&["config", "path"])?
        .assert_success()
        .assert_stdout_contains(&cache.config_path.display().to_string());

    cache
        .run_envslot(&["config", "show"])?
        .assert_success()
        .assert_stdout_contains("cache_root")
        .assert_stdout_contains("install_timeout_secs = 1200");

    cache
        .run_envslot(&["config", "init"])?
        .assert_success()
        .assert_stdout_contains("already exists");

    cache
        .run_envslot(&["config", "init", "--force"])?
        .assert_success()
        .assert_stdout_contains("Created config");
    let written = std::fs::read_to_string(&cache.config_path)?;
    assert!(written.contains("# envslot configuration"));
    Ok(())
}

#[cfg(unix)]
mod install {
    use super::*;
    use envslot::test_utils::{FAKE_PIXI_SUCCESS, fake_pixi_invocations, write_fake_pixi};

    #[test]
    fn test_install_runs_installer_once() -> Result<()> {
        let cache = TestCache::new()?;
        let bin = cache.root.join("bin");
        cache.write_config(Some(&write_fake_pixi(&bin, FAKE_PIXI_SUCCESS)?))?;
        let lock = cache.write_file("pixi.lock", &sample_lockfile())?;
        let manifest = cache.write_file("pixi.toml", &sample_manifest())?;
        let lock = lock.to_string_lossy().into_owned();
        let manifest = manifest.to_string_lossy().into_owned();
        let args = ["install", "--lock", &lock, "--manifest", &manifest, "--json"];

        let output = cache.run_envslot(&args)?;
        output.assert_success().assert_stdout_contains("\"python\"");
        let report: serde_json::Value = serde_json::from_str(&output.stdout)?;
        assert_eq!(report["environment"], "default");
        let env_dir = report["environment_dir"].as_str().unwrap_or_default();
        assert!(env_dir.ends_with(".pixi/envs/default"), "{env_dir}");
        assert!(report["python"].as_str().unwrap_or_default().ends_with("bin/python"));

        let slot = cache.cache_dir.join("0");
        assert!(slot.join("pixi.toml").exists());
        assert!(slot.join("pixi.lock").exists());

        // Second run finds the marker and does not call the installer.
        cache.run_envslot(&args)?.assert_success();
        assert_eq!(fake_pixi_invocations(&bin), 1);

        let listed = cache.run_envslot(&["list", "--json"])?;
        let rows: serde_json::Value = serde_json::from_str(&listed.stdout)?;
        assert_eq!(rows[0]["installed"], true);
        Ok(())
    }

    #[test]
    fn test_install_failure_exits_nonzero() -> Result<()> {
        let cache = TestCache::new()?;
        let bin = cache.root.join("bin");
        let pixi = write_fake_pixi(&bin, "echo 'network unreachable' >&2\nexit 1")?;
        cache.write_config(Some(&pixi))?;
        let lock = cache.write_file("pixi.lock", &sample_lockfile())?;

        let output = cache.run_envslot(&["install", "--lock", &lock.to_string_lossy()])?;
        assert!(!output.success);
        assert_eq!(output.code, Some(1));
        assert!(output.stderr.contains("network unreachable"), "{}", output.stderr);
        assert!(output.stderr.contains("exit code 1"), "{}", output.stderr);
        Ok(())
    }

    #[test]
    fn test_install_unknown_environment_skips_installer() -> Result<()> {
        let cache = TestCache::new()?;
        let bin = cache.root.join("bin");
        cache.write_config(Some(&write_fake_pixi(&bin, FAKE_PIXI_SUCCESS)?))?;
        let lock = cache.write_file("pixi.lock", &sample_lockfile())?;

        let output =
            cache.run_envslot(&["install", "--lock", &lock.to_string_lossy(), "-e", "gpu"])?;
        assert!(!output.success);
        assert!(output.stderr.contains("'gpu'"), "{}", output.stderr);
        assert_eq!(fake_pixi_invocations(&bin), 0);
        Ok(())
    }
}
