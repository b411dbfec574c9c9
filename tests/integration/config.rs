//! Integration tests for configuration loading.

use anyhow::Result;
use envslot::config::{CONFIG_PATH_ENV, GlobalConfig};
use serial_test::serial;
use std::time::Duration;
use tempfile::TempDir;

/// Sets `ENVSLOT_CONFIG_PATH` for the lifetime of the guard.
struct ConfigPathGuard {
    previous: Option<String>,
}

impl ConfigPathGuard {
    fn set(value: &std::path::Path) -> Self {
        let previous = std::env::var(CONFIG_PATH_ENV).ok();
        // Tests touching the variable are `#[serial]`.
        unsafe { std::env::set_var(CONFIG_PATH_ENV, value) };
        Self { previous }
    }
}

impl Drop for ConfigPathGuard {
    fn drop(&mut self) {
        unsafe {
            match &self.previous {
                Some(value) => std::env::set_var(CONFIG_PATH_ENV, value),
                None => std::env::remove_var(CONFIG_PATH_ENV),
            }
        }
    }
}

#[tokio::test]
#[serial]
async fn test_env_override_selects_config_file() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("custom.toml");
    std::fs::write(
        &path,
        "cache_root = \"/srv/envs\"\nenvironment = \"docs\"\ninstall_timeout_secs = 30\n",
    )?;

    let _guard = ConfigPathGuard::set(&path);
    assert_eq!(GlobalConfig::default_path()?, path);

    let config = GlobalConfig::load().await?;
    assert_eq!(config.cache_root, "/srv/envs");
    assert_eq!(config.environment, "docs");
    assert_eq!(config.install_timeout(), Duration::from_secs(30));
    // Unset keys keep their defaults.
    assert_eq!(config.resource_root, GlobalConfig::default().resource_root);
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_missing_file_yields_defaults() -> Result<()> {
    let temp = TempDir::new()?;
    let _guard = ConfigPathGuard::set(&temp.path().join("absent.toml"));

    let config = GlobalConfig::load().await?;
    assert_eq!(config.environment, "default");
    assert_eq!(config.install_timeout(), Duration::from_secs(20 * 60));
    assert!(config.installer_path.is_none());
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_save_then_load_preserves_extra_env() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("nested").join("config.toml");
    let _guard = ConfigPathGuard::set(&path);

    let mut config = GlobalConfig::default();
    config.extra_env.insert("CONDA_OVERRIDE_CUDA".to_string(), "12.0".to_string());
    config.installer_path = Some("/opt/pixi/bin/pixi".to_string());
    config.save().await?;

    let loaded = GlobalConfig::load().await?;
    assert_eq!(loaded.extra_env.get("CONDA_OVERRIDE_CUDA").map(String::as_str), Some("12.0"));
    assert_eq!(loaded.installer_path.as_deref(), Some("/opt/pixi/bin/pixi"));

    let options = loaded.install_options()?;
    assert!(options.extra_env.iter().any(|(k, v)| k == "CONDA_OVERRIDE_CUDA" && v == "12.0"));
    Ok(())
}

#[tokio::test]
async fn test_invalid_toml_reports_path() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("broken.toml");
    std::fs::write(&path, "cache_root = [\n")?;

    let err = GlobalConfig::load_with_optional(Some(path.clone())).await.unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse config"));
    assert!(err.to_string().contains(&path.display().to_string()));
    Ok(())
}

#[tokio::test]
async fn test_example_config_matches_defaults() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("config.toml");
    std::fs::write(&path, GlobalConfig::init_example())?;

    let loaded = GlobalConfig::load_from(&path).await?;
    let defaults = GlobalConfig::default();
    assert_eq!(loaded.cache_root, defaults.cache_root);
    assert_eq!(loaded.resource_root, defaults.resource_root);
    assert_eq!(loaded.install_timeout_secs, defaults.install_timeout_secs);
    Ok(())
}
