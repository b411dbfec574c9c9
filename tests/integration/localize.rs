//! Integration tests for offline lockfile localization.

use anyhow::Result;
use envslot::core::EnvError;
use envslot::lockfile::{LockfileDocument, localize};
use envslot::test_utils::sample_lockfile;
use serde_yaml::Value;
use std::path::Path;
use tempfile::TempDir;

fn environment<'a>(doc: &'a LockfileDocument, name: &str) -> &'a Value {
    &doc.root()["environments"][name]
}

#[test]
fn test_localized_lockfile_installs_from_mirror() -> Result<()> {
    let temp = TempDir::new()?;
    let mirror = temp.path().join("mirror");
    let doc = localize(LockfileDocument::parse(&sample_lockfile())?, "default", &mirror)?;

    assert_eq!(doc.version(), Some(6));
    assert_eq!(doc.environment_names(), vec!["default".to_string()]);

    let env = environment(&doc, "default");
    assert!(env.get("indexes").is_none());
    assert!(env.get("find-links").is_none());

    let channels = env["channels"].as_sequence().map(Vec::len);
    assert_eq!(channels, Some(1));
    let channel = env["channels"][0]["url"].as_str().unwrap_or_default();
    assert!(channel.starts_with("file://"), "{channel}");
    assert!(channel.ends_with("/mirror/channel/"), "{channel}");

    let linux = env["packages"]["linux-64"].as_sequence().cloned().unwrap_or_default();
    let python = linux[0]["conda"].as_str().unwrap_or_default();
    assert_eq!(
        Path::new(python),
        mirror.join("channel/linux-64/python-3.12.7-hc5c86c4_0_cpython.conda")
    );
    let tzdata = linux[1]["conda"].as_str().unwrap_or_default();
    assert_eq!(Path::new(tzdata), mirror.join("channel/noarch/tzdata-2024b-hc8b5060_0.conda"));
    let numpy = linux[2]["pypi"].as_str().unwrap_or_default();
    assert_eq!(
        Path::new(numpy),
        mirror.join("pypi/numpy-2.1.2-cp312-cp312-manylinux_2_17_x86_64.manylinux2014_x86_64.whl")
    );
    Ok(())
}

#[test]
fn test_package_records_gain_subdir_and_local_channel() -> Result<()> {
    let temp = TempDir::new()?;
    let doc = localize(LockfileDocument::parse(&sample_lockfile())?, "default", temp.path())?;
    let channel = environment(&doc, "default")["channels"][0]["url"].clone();

    let records = doc.root()["packages"].as_sequence().cloned().unwrap_or_default();
    assert!(!records.is_empty());
    for record in &records {
        if let Some(path) = record.get("conda").and_then(Value::as_str) {
            let subdir = record["subdir"].as_str().unwrap_or_default();
            assert!(subdir == "linux-64" || subdir == "osx-arm64" || subdir == "noarch");
            assert!(path.contains(&format!("channel{}{subdir}", std::path::MAIN_SEPARATOR)));
            assert_eq!(record["channel"], channel);
        } else {
            let path = record["pypi"].as_str().unwrap_or_default();
            assert!(Path::new(path).starts_with(temp.path().join("pypi")));
            assert!(record.get("subdir").is_none());
        }
    }

    // Fields the rewrite does not own are preserved.
    assert_eq!(records[0]["md5"].as_str(), Some("0515111a9cdf69f83278f7c197db9807"));
    assert_eq!(records[4]["name"].as_str(), Some("numpy"));
    Ok(())
}

#[test]
fn test_other_environment_can_be_selected() -> Result<()> {
    let temp = TempDir::new()?;
    let doc = localize(LockfileDocument::parse(&sample_lockfile())?, "docs", temp.path())?;

    assert_eq!(doc.environment_names(), vec!["docs".to_string()]);
    assert!(environment(&doc, "docs").get("find-links").is_none());
    Ok(())
}

#[test]
fn test_rejects_other_versions() -> Result<()> {
    let temp = TempDir::new()?;
    let lock = sample_lockfile().replacen("version: 6", "version: 5", 1);
    let err = localize(LockfileDocument::parse(&lock)?, "default", temp.path()).unwrap_err();

    assert!(matches!(err, EnvError::Validation { .. }));
    assert!(err.to_string().contains("version 6"), "{err}");
    Ok(())
}

#[test]
fn test_rejects_unknown_environment() -> Result<()> {
    let temp = TempDir::new()?;
    let err =
        localize(LockfileDocument::parse(&sample_lockfile())?, "gpu", temp.path()).unwrap_err();

    let message = err.to_string();
    assert!(message.contains("'gpu'"), "{message}");
    assert!(message.contains("default") && message.contains("docs"), "{message}");
    Ok(())
}

#[test]
fn test_rejects_entries_without_known_kind() -> Result<()> {
    let temp = TempDir::new()?;
    let lock = "version: 6
environments:
  default:
    channels: []
    packages:
      linux-64:
      - git: https://example.com/repo.git
packages: []
";
    let err = localize(LockfileDocument::parse(lock)?, "default", temp.path()).unwrap_err();
    assert!(err.to_string().contains("neither a 'conda' nor a 'pypi' key"), "{err}");
    Ok(())
}

#[test]
fn test_localized_document_survives_disk_round_trip() -> Result<()> {
    let temp = TempDir::new()?;
    let doc = localize(LockfileDocument::parse(&sample_lockfile())?, "default", temp.path())?;

    let path = temp.path().join("pixi.lock");
    doc.write_to(&path)?;
    let reread = LockfileDocument::from_file(&path)?;

    assert_eq!(reread.root(), doc.root());
    let keys: Vec<_> = reread.root().keys().filter_map(Value::as_str).collect();
    assert_eq!(keys, ["version", "environments", "packages"]);
    Ok(())
}
