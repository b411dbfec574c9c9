//! Offline rewrite of a lockfile against a local resource mirror.
//!
//! The mirror is laid out as:
//!
//! ```text
//! <resource_root>/
//! ├── channel/<subdir>/<file>   # conda packages, e.g. channel/linux-64/zlib-1.3.1-h0.conda
//! └── pypi/<file>               # wheels and sdists
//! ```
//!
//! [`localize`] keeps a single environment, points its channel at the mirror, drops the
//! PyPI indexes and find-links, and rewrites every package reference so the installer can
//! run with `--frozen` without touching the network.
//!
//! The transform is strict: any entry it does not understand fails with
//! [`EnvError::Validation`] instead of being passed through with a remote URL.

use super::{LockfileDocument, kind_of};
use crate::constants::SUPPORTED_LOCK_VERSION;
use crate::core::{EnvError, EnvResult};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

const CONDA: &str = "conda";
const PYPI: &str = "pypi";

/// Local locations derived from the resource root.
struct Mirror {
    root: PathBuf,
    channel_url: String,
}

impl Mirror {
    fn new(resource_root: &Path) -> EnvResult<Self> {
        let root = std::path::absolute(resource_root)
            .map_err(|e| EnvError::io("resolving resource root", resource_root, e))?;
        let channel_url = Url::from_directory_path(root.join("channel"))
            .map_err(|()| {
                EnvError::validation(format!(
                    "resource root {} cannot be expressed as a file URL",
                    root.display()
                ))
            })?
            .to_string();
        Ok(Self { root, channel_url })
    }

    fn conda_path(&self, subdir: &str, file: &str) -> String {
        self.root.join("channel").join(subdir).join(file).to_string_lossy().into_owned()
    }

    fn pypi_path(&self, file: &str) -> String {
        self.root.join("pypi").join(file).to_string_lossy().into_owned()
    }
}

/// Rewrite `doc` so that `target_env` installs entirely from `resource_root`.
///
/// 1. Require lockfile version 6
/// 2. Drop every environment except `target_env`
/// 3. Replace its channels with the single local channel `file://<resource_root>/channel/`
/// 4. Remove its `indexes` and `find-links`
/// 5. Rewrite its per-platform package references:
///    conda `.../<subdir>/<file>` becomes `<resource_root>/channel/<subdir>/<file>`,
///    pypi `.../<file>` becomes `<resource_root>/pypi/<file>`
/// 6. Apply the same rewrite to the top-level `packages` list, adding `subdir` to conda
///    entries and setting their `channel` field to the local channel URL
///
/// # Errors
///
/// [`EnvError::Validation`] for an unsupported version, a missing target environment, or
/// any malformed section or package entry.
///
/// # Examples
///
/// ```rust
/// use envslot::lockfile::{LockfileDocument, localize};
/// use std::path::Path;
///
/// let doc = LockfileDocument::parse("version: 5\nenvironments: {}\npackages: []\n").unwrap();
/// let err = localize(doc, "default", Path::new("/mirror")).unwrap_err();
/// assert!(err.to_string().contains("version 6"));
/// ```
pub fn localize(
    mut doc: LockfileDocument,
    target_env: &str,
    resource_root: &Path,
) -> EnvResult<LockfileDocument> {
    check_version(&doc)?;
    let mirror = Mirror::new(resource_root)?;
    let root = doc.root_mut();

    let environments = root
        .get_mut("environments")
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| EnvError::validation("lockfile has no 'environments' mapping"))?;

    let mut env = environments.shift_remove(target_env).ok_or_else(|| {
        let available: Vec<_> = environments.keys().filter_map(Value::as_str).collect();
        EnvError::validation(format!(
            "environment '{target_env}' not found in lockfile (available: {})",
            available.join(", ")
        ))
    })?;
    environments.clear();

    localize_environment(&mut env, target_env, &mirror)?;
    environments.insert(Value::from(target_env), env);

    let packages = root
        .get_mut("packages")
        .and_then(Value::as_sequence_mut)
        .ok_or_else(|| EnvError::validation("lockfile has no top-level 'packages' list"))?;
    for (index, entry) in packages.iter_mut().enumerate() {
        localize_package_record(entry, index, &mirror)?;
    }

    debug!(
        target: "lockfile",
        "Localized environment '{target_env}' against {}",
        mirror.root.display()
    );
    Ok(doc)
}

fn check_version(doc: &LockfileDocument) -> EnvResult<()> {
    match doc.root().get("version") {
        Some(value) if value.as_u64() == Some(SUPPORTED_LOCK_VERSION) => Ok(()),
        Some(value) => Err(EnvError::validation(format!(
            "unsupported lockfile version {}, only version {SUPPORTED_LOCK_VERSION} is supported",
            render_scalar(value)
        ))),
        None => Err(EnvError::validation(format!(
            "lockfile has no version, only version {SUPPORTED_LOCK_VERSION} is supported"
        ))),
    }
}

fn localize_environment(env: &mut Value, name: &str, mirror: &Mirror) -> EnvResult<()> {
    let env = env
        .as_mapping_mut()
        .ok_or_else(|| EnvError::validation(format!("environment '{name}' must be a mapping")))?;

    let mut channel = Mapping::new();
    channel.insert(Value::from("url"), Value::from(mirror.channel_url.as_str()));
    env.insert(Value::from("channels"), Value::Sequence(vec![Value::Mapping(channel)]));
    env.shift_remove("indexes");
    env.shift_remove("find-links");

    let platforms = env
        .get_mut("packages")
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| {
            EnvError::validation(format!("environment '{name}' has no 'packages' mapping"))
        })?;

    for (platform, refs) in platforms.iter_mut() {
        let platform = platform.as_str().unwrap_or("<non-string platform>").to_string();
        let refs = refs.as_sequence_mut().ok_or_else(|| {
            EnvError::validation(format!(
                "packages for platform '{platform}' in environment '{name}' must be a list"
            ))
        })?;
        for entry in refs {
            let kind_name = kind_of(entry);
            let entry = entry.as_mapping_mut().ok_or_else(|| {
                EnvError::validation(format!(
                    "package reference for platform '{platform}' must be a mapping, found {kind_name}"
                ))
            })?;
            rewrite_reference(entry, mirror, &format!("platform '{platform}'"))?;
        }
    }
    Ok(())
}

fn localize_package_record(entry: &mut Value, index: usize, mirror: &Mirror) -> EnvResult<()> {
    let context = format!("package #{index}");
    let kind_name = kind_of(entry);
    let entry = entry.as_mapping_mut().ok_or_else(|| {
        EnvError::validation(format!("{context} must be a mapping, found {kind_name}"))
    })?;

    if let Some(subdir) = rewrite_reference(entry, mirror, &context)? {
        entry.insert(Value::from("subdir"), Value::from(subdir));
        entry.insert(Value::from("channel"), Value::from(mirror.channel_url.as_str()));
    }
    Ok(())
}

/// Rewrite the `conda` or `pypi` key of `entry` in place.
///
/// Returns the subdir for conda references, `None` for pypi ones.
fn rewrite_reference(
    entry: &mut Mapping,
    mirror: &Mirror,
    context: &str,
) -> EnvResult<Option<String>> {
    if let Some(value) = entry.get_mut(CONDA) {
        let reference = string_ref(value, CONDA, context)?;
        let [subdir, file] = tail_segments::<2>(reference).ok_or_else(|| {
            EnvError::validation(format!(
                "conda reference '{reference}' in {context} has no '<subdir>/<file>' part"
            ))
        })?;
        *value = Value::from(mirror.conda_path(&subdir, &file));
        return Ok(Some(subdir));
    }

    if let Some(value) = entry.get_mut(PYPI) {
        let reference = string_ref(value, PYPI, context)?;
        let [file] = tail_segments::<1>(reference).ok_or_else(|| {
            EnvError::validation(format!(
                "pypi reference '{reference}' in {context} has no '/<file>' part"
            ))
        })?;
        *value = Value::from(mirror.pypi_path(&file));
        return Ok(None);
    }

    Err(EnvError::validation(format!("{context} has neither a 'conda' nor a 'pypi' key")))
}

fn string_ref<'a>(value: &'a Value, key: &str, context: &str) -> EnvResult<&'a str> {
    value.as_str().ok_or_else(|| {
        EnvError::validation(format!(
            "'{key}' in {context} must be a string, found {}",
            kind_of(value)
        ))
    })
}

/// The last `N` non-empty path segments of a URL or path, provided a separator precedes them.
///
/// URLs go through [`Url`] so query strings and `#sha256=` fragments are ignored. Segments
/// are kept percent-encoded, as the mirror stores files under their URL names.
fn tail_segments<const N: usize>(reference: &str) -> Option<[String; N]> {
    let segments: Vec<String> = match Url::parse(reference) {
        Ok(url) if url.cannot_be_a_base() => return None,
        Ok(url) => url
            .path_segments()?
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => {
            if !reference.contains(['/', '\\']) {
                return None;
            }
            reference
                .split(['/', '\\'])
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }
    };
    if segments.len() < N {
        return None;
    }
    segments[segments.len() - N..].to_vec().try_into().ok()
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{s}'"),
        Value::Number(n) => n.to_string(),
        other => kind_of(other).to_string(),
    }
}
