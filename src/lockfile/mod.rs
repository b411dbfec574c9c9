//! Structured access to pixi lockfiles.
//!
//! A pixi lockfile (`pixi.lock`) is a YAML document that pins every package of every
//! environment of a workspace:
//!
//! ```yaml
//! version: 6
//! environments:
//!   default:
//!     channels:
//!     - url: https://conda.anaconda.org/conda-forge/
//!     indexes:
//!     - https://pypi.org/simple
//!     packages:
//!       linux-64:
//!       - conda: https://conda.anaconda.org/conda-forge/linux-64/python-3.12.7-hc5c86c4_0_cpython.conda
//!       - pypi: https://files.pythonhosted.org/packages/a1/b2/numpy-2.1.2-cp312-cp312-manylinux_2_17_x86_64.whl
//! packages:
//! - conda: https://conda.anaconda.org/conda-forge/linux-64/python-3.12.7-hc5c86c4_0_cpython.conda
//!   sha256: 0f3e...
//! - pypi: https://files.pythonhosted.org/packages/a1/b2/numpy-2.1.2-cp312-cp312-manylinux_2_17_x86_64.whl
//!   name: numpy
//!   version: 2.1.2
//! ```
//!
//! [`LockfileDocument`] keeps the document as an order-preserving YAML tree instead of a
//! typed model: the localizer only touches a handful of fields and everything else must
//! survive a parse/serialize round trip untouched. See [`localize`] for the offline rewrite.

pub mod localize;

pub use localize::localize;

use crate::core::{EnvError, EnvResult};
use crate::utils::fs::atomic_write;
use serde_yaml::{Mapping, Value};
use std::path::Path;

/// Order-preserving view of a lockfile.
#[derive(Debug, Clone, PartialEq)]
pub struct LockfileDocument {
    root: Mapping,
}

impl LockfileDocument {
    /// Parse lockfile text.
    ///
    /// # Errors
    ///
    /// [`EnvError::Validation`] if the text is not YAML or its top level is not a mapping.
    pub fn parse(text: &str) -> EnvResult<Self> {
        let value: Value = serde_yaml::from_str(text)
            .map_err(|e| EnvError::validation(format!("lockfile is not valid YAML: {e}")))?;
        match value {
            Value::Mapping(root) => Ok(Self { root }),
            other => Err(EnvError::validation(format!(
                "lockfile must be a mapping at the top level, found {}",
                kind_of(&other)
            ))),
        }
    }

    /// Read and parse a lockfile from disk.
    pub fn from_file(path: &Path) -> EnvResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EnvError::io("reading lockfile", path, e))?;
        Self::parse(&text)
    }

    /// Serialize back to YAML, preserving key order.
    pub fn to_yaml(&self) -> EnvResult<String> {
        serde_yaml::to_string(&self.root)
            .map_err(|e| EnvError::validation(format!("lockfile cannot be serialized: {e}")))
    }

    /// Serialize and write atomically to `path`.
    pub fn write_to(&self, path: &Path) -> EnvResult<()> {
        atomic_write(path, self.to_yaml()?.as_bytes())
    }

    /// The `version` field, if it is an unsigned integer.
    #[must_use]
    pub fn version(&self) -> Option<u64> {
        self.root.get("version").and_then(Value::as_u64)
    }

    /// Names of all environments, in document order.
    #[must_use]
    pub fn environment_names(&self) -> Vec<String> {
        self.root
            .get("environments")
            .and_then(Value::as_mapping)
            .map(|envs| envs.keys().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// The top-level mapping.
    #[must_use]
    pub fn root(&self) -> &Mapping {
        &self.root
    }

    /// Mutable access to the top-level mapping.
    pub fn root_mut(&mut self) -> &mut Mapping {
        &mut self.root
    }
}

/// Short name of a YAML node kind for error messages.
pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
