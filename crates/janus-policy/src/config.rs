// config.rs — Decision point configuration.
//
// Read from `.janus/pdp.toml` under a project root:
//
// ```toml
// policy_dir = "policies"
// duplicate_policy = "reject"   # or "overwrite"
// disabled_marker = ".disabled"
// ```
//
// Every key is optional. A missing file means all defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::loader::{LoadReport, PolicyLoader, DEFAULT_DISABLED_MARKER};
use crate::store::{DuplicatePolicy, PolicyStore};

/// Config file location relative to the project root.
pub const CONFIG_FILE: &str = ".janus/pdp.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PdpConfig {
    /// Directory scanned for policy YAML files.
    pub policy_dir: PathBuf,

    /// How repeated policy ids are handled at load time.
    pub duplicate_policy: DuplicatePolicy,

    /// Policy files whose path contains this string are ignored.
    pub disabled_marker: String,
}

impl Default for PdpConfig {
    fn default() -> Self {
        Self {
            policy_dir: PathBuf::from("policies"),
            duplicate_policy: DuplicatePolicy::default(),
            disabled_marker: DEFAULT_DISABLED_MARKER.to_string(),
        }
    }
}

impl PdpConfig {
    /// Parse a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Parse a config file, falling back to defaults if it is missing or invalid.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("ignoring config {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Config for a project, with `policy_dir` resolved against the project root.
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        let root = project_root.as_ref();
        let mut config = Self::load_or_default(root.join(CONFIG_FILE));
        if config.policy_dir.is_relative() {
            config.policy_dir = root.join(&config.policy_dir);
        }
        config
    }

    pub fn loader(&self) -> PolicyLoader {
        PolicyLoader::new().with_disabled_marker(self.disabled_marker.clone())
    }

    /// Build a fresh store from `policy_dir`.
    pub fn load_store(&self) -> (PolicyStore, LoadReport) {
        let mut store = PolicyStore::with_duplicate_policy(self.duplicate_policy);
        let report = self.loader().load_dir(&mut store, &self.policy_dir);
        (store, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults() {
        let config = PdpConfig::default();
        assert_eq!(config.policy_dir, PathBuf::from("policies"));
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Reject);
        assert_eq!(config.disabled_marker, ".disabled");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pdp.toml");
        fs::write(&path, "duplicate_policy = \"overwrite\"\n").unwrap();

        let config = PdpConfig::load(&path).unwrap();
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Overwrite);
        assert_eq!(config.policy_dir, PathBuf::from("policies"));
    }

    #[test]
    fn invalid_file_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pdp.toml");
        fs::write(&path, "duplicate_policy = \"sometimes\"\n").unwrap();

        assert!(matches!(PdpConfig::load(&path), Err(PolicyError::Config(_))));
        assert_eq!(PdpConfig::load_or_default(&path), PdpConfig::default());
    }

    #[test]
    fn for_project_resolves_relative_policy_dir() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".janus")).unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "policy_dir = \"rules\"\ndisabled_marker = \".off\"\n",
        )
        .unwrap();

        let config = PdpConfig::for_project(dir.path());
        assert_eq!(config.policy_dir, dir.path().join("rules"));
        assert_eq!(config.loader().disabled_marker(), ".off");
    }

    #[test]
    fn for_project_without_config_uses_policies_dir() {
        let dir = tempdir().unwrap();
        let config = PdpConfig::for_project(dir.path());
        assert_eq!(config.policy_dir, dir.path().join("policies"));
    }

    #[test]
    fn load_store_reads_policy_dir() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("policies")).unwrap();
        fs::write(
            dir.path().join("policies/base.yaml"),
            "policies:\n  - id: p1\n    action: a\n    effect: allow\n",
        )
        .unwrap();

        let (store, report) = PdpConfig::for_project(dir.path()).load_store();
        assert_eq!(store.size(), 1);
        assert_eq!(report.policies_loaded, 1);
        assert_eq!(store.duplicate_policy(), DuplicatePolicy::Reject);
    }
}
