// error.rs — Error types for the policy subsystem.
//
// Evaluation itself never fails; these cover building the policy set
// (store inserts, document parsing, config loading).

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or storing policies.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A policy with the same id is already in a store that rejects duplicates.
    #[error("duplicate policy id '{id}'")]
    DuplicatePolicy { id: String },

    /// The policy is missing a required field.
    #[error("invalid policy '{id}': {reason}")]
    InvalidPolicy { id: String, reason: String },

    /// Failed to read a policy document or config file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The policy document is not valid YAML (or not the expected shape).
    #[error("failed to parse policy document: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The config file is not valid TOML.
    #[error("failed to parse config: {0}")]
    Config(#[from] toml::de::Error),
}
