// loader.rs — Load policy documents from YAML files and directories.
//
// Document format:
//
// ```yaml
// policies:
//   - id: enterprise-pii-protection
//     level: enterprise
//     priority: 1
//     action: "data.export"
//     resource: "external"
//     effect: deny
// ```
//
// Loading degrades gracefully: an entry without `id` or `action` is skipped
// silently, a malformed entry (including a non-string `id` or `action`) is
// skipped with a warning, and an unreadable
// file is skipped with an error log. Nothing here aborts a directory load.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_yaml::Value;

use crate::error::PolicyError;
use crate::policy::Policy;
use crate::store::PolicyStore;

/// Default substring that marks a policy file as switched off.
pub const DEFAULT_DISABLED_MARKER: &str = ".disabled";

/// A policy entry that did not make it into the store.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedEntry {
    /// File the entry came from, when loaded from disk.
    pub file: Option<PathBuf>,
    /// Position of the entry in the document's `policies` list.
    pub index: usize,
    /// The entry's id, if it had a readable one.
    pub id: Option<String>,
    pub reason: String,
}

/// Policies parsed from one document, plus the entries that were dropped.
#[derive(Debug, Clone, Default)]
pub struct LoadedDocument {
    /// Parsed policies, each with its position in the document's `policies` list.
    pub policies: Vec<(usize, Policy)>,
    pub skipped: Vec<SkippedEntry>,
}

/// A file that could not be read or parsed at all.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: String,
}

/// Summary of a file or directory load.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub files_loaded: usize,
    pub policies_loaded: usize,
    pub skipped: Vec<SkippedEntry>,
    pub failed_files: Vec<FailedFile>,
}

impl LoadReport {
    fn merge(&mut self, other: LoadReport) {
        self.files_loaded += other.files_loaded;
        self.policies_loaded += other.policies_loaded;
        self.skipped.extend(other.skipped);
        self.failed_files.extend(other.failed_files);
    }
}

/// Parse a YAML policy document.
///
/// Only a document that is not YAML at all, or whose `policies` key is not a
/// list, is an error. A document without `policies` yields nothing.
pub fn parse_policies(yaml: &str) -> Result<LoadedDocument, PolicyError> {
    let doc: Value = serde_yaml::from_str(yaml)?;

    let entries = match doc.get("policies") {
        None | Some(Value::Null) => {
            tracing::debug!("document has no policies list");
            return Ok(LoadedDocument::default());
        }
        Some(list) => serde_yaml::from_value::<Vec<Value>>(list.clone())?,
    };

    let mut loaded = LoadedDocument::default();
    for (index, entry) in entries.into_iter().enumerate() {
        let fields = string_field(&entry, "id")
            .and_then(|id| Ok((id, string_field(&entry, "action")?)));
        let (id, action) = match fields {
            Ok(fields) => fields,
            Err(reason) => {
                tracing::warn!(index, "skipping malformed policy entry: {}", reason);
                loaded.skipped.push(SkippedEntry {
                    file: None,
                    index,
                    id: string_field(&entry, "id").ok().flatten(),
                    reason,
                });
                continue;
            }
        };

        if id.is_none() || action.is_none() {
            tracing::debug!(index, "skipping policy entry without id or action");
            loaded.skipped.push(SkippedEntry {
                file: None,
                index,
                id,
                reason: "missing id or action".to_string(),
            });
            continue;
        }

        match serde_yaml::from_value::<Policy>(entry) {
            Ok(policy) => loaded.policies.push((index, policy)),
            Err(e) => {
                tracing::warn!(index, id = ?id, "skipping malformed policy entry: {}", e);
                loaded.skipped.push(SkippedEntry {
                    file: None,
                    index,
                    id,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(loaded)
}

/// `Ok(None)` when `key` is absent or blank, `Err` when it holds something other than a string.
fn string_field(entry: &Value, key: &str) -> Result<Option<String>, String> {
    match entry.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(format!("`{}` must be a string, found {}", key, kind(other))),
    }
}

fn kind(value: &Value) -> &'static str {
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

/// Reads policy files into a `PolicyStore`.
#[derive(Debug, Clone)]
pub struct PolicyLoader {
    disabled_marker: String,
}

impl Default for PolicyLoader {
    fn default() -> Self {
        Self {
            disabled_marker: DEFAULT_DISABLED_MARKER.to_string(),
        }
    }
}

impl PolicyLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files whose path (relative to the loaded directory) contains `marker` are ignored.
    pub fn with_disabled_marker(mut self, marker: impl Into<String>) -> Self {
        self.disabled_marker = marker.into();
        self
    }

    pub fn disabled_marker(&self) -> &str {
        &self.disabled_marker
    }

    /// Load one YAML file into `store`.
    ///
    /// Fails only when the file cannot be read or parsed; individual bad
    /// entries (including duplicate ids in a rejecting store) are reported
    /// as skipped.
    pub fn load_file(
        &self,
        store: &mut PolicyStore,
        path: impl AsRef<Path>,
    ) -> Result<LoadReport, PolicyError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc = parse_policies(&content)?;

        let mut report = LoadReport {
            files_loaded: 1,
            ..LoadReport::default()
        };
        report
            .skipped
            .extend(doc.skipped.into_iter().map(|mut s| {
                s.file = Some(path.to_path_buf());
                s
            }));

        for (index, policy) in doc.policies {
            let id = policy.id.clone();
            match store.add(policy) {
                Ok(()) => report.policies_loaded += 1,
                Err(e) => {
                    tracing::warn!(file = %path.display(), policy = %id, "policy not added: {}", e);
                    report.skipped.push(SkippedEntry {
                        file: Some(path.to_path_buf()),
                        index,
                        id: Some(id),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            file = %path.display(),
            "loaded {} policies",
            report.policies_loaded
        );
        Ok(report)
    }

    /// Load every `*.yaml` / `*.yml` file under `dir` (recursively) into `store`.
    ///
    /// Files are visited in sorted path order. A missing directory loads nothing.
    pub fn load_dir(&self, store: &mut PolicyStore, dir: impl AsRef<Path>) -> LoadReport {
        let dir = dir.as_ref();
        let mut report = LoadReport::default();

        if !dir.is_dir() {
            tracing::warn!("policy directory {} does not exist", dir.display());
            return report;
        }

        let mut files = Vec::new();
        collect_yaml_files(dir, &mut files, &mut report);
        files.sort();

        for path in files {
            let relative = path.strip_prefix(dir).unwrap_or(&path);
            if !self.disabled_marker.is_empty()
                && relative.to_string_lossy().contains(&self.disabled_marker)
            {
                tracing::debug!(file = %path.display(), "skipping disabled policy file");
                continue;
            }

            match self.load_file(store, &path) {
                Ok(file_report) => report.merge(file_report),
                Err(e) => {
                    tracing::error!(file = %path.display(), "failed to load policy file: {}", e);
                    report.failed_files.push(FailedFile {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            dir = %dir.display(),
            files = report.files_loaded,
            skipped = report.skipped.len(),
            failed = report.failed_files.len(),
            "loaded {} policies",
            report.policies_loaded
        );
        report
    }
}

fn collect_yaml_files(dir: &Path, files: &mut Vec<PathBuf>, report: &mut LoadReport) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!("failed to read policy directory {}: {}", dir.display(), e);
            report.failed_files.push(FailedFile {
                path: dir.to_path_buf(),
                error: e.to_string(),
            });
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            collect_yaml_files(&path, files, report);
        } else if path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml")
        {
            files.push(path);
        }
    }
}
