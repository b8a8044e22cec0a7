//! `packages.lock.json` patching for current-generation projects.
//!
//! Restore with `--locked-mode` refuses to pick up a fixed version that
//! disagrees with the lockfile, so after a fix every lockfile beneath the
//! project root has its resolved versions rewritten. The rewrite itself is
//! delegated to a [`LockfilePatcher`].

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use crate::model::RemediationRecord;
use crate::normalize::normalize_name;

pub const LOCKFILE_NAME: &str = "packages.lock.json";

#[derive(Error, Debug)]
pub enum LockfileError {
    #[error(
        "Could not load a {LOCKFILE_NAME} under {}; run `dotnet restore --use-lock-file` and try again",
        path.display()
    )]
    RestoreRequired { path: PathBuf },

    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to patch {}: {reason}", path.display())]
    Patch { path: PathBuf, reason: String },
}

/// Rewrites resolved versions inside one parsed lockfile document.
pub trait LockfilePatcher: Send + Sync {
    /// Applies `records` to `lockfile` in place and returns the number of
    /// entries that changed.
    fn patch(&self, lockfile: &mut Value, records: &[RemediationRecord])
        -> Result<usize, String>;
}

/// Default patcher for the `dependencies.<framework>.<id>.resolved` layout.
///
/// Ids match case-insensitively and only entries still resolved to the
/// vulnerable version change. The stale `contentHash` is dropped so the next
/// restore recomputes it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolvedVersionPatcher;

impl LockfilePatcher for ResolvedVersionPatcher {
    fn patch(
        &self,
        lockfile: &mut Value,
        records: &[RemediationRecord],
    ) -> Result<usize, String> {
        let frameworks = lockfile
            .get_mut("dependencies")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| "missing dependencies section".to_string())?;

        let mut changed = 0;
        for packages in frameworks.values_mut().filter_map(Value::as_object_mut) {
            for (id, entry) in packages.iter_mut() {
                let Some(entry) = entry.as_object_mut() else {
                    continue;
                };
                let id = normalize_name(id);
                for record in records {
                    let resolved = entry.get("resolved").and_then(Value::as_str);
                    if normalize_name(&record.name) != id
                        || resolved != Some(record.from_version.as_str())
                    {
                        continue;
                    }
                    entry.insert(
                        "resolved".to_string(),
                        Value::String(record.to_version.clone()),
                    );
                    entry.remove("contentHash");
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }
}

/// Every lockfile beneath `root`, skipping build output and hidden
/// directories.
pub fn find_lockfiles(root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !name.starts_with('.') && name != "bin" && name != "obj"
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == LOCKFILE_NAME)
        .map(|entry| entry.into_path())
        .collect();
    found.sort();
    found
}

/// Applies `records` to every lockfile beneath `root`.
///
/// Nothing is written unless every lockfile loads and patches cleanly.
///
/// # Errors
///
/// Returns [`LockfileError::RestoreRequired`] if no lockfile exists or one
/// cannot be read or parsed, [`LockfileError::Patch`] if the patcher
/// rejects a document and [`LockfileError::Io`] if writing back fails.
#[instrument(skip(records, patcher), fields(records = records.len()))]
pub fn patch_lockfiles(
    root: &Path,
    records: &[RemediationRecord],
    patcher: &dyn LockfilePatcher,
) -> Result<Vec<PathBuf>, LockfileError> {
    let lockfiles = find_lockfiles(root);
    if lockfiles.is_empty() {
        return Err(LockfileError::RestoreRequired {
            path: root.to_path_buf(),
        });
    }

    // Nothing is written until every document has been patched.
    let mut rendered = Vec::with_capacity(lockfiles.len());
    for path in &lockfiles {
        let restore_required = || LockfileError::RestoreRequired { path: path.clone() };
        let content = fs::read(path).map_err(|_| restore_required())?;
        let mut document: Value = serde_json::from_slice(&content).map_err(|_| restore_required())?;

        let changed = patcher
            .patch(&mut document, records)
            .map_err(|reason| LockfileError::Patch {
                path: path.clone(),
                reason,
            })?;

        let mut output = serde_json::to_string_pretty(&document).map_err(|e| {
            LockfileError::Patch {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;
        output.push('\n');
        rendered.push((path, output, changed));
    }

    for (path, output, changed) in rendered {
        fs::write(path, output).map_err(|source| LockfileError::Io {
            path: path.clone(),
            source,
        })?;

        if changed == 0 {
            debug!(path = %path.display(), "No lockfile entries matched");
        } else {
            info!(path = %path.display(), changed, "Patched lockfile");
        }
    }
    Ok(lockfiles)
}
