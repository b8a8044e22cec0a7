//! Core traits and types for the remediation lifecycle.
//!
//! This module defines the contract every fixer implements:
//! - The four-phase lifecycle via [`Fixer`]
//! - Best-effort outcomes via [`PhaseOutcome`]
//! - Standardized error handling via [`FixError`]

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::model::{PackageManagerTag, RemediationRequest};
use crate::process::{CommandLine, CommandOutput, ProcessError, ProcessRunner};

// ============================================================================
// Fixer Trait
// ============================================================================

/// Injects a replacement package version into a project's resolution path.
///
/// The caller drives the phases in a fixed order for one request:
/// [`prepare`](Fixer::prepare), [`fix`](Fixer::fix), then
/// [`rollback`](Fixer::rollback) if the fix failed, and finally
/// [`cleanup`](Fixer::cleanup).
///
/// # Concurrency
///
/// A fixer owns fixed, non-randomized staging paths under the project
/// directory. Two fixers must never run against the same project at the
/// same time; the caller serializes them.
pub trait Fixer: Send {
    /// Generation this fixer targets.
    fn package_manager(&self) -> PackageManagerTag;

    /// Creates the staging and private source directories.
    ///
    /// Idempotent. Failure aborts the remediation of this dependency.
    fn prepare(&mut self) -> Result<(), FixError>;

    /// Stages the artifact, runs the toolchain against the private source
    /// and predicts where the fixed package will be installed.
    ///
    /// Not idempotent: a second call stages and invokes the toolchain again.
    ///
    /// # Errors
    ///
    /// Returns [`FixError`] if:
    /// - The artifact file name is empty or not a plain file name
    /// - The artifact cannot be written
    /// - The toolchain cannot be spawned or exits with a non-zero status
    fn fix(&mut self, request: &RemediationRequest) -> Result<FixOutcome, FixError>;

    /// Undoes a failed fix where possible.
    ///
    /// `Ok` does not mean state was restored, only that nothing went
    /// unrecoverably wrong; check the [`PhaseOutcome`].
    fn rollback(&mut self) -> Result<PhaseOutcome, FixError>;

    /// Removes everything created by `prepare` and `fix`.
    fn cleanup(&mut self) -> Result<PhaseOutcome, FixError>;
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of a best-effort phase that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseOutcome {
    /// The phase did what it claims and the effect was observed.
    Confirmed,
    /// The phase finished but its effect could not be verified.
    Unverified { reason: String },
}

impl PhaseOutcome {
    pub fn unverified(reason: impl Into<String>) -> Self {
        PhaseOutcome::Unverified {
            reason: reason.into(),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, PhaseOutcome::Confirmed)
    }
}

/// Successful fix: the predicted install location of the fixed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixOutcome {
    /// Where the toolchain is expected to have installed the package.
    ///
    /// This is a prediction; environment variables or NuGet.Config can
    /// relocate the real cache.
    pub installed_path: PathBuf,

    /// Whether `installed_path` was seen on disk after the fix.
    pub path_check: PhaseOutcome,
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during remediation.
#[derive(Error, Debug)]
pub enum FixError {
    /// Staging or private source directory could not be created
    #[error("Failed to prepare {}: {source}", path.display())]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `fix` was called before `prepare`
    #[error("Fixer was not prepared")]
    NotPrepared,

    /// The registry handed over an artifact without a file name
    #[error("Artifact file name is empty")]
    EmptyArtifactName,

    /// The artifact file name would escape the staging directory
    #[error("Artifact file name '{name}' is not a plain file name")]
    InvalidArtifactName { name: String },

    /// Writing the artifact to the staging directory failed
    #[error("Failed to stage artifact at {}: {source}", path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The toolchain could not be run at all
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// The toolchain ran and exited with a non-zero status
    #[error("`{command}` failed with exit code {}: {stderr}", exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Staging directory could not be removed
    #[error("Failed to remove {}: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Writes the artifact of `request` into `staging_dir`.
///
/// The file name must be a single normal path component; anything that
/// could escape `staging_dir` is rejected before writing.
pub(crate) fn stage_artifact(
    staging_dir: &Path,
    request: &RemediationRequest,
) -> Result<PathBuf, FixError> {
    let name = request.artifact_file_name.as_str();
    if name.trim().is_empty() {
        return Err(FixError::EmptyArtifactName);
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => {
            return Err(FixError::InvalidArtifactName {
                name: name.to_string(),
            })
        }
    }

    let staged = staging_dir.join(name);
    std::fs::write(&staged, &request.artifact).map_err(|source| FixError::Staging {
        path: staged.clone(),
        source,
    })?;
    Ok(staged)
}

/// Runs a toolchain command and turns a non-zero exit into
/// [`FixError::CommandFailed`].
pub(crate) fn run_checked(
    runner: &dyn ProcessRunner,
    working_dir: &Path,
    executable: &str,
    args: &[String],
) -> Result<CommandOutput, FixError> {
    let output = runner.run(working_dir, executable, args)?;
    if !output.success() {
        return Err(FixError::CommandFailed {
            command: CommandLine { executable, args }.to_string(),
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}

/// Post-fix existence check. A miss is logged and reported as unverified,
/// never as an error.
pub(crate) fn check_installed(path: &Path) -> PhaseOutcome {
    if path.exists() {
        return PhaseOutcome::Confirmed;
    }
    warn!(
        path = %path.display(),
        "Fixed package not found at the expected location; the cache may be relocated"
    );
    PhaseOutcome::unverified(format!("{} does not exist", path.display()))
}

// ============================================================================
// Tests
// ============================================================================
