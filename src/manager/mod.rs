//! Per-dialect project facades.
//!
//! A [`PackageManager`] wires format detection, inventory parsing and fixer
//! construction for one project behind a uniform contract. [`open_project`]
//! picks the implementation once, from the detected [`ProjectFormat`].

pub mod dotnet;
pub mod nuget;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::detect::{self, DetectError, MANIFEST_EXTENSION};
use crate::download::{self, DownloadError, DownloadedPackage, PackageSource};
use crate::lockfile::LockfileError;
use crate::model::{DependencyInventory, PackageManagerTag, ProjectFormat};
use crate::process::{ProcessError, ProcessRunner};
use crate::remediate::{FixError, Fixer};
use crate::traits::ParseError;

pub use dotnet::DotnetManager;
pub use nuget::NugetManager;

/// Manifest extensions that identify a project.
pub const INDICATOR_EXTENSIONS: &[&str] = &[MANIFEST_EXTENSION];

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Fix(#[from] FixError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Lockfile(#[from] LockfileError),

    #[error("`{command}` failed with exit code {}: {stderr}", exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("No packages directory found; looked in {}", format_paths(searched))]
    PackagesDirNotFound { searched: Vec<PathBuf> },

    #[error("{operation} is not supported for {format} projects")]
    Unsupported {
        format: ProjectFormat,
        operation: &'static str,
    },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Uniform contract of a per-dialect project facade.
pub trait PackageManager: Send + Sync {
    /// Ecosystem identity tag.
    fn package_manager(&self) -> PackageManagerTag;

    /// Manifest this facade was opened for.
    fn manifest(&self) -> &Path;

    /// Final classification of the project.
    fn format(&self) -> ProjectFormat;

    /// Toolchain version discovered at construction, if any.
    fn version(&self) -> Option<&str>;

    /// Whether the installed toolchain is recent enough to remediate.
    fn is_version_supported(&self) -> bool;

    /// Lists installed dependencies.
    ///
    /// # Errors
    ///
    /// A legacy listing whose packages are all missing on disk fails with
    /// [`ParseError::NoPackagesFound`] wrapped in [`ManagerError::Parse`];
    /// the inventory is attached to that error.
    fn list_dependencies(&self) -> Result<DependencyInventory, ManagerError>;

    /// Builds a fixer scoped to this project.
    fn fixer(&self) -> Result<Box<dyn Fixer>, ManagerError>;

    /// Registry server used by [`PackageManager::download_package`].
    fn registry(&self) -> &str;

    /// Downloads a replacement artifact through `source`.
    fn download_package(
        &self,
        source: &dyn PackageSource,
        name: &str,
        version: &str,
    ) -> Result<DownloadedPackage, ManagerError> {
        Ok(download::download_package(
            source,
            self.registry(),
            name,
            version,
        )?)
    }
}

/// Finds the shallowest project manifest under `root`.
pub fn find_project(root: &Path) -> Option<PathBuf> {
    detect::find_project(root, INDICATOR_EXTENSIONS)
}

/// Opens the project at `target` (manifest path or directory to search)
/// with the facade matching its dialect.
///
/// # Errors
///
/// Returns [`DetectError::NoManifestFound`] if nothing can be located and
/// [`DetectError::UnknownFormat`] if the dialect cannot be determined.
pub fn open_project(
    target: &Path,
    config: Config,
    runner: Arc<dyn ProcessRunner>,
) -> Result<Box<dyn PackageManager>, ManagerError> {
    let manifest = detect::resolve_manifest(target, INDICATOR_EXTENSIONS)?;
    let content = std::fs::read_to_string(&manifest).map_err(|source| DetectError::Io {
        path: manifest.clone(),
        source,
    })?;
    let format = detect::classify_manifest(&manifest, &content)?;

    let manager: Box<dyn PackageManager> = if format.is_current_generation() {
        Box::new(DotnetManager::new(manifest, format, config, runner))
    } else {
        Box::new(NugetManager::new(manifest, config, runner)?)
    };
    info!(
        manifest = %manager.manifest().display(),
        format = %manager.format(),
        package_manager = %manager.package_manager(),
        "Opened project"
    );
    Ok(manager)
}

/// Runs a version-print command. Missing executables and non-zero exits
/// yield `None`.
pub(crate) fn discover_version(
    runner: &dyn ProcessRunner,
    working_dir: &Path,
    executable: &str,
    args: &[String],
) -> Option<String> {
    match runner.run(working_dir, executable, args) {
        Ok(output) if output.success() => {
            let version = output.stdout.trim_end_matches(['\r', '\n']).to_string();
            (!version.trim().is_empty()).then_some(version)
        }
        Ok(output) => {
            debug!(executable, exit_code = ?output.exit_code, "Version command failed");
            None
        }
        Err(e) => {
            debug!(executable, error = %e, "Toolchain not available");
            None
        }
    }
}
