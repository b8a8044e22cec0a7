use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::detect::{find_solution, packages_config_path, project_dir, PACKAGES_CONFIG};
use crate::inventory::packages_folder_path;
use crate::model::{PackageManagerTag, RemediationRequest};
use crate::process::ProcessRunner;
use crate::remediate::traits::{
    check_installed, run_checked, stage_artifact, FixError, FixOutcome, Fixer, PhaseOutcome,
};

/// Name of the staging root under the project directory.
pub const STAGING_DIR: &str = ".nuget";

/// Legacy (`packages.config`) fixer.
///
/// Stages the artifact under `<project>/.nuget/`, adds it to the private
/// source `<project>/.nuget/packages` and then runs `nuget update` against
/// that source so it becomes authoritative for the one package. The update
/// targets the nearest solution file, or the packages config file when no
/// solution is found.
pub struct NugetFixer {
    runner: Arc<dyn ProcessRunner>,
    executable: String,
    project_dir: PathBuf,
    update_target: PathBuf,
    targets_solution: bool,
    packages_dir: PathBuf,
    staging_root: PathBuf,
    private_source: PathBuf,
    created: Option<Created>,
    staged: Vec<PathBuf>,
}

/// What `prepare` created, so cleanup never touches pre-existing user files
/// such as `.nuget/NuGet.Config`.
#[derive(Debug, Clone, Copy)]
struct Created {
    staging_root: bool,
    private_source: bool,
}

impl NugetFixer {
    /// # Arguments
    ///
    /// * `runner` - Toolchain process runner
    /// * `executable` - `nuget` executable name or path
    /// * `manifest` - The project's `.csproj`
    /// * `packages_dir` - Legacy packages folder the project restores into
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        executable: impl Into<String>,
        manifest: &Path,
        packages_dir: impl Into<PathBuf>,
    ) -> Self {
        let project_dir = project_dir(manifest);
        let solution = find_solution(manifest);
        let targets_solution = solution.is_some();
        let update_target = solution.unwrap_or_else(|| {
            packages_config_path(manifest).unwrap_or_else(|| project_dir.join(PACKAGES_CONFIG))
        });
        let staging_root = project_dir.join(STAGING_DIR);
        let private_source = staging_root.join("packages");

        debug!(
            target = %update_target.display(),
            private_source = %private_source.display(),
            "Configured legacy fixer"
        );

        Self {
            runner,
            executable: executable.into(),
            project_dir,
            update_target,
            targets_solution,
            packages_dir: packages_dir.into(),
            staging_root,
            private_source,
            created: None,
            staged: Vec::new(),
        }
    }

    pub fn update_target(&self) -> &Path {
        &self.update_target
    }

    pub fn private_source(&self) -> &Path {
        &self.private_source
    }

    fn add_args(&self, staged: &Path) -> Vec<String> {
        vec![
            "add".to_string(),
            staged.display().to_string(),
            "-Source".to_string(),
            self.private_source.display().to_string(),
            "-NonInteractive".to_string(),
        ]
    }

    fn update_args(&self, request: &RemediationRequest) -> Vec<String> {
        let mut args = vec![
            "update".to_string(),
            self.update_target.display().to_string(),
            "-Id".to_string(),
            request.dependency.name().to_string(),
            "-Version".to_string(),
            request.fixed_version.clone(),
            "-Source".to_string(),
            self.private_source.display().to_string(),
            "-NonInteractive".to_string(),
        ];
        if !self.targets_solution {
            args.push("-RepositoryPath".to_string());
            args.push(self.packages_dir.display().to_string());
        }
        args
    }
}

impl Fixer for NugetFixer {
    fn package_manager(&self) -> PackageManagerTag {
        PackageManagerTag::Nuget
    }

    fn prepare(&mut self) -> Result<(), FixError> {
        if self.created.is_none() {
            self.created = Some(Created {
                staging_root: !self.staging_root.exists(),
                private_source: !self.private_source.exists(),
            });
        }
        std::fs::create_dir_all(&self.private_source).map_err(|source| FixError::Prepare {
            path: self.private_source.clone(),
            source,
        })
    }

    #[instrument(skip(self, request), fields(package = %request.dependency.name(), version = %request.fixed_version))]
    fn fix(&mut self, request: &RemediationRequest) -> Result<FixOutcome, FixError> {
        if !self.private_source.is_dir() {
            return Err(FixError::NotPrepared);
        }
        let staged = stage_artifact(&self.staging_root, request)?;
        self.staged.push(staged.clone());

        run_checked(
            self.runner.as_ref(),
            &self.project_dir,
            &self.executable,
            &self.add_args(&staged),
        )?;
        run_checked(
            self.runner.as_ref(),
            &self.project_dir,
            &self.executable,
            &self.update_args(request),
        )?;

        let installed_path = packages_folder_path(
            &self.packages_dir,
            request.dependency.name(),
            &request.fixed_version,
        );
        info!(path = %installed_path.display(), "Updated package from private source");

        Ok(FixOutcome {
            path_check: check_installed(&installed_path),
            installed_path,
        })
    }

    fn rollback(&mut self) -> Result<PhaseOutcome, FixError> {
        warn!(
            project = %self.project_dir.display(),
            "Rollback is not supported for packages.config projects"
        );
        Ok(PhaseOutcome::unverified("rollback not supported"))
    }

    fn cleanup(&mut self) -> Result<PhaseOutcome, FixError> {
        let Some(created) = self.created.take() else {
            return Ok(PhaseOutcome::Confirmed);
        };
        let staged = std::mem::take(&mut self.staged);

        if created.staging_root {
            remove_dir(&self.staging_root)?;
            return Ok(PhaseOutcome::Confirmed);
        }

        for file in staged.iter().filter(|file| file.exists()) {
            std::fs::remove_file(file).map_err(|source| FixError::Cleanup {
                path: file.clone(),
                source,
            })?;
        }
        if created.private_source {
            remove_dir(&self.private_source)?;
            return Ok(PhaseOutcome::Confirmed);
        }

        warn!(
            path = %self.private_source.display(),
            "Private source existed before remediation; added packages were left in place"
        );
        Ok(PhaseOutcome::unverified(
            "pre-existing private source was not cleaned",
        ))
    }
}

fn remove_dir(path: &Path) -> Result<(), FixError> {
    if path.exists() {
        std::fs::remove_dir_all(path).map_err(|source| FixError::Cleanup {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Removed staging directory");
    }
    Ok(())
}
