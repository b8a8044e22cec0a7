use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, instrument};

use crate::inventory::global_cache_path;
use crate::model::{PackageManagerTag, RemediationRequest};
use crate::process::ProcessRunner;
use crate::remediate::traits::{
    check_installed, run_checked, stage_artifact, FixError, FixOutcome, Fixer, PhaseOutcome,
};

/// Current-generation fixer.
///
/// The global packages cache doubles as the private source: pushing the
/// fixed artifact there with `dotnet nuget push` lays it out exactly where
/// restore looks first, so no second step is needed. The vulnerable version
/// is never touched, which leaves nothing to roll back.
pub struct DotnetFixer {
    runner: Arc<dyn ProcessRunner>,
    executable: String,
    project_dir: PathBuf,
    global_packages_dir: PathBuf,
    staging: Option<TempDir>,
}

impl DotnetFixer {
    /// # Arguments
    ///
    /// * `runner` - Toolchain process runner
    /// * `executable` - `dotnet` executable name or path
    /// * `project_dir` - Directory the toolchain runs in
    /// * `global_packages_dir` - Root of the global packages cache
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        executable: impl Into<String>,
        project_dir: impl Into<PathBuf>,
        global_packages_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            executable: executable.into(),
            project_dir: project_dir.into(),
            global_packages_dir: global_packages_dir.into(),
            staging: None,
        }
    }

    pub fn global_packages_dir(&self) -> &Path {
        &self.global_packages_dir
    }
}

impl Fixer for DotnetFixer {
    fn package_manager(&self) -> PackageManagerTag {
        PackageManagerTag::Dotnet
    }

    fn prepare(&mut self) -> Result<(), FixError> {
        std::fs::create_dir_all(&self.global_packages_dir).map_err(|source| {
            FixError::Prepare {
                path: self.global_packages_dir.clone(),
                source,
            }
        })?;
        if self.staging.is_none() {
            let staging = TempDir::new().map_err(|source| FixError::Prepare {
                path: std::env::temp_dir(),
                source,
            })?;
            debug!(path = %staging.path().display(), "Created staging directory");
            self.staging = Some(staging);
        }
        Ok(())
    }

    #[instrument(skip(self, request), fields(package = %request.dependency.name(), version = %request.fixed_version))]
    fn fix(&mut self, request: &RemediationRequest) -> Result<FixOutcome, FixError> {
        let staging = self.staging.as_ref().ok_or(FixError::NotPrepared)?;
        let staged = stage_artifact(staging.path(), request)?;

        let args = vec![
            "nuget".to_string(),
            "push".to_string(),
            staged.display().to_string(),
            "--source".to_string(),
            self.global_packages_dir.display().to_string(),
        ];
        run_checked(
            self.runner.as_ref(),
            &self.project_dir,
            &self.executable,
            &args,
        )?;

        let installed_path = global_cache_path(
            &self.global_packages_dir,
            request.dependency.name(),
            &request.fixed_version,
        );
        info!(path = %installed_path.display(), "Pushed fixed package into the global cache");

        Ok(FixOutcome {
            path_check: check_installed(&installed_path),
            installed_path,
        })
    }

    fn rollback(&mut self) -> Result<PhaseOutcome, FixError> {
        debug!("Nothing to roll back: the resolved version was not altered in place");
        Ok(PhaseOutcome::Confirmed)
    }

    fn cleanup(&mut self) -> Result<PhaseOutcome, FixError> {
        if let Some(staging) = self.staging.take() {
            let path = staging.path().to_path_buf();
            staging
                .close()
                .map_err(|source| FixError::Cleanup { path, source })?;
        }
        Ok(PhaseOutcome::Confirmed)
    }
}
