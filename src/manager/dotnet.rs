use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{discover_version, ManagerError, PackageManager};
use crate::config::Config;
use crate::detect::project_dir;
use crate::inventory::SdkListingParser;
use crate::lockfile::{patch_lockfiles, LockfilePatcher};
use crate::model::{DependencyInventory, PackageManagerTag, ProjectFormat, RemediationRecord};
use crate::process::{CommandLine, ProcessRunner};
use crate::remediate::{DotnetFixer, Fixer};
use crate::traits::InventoryParser;

/// Facade for SDK-style and migrated projects driven by the `dotnet` CLI.
pub struct DotnetManager {
    manifest: PathBuf,
    project_dir: PathBuf,
    format: ProjectFormat,
    config: Config,
    runner: Arc<dyn ProcessRunner>,
    version: Option<String>,
}

impl DotnetManager {
    /// Creates the facade and probes `dotnet --version`. A missing
    /// toolchain only leaves the version unknown.
    pub fn new(
        manifest: PathBuf,
        format: ProjectFormat,
        config: Config,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        let project_dir = project_dir(&manifest);
        let version = discover_version(
            runner.as_ref(),
            &project_dir,
            &config.dotnet_executable,
            &["--version".to_string()],
        );
        Self {
            manifest,
            project_dir,
            format,
            config,
            runner,
            version,
        }
    }

    fn list_args(&self) -> Vec<String> {
        vec![
            "list".to_string(),
            self.manifest.display().to_string(),
            "package".to_string(),
            "--include-transitive".to_string(),
            "--format".to_string(),
            "json".to_string(),
        ]
    }

    /// Rewrites resolved versions in every `packages.lock.json` beneath the
    /// project directory.
    pub fn patch_lockfiles(
        &self,
        records: &[RemediationRecord],
        patcher: &dyn LockfilePatcher,
    ) -> Result<Vec<PathBuf>, ManagerError> {
        Ok(patch_lockfiles(&self.project_dir, records, patcher)?)
    }
}

impl PackageManager for DotnetManager {
    fn package_manager(&self) -> PackageManagerTag {
        PackageManagerTag::Dotnet
    }

    fn manifest(&self) -> &Path {
        &self.manifest
    }

    fn format(&self) -> ProjectFormat {
        self.format
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn is_version_supported(&self) -> bool {
        true
    }

    #[instrument(skip(self), fields(manifest = %self.manifest.display()))]
    fn list_dependencies(&self) -> Result<DependencyInventory, ManagerError> {
        let args = self.list_args();
        let output = self
            .runner
            .run(&self.project_dir, &self.config.dotnet_executable, &args)?;

        // The listing still prints its JSON (with a problem entry) when the
        // command fails for a missing restore.
        if !output.success() && output.stdout.trim().is_empty() {
            return Err(ManagerError::CommandFailed {
                command: CommandLine {
                    executable: &self.config.dotnet_executable,
                    args: &args,
                }
                .to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        let parser = SdkListingParser::new(&self.config.global_packages_dir, &self.manifest);
        let inventory = parser.parse(output.stdout.as_bytes())?;
        info!(
            packages = inventory.len(),
            install_sites = inventory.record_count(),
            "Listed dependencies"
        );
        Ok(inventory)
    }

    fn fixer(&self) -> Result<Box<dyn Fixer>, ManagerError> {
        Ok(Box::new(DotnetFixer::new(
            Arc::clone(&self.runner),
            self.config.dotnet_executable.clone(),
            self.project_dir.clone(),
            self.config.global_packages_dir.clone(),
        )))
    }

    fn registry(&self) -> &str {
        &self.config.registry_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::testing::StaticSource;
    use crate::lockfile::{ResolvedVersionPatcher, LOCKFILE_NAME};
    use crate::model::{InventoryKey, RemediationRequest};
    use crate::process::testing::{Reply, ScriptedRunner};
    use crate::remediate::run_remediation;
    use crate::traits::ParseError;
    use std::fs;
    use tempfile::TempDir;

    const LISTING: &str = r#"{
  "version": 1,
  "projects": [ { "path": "App.csproj", "frameworks": [ { "framework": "net8.0",
    "topLevelPackages": [ { "id": "MylibARR", "requestedVersion": "1.3.4", "resolvedVersion": "1.3.4" } ],
    "transitivePackages": [ { "id": "Helper", "resolvedVersion": "0.9.0" } ] } ] } ]
}"#;

    fn manager(dir: &Path, replies: Vec<Reply>) -> (DotnetManager, Arc<ScriptedRunner>) {
        let manifest = dir.join("App.csproj");
        fs::write(&manifest, r#"<Project Sdk="Microsoft.NET.Sdk" />"#).unwrap();
        let runner = Arc::new(ScriptedRunner::new(replies));
        let manager = DotnetManager::new(
            manifest,
            ProjectFormat::SdkStyle,
            Config::new(dir.join("cache")),
            runner.clone(),
        );
        (manager, runner)
    }

    #[test]
    fn test_version_and_support() {
        let dir = TempDir::new().unwrap();
        let (manager, runner) = manager(dir.path(), vec![Reply::ok("8.0.100\n")]);
        assert_eq!(manager.version(), Some("8.0.100"));
        assert!(manager.is_version_supported());
        assert_eq!(runner.calls()[0].args, ["--version"]);

        let (manager, _) = manager_without_toolchain(dir.path());
        assert!(manager.version().is_none());
        assert!(manager.is_version_supported());
    }

    fn manager_without_toolchain(dir: &Path) -> (DotnetManager, Arc<ScriptedRunner>) {
        manager(dir, vec![Reply::SpawnError])
    }

    #[test]
    fn test_list_dependencies_runs_listing() {
        let dir = TempDir::new().unwrap();
        let (manager, runner) = manager(dir.path(), vec![Reply::ok("8.0.100"), Reply::ok(LISTING)]);

        let inventory = manager.list_dependencies().unwrap();
        assert_eq!(inventory.len(), 2);
        let key = InventoryKey::new(PackageManagerTag::Dotnet, "mylibarr", "1.3.4");
        assert_eq!(
            inventory.get(&key).unwrap()[0].disk_path(),
            dir.path().join("cache").join("mylibarr").join("1.3.4")
        );

        let list = &runner.calls()[1];
        assert_eq!(list.args[0], "list");
        assert!(list.args.contains(&"--include-transitive".to_string()));
    }

    #[test]
    fn test_list_dependencies_command_failure() {
        let dir = TempDir::new().unwrap();
        let (manager, _) = manager(dir.path(), vec![Reply::ok("8.0.100"), Reply::exit(1, "boom")]);
        assert!(matches!(
            manager.list_dependencies(),
            Err(ManagerError::CommandFailed {
                exit_code: Some(1),
                ..
            })
        ));
    }

    #[test]
    fn test_list_dependencies_restore_required() {
        let dir = TempDir::new().unwrap();
        let listing = r#"{"problems": [{"level": "error", "text": "No assets file was found for App.csproj"}]}"#;
        let failing = Reply::Output(crate::process::CommandOutput {
            stdout: listing.to_string(),
            stderr: String::new(),
            exit_code: Some(1),
        });
        let (manager, _) = manager(dir.path(), vec![Reply::ok("8.0.100"), failing]);
        assert!(matches!(
            manager.list_dependencies(),
            Err(ManagerError::Parse(ParseError::RestoreRequired { .. }))
        ));
    }

    #[test]
    fn test_end_to_end_fix() {
        let dir = TempDir::new().unwrap();
        let (manager, runner) = manager(dir.path(), vec![Reply::ok("8.0.100"), Reply::ok(LISTING)]);
        fs::write(
            dir.path().join(LOCKFILE_NAME),
            r#"{"version": 1, "dependencies": {"net8.0": {"MylibARR": {"type": "Direct", "resolved": "1.3.4"}}}}"#,
        )
        .unwrap();

        let inventory = manager.list_dependencies().unwrap();
        let vulnerable = inventory.find_by_name("MylibARR").next().unwrap().clone();

        let source = StaticSource::new(b"PK");
        let package = manager
            .download_package(&source, vulnerable.name(), "1.3.5-SP1")
            .unwrap();
        assert_eq!(
            source.requests.lock().unwrap()[0].1,
            "v3-flatcontainer/mylibarr/1.3.5-sp1/mylibarr.1.3.5-sp1.nupkg"
        );

        let request = RemediationRequest::new(vulnerable, "1.3.5-SP1", package.bytes, package.file_name);
        let mut fixer = manager.fixer().unwrap();
        let report = run_remediation(fixer.as_mut(), &request);
        assert!(report.succeeded(), "{:?}", report.error);
        assert_eq!(
            report.installed_path.unwrap(),
            dir.path().join("cache").join("mylibarr").join("1.3.5-sp1")
        );
        assert_eq!(runner.calls()[2].args[..2], ["nuget", "push"]);

        let patched = manager
            .patch_lockfiles(&[RemediationRecord::from(&request)], &ResolvedVersionPatcher)
            .unwrap();
        assert_eq!(patched, vec![dir.path().join(LOCKFILE_NAME)]);
    }

    #[test]
    fn test_failed_push_produces_no_path() {
        let dir = TempDir::new().unwrap();
        let (manager, _) = manager(
            dir.path(),
            vec![Reply::ok("8.0.100"), Reply::exit(1, "push failed")],
        );
        let dependency = crate::model::Dependency::new(
            "Lib",
            "1.0.0",
            dir.path().join("cache/lib/1.0.0"),
            PackageManagerTag::Dotnet,
        )
        .unwrap();
        let request = RemediationRequest::new(dependency, "1.0.1", b"x".to_vec(), "Lib.1.0.1.nupkg");

        let mut fixer = manager.fixer().unwrap();
        let report = run_remediation(fixer.as_mut(), &request);
        assert!(!report.succeeded());
        assert!(report.installed_path.is_none());
        assert!(report.error.unwrap().contains("exit code 1"));
    }
}
