use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{discover_version, ManagerError, PackageManager};
use crate::config::Config;
use crate::detect::{
    detect_format, find_solution, packages_config_path, project_dir, DetectError, PACKAGES_CONFIG,
    PROJECT_LOCK_JSON,
};
use crate::inventory::{PackagesConfigParser, ProjectLockParser};
use crate::model::{DependencyInventory, PackageManagerTag, ProjectFormat};
use crate::process::ProcessRunner;
use crate::remediate::{Fixer, NugetFixer};
use crate::traits::InventoryParser;

/// Oldest `nuget` release that ships the `add` command.
pub const MIN_NUGET_VERSION: &str = "3.3.0";

/// Facade for legacy projects driven by the `nuget` CLI.
pub struct NugetManager {
    manifest: PathBuf,
    project_dir: PathBuf,
    format: ProjectFormat,
    config: Config,
    runner: Arc<dyn ProcessRunner>,
    version: Option<String>,
}

impl NugetManager {
    /// Detects the legacy sub-dialect and probes `nuget help` for the
    /// toolchain version.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::UnknownFormat`] if the dialect cannot be
    /// determined.
    pub fn new(
        manifest: PathBuf,
        config: Config,
        runner: Arc<dyn ProcessRunner>,
    ) -> Result<Self, ManagerError> {
        let format = detect_format(&manifest)?;
        if format == ProjectFormat::Unknown {
            return Err(DetectError::UnknownFormat { path: manifest }.into());
        }

        let project_dir = project_dir(&manifest);
        let version = discover_version(
            runner.as_ref(),
            &project_dir,
            &config.nuget_executable,
            &["help".to_string()],
        )
        .and_then(|help| parse_help_version(&help));

        Ok(Self {
            manifest,
            project_dir,
            format,
            config,
            runner,
            version,
        })
    }

    /// Locates the legacy packages folder.
    ///
    /// Candidates, in order: next to the solution, inside the project
    /// directory, next to the project directory.
    pub fn packages_dir(&self) -> Result<PathBuf, ManagerError> {
        let mut candidates = Vec::new();
        if let Some(solution) = find_solution(&self.manifest) {
            candidates.push(project_dir(&solution).join("packages"));
        }
        candidates.push(self.project_dir.join("packages"));
        if let Some(parent) = self.project_dir.parent() {
            candidates.push(parent.join("packages"));
        }

        match candidates.iter().find(|candidate| candidate.is_dir()) {
            Some(found) => Ok(found.clone()),
            None => Err(ManagerError::PackagesDirNotFound {
                searched: candidates,
            }),
        }
    }

    fn read(path: &Path) -> Result<Vec<u8>, ManagerError> {
        fs::read(path).map_err(|source| ManagerError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Extracts `X.Y.Z` from `nuget help` output (`NuGet Version: X.Y.Z.W`).
pub fn parse_help_version(help: &str) -> Option<String> {
    let line = help.lines().find(|line| !line.trim().is_empty())?;
    let version = match line.split_once(':') {
        Some((label, value)) if label.to_lowercase().contains("version") => value,
        _ => line,
    };
    let version = version.trim();
    (!version.is_empty()).then(|| version.to_string())
}

/// Numeric dot-segment comparison. Missing segments count as zero and
/// pre-release or build suffixes are ignored.
pub fn version_at_least(version: &str, floor: &str) -> bool {
    fn segments(version: &str) -> Vec<u64> {
        version
            .split(['-', '+'])
            .next()
            .unwrap_or_default()
            .split('.')
            .map(|segment| segment.trim().parse().unwrap_or(0))
            .collect()
    }

    let left = segments(version);
    let right = segments(floor);
    let len = left.len().max(right.len());
    for i in 0..len {
        let a = left.get(i).copied().unwrap_or(0);
        let b = right.get(i).copied().unwrap_or(0);
        if a != b {
            return a > b;
        }
    }
    true
}

impl PackageManager for NugetManager {
    fn package_manager(&self) -> PackageManagerTag {
        PackageManagerTag::Nuget
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
        self.version
            .as_deref()
            .is_some_and(|version| version_at_least(version, MIN_NUGET_VERSION))
    }

    #[instrument(skip(self), fields(manifest = %self.manifest.display(), format = %self.format))]
    fn list_dependencies(&self) -> Result<DependencyInventory, ManagerError> {
        let inventory = match self.format {
            ProjectFormat::LegacyPackagesConfig => {
                let config_path = packages_config_path(&self.manifest)
                    .unwrap_or_else(|| self.project_dir.join(PACKAGES_CONFIG));
                let content = Self::read(&config_path)?;
                PackagesConfigParser::new(self.packages_dir()?).parse(&content)?
            }
            ProjectFormat::LegacyProjectJson => {
                let content = Self::read(&self.project_dir.join(PROJECT_LOCK_JSON))?;
                ProjectLockParser::new(&self.config.global_packages_dir).parse(&content)?
            }
            format => {
                return Err(ManagerError::Unsupported {
                    format,
                    operation: "listing",
                })
            }
        };
        info!(packages = inventory.len(), "Listed dependencies");
        Ok(inventory)
    }

    fn fixer(&self) -> Result<Box<dyn Fixer>, ManagerError> {
        if self.format != ProjectFormat::LegacyPackagesConfig {
            return Err(ManagerError::Unsupported {
                format: self.format,
                operation: "remediation",
            });
        }
        Ok(Box::new(NugetFixer::new(
            Arc::clone(&self.runner),
            self.config.nuget_executable.clone(),
            &self.manifest,
            self.packages_dir()?,
        )))
    }

    fn registry(&self) -> &str {
        &self.config.registry_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RemediationRequest;
    use crate::process::testing::{Reply, ScriptedRunner};
    use crate::remediate::run_remediation;
    use crate::traits::ParseError;
    use tempfile::TempDir;

    const LEGACY: &str = r#"<Project ToolsVersion="15.0" xmlns="http://schemas.microsoft.com/developer/msbuild/2003" />"#;

    const CONFIG: &str = r#"<packages>
  <package id="MylibARR" version="1.3.4" targetFramework="net472" />
  <package id="Helper" version="0.9.0" targetFramework="net472" />
</packages>"#;

    /// `<root>/App.sln`, `<root>/packages/`, `<root>/App/App.csproj`.
    fn solution_layout(root: &Path) -> PathBuf {
        let project = root.join("App");
        fs::create_dir_all(&project).unwrap();
        fs::create_dir_all(root.join("packages")).unwrap();
        fs::write(root.join("App.sln"), "").unwrap();
        fs::write(project.join(PACKAGES_CONFIG), CONFIG).unwrap();
        let manifest = project.join("App.csproj");
        fs::write(&manifest, LEGACY).unwrap();
        manifest
    }

    fn open(manifest: PathBuf, replies: Vec<Reply>) -> (NugetManager, Arc<ScriptedRunner>) {
        let cache = manifest.parent().unwrap().join("cache");
        let runner = Arc::new(ScriptedRunner::new(replies));
        let manager = NugetManager::new(manifest, Config::new(cache), runner.clone()).unwrap();
        (manager, runner)
    }

    #[test]
    fn test_parse_help_version() {
        let help = "NuGet Version: 5.11.0.10\r\nusage: NuGet <command> [args] [options]\n";
        assert_eq!(parse_help_version(help).as_deref(), Some("5.11.0.10"));
        assert_eq!(parse_help_version("\n4.9.1\n").as_deref(), Some("4.9.1"));
        assert!(parse_help_version("").is_none());
    }

    #[test]
    fn test_version_at_least() {
        assert!(version_at_least("5.11.0.10", MIN_NUGET_VERSION));
        assert!(version_at_least("3.3", MIN_NUGET_VERSION));
        assert!(version_at_least("3.3.0-beta", MIN_NUGET_VERSION));
        assert!(!version_at_least("3.2.9", MIN_NUGET_VERSION));
        assert!(!version_at_least("2.8.6", MIN_NUGET_VERSION));
    }

    #[test]
    fn test_version_support_depends_on_toolchain() {
        let root = TempDir::new().unwrap();
        let manifest = solution_layout(root.path());

        let (manager, runner) = open(manifest.clone(), vec![Reply::ok("NuGet Version: 6.2.1.2\n")]);
        assert_eq!(manager.version(), Some("6.2.1.2"));
        assert!(manager.is_version_supported());
        assert_eq!(runner.calls()[0].args, ["help"]);

        let (manager, _) = open(manifest.clone(), vec![Reply::ok("NuGet Version: 2.8.6\n")]);
        assert!(!manager.is_version_supported());

        let (manager, _) = open(manifest, vec![Reply::SpawnError]);
        assert!(manager.version().is_none());
        assert!(!manager.is_version_supported());
    }

    #[test]
    fn test_list_packages_config() {
        let root = TempDir::new().unwrap();
        let manifest = solution_layout(root.path());
        fs::create_dir_all(root.path().join("packages/MylibARR.1.3.4")).unwrap();

        let (manager, _) = open(manifest, vec![]);
        assert_eq!(manager.format(), ProjectFormat::LegacyPackagesConfig);

        let inventory = manager.list_dependencies().unwrap();
        assert_eq!(inventory.len(), 2);
        assert_eq!(
            inventory.find_by_name("mylibarr").next().unwrap().disk_path(),
            root.path().join("packages").join("MylibARR.1.3.4")
        );
    }

    #[test]
    fn test_list_with_nothing_on_disk_keeps_inventory() {
        let root = TempDir::new().unwrap();
        let manifest = solution_layout(root.path());

        let (manager, _) = open(manifest, vec![]);
        match manager.list_dependencies() {
            Err(ManagerError::Parse(ParseError::NoPackagesFound { inventory, .. })) => {
                assert_eq!(inventory.len(), 2)
            }
            other => panic!("unexpected result: {:?}", other.map(|i| i.len())),
        }
    }

    #[test]
    fn test_missing_packages_dir_lists_candidates() {
        let root = TempDir::new().unwrap();
        let manifest = solution_layout(root.path());
        fs::remove_dir_all(root.path().join("packages")).unwrap();

        let (manager, _) = open(manifest, vec![]);
        match manager.list_dependencies() {
            Err(ManagerError::PackagesDirNotFound { searched }) => {
                assert_eq!(searched[0], root.path().join("packages"));
                assert!(searched.len() >= 2);
            }
            other => panic!("unexpected result: {:?}", other.map(|i| i.len())),
        }
    }

    #[test]
    fn test_project_json_lists_but_cannot_fix() {
        let root = TempDir::new().unwrap();
        let manifest = root.path().join("Old.csproj");
        fs::write(&manifest, LEGACY).unwrap();
        fs::write(root.path().join("project.json"), "{}").unwrap();
        fs::write(
            root.path().join(PROJECT_LOCK_JSON),
            r#"{"targets": {".NETFramework,Version=v4.5.2": {"Serilog/2.3.0": {"type": "package"}}}}"#,
        )
        .unwrap();

        let (manager, _) = open(manifest, vec![]);
        assert_eq!(manager.format(), ProjectFormat::LegacyProjectJson);
        assert_eq!(manager.list_dependencies().unwrap().len(), 1);
        assert!(matches!(
            manager.fixer(),
            Err(ManagerError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_unknown_legacy_project_is_rejected() {
        let root = TempDir::new().unwrap();
        let manifest = root.path().join("Bare.csproj");
        fs::write(&manifest, LEGACY).unwrap();

        let result = NugetManager::new(
            manifest,
            Config::new(root.path().join("cache")),
            Arc::new(ScriptedRunner::default()),
        );
        assert!(matches!(
            result,
            Err(ManagerError::Detect(DetectError::UnknownFormat { .. }))
        ));
    }

    #[test]
    fn test_end_to_end_legacy_fix() {
        let root = TempDir::new().unwrap();
        let manifest = solution_layout(root.path());
        fs::create_dir_all(root.path().join("packages/MylibARR.1.3.4")).unwrap();

        let (manager, runner) = open(manifest, vec![Reply::ok("NuGet Version: 6.2.1\n")]);
        let inventory = manager.list_dependencies().unwrap();
        let vulnerable = inventory.find_by_name("MYLIBARR").next().unwrap().clone();

        let request = RemediationRequest::new(
            vulnerable,
            "1.3.5-sp1",
            b"PK".to_vec(),
            "Mylib.1.3.5-sp1.nupkg",
        );
        let mut fixer = manager.fixer().unwrap();
        let report = run_remediation(fixer.as_mut(), &request);

        assert!(report.succeeded(), "{:?}", report.error);
        assert_eq!(
            report.installed_path.unwrap(),
            root.path().join("packages").join("MylibARR.1.3.5-sp1")
        );
        assert_eq!(report.cleanup, Some(crate::remediate::PhaseOutcome::Confirmed));
        assert!(!root.path().join("App").join(".nuget").exists());

        let calls = runner.calls();
        assert_eq!(calls[1].args[0], "add");
        assert_eq!(calls[2].args[0], "update");
        assert_eq!(calls[2].args[1], root.path().join("App.sln").display().to_string());
    }

    #[test]
    fn test_legacy_fix_failure_reports_exit_code() {
        let root = TempDir::new().unwrap();
        let manifest = solution_layout(root.path());
        let (manager, _) = open(
            manifest,
            vec![Reply::ok("NuGet Version: 6.2.1\n"), Reply::ok(""), Reply::exit(1, "Unable to find package")],
        );

        let dependency = crate::model::Dependency::new(
            "Helper",
            "0.9.0",
            root.path().join("packages/Helper.0.9.0"),
            PackageManagerTag::Nuget,
        )
        .unwrap();
        let request = RemediationRequest::new(dependency, "1.0.0", b"PK".to_vec(), "Helper.1.0.0.nupkg");
        let mut fixer = manager.fixer().unwrap();
        let report = run_remediation(fixer.as_mut(), &request);

        assert!(!report.succeeded());
        assert!(report.installed_path.is_none());
        assert!(report.error.unwrap().contains("exit code 1"));
        assert!(matches!(
            report.rollback,
            Some(crate::remediate::PhaseOutcome::Unverified { .. })
        ));
    }
}
