use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, warn};

use super::global_cache_path;
use crate::model::{Dependency, DependencyInventory, PackageManagerTag};
use crate::traits::{InventoryParser, ParseError};

// ============================================================================
// Listing document
// ============================================================================

#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(default)]
    problems: Vec<Problem>,
    #[serde(default)]
    projects: Vec<ListedProject>,
}

#[derive(Debug, Deserialize)]
struct Problem {
    project: Option<String>,
    level: Option<String>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListedProject {
    path: Option<String>,
    #[serde(default)]
    frameworks: Vec<ListedFramework>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedFramework {
    framework: Option<String>,
    #[serde(default)]
    top_level_packages: Vec<ListedPackage>,
    #[serde(default)]
    transitive_packages: Vec<ListedPackage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedPackage {
    id: Option<String>,
    resolved_version: Option<String>,
}

impl Problem {
    fn is_error(&self) -> bool {
        self.level
            .as_deref()
            .is_some_and(|level| level.eq_ignore_ascii_case("error"))
    }

    /// "No assets file was found for ... Please run restore ..."
    fn is_missing_assets(&self) -> bool {
        let text = self.text.as_deref().unwrap_or_default().to_lowercase();
        text.contains("no assets file was found")
            || (text.contains("assets file") && text.contains("not found"))
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Parses `dotnet list package --include-transitive --format json` output.
///
/// Every framework of every listed project contributes records; the same
/// name/version pair seen under several frameworks yields several records in
/// one bucket. Entries without an id or a resolved version are skipped.
#[derive(Debug, Clone)]
pub struct SdkListingParser {
    global_packages_dir: PathBuf,
    project: PathBuf,
}

impl SdkListingParser {
    /// # Arguments
    ///
    /// * `global_packages_dir` - Root of the global packages cache
    /// * `project` - Manifest the listing was produced for (error context)
    pub fn new(global_packages_dir: impl Into<PathBuf>, project: impl Into<PathBuf>) -> Self {
        Self {
            global_packages_dir: global_packages_dir.into(),
            project: project.into(),
        }
    }

    fn check_problems(&self, problems: &[Problem]) -> Result<(), ParseError> {
        for problem in problems {
            if problem.is_error() && problem.is_missing_assets() {
                let project = problem
                    .project
                    .clone()
                    .unwrap_or_else(|| self.project.display().to_string());
                return Err(ParseError::RestoreRequired { project });
            }
            warn!(
                level = problem.level.as_deref().unwrap_or("unknown"),
                text = problem.text.as_deref().unwrap_or_default(),
                "Listing reported a problem"
            );
        }
        Ok(())
    }

    fn record(&self, package: &ListedPackage, is_direct: bool) -> Option<Dependency> {
        let name = package.id.as_deref().unwrap_or_default();
        let version = package.resolved_version.as_deref().unwrap_or_default();
        let disk_path = global_cache_path(&self.global_packages_dir, name, version);
        Dependency::new(name, version, disk_path, PackageManagerTag::Dotnet)
            .map(|dependency| dependency.direct(is_direct))
    }
}

impl InventoryParser for SdkListingParser {
    fn package_manager(&self) -> PackageManagerTag {
        PackageManagerTag::Dotnet
    }

    fn parse(&self, content: &[u8]) -> Result<DependencyInventory, ParseError> {
        let listing: Listing = serde_json::from_slice(content)
            .map_err(|e| ParseError::InvalidContent(format!("package listing: {e}")))?;

        self.check_problems(&listing.problems)?;

        let mut inventory = DependencyInventory::new();
        for project in &listing.projects {
            for framework in &project.frameworks {
                let packages = framework
                    .top_level_packages
                    .iter()
                    .map(|package| (package, true))
                    .chain(
                        framework
                            .transitive_packages
                            .iter()
                            .map(|package| (package, false)),
                    );

                for (package, is_direct) in packages {
                    match self.record(package, is_direct) {
                        Some(dependency) => inventory.insert(dependency),
                        None => debug!(
                            project = project.path.as_deref().unwrap_or_default(),
                            framework = framework.framework.as_deref().unwrap_or_default(),
                            id = package.id.as_deref().unwrap_or_default(),
                            "Skipping package without id or resolved version"
                        ),
                    }
                }
            }
        }
        Ok(inventory)
    }
}
