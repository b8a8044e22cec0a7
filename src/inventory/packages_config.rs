use std::path::PathBuf;
use tracing::{debug, warn};

use super::packages_folder_path;
use crate::model::{Dependency, DependencyInventory, PackageManagerTag};
use crate::traits::{InventoryParser, ParseError};

/// Parses a legacy `packages.config` document.
///
/// ```xml
/// <packages>
///   <package id="Newtonsoft.Json" version="12.0.1" targetFramework="net472" />
/// </packages>
/// ```
///
/// Each record points at `<packages_dir>/<Id>.<Version>`. The parser checks
/// those folders: partial misses are only logged, but when not a single
/// declared package exists on disk the result is
/// [`ParseError::NoPackagesFound`], which still carries the inventory.
#[derive(Debug, Clone)]
pub struct PackagesConfigParser {
    packages_dir: PathBuf,
}

impl PackagesConfigParser {
    pub fn new(packages_dir: impl Into<PathBuf>) -> Self {
        Self {
            packages_dir: packages_dir.into(),
        }
    }
}

impl InventoryParser for PackagesConfigParser {
    fn package_manager(&self) -> PackageManagerTag {
        PackageManagerTag::Nuget
    }

    fn parse(&self, content: &[u8]) -> Result<DependencyInventory, ParseError> {
        let text = std::str::from_utf8(content)
            .map_err(|e| ParseError::InvalidContent(format!("packages.config: {e}")))?;
        let document = roxmltree::Document::parse(text)
            .map_err(|e| ParseError::InvalidContent(format!("packages.config: {e}")))?;

        let mut inventory = DependencyInventory::new();
        let mut total = 0usize;
        let mut missing = 0usize;

        let packages = document
            .root_element()
            .children()
            .filter(|node| node.is_element() && node.tag_name().name() == "package");

        for package in packages {
            let name = package.attribute("id").unwrap_or_default();
            let version = package.attribute("version").unwrap_or_default();
            let is_dev = package
                .attribute("developmentDependency")
                .is_some_and(|flag| flag.eq_ignore_ascii_case("true"));
            let disk_path = packages_folder_path(&self.packages_dir, name, version);

            let Some(dependency) =
                Dependency::new(name, version, disk_path, PackageManagerTag::Nuget)
            else {
                debug!(id = name, "Skipping package without id or version");
                continue;
            };

            total += 1;
            if !dependency.disk_path().exists() {
                missing += 1;
                debug!(
                    id = name,
                    version,
                    framework = package.attribute("targetFramework").unwrap_or_default(),
                    path = %dependency.disk_path().display(),
                    "Package not found on disk"
                );
            }
            inventory.insert(dependency.direct(true).dev(is_dev));
        }

        if total > 0 && missing == total {
            return Err(ParseError::NoPackagesFound {
                inventory: Box::new(inventory),
                packages_dir: self.packages_dir.clone(),
                total,
            });
        }
        if missing > 0 {
            warn!(
                missing,
                total,
                packages_dir = %self.packages_dir.display(),
                "Some packages were not found on disk"
            );
        }
        Ok(inventory)
    }
}
