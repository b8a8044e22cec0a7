//! Dependency inventory parsers.
//!
//! One parser per toolchain generation, all behind
//! [`InventoryParser`](crate::traits::InventoryParser):
//! - [`SdkListingParser`]: `dotnet list package --format json` output
//! - [`PackagesConfigParser`]: legacy `packages.config` documents
//! - [`ProjectLockParser`]: legacy `project.lock.json` lockfiles
//!
//! The two on-disk layouts differ. The global packages cache nests
//! lower-cased `<id>/<version>` folders, while a legacy `packages/` folder
//! keeps the declared casing in a single `<Id>.<Version>` folder.

pub mod packages_config;
pub mod project_lock;
pub mod sdk;

use std::path::{Path, PathBuf};

use crate::normalize::{normalize_name, normalize_version};

pub use packages_config::PackagesConfigParser;
pub use project_lock::ProjectLockParser;
pub use sdk::SdkListingParser;

/// Install location inside the global packages cache: `root/<id>/<version>`,
/// both segments lower-cased.
pub fn global_cache_path(root: &Path, name: &str, version: &str) -> PathBuf {
    root.join(normalize_name(name))
        .join(normalize_version(version))
}

/// Install location inside a legacy packages folder: `dir/<Id>.<Version>`,
/// casing preserved.
pub fn packages_folder_path(dir: &Path, name: &str, version: &str) -> PathBuf {
    dir.join(format!("{name}.{version}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts_differ_by_dialect() {
        let root = Path::new("root");
        assert_eq!(
            global_cache_path(root, "MyLIB", "1.2.3"),
            Path::new("root").join("mylib").join("1.2.3")
        );
        assert_eq!(
            packages_folder_path(root, "MyLIB", "1.2.3"),
            Path::new("root").join("MyLIB.1.2.3")
        );
    }

    #[test]
    fn test_cache_path_lowercases_prerelease() {
        assert_eq!(
            global_cache_path(Path::new("c"), "Lib", "2.0.0-RC1"),
            Path::new("c").join("lib").join("2.0.0-rc1")
        );
    }
}
