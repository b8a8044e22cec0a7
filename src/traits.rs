use crate::model::{DependencyInventory, PackageManagerTag};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to parse content: {0}")]
    InvalidContent(String),
    /// The listing reported that the project was never restored.
    #[error(
        "No assets file was generated for {project}. Run `dotnet restore` on the project and try again"
    )]
    RestoreRequired { project: String },
    /// Every declared package is missing on disk. The inventory is still
    /// attached, but it should not be trusted.
    #[error("None of the {total} declared packages were found under {}", packages_dir.display())]
    NoPackagesFound {
        inventory: Box<DependencyInventory>,
        packages_dir: PathBuf,
        total: usize,
    },
}

/// Turns a listing or lockfile into a [`DependencyInventory`].
pub trait InventoryParser: Send + Sync {
    /// Returns the generation tag stamped on every produced record.
    fn package_manager(&self) -> PackageManagerTag;

    /// Parses raw content (listing output, packages.config, lockfile).
    fn parse(&self, content: &[u8]) -> Result<DependencyInventory, ParseError>;
}
