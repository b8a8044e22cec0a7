use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::normalize::normalize_name;

/// Which toolchain generation produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManagerTag {
    /// Current generation (`dotnet` CLI, SDK-style manifests).
    Dotnet,
    /// Legacy generation (`nuget` CLI, packages.config / project.json).
    Nuget,
}

impl PackageManagerTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageManagerTag::Dotnet => "dotnet",
            PackageManagerTag::Nuget => "nuget",
        }
    }
}

impl fmt::Display for PackageManagerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Manifest dialect of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectFormat {
    SdkStyle,
    /// Old-style root that already declares `PackageReference` items.
    MigratedLegacy,
    /// Old-style root without modern references; sub-variant not yet probed.
    PureLegacy,
    LegacyPackagesConfig,
    LegacyProjectJson,
    Unknown,
}

impl ProjectFormat {
    /// Whether the current-generation toolchain resolves this project.
    pub fn is_current_generation(&self) -> bool {
        matches!(self, ProjectFormat::SdkStyle | ProjectFormat::MigratedLegacy)
    }
}

impl fmt::Display for ProjectFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProjectFormat::SdkStyle => "sdk-style",
            ProjectFormat::MigratedLegacy => "migrated-legacy",
            ProjectFormat::PureLegacy => "pure-legacy",
            ProjectFormat::LegacyPackagesConfig => "packages.config",
            ProjectFormat::LegacyProjectJson => "project.json",
            ProjectFormat::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// One resolved package in one project.
///
/// Records are immutable once built. Construction goes through
/// [`Dependency::new`], which refuses empty names or versions so that a
/// partially populated record can never reach an inventory. Deserialization
/// goes through the same constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DependencyRecord")]
pub struct Dependency {
    name: String,
    normalized_name: String,
    version: String,
    disk_path: PathBuf,
    is_direct: bool,
    is_dev: bool,
    package_manager: PackageManagerTag,
}

impl Dependency {
    /// Builds a record, returning `None` when `name` or `version` is blank.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        disk_path: impl Into<PathBuf>,
        package_manager: PackageManagerTag,
    ) -> Option<Self> {
        let name = name.into();
        let version = version.into();
        if name.trim().is_empty() || version.trim().is_empty() {
            return None;
        }
        Some(Self {
            normalized_name: normalize_name(&name),
            name,
            version,
            disk_path: disk_path.into(),
            is_direct: false,
            is_dev: false,
            package_manager,
        })
    }

    pub fn direct(mut self, is_direct: bool) -> Self {
        self.is_direct = is_direct;
        self
    }

    pub fn dev(mut self, is_dev: bool) -> Self {
        self.is_dev = is_dev;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn normalized_name(&self) -> &str {
        &self.normalized_name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn disk_path(&self) -> &Path {
        &self.disk_path
    }

    pub fn is_direct(&self) -> bool {
        self.is_direct
    }

    pub fn is_dev(&self) -> bool {
        self.is_dev
    }

    pub fn package_manager(&self) -> PackageManagerTag {
        self.package_manager
    }

    pub fn key(&self) -> InventoryKey {
        InventoryKey {
            package_manager: self.package_manager,
            normalized_name: self.normalized_name.clone(),
            version: self.version.clone(),
        }
    }

    /// Same installed unit: equal normalized name and equal version.
    pub fn same_unit(&self, other: &Dependency) -> bool {
        self.normalized_name == other.normalized_name && self.version == other.version
    }
}

/// Serialized shape of a [`Dependency`]. `normalized_name` is always
/// derived from `name`, so a stored value is ignored.
#[derive(Deserialize)]
struct DependencyRecord {
    name: String,
    version: String,
    disk_path: PathBuf,
    #[serde(default)]
    is_direct: bool,
    #[serde(default)]
    is_dev: bool,
    package_manager: PackageManagerTag,
}

impl TryFrom<DependencyRecord> for Dependency {
    type Error = String;

    fn try_from(record: DependencyRecord) -> Result<Self, Self::Error> {
        let dependency = Dependency::new(
            record.name,
            record.version,
            record.disk_path,
            record.package_manager,
        )
        .ok_or_else(|| "dependency record needs a non-empty name and version".to_string())?;
        Ok(dependency.direct(record.is_direct).dev(record.is_dev))
    }
}

/// Composite bucket key of a [`DependencyInventory`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InventoryKey {
    pub package_manager: PackageManagerTag,
    pub normalized_name: String,
    pub version: String,
}

impl InventoryKey {
    pub fn new(package_manager: PackageManagerTag, name: &str, version: &str) -> Self {
        Self {
            package_manager,
            normalized_name: normalize_name(name),
            version: version.to_string(),
        }
    }
}

impl fmt::Display for InventoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}@{}",
            self.package_manager, self.normalized_name, self.version
        )
    }
}

/// Installed dependencies of a project, bucketed by [`InventoryKey`].
///
/// A bucket holds several records when the same name/version pair is
/// installed for more than one target framework. Records inside a bucket
/// keep discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Dependency>", into = "Vec<Dependency>")]
pub struct DependencyInventory {
    buckets: BTreeMap<InventoryKey, Vec<Dependency>>,
}

impl DependencyInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dependency: Dependency) {
        self.buckets
            .entry(dependency.key())
            .or_default()
            .push(dependency);
    }

    pub fn get(&self, key: &InventoryKey) -> Option<&[Dependency]> {
        self.buckets.get(key).map(Vec::as_slice)
    }

    /// All records whose normalized name matches `name`, across versions.
    pub fn find_by_name<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Dependency> + 'a {
        let wanted = normalize_name(name);
        self.buckets
            .iter()
            .filter(move |(key, _)| key.normalized_name == wanted)
            .flat_map(|(_, records)| records.iter())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InventoryKey, &[Dependency])> {
        self.buckets
            .iter()
            .map(|(key, records)| (key, records.as_slice()))
    }

    /// Number of distinct buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of records across all buckets (install sites).
    pub fn record_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

impl From<Vec<Dependency>> for DependencyInventory {
    fn from(records: Vec<Dependency>) -> Self {
        let mut inventory = Self::new();
        for record in records {
            inventory.insert(record);
        }
        inventory
    }
}

impl From<DependencyInventory> for Vec<Dependency> {
    fn from(inventory: DependencyInventory) -> Self {
        inventory.buckets.into_values().flatten().collect()
    }
}

/// A selected fix for one vulnerable dependency.
///
/// Produced by the caller once a candidate has been chosen and consumed
/// by exactly one [`Fixer::fix`](crate::remediate::Fixer::fix) call.
#[derive(Debug, Clone)]
pub struct RemediationRequest {
    /// The vulnerable record being replaced.
    pub dependency: Dependency,
    /// Exact replacement version.
    pub fixed_version: String,
    /// Downloaded replacement artifact.
    pub artifact: Vec<u8>,
    /// Artifact file name as presented by the registry.
    pub artifact_file_name: String,
}

impl RemediationRequest {
    pub fn new(
        dependency: Dependency,
        fixed_version: impl Into<String>,
        artifact: Vec<u8>,
        artifact_file_name: impl Into<String>,
    ) -> Self {
        Self {
            dependency,
            fixed_version: fixed_version.into(),
            artifact,
            artifact_file_name: artifact_file_name.into(),
        }
    }
}

/// One resolved-version rewrite handed to a lockfile patcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationRecord {
    pub name: String,
    pub from_version: String,
    pub to_version: String,
}

impl From<&RemediationRequest> for RemediationRecord {
    fn from(request: &RemediationRequest) -> Self {
        Self {
            name: request.dependency.name().to_string(),
            from_version: request.dependency.version().to_string(),
            to_version: request.fixed_version.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(name: &str, version: &str, path: &str) -> Dependency {
        Dependency::new(name, version, path, PackageManagerTag::Dotnet).unwrap()
    }

    #[test]
    fn test_dependency_rejects_blank_identity() {
        assert!(Dependency::new("", "1.0.0", "/p", PackageManagerTag::Dotnet).is_none());
        assert!(Dependency::new("Lib", "  ", "/p", PackageManagerTag::Nuget).is_none());
        assert!(Dependency::new("Lib", "1.0.0", "/p", PackageManagerTag::Nuget).is_some());
    }

    #[test]
    fn test_same_unit_ignores_casing() {
        let a = dep("Newtonsoft.Json", "13.0.1", "/a");
        let b = dep("NEWTONSOFT.JSON", "13.0.1", "/b");
        let c = dep("Newtonsoft.Json", "13.0.2", "/a");
        assert!(a.same_unit(&b));
        assert!(!a.same_unit(&c));
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_inventory_appends_to_bucket_in_order() {
        let mut inventory = DependencyInventory::new();
        inventory.insert(dep("MyLib", "1.2.3", "/net6"));
        inventory.insert(dep("mylib", "1.2.3", "/net8"));
        inventory.insert(dep("Other", "2.0.0", "/x"));

        assert_eq!(inventory.len(), 2);
        assert_eq!(inventory.record_count(), 3);

        let key = InventoryKey::new(PackageManagerTag::Dotnet, "MYLIB", "1.2.3");
        let bucket = inventory.get(&key).unwrap();
        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket[0].disk_path(), Path::new("/net6"));
        assert_eq!(bucket[1].disk_path(), Path::new("/net8"));
        assert_eq!(inventory.find_by_name("MyLib").count(), 2);
    }

    #[test]
    fn test_inventory_serialization() {
        let mut inventory = DependencyInventory::new();
        inventory.insert(dep("MyLib", "1.2.3", "/net6").direct(true));

        let json = serde_json::to_string(&inventory).unwrap();
        let back: DependencyInventory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, inventory);
    }

    #[test]
    fn test_deserialization_derives_normalized_name() {
        let json = r#"[{"name": "Foo", "normalized_name": "bar", "version": "1.0.0",
            "disk_path": "/cache/foo/1.0.0", "is_direct": true, "package_manager": "dotnet"}]"#;
        let inventory: DependencyInventory = serde_json::from_str(json).unwrap();

        let found: Vec<_> = inventory.find_by_name("Foo").collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].normalized_name(), "foo");
        assert!(found[0].is_direct());
        assert!(inventory.find_by_name("bar").next().is_none());
    }

    #[test]
    fn test_deserialization_rejects_blank_records() {
        let json = r#"[{"name": "", "version": "", "disk_path": "/x", "package_manager": "nuget"}]"#;
        assert!(serde_json::from_str::<DependencyInventory>(json).is_err());
        assert!(serde_json::from_str::<Dependency>(
            r#"{"name": "Foo", "version": " ", "disk_path": "/x", "package_manager": "nuget"}"#
        )
        .is_err());
    }
}
