use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::debug;

use super::global_cache_path;
use crate::model::{Dependency, DependencyInventory, PackageManagerTag};
use crate::normalize::normalize_name;
use crate::traits::{InventoryParser, ParseError};

/// Parses a legacy `project.lock.json` written by project.json restores.
///
/// Packages come from `targets.<framework>.<Name>/<Version>` entries of type
/// `package`; names listed in `projectFileDependencyGroups` are direct.
/// project.json restores install into the global packages cache, so disk
/// paths use the lower-cased nested layout.
#[derive(Debug, Clone)]
pub struct ProjectLockParser {
    global_packages_dir: PathBuf,
}

impl ProjectLockParser {
    pub fn new(global_packages_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_packages_dir: global_packages_dir.into(),
        }
    }
}

/// Names declared in `projectFileDependencyGroups`, e.g.
/// `"Newtonsoft.Json >= 9.0.1"`.
fn declared_names(lock: &Value) -> HashSet<String> {
    lock.get("projectFileDependencyGroups")
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|groups| groups.values())
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(Value::as_str)
        .filter_map(|range| range.split_whitespace().next())
        .map(normalize_name)
        .collect()
}

impl InventoryParser for ProjectLockParser {
    fn package_manager(&self) -> PackageManagerTag {
        PackageManagerTag::Nuget
    }

    fn parse(&self, content: &[u8]) -> Result<DependencyInventory, ParseError> {
        let lock: Value = serde_json::from_slice(content)
            .map_err(|e| ParseError::InvalidContent(format!("project.lock.json: {e}")))?;
        let targets = lock
            .get("targets")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                ParseError::InvalidContent("project.lock.json has no targets".to_string())
            })?;

        let direct = declared_names(&lock);
        let mut inventory = DependencyInventory::new();

        for (framework, entries) in targets {
            let Some(entries) = entries.as_object() else {
                continue;
            };
            for (key, entry) in entries {
                let kind = entry.get("type").and_then(Value::as_str).unwrap_or("package");
                if kind != "package" {
                    continue;
                }
                let (name, version) = key.split_once('/').unwrap_or((key.as_str(), ""));
                let disk_path = global_cache_path(&self.global_packages_dir, name, version);
                match Dependency::new(name, version, disk_path, PackageManagerTag::Nuget) {
                    Some(dependency) => {
                        let is_direct = direct.contains(dependency.normalized_name());
                        inventory.insert(dependency.direct(is_direct));
                    }
                    None => debug!(%framework, entry = %key, "Skipping malformed lock entry"),
                }
            }
        }
        Ok(inventory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const LOCK: &str = r#"{
  "locked": false,
  "version": 2,
  "targets": {
    ".NETFramework,Version=v4.5.2": {
      "Newtonsoft.Json/9.0.1": { "type": "package" },
      "Serilog/2.3.0": { "type": "package" },
      "Shared/1.0.0": { "type": "project" }
    },
    ".NETFramework,Version=v4.5.2/win": {
      "Newtonsoft.Json/9.0.1": { "type": "package" },
      "NoVersion": { "type": "package" }
    }
  },
  "projectFileDependencyGroups": {
    "": [ "Newtonsoft.Json >= 9.0.1" ],
    ".NETFramework,Version=v4.5.2": []
  }
}"#;

    #[test]
    fn test_parse_lockfile_targets() {
        let inventory = ProjectLockParser::new("/cache")
            .parse(LOCK.as_bytes())
            .unwrap();
        assert_eq!(inventory.len(), 2);
        assert_eq!(inventory.record_count(), 3);

        let json = inventory.find_by_name("newtonsoft.json").next().unwrap();
        assert!(json.is_direct());
        assert_eq!(
            json.disk_path(),
            Path::new("/cache").join("newtonsoft.json").join("9.0.1")
        );
        assert!(!inventory.find_by_name("Serilog").next().unwrap().is_direct());
        assert_eq!(inventory.find_by_name("Shared").count(), 0);
    }

    #[test]
    fn test_lockfile_without_targets() {
        let err = ProjectLockParser::new("/cache").parse(b"{}").unwrap_err();
        assert!(matches!(err, ParseError::InvalidContent(_)));
    }

    #[test]
    fn test_lockfile_with_empty_targets() {
        let inventory = ProjectLockParser::new("/cache")
            .parse(br#"{"targets": {}}"#)
            .unwrap();
        assert!(inventory.is_empty());
    }
}
