//! Manifest dialect detection and project file discovery.
//!
//! Classification works on the parsed element tree of a `.csproj`, never on
//! raw text, so `PackageReference` items inside XML comments are invisible.
//! Legacy projects are then told apart by probing sibling files.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::model::ProjectFormat;

/// Indicator extension of a project manifest.
pub const MANIFEST_EXTENSION: &str = "csproj";

/// Extension of the solution-level marker file.
pub const SOLUTION_EXTENSION: &str = "sln";

pub const PACKAGES_CONFIG: &str = "packages.config";
pub const PROJECT_JSON: &str = "project.json";
pub const PROJECT_LOCK_JSON: &str = "project.lock.json";

/// Number of directories the ancestor search inspects, starting with the
/// manifest's own directory.
pub const MAX_ANCESTOR_DEPTH: usize = 10;

const SKIPPED_DIRS: &[&str] = &["bin", "obj", "node_modules", "packages"];

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Malformed manifest {}: {reason}", path.display())]
    MalformedManifest { path: PathBuf, reason: String },

    #[error("Could not determine the project format of {}", path.display())]
    UnknownFormat { path: PathBuf },

    #[error("No .{MANIFEST_EXTENSION} project found under {}", root.display())]
    NoManifestFound { root: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Classifies manifest content without looking at sibling files.
///
/// Returns [`ProjectFormat::PureLegacy`] for old-style projects without
/// `PackageReference` items; [`detect_format`] refines that further.
///
/// # Errors
///
/// Returns [`DetectError::MalformedManifest`] if the document cannot be
/// parsed far enough to locate its root element.
pub fn classify_manifest(manifest: &Path, content: &str) -> Result<ProjectFormat, DetectError> {
    let document =
        roxmltree::Document::parse(content).map_err(|e| DetectError::MalformedManifest {
            path: manifest.to_path_buf(),
            reason: e.to_string(),
        })?;
    let root = document.root_element();

    if root.attribute("Sdk").is_some() {
        return Ok(ProjectFormat::SdkStyle);
    }
    if root.attribute("ToolsVersion").is_none() {
        return Ok(ProjectFormat::Unknown);
    }

    let has_package_reference = root
        .descendants()
        .any(|node| node.is_element() && node.tag_name().name() == "PackageReference");

    Ok(if has_package_reference {
        ProjectFormat::MigratedLegacy
    } else {
        ProjectFormat::PureLegacy
    })
}

/// Classifies the project at `manifest` into a final [`ProjectFormat`].
///
/// Pure legacy projects are disambiguated by sibling files, in priority
/// order: a packages config file, then `project.json`. When neither exists
/// the result is [`ProjectFormat::Unknown`], which is a valid outcome.
///
/// # Errors
///
/// Returns [`DetectError::Io`] if the manifest cannot be read and
/// [`DetectError::MalformedManifest`] if it cannot be parsed.
pub fn detect_format(manifest: &Path) -> Result<ProjectFormat, DetectError> {
    let content = fs::read_to_string(manifest).map_err(|source| DetectError::Io {
        path: manifest.to_path_buf(),
        source,
    })?;

    let format = match classify_manifest(manifest, &content)? {
        ProjectFormat::PureLegacy => {
            if packages_config_path(manifest).is_some() {
                ProjectFormat::LegacyPackagesConfig
            } else if project_dir(manifest).join(PROJECT_JSON).is_file() {
                ProjectFormat::LegacyProjectJson
            } else {
                ProjectFormat::Unknown
            }
        }
        other => other,
    };

    debug!(manifest = %manifest.display(), %format, "Detected project format");
    Ok(format)
}

/// Directory containing `manifest`.
pub fn project_dir(manifest: &Path) -> PathBuf {
    match manifest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Locates the packages config file next to `manifest`.
///
/// NuGet also accepts a per-project `packages.<ProjectName>.config`, which
/// takes precedence over the shared file name.
pub fn packages_config_path(manifest: &Path) -> Option<PathBuf> {
    let dir = project_dir(manifest);
    let per_project = manifest
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| dir.join(format!("packages.{stem}.config")));

    per_project
        .into_iter()
        .chain(std::iter::once(dir.join(PACKAGES_CONFIG)))
        .find(|candidate| candidate.is_file())
}

/// Walks upward from the directory of `start` looking for a file accepted
/// by `matches`.
///
/// A relative `start` is resolved against the working directory first, so
/// the walk continues above it. At most [`MAX_ANCESTOR_DEPTH`] directories
/// are inspected. The closest match wins. `None` means nothing was found
/// within the bound, which is a normal negative result.
pub fn find_in_ancestors<F>(start: &Path, matches: F) -> Option<PathBuf>
where
    F: Fn(&Path) -> bool,
{
    let start = std::path::absolute(start).unwrap_or_else(|_| start.to_path_buf());
    let mut dir = Some(project_dir(&start));

    for _ in 0..MAX_ANCESTOR_DEPTH {
        let current = dir?;
        if let Ok(entries) = fs::read_dir(&current) {
            let mut hits: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.is_file() && matches(path))
                .collect();
            hits.sort();
            if let Some(hit) = hits.into_iter().next() {
                return Some(hit);
            }
        }
        dir = current.parent().map(Path::to_path_buf);
    }
    None
}

/// Finds the nearest solution file above `manifest`.
pub fn find_solution(manifest: &Path) -> Option<PathBuf> {
    find_in_ancestors(manifest, |path| has_extension(path, SOLUTION_EXTENSION))
}

/// Finds the shallowest file under `root` carrying one of `extensions`.
///
/// Deeper matches are usually sub-projects, so depth wins over anything
/// else; ties are broken by path order. Build output and hidden directories
/// are not searched.
pub fn find_project(root: &Path, extensions: &[&str]) -> Option<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped_dir(entry))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| extensions.iter().any(|ext| has_extension(entry.path(), ext)))
        .map(|entry| (entry.depth(), entry.into_path()))
        .min()
        .map(|(_, path)| path)
}

/// Accepts either an explicit manifest path or a directory to search.
///
/// # Errors
///
/// Returns [`DetectError::NoManifestFound`] if `target` is a directory with
/// no manifest beneath it, or does not exist at all.
pub fn resolve_manifest(target: &Path, extensions: &[&str]) -> Result<PathBuf, DetectError> {
    if target.is_file() {
        return Ok(target.to_path_buf());
    }
    if target.is_dir() {
        if let Some(found) = find_project(target, extensions) {
            return Ok(found);
        }
    }
    Err(DetectError::NoManifestFound {
        root: target.to_path_buf(),
    })
}

pub(crate) fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.iter().any(|skip| name.eq_ignore_ascii_case(skip))
}
