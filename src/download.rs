//! Replacement artifact download.
//!
//! The registry is reached through the [`PackageSource`] collaborator. This
//! module only builds the flat-container request path and the local file
//! name of the artifact.

use thiserror::Error;
use tracing::{info, instrument};

use crate::config::Config;
use crate::normalize::{normalize_name, normalize_version};

/// File extension of a NuGet artifact.
pub const ARTIFACT_EXTENSION: &str = "nupkg";

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Registry returned HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("Registry returned an empty artifact for {name} {version}")]
    EmptyArtifact { name: String, version: String },
}

/// Fetches raw bytes from a registry server.
pub trait PackageSource: Send + Sync {
    fn fetch(&self, server: &str, path: &str) -> Result<Vec<u8>, DownloadError>;
}

/// A downloaded replacement artifact.
#[derive(Debug, Clone)]
pub struct DownloadedPackage {
    pub bytes: Vec<u8>,
    /// Local file name: `<Name>.<Version>.nupkg`.
    pub file_name: String,
}

/// Flat-container path of an artifact. Name and version are lower-cased.
///
/// `v3-flatcontainer/<id>/<version>/<id>.<version>.nupkg`
pub fn flat_container_path(name: &str, version: &str) -> String {
    let id = normalize_name(name);
    let version = normalize_version(version);
    format!("v3-flatcontainer/{id}/{version}/{id}.{version}.{ARTIFACT_EXTENSION}")
}

/// Local file name of an artifact, casing preserved.
pub fn artifact_file_name(name: &str, version: &str) -> String {
    format!("{name}.{version}.{ARTIFACT_EXTENSION}")
}

/// Downloads the artifact of `name` at `version` from `server`.
///
/// # Errors
///
/// Propagates the source's [`DownloadError`]; an empty body is rejected
/// with [`DownloadError::EmptyArtifact`].
#[instrument(skip(source))]
pub fn download_package(
    source: &dyn PackageSource,
    server: &str,
    name: &str,
    version: &str,
) -> Result<DownloadedPackage, DownloadError> {
    let path = flat_container_path(name, version);
    let bytes = source.fetch(server, &path)?;
    if bytes.is_empty() {
        return Err(DownloadError::EmptyArtifact {
            name: name.to_string(),
            version: version.to_string(),
        });
    }
    info!(size_bytes = bytes.len(), %path, "Downloaded artifact");
    Ok(DownloadedPackage {
        bytes,
        file_name: artifact_file_name(name, version),
    })
}

/// Blocking HTTPS [`PackageSource`].
#[derive(Debug, Clone)]
pub struct HttpPackageSource {
    limit_bytes: u64,
}

impl HttpPackageSource {
    pub fn new(limit_bytes: u64) -> Self {
        Self { limit_bytes }
    }

    /// Source honouring [`Config::download_limit_bytes`].
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.download_limit_bytes)
    }

    pub fn limit_bytes(&self) -> u64 {
        self.limit_bytes
    }
}

/// Non-success statuses become [`DownloadError::Http`], everything else is a
/// transport failure.
fn request_error(url: &str, error: ureq::Error) -> DownloadError {
    match error {
        ureq::Error::StatusCode(status) => DownloadError::Http {
            url: url.to_string(),
            status,
        },
        other => DownloadError::Transport {
            url: url.to_string(),
            reason: other.to_string(),
        },
    }
}

impl PackageSource for HttpPackageSource {
    fn fetch(&self, server: &str, path: &str) -> Result<Vec<u8>, DownloadError> {
        let url = format!("{}/{}", server.trim_end_matches('/'), path);
        let mut response = ureq::get(&url)
            .call()
            .map_err(|e| request_error(&url, e))?;

        response
            .body_mut()
            .with_config()
            .limit(self.limit_bytes)
            .read_to_vec()
            .map_err(|e| request_error(&url, e))
    }
}
