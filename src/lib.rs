//! Vulnerable NuGet dependency remediation.
//!
//! Detects which generation of .NET project a manifest belongs to, lists the
//! installed dependencies with the matching toolchain and injects a fixed
//! package version into the project's resolution path without editing the
//! manifest.

pub mod config;
pub mod detect;
pub mod download;
pub mod inventory;
pub mod lockfile;
pub mod logging;
pub mod manager;
pub mod model;
pub mod normalize;
pub mod process;
pub mod remediate;
pub mod traits;

// Re-export common types for convenience
pub use config::{Config, ConfigError};
pub use detect::{detect_format, DetectError};
pub use download::{DownloadError, DownloadedPackage, HttpPackageSource, PackageSource};
pub use lockfile::{LockfileError, LockfilePatcher, ResolvedVersionPatcher};
pub use manager::{open_project, DotnetManager, ManagerError, NugetManager, PackageManager};
pub use model::*;
pub use process::{ProcessRunner, SystemRunner};
pub use remediate::{
    run_remediation, FixError, Fixer, PhaseOutcome, RemediationExecutor, RemediationJob,
    RemediationReport,
};
pub use traits::*;
