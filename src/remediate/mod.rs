//! Remediation module - injects a fixed package version into a project's
//! resolution path without editing the manifest.
//!
//! - **Traits**: the four-phase [`Fixer`] lifecycle and its outcomes
//! - **Fixers**: [`DotnetFixer`] (current generation), [`NugetFixer`] (legacy)
//! - **Pipeline**: [`run_remediation`] drives one fixer through its lifecycle
//! - **Executor**: [`RemediationExecutor`] runs many remediations in parallel

pub mod executor;
pub mod fixers;
pub mod pipeline;
pub mod traits;

pub use traits::{FixError, FixOutcome, Fixer, PhaseOutcome};

pub use fixers::{DotnetFixer, NugetFixer};

pub use executor::{RemediationExecutor, RemediationJob};
pub use pipeline::{run_remediation, RemediationReport, RemediationStats};
