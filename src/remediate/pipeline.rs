//! Remediation lifecycle driver.
//!
//! [`run_remediation`] takes one fixer through its phases:
//! 1. **Prepare**: staging directories (failure aborts)
//! 2. **Fix**: stage, invoke the toolchain, predict the install path
//! 3. **Rollback**: only when the fix failed, best-effort
//! 4. **Cleanup**: always attempted once prepare has run
//!
//! Nothing here returns an error. Every failure is folded into the
//! [`RemediationReport`] so a caller working through many dependencies can
//! move on to the next one.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::model::{PackageManagerTag, RemediationRequest};
use crate::remediate::traits::{Fixer, PhaseOutcome};

/// Outcome of one remediation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationReport {
    /// Package id as declared.
    pub package: String,

    /// Vulnerable version that was replaced.
    pub from_version: String,

    /// Fixed version that was applied.
    pub to_version: String,

    /// Generation of the fixer that ran.
    pub package_manager: PackageManagerTag,

    /// Predicted install location; `None` when the fix did not succeed.
    pub installed_path: Option<PathBuf>,

    /// Post-fix existence check of `installed_path`.
    pub path_check: Option<PhaseOutcome>,

    /// Present only when the fix failed and a rollback was attempted.
    pub rollback: Option<PhaseOutcome>,

    /// `None` when cleanup failed or never ran.
    pub cleanup: Option<PhaseOutcome>,

    /// First fatal error, if any.
    pub error: Option<String>,

    /// Non-fatal problems (failed rollback or cleanup).
    pub warnings: Vec<String>,

    pub stats: RemediationStats,
}

impl RemediationReport {
    fn new(request: &RemediationRequest, package_manager: PackageManagerTag) -> Self {
        Self {
            package: request.dependency.name().to_string(),
            from_version: request.dependency.version().to_string(),
            to_version: request.fixed_version.clone(),
            package_manager,
            installed_path: None,
            path_check: None,
            rollback: None,
            cleanup: None,
            error: None,
            warnings: Vec::new(),
            stats: RemediationStats::default(),
        }
    }

    /// Report for a remediation that never reached its fixer.
    pub fn aborted(
        request: &RemediationRequest,
        package_manager: PackageManagerTag,
        error: impl Into<String>,
    ) -> Self {
        let mut report = Self::new(request, package_manager);
        report.error = Some(error.into());
        report
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.installed_path.is_some()
    }
}

/// Timing of a remediation attempt, in milliseconds.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RemediationStats {
    pub prepare_duration_ms: u64,
    pub fix_duration_ms: u64,
    pub cleanup_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Drives `fixer` through its lifecycle for `request`.
#[instrument(skip(fixer, request), fields(package = %request.dependency.name(), to = %request.fixed_version))]
pub fn run_remediation(fixer: &mut dyn Fixer, request: &RemediationRequest) -> RemediationReport {
    let start = Instant::now();
    let mut report = RemediationReport::new(request, fixer.package_manager());

    // ====================================================================
    // Prepare
    // ====================================================================

    let phase = Instant::now();
    let prepared = fixer.prepare();
    report.stats.prepare_duration_ms = phase.elapsed().as_millis() as u64;

    match prepared {
        Err(e) => {
            warn!(error = %e, "Prepare failed");
            report.error = Some(e.to_string());
        }
        Ok(()) => {
            // ============================================================
            // Fix (+ rollback on failure)
            // ============================================================

            let phase = Instant::now();
            let fixed = fixer.fix(request);
            report.stats.fix_duration_ms = phase.elapsed().as_millis() as u64;

            match fixed {
                Ok(outcome) => {
                    info!(path = %outcome.installed_path.display(), "Fix applied");
                    report.installed_path = Some(outcome.installed_path);
                    report.path_check = Some(outcome.path_check);
                }
                Err(e) => {
                    warn!(error = %e, "Fix failed, rolling back");
                    report.error = Some(e.to_string());
                    match fixer.rollback() {
                        Ok(outcome) => report.rollback = Some(outcome),
                        Err(e) => report.warnings.push(format!("rollback: {e}")),
                    }
                }
            }
        }
    }

    // ====================================================================
    // Cleanup
    // ====================================================================

    let phase = Instant::now();
    match fixer.cleanup() {
        Ok(outcome) => report.cleanup = Some(outcome),
        Err(e) => {
            warn!(error = %e, "Cleanup failed");
            report.warnings.push(format!("cleanup: {e}"));
        }
    }
    report.stats.cleanup_duration_ms = phase.elapsed().as_millis() as u64;
    report.stats.total_duration_ms = start.elapsed().as_millis() as u64;

    report
}

// ============================================================================
// Tests
// ============================================================================
