use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, instrument, warn};

use crate::model::RemediationRequest;
use crate::remediate::pipeline::{run_remediation, RemediationReport};
use crate::remediate::traits::Fixer;

/// One dependency to remediate in one project.
pub struct RemediationJob {
    /// Project directory; jobs sharing it never overlap.
    pub project_dir: PathBuf,
    pub fixer: Box<dyn Fixer>,
    pub request: RemediationRequest,
}

/// Runs remediation jobs with bounded parallelism.
///
/// Fixers use fixed staging paths under the project directory, so jobs for
/// the same project are serialized behind a per-project lock. Jobs for
/// different projects share nothing and run side by side on blocking
/// threads. A failed job is reported and never stops the batch.
pub struct RemediationExecutor {
    semaphore: Arc<Semaphore>,
}

impl RemediationExecutor {
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency_limit.max(1))),
        }
    }

    /// Executes every job and returns the reports in submission order.
    #[instrument(skip(self, jobs), fields(jobs = jobs.len()))]
    pub async fn execute(&self, jobs: Vec<RemediationJob>) -> Vec<RemediationReport> {
        let mut project_locks: HashMap<PathBuf, Arc<Mutex<()>>> = HashMap::new();
        let mut handles = Vec::with_capacity(jobs.len());

        for job in jobs {
            let project_lock = Arc::clone(project_locks.entry(job.project_dir.clone()).or_default());
            let semaphore = Arc::clone(&self.semaphore);
            let fallback = RemediationReport::aborted(&job.request, job.fixer.package_manager(), "");

            let handle = tokio::spawn(async move {
                let _project = project_lock.lock_owned().await;
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return Err(format!("Semaphore error: {e}")),
                };

                info!(
                    project = %job.project_dir.display(),
                    package = %job.request.dependency.name(),
                    "Starting remediation"
                );
                tokio::task::spawn_blocking(move || {
                    let RemediationJob {
                        mut fixer, request, ..
                    } = job;
                    run_remediation(fixer.as_mut(), &request)
                })
                .await
                .map_err(|e| format!("Task join error: {e}"))
            });
            handles.push((handle, fallback));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (handle, mut fallback) in handles {
            let report = match handle.await {
                Ok(Ok(report)) => report,
                Ok(Err(error)) => {
                    fallback.error = Some(error);
                    fallback
                }
                Err(e) => {
                    fallback.error = Some(format!("Task join error: {e}"));
                    fallback
                }
            };
            if !report.succeeded() {
                warn!(
                    package = %report.package,
                    error = report.error.as_deref().unwrap_or_default(),
                    "Remediation failed"
                );
            }
            reports.push(report);
        }

        info!(
            succeeded = reports.iter().filter(|r| r.succeeded()).count(),
            total = reports.len(),
            "Finished remediation batch"
        );
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dependency, PackageManagerTag};
    use crate::remediate::traits::{FixError, FixOutcome, PhaseOutcome};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Tracks how many fixers run at once per shared counter.
    struct SlowFixer {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Fixer for SlowFixer {
        fn package_manager(&self) -> PackageManagerTag {
            PackageManagerTag::Dotnet
        }

        fn prepare(&mut self) -> Result<(), FixError> {
            Ok(())
        }

        fn fix(&mut self, request: &RemediationRequest) -> Result<FixOutcome, FixError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(30));
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.fail {
                return Err(FixError::EmptyArtifactName);
            }
            Ok(FixOutcome {
                installed_path: PathBuf::from("/cache").join(&request.fixed_version),
                path_check: PhaseOutcome::Confirmed,
            })
        }

        fn rollback(&mut self) -> Result<PhaseOutcome, FixError> {
            Ok(PhaseOutcome::Confirmed)
        }

        fn cleanup(&mut self) -> Result<PhaseOutcome, FixError> {
            Ok(PhaseOutcome::Confirmed)
        }
    }

    fn job(
        project: &str,
        version: &str,
        counters: &(Arc<AtomicUsize>, Arc<AtomicUsize>),
        fail: bool,
    ) -> RemediationJob {
        let dependency =
            Dependency::new("Lib", "1.0.0", "/cache/lib/1.0.0", PackageManagerTag::Dotnet)
                .unwrap();
        RemediationJob {
            project_dir: PathBuf::from(project),
            fixer: Box::new(SlowFixer {
                active: Arc::clone(&counters.0),
                peak: Arc::clone(&counters.1),
                fail,
            }),
            request: RemediationRequest::new(
                dependency,
                version,
                b"x".to_vec(),
                format!("Lib.{version}.nupkg"),
            ),
        }
    }

    fn counters() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)))
    }

    #[tokio::test]
    async fn test_same_project_jobs_are_serialized() {
        let shared = counters();
        let jobs = (0..4)
            .map(|i| job("/work/app", &format!("2.0.{i}"), &shared, false))
            .collect();

        let reports = RemediationExecutor::new(4).execute(jobs).await;

        assert_eq!(reports.len(), 4);
        assert!(reports.iter().all(RemediationReport::succeeded));
        assert_eq!(shared.1.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reports_keep_submission_order_and_failures() {
        let a = counters();
        let b = counters();
        let jobs = vec![
            job("/work/a", "2.0.0", &a, false),
            job("/work/b", "3.0.0", &b, true),
            job("/work/a", "2.0.1", &a, false),
        ];

        let reports = RemediationExecutor::new(2).execute(jobs).await;

        let versions: Vec<_> = reports.iter().map(|r| r.to_version.as_str()).collect();
        assert_eq!(versions, ["2.0.0", "3.0.0", "2.0.1"]);
        assert!(reports[0].succeeded());
        assert!(!reports[1].succeeded());
        assert!(reports[2].succeeded());
    }

    #[tokio::test]
    async fn test_concurrency_limit_is_respected() {
        let shared = counters();
        let jobs = (0..6)
            .map(|i| job(&format!("/work/p{i}"), "2.0.0", &shared, false))
            .collect();

        let reports = RemediationExecutor::new(2).execute(jobs).await;

        assert_eq!(reports.len(), 6);
        assert!(shared.1.load(Ordering::SeqCst) <= 2);
    }
}
