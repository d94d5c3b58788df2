use std::sync::Arc;

use futures::future::join_all;
use kubeslurm::{JobRef, JobState, SlurmJob, error_messages};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::slurm::SlurmReply;
use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum ReconcileOutcome {
    /// The status now mirrors the scheduler.
    Mirrored {
        state: JobState,
        reason: Option<String>,
    },
    /// The lookup failed or slurmrestd answered with errors; the job is
    /// marked `UNKNOWN`.
    RemoteError { errors: Vec<String> },
}

/// Per-tick totals, mostly for logging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub candidates: usize,
    pub mirrored: usize,
    pub remote_errors: usize,
    pub failed: usize,
}

/// Copies the scheduler's view of one job into its status.
#[tracing::instrument(skip_all, fields(job = job.metadata.name.as_deref().unwrap_or_default()), ret, err)]
pub async fn reconcile_job(ctx: &Context, job: &SlurmJob) -> Result<ReconcileOutcome> {
    let job_ref = JobRef::from_resource(job)?;
    let status = job.status.clone().unwrap_or_default();
    let slurm_job_id = status
        .slurm_job_id
        .ok_or_else(|| Error::MissingJobId(job_ref.to_string()))?;
    tracing::debug!("Looking up Slurm job {slurm_job_id} for {job_ref}");
    let (state, next) = match ctx.slurm.job(slurm_job_id, None).await {
        Err(err) if err.is_fatal() => return Err(err),
        Err(err) => {
            tracing::error!("Lookup of Slurm job {slurm_job_id} failed: {err}");
            (JobState::Unknown, status.remote_error(vec![err.to_string()]))
        }
        Ok(response) if response.has_errors() => {
            let errors = error_messages(response.error_codes());
            tracing::error!(
                "Lookup of Slurm job {slurm_job_id} failed ({:?}): {errors:?}",
                response.error_codes()
            );
            (JobState::Unknown, status.remote_error(errors))
        }
        Ok(response) => {
            let [remote] = response.jobs.as_slice() else {
                return Err(Error::Federation {
                    job_id: slurm_job_id,
                    found: response.jobs.len(),
                });
            };
            let state = JobState::from_remote(remote.state.current.as_deref().unwrap_or_default());
            (state, status.mirrored(state, remote.state.reason.clone()))
        }
    };

    if !JobState::can_transition(status.state, state) {
        return Err(Error::Transition {
            job: job_ref.to_string(),
            from: status.state,
            to: state,
        });
    }
    if status.state != Some(state) {
        tracing::info!("Job {job_ref} moved from {:?} to {state}", status.state);
    }
    ctx.store.patch_status(&job_ref, &next).await?;

    Ok(match next.errors {
        Some(errors) => ReconcileOutcome::RemoteError { errors },
        None => ReconcileOutcome::Mirrored {
            state,
            reason: next.reason,
        },
    })
}

/// One reconciliation pass over every job in a reconcilable state.
///
/// Jobs are looked up concurrently and independently: a failing job is logged
/// and counted, the others still move. Only a fatal error fails the pass.
pub async fn reconcile_all(ctx: &Context) -> Result<TickReport> {
    let jobs = ctx
        .store
        .list()
        .await?
        .into_iter()
        .filter(|job| job.state().is_some_and(JobState::is_reconcilable))
        .collect::<Vec<_>>();
    let mut report = TickReport {
        candidates: jobs.len(),
        ..Default::default()
    };
    if jobs.is_empty() {
        tracing::info!("No jobs to reconcile");
        return Ok(report);
    }

    let results = join_all(jobs.iter().map(|job| reconcile_job(ctx, job))).await;
    let mut fatal = None;
    for (job, result) in jobs.iter().zip(results) {
        match result {
            Ok(ReconcileOutcome::Mirrored { .. }) => report.mirrored += 1,
            Ok(ReconcileOutcome::RemoteError { .. }) => report.remote_errors += 1,
            Err(err) => {
                report.failed += 1;
                tracing::error!(
                    "Failed to reconcile job {}: {err}",
                    job.metadata.name.as_deref().unwrap_or_default()
                );
                if err.is_fatal() {
                    fatal.get_or_insert(err);
                }
            }
        }
    }
    match fatal {
        Some(err) => Err(err),
        None => Ok(report),
    }
}

/// Runs [`reconcile_all`] every reconciliation interval until `token` is
/// cancelled. Ticks never overlap: a tick that overruns the interval makes
/// the missed ones be skipped.
pub async fn run(ctx: Arc<Context>, token: CancellationToken) -> Result<()> {
    let period = ctx.config.reconciliation_interval();
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!("Reconciling jobs every {period:?}");
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }
        match reconcile_all(&ctx).await {
            Ok(report) => tracing::debug!("Reconciliation finished: {report:?}"),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => tracing::error!("Reconciliation failed: {err}"),
        }
    }
    tracing::info!("Reconciliation stopped");
    Ok(())
}
