use futures::prelude::*;
use kubeslurm::prelude::*;
use kubeslurm::{JobEvent, JobRef, JobState, JobStatus, SlurmJob, error_messages};
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::diff::spec_diff;
use crate::slurm::{JobSubmission, SlurmReply};
use crate::{Error, Result};

const MISSING_JOB_ID: &str = "Submission returned no Slurm job id";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    MissingCreationTimestamp,
    CreatedBeforeStart,
    AlreadyHandled(JobState),
    NotYetSubmitted,
    NotUpdatable(Option<JobState>),
    NoChanges,
}

/// What handling a single event did.
#[derive(Clone, Debug, PartialEq)]
pub enum EventOutcome {
    Submitted { slurm_job_id: u32 },
    Rejected { errors: Vec<String> },
    Updated { fields: Vec<String> },
    /// slurmrestd refused the update; the status is left as it was.
    UpdateRejected { errors: Vec<String> },
    Deleted,
    Skipped(SkipReason),
}

#[tracing::instrument(
    skip_all,
    fields(job = event.job().metadata.name.as_deref().unwrap_or_default()),
    ret,
    err
)]
pub async fn handle_event(ctx: &Context, event: JobEvent) -> Result<EventOutcome> {
    match event {
        JobEvent::Added(job) => submit(ctx, &job).await,
        JobEvent::Modified(job) => update(ctx, &job).await,
        JobEvent::Deleted(job) => {
            let job_ref = JobRef::from_resource(&job)?;
            tracing::info!("Job {job_ref} was deleted. Cancelling Slurm jobs is not supported");
            Ok(EventOutcome::Deleted)
        }
    }
}

async fn submit(ctx: &Context, job: &SlurmJob) -> Result<EventOutcome> {
    let job_ref = JobRef::from_resource(job)?;
    let Some(created_at) = job.created_at() else {
        tracing::warn!("Job {job_ref} has no creation timestamp. Skipping");
        return Ok(EventOutcome::Skipped(SkipReason::MissingCreationTimestamp));
    };
    if created_at <= ctx.started_at {
        tracing::warn!("Job {job_ref} was created before the controller started. Skipping");
        return Ok(EventOutcome::Skipped(SkipReason::CreatedBeforeStart));
    }
    // A reconnected watch replays every live resource as added.
    if let Some(state) = job.state() {
        tracing::debug!("Job {job_ref} was already handled ({state}). Skipping");
        return Ok(EventOutcome::Skipped(SkipReason::AlreadyHandled(state)));
    }

    let submission = JobSubmission {
        script: job.spec.script.clone(),
        job: job.spec.job_payload()?,
    };
    let response = ctx.slurm.submit(&submission, None).await?;
    if response.has_errors() {
        let errors = error_messages(response.error_codes());
        tracing::error!(
            "Slurm rejected job {job_ref} ({:?}): {errors:?}",
            response.error_codes()
        );
        ctx.store
            .patch_status(&job_ref, &JobStatus::rejected(errors.clone()))
            .await?;
        return Ok(EventOutcome::Rejected { errors });
    }

    // Without an id the job can be neither looked up nor updated.
    let Some(slurm_job_id) = response.job_id else {
        tracing::error!("slurmrestd accepted job {job_ref} without returning a job id");
        let errors = vec![MISSING_JOB_ID.to_string()];
        ctx.store
            .patch_status(&job_ref, &JobStatus::rejected(errors.clone()))
            .await?;
        return Ok(EventOutcome::Rejected { errors });
    };
    tracing::info!("Submitted job {job_ref} as Slurm job {slurm_job_id}");
    ctx.store
        .patch_status(
            &job_ref,
            &JobStatus::submitted(Some(slurm_job_id), &submission.job)?,
        )
        .await?;
    Ok(EventOutcome::Submitted { slurm_job_id })
}

async fn update(ctx: &Context, job: &SlurmJob) -> Result<EventOutcome> {
    let job_ref = JobRef::from_resource(job)?;
    let Some(status) = job
        .status
        .as_ref()
        .filter(|status| status.last_applied_spec.is_some())
    else {
        tracing::debug!("Job {job_ref} has not been submitted yet. Skipping");
        return Ok(EventOutcome::Skipped(SkipReason::NotYetSubmitted));
    };
    if !status.state.is_some_and(JobState::is_updatable) {
        tracing::warn!(
            "Job {job_ref} can't be updated in state {:?}. Skipping",
            status.state
        );
        return Ok(EventOutcome::Skipped(SkipReason::NotUpdatable(status.state)));
    }

    let desired = job.spec.job_payload()?;
    let applied = status.applied_spec()?.unwrap_or_default();
    let changes = spec_diff(&desired, &applied);
    if changes.is_empty() {
        tracing::debug!("Job {job_ref} has no pending changes");
        return Ok(EventOutcome::Skipped(SkipReason::NoChanges));
    }

    let slurm_job_id = status
        .slurm_job_id
        .ok_or_else(|| Error::MissingJobId(job_ref.to_string()))?;
    let fields = changes.keys().cloned().collect::<Vec<_>>();
    tracing::info!("Updating Slurm job {slurm_job_id} of {job_ref}: {fields:?}");
    let response = ctx.slurm.update(slurm_job_id, &changes, None).await?;
    if response.has_errors() {
        let errors = error_messages(response.error_codes());
        tracing::error!(
            "Slurm refused to update job {job_ref} ({:?}): {errors:?}",
            response.error_codes()
        );
        return Ok(EventOutcome::UpdateRejected { errors });
    }

    // The reconciliation engine may have moved the state since this event
    // was emitted, so only the applied spec is taken from here.
    let current = ctx
        .store
        .get(&job_ref)
        .await?
        .status
        .unwrap_or_else(|| status.clone());
    ctx.store
        .patch_status(&job_ref, &current.with_applied_spec(&desired)?)
        .await?;
    Ok(EventOutcome::Updated { fields })
}

/// Drains one watch session into [`handle_event`].
///
/// Returns once the stream ends or `token` is cancelled. The first failing
/// item or handler ends the session with its error.
pub async fn consume(ctx: &Context, token: &CancellationToken) -> Result<()> {
    let mut events = ctx.store.watch().await?;
    tracing::debug!("Opened event stream");
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::debug!("Stopping event stream");
                return Ok(());
            }
            next = events.next() => next,
        };
        match next {
            Some(event) => {
                handle_event(ctx, event?).await?;
            }
            None => {
                tracing::debug!("Event stream ended");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use kubeslurm::{JobProperties, error_message};
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::context::tests::context;
    use crate::store::memory::{MemoryStore, job};

    fn spec(tasks: i64) -> JobProperties {
        JobProperties {
            script: "#!/bin/bash\nsrun hostname".to_string(),
            name: Some(Some("hello".to_string())),
            tasks: Some(Some(tasks)),
            ..Default::default()
        }
    }

    fn submitted(spec: &JobProperties, state: JobState) -> JobStatus {
        JobStatus {
            state: Some(state),
            ..JobStatus::submitted(Some(42), &spec.job_payload().unwrap()).unwrap()
        }
    }

    async fn never_called(server: &MockServer) {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_added_job_is_submitted() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let ctx = context(&dir, &server, store.clone());
        Mock::given(method("POST"))
            .and(path("/slurm/v0.0.37/job/submit"))
            .and(body_json(json!({
                "script": "#!/bin/bash\nsrun hostname",
                "job": {"name": "hello", "tasks": 1, "get_user_environment": 1},
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "job_id": 42,
                "errors": [],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let new = job("hello", ctx.started_at + Duration::seconds(1), spec(1));
        store.insert(new.clone());
        let outcome = handle_event(&ctx, JobEvent::Added(new)).await.unwrap();
        assert_eq!(
            outcome,
            EventOutcome::Submitted { slurm_job_id: 42 }
        );

        let status = store.status("hello").unwrap();
        assert_eq!(status.state, Some(JobState::Submitted));
        assert_eq!(status.slurm_job_id, Some(42));
        assert_eq!(status.errors, None);
        assert_eq!(
            status.applied_spec().unwrap(),
            Some(spec(1).job_payload().unwrap())
        );
    }

    #[tokio::test]
    async fn test_added_job_rejected_by_slurm() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let ctx = context(&dir, &server, store.clone());
        Mock::given(method("POST"))
            .and(path("/slurm/v0.0.37/job/submit"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "errors": [{"error_number": 2127}, {"error_number": 1}],
            })))
            .mount(&server)
            .await;

        let new = job("hello", ctx.started_at + Duration::seconds(1), spec(1));
        store.insert(new.clone());
        let outcome = handle_event(&ctx, JobEvent::Added(new)).await.unwrap();
        let errors = vec![error_message(2127).unwrap().to_string()];
        assert_eq!(
            outcome,
            EventOutcome::Rejected {
                errors: errors.clone()
            }
        );

        let status = store.status("hello").unwrap();
        assert_eq!(status.state, Some(JobState::Rejected));
        assert_eq!(status.errors, Some(errors));
        assert_eq!(status.slurm_job_id, None);
        assert_eq!(status.last_applied_spec, None);
    }

    #[tokio::test]
    async fn test_submission_without_job_id_is_rejected() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let ctx = context(&dir, &server, store.clone());
        Mock::given(method("POST"))
            .and(path("/slurm/v0.0.37/job/submit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"errors": []})))
            .mount(&server)
            .await;

        let new = job("hello", ctx.started_at + Duration::seconds(1), spec(1));
        store.insert(new.clone());
        let outcome = handle_event(&ctx, JobEvent::Added(new)).await.unwrap();
        assert_eq!(
            outcome,
            EventOutcome::Rejected {
                errors: vec![MISSING_JOB_ID.to_string()]
            }
        );

        let status = store.status("hello").unwrap();
        assert_eq!(status.state, Some(JobState::Rejected));
        assert_eq!(status.slurm_job_id, None);
        assert_eq!(status.last_applied_spec, None);
        assert!(!status.state.unwrap().is_reconcilable());
    }

    #[tokio::test]
    async fn test_added_before_start_is_skipped() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let ctx = context(&dir, &server, store.clone());
        never_called(&server).await;

        let old = job("old", Utc::now() - Duration::minutes(5), spec(1));
        let outcome = handle_event(&ctx, JobEvent::Added(old)).await.unwrap();
        assert_eq!(
            outcome,
            EventOutcome::Skipped(SkipReason::CreatedBeforeStart)
        );

        let simultaneous = job("simultaneous", ctx.started_at, spec(1));
        let outcome = handle_event(&ctx, JobEvent::Added(simultaneous))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            EventOutcome::Skipped(SkipReason::CreatedBeforeStart)
        );

        let mut unstamped = job("unstamped", Utc::now(), spec(1));
        unstamped.metadata.creation_timestamp = None;
        let outcome = handle_event(&ctx, JobEvent::Added(unstamped))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            EventOutcome::Skipped(SkipReason::MissingCreationTimestamp)
        );
        assert!(store.patches().is_empty());
    }

    #[tokio::test]
    async fn test_replayed_added_is_skipped() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let ctx = context(&dir, &server, store.clone());
        never_called(&server).await;

        let mut replayed = job("hello", ctx.started_at + Duration::seconds(1), spec(1));
        replayed.status = Some(submitted(&spec(1), JobState::Running));
        let outcome = handle_event(&ctx, JobEvent::Added(replayed))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            EventOutcome::Skipped(SkipReason::AlreadyHandled(JobState::Running))
        );
    }

    #[tokio::test]
    async fn test_modified_skips() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let ctx = context(&dir, &server, store.clone());
        never_called(&server).await;
        let created = ctx.started_at + Duration::seconds(1);

        let fresh = job("fresh", created, spec(2));
        assert_eq!(
            handle_event(&ctx, JobEvent::Modified(fresh)).await.unwrap(),
            EventOutcome::Skipped(SkipReason::NotYetSubmitted)
        );

        let mut rejected = job("rejected", created, spec(2));
        rejected.status = Some(JobStatus::rejected(vec![]));
        assert_eq!(
            handle_event(&ctx, JobEvent::Modified(rejected))
                .await
                .unwrap(),
            EventOutcome::Skipped(SkipReason::NotYetSubmitted)
        );

        let mut running = job("running", created, spec(2));
        running.status = Some(submitted(&spec(1), JobState::Running));
        assert_eq!(
            handle_event(&ctx, JobEvent::Modified(running))
                .await
                .unwrap(),
            EventOutcome::Skipped(SkipReason::NotUpdatable(Some(JobState::Running)))
        );

        let mut completed = job("completed", created, spec(2));
        completed.status = Some(submitted(&spec(1), JobState::Completed));
        assert_eq!(
            handle_event(&ctx, JobEvent::Modified(completed))
                .await
                .unwrap(),
            EventOutcome::Skipped(SkipReason::NotUpdatable(Some(JobState::Completed)))
        );

        let mut echo = job("echo", created, spec(1));
        echo.status = Some(submitted(&spec(1), JobState::Submitted));
        assert_eq!(
            handle_event(&ctx, JobEvent::Modified(echo)).await.unwrap(),
            EventOutcome::Skipped(SkipReason::NoChanges)
        );
        assert!(store.patches().is_empty());
    }

    #[tokio::test]
    async fn test_modified_pushes_only_changed_fields() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let ctx = context(&dir, &server, store.clone());
        Mock::given(method("POST"))
            .and(path("/slurm/v0.0.37/job/42"))
            .and(body_json(json!({"tasks": 4})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"errors": []})))
            .expect(1)
            .mount(&server)
            .await;

        let mut changed = job("hello", ctx.started_at + Duration::seconds(1), spec(4));
        changed.status = Some(submitted(&spec(1), JobState::Pending));
        store.insert(changed.clone());

        let outcome = handle_event(&ctx, JobEvent::Modified(changed))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            EventOutcome::Updated {
                fields: vec!["tasks".to_string()]
            }
        );

        let status = store.status("hello").unwrap();
        assert_eq!(status.state, Some(JobState::Pending));
        assert_eq!(status.slurm_job_id, Some(42));
        assert_eq!(
            status.applied_spec().unwrap(),
            Some(spec(4).job_payload().unwrap())
        );
    }

    #[tokio::test]
    async fn test_update_keeps_state_moved_by_reconciliation() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let ctx = context(&dir, &server, store.clone());
        Mock::given(method("POST"))
            .and(path("/slurm/v0.0.37/job/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"errors": []})))
            .mount(&server)
            .await;

        let mut changed = job("hello", ctx.started_at + Duration::seconds(1), spec(4));
        changed.status = Some(submitted(&spec(1), JobState::Pending));
        let mut stored = changed.clone();
        stored.status = Some(submitted(&spec(1), JobState::Running));
        store.insert(stored);

        handle_event(&ctx, JobEvent::Modified(changed))
            .await
            .unwrap();
        let status = store.status("hello").unwrap();
        assert_eq!(status.state, Some(JobState::Running));
        assert_eq!(
            status.applied_spec().unwrap(),
            Some(spec(4).job_payload().unwrap())
        );
    }

    #[tokio::test]
    async fn test_refused_update_leaves_status() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let ctx = context(&dir, &server, store.clone());
        Mock::given(method("POST"))
            .and(path("/slurm/v0.0.37/job/42"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "errors": [{"errno": 2084}],
            })))
            .mount(&server)
            .await;

        let mut changed = job("hello", ctx.started_at + Duration::seconds(1), spec(4));
        changed.status = Some(submitted(&spec(1), JobState::Pending));
        store.insert(changed.clone());

        let outcome = handle_event(&ctx, JobEvent::Modified(changed))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            EventOutcome::UpdateRejected {
                errors: vec![error_message(2084).unwrap().to_string()]
            }
        );
        assert!(store.patches().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_is_only_logged() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let ctx = context(&dir, &server, store.clone());
        never_called(&server).await;

        let mut gone = job("gone", ctx.started_at + Duration::seconds(1), spec(1));
        gone.status = Some(submitted(&spec(1), JobState::Running));
        assert_eq!(
            handle_event(&ctx, JobEvent::Deleted(gone)).await.unwrap(),
            EventOutcome::Deleted
        );
        assert!(store.patches().is_empty());
    }

    #[tokio::test]
    async fn test_consume_stops_when_cancelled() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let ctx = context(&dir, &server, store.clone());

        let token = CancellationToken::new();
        token.cancel();
        consume(&ctx, &token).await.unwrap();
        assert_eq!(store.watch_count(), 1);
    }
}
