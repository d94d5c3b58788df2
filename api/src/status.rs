use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{JobState, Result, SlurmJob};

/// Status subresource of a [`SlurmJob`].
///
/// Every field is serialized, `None` included, so that a merge patch of the
/// whole record clears stale values.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub slurm_job_id: Option<u32>,
    pub state: Option<JobState>,
    pub errors: Option<Vec<String>>,
    pub updated_at: Option<String>,
    pub reason: Option<String>,
    pub last_applied_spec: Option<String>,
}

pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn encode_spec(spec: &Map<String, Value>) -> Result<String> {
    Ok(serde_json::to_string(spec)?)
}

impl JobStatus {
    pub fn submitted(slurm_job_id: Option<u32>, applied: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            slurm_job_id,
            state: Some(JobState::Submitted),
            errors: None,
            updated_at: Some(timestamp()),
            reason: None,
            last_applied_spec: Some(encode_spec(applied)?),
        })
    }

    pub fn rejected(errors: Vec<String>) -> Self {
        Self {
            state: Some(JobState::Rejected),
            errors: Some(errors),
            updated_at: Some(timestamp()),
            ..Default::default()
        }
    }

    /// The record after a successful partial update: only the applied spec
    /// and the timestamp move.
    pub fn with_applied_spec(&self, applied: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            last_applied_spec: Some(encode_spec(applied)?),
            updated_at: Some(timestamp()),
            ..self.clone()
        })
    }

    /// The record after slurmrestd answered a lookup with errors.
    pub fn remote_error(&self, errors: Vec<String>) -> Self {
        Self {
            slurm_job_id: self.slurm_job_id,
            state: Some(JobState::Unknown),
            errors: Some(errors),
            updated_at: Some(timestamp()),
            reason: None,
            last_applied_spec: self.last_applied_spec.clone(),
        }
    }

    /// The record mirroring the scheduler's view of the job.
    pub fn mirrored(&self, state: JobState, reason: Option<String>) -> Self {
        Self {
            slurm_job_id: self.slurm_job_id,
            state: Some(state),
            errors: None,
            updated_at: Some(timestamp()),
            reason,
            last_applied_spec: self.last_applied_spec.clone(),
        }
    }

    pub fn applied_spec(&self) -> Result<Option<Map<String, Value>>> {
        self.last_applied_spec
            .as_deref()
            .map(|raw| match serde_json::from_str(raw)? {
                Value::Object(map) => Ok(map),
                other => Err(crate::Error::expected_json_type("object", &other)),
            })
            .transpose()
    }
}

impl SlurmJob {
    pub fn state(&self) -> Option<JobState> {
        self.status.as_ref().and_then(|status| status.state)
    }
}
