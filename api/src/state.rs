use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(
    Clone, Copy, Debug, Deserialize, Display, EnumString, Eq, Hash, JsonSchema, PartialEq, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Unknown,
    Pending,
    Submitted,
    Rejected,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// States whose remote status is still polled by the reconciliation engine.
    pub const RECONCILABLE: &'static [JobState] = &[
        JobState::Submitted,
        JobState::Unknown,
        JobState::Pending,
        JobState::Running,
    ];

    /// States in which a spec change may still be pushed to the remote job.
    pub const UPDATABLE: &'static [JobState] =
        &[JobState::Submitted, JobState::Unknown, JobState::Pending];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Rejected | JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    pub fn is_reconcilable(self) -> bool {
        Self::RECONCILABLE.contains(&self)
    }

    pub fn is_updatable(self) -> bool {
        Self::UPDATABLE.contains(&self)
    }

    /// States the reconciliation engine may copy from the remote scheduler.
    pub fn is_mirrored(self) -> bool {
        !matches!(self, JobState::Submitted | JobState::Rejected)
    }

    /// Whether a status may move from `from` to `to`.
    ///
    /// A fresh resource (`from == None`) may only be submitted or rejected.
    /// Polled states move to whatever the scheduler reports. Terminal states
    /// never move again.
    pub fn can_transition(from: Option<JobState>, to: JobState) -> bool {
        match from {
            None => matches!(to, JobState::Submitted | JobState::Rejected),
            Some(from) if from.is_terminal() => false,
            Some(_) => to.is_mirrored(),
        }
    }

    /// Folds a slurmrestd `state.current` value into the enumerated states.
    pub fn from_remote(state: &str) -> JobState {
        let state = state.trim().to_ascii_uppercase();
        if let Ok(known) = state.parse::<JobState>()
            && known.is_mirrored()
        {
            return known;
        }
        match state.as_str() {
            "TIMEOUT" | "NODE_FAIL" | "OUT_OF_MEMORY" | "BOOT_FAIL" | "DEADLINE" | "PREEMPTED" => {
                JobState::Failed
            }
            "COMPLETING" | "CONFIGURING" | "SUSPENDED" | "STOPPED" | "RESIZING" | "SIGNALING"
            | "STAGE_OUT" => JobState::Running,
            "REQUEUED" | "REQUEUE_HOLD" | "REQUEUE_FED" | "RESV_DEL_HOLD" => JobState::Pending,
            _ => JobState::Unknown,
        }
    }
}
