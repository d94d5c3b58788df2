use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Couldn't find the slurmrestd JWT key file at {}", .0.display())]
    KeyMissing(PathBuf),
    #[error("Couldn't read the slurmrestd JWT key file at {} (missing permissions)", .0.display())]
    KeyPermission(PathBuf),
    #[error("Couldn't read the slurmrestd JWT key file at {}: {source}", .path.display())]
    KeyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("Invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),
}

impl TokenError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TokenError::KeyMissing(_) | TokenError::KeyPermission(_) | TokenError::KeyRead { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Kube(#[from] kubeslurm::Error),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Url(#[from] url::ParseError),
    #[error("Unexpected response from slurmrestd ({status}): {body}")]
    Response {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Expected exactly one Slurm job with id {job_id}, found {found} (federated clusters are not supported)")]
    Federation { job_id: u32, found: usize },
    #[error("Job {0} has no Slurm job id")]
    MissingJobId(String),
    #[error("Refusing to move job {job} from {from:?} to {to}")]
    Transition {
        job: String,
        from: Option<kubeslurm::JobState>,
        to: kubeslurm::JobState,
    },
    #[error("Event listener task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors that no retry can fix: the controller must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Token(err) if err.is_fatal())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Kube(err.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
