use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::token::TokenManager;
use crate::{Config, Error, Result};

const SLURM_API: &str = "slurm/v0.0.37";
const SLURMDB_API: &str = "slurmdb/v0.0.36";

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct SlurmError {
    #[serde(default, alias = "errno")]
    pub error_number: i64,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Anything slurmrestd answers carries an `errors` list; a non-empty one
/// means the call failed.
pub trait SlurmReply {
    fn errors(&self) -> &[SlurmError];

    fn error_codes(&self) -> Vec<i64> {
        self.errors().iter().map(|err| err.error_number).collect()
    }

    fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub job_id: Option<u32>,
    #[serde(default)]
    pub step_id: Option<String>,
    #[serde(default)]
    pub job_submit_user_msg: Option<String>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub errors: Vec<SlurmError>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct UpdateResponse {
    #[serde(default, deserialize_with = "nullable_list")]
    pub errors: Vec<SlurmError>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct RemoteJobState {
    #[serde(default)]
    pub current: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// The scheduler's view of one job.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct RemoteJob {
    #[serde(default)]
    pub job_id: Option<u32>,
    #[serde(default)]
    pub state: RemoteJobState,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct JobsResponse {
    #[serde(default, deserialize_with = "nullable_list")]
    pub jobs: Vec<RemoteJob>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub errors: Vec<SlurmError>,
}

impl SlurmReply for SubmitResponse {
    fn errors(&self) -> &[SlurmError] {
        &self.errors
    }
}

impl SlurmReply for UpdateResponse {
    fn errors(&self) -> &[SlurmError] {
        &self.errors
    }
}

impl SlurmReply for JobsResponse {
    fn errors(&self) -> &[SlurmError] {
        &self.errors
    }
}

fn nullable_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Body of `POST /slurm/v0.0.37/job/submit`.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct JobSubmission {
    pub script: String,
    pub job: Map<String, Value>,
}

/// slurmrestd client. Every request carries the acting user and its token
/// and is logged before and after it is sent.
#[derive(Clone, Debug)]
pub struct SlurmClient {
    base_url: Url,
    http: reqwest::Client,
    tokens: TokenManager,
}

impl SlurmClient {
    pub fn new(config: &Config, tokens: TokenManager) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.slurmrestd_timeout() {
            builder = builder.timeout(timeout);
        }
        // `Url::join` replaces the last segment of a base without a trailing slash.
        let mut base_url = config.slurmrestd_endpoint.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            http: builder.build()?,
            tokens,
        })
    }

    #[inline]
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        user: Option<&str>,
    ) -> Result<RequestBuilder> {
        let request = self.http.request(method, self.url(path)?);
        Ok(self.tokens.authorize(request, user).await?)
    }

    /// slurmrestd reports most failures with a non-2xx status and an `errors`
    /// list in the body, so the body is decoded regardless of the status.
    async fn send<T>(&self, request: RequestBuilder) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let request = request.build()?;
        let method = request.method().clone();
        let url = request.url().clone();
        tracing::debug!("Making request: {method} {url}");
        let response = self.http.execute(request).await?;
        let status = response.status();
        tracing::debug!("Received response: {method} {url} {status}");
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|err| {
            if status.is_success() {
                Error::from(err)
            } else {
                Error::Response {
                    status,
                    body: String::from_utf8_lossy(&body).into_owned(),
                }
            }
        })
    }

    #[tracing::instrument(level = "debug", skip(self, submission), err)]
    pub async fn submit(
        &self,
        submission: &JobSubmission,
        user: Option<&str>,
    ) -> Result<SubmitResponse> {
        let request = self
            .request(Method::POST, &format!("{SLURM_API}/job/submit"), user)
            .await?
            .json(submission);
        self.send(request).await
    }

    #[tracing::instrument(level = "debug", skip(self, changes), err)]
    pub async fn update(
        &self,
        job_id: u32,
        changes: &Map<String, Value>,
        user: Option<&str>,
    ) -> Result<UpdateResponse> {
        let request = self
            .request(Method::POST, &format!("{SLURM_API}/job/{job_id}"), user)
            .await?
            .json(changes);
        self.send(request).await
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn job(&self, job_id: u32, user: Option<&str>) -> Result<JobsResponse> {
        let request = self
            .request(Method::GET, &format!("{SLURMDB_API}/job/{job_id}"), user)
            .await?;
        self.send(request).await
    }
}
