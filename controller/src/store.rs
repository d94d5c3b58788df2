use async_trait::async_trait;
use futures::prelude::*;
use futures::stream::BoxStream;
use kubeslurm::{JobApi, JobEvent, JobRef, JobStatus, SlurmJob};

use crate::{Error, Result};

/// The resource store as seen by the pipelines. Both pipelines share nothing
/// but this: every status write is a read followed by a merge patch.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn list(&self) -> Result<Vec<SlurmJob>>;

    async fn get(&self, job: &JobRef) -> Result<SlurmJob>;

    async fn patch_status(&self, job: &JobRef, status: &JobStatus) -> Result<()>;

    /// A fresh change stream. Dropping the stream stops it.
    async fn watch(&self) -> Result<BoxStream<'static, Result<JobEvent>>>;
}

#[async_trait]
impl JobStore for JobApi {
    async fn list(&self) -> Result<Vec<SlurmJob>> {
        Ok(JobApi::list(self).await?)
    }

    async fn get(&self, job: &JobRef) -> Result<SlurmJob> {
        Ok(JobApi::get(self, job).await?)
    }

    async fn patch_status(&self, job: &JobRef, status: &JobStatus) -> Result<()> {
        JobApi::patch_status(self, job, status).await?;
        Ok(())
    }

    async fn watch(&self) -> Result<BoxStream<'static, Result<JobEvent>>> {
        Ok(JobApi::watch(self).await?.map_err(Error::from).boxed())
    }
}
