use futures::prelude::*;
use futures::stream::BoxStream;
use kube::api::{DynamicObject, ListParams, Patch, PatchParams, WatchEvent, WatchParams};
use kube::core::ApiResource;

use crate::{Error, JobRef, JobStatus, Result, SlurmJob};

/// Where the controller looks for job resources.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    Namespace(String),
    Cluster,
}

/// A change observed on a job resource.
#[derive(Clone, Debug)]
pub enum JobEvent {
    Added(SlurmJob),
    Modified(SlurmJob),
    Deleted(SlurmJob),
}

impl JobEvent {
    pub fn job(&self) -> &SlurmJob {
        match self {
            JobEvent::Added(job) | JobEvent::Modified(job) | JobEvent::Deleted(job) => job,
        }
    }

    /// Bookmarks carry no object and are dropped; an `ERROR` event ends the
    /// stream as an error.
    pub fn from_watch_event(event: WatchEvent<DynamicObject>) -> Result<Option<Self>> {
        Ok(match event {
            WatchEvent::Added(obj) => Some(JobEvent::Added(obj.try_parse()?)),
            WatchEvent::Modified(obj) => Some(JobEvent::Modified(obj.try_parse()?)),
            WatchEvent::Deleted(obj) => Some(JobEvent::Deleted(obj.try_parse()?)),
            WatchEvent::Bookmark(_) => None,
            WatchEvent::Error(err) => {
                return Err(Error::Watch {
                    code: err.code,
                    message: err.message,
                });
            }
        })
    }
}

/// Access to job resources addressed through a runtime [`ApiResource`], so the
/// group, version and plural can come from configuration.
#[derive(Clone)]
pub struct JobApi {
    name: String,
    client: kube::Client,
    resource: ApiResource,
    scope: Scope,
}

impl JobApi {
    pub fn new(name: String, client: kube::Client, resource: ApiResource, scope: Scope) -> Self {
        Self {
            name,
            client,
            resource,
            scope,
        }
    }

    #[inline]
    pub fn patch_params(&self) -> PatchParams {
        PatchParams {
            field_manager: Some(self.name.clone()),
            ..Default::default()
        }
    }

    fn scoped(&self) -> kube::Api<DynamicObject> {
        match &self.scope {
            Scope::Namespace(namespace) => {
                kube::Api::namespaced_with(self.client.clone(), namespace, &self.resource)
            }
            Scope::Cluster => kube::Api::all_with(self.client.clone(), &self.resource),
        }
    }

    fn for_ref(&self, job: &JobRef) -> kube::Api<DynamicObject> {
        match job.namespace.as_deref() {
            Some(namespace) => {
                kube::Api::namespaced_with(self.client.clone(), namespace, &self.resource)
            }
            None => self.scoped(),
        }
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn list(&self) -> Result<Vec<SlurmJob>> {
        self.scoped()
            .list(&ListParams::default())
            .await?
            .items
            .into_iter()
            .map(|obj| Ok(obj.try_parse()?))
            .collect()
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn get(&self, job: &JobRef) -> Result<SlurmJob> {
        Ok(self.for_ref(job).get(&job.name).await?.try_parse()?)
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn patch_status(&self, job: &JobRef, status: &JobStatus) -> Result<SlurmJob> {
        let body = serde_json::json!({ "status": status });
        Ok(self
            .for_ref(job)
            .patch_status(&job.name, &self.patch_params(), &Patch::Merge(&body))
            .await?
            .try_parse()?)
    }

    /// Opens a fresh watch. With no resource version to resume from, the API
    /// server first replays every existing object as an `ADDED` event.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn watch(&self) -> Result<BoxStream<'static, Result<JobEvent>>> {
        let events = self.scoped().watch(&WatchParams::default(), "0").await?;
        Ok(events
            .map(|event| event.map_err(Error::from).and_then(JobEvent::from_watch_event))
            .try_filter_map(|event| future::ok(event))
            .boxed())
    }
}
