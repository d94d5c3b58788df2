use std::fmt;

use chrono::{DateTime, Utc};
use kube::Resource;

use crate::{Error, Result};

pub trait ResourceNameExt: Resource {
    fn name(&self) -> Result<&str> {
        self.meta()
            .name
            .as_deref()
            .ok_or(Error::ObjectMetaMissing("name"))
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.meta().creation_timestamp.as_ref().map(|time| time.0)
    }
}

impl<T> ResourceNameExt for T where T: Resource {}

/// Name and namespace of a job resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JobRef {
    pub name: String,
    pub namespace: Option<String>,
}

impl JobRef {
    pub fn new(name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            namespace: None,
        }
    }

    pub fn within(mut self, namespace: impl ToString) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    pub fn from_resource(resource: &impl Resource) -> Result<Self> {
        Ok(Self {
            name: resource.name()?.to_string(),
            namespace: resource.meta().namespace.clone(),
        })
    }
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{namespace}/{}", self.name),
            None => self.name.fmt(f),
        }
    }
}
