#[cfg(feature = "client")]
mod api;
#[cfg(feature = "client")]
mod client;
mod crd;
mod error;
mod error_code;
mod meta;
mod nullable;
mod state;
mod status;

pub use k8s_openapi;
pub use kube;

#[cfg(feature = "client")]
pub use api::{JobApi, JobEvent, Scope};
#[cfg(feature = "client")]
pub use client::{Client, ClientBuilder};
pub use crd::{JobProperties, SlurmJob};
#[cfg(feature = "client")]
pub use error::ClientBuildError;
pub use error::{Error, Result};
pub use error_code::{error_message, error_messages};
pub use meta::{JobRef, ResourceNameExt};
pub use state::JobState;
pub use status::{JobStatus, timestamp};

pub mod prelude {
    pub use super::ResourceNameExt;
    pub use kube::{Resource, ResourceExt};
}
