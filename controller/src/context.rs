use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::slurm::SlurmClient;
use crate::store::JobStore;
use crate::token::TokenManager;
use crate::{Config, Result};

pub struct Context {
    pub store: Arc<dyn JobStore>,
    pub slurm: SlurmClient,
    pub config: Config,
    /// Resources created before this instant are never submitted.
    pub started_at: DateTime<Utc>,
}

impl Context {
    pub fn new(store: Arc<dyn JobStore>, slurm: SlurmClient, config: Config) -> Self {
        Self {
            store,
            slurm,
            config,
            started_at: Utc::now(),
        }
    }

    /// Connects to the cluster and slurmrestd as described by `config`.
    pub async fn connect(config: Config) -> Result<Self> {
        let mut builder = kubeslurm::Client::builder();
        builder.name(&config.name);
        if let Some(path) = &config.kube_config {
            builder.kubeconfig(path);
        }
        if let Some(context) = &config.kube_context {
            builder.context(context);
        }
        let client = builder.build().await.map_err(kubeslurm::Error::from)?;
        let scope = config.scope(client.default_namespace());
        tracing::info!("Watching {} in {scope:?}", config.crd_plural);
        let store = client.jobs_in(config.api_resource(), scope);
        let slurm = SlurmClient::new(&config, TokenManager::new(&config))?;
        Ok(Self::new(Arc::new(store), slurm, config))
    }
}
