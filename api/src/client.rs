use std::path::PathBuf;

use hyper_util::{client::legacy::Client as HttpClient, rt::TokioExecutor};
use kube::client::ConfigExt as _;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::ApiResource;
use tower::ServiceBuilder;
use tower_http::{BoxError, trace::TraceLayer};

use crate::{ClientBuildError, JobApi, Result, Scope};

#[derive(Clone)]
pub struct Client {
    name: String,
    kube: kube::Client,
}

#[derive(Default)]
pub struct ClientBuilder {
    name: Option<String>,
    kubeconfig: Option<PathBuf>,
    context: Option<String>,
}

impl ClientBuilder {
    pub fn name(&mut self, name: impl ToString) -> &mut Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn kubeconfig(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.kubeconfig = Some(path.into());
        self
    }

    pub fn context(&mut self, context: impl ToString) -> &mut Self {
        self.context = Some(context.to_string());
        self
    }

    async fn load_config(&mut self) -> Result<kube::Config, ClientBuildError> {
        let options = KubeConfigOptions {
            context: self.context.take(),
            ..Default::default()
        };
        match self.kubeconfig.take() {
            Some(path) => {
                tracing::info!("Loading kubeconfig from {}", path.display());
                let kubeconfig = Kubeconfig::read_from(&path)?;
                Ok(kube::Config::from_custom_kubeconfig(kubeconfig, &options).await?)
            }
            None if options.context.is_some() => {
                Ok(kube::Config::from_kubeconfig(&options).await?)
            }
            None => Ok(kube::Config::infer().await?),
        }
    }

    pub async fn build(&mut self) -> Result<Client, ClientBuildError> {
        let name = self.name.take().unwrap_or_else(|| "kubeslurm".into());
        let config = self.load_config().await?;
        let kube_service = ServiceBuilder::new()
            .layer(config.base_uri_layer())
            .option_layer(config.auth_layer()?)
            .layer(TraceLayer::new_for_http())
            .map_err(BoxError::from)
            .service(
                HttpClient::builder(TokioExecutor::new()).build(config.rustls_https_connector()?),
            );
        let kube_client = kube::Client::new(kube_service, config.default_namespace);
        Ok(Client {
            name,
            kube: kube_client,
        })
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    #[inline]
    pub fn default_namespace(&self) -> &str {
        self.kube.default_namespace()
    }

    #[inline]
    pub fn jobs_in(&self, resource: ApiResource, scope: Scope) -> JobApi {
        JobApi::new(self.name.clone(), self.kube.clone(), resource, scope)
    }
}
