use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use kubeslurm::{Scope, SlurmJob, kube::core::ApiResource};
use serde::{Deserialize, Serialize};
use url::Url;

const ENV_PREFIX: &str = "KUBESLURM";

fn default_manager_name() -> String {
    "kubeslurm-controller".to_string()
}

fn default_crd_group() -> String {
    "mhtosta.engineering".to_string()
}

fn default_crd_version() -> String {
    "v1alpha1".to_string()
}

fn default_crd_kind() -> String {
    "SlurmJob".to_string()
}

fn default_crd_plural() -> String {
    "slurmjobs".to_string()
}

fn default_event_listener_cooldown_secs() -> u64 {
    10
}

fn default_supervisor_poll_secs() -> u64 {
    5
}

fn default_slurmrestd_user() -> String {
    "ubuntu".to_string()
}

fn default_cache_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".kubeslurm")
        .join("cache")
}

fn default_slurmrestd_endpoint() -> Url {
    Url::parse("http://localhost:6820").expect("static url")
}

fn default_slurmrestd_timeout_secs() -> Option<f64> {
    Some(10.0)
}

fn default_slurmrestd_exp_time_secs() -> u64 {
    24 * 60 * 60
}

fn default_reconciliation_interval_secs() -> u64 {
    60
}

fn default_health_check_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
}

fn default_health_check_port() -> u16 {
    8080
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_manager_name")]
    pub name: String,
    #[serde(default = "default_crd_group")]
    pub crd_group: String,
    #[serde(default = "default_crd_version")]
    pub crd_version: String,
    #[serde(default = "default_crd_kind")]
    pub crd_kind: String,
    #[serde(default = "default_crd_plural")]
    pub crd_plural: String,
    pub namespace: Option<String>,
    #[serde(default)]
    pub all_namespaces: bool,
    pub kube_config: Option<PathBuf>,
    pub kube_context: Option<String>,
    #[serde(default = "default_event_listener_cooldown_secs")]
    pub event_listener_cooldown_secs: u64,
    #[serde(default = "default_supervisor_poll_secs")]
    pub supervisor_poll_secs: u64,
    #[serde(default = "default_slurmrestd_user")]
    pub slurmrestd_user: String,
    pub slurmrestd_jwt_key_path: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_slurmrestd_endpoint")]
    pub slurmrestd_endpoint: Url,
    #[serde(default = "default_slurmrestd_timeout_secs")]
    pub slurmrestd_timeout_secs: Option<f64>,
    #[serde(default = "default_slurmrestd_exp_time_secs")]
    pub slurmrestd_exp_time_secs: u64,
    #[serde(default = "default_reconciliation_interval_secs")]
    pub reconciliation_interval_secs: u64,
    #[serde(default = "default_health_check_host")]
    pub health_check_host: IpAddr,
    #[serde(default = "default_health_check_port")]
    pub health_check_port: u16,
}

impl Config {
    pub fn load() -> Result<Config, ConfigError> {
        Self::from_env(None)
    }

    /// Reads the configuration from `KUBESLURM_*` variables, taken from
    /// `vars` when given instead of the process environment.
    pub fn from_env(vars: Option<HashMap<String, String>>) -> Result<Config, ConfigError> {
        let config: Config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(vars),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reconciliation_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "reconciliation_interval_secs must be greater than 0",
            ));
        }
        if self
            .slurmrestd_timeout_secs
            .is_some_and(|secs| !secs.is_finite() || secs <= 0.0)
        {
            return Err(ConfigError::Invalid(
                "slurmrestd_timeout_secs must be a positive number of seconds",
            ));
        }
        Ok(())
    }

    pub fn api_resource(&self) -> ApiResource {
        SlurmJob::api_resource_with(
            &self.crd_group,
            &self.crd_version,
            &self.crd_kind,
            &self.crd_plural,
        )
    }

    /// The observation scope; `None` namespace means the client's default.
    pub fn scope(&self, default_namespace: &str) -> Scope {
        if self.all_namespaces {
            Scope::Cluster
        } else {
            Scope::Namespace(
                self.namespace
                    .clone()
                    .unwrap_or_else(|| default_namespace.to_string()),
            )
        }
    }

    pub fn event_listener_cooldown(&self) -> Duration {
        Duration::from_secs(self.event_listener_cooldown_secs)
    }

    pub fn supervisor_poll(&self) -> Duration {
        Duration::from_secs(self.supervisor_poll_secs)
    }

    pub fn slurmrestd_timeout(&self) -> Option<Duration> {
        self.slurmrestd_timeout_secs.map(Duration::from_secs_f64)
    }

    pub fn token_lifetime(&self) -> Duration {
        Duration::from_secs(self.slurmrestd_exp_time_secs)
    }

    pub fn reconciliation_interval(&self) -> Duration {
        Duration::from_secs(self.reconciliation_interval_secs)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (format!("{ENV_PREFIX}_{key}"), value.to_string()))
            .collect()
    }

    pub(crate) fn test_config(key_path: PathBuf, cache_dir: PathBuf, endpoint: &str) -> Config {
        Config {
            slurmrestd_jwt_key_path: key_path,
            cache_dir,
            slurmrestd_endpoint: Url::parse(endpoint).unwrap(),
            ..Config::from_env(Some(vars(&[("SLURMRESTD_JWT_KEY_PATH", "/dev/null")]))).unwrap()
        }
    }

    #[test]
    fn test_defaults() {
        let config =
            Config::from_env(Some(vars(&[("SLURMRESTD_JWT_KEY_PATH", "/etc/slurm/jwt.key")])))
                .unwrap();
        assert_eq!(config.crd_group, "mhtosta.engineering");
        assert_eq!(config.crd_plural, "slurmjobs");
        assert_eq!(config.reconciliation_interval(), Duration::from_secs(60));
        assert_eq!(config.event_listener_cooldown(), Duration::from_secs(10));
        assert_eq!(config.slurmrestd_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.token_lifetime(), Duration::from_secs(86400));
        assert_eq!(config.slurmrestd_user, "ubuntu");
        assert_eq!(config.health_check_port, 8080);
        assert_eq!(config.scope("default"), Scope::Namespace("default".into()));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_env(Some(vars(&[
            ("SLURMRESTD_JWT_KEY_PATH", "/etc/slurm/jwt.key"),
            ("NAMESPACE", "hpc"),
            ("RECONCILIATION_INTERVAL_SECS", "15"),
            ("SLURMRESTD_ENDPOINT", "http://slurmrestd:6820"),
            ("HEALTH_CHECK_PORT", "9000"),
        ])))
        .unwrap();
        assert_eq!(config.scope("default"), Scope::Namespace("hpc".into()));
        assert_eq!(config.reconciliation_interval(), Duration::from_secs(15));
        assert_eq!(config.slurmrestd_endpoint.as_str(), "http://slurmrestd:6820/");
        assert_eq!(config.health_check_port, 9000);

        let cluster = Config::from_env(Some(vars(&[
            ("SLURMRESTD_JWT_KEY_PATH", "/etc/slurm/jwt.key"),
            ("ALL_NAMESPACES", "true"),
        ])))
        .unwrap();
        assert_eq!(cluster.scope("default"), Scope::Cluster);
    }

    #[test]
    fn test_rejects_zero_interval() {
        let err = Config::from_env(Some(vars(&[
            ("SLURMRESTD_JWT_KEY_PATH", "/etc/slurm/jwt.key"),
            ("RECONCILIATION_INTERVAL_SECS", "0"),
        ])))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_requires_key_path() {
        assert!(Config::from_env(Some(HashMap::new())).is_err());
    }
}
