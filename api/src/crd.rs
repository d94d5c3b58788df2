use std::collections::BTreeMap;

use kube::CustomResource;
use kube::core::{ApiResource, GroupVersionKind};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{JobStatus, Result};

const SCRIPT_FIELD: &str = "script";
const USER_ENVIRONMENT_FIELD: &str = "get_user_environment";

// Every optional property is an `Option<Option<T>>`: the outer layer records
// whether the key was written in the manifest at all, the inner one whether
// it was written as `null`. Only written keys take part in submissions and
// diffs.
macro_rules! job_properties {
    ($($field:ident: $ty:ty),* $(,)?) => {
        #[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
        #[kube(
            group = "mhtosta.engineering",
            version = "v1alpha1",
            kind = "SlurmJob",
            plural = "slurmjobs",
            status = "JobStatus",
            shortname = "sj",
            namespaced,
            printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
            printcolumn = r#"{"name":"Slurm Job","type":"integer","jsonPath":".status.slurmJobId"}"#,
            printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#,
        )]
        pub struct JobProperties {
            pub script: String,
            $(
                #[serde(
                    default,
                    skip_serializing_if = "Option::is_none",
                    deserialize_with = "crate::nullable::deserialize"
                )]
                pub $field: Option<Option<$ty>>,
            )*
        }

        impl JobProperties {
            pub const OPTIONAL_FIELDS: &'static [&'static str] = &[$(stringify!($field)),*];
        }
    };
}

job_properties! {
    account: String,
    cpus_per_task: i64,
    name: String,
    partition: String,
    admin_comment: String,
    allocation_node_list: String,
    allocation_node_port: i64,
    argv: Vec<String>,
    batch_features: String,
    begin_time: String,
    flags: Vec<String>,
    burst_buffer: String,
    clusters: String,
    cluster_constraint: String,
    comment: String,
    contiguous: bool,
    container: String,
    container_id: String,
    core_specification: i64,
    thread_specification: i64,
    cpu_binding: String,
    cpu_binding_flags: Vec<String>,
    cpu_frequency: String,
    cpus_per_tres: String,
    crontab: String,
    deadline: i64,
    delay_boot: i64,
    dependency: String,
    end_time: i64,
    environment: BTreeMap<String, String>,
    excluded_nodes: Vec<String>,
    extra: String,
    constraints: String,
    group_id: String,
    hetjob_group: i64,
    immediate: bool,
    job_id: i64,
    kill_on_node_fail: bool,
    licenses: String,
    mail_type: Vec<String>,
    mcs_label: String,
    memory_binding: String,
    memory_binding_type: Vec<String>,
    memory_per_tres: String,
    network: String,
    nice: i64,
    tasks: i64,
    open_mode: Vec<String>,
    reserve_ports: i64,
    overcommit: bool,
    distribution_plane_size: i64,
    power_flags: Vec<String>,
    prefer: String,
    hold: bool,
    priority: i64,
    profile: Vec<String>,
    qos: String,
    reboot: bool,
    requeue: bool,
    reservation: String,
    shared: Vec<String>,
    exclusive: Vec<String>,
    oversubscribe: bool,
    site_factor: i64,
    spank_environment: Vec<String>,
    distribution: String,
    time_limit: i64,
    time_minimum: i64,
    tres_bind: String,
    tres_freq: String,
    tres_per_job: String,
    tres_per_node: String,
    tres_per_socket: String,
    tres_per_task: String,
    user_id: String,
    wait_all_nodes: bool,
    kill_warning_flags: Vec<String>,
    kill_warning_signal: String,
    kill_warning_delay: i64,
    current_working_directory: String,
    minimum_cpus: i64,
    maximum_cpus: i64,
    nodes: Vec<i64>,
    minimum_nodes: i64,
    maximum_nodes: i64,
    minimum_boards_per_node: i64,
    minimum_sockets_per_board: i64,
    sockets_per_node: i64,
    threads_per_core: i64,
    tasks_per_node: i64,
    tasks_per_socket: i64,
    tasks_per_core: i64,
    tasks_per_board: i64,
    ntasks_per_tres: i64,
    minimum_cpus_per_node: i64,
    memory_per_cpu: i64,
    memory_per_node: i64,
    temporary_disk_per_node: i64,
    selinux_context: String,
    required_switches: i64,
    standard_error: String,
    standard_input: String,
    standard_output: String,
    wait_for_switch: i64,
    wckey: String,
    x11: Vec<String>,
    x11_magic_cookie: String,
    x11_target_host: String,
    x11_target_port: i64,
    get_user_environment: i64,
}

impl JobProperties {
    /// Whether the manifest supplies an environment for the job.
    pub fn has_environment(&self) -> bool {
        matches!(self.environment, Some(Some(_)))
    }

    /// The job properties sent to slurmrestd: every explicitly written field
    /// except the script, which travels separately.
    ///
    /// Without an explicit environment Slurm refuses the job (error 2127), so
    /// `get_user_environment` is switched on unless the manifest set it.
    pub fn job_payload(&self) -> Result<Map<String, Value>> {
        let mut payload = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            other => return Err(crate::Error::expected_json_type("object", &other)),
        };
        payload.remove(SCRIPT_FIELD);
        if !self.has_environment() && self.get_user_environment.is_none() {
            payload.insert(USER_ENVIRONMENT_FIELD.to_string(), Value::from(1));
        }
        Ok(payload)
    }
}

impl SlurmJob {
    /// The job resource as served under a configured group, version and
    /// plural, which may differ from the ones compiled into the CRD.
    pub fn api_resource_with(group: &str, version: &str, kind: &str, plural: &str) -> ApiResource {
        ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(group, version, kind), plural)
    }
}
