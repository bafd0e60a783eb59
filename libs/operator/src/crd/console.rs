use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A user-requested, time-boxed interactive session materialized as a single pod.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "console.example.com",
    version = "v1alpha1",
    kind = "Console",
    namespaced,
    status = "ConsoleStatus",
    shortname = "console"
)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleSpec {
    /// Name of the `ConsoleTemplate` in the same namespace this console is spawned from.
    pub console_template_ref: String,

    /// The requester's identity, used for audit events and attach authorisation.
    pub user: String,

    /// Command override; when omitted, the template's `default_command` is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,

    /// Free-text audit field describing why the session was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Session duration in seconds; clamped to the template's `max_timeout_seconds`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i64>,

    /// Overrides the template's `default_ttl_before_running`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds_before_running: Option<i64>,

    /// Overrides the template's `default_ttl_after_finished`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds_after_finished: Option<i64>,

    /// When false (the default), the container is configured for interactive attach.
    #[serde(default)]
    pub noninteractive: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum ConsolePhase {
    #[default]
    PendingAuthorisation,
    Pending,
    Running,
    Stopped,
    Destroyed,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ConsolePhase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_time: Option<Time>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<Time>,

    /// Convenience flag for external readiness probes: true iff phase is `Running`.
    #[serde(default)]
    pub ready: bool,
}

impl Console {
    pub fn job_name(&self) -> String {
        format!("{}-console", crate::labels::truncate(&self.name_any(), 55))
    }

    pub fn authorisation_name(&self) -> String {
        format!("{}-authorisation", self.name_any())
    }
}
