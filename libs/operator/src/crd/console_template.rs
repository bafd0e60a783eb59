use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::api::rbac::v1::Subject;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Admin-authored policy defining the container, defaults, and authorisation
/// rules for consoles spawned against a given workload.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "console.example.com",
    version = "v1alpha1",
    kind = "ConsoleTemplate",
    namespaced,
    shortname = "ctpl"
)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleTemplateSpec {
    /// A pod spec with exactly one container. Extra containers are reported
    /// invalid but are not treated as fatal.
    pub pod_template: PodTemplateSpec,

    /// Ordered token list used when a `Console` omits a command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_command: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_ttl_seconds_before_running: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_ttl_seconds_after_finished: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_timeout_seconds: Option<i64>,

    /// Upper bound for any console's `timeout_seconds`.
    pub max_timeout_seconds: i64,

    /// Extra subjects always granted attach rights on every console spawned
    /// from this template, in addition to the requesting user.
    #[serde(default)]
    pub additional_attach_subjects: Vec<Subject>,

    /// Ordered authorisation rules, matched first-match against the
    /// console's resolved command token sequence.
    #[serde(default)]
    pub authorisation_rules: Vec<AuthorisationRule>,

    /// Fallback rule applied when no entry in `authorisation_rules` matches.
    /// When absent, a console whose command matches nothing is unauthorised
    /// by default only if `authorisation_rules` is non-empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_authorisation_rule: Option<AuthorisationRule>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorisationRule {
    /// Matches when the console's resolved command starts with these tokens.
    /// An empty pattern matches any command.
    #[serde(default)]
    pub match_command_pattern: Vec<String>,

    /// Minimum number of distinct approvers required.
    pub authorisers_required: i32,

    /// Subjects permitted to approve consoles matching this rule.
    pub authorisation_subjects: Vec<Subject>,
}

impl AuthorisationRule {
    pub fn matches(&self, command: &[String]) -> bool {
        command.len() >= self.match_command_pattern.len()
            && command
                .iter()
                .zip(self.match_command_pattern.iter())
                .all(|(a, b)| a == b)
    }
}
