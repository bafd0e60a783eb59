use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A ledger of approver identities for one console. Approvers are granted a
/// per-authorisation `Role` permitting `patch`/`update` on this resource and
/// add themselves to `authorisations`.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "console.example.com",
    version = "v1alpha1",
    kind = "ConsoleAuthorisation",
    namespaced,
    shortname = "cauth"
)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleAuthorisationSpec {
    /// Name of the console this authorisation record belongs to.
    pub console_ref: String,

    /// Current set of approver subject names. Operator-created empty;
    /// mutated by approvers via `patch`/`update`.
    #[serde(default)]
    pub authorisations: Vec<String>,
}
