use k8s_openapi::api::rbac::v1::{RoleRef, Subject};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A role binding whose subject list is synthesized from directory-group
/// membership. Produces a same-name, same-namespace `RoleBinding` whose
/// `roleRef` mirrors this object's and whose `subjects` track the resolver's
/// output for `subjects` below.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "console.example.com",
    version = "v1alpha1",
    kind = "DirectoryRoleBinding",
    namespaced,
    status = "DirectoryRoleBindingStatus",
    shortname = "drb"
)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryRoleBindingSpec {
    /// Declared subjects, possibly including directory-group references.
    pub subjects: Vec<Subject>,

    /// Mirrored verbatim onto the produced `RoleBinding.roleRef`.
    pub role_ref: RoleRef,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryRoleBindingStatus {
    /// Count of subjects in the last successfully resolved pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_subjects: Option<i64>,
}
