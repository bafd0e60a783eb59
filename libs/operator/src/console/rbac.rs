//! Builds the `Role`/`DirectoryRoleBinding` pairs the console reconciler
//! provisions for authorisation approval (spec §4.E step 7) and for
//! per-pod attach access (spec §4.E step 12, §6).

use crate::crd::{Console, ConsoleAuthorisation, DirectoryRoleBinding, DirectoryRoleBindingSpec};

use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleRef, Subject};
use kube::api::ObjectMeta;
use kube::ResourceExt;

pub fn authorisation_role_name(console: &Console) -> String {
    format!("{}-authorisation", console.name_any())
}

/// Grants `get`, `patch`, `update` on the named `ConsoleAuthorisation`.
pub fn build_authorisation_role(console: &Console, auth: &ConsoleAuthorisation) -> Role {
    Role {
        metadata: ObjectMeta {
            name: Some(authorisation_role_name(console)),
            namespace: console.metadata.namespace.clone(),
            labels: console.metadata.labels.clone(),
            ..Default::default()
        },
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec!["console.example.com".to_string()]),
            resources: Some(vec!["consoleauthorisations".to_string()]),
            resource_names: Some(vec![auth.name_any()]),
            verbs: vec!["get".to_string(), "patch".to_string(), "update".to_string()],
            ..Default::default()
        }]),
    }
}

pub fn build_authorisation_drb(
    console: &Console,
    role_name: &str,
    authorisers: &[Subject],
) -> DirectoryRoleBinding {
    DirectoryRoleBinding::new(
        role_name,
        DirectoryRoleBindingSpec {
            subjects: authorisers.to_vec(),
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "Role".to_string(),
                name: role_name.to_string(),
            },
        },
    )
}

pub fn per_pod_role_name(console: &Console) -> String {
    format!("{}-pod", console.name_any())
}

/// Grants `create` on `pods/exec`/`pods/attach`, `get` on `pods/log`, and
/// `get`/`delete` on `pods`, all restricted to the single named pod.
pub fn build_per_pod_role(console: &Console, pod_name: &str) -> Role {
    Role {
        metadata: ObjectMeta {
            name: Some(per_pod_role_name(console)),
            namespace: console.metadata.namespace.clone(),
            labels: console.metadata.labels.clone(),
            ..Default::default()
        },
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(vec!["".to_string()]),
                resources: Some(vec!["pods/exec".to_string(), "pods/attach".to_string()]),
                resource_names: Some(vec![pod_name.to_string()]),
                verbs: vec!["create".to_string()],
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec!["".to_string()]),
                resources: Some(vec!["pods/log".to_string()]),
                resource_names: Some(vec![pod_name.to_string()]),
                verbs: vec!["get".to_string()],
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec!["".to_string()]),
                resources: Some(vec!["pods".to_string()]),
                resource_names: Some(vec![pod_name.to_string()]),
                verbs: vec!["get".to_string(), "delete".to_string()],
                ..Default::default()
            },
        ]),
    }
}

pub fn build_attach_drb(
    console: &Console,
    role_name: &str,
    additional_attach_subjects: &[Subject],
) -> DirectoryRoleBinding {
    let mut subjects = vec![Subject {
        kind: "User".to_string(),
        name: console.spec.user.clone(),
        api_group: Some("rbac.authorization.k8s.io".to_string()),
        namespace: None,
    }];
    subjects.extend(additional_attach_subjects.iter().cloned());

    DirectoryRoleBinding::new(
        role_name,
        DirectoryRoleBindingSpec {
            subjects,
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "Role".to_string(),
                name: role_name.to_string(),
            },
        },
    )
}
