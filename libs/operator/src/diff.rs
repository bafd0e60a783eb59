//! Kind-specialized diff predicates for `harness::CreateOrUpdate`. Each
//! predicate names the exact, minimal set of fields the operator owns on a
//! given kind; everything else on an existing object is left untouched.

use crate::crd::DirectoryRoleBinding;
use crate::harness::Diff;

use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding};

use std::collections::HashSet;

/// Owns `roleRef` and `subjects` on a `RoleBinding` produced by a
/// `DirectoryRoleBinding`. `subjects` converges via symmetric difference so
/// that an unchanged resolver result produces no API call.
pub struct RoleBindingDiff;

impl Diff<RoleBinding> for RoleBindingDiff {
    fn apply(expected: &RoleBinding, existing: &mut RoleBinding) -> bool {
        let mut changed = false;

        if existing.role_ref.name != expected.role_ref.name
            || existing.role_ref.kind != expected.role_ref.kind
            || existing.role_ref.api_group != expected.role_ref.api_group
        {
            existing.role_ref = expected.role_ref.clone();
            changed = true;
        }

        let current: HashSet<_> = existing
            .subjects
            .iter()
            .flatten()
            .map(|s| (s.kind.clone(), s.name.clone()))
            .collect();
        let wanted: HashSet<_> = expected
            .subjects
            .iter()
            .flatten()
            .map(|s| (s.kind.clone(), s.name.clone()))
            .collect();
        if current != wanted {
            existing.subjects = expected.subjects.clone();
            changed = true;
        }

        if existing.metadata.labels != expected.metadata.labels {
            existing.metadata.labels = expected.metadata.labels.clone();
            changed = true;
        }

        changed
    }
}

/// Owns the job's pod template command/args, labels, and
/// `active_deadline_seconds`. A job's spec is otherwise immutable once
/// created by Kubernetes, so the predicate never mutates `completions`,
/// `parallelism`, or `backoff_limit` after creation.
pub struct JobDiff;

impl Diff<Job> for JobDiff {
    fn apply(expected: &Job, existing: &mut Job) -> bool {
        let mut changed = false;

        if existing.metadata.labels != expected.metadata.labels {
            existing.metadata.labels = expected.metadata.labels.clone();
            changed = true;
        }

        let existing_deadline = existing.spec.as_ref().and_then(|s| s.active_deadline_seconds);
        let expected_deadline = expected.spec.as_ref().and_then(|s| s.active_deadline_seconds);
        if existing_deadline != expected_deadline {
            if let Some(spec) = existing.spec.as_mut() {
                spec.active_deadline_seconds = expected_deadline;
            }
            changed = true;
        }

        changed
    }
}

/// Owns `rules` on the per-pod attach `Role` and the authorisation `Role`.
pub struct RoleDiff;

impl Diff<Role> for RoleDiff {
    fn apply(expected: &Role, existing: &mut Role) -> bool {
        let mut changed = false;
        if !policy_rules_eq(existing.rules.as_deref(), expected.rules.as_deref()) {
            existing.rules = expected.rules.clone();
            changed = true;
        }
        if existing.metadata.labels != expected.metadata.labels {
            existing.metadata.labels = expected.metadata.labels.clone();
            changed = true;
        }
        changed
    }
}

fn policy_rules_eq(a: Option<&[PolicyRule]>, b: Option<&[PolicyRule]>) -> bool {
    a.unwrap_or_default() == b.unwrap_or_default()
}

/// Owns `spec.subjects`/`spec.roleRef` and labels on a `DirectoryRoleBinding`
/// the console reconciler declares (authorisation approval, per-pod attach).
/// Unlike `RoleBindingDiff`, the declared subject list here is fully
/// recomputed every pass from the console/template, so ordinary equality
/// (not symmetric difference) is the right comparison.
pub struct DirectoryRoleBindingSpecDiff;

impl Diff<DirectoryRoleBinding> for DirectoryRoleBindingSpecDiff {
    fn apply(expected: &DirectoryRoleBinding, existing: &mut DirectoryRoleBinding) -> bool {
        let mut changed = false;
        if existing.spec != expected.spec {
            existing.spec = expected.spec.clone();
            changed = true;
        }
        if existing.metadata.labels != expected.metadata.labels {
            existing.metadata.labels = expected.metadata.labels.clone();
            changed = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::rbac::v1::{RoleRef, Subject};
    use kube::api::ObjectMeta;

    fn subject(name: &str) -> Subject {
        Subject {
            kind: "User".to_string(),
            name: name.to_string(),
            api_group: Some("rbac.authorization.k8s.io".to_string()),
            namespace: None,
        }
    }

    fn role_binding(subjects: Vec<Subject>) -> RoleBinding {
        RoleBinding {
            metadata: ObjectMeta::default(),
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "Role".to_string(),
                name: "r".to_string(),
            },
            subjects: Some(subjects),
        }
    }

    #[test]
    fn no_change_when_subjects_match_regardless_of_order() {
        let expected = role_binding(vec![subject("a"), subject("b")]);
        let mut existing = role_binding(vec![subject("b"), subject("a")]);
        assert!(!RoleBindingDiff::apply(&expected, &mut existing));
    }

    #[test]
    fn update_when_subjects_differ() {
        let expected = role_binding(vec![subject("a"), subject("c")]);
        let mut existing = role_binding(vec![subject("a"), subject("b")]);
        assert!(RoleBindingDiff::apply(&expected, &mut existing));
        assert_eq!(existing.subjects, Some(vec![subject("a"), subject("c")]));
    }
}
