//! Component B: expands a heterogeneous subject list (users, groups, and a
//! configurable "directory-group" kind) into a flat, deduplicated `User`
//! subject list.

use crate::directory::{DirectoryError, SharedDirectoryProvider};

use k8s_openapi::api::rbac::v1::Subject;

pub const KIND_USER: &str = "User";
pub const KIND_GROUP: &str = "Group";

/// Expands `subjects`, replacing any subject whose `kind` equals
/// `directory_group_kind` with the `User` subjects the directory reports for
/// its `name`. Order is preserved; duplicates by `(kind, name)` are dropped,
/// first occurrence wins.
pub async fn resolve(
    subjects: &[Subject],
    directory_group_kind: &str,
    provider: &SharedDirectoryProvider,
) -> Result<Vec<Subject>, DirectoryError> {
    let mut resolved = Vec::new();
    for subject in subjects {
        if subject.kind == directory_group_kind {
            let members = provider.resolve_group(&subject.name).await?;
            resolved.extend(members.into_iter().map(|name| Subject {
                kind: KIND_USER.to_string(),
                name,
                api_group: Some("rbac.authorization.k8s.io".to_string()),
                namespace: None,
            }));
        } else {
            resolved.push(subject.clone());
        }
    }
    Ok(dedup(resolved))
}

fn dedup(subjects: Vec<Subject>) -> Vec<Subject> {
    let mut seen = std::collections::HashSet::new();
    subjects
        .into_iter()
        .filter(|s| seen.insert((s.kind.clone(), s.name.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::test_support::StaticDirectoryProvider;
    use std::sync::Arc;

    fn user(name: &str) -> Subject {
        Subject {
            kind: KIND_USER.to_string(),
            name: name.to_string(),
            api_group: Some("rbac.authorization.k8s.io".to_string()),
            namespace: None,
        }
    }

    fn group(name: &str) -> Subject {
        Subject {
            kind: KIND_GROUP.to_string(),
            name: name.to_string(),
            api_group: Some("rbac.authorization.k8s.io".to_string()),
            namespace: None,
        }
    }

    fn directory_group(name: &str) -> Subject {
        Subject {
            kind: "GoogleGroup".to_string(),
            name: name.to_string(),
            api_group: None,
            namespace: None,
        }
    }

    #[tokio::test]
    async fn passthrough_for_user_and_group() {
        let provider: SharedDirectoryProvider = Arc::new(StaticDirectoryProvider::new());
        let subjects = vec![user("alice"), group("sre")];
        let got = resolve(&subjects, "GoogleGroup", &provider).await.unwrap();
        assert_eq!(got, subjects);
    }

    #[tokio::test]
    async fn expands_directory_group_preserving_provider_order() {
        let provider = StaticDirectoryProvider::new();
        provider
            .set("eng", vec!["a".into(), "b".into(), "c".into()])
            .await;
        let provider: SharedDirectoryProvider = Arc::new(provider);

        let subjects = vec![directory_group("eng")];
        let got = resolve(&subjects, "GoogleGroup", &provider).await.unwrap();
        assert_eq!(got, vec![user("a"), user("b"), user("c")]);
    }

    #[tokio::test]
    async fn dedups_first_occurrence_wins() {
        let provider = StaticDirectoryProvider::new();
        provider.set("eng", vec!["a".into(), "b".into()]).await;
        let provider: SharedDirectoryProvider = Arc::new(provider);

        let subjects = vec![user("a"), directory_group("eng")];
        let got = resolve(&subjects, "GoogleGroup", &provider).await.unwrap();
        assert_eq!(got, vec![user("a"), user("b")]);
    }

    #[tokio::test]
    async fn not_found_group_surfaces_error() {
        let provider: SharedDirectoryProvider = Arc::new(StaticDirectoryProvider::new());
        let subjects = vec![directory_group("ghosts")];
        let err = resolve(&subjects, "GoogleGroup", &provider)
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::NotFound(g) if g == "ghosts"));
    }
}
