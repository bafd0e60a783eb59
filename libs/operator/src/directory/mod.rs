//! Component A: the abstract directory-provider contract.
//!
//! The concrete backend (e.g. a Google Workspace directory) is out of scope
//! for this operator; only the trait the rest of the reconciler programs
//! against is specified here.

use async_trait::async_trait;
use std::sync::Arc;

/// Failure modes a directory provider can report. The resolver and the DRB
/// reconciler treat everything but `NotFound` as retryable.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("group not found: {0}")]
    NotFound(String),

    /// Retryable: a timeout, rate limit, or other transient upstream failure.
    #[error("transient upstream error resolving {group}: {message}")]
    TransientUpstream { group: String, message: String },

    /// Non-retryable upstream failure (e.g. malformed credentials). Still
    /// surfaced for backoff-retry by the reconciler, per spec, but callers
    /// that want to raise an operator event against the DRB can match on it.
    #[error("permanent upstream error resolving {group}: {message}")]
    PermanentUpstream { group: String, message: String },
}

impl DirectoryError {
    pub fn group(&self) -> &str {
        match self {
            DirectoryError::NotFound(g) => g,
            DirectoryError::TransientUpstream { group, .. } => group,
            DirectoryError::PermanentUpstream { group, .. } => group,
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, DirectoryError::NotFound(_))
    }
}

/// Resolves a group identifier to its ordered, deduplicated member list.
#[async_trait]
pub trait DirectoryProvider: Send + Sync {
    async fn resolve_group(&self, group: &str) -> Result<Vec<String>, DirectoryError>;
}

pub type SharedDirectoryProvider = Arc<dyn DirectoryProvider>;

/// Reads a YAML mapping of group name to member list from disk on every
/// call, so an operator of this file can push membership changes without a
/// restart. Stands in for a real directory backend (Google Workspace, LDAP,
/// ...), which is left unimplemented by design: only the trait above is
/// specified, and wiring a vendor-specific client is a deployment concern.
pub struct FileDirectoryProvider {
    path: std::path::PathBuf,
}

impl FileDirectoryProvider {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DirectoryProvider for FileDirectoryProvider {
    async fn resolve_group(&self, group: &str) -> Result<Vec<String>, DirectoryError> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            DirectoryError::TransientUpstream {
                group: group.to_string(),
                message: e.to_string(),
            }
        })?;
        let groups: std::collections::BTreeMap<String, Vec<String>> = serde_yaml::from_str(&contents)
            .map_err(|e| DirectoryError::PermanentUpstream {
                group: group.to_string(),
                message: e.to_string(),
            })?;
        groups
            .get(group)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(group.to_string()))
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::collections::BTreeMap;
    use tokio::sync::RwLock;

    /// In-memory directory double used by unit tests for the resolver and
    /// the DRB reconciler. Not a production backend.
    #[derive(Default)]
    pub struct StaticDirectoryProvider {
        groups: RwLock<BTreeMap<String, Vec<String>>>,
    }

    impl StaticDirectoryProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn set(&self, group: &str, members: Vec<String>) {
            self.groups
                .write()
                .await
                .insert(group.to_string(), members);
        }
    }

    #[async_trait]
    impl DirectoryProvider for StaticDirectoryProvider {
        async fn resolve_group(&self, group: &str) -> Result<Vec<String>, DirectoryError> {
            self.groups
                .read()
                .await
                .get(group)
                .cloned()
                .ok_or_else(|| DirectoryError::NotFound(group.to_string()))
        }
    }
}
