//! Component C: a generic "fetch -> typed callback -> result" wrapper with
//! requeue semantics, plus a generic create-or-update routine parameterized
//! by a per-kind diff predicate.

use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::time::Duration;

pub type ReconcileResult = Result<Action, crate::error::Error>;

/// Wraps `callback` with the standard fetch-then-dispatch pattern: fetch the
/// root object by name, return success with no requeue if it is gone
/// (open question #1: treat a `NotFound` root as "already deleted", not a
/// zero-valued object), otherwise invoke `callback` with a fresh copy.
pub async fn reconcile_root<K, Ctx, F, Fut>(
    api: &Api<K>,
    name: &str,
    ctx: Arc<Ctx>,
    callback: F,
) -> ReconcileResult
where
    K: Resource + Clone + Debug + DeserializeOwned,
    F: FnOnce(Arc<K>, Arc<Ctx>) -> Fut,
    Fut: Future<Output = ReconcileResult>,
{
    match api.get_opt(name).await {
        Ok(None) => Ok(Action::await_change()),
        Ok(Some(obj)) => callback(Arc::new(obj), ctx).await,
        Err(e) => Err(e.into()),
    }
}

/// Outcome of a single `create_or_update` call, reported for logging/testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Create,
    Update,
    None,
}

/// A per-kind diff predicate. Implementors own a specific, minimal set of
/// fields on `K`; `apply` mutates `existing` in place to reflect only those
/// fields, returning whether a change was made. Fields the predicate does
/// not mention are left untouched, so other controllers/defaulters can
/// coexist on the same object.
pub trait Diff<K> {
    fn apply(expected: &K, existing: &mut K) -> bool;
}

pub struct CreateOrUpdate<D>(PhantomData<D>);

impl<D> CreateOrUpdate<D> {
    /// Fetches `name`; creates it (with `owner` set as controller
    /// owner-reference) if absent, else applies `D::apply` and updates iff
    /// it reports a change.
    pub async fn run<K>(
        api: &Api<K>,
        name: &str,
        owner: &impl Resource<DynamicType = ()>,
        mut expected: K,
    ) -> kube::Result<Outcome>
    where
        K: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned,
        D: Diff<K>,
    {
        match api.get_opt(name).await? {
            None => {
                if let Some(owner_ref) = owner.controller_owner_ref(&()) {
                    expected
                        .meta_mut()
                        .owner_references
                        .get_or_insert_with(Vec::new)
                        .push(owner_ref);
                }
                expected.meta_mut().name = Some(name.to_string());
                api.create(&PostParams::default(), &expected).await?;
                Ok(Outcome::Create)
            }
            Some(mut existing) => {
                if D::apply(&expected, &mut existing) {
                    api.replace(name, &PostParams::default(), &existing).await?;
                    Ok(Outcome::Update)
                } else {
                    Ok(Outcome::None)
                }
            }
        }
    }
}

pub async fn patch_status<K, S>(api: &Api<K>, name: &str, status: &S) -> kube::Result<K>
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned,
    S: Serialize,
{
    let patch = Patch::Merge(serde_json::json!({ "status": status }));
    api.patch_status(name, &PatchParams::default(), &patch)
        .await
}

pub fn requeue_after(duration: Duration) -> Action {
    Action::requeue(duration)
}

pub fn no_requeue() -> Action {
    Action::await_change()
}
