//! Component D: resolves a `DirectoryRoleBinding`'s declared subjects against
//! the directory and keeps a same-name `RoleBinding` converged to the result.
//! Re-polls on a fixed interval since directory membership can change without
//! any Kubernetes-side event to trigger a reconcile.

use crate::controller::Context;
use crate::crd::{DirectoryRoleBinding, DirectoryRoleBindingStatus};
use crate::diff::RoleBindingDiff;
use crate::error::Error;
use crate::harness::{self, CreateOrUpdate};
use crate::metrics::ControllerId;
use crate::resolver;
use crate::telemetry;

use futures::StreamExt;
use k8s_openapi::api::rbac::v1::RoleBinding;
use kube::api::{Api, ListParams, ObjectMeta};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::ResourceExt;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{field, instrument, warn, Span};

pub const CONTROLLER_ID: ControllerId = "directory-role-binding";

pub async fn run(ctx: Arc<Context>) {
    let drbs = Api::<DirectoryRoleBinding>::all(ctx.client.clone());
    if let Err(e) = drbs.list(&ListParams::default().limit(1)).await {
        tracing::error!("CRD is not queryable; {e:?}. Is the CRD installed?");
        std::process::exit(1);
    }
    let role_bindings = Api::<RoleBinding>::all(ctx.client.clone());

    ctx.metrics.reconcile.set_ready(CONTROLLER_ID);
    Controller::new(drbs, watcher::Config::default().any_semantic())
        .owns(role_bindings, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile_drb, error_policy, ctx)
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
}

pub(crate) fn error_policy(drb: Arc<DirectoryRoleBinding>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!(msg = "directory role binding reconciliation failed", name = %drb.name_any(), %error);
    ctx.metrics.reconcile.set_failure(CONTROLLER_ID, &drb, error);
    Action::requeue(Duration::from_secs(30))
}

#[instrument(skip(drb, ctx), fields(trace_id))]
pub async fn reconcile_drb(drb: Arc<DirectoryRoleBinding>, ctx: Arc<Context>) -> harness::ReconcileResult {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", field::display(&trace_id));
    let _timer = ctx.metrics.reconcile.count_and_measure(CONTROLLER_ID, &trace_id);
    ctx.diagnostics.write().await.last_event = chrono::Utc::now();

    let ns = drb
        .namespace()
        .ok_or_else(|| Error::MissingNamespace(drb.name_any()))?;
    let drb_api: Api<DirectoryRoleBinding> = Api::namespaced(ctx.client.clone(), &ns);
    harness::reconcile_root(&drb_api, &drb.name_any(), ctx, reconcile_inner).await
}

async fn reconcile_inner(drb: Arc<DirectoryRoleBinding>, ctx: Arc<Context>) -> harness::ReconcileResult {
    let ns = drb
        .namespace()
        .ok_or_else(|| Error::MissingNamespace(drb.name_any()))?;
    let client = ctx.client.clone();

    let drb_api: Api<DirectoryRoleBinding> = Api::namespaced(client.clone(), &ns);
    let rb_api: Api<RoleBinding> = Api::namespaced(client.clone(), &ns);

    let resolved = resolver::resolve(&drb.spec.subjects, &ctx.config.directory_group_kind, &ctx.directory).await?;

    let expected = RoleBinding {
        metadata: ObjectMeta {
            name: Some(drb.name_any()),
            namespace: Some(ns),
            labels: drb.metadata.labels.clone(),
            ..Default::default()
        },
        role_ref: drb.spec.role_ref.clone(),
        subjects: Some(resolved.clone()),
    };
    CreateOrUpdate::<RoleBindingDiff>::run(&rb_api, &drb.name_any(), drb.as_ref(), expected).await?;

    let status = DirectoryRoleBindingStatus {
        resolved_subjects: Some(resolved.len() as i64),
    };
    harness::patch_status(&drb_api, &drb.name_any(), &status).await?;

    Ok(harness::requeue_after(ctx.config.directory_refresh_interval))
}
