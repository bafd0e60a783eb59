//! Component E: the console lifecycle reconciler. Per-pass steps follow the
//! numbering used throughout this module's doc comments.

use crate::console::{audit, job as job_builder, rbac, status};
use crate::controller::Context;
use crate::crd::{
    AuthorisationRule, Console, ConsoleAuthorisation, ConsoleAuthorisationSpec, ConsolePhase,
    ConsoleTemplate,
};
use crate::diff::{DirectoryRoleBindingSpecDiff, JobDiff, RoleDiff};
use crate::error::{Error, Result};
use crate::harness::{self, CreateOrUpdate};
use crate::metrics::ControllerId;
use crate::telemetry;

use chrono::Utc;
use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::rbac::v1::Role;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams, PropagationPolicy};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::events::{Event, EventType, Recorder};
use kube::runtime::watcher;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{field, instrument, warn, Span};

pub const CONTROLLER_ID: ControllerId = "console";

pub async fn run(ctx: Arc<Context>) {
    let consoles = Api::<Console>::all(ctx.client.clone());
    if let Err(e) = consoles.list(&ListParams::default().limit(1)).await {
        tracing::error!("CRD is not queryable; {e:?}. Is the CRD installed?");
        std::process::exit(1);
    }
    let jobs = Api::<Job>::all(ctx.client.clone());
    let roles = Api::<Role>::all(ctx.client.clone());
    let drbs = Api::<crate::crd::DirectoryRoleBinding>::all(ctx.client.clone());
    let auths = Api::<ConsoleAuthorisation>::all(ctx.client.clone());

    ctx.metrics.reconcile.set_ready(CONTROLLER_ID);
    Controller::new(consoles, watcher::Config::default().any_semantic())
        .owns(jobs, watcher::Config::default())
        .owns(roles, watcher::Config::default())
        .owns(drbs, watcher::Config::default())
        .owns(auths, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile_console, error_policy, ctx)
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
}

pub(crate) fn error_policy(console: Arc<Console>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!(msg = "console reconciliation failed", name = %console.name_any(), %error);
    ctx.metrics.reconcile.set_failure(CONTROLLER_ID, &console, error);
    Action::requeue(Duration::from_secs(30))
}

/// Re-fetches the console fresh before dispatching, per open question #1:
/// a root that has gone `NotFound` between watch event and this pass is
/// treated as already deleted, not reconciled against a stale copy.
#[instrument(skip(console, ctx), fields(trace_id))]
pub async fn reconcile_console(console: Arc<Console>, ctx: Arc<Context>) -> Result<Action, Error> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", field::display(&trace_id));
    let _timer = ctx.metrics.reconcile.count_and_measure(CONTROLLER_ID, &trace_id);
    ctx.diagnostics.write().await.last_event = Utc::now();

    let ns = console
        .namespace()
        .ok_or_else(|| Error::MissingNamespace(console.name_any()))?;
    let console_api: Api<Console> = Api::namespaced(ctx.client.clone(), &ns);
    harness::reconcile_root(&console_api, &console.name_any(), ctx, reconcile_inner).await
}

struct Gate {
    is_authorised: bool,
    rule_name: Option<String>,
    approvers: Vec<String>,
}

async fn reconcile_inner(console: Arc<Console>, ctx: Arc<Context>) -> harness::ReconcileResult {
    let ns = console
        .namespace()
        .ok_or_else(|| Error::MissingNamespace(console.name_any()))?;
    let client = ctx.client.clone();

    let console_api: Api<Console> = Api::namespaced(client.clone(), &ns);
    let template_api: Api<ConsoleTemplate> = Api::namespaced(client.clone(), &ns);
    let auth_api: Api<ConsoleAuthorisation> = Api::namespaced(client.clone(), &ns);
    let role_api: Api<Role> = Api::namespaced(client.clone(), &ns);
    let drb_api: Api<crate::crd::DirectoryRoleBinding> = Api::namespaced(client.clone(), &ns);
    let job_api: Api<Job> = Api::namespaced(client.clone(), &ns);
    let pod_api: Api<Pod> = Api::namespaced(client.clone(), &ns);

    // 1. Load template.
    let template = template_api
        .get_opt(&console.spec.console_template_ref)
        .await?
        .ok_or_else(|| Error::TemplateNotFound(console.spec.console_template_ref.clone()))?;

    // 2 & 5. Owner-ref + persist.
    ensure_owner(&console_api, &console, &template).await?;

    // 3. Normalize TTLs.
    let ttl_before = normalize_ttl(
        console.spec.ttl_seconds_before_running,
        template.spec.default_ttl_seconds_before_running,
        ctx.config.default_ttl_before_running,
    );
    let ttl_after = normalize_ttl(
        console.spec.ttl_seconds_after_finished,
        template.spec.default_ttl_seconds_after_finished,
        ctx.config.default_ttl_after_finished,
    );

    let recorder = Recorder::new(
        client.clone(),
        ctx.diagnostics.read().await.reporter.clone(),
        console.object_ref(&()),
    );

    // 4. Clamp timeout.
    let timeout_seconds = clamp_timeout(&console, &template, &recorder).await?;

    // 6. Resolve command.
    let command = console
        .spec
        .command
        .clone()
        .filter(|c| !c.is_empty())
        .or_else(|| template.spec.default_command.clone())
        .ok_or(Error::MissingCommand)?;

    // 7. Authorisation gate.
    let gate = authorisation_gate(
        &console,
        &template,
        &command,
        &auth_api,
        &role_api,
        &drb_api,
    )
    .await?;

    // 8. Job provisioning.
    let job = provision_job(
        &console,
        &template,
        &command,
        timeout_seconds,
        gate.is_authorised,
        &job_api,
    )
    .await?;

    // 9. Pod discovery.
    let pod = match &job {
        Some(j) => {
            pod_api
                .list(&ListParams::default().labels(&format!("job-name={}", j.name_any())))
                .await?
                .items
                .into_iter()
                .next()
        }
        None => None,
    };

    // 10. Status calculation.
    let new_status = status::calculate(timeout_seconds, gate.is_authorised, job.as_ref(), pod.as_ref());
    let phase = new_status.phase.clone().unwrap_or_default();
    let previous_phase = console.status.as_ref().and_then(|s| s.phase.clone());
    let expiry_time = new_status.expiry_time.as_ref().map(|t| t.0);

    // 11. Audit events, then persist status.
    let audit_ctx = audit::AuditContext {
        console: &console,
        is_authorised: gate.is_authorised,
        rule_name: gate.rule_name.as_deref(),
        approvers: &gate.approvers,
        pod_name: new_status.pod_name.as_deref(),
    };
    audit::emit_transition(&recorder, &audit_ctx, previous_phase.as_ref(), &phase, job.as_ref(), expiry_time)
        .await?;
    harness::patch_status(&console_api, &console.name_any(), &new_status).await?;

    // 12. Phase-driven actions.
    if phase == ConsolePhase::Running {
        if let Some(pod_name) = &new_status.pod_name {
            provision_attach_rbac(&console, &template, pod_name, &role_api, &drb_api).await?;
        }
    }

    // 12 (requeue schedule) & 13. Garbage collection.
    let now = Utc::now();
    let gc_deadline = match phase {
        ConsolePhase::PendingAuthorisation => {
            let created = console
                .meta()
                .creation_timestamp
                .as_ref()
                .map(|t| t.0)
                .unwrap_or(now);
            Some((created + chrono::Duration::from_std(ttl_before).unwrap_or_default(), true))
        }
        ConsolePhase::Stopped | ConsolePhase::Destroyed => {
            let since = stopped_since(job.as_ref(), expiry_time)
                .or_else(|| destroyed_since(&console))
                .unwrap_or_else(|| console.meta().creation_timestamp.as_ref().map(|t| t.0).unwrap_or(now));
            Some((since + chrono::Duration::from_std(ttl_after).unwrap_or_default(), false))
        }
        _ => None,
    };

    if let Some((deadline, is_unauthorised_gc)) = gc_deadline {
        if now >= deadline {
            if is_unauthorised_gc {
                audit::emit_gc_unauthorised(&recorder, &audit_ctx).await?;
            }
            console_api
                .delete(
                    &console.name_any(),
                    &DeleteParams {
                        propagation_policy: Some(PropagationPolicy::Background),
                        ..Default::default()
                    },
                )
                .await?;
            return Ok(harness::no_requeue());
        }
        let remaining = (deadline - now).to_std().unwrap_or(Duration::from_secs(1));
        return Ok(harness::requeue_after(remaining));
    }

    Ok(match phase {
        ConsolePhase::Pending => harness::requeue_after(Duration::from_secs(1)),
        _ => harness::no_requeue(),
    })
}

async fn ensure_owner(console_api: &Api<Console>, console: &Console, template: &ConsoleTemplate) -> Result<()> {
    let Some(owner_ref) = template.controller_owner_ref(&()) else {
        return Ok(());
    };
    let already_owned = console.owner_references().iter().any(|o| o.uid == owner_ref.uid);
    if already_owned {
        return Ok(());
    }
    let patch = serde_json::json!({ "metadata": { "ownerReferences": [owner_ref] } });
    console_api
        .patch(&console.name_any(), &PatchParams::default(), &Patch::Merge(patch))
        .await?;
    Ok(())
}

fn normalize_ttl(console_override: Option<i64>, template_default: Option<i64>, global_default: Duration) -> Duration {
    console_override
        .or(template_default)
        .map(|s| Duration::from_secs(s.max(0) as u64))
        .unwrap_or(global_default)
}

async fn clamp_timeout(console: &Console, template: &ConsoleTemplate, recorder: &Recorder) -> Result<i64> {
    let requested = console.spec.timeout_seconds.unwrap_or(0);
    let base = if requested < 1 {
        template
            .spec
            .default_timeout_seconds
            .unwrap_or(template.spec.max_timeout_seconds)
    } else {
        requested
    };
    if base > template.spec.max_timeout_seconds {
        recorder
            .publish(Event {
                type_: EventType::Warning,
                reason: "InvalidSpecification".to_string(),
                note: Some(format!(
                    "timeoutSeconds {base} exceeds template max {}; clamped",
                    template.spec.max_timeout_seconds
                )),
                action: "Reconcile".to_string(),
                secondary: None,
            })
            .await?;
        Ok(template.spec.max_timeout_seconds)
    } else {
        Ok(base)
    }
}

/// Selects the applicable authorisation rule (if any), ensures the
/// `ConsoleAuthorisation`/`Role`/`DirectoryRoleBinding` triad backing it, and
/// reports whether enough distinct approvers have signed off.
async fn authorisation_gate(
    console: &Console,
    template: &ConsoleTemplate,
    command: &[String],
    auth_api: &Api<ConsoleAuthorisation>,
    role_api: &Api<Role>,
    drb_api: &Api<crate::crd::DirectoryRoleBinding>,
) -> Result<Gate> {
    let selection: Option<(AuthorisationRule, String)> = if template.spec.authorisation_rules.is_empty() {
        template
            .spec
            .default_authorisation_rule
            .clone()
            .map(|r| (r, "default".to_string()))
    } else {
        match template.spec.authorisation_rules.iter().find(|r| r.matches(command)) {
            Some(r) => Some((r.clone(), r.match_command_pattern.join(" "))),
            None => match &template.spec.default_authorisation_rule {
                Some(r) => Some((r.clone(), "default".to_string())),
                // A rule set exists but nothing matches and there's no fallback:
                // permanently unauthorised, no approval trail to construct.
                None => {
                    return Ok(Gate {
                        is_authorised: false,
                        rule_name: None,
                        approvers: vec![],
                    })
                }
            },
        }
    };

    let Some((rule, rule_name)) = selection else {
        return Ok(Gate {
            is_authorised: true,
            rule_name: None,
            approvers: vec![],
        });
    };

    let auth_name = console.authorisation_name();
    let auth = match auth_api.get_opt(&auth_name).await? {
        Some(existing) => existing,
        None => {
            let mut created = ConsoleAuthorisation::new(
                &auth_name,
                ConsoleAuthorisationSpec {
                    console_ref: console.name_any(),
                    authorisations: vec![],
                },
            );
            if let Some(owner_ref) = console.controller_owner_ref(&()) {
                created.meta_mut().owner_references = Some(vec![owner_ref]);
            }
            created.meta_mut().labels = console.metadata.labels.clone();
            auth_api.create(&PostParams::default(), &created).await?
        }
    };

    let role_name = rbac::authorisation_role_name(console);
    let role = rbac::build_authorisation_role(console, &auth);
    CreateOrUpdate::<RoleDiff>::run(role_api, &role_name, console, role).await?;

    let drb = rbac::build_authorisation_drb(console, &role_name, &rule.authorisation_subjects);
    CreateOrUpdate::<DirectoryRoleBindingSpecDiff>::run(drb_api, &role_name, console, drb).await?;

    let distinct: std::collections::HashSet<&str> =
        auth.spec.authorisations.iter().map(String::as_str).collect();
    let is_authorised = distinct.len() as i32 >= rule.authorisers_required;

    Ok(Gate {
        is_authorised,
        rule_name: Some(rule_name),
        approvers: auth.spec.authorisations.clone(),
    })
}

/// Fetches/creates/updates the console's job. Once a job has been observed
/// destroyed (prior pass computed `Destroyed`), it is never recreated.
async fn provision_job(
    console: &Console,
    template: &ConsoleTemplate,
    command: &[String],
    timeout_seconds: i64,
    is_authorised: bool,
    job_api: &Api<Job>,
) -> Result<Option<Job>> {
    let job_name = console.job_name();
    let exists = job_api.get_opt(&job_name).await?.is_some();
    let previously_destroyed = matches!(
        console.status.as_ref().and_then(|s| s.phase.clone()),
        Some(ConsolePhase::Destroyed)
    );

    if exists || (is_authorised && !previously_destroyed) {
        let expected = job_builder::build(console, template, command, timeout_seconds);
        CreateOrUpdate::<JobDiff>::run(job_api, &job_name, console, expected).await?;
        Ok(job_api.get_opt(&job_name).await?)
    } else {
        Ok(None)
    }
}

async fn provision_attach_rbac(
    console: &Console,
    template: &ConsoleTemplate,
    pod_name: &str,
    role_api: &Api<Role>,
    drb_api: &Api<crate::crd::DirectoryRoleBinding>,
) -> Result<()> {
    let role_name = rbac::per_pod_role_name(console);
    let role = rbac::build_per_pod_role(console, pod_name);
    CreateOrUpdate::<RoleDiff>::run(role_api, &role_name, console, role).await?;

    let drb = rbac::build_attach_drb(console, &role_name, &template.spec.additional_attach_subjects);
    CreateOrUpdate::<DirectoryRoleBindingSpecDiff>::run(drb_api, &role_name, console, drb).await?;
    Ok(())
}

fn stopped_since(job: Option<&Job>, expiry_time: Option<chrono::DateTime<chrono::Utc>>) -> Option<chrono::DateTime<chrono::Utc>> {
    job.and_then(|j| j.status.as_ref())
        .and_then(|s| s.completion_time.as_ref())
        .map(|t| t.0)
        .or(expiry_time)
}

/// The job backing a `Destroyed` console is already gone, so there is no
/// fresh `Job`/expiry to read this pass; fall back to whatever the previous
/// reconcile persisted (completion time, else the expiry it was tracking).
fn destroyed_since(console: &Console) -> Option<chrono::DateTime<chrono::Utc>> {
    console.status.as_ref().and_then(|s| {
        s.completion_time
            .as_ref()
            .map(|t| t.0)
            .or_else(|| s.expiry_time.as_ref().map(|t| t.0))
    })
}
