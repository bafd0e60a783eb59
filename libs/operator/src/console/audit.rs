//! Component G: emits structured info/warning events on specific phase
//! transitions. All events carry console name, user, reason, a redacted
//! command, authorisation flags, and (when available) pod name,
//! authorisation rule name, and the list of approvers.

use crate::crd::{Console, ConsolePhase};

use k8s_openapi::api::batch::v1::Job;
use kube::runtime::events::{Event, EventType, Recorder};
use kube::ResourceExt;
use std::collections::BTreeMap;

/// Context gathered by the console reconciler for a single pass, used to
/// populate every event emitted during that pass.
pub struct AuditContext<'a> {
    pub console: &'a Console,
    pub is_authorised: bool,
    pub rule_name: Option<&'a str>,
    pub approvers: &'a [String],
    pub pod_name: Option<&'a str>,
}

impl<'a> AuditContext<'a> {
    /// Label-derived context (from the console's own labels) is merged
    /// first so the operator-controlled keys below always win on conflict.
    fn fields(&self) -> BTreeMap<String, String> {
        let mut fields: BTreeMap<String, String> = self
            .console
            .labels()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        fields.insert("console".to_string(), self.console.name_any());
        fields.insert("user".to_string(), self.console.spec.user.clone());
        fields.insert(
            "reason".to_string(),
            self.console.spec.reason.clone().unwrap_or_default(),
        );
        fields.insert(
            "command".to_string(),
            redact_command(self.console.spec.command.as_deref().unwrap_or_default()),
        );
        fields.insert("authorised".to_string(), self.is_authorised.to_string());
        if let Some(rule) = self.rule_name {
            fields.insert("authorisationRule".to_string(), rule.to_string());
        }
        if !self.approvers.is_empty() {
            fields.insert("approvers".to_string(), self.approvers.join(","));
        }
        if let Some(pod) = self.pod_name {
            fields.insert("podName".to_string(), pod.to_string());
        }
        fields
    }

    fn note(&self) -> String {
        serde_json::to_string(&self.fields()).unwrap_or_default()
    }
}

/// Masks all but the first command token, so an event never leaks
/// user-supplied arguments (which may contain secrets).
fn redact_command(command: &[String]) -> String {
    match command.split_first() {
        None => String::new(),
        Some((first, rest)) if rest.is_empty() => first.clone(),
        Some((first, rest)) => format!("{first} <{} arg(s) redacted>", rest.len()),
    }
}

async fn publish(
    recorder: &Recorder,
    ctx: &AuditContext<'_>,
    reason: &str,
    note: Option<String>,
) -> crate::error::Result<()> {
    recorder
        .publish(Event {
            type_: EventType::Normal,
            reason: reason.to_string(),
            note: Some(note.unwrap_or_else(|| ctx.note())),
            action: "Reconcile".to_string(),
            secondary: None,
        })
        .await
        .map_err(Into::into)
}

/// Emits the event(s) implied by moving from `previous` to `current` phase
/// this pass, given the job observed (used to compute `ConsoleEnded`'s
/// `duration`).
pub async fn emit_transition(
    recorder: &Recorder,
    ctx: &AuditContext<'_>,
    previous: Option<&ConsolePhase>,
    current: &ConsolePhase,
    job: Option<&Job>,
    expiry_time: Option<chrono::DateTime<chrono::Utc>>,
) -> crate::error::Result<()> {
    use ConsolePhase::*;

    match (previous, current) {
        (None, PendingAuthorisation) => {
            publish(recorder, ctx, "ConsolePendingAuthorisation", None).await?;
        }
        (Some(PendingAuthorisation), other) if other != &PendingAuthorisation => {
            publish(recorder, ctx, "ConsoleAuthorised", None).await?;
        }
        _ => {}
    }

    if matches!(previous, Some(Pending)) && current == &Running {
        publish(recorder, ctx, "ConsoleStarted", None).await?;
    }

    if matches!(previous, Some(Running)) && current == &Stopped {
        let duration = job_duration(job, expiry_time);
        let mut fields = ctx.fields();
        match duration {
            Some(d) => {
                fields.insert("duration".to_string(), d.to_string());
            }
            None => {
                fields.insert("duration".to_string(), "unknown".to_string());
                fields.insert("durationNote".to_string(), "duration unknown".to_string());
            }
        }
        publish(
            recorder,
            ctx,
            "ConsoleEnded",
            Some(serde_json::to_string(&fields).unwrap_or_default()),
        )
        .await?;
    }

    if !matches!(previous, Some(Destroyed)) && current == &Destroyed {
        publish(recorder, ctx, "ConsoleDestroyed", None).await?;
    }

    Ok(())
}

/// `ConsoleEnded` fired when a `PendingAuthorisation` console is GC'd for
/// lack of authorisation rather than via the normal Running -> Stopped path.
pub async fn emit_gc_unauthorised(
    recorder: &Recorder,
    ctx: &AuditContext<'_>,
) -> crate::error::Result<()> {
    let mut fields = ctx.fields();
    fields.insert("duration".to_string(), "unknown".to_string());
    fields.insert(
        "durationNote".to_string(),
        "lack of authorisation".to_string(),
    );
    publish(
        recorder,
        ctx,
        "ConsoleEnded",
        Some(serde_json::to_string(&fields).unwrap_or_default()),
    )
    .await
}

fn job_duration(
    job: Option<&Job>,
    expiry_time: Option<chrono::DateTime<chrono::Utc>>,
) -> Option<chrono::Duration> {
    let job = job?;
    let start = job.metadata.creation_timestamp.as_ref()?.0;
    if let Some(completion) = job.status.as_ref().and_then(|s| s.completion_time.as_ref()) {
        return Some(completion.0 - start);
    }
    expiry_time.map(|expiry| expiry - start)
}
