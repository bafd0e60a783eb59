//! Component F: the pure status/phase calculator. No I/O; a function of
//! `(console, is_authorised, job?, pod?)` alone (Testable Property 6).

use crate::crd::{ConsolePhase, ConsoleStatus};

use chrono::Duration as ChronoDuration;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

pub fn calculate(
    timeout_seconds: i64,
    is_authorised: bool,
    job: Option<&Job>,
    pod: Option<&Pod>,
) -> ConsoleStatus {
    let phase = phase(is_authorised, job, pod);

    let expiry_time = job
        .and_then(|j| j.metadata.creation_timestamp.as_ref())
        .map(|t| Time(t.0 + ChronoDuration::seconds(timeout_seconds)));

    let completion_time = job
        .and_then(|j| j.status.as_ref())
        .and_then(|s| s.completion_time.clone());

    let pod_name = pod.and_then(|p| p.metadata.name.clone());

    ConsoleStatus {
        phase: Some(phase.clone()),
        pod_name,
        expiry_time,
        completion_time,
        ready: phase == ConsolePhase::Running,
    }
}

pub fn phase(is_authorised: bool, job: Option<&Job>, pod: Option<&Pod>) -> ConsolePhase {
    if !is_authorised {
        return ConsolePhase::PendingAuthorisation;
    }
    let Some(job) = job else {
        return ConsolePhase::Destroyed;
    };
    if job_is_terminal(job) {
        return ConsolePhase::Stopped;
    }
    if pod_is_running(pod) {
        return ConsolePhase::Running;
    }
    ConsolePhase::Pending
}

fn job_is_terminal(job: &Job) -> bool {
    job.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| matches!(c.type_.as_str(), "Complete" | "Failed") && c.status == "True")
        })
        .unwrap_or(false)
}

fn pod_is_running(pod: Option<&Pod>) -> bool {
    pod.and_then(|p| p.status.as_ref())
        .and_then(|s| s.phase.as_deref())
        .map(|phase| phase == "Running")
        .unwrap_or(false)
}
