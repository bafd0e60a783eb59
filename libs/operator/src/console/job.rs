//! Builds the `Job` a `Console` owns (spec §4.E step 8).

use crate::crd::{Console, ConsoleTemplate};
use crate::labels::merge_labels;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::api::ObjectMeta;
use kube::ResourceExt;

/// `completions=1`, `parallelism=1`, `backoff_limit=0`, `restart_policy=Never`
/// enforce the "a console runs at most once" invariant at the API level: the
/// job never retries and never schedules more than one pod.
pub fn build(
    console: &Console,
    template: &ConsoleTemplate,
    command: &[String],
    timeout_seconds: i64,
) -> Job {
    let name = console.job_name();
    let namespace = console.metadata.namespace.clone();

    let mut pod_template: PodTemplateSpec = template.spec.pod_template.clone();
    if let Some(pod_spec) = pod_template.spec.as_mut() {
        pod_spec.restart_policy = Some("Never".to_string());
        if let Some(container) = pod_spec.containers.first_mut() {
            if !command.is_empty() {
                container.command = Some(command.to_vec());
                container.args = None;
            }
            if !console.spec.noninteractive {
                container.stdin = Some(true);
                container.tty = Some(true);
            }
        }
    }

    let labels = merge_labels(&[
        &template.metadata.labels.clone().unwrap_or_default(),
        &console.metadata.labels.clone().unwrap_or_default(),
        &[
            ("console-name".to_string(), console.name_any()),
            ("user".to_string(), console.spec.user.clone()),
        ]
        .into_iter()
        .collect(),
    ]);
    pod_template.metadata = Some(ObjectMeta {
        labels: Some(labels.clone()),
        ..pod_template.metadata.unwrap_or_default()
    });

    Job {
        metadata: ObjectMeta {
            name: Some(name),
            namespace,
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(JobSpec {
            completions: Some(1),
            parallelism: Some(1),
            backoff_limit: Some(0),
            active_deadline_seconds: Some(timeout_seconds),
            template: pod_template,
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ConsoleSpec, ConsoleTemplateSpec};
    use k8s_openapi::api::core::v1::{Container, PodSpec};

    fn template() -> ConsoleTemplate {
        ConsoleTemplate::new(
            "t",
            ConsoleTemplateSpec {
                pod_template: PodTemplateSpec {
                    metadata: None,
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "shell".to_string(),
                            image: Some("alpine".to_string()),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                default_command: Some(vec!["/bin/sh".to_string()]),
                default_ttl_seconds_before_running: None,
                default_ttl_seconds_after_finished: None,
                default_timeout_seconds: Some(60),
                max_timeout_seconds: 300,
                additional_attach_subjects: vec![],
                authorisation_rules: vec![],
                default_authorisation_rule: None,
            },
        )
    }

    fn console() -> Console {
        let mut c = Console::new(
            "c",
            ConsoleSpec {
                console_template_ref: "t".to_string(),
                user: "u@example.com".to_string(),
                command: None,
                reason: None,
                timeout_seconds: None,
                ttl_seconds_before_running: None,
                ttl_seconds_after_finished: None,
                noninteractive: false,
            },
        );
        c.metadata.namespace = Some("default".to_string());
        c
    }

    #[test]
    fn job_name_truncates_and_suffixes() {
        let mut c = console();
        c.metadata.name = Some("a".repeat(80));
        assert_eq!(c.job_name().len(), 55 + "-console".len());
        assert!(c.job_name().ends_with("-console"));
    }

    #[test]
    fn interactive_console_sets_stdin_and_tty() {
        let job = build(&console(), &template(), &["/bin/sh".to_string()], 60);
        let container = &job.spec.unwrap().template.spec.unwrap().containers[0];
        assert_eq!(container.stdin, Some(true));
        assert_eq!(container.tty, Some(true));
    }

    #[test]
    fn deadline_matches_timeout() {
        let job = build(&console(), &template(), &["/bin/sh".to_string()], 300);
        assert_eq!(job.spec.unwrap().active_deadline_seconds, Some(300));
    }

    #[test]
    fn enforces_run_once_invariants() {
        let job = build(&console(), &template(), &["/bin/sh".to_string()], 60);
        let spec = job.spec.unwrap();
        assert_eq!(spec.completions, Some(1));
        assert_eq!(spec.parallelism, Some(1));
        assert_eq!(spec.backoff_limit, Some(0));
    }
}
