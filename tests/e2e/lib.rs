#[cfg(all(test, feature = "e2e-tests"))]
mod test {
    use std::time::Duration;

    use console_operator::crd::{Console, ConsolePhase, ConsoleSpec, ConsoleTemplate, ConsoleTemplateSpec};
    use k8s_openapi::api::batch::v1::Job;
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
    use kube::api::{Api, ObjectMeta, PostParams};
    use kube::client::Client;
    use kube::runtime::wait::{await_condition, conditions, Condition};
    use kube::ResourceExt;
    use tokio::time::timeout;

    fn is_console_phase(expected: ConsolePhase) -> impl Condition<Console> {
        move |obj: Option<&Console>| {
            obj.and_then(|c| c.status.as_ref())
                .and_then(|s| s.phase.as_ref())
                .map(|phase| *phase == expected)
                .unwrap_or(false)
        }
    }

    async fn wait_for<R, C>(api: Api<R>, name: &str, condition: C)
    where
        R: kube::Resource
            + Clone
            + std::fmt::Debug
            + for<'de> k8s_openapi::serde::Deserialize<'de>
            + 'static
            + Send,
        C: Condition<R>,
    {
        timeout(Duration::from_secs(30), await_condition(api, name, condition))
            .await
            .unwrap()
            .unwrap();
    }

    fn echo_template(name: &str) -> ConsoleTemplate {
        ConsoleTemplate::new(
            name,
            ConsoleTemplateSpec {
                pod_template: PodTemplateSpec {
                    metadata: Some(ObjectMeta::default()),
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "console".to_string(),
                            image: Some("busybox:latest".to_string()),
                            command: Some(vec!["sleep".to_string(), "2".to_string()]),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                default_command: None,
                default_ttl_seconds_before_running: None,
                default_ttl_seconds_after_finished: Some(5),
                default_timeout_seconds: Some(60),
                max_timeout_seconds: 300,
                additional_attach_subjects: vec![],
                authorisation_rules: vec![],
                default_authorisation_rule: None,
            },
        )
    }

    async fn setup(name: &str) -> (Api<Console>, Api<ConsoleTemplate>, Api<Job>) {
        let client = Client::try_default().await.unwrap();
        let template_api = Api::<ConsoleTemplate>::namespaced(client.clone(), "default");
        let console_api = Api::<Console>::namespaced(client.clone(), "default");
        let job_api = Api::<Job>::namespaced(client.clone(), "default");

        template_api
            .create(&PostParams::default(), &echo_template(name))
            .await
            .unwrap();

        let console = Console::new(
            name,
            ConsoleSpec {
                console_template_ref: name.to_string(),
                user: "alice".to_string(),
                command: None,
                reason: Some("e2e test".to_string()),
                timeout_seconds: None,
                ttl_seconds_before_running: None,
                ttl_seconds_after_finished: None,
                noninteractive: true,
            },
        );
        console_api.create(&PostParams::default(), &console).await.unwrap();

        (console_api, template_api, job_api)
    }

    #[tokio::test]
    async fn console_without_authorisation_rules_reaches_running() {
        let name = "test-console-running";
        let (console_api, _template_api, _job_api) = setup(name).await;
        wait_for(console_api, name, is_console_phase(ConsolePhase::Running)).await;
    }

    #[tokio::test]
    async fn console_job_completes_and_console_stops() {
        let name = "test-console-stopped";
        let (console_api, _template_api, job_api) = setup(name).await;
        wait_for(console_api.clone(), name, is_console_phase(ConsolePhase::Running)).await;
        wait_for(console_api.clone(), name, is_console_phase(ConsolePhase::Stopped)).await;

        let job = job_api.get(&format!("{name}-console")).await.unwrap();
        assert!(job.status.unwrap().completion_time.is_some());
    }

    #[tokio::test]
    async fn console_deletion_cascades_to_job() {
        let name = "test-console-cascade";
        let (console_api, _template_api, job_api) = setup(name).await;
        wait_for(console_api.clone(), name, is_console_phase(ConsolePhase::Running)).await;

        let job = job_api.get(&format!("{name}-console")).await.unwrap();
        console_api.delete(name, &Default::default()).await.unwrap();

        wait_for(
            job_api,
            &format!("{name}-console"),
            conditions::is_deleted(&job.uid().unwrap()),
        )
        .await;
    }
}
