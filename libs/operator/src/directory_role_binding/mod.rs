pub mod reconcile;

pub use reconcile::{reconcile_drb, CONTROLLER_ID};

#[cfg(test)]
mod test {
    use crate::controller::{Config, Context};
    use crate::crd::{DirectoryRoleBinding, DirectoryRoleBindingSpec, DirectoryRoleBindingStatus};
    use crate::directory::test_support::StaticDirectoryProvider;
    use crate::directory::SharedDirectoryProvider;
    use crate::error::Result;

    use std::sync::Arc;

    use http::{Request, Response};
    use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
    use kube::{client::Body, Client, Resource, ResourceExt};
    use tokio::time::Duration;

    impl DirectoryRoleBinding {
        pub fn test() -> Self {
            let mut drb = DirectoryRoleBinding::new(
                "test",
                DirectoryRoleBindingSpec {
                    subjects: vec![Subject {
                        kind: "User".to_string(),
                        name: "alice".to_string(),
                        api_group: Some("rbac.authorization.k8s.io".to_string()),
                        namespace: None,
                    }],
                    role_ref: RoleRef {
                        api_group: "rbac.authorization.k8s.io".to_string(),
                        kind: "Role".to_string(),
                        name: "test".to_string(),
                    },
                },
            );
            drb.meta_mut().namespace = Some("default".into());
            drb
        }
    }

    type ApiServerHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;
    pub struct ApiServerVerifier(ApiServerHandle);

    impl ApiServerVerifier {
        pub fn run_create_then_status_patch(self, drb: DirectoryRoleBinding) -> tokio::task::JoinHandle<()> {
            tokio::spawn(async move {
                self.handle_get_drb(drb.clone())
                    .await
                    .unwrap()
                    .handle_rolebinding_absent(drb.clone())
                    .await
                    .unwrap()
                    .handle_rolebinding_create(drb.clone())
                    .await
                    .unwrap()
                    .handle_status_patch(drb)
                    .await
                    .unwrap();
            })
        }

        async fn handle_get_drb(mut self, drb: DirectoryRoleBinding) -> Result<Self> {
            let (request, send) = self.0.next_request().await.expect("service not called");
            assert_eq!(request.method(), http::Method::GET);
            let response = serde_json::to_vec(&drb).unwrap();
            send.send_response(Response::builder().body(Body::from(response)).unwrap());
            Ok(self)
        }

        async fn handle_rolebinding_absent(mut self, _drb: DirectoryRoleBinding) -> Result<Self> {
            let (request, send) = self.0.next_request().await.expect("service not called");
            assert_eq!(request.method(), http::Method::GET);
            send.send_response(
                Response::builder()
                    .status(404)
                    .body(Body::from(serde_json::to_vec(&serde_json::json!({
                        "apiVersion": "v1",
                        "kind": "Status",
                        "code": 404,
                        "reason": "NotFound",
                        "status": "Failure",
                    })).unwrap()))
                    .unwrap(),
            );
            Ok(self)
        }

        async fn handle_rolebinding_create(mut self, drb: DirectoryRoleBinding) -> Result<Self> {
            let (request, send) = self.0.next_request().await.expect("service not called");
            assert_eq!(request.method(), http::Method::POST);
            let req_body = request.into_body().collect_bytes().await.unwrap();
            let rb: RoleBinding = serde_json::from_slice(&req_body).expect("valid role binding");
            assert_eq!(rb.subjects, Some(drb.spec.subjects.clone()));
            assert_eq!(rb.role_ref.name, drb.spec.role_ref.name);
            let response = serde_json::to_vec(&rb).unwrap();
            send.send_response(Response::builder().body(Body::from(response)).unwrap());
            Ok(self)
        }

        async fn handle_status_patch(mut self, drb: DirectoryRoleBinding) -> Result<Self> {
            let (request, send) = self.0.next_request().await.expect("service not called");
            assert_eq!(request.method(), http::Method::PATCH);
            let req_body = request.into_body().collect_bytes().await.unwrap();
            let json: serde_json::Value = serde_json::from_slice(&req_body).expect("patch is json");
            let status_json = json.get("status").expect("status object").clone();
            let status: DirectoryRoleBindingStatus = serde_json::from_value(status_json).expect("valid status");
            assert_eq!(status.resolved_subjects, Some(1));
            let mut updated = drb.clone();
            updated.status = Some(status);
            let response = serde_json::to_vec(&updated).unwrap();
            send.send_response(Response::builder().body(Body::from(response)).unwrap());
            Ok(self)
        }
    }

    impl Context {
        pub fn test() -> (Arc<Self>, ApiServerVerifier) {
            let (mock_service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
            let mock_client = Client::new(mock_service, "default");
            let directory: SharedDirectoryProvider = Arc::new(StaticDirectoryProvider::new());
            let ctx = Self {
                client: mock_client,
                directory,
                config: Config {
                    directory_group_kind: "GoogleGroup".to_string(),
                    directory_refresh_interval: Duration::from_secs(60),
                    default_ttl_before_running: Duration::from_secs(3600),
                    default_ttl_after_finished: Duration::from_secs(86400),
                },
                diagnostics: Arc::default(),
                metrics: Arc::default(),
            };
            (Arc::new(ctx), ApiServerVerifier(handle))
        }
    }

    #[tokio::test]
    async fn resolves_passthrough_subjects_and_creates_role_binding() {
        let (ctx, verifier) = Context::test();
        let drb = DirectoryRoleBinding::test();
        let mocksrv = verifier.run_create_then_status_patch(drb.clone());

        let result = super::reconcile::reconcile_drb(Arc::new(drb), ctx).await;
        tokio::time::timeout(Duration::from_secs(1), mocksrv)
            .await
            .expect("timeout on mock apiserver")
            .expect("scenario succeeded");
        assert!(result.is_ok());
    }
}
