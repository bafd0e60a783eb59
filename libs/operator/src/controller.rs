//! Shared reconciler plumbing: the `Context` injected into every reconcile
//! call, the `State` the web server reads for `/health` and `/metrics`, and
//! `run()`, which starts both controllers (Console, DirectoryRoleBinding)
//! and returns once either's watch stream ends (e.g. on shutdown signal).

use crate::console;
use crate::directory::SharedDirectoryProvider;
use crate::directory_role_binding;
use crate::metrics::Metrics;

use chrono::{DateTime, Utc};
use kube::client::Client;
use kube::runtime::events::Reporter;
use prometheus_client::registry::Registry;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Duration;

/// Operator-wide settings threaded into every reconcile pass.
#[derive(Clone)]
pub struct Config {
    pub directory_group_kind: String,
    pub directory_refresh_interval: Duration,
    pub default_ttl_before_running: Duration,
    pub default_ttl_after_finished: Duration,
}

/// Context for our reconcilers.
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Directory-group resolver shared by both controllers
    pub directory: SharedDirectoryProvider,
    /// Operator-wide defaults
    pub config: Config,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Prometheus metrics
    pub metrics: Arc<Metrics>,
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    #[serde(deserialize_with = "from_ts")]
    pub last_event: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: Reporter,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: "console-operator".into(),
        }
    }
}

fn from_ts<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(with = "chrono::serde::ts_seconds")] DateTime<Utc>);
    let value = Wrapper::deserialize(deserializer)?;
    Ok(value.0)
}

/// State shared between the controllers and the web server.
#[derive(Clone)]
pub struct State {
    diagnostics: Arc<RwLock<Diagnostics>>,
    metrics: Arc<Metrics>,
    config: Config,
    directory: SharedDirectoryProvider,
}

impl State {
    pub fn new(registry: Registry, config: Config, directory: SharedDirectoryProvider) -> Self {
        Self {
            diagnostics: Arc::default(),
            metrics: Arc::new(Metrics::new(registry)),
            config,
            directory,
        }
    }

    /// Metrics getter, encoded in OpenMetrics text format.
    pub fn metrics(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &self.metrics.registry)?;
        Ok(buffer)
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    /// Create a Controller Context that can update State
    pub fn to_context(&self, client: Client) -> Arc<Context> {
        Arc::new(Context {
            client,
            directory: self.directory.clone(),
            config: self.config.clone(),
            diagnostics: self.diagnostics.clone(),
            metrics: self.metrics.clone(),
        })
    }
}

/// Starts both controllers; returns once either's watch stream ends.
pub async fn run(state: State, client: Client) {
    let ctx = state.to_context(client);

    let console_controller = console::reconcile::run(ctx.clone());
    let drb_controller = directory_role_binding::reconcile::run(ctx.clone());

    tokio::select! {
        _ = console_controller => {},
        _ = drb_controller => {},
    }
}
