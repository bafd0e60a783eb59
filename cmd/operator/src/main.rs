use actix_web::{
    get, middleware, web::Data, App, HttpRequest, HttpResponse, HttpServer, Responder,
};
use console_operator::controller::{self, State};
use console_operator::directory::{FileDirectoryProvider, SharedDirectoryProvider};
use console_operator::telemetry;
use console_operator_k8s_util::client::new_client_with_metrics;

use clap::{crate_authors, crate_description, crate_version, Parser};
use kube::Config as KubeConfig;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::time::Duration;

#[get("/metrics")]
async fn metrics(c: Data<State>, _req: HttpRequest) -> impl Responder {
    match c.metrics() {
        Ok(metrics) => HttpResponse::Ok()
            .content_type("application/openmetrics-text; version=1.0.0; charset=utf-8")
            .body(metrics),
        Err(e) => {
            tracing::error!("Failed to get metrics: {:?}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[get("/health")]
async fn health(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let diagnostics = c.diagnostics().await;
    HttpResponse::Ok().json(diagnostics)
}

#[derive(Parser, Debug)]
#[command(
    name = "console-operator",
    about = crate_description!(),
    version = crate_version!(),
    author = crate_authors!("\n"),
)]
struct Args {
    /// Listen on given port
    #[arg(short, long, default_value_t = 8080, env)]
    port: u32,

    /// Set logging filter directive for `tracing_subscriber::filter::EnvFilter`. Example: "info,kube=debug,console_operator=debug"
    #[arg(long, default_value = "info", env)]
    log_filter: String,

    /// Set log format
    #[arg(long, value_enum, default_value_t = telemetry::LogFormat::Text, env)]
    log_format: telemetry::LogFormat,

    /// URL for the OpenTelemetry tracing endpoint.
    ///
    /// This optional argument specifies the URL to which traces will be sent using
    /// OpenTelemetry. If not provided, tracing will be disabled.
    #[arg(short, long, env = "OPENTELEMETRY_ENDPOINT_URL")]
    tracing_url: Option<String>,

    /// Sampling ratio for tracing.
    ///
    /// Specifies the ratio of traces to sample. A value of `1.0` will sample all traces,
    /// while a lower value will sample fewer traces. The default is `0.1`, meaning 10%
    /// of traces are sampled.
    #[arg(short, long, default_value_t = 0.1, env)]
    sample_ratio: f64,

    /// Path to a YAML file mapping directory-group name to member user list.
    /// Stands in for a real directory backend (see `DirectoryProvider`).
    #[arg(long, default_value = "/etc/console-operator/directory.yaml", env)]
    directory_config: String,

    /// Subject `kind` recognized by the resolver as a directory-group reference.
    #[arg(long, default_value = "GoogleGroup", env)]
    directory_group_kind: String,

    /// How often the DirectoryRoleBinding reconciler re-resolves group membership.
    #[arg(long, default_value = "60", env)]
    directory_refresh_interval_seconds: u64,

    /// Default `ttlSecondsBeforeRunning` when neither console nor template sets one.
    #[arg(long, default_value = "3600", env)]
    default_ttl_before_running_seconds: u64,

    /// Default `ttlSecondsAfterFinished` when neither console nor template sets one.
    #[arg(long, default_value = "86400", env)]
    default_ttl_after_finished_seconds: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = Args::parse();

    telemetry::init(
        &args.log_filter,
        args.log_format,
        args.tracing_url.as_deref(),
        args.sample_ratio,
    )
    .await?;

    let mut registry = Registry::with_prefix("console_operator");
    let kube_config = KubeConfig::infer().await?;
    let client = new_client_with_metrics(kube_config, &mut registry).await?;

    let directory: SharedDirectoryProvider = Arc::new(FileDirectoryProvider::new(args.directory_config));
    let config = controller::Config {
        directory_group_kind: args.directory_group_kind,
        directory_refresh_interval: Duration::from_secs(args.directory_refresh_interval_seconds),
        default_ttl_before_running: Duration::from_secs(args.default_ttl_before_running_seconds),
        default_ttl_after_finished: Duration::from_secs(args.default_ttl_after_finished_seconds),
    };
    let state = State::new(registry, config, directory);

    let controllers = controller::run(state.clone(), client);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .wrap(middleware::Logger::default().exclude("/health"))
            .service(health)
            .service(metrics)
    })
    .bind(format!("0.0.0.0:{}", args.port))?
    .shutdown_timeout(5);

    // Both runtimes implement graceful shutdown, so poll until both are done
    tokio::join!(controllers, server.run()).1?;
    Ok(())
}
