//! volclone - CSI volume clone hand-off controller

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::{future, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Config as ControllerRuntimeConfig;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{reflector, watcher, Controller, WatchStreamExt};
use kube::{Api, Client, CustomResourceExt, ResourceExt};
use tracing::info;

use volclone::clone::is_eligible;
use volclone::config::ControllerConfig;
use volclone::controller::{error_policy, reconcile, Context};
use volclone::crd::CloneRequest;
use volclone::kube_client::create_client;
use volclone::telemetry::{init_telemetry, TelemetryConfig};

/// volclone - hands CSI-cloned volumes to the claims CloneRequests ask for
#[derive(Parser, Debug)]
#[command(name = "volclone", version, about, long_about = None)]
struct Cli {
    /// Generate the CloneRequest CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    config: ControllerConfig,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the clone controller (default mode)
    ///
    /// Watches PersistentVolumeClaims marked for cloning, hands cloned
    /// volumes from source to target claims and reports progress on the
    /// owning CloneRequests.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // aws-lc-rs crypto provider; nothing below can talk TLS without it
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!(
            "CRITICAL: Failed to install crypto provider: {:?}. \
             The controller cannot reach the API server without a working TLS implementation.",
            e
        );
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&CloneRequest::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.config).await,
    }
}

/// Run the clone controller until a shutdown signal arrives
async fn run_controller(config: ControllerConfig) -> anyhow::Result<()> {
    init_telemetry(TelemetryConfig::default())?;
    config.validate()?;

    info!(
        controller = %config.controller_name,
        namespace = config.watch_namespace.as_deref().unwrap_or("<all>"),
        "starting volclone controller"
    );

    let client = create_client()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if config.skip_crd_install {
        info!("skipping CloneRequest CRD installation");
    } else {
        ensure_crd_installed(&client, &config.controller_name).await?;
    }

    let ctx = Arc::new(Context::new(client.clone(), &config));

    let claims: Api<PersistentVolumeClaim> = match &config.watch_namespace {
        Some(namespace) => Api::namespaced(client, namespace),
        None => Api::all(client),
    };

    // Only claims taking part in a clone reach the reconciler; requeues are
    // resolved from the unfiltered store
    let (reader, writer) = reflector::store();
    let claim_stream = reflector(
        writer,
        watcher(
            claims,
            WatcherConfig::default().timeout(config.watch_timeout_secs),
        ),
    )
    .default_backoff()
    .touched_objects()
    .try_filter(|claim| future::ready(is_eligible(claim)));

    Controller::for_stream(claim_stream, reader)
        .with_config(ControllerRuntimeConfig::default().concurrency(config.max_concurrent_reconciles))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("PersistentVolumeClaim"))
        .await;

    info!("volclone controller stopped");
    Ok(())
}

/// Install the CloneRequest CRD with server-side apply
///
/// Keeps the stored CRD in lock-step with the running controller version.
async fn ensure_crd_installed(client: &Client, field_manager: &str) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(field_manager).force();
    let crd = CloneRequest::crd();
    let name = crd.name_any();

    info!(crd = %name, "Installing CloneRequest CRD...");
    crds.patch(&name, &params, &Patch::Apply(&crd))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install CloneRequest CRD: {}", e))?;

    Ok(())
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    kind: &'static str,
) -> impl Fn(Result<T, E>) -> future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", kind),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", kind),
        }
        future::ready(())
    }
}
