//! Fufu Operator - reconciles Fufu resources into web workloads

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};

use fufu::config::ControllerConfig;
use fufu::controller::{error_policy, reconcile, Context};
use fufu::crd::Fufu;
use fufu::retry::{retry_with_backoff, RetryPolicy};
use fufu::telemetry::init_logging;

/// Fufu - operator turning Fufu resources into a web Deployment, Service and autoscaler
#[derive(Parser, Debug)]
#[command(name = "fufu", version, about, long_about = None)]
struct Cli {
    /// Print the Fufu CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    config: ControllerConfig,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller (default mode)
    ///
    /// Installs the Fufu CRD, then watches Fufus and the Deployments,
    /// Services and HorizontalPodAutoscalers they own.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&Fufu::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.config).await,
    }
}

/// Install or update the Fufu CRD using server-side apply
async fn ensure_crd_installed(client: &Client, field_manager: &str) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(field_manager).force();
    let crd = Fufu::crd();
    let name = crd
        .metadata
        .name
        .clone()
        .ok_or_else(|| anyhow::anyhow!("generated CRD has no name"))?;

    let patch = Patch::Apply(&crd);

    retry_with_backoff(&RetryPolicy::with_max_attempts(10), "install Fufu CRD", || {
        crds.patch(&name, &params, &patch)
    })
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install Fufu CRD: {}", e))?;

    tracing::info!(crd = %name, "Fufu CRD installed");
    Ok(())
}

/// Run the Fufu controller until SIGINT/SIGTERM
async fn run_controller(config: ControllerConfig) -> anyhow::Result<()> {
    init_logging(config.log_format).map_err(|e| anyhow::anyhow!("{}", e))?;

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crd_installed(&client, &config.field_manager).await?;

    let ctx = Arc::new(
        Context::builder(client.clone())
            .field_manager(config.field_manager.clone())
            .settings(config.reconcile_settings())
            .build(),
    );

    let (fufus, deployments, services, autoscalers) = match &config.watch_namespace {
        Some(ns) => (
            Api::<Fufu>::namespaced(client.clone(), ns),
            Api::<Deployment>::namespaced(client.clone(), ns),
            Api::<Service>::namespaced(client.clone(), ns),
            Api::<HorizontalPodAutoscaler>::namespaced(client.clone(), ns),
        ),
        None => (
            Api::<Fufu>::all(client.clone()),
            Api::<Deployment>::all(client.clone()),
            Api::<Service>::all(client.clone()),
            Api::<HorizontalPodAutoscaler>::all(client.clone()),
        ),
    };

    tracing::info!(
        namespace = config.watch_namespace.as_deref().unwrap_or("<all>"),
        "starting Fufu controller"
    );

    Controller::new(fufus, WatcherConfig::default())
        .owns(deployments, WatcherConfig::default())
        .owns(services, WatcherConfig::default())
        .owns(autoscalers, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result)
        .await;

    tracing::info!("Fufu controller stopped");
    Ok(())
}

async fn log_reconcile_result<E: std::fmt::Debug>(result: Result<(ObjectRef<Fufu>, Action), E>) {
    match result {
        Ok((fufu, action)) => tracing::debug!(fufu = %fufu, ?action, "reconciled"),
        Err(e) => tracing::debug!(error = ?e, "reconcile loop error"),
    }
}
