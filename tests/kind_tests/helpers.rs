//! Test helpers for integration tests
//!
//! Provides utilities for managing the kind cluster and Fufu resources.

use std::process::Command;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, Config, CustomResourceExt};
use tokio::sync::OnceCell;
use tokio::time::sleep;

use fufu::controller::{reconcile, Context};
use fufu::crd::{AdditionalInfo, Fufu, FufuSpec};

/// Name of the kind cluster used for integration tests
pub const TEST_CLUSTER_NAME: &str = "fufu-integration-test";

/// Namespace every story runs in
pub const TEST_NAMESPACE: &str = "default";

/// Global lock to ensure cluster is created only once
static CLUSTER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Track if CRD has been installed (async-safe)
static CRD_INSTALLED: OnceCell<Result<(), String>> = OnceCell::const_new();

/// Check if a kind cluster with the given name exists
pub fn kind_cluster_exists(name: &str) -> bool {
    let output = Command::new("kind")
        .args(["get", "clusters"])
        .output()
        .expect("failed to run kind");

    let clusters = String::from_utf8_lossy(&output.stdout);
    clusters.lines().any(|line| line.trim() == name)
}

/// Create a kind cluster for testing
pub fn create_kind_cluster(name: &str) -> Result<(), String> {
    if kind_cluster_exists(name) {
        println!("Kind cluster '{name}' already exists, reusing it");
        return Ok(());
    }

    println!("Creating kind cluster '{name}'...");
    let output = Command::new("kind")
        .args(["create", "cluster", "--name", name, "--wait", "60s"])
        .output()
        .map_err(|e| format!("failed to run kind: {e}"))?;

    if !output.status.success() {
        return Err(format!(
            "failed to create kind cluster: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }

    println!("Kind cluster '{name}' created successfully");
    Ok(())
}

/// Install the Fufu CRD into the cluster with server-side apply
pub async fn install_crd(client: &Client) -> Result<(), kube::Error> {
    let crd = Fufu::crd();
    let name = crd.metadata.name.clone().unwrap();
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());

    println!("Installing Fufu CRD...");
    crds.patch(
        &name,
        &PatchParams::apply("fufu-integration-test").force(),
        &Patch::Apply(&crd),
    )
    .await?;

    // Wait for CRD to be established
    sleep(Duration::from_secs(2)).await;

    println!("CRD installed successfully");
    Ok(())
}

/// Create a Kubernetes client connected to the test cluster
pub async fn create_test_client() -> Result<Client, String> {
    let context_name = format!("kind-{TEST_CLUSTER_NAME}");

    let config = Config::from_kubeconfig(&kube::config::KubeConfigOptions {
        context: Some(context_name),
        ..Default::default()
    })
    .await
    .map_err(|e| format!("failed to load kubeconfig: {e}"))?;

    Client::try_from(config).map_err(|e| format!("failed to create client: {e}"))
}

/// Ensure the test cluster is ready (thread-safe, cluster created once)
///
/// Returns a fresh Client for each call - clients should not be shared across test threads.
pub async fn ensure_test_cluster() -> Result<Client, String> {
    let cluster_result = CLUSTER_INIT.get_or_init(|| create_kind_cluster(TEST_CLUSTER_NAME));
    cluster_result.clone()?;

    let client = create_test_client().await?;

    let crd_result = CRD_INSTALLED
        .get_or_init(|| async {
            let client = create_test_client().await?;
            install_crd(&client)
                .await
                .map_err(|e| format!("failed to install CRD: {e}"))
        })
        .await;
    crd_result.clone()?;

    Ok(client)
}

/// A Fufu like the one in the sample manifest
pub fn sample_fufu(name: &str) -> Fufu {
    let mut fufu = Fufu::new(
        name,
        FufuSpec {
            color: "orange".to_string(),
            weight: "5kg".to_string(),
            age: 6,
            info: Some(AdditionalInfo {
                breed: "stray".to_string(),
                vaccinated: false,
            }),
        },
    );
    fufu.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    fufu
}

/// Delete a Fufu and wait for it to go away
///
/// Dependents are removed by the garbage collector through their owner reference.
pub async fn cleanup_fufu(client: &Client, name: &str) {
    let api: Api<Fufu> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let _ = api.delete(name, &DeleteParams::foreground()).await;

    for _ in 0..30 {
        if api.get_opt(name).await.ok().flatten().is_none() {
            return;
        }
        sleep(Duration::from_secs(1)).await;
    }
}

/// Create a Fufu and return the server's copy
pub async fn create_fufu(client: &Client, name: &str) -> Fufu {
    let api: Api<Fufu> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    api.create(&PostParams::default(), &sample_fufu(name))
        .await
        .expect("failed to create fufu")
}

/// Run one reconcile pass against the latest copy of the Fufu
pub async fn reconcile_once(client: &Client, name: &str) -> Result<(), fufu::Error> {
    let api: Api<Fufu> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let fufu = api.get(name).await.expect("failed to get fufu");
    let ctx = Arc::new(Context::builder(client.clone()).build());
    reconcile(Arc::new(fufu), ctx).await.map(|_| ())
}
