//! Featureline coordinator daemon.
//!
//! Standalone mode wires the etcd job store to the in-memory metadata
//! store and the in-process spawner; production deployments front a real
//! metadata service and hand runners to Kubernetes.

use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use featureline_coordinator::{Coordinator, CoordinatorConfig};
use featureline_metadata::InMemoryMetadata;
use featureline_runner::{built_in_registry, InProcessSpawner, KubernetesSpawner};
use featureline_store::EtcdStore;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SpawnerBackend {
    /// Run jobs inside this process.
    Memory,
    /// Submit jobs to a Kubernetes namespace.
    Kubernetes,
}

#[derive(Parser)]
#[command(name = "coordinatord")]
#[command(about = "Featureline coordinator daemon", long_about = None)]
struct Args {
    /// etcd endpoints, comma separated
    #[arg(
        long,
        env = "FEATURELINE_ETCD",
        default_value = "http://127.0.0.1:2379",
        value_delimiter = ','
    )]
    etcd: Vec<String>,

    /// Job spawner backend
    #[arg(long, env = "FEATURELINE_SPAWNER", value_enum, default_value = "memory")]
    spawner: SpawnerBackend,

    /// Namespace for spawned runner jobs (kubernetes spawner)
    #[arg(long, env = "FEATURELINE_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Runner container image (kubernetes spawner)
    #[arg(
        long,
        env = "FEATURELINE_RUNNER_IMAGE",
        default_value = "featureline/runner:latest"
    )]
    runner_image: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!(endpoints = ?args.etcd, "Connecting to etcd");
    let store = Arc::new(EtcdStore::connect(args.etcd.clone()).await?);

    let spawner: Arc<dyn featureline_runner::JobSpawner> = match args.spawner {
        SpawnerBackend::Memory => {
            let registry = Arc::new(built_in_registry()?);
            Arc::new(InProcessSpawner::new(registry))
        }
        SpawnerBackend::Kubernetes => {
            info!(namespace = %args.namespace, image = %args.runner_image, "Using kubernetes spawner");
            Arc::new(KubernetesSpawner::new(args.namespace.clone(), args.runner_image.clone()).await?)
        }
    };

    let metadata = Arc::new(InMemoryMetadata::new());
    let coordinator = Coordinator::new(metadata, store, spawner, CoordinatorConfig::default());

    coordinator.run().await?;
    Ok(())
}
