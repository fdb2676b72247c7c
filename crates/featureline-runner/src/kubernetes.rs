//! Kubernetes job spawner.
//!
//! Submits each runner as a batch/v1 Job whose container receives the
//! runner kind and serialized config through environment variables, then
//! polls the Job until it reaches a terminal state.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client};
use tracing::info;

use featureline_core::spawner::{Completion, JobSpawner, Runner, RunnerKind};
use featureline_core::{Error, ResourceId, Result};

/// Env var carrying the runner kind into the container.
pub const RUNNER_ENV: &str = "FEATURELINE_RUNNER";
/// Env var carrying the base64 serialized config.
pub const CONFIG_ENV: &str = "FEATURELINE_CONFIG";
/// Env var carrying the target resource's job key.
pub const RESOURCE_ENV: &str = "FEATURELINE_RESOURCE";

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Spawner that runs jobs as pods in a Kubernetes namespace.
pub struct KubernetesSpawner {
    client: Client,
    namespace: String,
    image: String,
}

impl KubernetesSpawner {
    pub async fn new(namespace: impl Into<String>, image: impl Into<String>) -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        Ok(Self::with_client(client, namespace, image))
    }

    pub fn with_client(
        client: Client,
        namespace: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            image: image.into(),
        }
    }
}

#[async_trait]
impl JobSpawner for KubernetesSpawner {
    async fn get_runner(
        &self,
        kind: &str,
        config: &[u8],
        resource: ResourceId,
    ) -> Result<Box<dyn Runner>> {
        let kind: RunnerKind = kind.parse()?;
        Ok(Box::new(KubernetesRunner {
            jobs: Api::namespaced(self.client.clone(), &self.namespace),
            image: self.image.clone(),
            kind,
            config: STANDARD.encode(config),
            resource,
        }))
    }
}

/// A Job name must be a DNS-1123 label: lowercase alphanumerics and dashes,
/// at most 63 characters.
fn job_name(kind: RunnerKind, resource: &ResourceId) -> String {
    let raw = format!(
        "featureline-{}-{}-{}-{}",
        kind.as_str(),
        resource.kind,
        resource.name,
        resource.variant
    );
    let mut name: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    name.truncate(63);
    name.trim_matches('-').to_string()
}

struct KubernetesRunner {
    jobs: Api<Job>,
    image: String,
    kind: RunnerKind,
    config: String,
    resource: ResourceId,
}

#[async_trait]
impl Runner for KubernetesRunner {
    fn resource(&self) -> &ResourceId {
        &self.resource
    }

    async fn run(&self) -> Result<Box<dyn Completion>> {
        let name = job_name(self.kind, &self.resource);
        let env = vec![
            EnvVar {
                name: RUNNER_ENV.to_string(),
                value: Some(self.kind.as_str().to_string()),
                ..Default::default()
            },
            EnvVar {
                name: CONFIG_ENV.to_string(),
                value: Some(self.config.clone()),
                ..Default::default()
            },
            EnvVar {
                name: RESOURCE_ENV.to_string(),
                value: Some(self.resource.job_key()),
                ..Default::default()
            },
        ];
        let job = Job {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                ..Default::default()
            },
            spec: Some(JobSpec {
                // retries belong to the coordinator, not the orchestrator
                backoff_limit: Some(0),
                template: PodTemplateSpec {
                    metadata: None,
                    spec: Some(PodSpec {
                        restart_policy: Some("Never".to_string()),
                        containers: vec![Container {
                            name: "runner".to_string(),
                            image: Some(self.image.clone()),
                            env: Some(env),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        };

        info!(job = %name, kind = %self.kind, "Submitting job");
        self.jobs
            .create(&PostParams::default(), &job)
            .await
            .map_err(|e| Error::RunnerFailure(format!("failed to submit job {name}: {e}")))?;

        Ok(Box::new(KubernetesCompletion {
            jobs: self.jobs.clone(),
            name,
        }))
    }
}

struct KubernetesCompletion {
    jobs: Api<Job>,
    name: String,
}

#[async_trait]
impl Completion for KubernetesCompletion {
    async fn wait(&self) -> Result<()> {
        loop {
            let job = self
                .jobs
                .get(&self.name)
                .await
                .map_err(|e| Error::RunnerFailure(format!("failed to read job {}: {e}", self.name)))?;
            if let Some(status) = &job.status {
                if status.succeeded.unwrap_or(0) > 0 {
                    return Ok(());
                }
                if status.failed.unwrap_or(0) > 0 {
                    let reason = status
                        .conditions
                        .as_ref()
                        .and_then(|conditions| {
                            conditions
                                .iter()
                                .find(|c| c.type_ == "Failed")
                                .and_then(|c| c.message.clone())
                        })
                        .unwrap_or_else(|| format!("job {} failed", self.name));
                    return Err(Error::RunnerFailure(reason));
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn cancel(&self) -> Result<()> {
        self.jobs
            .delete(&self.name, &DeleteParams::background())
            .await
            .map(|_| ())
            .map_err(|e| Error::RunnerFailure(format!("failed to cancel job {}: {e}", self.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use featureline_core::ResourceKind;

    #[test]
    fn test_job_name_is_dns_safe() {
        let id = ResourceId::new("My_Source.2024", "", ResourceKind::Source);
        let name = job_name(RunnerKind::CreateTransformation, &id);
        assert!(name.len() <= 63);
        assert!(!name.starts_with('-') && !name.ends_with('-'));
        assert!(name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        assert!(name.starts_with("featureline-create-transformation"));
    }

    #[test]
    fn test_job_name_truncates_long_resources() {
        let id = ResourceId::new("x".repeat(100), "v", ResourceKind::Feature);
        let name = job_name(RunnerKind::Materialize, &id);
        assert!(name.len() <= 63);
        assert!(!name.ends_with('-'));
    }
}
