//! Resource identifiers and job-key encoding.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Prefix for one-shot job keys in the KV store.
pub const JOB_PREFIX: &str = "JOB__";
/// Prefix for recurring (cron) job keys.
pub const SCHEDULE_JOB_PREFIX: &str = "SCHEDULEJOB__";
/// Prefix for lock sentinels. Disjoint from the job namespaces.
pub const LOCK_PREFIX: &str = "LOCK__";

/// The kind of a declared resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum ResourceKind {
    #[display("SOURCE")]
    Source,
    #[display("FEATURE")]
    Feature,
    #[display("LABEL")]
    Label,
    #[display("TRAINING_SET")]
    TrainingSet,
    #[display("PROVIDER")]
    Provider,
    #[display("ENTITY")]
    Entity,
    #[display("USER")]
    User,
}

impl ResourceKind {
    /// Whether resources of this kind can be driven by a coordinator job.
    pub fn is_schedulable(&self) -> bool {
        matches!(
            self,
            ResourceKind::Source
                | ResourceKind::Feature
                | ResourceKind::Label
                | ResourceKind::TrainingSet
        )
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SOURCE" => Ok(ResourceKind::Source),
            "FEATURE" => Ok(ResourceKind::Feature),
            "LABEL" => Ok(ResourceKind::Label),
            "TRAINING_SET" => Ok(ResourceKind::TrainingSet),
            "PROVIDER" => Ok(ResourceKind::Provider),
            "ENTITY" => Ok(ResourceKind::Entity),
            "USER" => Ok(ResourceKind::User),
            other => Err(crate::Error::InvalidResource(format!(
                "unknown resource kind: {other}"
            ))),
        }
    }
}

/// A `(name, variant)` pair addressing one revision of a named resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{name}.{variant}")]
pub struct NameVariant {
    pub name: String,
    pub variant: String,
}

impl NameVariant {
    pub fn new(name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variant: variant.into(),
        }
    }

    /// The `"name.variant"` form used as a template placeholder key and as a
    /// replacements-map key.
    pub fn key(&self) -> String {
        format!("{}.{}", self.name, self.variant)
    }
}

/// A unique identifier for any resource in the system.
///
/// Name and variant are opaque strings, unique within a kind. Names must not
/// contain the `__` separator used by the job-key encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{kind} {name}.{variant}")]
pub struct ResourceId {
    pub name: String,
    pub variant: String,
    pub kind: ResourceKind,
}

impl ResourceId {
    pub fn new(name: impl Into<String>, variant: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            variant: variant.into(),
            kind,
        }
    }

    pub fn name_variant(&self) -> NameVariant {
        NameVariant::new(self.name.clone(), self.variant.clone())
    }

    /// Deterministic one-shot job key for this resource.
    pub fn job_key(&self) -> String {
        format!("{}{}__{}__{}", JOB_PREFIX, self.kind, self.name, self.variant)
    }

    /// Deterministic recurring job key for this resource.
    pub fn schedule_job_key(&self) -> String {
        format!(
            "{}{}__{}__{}",
            SCHEDULE_JOB_PREFIX, self.kind, self.name, self.variant
        )
    }

    /// Parse a resource id back out of a job key, accepting either the
    /// one-shot or the schedule prefix.
    pub fn from_job_key(key: &str) -> Option<ResourceId> {
        let rest = key
            .strip_prefix(JOB_PREFIX)
            .or_else(|| key.strip_prefix(SCHEDULE_JOB_PREFIX))?;
        let mut parts = rest.splitn(3, "__");
        let kind: ResourceKind = parts.next()?.parse().ok()?;
        let name = parts.next()?;
        let variant = parts.next()?;
        Some(ResourceId::new(name, variant, kind))
    }
}

/// The lock sentinel key guarding a job key.
pub fn lock_key(job_key: &str) -> String {
    format!("{LOCK_PREFIX}{job_key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_key_round_trip() {
        let id = ResourceId::new("clicks", "v2", ResourceKind::Feature);
        let key = id.job_key();
        assert_eq!(key, "JOB__FEATURE__clicks__v2");
        assert_eq!(ResourceId::from_job_key(&key), Some(id));
    }

    #[test]
    fn test_schedule_job_key_round_trip() {
        let id = ResourceId::new("daily", "", ResourceKind::Source);
        let key = id.schedule_job_key();
        assert_eq!(key, "SCHEDULEJOB__SOURCE__daily__");
        assert_eq!(ResourceId::from_job_key(&key), Some(id));
    }

    #[test]
    fn test_from_job_key_rejects_garbage() {
        assert_eq!(ResourceId::from_job_key("JOB__NOPE__a__b"), None);
        assert_eq!(ResourceId::from_job_key("OTHER__SOURCE__a__b"), None);
        assert_eq!(ResourceId::from_job_key("JOB__SOURCE__missing_variant"), None);
    }

    #[test]
    fn test_empty_variant_key() {
        let nv = NameVariant::new("clicks", "");
        assert_eq!(nv.key(), "clicks.");
    }

    #[test]
    fn test_schedulable_kinds() {
        assert!(ResourceKind::Source.is_schedulable());
        assert!(ResourceKind::TrainingSet.is_schedulable());
        assert!(!ResourceKind::Provider.is_schedulable());
        assert!(!ResourceKind::User.is_schedulable());
    }

    #[test]
    fn test_lock_key_namespace() {
        let id = ResourceId::new("clicks", "v2", ResourceKind::Feature);
        let lock = lock_key(&id.job_key());
        assert_eq!(lock, "LOCK__JOB__FEATURE__clicks__v2");
        assert!(!lock.starts_with(JOB_PREFIX));
    }
}
