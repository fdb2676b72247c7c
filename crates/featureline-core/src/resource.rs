//! The resource model shared with the metadata service.
//!
//! The coordinator reads these definitions but never authors them; the
//! metadata service owns the schema. Only the fields the coordinator's
//! workflows consume are modeled here.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::ids::{NameVariant, ResourceId, ResourceKind};

/// Lifecycle state observable on a resource.
///
/// Transitions are monotone except `Failed -> Pending` on re-enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum ResourceStatus {
    #[display("CREATED")]
    Created,
    #[display("PENDING")]
    Pending,
    #[display("READY")]
    Ready,
    #[display("FAILED")]
    Failed,
}

/// Column mapping for a feature or label over its source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceColumns {
    pub entity: String,
    pub value: String,
    pub ts: String,
}

/// How a source resource is backed: an external table registered as-is, or
/// a SQL transformation over other sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceDefinition {
    Primary {
        /// Name of the backing table in the offline provider.
        table: String,
    },
    Transformation {
        /// SQL template with `{{name.variant}}` placeholders.
        query: String,
        /// Declared upstream sources, in positional order.
        sources: Vec<NameVariant>,
    },
}

impl SourceDefinition {
    pub fn is_transformation(&self) -> bool {
        matches!(self, SourceDefinition::Transformation { .. })
    }
}

/// A source variant as read from metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceVariant {
    pub name: String,
    pub variant: String,
    pub provider: String,
    pub definition: SourceDefinition,
    pub schedule: Option<String>,
    pub status: ResourceStatus,
}

impl SourceVariant {
    pub fn resource_id(&self) -> ResourceId {
        ResourceId::new(self.name.clone(), self.variant.clone(), ResourceKind::Source)
    }
}

/// A feature variant: offline source column mapping plus an online
/// destination provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureVariant {
    pub name: String,
    pub variant: String,
    pub source: NameVariant,
    pub entity: String,
    /// Destination provider; must resolve to an online store.
    pub provider: String,
    pub columns: ResourceColumns,
    pub schedule: Option<String>,
    pub status: ResourceStatus,
}

impl FeatureVariant {
    pub fn resource_id(&self) -> ResourceId {
        ResourceId::new(
            self.name.clone(),
            self.variant.clone(),
            ResourceKind::Feature,
        )
    }
}

/// A label variant. Mirrors the offline side of a feature; labels are never
/// pushed online.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelVariant {
    pub name: String,
    pub variant: String,
    pub source: NameVariant,
    pub entity: String,
    /// Provider holding the label table; must resolve to an offline store.
    pub provider: String,
    pub columns: ResourceColumns,
    pub status: ResourceStatus,
}

impl LabelVariant {
    pub fn resource_id(&self) -> ResourceId {
        ResourceId::new(self.name.clone(), self.variant.clone(), ResourceKind::Label)
    }
}

/// A training set variant: one label joined with N ordered features, all on
/// the same offline provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSetVariant {
    pub name: String,
    pub variant: String,
    pub provider: String,
    pub label: NameVariant,
    pub features: Vec<NameVariant>,
    pub schedule: Option<String>,
    pub status: ResourceStatus,
}

impl TrainingSetVariant {
    pub fn resource_id(&self) -> ResourceId {
        ResourceId::new(
            self.name.clone(),
            self.variant.clone(),
            ResourceKind::TrainingSet,
        )
    }
}

/// A provider entry: an opaque driver type tag plus its serialized config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub name: String,
    pub provider_type: String,
    pub config: Vec<u8>,
}
