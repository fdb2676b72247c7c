//! Provider capability objects for the Featureline coordinator.
//!
//! Providers are external data engines. The coordinator and its runners only
//! see them through the [`OfflineStore`] and [`OnlineStore`] traits; drivers
//! for real warehouses plug in behind [`get_provider`]. This crate ships
//! memory-backed stores that satisfy the full contract, used by tests and by
//! the single-process deployment mode.

pub mod memory;
pub mod offline;
pub mod online;
pub mod resolve;

use serde::{Deserialize, Serialize};

use featureline_core::resource::{SourceDefinition, SourceVariant};
use featureline_core::ResourceId;

pub use memory::{MemoryOfflineStore, MemoryOnlineStore, TableQuoting};
pub use offline::{OfflineStore, ResourceRecord, TrainingSetRow, TrainingSetSpec};
pub use online::OnlineStore;
pub use resolve::{get_provider, Provider, ProviderConfig};

/// One resolved template placeholder: the form substituted into the query
/// and the raw table it came from. Downstream runners address these
/// positionally (`source_0`, `source_1`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMapping {
    pub template: String,
    pub source: String,
}

/// Quote an identifier the generic offline way: double quotes, inner quotes
/// doubled.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Name of the table a registered primary source is exposed as.
pub fn primary_table_name(id: &ResourceId) -> String {
    format!("featureline_primary__{}__{}", id.name, id.variant)
}

/// Name of the table a transformation's output lands in.
pub fn transformation_table_name(id: &ResourceId) -> String {
    format!("featureline_transformation__{}__{}", id.name, id.variant)
}

/// Name of the offline resource table backing a feature or label.
pub fn resource_table_name(id: &ResourceId) -> String {
    format!(
        "featureline_resource__{}__{}__{}",
        id.kind, id.name, id.variant
    )
}

/// The backing table a ready source exposes, by definition kind.
pub fn backing_table_name(source: &SourceVariant) -> String {
    let id = source.resource_id();
    match source.definition {
        SourceDefinition::Primary { .. } => primary_table_name(&id),
        SourceDefinition::Transformation { .. } => transformation_table_name(&id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use featureline_core::ResourceKind;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("tableA"), "\"tableA\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_table_names_embed_kind_and_variant() {
        let id = ResourceId::new("clicks", "v1", ResourceKind::Feature);
        assert_eq!(
            resource_table_name(&id),
            "featureline_resource__FEATURE__clicks__v1"
        );
    }
}
