//! Built-in runner implementations, one per runner kind.
//!
//! Each runner owns its serialized config schema; the coordinator encodes
//! the config and treats it as opaque bytes from then on.

pub mod copy;
pub mod materialize;
pub mod register_source;
pub mod training_set;
pub mod transformation;

use std::sync::Arc;

use featureline_core::Result;
use featureline_providers::{OnlineStore, ResourceRecord};

/// Write one chunk of materialized records to an online table.
pub(crate) async fn copy_records(
    online: &Arc<dyn OnlineStore>,
    name: &str,
    variant: &str,
    records: &[ResourceRecord],
) -> Result<()> {
    for record in records {
        online
            .set(name, variant, &record.entity, record.value.clone())
            .await?;
    }
    Ok(())
}
