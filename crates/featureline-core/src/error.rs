//! Error taxonomy for the Featureline coordinator.

use thiserror::Error;

use crate::ids::{NameVariant, ResourceId};

#[derive(Debug, Error)]
pub enum Error {
    /// The spawner received a runner kind it has no factory for.
    #[error("unknown runner: {0}")]
    UnknownRunner(String),

    /// A runner factory name was registered twice.
    #[error("runner factory already registered: {0}")]
    RunnerAlreadyRegistered(String),

    /// The metadata service has no resource with this id.
    #[error("unknown resource: {0}")]
    UnknownResource(ResourceId),

    /// The resource exists but is ill-formed for its workflow.
    #[error("invalid resource: {0}")]
    InvalidResource(String),

    /// A provider was resolved to the wrong capability.
    #[error("provider {name} is {actual}, {expected} required")]
    ProviderKindMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// The provider entry names a type no driver is available for.
    #[error("unsupported provider type: {0}")]
    UnsupportedProvider(String),

    /// A referenced upstream artifact does not exist in the provider.
    #[error("upstream missing: {0}")]
    UpstreamMissing(String),

    /// A declared dependency has not reached the ready state yet.
    #[error("upstream not ready: {0}")]
    UpstreamNotReady(NameVariant),

    /// A template placeholder has no entry in the replacements map.
    #[error("unresolved template key: {0}")]
    UnresolvedTemplateKey(String),

    /// The destination already holds the artifact this job would create.
    #[error("already materialized: {0}")]
    AlreadyMaterialized(ResourceId),

    /// A spawned runner reported a non-successful completion.
    #[error("runner failure: {0}")]
    RunnerFailure(String),

    /// A job-store operation failed at the transport level.
    #[error("store: {0}")]
    Store(String),

    /// A metadata RPC failed at the transport level.
    #[error("metadata: {0}")]
    Metadata(String),

    /// Config or record bytes could not be encoded or decoded.
    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),

    /// An error the scheduler should retry rather than treat as final.
    #[error("transient: {0}")]
    Transient(#[source] Box<Error>),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap into the transient class. Already-transient errors pass through.
    pub fn transient(self) -> Self {
        match self {
            Error::Transient(_) => self,
            other => Error::Transient(Box::new(other)),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_) | Error::UpstreamNotReady(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ResourceKind;

    #[test]
    fn test_transient_wrap_is_idempotent() {
        let err = Error::RunnerFailure("exit 1".to_string()).transient();
        assert!(err.is_transient());
        let rewrapped = err.transient();
        match rewrapped {
            Error::Transient(inner) => assert!(matches!(*inner, Error::RunnerFailure(_))),
            other => panic!("expected transient, got {other}"),
        }
    }

    #[test]
    fn test_mismatch_message_names_provider() {
        let err = Error::ProviderKindMismatch {
            name: "cache".to_string(),
            expected: "offline store".to_string(),
            actual: "online store".to_string(),
        };
        assert!(err.to_string().contains("cache"));
        assert!(err.to_string().contains("offline store"));
    }

    #[test]
    fn test_unknown_resource_display() {
        let err = Error::UnknownResource(ResourceId::new("f", "v", ResourceKind::Feature));
        assert_eq!(err.to_string(), "unknown resource: FEATURE f.v");
    }
}
