//! Runner factory registry.
//!
//! Spawners select runner behavior by kind name, so the mapping from name
//! to factory has to live somewhere explicit. Registries are plain values:
//! the daemon builds one at startup and tests scope their own, so no
//! registration leaks between them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use featureline_core::spawner::{Runner, RunnerKind};
use featureline_core::{Error, ResourceId, Result};

use crate::runners;

/// Builds a runner from its serialized config and target resource.
pub type RunnerFactory = Arc<dyn Fn(&[u8], ResourceId) -> Result<Box<dyn Runner>> + Send + Sync>;

/// A scoped kind-to-factory mapping. Lookups are concurrent; registration
/// takes the write lock.
pub struct RunnerRegistry {
    factories: RwLock<HashMap<String, RunnerFactory>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Register a factory under a kind name. Registering a name twice
    /// fails.
    pub fn register(&self, kind: &str, factory: RunnerFactory) -> Result<()> {
        let mut factories = self
            .factories
            .write()
            .map_err(|_| Error::Internal("runner registry poisoned".to_string()))?;
        if factories.contains_key(kind) {
            return Err(Error::RunnerAlreadyRegistered(kind.to_string()));
        }
        factories.insert(kind.to_string(), factory);
        Ok(())
    }

    /// Remove a registration, reporting whether it existed.
    pub fn unregister(&self, kind: &str) -> bool {
        self.factories
            .write()
            .map(|mut factories| factories.remove(kind).is_some())
            .unwrap_or(false)
    }

    /// Build a runner for `kind`, or fail with `UnknownRunner`.
    pub fn create(&self, kind: &str, config: &[u8], resource: ResourceId) -> Result<Box<dyn Runner>> {
        let factory = {
            let factories = self
                .factories
                .read()
                .map_err(|_| Error::Internal("runner registry poisoned".to_string()))?;
            factories
                .get(kind)
                .cloned()
                .ok_or_else(|| Error::UnknownRunner(kind.to_string()))?
        };
        factory(config, resource)
    }
}

impl Default for RunnerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A registry with every built-in runner kind registered.
pub fn built_in_registry() -> Result<RunnerRegistry> {
    let registry = RunnerRegistry::new();
    registry.register(
        RunnerKind::RegisterSource.as_str(),
        runners::register_source::factory(),
    )?;
    registry.register(
        RunnerKind::CreateTransformation.as_str(),
        runners::transformation::factory(),
    )?;
    registry.register(
        RunnerKind::Materialize.as_str(),
        runners::materialize::factory(),
    )?;
    registry.register(RunnerKind::CopyToOnline.as_str(), runners::copy::factory())?;
    registry.register(
        RunnerKind::CreateTrainingSet.as_str(),
        runners::training_set::factory(),
    )?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use featureline_core::ResourceKind;

    #[test]
    fn test_unknown_runner() {
        let registry = RunnerRegistry::new();
        let resource = ResourceId::new("r", "", ResourceKind::Source);
        let err = registry.create("ghost_job", b"{}", resource).err().unwrap();
        assert!(matches!(err, Error::UnknownRunner(name) if name == "ghost_job"));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = built_in_registry().unwrap();
        let err = registry
            .register(
                RunnerKind::Materialize.as_str(),
                runners::materialize::factory(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::RunnerAlreadyRegistered(_)));
    }

    #[test]
    fn test_unregister_scopes_registrations() {
        let registry = built_in_registry().unwrap();
        assert!(registry.unregister(RunnerKind::Materialize.as_str()));
        assert!(!registry.unregister(RunnerKind::Materialize.as_str()));
        let resource = ResourceId::new("r", "", ResourceKind::Feature);
        let err = registry
            .create(RunnerKind::Materialize.as_str(), b"{}", resource)
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnknownRunner(_)));
    }
}
