//! Named worker handlers.

use std::{collections::BTreeMap, fmt, sync::Arc};

use snafu::prelude::*;

use crate::pool::{PoolResult, UnknownWorkerSnafu};
use crate::worker::{ColumnSeparationWorker, WorkerHandler};

/// Name of the handler that separates dataset columns into a cache.
pub const CREATE_DATASET_CACHE_WORKER: &str = "CREATE_DATASET_CACHE_WORKER";

type HandlerFactory = Arc<dyn Fn() -> Arc<dyn WorkerHandler> + Send + Sync>;

/// Maps worker names to handler factories.
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    factories: BTreeMap<String, HandlerFactory>,
}

impl fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl WorkerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in handlers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(CREATE_DATASET_CACHE_WORKER, || {
            Arc::new(ColumnSeparationWorker) as Arc<dyn WorkerHandler>
        });
        registry
    }

    /// Register (or replace) a handler factory.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn WorkerHandler> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Instantiate the handler registered under `name`.
    pub fn create(&self, name: &str) -> PoolResult<Arc<dyn WorkerHandler>> {
        let factory = self
            .factories
            .get(name)
            .context(UnknownWorkerSnafu { name })?;
        Ok(factory())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.factories.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolError;

    #[test]
    fn defaults_contain_the_cache_worker() {
        let registry = WorkerRegistry::with_defaults();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec![CREATE_DATASET_CACHE_WORKER]
        );
        assert!(registry.create(CREATE_DATASET_CACHE_WORKER).is_ok());
    }

    #[test]
    fn unknown_names_are_rejected() {
        let err = WorkerRegistry::new()
            .create("NOPE")
            .err()
            .expect("unknown worker");
        assert!(matches!(err, PoolError::UnknownWorker { ref name, .. } if name == "NOPE"));
    }
}
