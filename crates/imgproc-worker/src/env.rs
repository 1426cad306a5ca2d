//! Execution environment handed to every task.

use std::sync::Arc;

use imgproc_media::{CliToolkit, MediaToolkit};
use imgproc_storage::{LocalStore, ObjectStore, S3Store};
use tracing::info;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;

/// Configuration plus the collaborators a task needs.
#[derive(Clone)]
pub struct ExecutionEnv {
    config: Arc<WorkerConfig>,
    toolkit: Arc<dyn MediaToolkit>,
    object_store: Option<Arc<dyn ObjectStore>>,
    local: LocalStore,
}

impl ExecutionEnv {
    pub fn new(config: WorkerConfig, toolkit: Arc<dyn MediaToolkit>) -> Self {
        Self {
            config: Arc::new(config),
            toolkit,
            object_store: None,
            local: LocalStore::new(),
        }
    }

    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    /// Command line toolkit, plus an S3 store when `S3_REGION` is set.
    pub fn from_config(config: WorkerConfig) -> WorkerResult<Self> {
        let toolkit = Arc::new(CliToolkit::new(&config.av1_encoder, &config.av1_decoder));
        let mut env = Self::new(config, toolkit);
        if let Some(store) = S3Store::from_env()? {
            info!("Object storage enabled");
            env = env.with_object_store(Arc::new(store));
        }
        Ok(env)
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn toolkit(&self) -> Arc<dyn MediaToolkit> {
        self.toolkit.clone()
    }

    pub fn object_store(&self) -> Option<Arc<dyn ObjectStore>> {
        self.object_store.clone()
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }
}
