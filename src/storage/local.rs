//! Local filesystem storage backend implementation.

use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{IoSnafu, StorageError};

use super::{BackendConfig, StorageProvider};

/// Local filesystem configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    pub path: String,
}

impl StorageProvider {
    pub(super) async fn construct_local(config: LocalConfig) -> Result<Self, StorageError> {
        // The prefix directory must exist before LocalFileSystem accepts it.
        std::fs::create_dir_all(&config.path).context(IoSnafu)?;

        let store = LocalFileSystem::new_with_prefix(&config.path)
            .map_err(|source| StorageError::ObjectStore { source })?;

        let canonical_url = format!("file://{}", config.path);

        let object_store: Arc<dyn ObjectStore> = Arc::new(store);

        Ok(Self {
            config: BackendConfig::Local(config),
            object_store,
            canonical_url,
            storage_options: HashMap::new(),
        })
    }
}
