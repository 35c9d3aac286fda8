//! Connector lookup by storage kind, injected into the server at startup.

use crate::config::CloudConfig;
use crate::dropbox::Dropbox;
use crate::error::{CloudError, CloudResult};
use crate::google::GoogleDrive;
use crate::microsoft::OneDrive;
use crate::storage::CloudStorage;
use std::collections::HashMap;
use std::sync::Arc;
use syncserver_types::CloudStorageType;

#[derive(Clone, Default)]
pub struct CloudStorageRegistry {
    connectors: HashMap<CloudStorageType, Arc<dyn CloudStorage>>,
}

impl CloudStorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the three HTTP connectors built from `config`.
    pub fn with_providers(config: &CloudConfig) -> CloudResult<Self> {
        config.validate()?;
        let mut registry = Self::new();
        registry.register(Arc::new(GoogleDrive::new(config)?));
        registry.register(Arc::new(Dropbox::new(config)?));
        registry.register(Arc::new(OneDrive::new(config)?));
        Ok(registry)
    }

    /// Registers under the connector's own storage type, replacing any previous one.
    pub fn register(&mut self, connector: Arc<dyn CloudStorage>) {
        self.connectors.insert(connector.storage_type(), connector);
    }

    pub fn get(&self, storage_type: CloudStorageType) -> CloudResult<Arc<dyn CloudStorage>> {
        self.connectors
            .get(&storage_type)
            .cloned()
            .ok_or(CloudError::UnsupportedStorage(storage_type))
    }

    pub fn contains(&self, storage_type: CloudStorageType) -> bool {
        self.connectors.contains_key(&storage_type)
    }
}
