//! Read-only queries against live cloud state
//!
//! The runner only needs three facts about a virtual machine: whether it
//! exists, which image it was built from and which NICs it carries.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Marketplace image a virtual machine was created from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmImage {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
    /// Resolved version when `version` is `latest`
    pub exact_version: Option<String>,
}

/// Cloud provider query interface
#[async_trait]
pub trait CloudQuery: Send + Sync {
    /// Whether the VM exists in the resource group
    async fn vm_exists(&self, vm_name: &str, resource_group: &str) -> Result<bool, QueryError>;

    /// Image reference bound to the VM
    async fn vm_image(&self, vm_name: &str, resource_group: &str) -> Result<VmImage, QueryError>;

    /// Names of the network interfaces attached to the VM
    async fn vm_nics(&self, vm_name: &str, resource_group: &str)
        -> Result<Vec<String>, QueryError>;
}

/// A virtual machine held by [`InMemoryCloud`]
#[derive(Debug, Clone)]
pub struct VmRecord {
    pub image: VmImage,
    pub nics: Vec<String>,
}

/// In-memory cloud for testing and dry runs
#[derive(Default)]
pub struct InMemoryCloud {
    vms: RwLock<HashMap<(String, String), VmRecord>>,
    auth_failure: Option<String>,
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cloud that rejects every query with an auth error
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self {
            vms: RwLock::new(HashMap::new()),
            auth_failure: Some(reason.into()),
        }
    }

    pub fn insert_vm(&self, resource_group: &str, vm_name: &str, record: VmRecord) {
        let mut vms = self.vms.write().unwrap_or_else(|e| e.into_inner());
        vms.insert((resource_group.to_string(), vm_name.to_string()), record);
    }

    pub fn remove_vm(&self, resource_group: &str, vm_name: &str) {
        let mut vms = self.vms.write().unwrap_or_else(|e| e.into_inner());
        vms.remove(&(resource_group.to_string(), vm_name.to_string()));
    }

    fn lookup(&self, vm_name: &str, resource_group: &str) -> Result<VmRecord, QueryError> {
        if let Some(reason) = &self.auth_failure {
            return Err(QueryError::Auth(reason.clone()));
        }
        let vms = self.vms.read().unwrap_or_else(|e| e.into_inner());
        vms.get(&(resource_group.to_string(), vm_name.to_string()))
            .cloned()
            .ok_or_else(|| {
                QueryError::NotFound(format!(
                    "virtual machine {} in resource group {}",
                    vm_name, resource_group
                ))
            })
    }
}

#[async_trait]
impl CloudQuery for InMemoryCloud {
    async fn vm_exists(&self, vm_name: &str, resource_group: &str) -> Result<bool, QueryError> {
        match self.lookup(vm_name, resource_group) {
            Ok(_) => Ok(true),
            Err(QueryError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn vm_image(&self, vm_name: &str, resource_group: &str) -> Result<VmImage, QueryError> {
        Ok(self.lookup(vm_name, resource_group)?.image)
    }

    async fn vm_nics(
        &self,
        vm_name: &str,
        resource_group: &str,
    ) -> Result<Vec<String>, QueryError> {
        Ok(self.lookup(vm_name, resource_group)?.nics)
    }
}
