//! Virtual machine scenarios
//!
//! Each scenario applies the same root module and checks one property of
//! the VM it creates against Azure.

use async_trait::async_trait;
use tracing::info;

use crate::assertions::{assert_contains, assert_equal, assert_true};
use crate::cloud::CloudQuery;
use crate::config::{HarnessConfig, ScenarioConfig};
use crate::error::{HarnessError, HarnessResult};
use crate::runner::Scenario;
use crate::state::ProvisionedState;

pub const OUTPUT_VM_NAME: &str = "vm_name";
pub const OUTPUT_RESOURCE_GROUP: &str = "resource_group_name";
pub const OUTPUT_IMAGE_VERSION: &str = "vm_image_version";
pub const OUTPUT_NIC_NAME: &str = "nic_name";

/// The VM named by `vm_name` exists in `resource_group_name`
pub struct VmExists {
    config: ScenarioConfig,
}

impl VmExists {
    pub const NAME: &'static str = "vm_exists";

    pub fn new(config: ScenarioConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Scenario for VmExists {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    async fn verify(&self, state: &ProvisionedState, cloud: &dyn CloudQuery) -> HarnessResult<()> {
        let vm = state.require(OUTPUT_VM_NAME)?;
        let rg = state.require(OUTPUT_RESOURCE_GROUP)?;

        let exists = cloud.vm_exists(vm, rg).await?;
        info!(scenario = Self::NAME, vm, rg, exists, "queried vm");
        assert_true(exists, || {
            format!("virtual machine {} does not exist in resource group {}", vm, rg)
        })
    }
}

/// The live VM runs the image version Terraform reported
pub struct VmImageVersion {
    config: ScenarioConfig,
}

impl VmImageVersion {
    pub const NAME: &'static str = "vm_image_version";

    pub fn new(config: ScenarioConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Scenario for VmImageVersion {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    async fn verify(&self, state: &ProvisionedState, cloud: &dyn CloudQuery) -> HarnessResult<()> {
        let vm = state.require(OUTPUT_VM_NAME)?;
        let rg = state.require(OUTPUT_RESOURCE_GROUP)?;
        let expected = state.require(OUTPUT_IMAGE_VERSION)?;

        let image = cloud.vm_image(vm, rg).await?;
        info!(scenario = Self::NAME, vm, version = %image.version, "queried vm image");
        assert_equal("vm image version", expected, image.version.as_str())
    }
}

/// The NIC named by `nic_name` is attached to the VM
pub struct NicAttached {
    config: ScenarioConfig,
}

impl NicAttached {
    pub const NAME: &'static str = "nic_attached";

    pub fn new(config: ScenarioConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Scenario for NicAttached {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    async fn verify(&self, state: &ProvisionedState, cloud: &dyn CloudQuery) -> HarnessResult<()> {
        let vm = state.require(OUTPUT_VM_NAME)?;
        let rg = state.require(OUTPUT_RESOURCE_GROUP)?;
        let nic = state.require(OUTPUT_NIC_NAME)?;

        let nics = cloud.vm_nics(vm, rg).await?;
        info!(scenario = Self::NAME, vm, count = nics.len(), "queried vm nics");
        assert_contains("nics attached to vm", &nics, &nic.to_string())
    }
}

/// Names of the built-in scenarios, in run order
pub const SCENARIO_NAMES: [&str; 3] = [VmExists::NAME, VmImageVersion::NAME, NicAttached::NAME];

/// Build every scenario; each one gets its own label when labels are unique
pub fn all(config: &HarnessConfig) -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(VmExists::new(config.scenario_config())),
        Box::new(VmImageVersion::new(config.scenario_config())),
        Box::new(NicAttached::new(config.scenario_config())),
    ]
}

/// Build the scenarios whose names are listed, in run order
pub fn select(config: &HarnessConfig, names: &[String]) -> HarnessResult<Vec<Box<dyn Scenario>>> {
    if let Some(unknown) = names.iter().find(|n| !SCENARIO_NAMES.contains(&n.as_str())) {
        return Err(HarnessError::Config(format!(
            "unknown scenario '{}' (expected one of: {})",
            unknown,
            SCENARIO_NAMES.join(", ")
        )));
    }
    Ok(all(config)
        .into_iter()
        .filter(|s| names.is_empty() || names.iter().any(|n| n == s.name()))
        .collect())
}
