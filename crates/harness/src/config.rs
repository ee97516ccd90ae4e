//! Harness and scenario configuration

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HarnessError, HarnessResult};

/// Terraform variable that carries the resource name prefix
pub const LABEL_PREFIX_VAR: &str = "labelPrefix";

/// Top-level configuration, injected into every scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Azure subscription that scopes every query
    pub subscription_id: String,

    /// Prefix applied to all resource names created by the scenarios
    pub label_prefix: String,

    /// Append a random suffix to the prefix for each scenario
    pub unique_labels: bool,

    /// Terraform configuration
    pub terraform: TerraformConfig,

    /// Azure Resource Manager configuration
    pub azure: AzureConfig,

    /// Directory for the JSON results report
    pub output_dir: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            subscription_id: String::new(),
            label_prefix: "shet0028".to_string(),
            unique_labels: false,
            terraform: TerraformConfig::default(),
            azure: AzureConfig::default(),
            output_dir: PathBuf::from("test-results"),
        }
    }
}

/// Terraform engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerraformConfig {
    /// Path to the terraform binary
    pub binary: PathBuf,

    /// Directory holding the root module
    pub dir: PathBuf,

    /// Copy the module into a temp dir per scenario
    pub isolate: bool,

    /// Extra variables passed to every apply and destroy
    pub vars: BTreeMap<String, Value>,

    /// Extra environment for the terraform process
    pub env: BTreeMap<String, String>,
}

impl Default for TerraformConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("terraform"),
            dir: PathBuf::from("infra"),
            isolate: false,
            vars: BTreeMap::new(),
            env: BTreeMap::new(),
        }
    }
}

/// Azure Resource Manager endpoints and client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureConfig {
    pub management_endpoint: String,
    pub authority_host: String,
    pub compute_api_version: String,
    pub request_timeout_secs: u64,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            management_endpoint: "https://management.azure.com".to_string(),
            authority_host: "https://login.microsoftonline.com".to_string(),
            compute_api_version: "2023-03-01".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl HarnessConfig {
    /// Parse a configuration from YAML
    pub fn from_yaml(yaml: &str) -> HarnessResult<Self> {
        serde_yaml::from_str(yaml).map_err(HarnessError::from)
    }

    /// Parse a configuration from a YAML file
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("ARM_SUBSCRIPTION_ID").filter(|v| !v.is_empty()) {
            self.subscription_id = id;
        }
        if let Some(prefix) = lookup("TERRACHECK_LABEL_PREFIX").filter(|v| !v.is_empty()) {
            self.label_prefix = prefix;
        }
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.subscription_id.trim().is_empty() {
            return Err(HarnessError::Config(
                "subscription_id is required (set it in the config file or ARM_SUBSCRIPTION_ID)"
                    .to_string(),
            ));
        }
        if self.label_prefix.is_empty() {
            return Err(HarnessError::Config("label_prefix must not be empty".to_string()));
        }
        if !self
            .label_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(HarnessError::Config(format!(
                "label_prefix '{}' may only contain ASCII letters, digits and '-'",
                self.label_prefix
            )));
        }
        if self.azure.request_timeout_secs == 0 {
            return Err(HarnessError::Config(
                "azure.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Label for a single scenario run
    pub fn scenario_label(&self) -> String {
        if self.unique_labels {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            format!("{}{}", self.label_prefix, &suffix[..6])
        } else {
            self.label_prefix.clone()
        }
    }

    /// Build the provisioning inputs for one scenario
    pub fn scenario_config(&self) -> ScenarioConfig {
        let mut config = ScenarioConfig::new(&self.terraform.dir).isolated(self.terraform.isolate);
        for (name, value) in &self.terraform.vars {
            config = config.var(name.clone(), value.clone());
        }
        config.var(LABEL_PREFIX_VAR, self.scenario_label())
    }
}

/// Provisioning inputs for a single scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Root module to apply
    pub terraform_dir: PathBuf,

    /// Variable overrides
    #[serde(default)]
    pub vars: BTreeMap<String, Value>,

    /// Run from a private copy of the module
    #[serde(default)]
    pub isolate: bool,
}

impl ScenarioConfig {
    pub fn new(terraform_dir: impl Into<PathBuf>) -> Self {
        Self {
            terraform_dir: terraform_dir.into(),
            vars: BTreeMap::new(),
            isolate: false,
        }
    }

    pub fn var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn isolated(mut self, isolate: bool) -> Self {
        self.isolate = isolate;
        self
    }
}
