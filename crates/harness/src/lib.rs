//! terracheck - Terraform provision/verify/destroy harness
//!
//! This crate drives a Terraform root module through one scenario at a time:
//! - Copies the module into an isolated working directory (optional)
//! - Runs `terraform init` and `terraform apply` with the scenario's variables
//! - Reads outputs and checks them against live Azure Resource Manager state
//! - Always runs `terraform destroy`, whatever the verification outcome
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  VerificationRunner                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  run_scenario(scenario) -> ScenarioResult                   │
//! │    ├── IacEngine::init_and_apply(options)     [Provisioned] │
//! │    ├── IacEngine::outputs(options) -> ProvisionedState      │
//! │    ├── Scenario::verify(state, cloud)  [Verified | Failed]  │
//! │    └── IacEngine::destroy(options)          [Deprovisioned] │
//! ├─────────────────────────────────────────────────────────────┤
//! │  IacEngine   → Terraform (terraform CLI subprocess)         │
//! │  CloudQuery  → AzureClient (ARM REST) | InMemoryCloud       │
//! │  Scenario    → VmExists, VmImageVersion, NicAttached        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod assertions;
pub mod azure;
pub mod cloud;
pub mod config;
pub mod error;
pub mod runner;
pub mod scenarios;
pub mod state;
pub mod terraform;
pub mod workdir;

pub use cloud::{CloudQuery, VmImage};
pub use config::{HarnessConfig, ScenarioConfig};
pub use error::{HarnessError, HarnessResult, QueryError};
pub use runner::{Scenario, ScenarioPhase, ScenarioResult, SuiteResult, VerificationRunner};
pub use state::ProvisionedState;
pub use terraform::{IacEngine, Terraform, TerraformOptions};
