use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use terracheck::azure::{AzureClient, Credentials};
use terracheck::{scenarios, HarnessConfig, Terraform, VerificationRunner};

fn in_path(bin: &str) -> bool {
    Command::new("sh")
        .arg("-lc")
        .arg(format!("command -v {bin} >/dev/null 2>&1"))
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Live Azure VM Scenarios
///
/// Applies `infra/` three times (one per scenario) with unique labels and
/// isolated working copies, checks each VM against Azure, and destroys it.
///
/// Marked ignored because it creates billable resources and needs
/// Terraform plus `ARM_SUBSCRIPTION_ID` and Azure credentials.
#[tokio::test]
#[ignore]
async fn azure_vm_scenarios_pass_against_live_subscription() {
    if !in_path("terraform") {
        eprintln!("Skipping: terraform not available in PATH");
        return;
    }

    let mut config = HarnessConfig::default();
    config.apply_env();
    if config.subscription_id.is_empty() {
        eprintln!("Skipping: ARM_SUBSCRIPTION_ID is not set");
        return;
    }

    let workspace_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("crates/harness has a workspace root")
        .to_path_buf();
    config.terraform.dir = workspace_root.join("infra");
    config.terraform.isolate = true;
    config.unique_labels = true;
    config.validate().expect("valid config");

    let credentials = Credentials::from_env().expect("azure credentials");
    let cloud = AzureClient::new(&config.azure, config.subscription_id.clone(), credentials)
        .expect("build azure client");
    let terraform = Terraform::new("terraform")
        .env("ARM_SUBSCRIPTION_ID", config.subscription_id.clone());

    let runner = VerificationRunner::new(Arc::new(terraform), Arc::new(cloud));
    let suite = runner.run_suite(&scenarios::all(&config)).await;

    for result in &suite.results {
        assert!(
            result.passed,
            "{} failed: {:?} (warnings: {:?})",
            result.name, result.failure_reason, result.warnings
        );
    }
}
