//! terracheck CLI
//!
//! Runs the virtual machine scenarios against a Terraform root module and
//! live Azure. Exit code 0 means every scenario passed, 1 means at least one
//! failed, 2 means the harness could not start.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use terracheck::azure::{AzureClient, Credentials};
use terracheck::{scenarios, HarnessConfig, SuiteResult, Terraform, VerificationRunner};

#[derive(Parser, Debug)]
#[command(name = "terracheck")]
#[command(author, version, about = "Provision, verify and destroy Terraform-managed Azure VMs")]
struct Args {
    /// Path to a YAML config file
    #[arg(short, long, env = "TERRACHECK_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the Terraform root module
    #[arg(short = 'd', long)]
    terraform_dir: Option<PathBuf>,

    /// Path to the terraform binary
    #[arg(long)]
    terraform_bin: Option<PathBuf>,

    /// Azure subscription to query
    #[arg(long)]
    subscription_id: Option<String>,

    /// Prefix for resource names
    #[arg(long)]
    label_prefix: Option<String>,

    /// Give every scenario its own label suffix
    #[arg(long)]
    unique_labels: bool,

    /// Run each scenario from a private copy of the module
    #[arg(long)]
    isolate: bool,

    /// Run only these scenarios (repeatable)
    #[arg(short, long = "scenario")]
    scenarios: Vec<String>,

    /// List scenarios and exit
    #[arg(long)]
    list: bool,

    /// Output directory for results
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    if args.list {
        for name in scenarios::SCENARIO_NAMES {
            println!("{}", name);
        }
        return;
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(2);
        }
    };

    match rt.block_on(async_main(args)) {
        Ok(suite) if suite.success() => std::process::exit(0),
        Ok(_) => std::process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(2);
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<HarnessConfig> {
    let mut config = match &args.config {
        Some(path) => HarnessConfig::from_file(path)?,
        None => HarnessConfig::default(),
    };
    config.apply_env();

    if let Some(dir) = &args.terraform_dir {
        config.terraform.dir = dir.clone();
    }
    if let Some(bin) = &args.terraform_bin {
        config.terraform.binary = bin.clone();
    }
    if let Some(id) = &args.subscription_id {
        config.subscription_id = id.clone();
    }
    if let Some(prefix) = &args.label_prefix {
        config.label_prefix = prefix.clone();
    }
    if let Some(output) = &args.output {
        config.output_dir = output.clone();
    }
    config.unique_labels |= args.unique_labels;
    config.terraform.isolate |= args.isolate;

    config.validate()?;
    Ok(config)
}

async fn async_main(args: Args) -> anyhow::Result<SuiteResult> {
    let config = load_config(&args)?;
    let selected = scenarios::select(&config, &args.scenarios)?;

    let credentials = Credentials::from_env()?;
    let cloud = AzureClient::new(&config.azure, config.subscription_id.clone(), credentials)?;

    // the azurerm provider must target the same subscription we query
    let mut terraform = Terraform::new(&config.terraform.binary)
        .env("ARM_SUBSCRIPTION_ID", config.subscription_id.clone());
    for (key, value) in &config.terraform.env {
        terraform = terraform.env(key.clone(), value.clone());
    }

    info!(
        "Running against subscription {} with module {}",
        config.subscription_id,
        config.terraform.dir.display()
    );

    let runner = VerificationRunner::new(Arc::new(terraform), Arc::new(cloud));
    let suite = runner.run_suite(&selected).await;
    suite.write_json(&config.output_dir)?;

    Ok(suite)
}
