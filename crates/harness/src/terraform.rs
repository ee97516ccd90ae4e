//! Terraform engine - init/apply, outputs and destroy via the terraform CLI

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{HarnessError, HarnessResult};
use crate::state::{render_value, ProvisionedState};

/// Lines of stderr kept in error messages
const STDERR_TAIL_LINES: usize = 20;

/// What a single terraform invocation operates on
#[derive(Debug, Clone, PartialEq)]
pub struct TerraformOptions {
    pub working_dir: PathBuf,
    pub vars: BTreeMap<String, Value>,
}

impl TerraformOptions {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            vars: BTreeMap::new(),
        }
    }

    /// `-var name=value` arguments, sorted by name
    pub fn var_args(&self) -> Vec<String> {
        self.vars
            .iter()
            .flat_map(|(name, value)| ["-var".to_string(), format_var(name, value)])
            .collect()
    }
}

/// The infrastructure-as-code engine the runner drives
#[async_trait]
pub trait IacEngine: Send + Sync {
    /// Initialise the module and apply it
    async fn init_and_apply(&self, options: &TerraformOptions) -> HarnessResult<()>;

    /// Read a single output
    async fn output(&self, options: &TerraformOptions, key: &str) -> HarnessResult<String>;

    /// Read every output
    async fn outputs(&self, options: &TerraformOptions) -> HarnessResult<ProvisionedState>;

    /// Destroy everything the module created
    async fn destroy(&self, options: &TerraformOptions) -> HarnessResult<()>;
}

/// Drives the terraform binary as a subprocess
#[derive(Debug, Clone)]
pub struct Terraform {
    binary: PathBuf,
    env: BTreeMap<String, String>,
}

impl Terraform {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            env: BTreeMap::new(),
        }
    }

    /// Forward an environment variable to every invocation
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn run(&self, working_dir: &Path, args: &[String]) -> HarnessResult<Output> {
        let command = args.first().map(String::as_str).unwrap_or_default();
        debug!(
            "Running {} {} in {}",
            self.binary.display(),
            args.join(" "),
            working_dir.display()
        );

        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(working_dir)
            .env("TF_IN_AUTOMATION", "1")
            .envs(&self.env)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                HarnessError::Engine(format!(
                    "failed to spawn {} {}: {}",
                    self.binary.display(),
                    command,
                    e
                ))
            })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!(target: "terraform", "{}", line);
        }

        Ok(output)
    }
}

#[async_trait]
impl IacEngine for Terraform {
    async fn init_and_apply(&self, options: &TerraformOptions) -> HarnessResult<()> {
        info!("terraform init in {}", options.working_dir.display());
        let init = self.run(&options.working_dir, &init_args()).await?;
        if !init.status.success() {
            return Err(HarnessError::Provision(failure_message("init", &init)));
        }

        info!("terraform apply in {}", options.working_dir.display());
        let apply = self.run(&options.working_dir, &apply_args(options)).await?;
        if !apply.status.success() {
            return Err(HarnessError::Provision(failure_message("apply", &apply)));
        }
        Ok(())
    }

    async fn output(&self, options: &TerraformOptions, key: &str) -> HarnessResult<String> {
        let args = output_args(Some(key));
        let output = self.run(&options.working_dir, &args).await?;
        if !output.status.success() {
            return Err(HarnessError::MissingOutput(format!(
                "{} ({})",
                key,
                failure_message("output", &output)
            )));
        }
        let value: Value = serde_json::from_slice(&output.stdout)?;
        Ok(render_value(&value))
    }

    async fn outputs(&self, options: &TerraformOptions) -> HarnessResult<ProvisionedState> {
        let output = self.run(&options.working_dir, &output_args(None)).await?;
        if !output.status.success() {
            return Err(HarnessError::Engine(failure_message("output", &output)));
        }
        ProvisionedState::from_output_json(&String::from_utf8_lossy(&output.stdout))
    }

    async fn destroy(&self, options: &TerraformOptions) -> HarnessResult<()> {
        info!("terraform destroy in {}", options.working_dir.display());
        let destroy = self.run(&options.working_dir, &destroy_args(options)).await?;
        if !destroy.status.success() {
            return Err(HarnessError::Destroy(failure_message("destroy", &destroy)));
        }
        Ok(())
    }
}

fn init_args() -> Vec<String> {
    ["init", "-input=false", "-no-color"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn apply_args(options: &TerraformOptions) -> Vec<String> {
    let mut args: Vec<String> = ["apply", "-input=false", "-auto-approve", "-no-color", "-lock=true"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.extend(options.var_args());
    args
}

fn destroy_args(options: &TerraformOptions) -> Vec<String> {
    let mut args: Vec<String> = ["destroy", "-input=false", "-auto-approve", "-no-color"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.extend(options.var_args());
    args
}

fn output_args(key: Option<&str>) -> Vec<String> {
    let mut args: Vec<String> = ["output", "-no-color", "-json"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    if let Some(key) = key {
        args.push(key.to_string());
    }
    args
}

/// Render one `-var` value; HCL accepts JSON literals for lists and maps
pub fn format_var(name: &str, value: &Value) -> String {
    format!("{}={}", name, render_value(value))
}

fn failure_message(command: &str, output: &Output) -> String {
    let code = output
        .status
        .code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
    if tail.is_empty() {
        format!("terraform {} exited with {}", command, code)
    } else {
        format!("terraform {} exited with {}: {}", command, code, tail)
    }
}
