//! Verification runner - provision, verify, and always tear down

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::cloud::CloudQuery;
use crate::config::ScenarioConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::state::ProvisionedState;
use crate::terraform::{IacEngine, TerraformOptions};
use crate::workdir::WorkDir;

/// A provisioning input plus the checks to run once it is live
#[async_trait]
pub trait Scenario: Send + Sync {
    fn name(&self) -> &str;

    fn config(&self) -> &ScenarioConfig;

    /// Check live state; any error fails the scenario
    async fn verify(&self, state: &ProvisionedState, cloud: &dyn CloudQuery) -> HarnessResult<()>;
}

/// Where a scenario is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioPhase {
    NotStarted,
    Provisioned,
    Verified,
    AssertionFailed,
    Deprovisioned,
    ProvisionFailed,
}

impl ScenarioPhase {
    /// Transitions only move forward
    pub fn can_advance_to(self, next: ScenarioPhase) -> bool {
        use ScenarioPhase::*;
        matches!(
            (self, next),
            (NotStarted, Provisioned)
                | (NotStarted, ProvisionFailed)
                | (Provisioned, Verified)
                | (Provisioned, AssertionFailed)
                | (Verified, Deprovisioned)
                | (AssertionFailed, Deprovisioned)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ScenarioPhase::Deprovisioned | ScenarioPhase::ProvisionFailed)
    }
}

/// Outcome of a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub passed: bool,
    pub phase: ScenarioPhase,
    /// First provisioning, query or assertion failure
    pub failure_reason: Option<String>,
    /// Secondary problems such as a failed destroy
    pub warnings: Vec<String>,
    pub duration_ms: u64,
}

/// Outcome of a list of scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<ScenarioResult>,
}

impl SuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    /// Write the results as pretty JSON into `dir`
    pub fn write_json(&self, dir: &Path) -> HarnessResult<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let path = dir.join("terracheck-results.json");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

/// Accumulates the lifecycle of one scenario
struct ScenarioReport {
    name: String,
    phase: ScenarioPhase,
    failure_reason: Option<String>,
    warnings: Vec<String>,
}

impl ScenarioReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            phase: ScenarioPhase::NotStarted,
            failure_reason: None,
            warnings: Vec::new(),
        }
    }

    fn advance(&mut self, next: ScenarioPhase) {
        if self.phase.can_advance_to(next) {
            info!(scenario = %self.name, from = ?self.phase, to = ?next, "phase");
            self.phase = next;
        } else {
            error!(scenario = %self.name, from = ?self.phase, to = ?next, "ignoring backward phase transition");
        }
    }

    fn fail(&mut self, next: ScenarioPhase, err: &HarnessError) {
        // the first failure stays primary
        if self.failure_reason.is_none() {
            self.failure_reason = Some(err.to_string());
        }
        self.advance(next);
    }

    fn warn(&mut self, message: String) {
        warn!(scenario = %self.name, "{}", message);
        self.warnings.push(message);
    }

    fn finish(self, start: Instant) -> ScenarioResult {
        debug_assert!(
            self.phase.is_terminal(),
            "scenario {} finished in {:?}",
            self.name,
            self.phase
        );
        ScenarioResult {
            passed: self.failure_reason.is_none() && self.phase == ScenarioPhase::Deprovisioned,
            name: self.name,
            phase: self.phase,
            failure_reason: self.failure_reason,
            warnings: self.warnings,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

/// Owns the working directory between apply and destroy
///
/// If the scenario is dropped before teardown finishes, the directory and
/// its terraform state are kept so the resources can be destroyed by hand.
struct TeardownGuard {
    scenario: String,
    workdir: WorkDir,
    armed: bool,
}

impl TeardownGuard {
    fn arm(scenario: &str, workdir: WorkDir) -> Self {
        Self {
            scenario: scenario.to_string(),
            workdir,
            armed: true,
        }
    }

    fn path(&self) -> &Path {
        self.workdir.path()
    }

    /// Keep the directory past the end of the scenario
    fn keep(&mut self) -> PathBuf {
        self.workdir.persist()
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        if self.armed {
            let kept = self.keep();
            error!(
                scenario = %self.scenario,
                "scenario cancelled before teardown; resources may be orphaned, terraform state kept in {}",
                kept.display()
            );
        }
    }
}

/// Runs scenarios against an engine and a cloud
pub struct VerificationRunner {
    engine: Arc<dyn IacEngine>,
    cloud: Arc<dyn CloudQuery>,
}

impl VerificationRunner {
    pub fn new(engine: Arc<dyn IacEngine>, cloud: Arc<dyn CloudQuery>) -> Self {
        Self { engine, cloud }
    }

    /// Run one scenario to completion
    ///
    /// Once apply has been attempted, destroy is attempted exactly once,
    /// whether verification passes, fails, or panics.
    pub async fn run_scenario(&self, scenario: &dyn Scenario) -> ScenarioResult {
        let start = Instant::now();
        let mut report = ScenarioReport::new(scenario.name());
        let config = scenario.config();

        let workdir = match prepare_workdir(config) {
            Ok(workdir) => workdir,
            Err(e) => {
                error!(scenario = %scenario.name(), "{}", e);
                report.fail(ScenarioPhase::ProvisionFailed, &e);
                return report.finish(start);
            }
        };

        let mut guard = TeardownGuard::arm(scenario.name(), workdir);

        let options = TerraformOptions {
            working_dir: guard.path().to_path_buf(),
            vars: config.vars.clone(),
        };

        match self.engine.init_and_apply(&options).await {
            Ok(()) => {
                report.advance(ScenarioPhase::Provisioned);
                match self.verify(scenario, &options).await {
                    Ok(()) => report.advance(ScenarioPhase::Verified),
                    Err(e) => {
                        error!(scenario = %scenario.name(), "{}", e);
                        report.fail(ScenarioPhase::AssertionFailed, &e);
                    }
                }
            }
            Err(e) => {
                error!(scenario = %scenario.name(), "{}", e);
                report.fail(ScenarioPhase::ProvisionFailed, &e);
            }
        }

        // partial resources may exist even when apply failed
        if let Err(e) = self.engine.destroy(&options).await {
            let kept = guard.keep();
            report.warn(format!("{}; terraform state kept in {}", e, kept.display()));
        }
        guard.disarm();

        if report.phase != ScenarioPhase::ProvisionFailed {
            report.advance(ScenarioPhase::Deprovisioned);
        }
        drop(guard);

        report.finish(start)
    }

    async fn verify(&self, scenario: &dyn Scenario, options: &TerraformOptions) -> HarnessResult<()> {
        let checks = async {
            let state = self.engine.outputs(options).await?;
            scenario.verify(&state, self.cloud.as_ref()).await
        };

        match AssertUnwindSafe(checks).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(HarnessError::Assertion(format!(
                "verification panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }

    /// Run scenarios one after another
    pub async fn run_suite(&self, scenarios: &[Box<dyn Scenario>]) -> SuiteResult {
        let start = Instant::now();
        let mut results = Vec::with_capacity(scenarios.len());
        let mut passed = 0;
        let mut failed = 0;

        info!("Running {} scenario(s)...", scenarios.len());

        for scenario in scenarios {
            let result = self.run_scenario(scenario.as_ref()).await;
            if result.passed {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.failure_reason.as_deref().unwrap_or("unknown error")
                );
            }
            for warning in &result.warnings {
                warn!("  {} warning: {}", result.name, warning);
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Scenario results: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );

        SuiteResult {
            total: scenarios.len(),
            passed,
            failed,
            duration_ms,
            finished_at: Utc::now(),
            results,
        }
    }
}

fn prepare_workdir(config: &ScenarioConfig) -> HarnessResult<WorkDir> {
    if config.isolate {
        WorkDir::isolated(&config.terraform_dir)
    } else {
        WorkDir::in_place(&config.terraform_dir)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
