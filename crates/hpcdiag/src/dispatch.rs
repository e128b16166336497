//! Dispatcher
//!
//! Resolves the requested run mode (or a quick-query shortcut) to module
//! invocations. `All` runs the checks in `ALL_SEQUENCE` order; each module is
//! isolated by `run_module`, so one failing or panicking module never stops
//! the ones after it.

use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::Adapters;
use crate::checks::{builtin_modules, run_module, CheckContext, CheckModule, Confirmer, ModuleOutcome};
use crate::error::{DiagError, RegistryError};
use crate::mode::{RunMode, ALL_SEQUENCE};
use crate::registry::RunModeRegistry;
use crate::report::Reporter;
use crate::settings::Settings;
use crate::target::{ProbeTarget, VerbosityMode};

/// One invocation as assembled from the command line
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Raw mode name; `None` lets the quick-query shortcuts decide
    pub mode: Option<String>,
    pub target: ProbeTarget,
    pub verbosity: VerbosityMode,
    /// Mirror the session to this file
    pub report_file: Option<PathBuf>,
}

impl DispatchRequest {
    pub fn new(mode: Option<String>, target: ProbeTarget) -> Self {
        Self {
            mode,
            target,
            verbosity: VerbosityMode::default(),
            report_file: None,
        }
    }

    pub fn with_verbosity(mut self, verbosity: VerbosityMode) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_report_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_file = Some(path.into());
        self
    }
}

/// Module outcomes of one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub outcomes: Vec<(RunMode, ModuleOutcome)>,
}

impl RunSummary {
    pub fn count(&self, predicate: impl Fn(&ModuleOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| predicate(o)).count()
    }

    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, ModuleOutcome::Completed | ModuleOutcome::TipsRendered))
    }

    pub fn failed(&self) -> usize {
        self.count(ModuleOutcome::is_failure)
    }

    pub fn degraded(&self) -> usize {
        self.count(|o| matches!(o, ModuleOutcome::Degraded(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ModuleOutcome::Skipped))
    }

    pub fn modes(&self) -> Vec<RunMode> {
        self.outcomes.iter().map(|(m, _)| *m).collect()
    }
}

/// Process exit code for a dispatch result
pub fn exit_code(result: &Result<RunSummary, DiagError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.exit_code(),
    }
}

pub struct Dispatcher {
    registry: RunModeRegistry,
    modules: Vec<Box<dyn CheckModule>>,
    adapters: Adapters,
    settings: Settings,
}

impl Dispatcher {
    /// Verifies the module set against the built-in registry
    pub fn new(
        modules: Vec<Box<dyn CheckModule>>,
        adapters: Adapters,
        settings: Settings,
    ) -> Result<Self, RegistryError> {
        Self::with_registry(RunModeRegistry::builtin(), modules, adapters, settings)
    }

    pub fn with_registry(
        registry: RunModeRegistry,
        modules: Vec<Box<dyn CheckModule>>,
        adapters: Adapters,
        settings: Settings,
    ) -> Result<Self, RegistryError> {
        registry.verify(&modules)?;
        Ok(Self {
            registry,
            modules,
            adapters,
            settings,
        })
    }

    /// Built-in modules over the given adapters
    pub fn builtin(adapters: Adapters, settings: Settings) -> Result<Self, RegistryError> {
        Self::new(builtin_modules(), adapters, settings)
    }

    pub fn registry(&self) -> &RunModeRegistry {
        &self.registry
    }

    fn module(&self, mode: RunMode) -> Option<&dyn CheckModule> {
        self.modules.iter().find(|m| m.mode() == mode).map(|m| m.as_ref())
    }

    /// The mode to run: explicit name, else `-JobId`, else `-NodeName`
    pub fn resolve_mode(&self, request: &DispatchRequest) -> Result<RunMode, DiagError> {
        let mode = match request.mode.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            Some(name) => name.parse::<RunMode>()?,
            None if request.target.job_id.is_some() => RunMode::JobDetails,
            None if request.target.node_name.is_some() => RunMode::NodeHistory,
            None => return Err(DiagError::UnknownRunMode("no run mode given".to_string())),
        };
        if mode == RunMode::JobDetails
            && request.target.job_id.is_none()
            && !request.verbosity.is_tips_only()
        {
            return Err(DiagError::missing_input("JobDetails needs -JobId"));
        }
        Ok(mode)
    }

    /// Run one invocation. Every error is also written to the reporter, so a
    /// transcript records why the run ended.
    pub async fn run(
        &self,
        request: DispatchRequest,
        reporter: &Reporter,
        confirmer: &dyn Confirmer,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, DiagError> {
        let transcript = match &request.report_file {
            Some(path) => Some(reporter.start_transcript(path)?),
            None => None,
        };

        let result = self.run_inner(&request, reporter, confirmer, cancel).await;
        if let Err(e) = &result {
            warn!("dispatch failed: {}", e);
            reporter.line(format!("[ERROR] {}", e));
        }

        if let Some(guard) = transcript {
            if let Some(Ok(path)) = guard.stop() {
                info!("transcript written to {}", path.display());
            }
        }
        result
    }

    async fn run_inner(
        &self,
        request: &DispatchRequest,
        reporter: &Reporter,
        confirmer: &dyn Confirmer,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, DiagError> {
        let mode = self.resolve_mode(request)?;
        info!("dispatching {} against {}", mode, request.target.scheduler);

        let ctx = CheckContext::new(
            &request.target,
            request.verbosity,
            &self.adapters,
            &self.settings,
            reporter,
            cancel,
            confirmer,
        );

        let mut summary = RunSummary::default();
        match mode {
            RunMode::ListModules => {
                self.render_listing(reporter);
            }
            RunMode::All => {
                for step in ALL_SEQUENCE {
                    let outcome = match self.module(step) {
                        Some(module) => run_module(module, &ctx).await,
                        None => ModuleOutcome::Failed("no handler".to_string()),
                    };
                    summary.outcomes.push((step, outcome));
                }
                reporter.blank();
                reporter.line(format!(
                    "Summary: {} modules, {} completed, {} degraded, {} failed, {} skipped",
                    summary.outcomes.len(),
                    summary.completed(),
                    summary.degraded(),
                    summary.failed(),
                    summary.skipped()
                ));
            }
            single => {
                let module = self
                    .module(single)
                    .ok_or_else(|| DiagError::UnknownRunMode(single.to_string()))?;
                let outcome = run_module(module, &ctx).await;
                summary.outcomes.push((single, outcome.clone()));
                if ctx.was_declined() {
                    return Err(DiagError::Declined);
                }
                if let ModuleOutcome::Invalid(reason) = outcome {
                    return Err(DiagError::Validation(reason));
                }
            }
        }
        Ok(summary)
    }

    fn render_listing(&self, reporter: &Reporter) {
        reporter.section("Run modes");
        let width = self
            .registry
            .list_modes()
            .iter()
            .map(|d| d.name.len())
            .max()
            .unwrap_or(0);
        for d in self.registry.list_modes() {
            reporter.line(format!(
                "  {:<width$}  [{}] {}",
                d.name,
                d.source_tag.as_str(),
                d.description,
                width = width
            ));
        }
    }
}
