//! Check modules
//!
//! One module per run mode. Every module honours the same contract:
//! - under `TipsOnly` the framework prints the module's reference commands and
//!   never calls `execute`
//! - otherwise `execute` runs its sub-probes through `CheckContext::probe`,
//!   which bounds each call and turns a failure into one rendered line, so
//!   probe *n* failing never skips probe *n + 1*
//! - verbose output only ever adds lines to the concise output

mod cluster;
mod health;
mod jobs;
mod metrics;
mod network;
pub mod role;
mod security;
mod sql;
pub mod sweep;
mod system;

pub use cluster::{ClusterMetadataCheck, ClusterTopologyCheck, CommandTestCheck, NodeTemplatesCheck, NodeValidationCheck};
pub use health::{AdvancedHealthCheck, HealthVerdict};
pub use jobs::{JobDetailsCheck, JobHistoryCheck, NodeHistoryCheck};
pub use metrics::{ClusterMetricsCheck, MetricValueHistoryCheck};
pub use network::{NetworkFixCheck, PortTestCheck};
pub use role::{classify_role, NodeRole};
pub use security::{CommunicationTestCheck, DiagnosticTestsCheck, NodeConfigCheck};
pub use sql::{extract_sql_instance, mask_connection_string, SqlTraceCheck};
pub use system::{ServicesStatusCheck, SystemInfoCheck};

use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::Adapters;
use crate::error::ProbeError;
use crate::mode::RunMode;
use crate::report::{format_table_limited, CheckResult, CheckStatus, Reporter};
use crate::settings::Settings;
use crate::target::{ProbeTarget, VerbosityMode};
use crate::timeout::{bounded_probe, TimeoutClass};

/// Rows shown by a concise table
pub const CONCISE_SAMPLE_ROWS: usize = 5;

/// A reference command printed in tips-only mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tip {
    pub command: &'static str,
    pub description: &'static str,
}

impl Tip {
    pub const fn new(command: &'static str, description: &'static str) -> Self {
        Self {
            command,
            description,
        }
    }
}

/// Asks the operator before a disruptive action
pub trait Confirmer: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Answers every prompt the same way
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl Confirmer for AutoConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}

/// A run-mode check
#[async_trait]
pub trait CheckModule: Send + Sync {
    fn mode(&self) -> RunMode;

    /// Reference commands for this mode, in display order
    fn tips(&self) -> &'static [Tip];

    /// Run the probes. An error ends the module early with one rendered line.
    async fn execute(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError>;
}

/// Everything a module may touch during one invocation
pub struct CheckContext<'a> {
    pub target: &'a ProbeTarget,
    pub verbosity: VerbosityMode,
    pub adapters: &'a Adapters,
    pub settings: &'a Settings,
    pub out: &'a Reporter,
    pub cancel: &'a CancellationToken,
    confirmer: &'a dyn Confirmer,
    declined: AtomicBool,
}

impl<'a> CheckContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        target: &'a ProbeTarget,
        verbosity: VerbosityMode,
        adapters: &'a Adapters,
        settings: &'a Settings,
        out: &'a Reporter,
        cancel: &'a CancellationToken,
        confirmer: &'a dyn Confirmer,
    ) -> Self {
        Self {
            target,
            verbosity,
            adapters,
            settings,
            out,
            cancel,
            confirmer,
            declined: AtomicBool::new(false),
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbosity.is_verbose()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Render a result at every verbosity
    pub fn emit(&self, result: CheckResult) {
        self.out.result(&result);
    }

    /// Render a result only at Verbose
    pub fn emit_verbose(&self, result: CheckResult) {
        if self.is_verbose() {
            self.out.result(&result);
        }
    }

    /// Plain indented line at every verbosity
    pub fn note(&self, text: impl AsRef<str>) {
        self.out.line(format!("    {}", text.as_ref()));
    }

    pub fn verbose_note(&self, text: impl AsRef<str>) {
        if self.is_verbose() {
            self.note(text);
        }
    }

    /// Table limited to the first few rows at Concise, complete at Verbose.
    /// Column widths come from every row so the concise lines match the
    /// verbose ones exactly.
    pub fn sample_table(&self, headers: &[&str], rows: &[Vec<String>]) {
        let limit = if self.is_verbose() {
            None
        } else {
            Some(CONCISE_SAMPLE_ROWS)
        };
        for line in format_table_limited(headers, rows, limit) {
            self.out.line(line);
        }
    }

    /// Table printed only at Verbose
    pub fn verbose_table(&self, headers: &[&str], rows: &[Vec<String>]) {
        if self.is_verbose() {
            self.out.table(headers, rows);
        }
    }

    /// Ask before a disruptive action; a refusal is remembered for the exit code
    pub fn confirm(&self, prompt: &str) -> bool {
        if self.target.force {
            return true;
        }
        let accepted = self.confirmer.confirm(prompt);
        if !accepted {
            self.declined.store(true, Ordering::SeqCst);
        }
        accepted
    }

    pub fn was_declined(&self) -> bool {
        self.declined.load(Ordering::SeqCst)
    }

    /// Bound a call without rendering anything
    pub async fn try_probe<T, F>(&self, class: TimeoutClass, future: F) -> Result<T, ProbeError>
    where
        F: Future<Output = Result<T, ProbeError>>,
    {
        bounded_probe(future, self.settings.timeouts.millis(class), self.cancel).await
    }

    /// Bound a call; on failure render one line and return `None`
    pub async fn probe<T, F>(&self, label: &str, class: TimeoutClass, future: F) -> Option<T>
    where
        F: Future<Output = Result<T, ProbeError>>,
    {
        debug!("probe: {}", label);
        match self.try_probe(class, future).await {
            Ok(value) => Some(value),
            Err(e) => {
                self.report_failure(label, &e);
                None
            }
        }
    }

    /// Render a probe failure with the status its kind maps to
    pub fn report_failure(&self, label: &str, err: &ProbeError) {
        warn!("{} failed: {}", label, err);
        self.emit(CheckResult::new(failure_status(err), label, err.to_string()));
    }
}

/// WARN for degraded probes, SKIPPED for cancellation, ERROR otherwise
pub fn failure_status(err: &ProbeError) -> CheckStatus {
    if err.is_cancelled() {
        CheckStatus::Skipped
    } else if err.is_degraded() {
        CheckStatus::Warn
    } else {
        CheckStatus::Error
    }
}

/// How a module invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOutcome {
    Completed,
    TipsRendered,
    /// Returned early on a degraded adapter
    Degraded(String),
    /// Input rejected before probing
    Invalid(String),
    Failed(String),
    Skipped,
}

impl ModuleOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ModuleOutcome::Failed(_) | ModuleOutcome::Invalid(_))
    }
}

/// Run one module under the contract. Errors and panics stay in here.
pub async fn run_module(module: &dyn CheckModule, ctx: &CheckContext<'_>) -> ModuleOutcome {
    let mode = module.mode();
    ctx.out.section(mode.as_str());

    if ctx.verbosity.is_tips_only() {
        render_tips(ctx.out, module.tips());
        return ModuleOutcome::TipsRendered;
    }

    if ctx.is_cancelled() {
        ctx.emit(CheckResult::skipped(mode.as_str(), "run cancelled"));
        return ModuleOutcome::Skipped;
    }

    info!("Running {}", mode);
    let outcome = match AssertUnwindSafe(module.execute(ctx)).catch_unwind().await {
        Ok(Ok(())) => ModuleOutcome::Completed,
        Ok(Err(e)) => {
            ctx.report_failure(mode.as_str(), &e);
            if e.is_degraded() {
                ModuleOutcome::Degraded(e.to_string())
            } else if e.is_cancelled() {
                ModuleOutcome::Skipped
            } else if matches!(e, ProbeError::Validation(_)) {
                ModuleOutcome::Invalid(e.to_string())
            } else {
                ModuleOutcome::Failed(e.to_string())
            }
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!("{} aborted: {}", mode, message);
            ctx.emit(CheckResult::error(mode.as_str(), format!("module aborted: {}", message)));
            ModuleOutcome::Failed(message)
        }
    };
    info!("Finished {}: {:?}", mode, outcome);
    outcome
}

/// Numbered reference commands
pub fn render_tips(out: &Reporter, tips: &[Tip]) {
    for (i, tip) in tips.iter().enumerate() {
        out.line(format!("  [{}] {}", i + 1, tip.command));
        out.line(format!("      {}", tip.description));
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

/// The built-in module set, one per check mode
pub fn builtin_modules() -> Vec<Box<dyn CheckModule>> {
    vec![
        Box::new(SystemInfoCheck),
        Box::new(ServicesStatusCheck),
        Box::new(SqlTraceCheck),
        Box::new(NetworkFixCheck),
        Box::new(PortTestCheck),
        Box::new(CommandTestCheck),
        Box::new(NodeValidationCheck),
        Box::new(ClusterMetadataCheck),
        Box::new(NodeTemplatesCheck),
        Box::new(JobHistoryCheck),
        Box::new(JobDetailsCheck),
        Box::new(NodeHistoryCheck),
        Box::new(ClusterMetricsCheck),
        Box::new(MetricValueHistoryCheck),
        Box::new(ClusterTopologyCheck),
        Box::new(DiagnosticTestsCheck),
        Box::new(NodeConfigCheck),
        Box::new(CommunicationTestCheck),
        Box::new(AdvancedHealthCheck),
    ]
}

#[cfg(test)]
pub(crate) mod test_support;
