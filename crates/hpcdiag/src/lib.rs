//! hpcdiag - run-mode diagnostics for HPC Pack clusters
//!
//! A run mode names one check module (or `All`, or `ListModules`). The
//! dispatcher resolves it, builds a `CheckContext` over the probe adapters and
//! renders every result through the `Reporter`.

pub mod adapters;
pub mod checks;
pub mod dispatch;
pub mod error;
pub mod help;
pub mod mode;
pub mod registry;
pub mod report;
pub mod settings;
pub mod target;
pub mod timeout;
pub mod transcript;

pub use adapters::system::system_adapters;
pub use adapters::Adapters;
pub use checks::{builtin_modules, AutoConfirm, CheckContext, CheckModule, Confirmer, ModuleOutcome, Tip};
pub use dispatch::{exit_code, DispatchRequest, Dispatcher, RunSummary};
pub use error::{DiagError, ProbeError, RegistryError};
pub use mode::{RunMode, ALL_SEQUENCE};
pub use registry::{RunModeDescriptor, RunModeRegistry, SourceTag};
pub use report::{BufferSink, CheckResult, CheckStatus, OutputSink, Reporter, StdoutSink};
pub use settings::Settings;
pub use target::{ClientCertOverride, DateRange, PortSelection, ProbeTarget, VerbosityMode};
