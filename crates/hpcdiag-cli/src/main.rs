mod args;

use anyhow::{Context, Result};
use clap::Parser;
use hpcdiag::help::{render_deep_help, render_help};
use hpcdiag::{exit_code, system_adapters, Confirmer, DiagError, Dispatcher, Reporter, RunModeRegistry, Settings};
use std::io::{BufRead, Write};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use args::{normalize_args, Cli, SCHEDULER_ENV_VAR};

/// Log filter environment variable
const LOG_ENV_VAR: &str = "HPCDIAG_LOG";

/// Asks on the terminal; anything but `y`/`yes` declines
struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn confirm(&self, prompt: &str) -> bool {
        let mut stdout = std::io::stdout().lock();
        if write!(stdout, "{} [y/N] ", prompt).and_then(|_| stdout.flush()).is_err() {
            return false;
        }
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let env_filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(env_filter)
        .init();
}

fn local_hostname() -> Option<String> {
    hostname::get().ok().map(|h| h.to_string_lossy().into_owned())
}

async fn run() -> Result<i32> {
    let argv = normalize_args(std::env::args());
    let cli = match Cli::try_parse_from(argv) {
        Ok(cli) => cli,
        Err(e) => {
            if matches!(e.kind(), clap::error::ErrorKind::DisplayVersion) {
                print!("{}", e);
                return Ok(0);
            }
            eprintln!("{}", e.render());
            println!("{}", render_help(&RunModeRegistry::builtin()));
            return Ok(1);
        }
    };

    init_logging(cli.verbose);

    if cli.deep_help {
        println!("{}", render_deep_help(&RunModeRegistry::builtin()));
        return Ok(0);
    }
    if cli.show_help {
        println!("{}", render_help(&RunModeRegistry::builtin()));
        return Ok(0);
    }

    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    let request = match cli
        .scheduler(std::env::var(SCHEDULER_ENV_VAR).ok(), local_hostname)
        .and_then(|scheduler| cli.to_request(scheduler))
    {
        Ok(request) => request,
        Err(e) => {
            println!("[ERROR] {}", e);
            println!("{}", render_help(&RunModeRegistry::builtin()));
            return Ok(e.exit_code());
        }
    };
    info!("Scheduler: {}", request.target.scheduler);

    let adapters = system_adapters(&settings, &request.target.scheduler);
    let dispatcher = Dispatcher::builtin(adapters, settings).context("run-mode table")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling remaining probes");
            on_interrupt.cancel();
        }
    });

    let reporter = Reporter::stdout();
    let result = dispatcher.run(request, &reporter, &StdinConfirmer, &cancel).await;
    if let Err(DiagError::UnknownRunMode(_)) = &result {
        println!("{}", render_help(dispatcher.registry()));
    }
    Ok(exit_code(&result))
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}
