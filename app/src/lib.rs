pub mod cli;
pub mod confirm;
pub mod render;
pub mod watch;

use std::future::Future;
use std::sync::Arc;

use docdash_core::{Config, Confirm};

use crate::confirm::TerminalConfirm;

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub base_url: Option<String>,
    pub assume_yes: bool,
}

/// What a subcommand runs with.
pub struct Context {
    pub config: Config,
    pub confirm: Arc<dyn Confirm>,
}

impl Context {
    pub fn new(options: Options) -> Self {
        let mut config = Config::load_or_default();
        if let Some(base_url) = options.base_url {
            config = config.with_base_url(base_url);
        }
        Self {
            config,
            confirm: Arc::new(TerminalConfirm::new(options.assume_yes)),
        }
    }
}

/// Initialize tracing/logging with the given directives
pub fn init_logging(directives: &[&str]) {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in directives {
        match directive.parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring log directive {:?}: {}", directive, e),
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run one subcommand to completion on a fresh runtime; returns the exit code.
pub fn run_command<F, Fut>(options: Options, command: F) -> i32
where
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    init_logging(&["docdash=info", "docdash_lib=info", "docdash_core=info"]);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create Tokio runtime: {}", e);
            return 1;
        }
    };

    let context = Context::new(options);
    tracing::debug!(base_url = %context.config.base_url, "Configuration loaded");

    match rt.block_on(command(context)) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("{:#}", e);
            1
        }
    }
}
