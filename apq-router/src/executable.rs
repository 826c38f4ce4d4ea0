//! Main entry point for CLI command to start server.

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::configuration::generate_config_schema;
use crate::configuration::Configuration;
use crate::router::ApqRouter;
use crate::router::ShutdownKind;

/// Options for the router
#[derive(Parser, Debug)]
#[command(
    name = "apq-router",
    about = "GraphQL router with automatic persisted queries",
    disable_version_flag = true
)]
pub(crate) struct Opt {
    /// Log level (off|error|warn|info|debug|trace).
    #[arg(
        long = "log",
        default_value = "info",
        alias = "log-level",
        env = "APQ_ROUTER_LOG"
    )]
    log_level: String,

    /// Configuration location relative to the project directory.
    #[arg(short, long = "config", env = "APQ_ROUTER_CONFIG_PATH")]
    config_path: Option<PathBuf>,

    /// Prints the configuration schema.
    #[arg(long)]
    schema: bool,

    /// Display version and exit.
    #[arg(long, short = 'V')]
    version: bool,
}

pub fn main() -> Result<()> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(nb) = std::env::var("APQ_ROUTER_NUM_CORES")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
    {
        builder.worker_threads(nb);
    }
    let runtime = builder.build()?;
    runtime.block_on(Executable::builder().start())
}

/// Entry point into creating a router executable.
pub struct Executable {}

#[buildstructor::buildstructor]
impl Executable {
    /// Build an executable that will parse commandline options and set up logging.
    /// You may optionally supply a `router_builder_fn` to override building of the router.
    ///
    /// Note that if you do not specify a runtime you must be in the context of an existing tokio runtime.
    #[builder(entry = "builder", exit = "start")]
    pub async fn start(router_builder_fn: Option<fn(Configuration) -> ApqRouter>) -> Result<()> {
        let opt = Opt::parse();

        if opt.version {
            println!("{}", std::env!("CARGO_PKG_VERSION"));
            return Ok(());
        }

        if opt.schema {
            let schema = generate_config_schema();
            println!("{}", serde_json::to_string_pretty(&schema)?);
            return Ok(());
        }

        // RUST_LOG takes precedence over --log.
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&opt.log_level)
                .context("could not parse log configuration")?,
        };
        let builder = tracing_subscriber::fmt::fmt().with_env_filter(env_filter);
        let initialized = if std::io::stdout().is_terminal() {
            builder.try_init()
        } else {
            builder.json().try_init()
        };
        initialized.map_err(|err| anyhow!("could not set up logging: {err}"))?;

        let configuration = load_configuration(&opt)?;

        tracing::info!("APQ Router v{}", std::env!("CARGO_PKG_VERSION"));
        let router = router_builder_fn.unwrap_or(|configuration| {
            ApqRouter::builder()
                .configuration(configuration)
                .shutdown(ShutdownKind::CtrlC)
                .build()
        })(configuration);
        if let Err(err) = router.serve().await {
            tracing::error!("{}", err);
            return Err(err.into());
        }
        Ok(())
    }
}

fn load_configuration(opt: &Opt) -> Result<Configuration> {
    match &opt.config_path {
        Some(path) => {
            let path = if path.is_relative() {
                std::env::current_dir()?.join(path)
            } else {
                path.to_path_buf()
            };
            tracing::debug!(path = %path.display(), "loading configuration");
            Ok(Configuration::from_file(&path)?)
        }
        None => Ok(Configuration::builder().build()),
    }
}
