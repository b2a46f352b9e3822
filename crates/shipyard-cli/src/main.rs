//! Shipyard - Kubernetes operator that installs and maintains the Shipyard platform

use clap::{Parser, Subcommand};
use shipyard_kube::OperatorConfig;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod error;
mod exit_codes;

use error::{CliError, Result};

#[derive(Parser)]
#[command(name = "shipyard")]
#[command(author = "Shipyard Contributors")]
#[command(version)]
#[command(about = "Kubernetes operator that installs and maintains the Shipyard platform", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Operator configuration file
    #[arg(long, global = true, env = "SHIPYARD_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the manifest sources (overrides the config file)
    #[arg(long, global = true, env = "SHIPYARD_MANIFESTS_DIR")]
    manifests_dir: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, env = "SHIPYARD_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the operator (default)
    Controller {
        /// Compatibility matrix URL (overrides the config file)
        #[arg(long, env = "SHIPYARD_MATRIX_URL")]
        matrix_url: Option<String>,

        /// Only watch ClusterInstallations in this namespace
        #[arg(short, long, env = "SHIPYARD_WATCH_NAMESPACE")]
        namespace: Option<String>,
    },

    /// Print the ClusterInstallation CRD
    Crd,

    /// Render a raw-manifest component locally
    Render {
        /// Component name (core, workspaces)
        component: String,

        /// ClusterInstallation manifest
        #[arg(short = 'f', long = "file")]
        file: PathBuf,

        /// Show only one resource (Kind/name)
        #[arg(short = 's', long)]
        show_only: Option<String>,
    },

    /// Resolve the CRD schema version for a platform version
    ResolveVersion {
        /// Compatibility matrix (JSON object of version to schema)
        #[arg(long)]
        matrix: PathBuf,

        /// Platform version
        #[arg(long)]
        target: String,

        /// Print matrix details to stderr
        #[arg(short, long)]
        verbose: bool,
    },
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<OperatorConfig> {
    let mut config = OperatorConfig::load(cli.config.as_deref()).map_err(|e| {
        CliError::config_with_help(
            e.to_string(),
            "check the file passed with --config or SHIPYARD_CONFIG",
        )
    })?;
    if let Some(dir) = &cli.manifests_dir {
        config.manifests_dir = dir.clone();
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(&cli)?;

    match cli.command.unwrap_or(Commands::Controller {
        matrix_url: None,
        namespace: None,
    }) {
        Commands::Controller {
            matrix_url,
            namespace,
        } => {
            if let Some(url) = matrix_url {
                config.matrix_url = url;
            }
            commands::controller::run(config, namespace.as_deref()).await
        }

        Commands::Crd => commands::crd::run(),

        Commands::Render {
            component,
            file,
            show_only,
        } => commands::render::run(&component, &file, &config, show_only.as_deref()),

        Commands::ResolveVersion {
            matrix,
            target,
            verbose,
        } => commands::resolve_version::run(&matrix, &target, verbose),
    }
}

#[tokio::main]
async fn main() {
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    if let Err(e) = run(cli).await {
        let code = e.exit_code();
        eprintln!("{:?}", miette::Report::new(e));
        std::process::exit(code);
    }
}
