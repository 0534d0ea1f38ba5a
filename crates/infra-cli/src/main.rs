mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use infra_core::assembly::TemplateFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "infra",
    about = "Synthesize the Hasura deployment (network, database, service, actions) as a CloudFormation stack",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from actions/ or .git/)
    #[arg(long, global = true, env = "INFRA_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose the stack and write the cloud assembly
    Synth {
        /// Output directory (default: <root>/infra.out)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,

        /// Template format: json or yaml
        #[arg(long, default_value_t = TemplateFormat::Json)]
        format: TemplateFormat,
    },

    /// Resolve and validate configuration from the environment
    Env,

    /// List every resource the stack declares
    Ls {
        /// Only resources of this CloudFormation type
        #[arg(long = "type", value_name = "TYPE")]
        ty: Option<String>,
    },

    /// List the stack outputs read by the post-deploy step
    Outputs,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Synth { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Synth { out, format } => cmd::synth::run(&root, out.as_deref(), format, cli.json),
        Commands::Env => cmd::env::run(cli.json),
        Commands::Ls { ty } => cmd::ls::run(&root, ty.as_deref(), cli.json),
        Commands::Outputs => cmd::outputs::run(&root, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
