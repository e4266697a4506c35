mod cmd;
mod config_path;
mod output;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, resolve::ResolveArgs, scrape::ScrapeArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "remedy",
    about = "Resolve failed REDCap import tickets: unlock the form, re-run the import, relock, report",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: nearest remedy.yaml above the current directory)
    #[arg(long, global = true, env = "REMEDY_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay every command in matching tickets, then comment on and close them
    Resolve(ResolveArgs),

    /// List what `resolve` would do, without touching the record store or tracker
    Scrape(ScrapeArgs),

    /// Inspect and validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Resolve(args) if args.verbose => tracing::Level::INFO,
        Commands::Scrape(args) if args.verbose => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = config_path::resolve_config(cli.config.as_deref());

    let result = match cli.command {
        Commands::Resolve(args) => cmd::resolve::run(&config, args, cli.json),
        Commands::Scrape(args) => cmd::scrape::run(&config, args, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&config, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
