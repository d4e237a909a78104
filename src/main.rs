use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use ogham::build::build_site;
use ogham::config::{Config, Overrides};
use ogham::document::Kind;
use ogham::scaffold::scaffold;
use ogham::watch::watch;

#[derive(Parser)]
#[command(name = "ogham")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Run as if started in DIR
    #[arg(short = 'C', value_name = "DIR", default_value = ".")]
    directory: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct BuildArgs {
    /// Write the site here instead of the configured destination
    #[arg(long)]
    destination: Option<PathBuf>,

    /// Publish drafts
    #[arg(long)]
    drafts: bool,

    /// Number of rendering threads (defaults to the number of CPUs)
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Build the site
    Build(BuildArgs),

    /// Build the site, then rebuild it whenever a source changes
    #[command(alias = "serve")]
    Watch(BuildArgs),

    /// Create a new post or page
    New {
        #[arg(value_enum)]
        kind: NewKind,

        /// The document title
        title: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum NewKind {
    Post,
    Page,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let directory = cli
        .directory
        .canonicalize()
        .with_context(|| format!("can't open `{}`", cli.directory.display()))?;
    match cli.command {
        Command::Build(args) => {
            let config = load_config(&directory, &args)?;
            let report = build_site(&config).context("build failed")?;
            print!("{}", report);
            Ok(())
        }
        Command::Watch(args) => {
            let config = load_config(&directory, &args)?;
            watch(config).context("watch failed")
        }
        Command::New { kind, title } => {
            let config = Config::from_directory(&directory, &Overrides::default())
                .context("loading configuration")?;
            let kind = match kind {
                NewKind::Post => Kind::Post,
                NewKind::Page => Kind::Page,
            };
            let today = chrono::Local::now().date_naive();
            let path = scaffold(&config, kind, &title, today)
                .with_context(|| format!("creating {} {:?}", kind.as_str(), title))?;
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn load_config(directory: &Path, args: &BuildArgs) -> Result<Config> {
    let destination = match &args.destination {
        Some(destination) if destination.is_relative() => Some(
            std::env::current_dir()
                .context("resolving the destination")?
                .join(destination),
        ),
        other => other.clone(),
    };
    let overrides = Overrides {
        destination,
        drafts: args.drafts,
        threads: args.threads,
    };
    Config::from_directory(directory, &overrides).context("loading configuration")
}
