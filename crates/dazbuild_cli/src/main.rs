//! dazbuild CLI - structured, validated editing of source repositories.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "dazbuild")]
#[command(about = "Structured, validated code editing for coding agents", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: $DAZBUILD_CONFIG, then ./dazbuild.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured repositories
    Repos,
    /// Show the element outline of a repository or element
    Outline {
        /// Repository name
        repo: String,
        /// Element reference (whole repository if omitted)
        reference: Option<String>,
    },
    /// Print the source of an element
    Get {
        /// Repository name
        repo: String,
        /// Element reference, e.g. pkg/mod.py.Class.method
        reference: String,
    },
    /// Search elements by free text
    Search {
        /// Repository name
        repo: String,
        /// Query text
        query: String,
        /// Maximum number of hits
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Run lint and tests against the repository without changing it
    Check {
        /// Repository name
        repo: String,
    },
    /// Replace one element and commit it if validation passes
    Edit {
        /// Repository name
        repo: String,
        /// Element reference
        reference: String,
        /// File holding the new content ("-" for stdin)
        #[arg(short, long)]
        file: PathBuf,
        /// Commit message
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Serve tool calls as JSON lines on stdin/stdout
    Serve,
}

fn main() -> Result<()> {
    // Initialize tracing subscriber
    // Respects RUST_LOG environment variable (e.g., RUST_LOG=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Repos => commands::repos::run(config),
        Commands::Outline { repo, reference } => {
            commands::browse::outline(config, &repo, reference.as_deref())
        }
        Commands::Get { repo, reference } => commands::browse::get(config, &repo, &reference),
        Commands::Search { repo, query, limit } => {
            commands::browse::search(config, &repo, &query, limit)
        }
        Commands::Check { repo } => commands::check::run(config, &repo),
        Commands::Edit {
            repo,
            reference,
            file,
            message,
        } => commands::edit::run(config, &repo, &reference, &file, message.as_deref()),
        Commands::Serve => commands::serve::run(config),
    }
}
