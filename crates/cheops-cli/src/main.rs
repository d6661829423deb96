//! Cheops CLI tool.

use cheops_config::system::DEFAULT_CONFIG_PATH;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "cheops")]
#[command(about = "Cheops CI CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render and parse a manifest template, printing what it declares
    Validate {
        /// Path to the manifest template
        #[arg(default_value = ".cheops.kdl")]
        path: PathBuf,
        /// Value for {{ .Commit }}
        #[arg(long, default_value = "0000000")]
        commit: String,
        /// Value for {{ .Branch }}
        #[arg(long, default_value = "main")]
        branch: String,
        /// Value for {{ .Repository }}
        #[arg(long, default_value = "https://example.com/repository.git")]
        repository: String,
        /// Secret available as {{ .Secrets.KEY }}
        #[arg(long = "secret", value_name = "KEY=VALUE", value_parser = commands::parse_key_val)]
        secrets: Vec<(String, String)>,
    },
    /// Run one build in the foreground
    Build {
        /// Path to the server configuration
        #[arg(short, long, env = "CHEOPS_CONFIG_FILE", default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// URL of a configured repository
        #[arg(long)]
        repository: String,
        /// Commit to build
        #[arg(long)]
        commit: String,
        /// Branch the commit belongs to; defaults to the tracked branch
        #[arg(long)]
        branch: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate {
            path,
            commit,
            branch,
            repository,
            secrets,
        } => {
            commands::validate::run(&path, commit, branch, repository, secrets)?;
        }
        Commands::Build {
            config,
            repository,
            commit,
            branch,
        } => {
            commands::build::run(&config, &repository, &commit, branch).await?;
        }
    }

    Ok(())
}
