use std::path::PathBuf;
use std::process::Command;

use anyhow::Result;
use clap::{Parser, Subcommand};
use irecv_core::SessionConfig;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Developer tasks for the irecovery workspace", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the workspace
    Build,
    /// Run the workspace tests
    Test,
    /// Run the irecovery CLI, forwarding any extra arguments
    Run {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Write the default session configuration as TOML
    Config {
        #[arg(default_value = "irecovery.toml")]
        path: PathBuf,
    },
}

fn cargo(args: &[&str], extra: &[String], what: &str) -> Result<()> {
    let status = Command::new("cargo").args(args).args(extra).status()?;
    if !status.success() {
        anyhow::bail!("{} failed", what);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build => {
            println!("Building workspace...");
            cargo(&["build", "--workspace"], &[], "Build")?;
        }
        Commands::Test => {
            println!("Testing workspace...");
            cargo(&["test", "--workspace"], &[], "Test")?;
        }
        Commands::Run { args } => {
            println!("Running irecovery...");
            cargo(&["run", "-p", "irecv-cli", "--"], args, "Run")?;
        }
        Commands::Config { path } => {
            SessionConfig::default().save_to_file(path)?;
            println!("Wrote default config to {}", path.display());
        }
    }

    Ok(())
}
