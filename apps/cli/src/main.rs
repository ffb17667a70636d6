use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use irecv_core::{DeviceSession, Finalize, RawEndpoint, SessionConfig};
use tracing::{error, info};

mod shell;

#[derive(Parser, Debug)]
#[command(author, version, about = "iRecovery USB client for Apple bootloaders (Pure Rust)", long_about = None)]
struct Args {
    /// Session configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enable auto-boot and reboot the device (exit recovery loop)
    Autoboot,
    /// Start the interactive recovery console
    Shell {
        /// Copy console output to this file
        logfile: Option<PathBuf>,
    },
    /// Reset the USB connection
    Reset,
    /// Send a file to the device
    Send { file: PathBuf },
    /// Upload a payload and wait for it to execute
    Upload {
        file: PathBuf,

        /// Reset the device once the payload ran
        #[arg(short = 'x', long)]
        reset: bool,
    },
    /// Send a single command to iBoot
    Command {
        #[arg(required = true, num_args = 1..)]
        words: Vec<String>,
    },
    /// Execute commands from a batch file
    Batch { file: PathBuf },
    /// Send the USB exploit packet, uploading a payload first if given
    Exploit { payload: Option<PathBuf> },
    /// Send a zero-length control request (endpoint A1, 40 or 21)
    Raw { endpoint: RawEndpoint, request: String },
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("Unable to load config {}", path.display()))?,
        None => SessionConfig::default(),
    };

    let mut session = DeviceSession::connect(config).context("Unable to connect to device")?;
    info!(mode = %session.mode(), "Device found");

    match args.command {
        Command::Autoboot => shell::autoboot(&session)?,
        Command::Shell { logfile } => shell::run_console(&mut session, logfile.as_deref())?,
        Command::Reset => session.reset()?,
        Command::Send { file } => session.send(&file, Finalize::Notify)?,
        Command::Upload { file, reset } => {
            session.upload(&file)?;
            if reset {
                session.reset()?;
            }
        }
        Command::Command { words } => session.send_command(&words.join(" "))?,
        Command::Batch { file } => shell::run_batch(&mut session, &file)?,
        Command::Exploit { payload } => session.exploit(payload.as_deref())?,
        Command::Raw { endpoint, request } => {
            let length = session.raw_control_transfer(endpoint, &request)?;
            info!(endpoint = %endpoint, length, "Raw request complete");
        }
    }

    session.close();
    Ok(())
}
