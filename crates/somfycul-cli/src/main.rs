//! Command line host for a CUL stick
//!
//! Loads the stick configuration, opens the port and sends Somfy RTS commands.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use somfycul_core::prelude::*;
use somfycul_core::protocol::list_ports;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "somfycul", version, about = "Send Somfy RTS commands through a CUL stick")]
struct Cli {
    /// JSON configuration file (`{"port": "...", "baudrate": 9600}`)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Serial port, overrides the configuration file
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Baud rate, overrides the configuration file
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// Print what would be written instead of opening the port
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List serial ports visible on this machine
    Ports,
    /// Send one command to an actuator
    Send {
        /// MY, UP, MY_UP, DOWN, MY_DOWN, UP_DOWN, PROG, SUN_FLAG or FLAG
        command: SomfyCommand,

        /// Rolling code to embed, as hex digits
        #[arg(long)]
        rolling_code: String,

        /// Actuator address, as hex digits
        #[arg(long)]
        address: String,

        /// Name of the actuator, for the log
        #[arg(long, default_value = "somfycul")]
        label: String,

        /// Send the same frame this many times
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },
}

fn load_config(cli: &Cli) -> Result<CulConfig> {
    let mut config = match &cli.config {
        Some(path) => CulConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => CulConfig::default(),
    };
    if let Some(port) = &cli.port {
        config.port = Some(port.clone());
    }
    if let Some(baud) = cli.baud {
        config.baudrate = baud;
    }
    debug!("Using configuration {:?}", config);
    Ok(config)
}

fn print_ports() {
    let ports = list_ports();
    if ports.is_empty() {
        println!("No serial ports found");
        return;
    }
    for port in ports {
        let marker = if port.looks_like_cul() { " (CUL)" } else { "" };
        match &port.product {
            Some(product) => println!("{}{} - {}", port.name, marker, product),
            None => println!("{}{}", port.name, marker),
        }
    }
}

async fn send(
    config: CulConfig,
    dry_run: bool,
    command: SomfyCommand,
    rolling_code: &str,
    address: &str,
    label: &str,
    repeat: u32,
) -> Result<()> {
    let memory = dry_run.then(|| MemoryTransport::with_ports(config.port.clone()));
    let transport: Arc<dyn Transport> = match &memory {
        Some(memory) => Arc::new(memory.clone()),
        None => Arc::new(SerialPortTransport::new()),
    };

    let handler = CulHandler::new(config, transport, Arc::new(LogStatusReporter));
    handler
        .initialize()
        .await
        .context("Failed to initialize the CUL stick")?;

    let mut failed: u32 = 0;
    for _ in 0..repeat {
        if !handler
            .execute_command(label, command, rolling_code, address)
            .await
        {
            failed += 1;
        }
    }
    handler.dispose().await;
    info!(
        "Sent {} to {}: {} of {} writes succeeded",
        command,
        label,
        repeat - failed,
        repeat
    );

    if let Some(memory) = memory {
        for write in memory.writes() {
            print!("{}", write.text());
        }
    }
    if failed > 0 {
        bail!("{} of {} writes to the CUL stick failed", failed, repeat);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Ports => {
            print_ports();
            Ok(())
        }
        Commands::Send {
            command,
            ref rolling_code,
            ref address,
            ref label,
            repeat,
        } => {
            send(
                config,
                cli.dry_run,
                command,
                rolling_code,
                address,
                label,
                repeat,
            )
            .await
        }
    }
}
