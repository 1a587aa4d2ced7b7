//! `canopy`: serve the example music API, or talk to one.

use canopy_axum_http::cli::{self, CliConfig, ClientCommand};
use canopy_axum_http::music;
use canopy_axum_http::server::{serve, shutdown_signal, BroadcastHub, ServerConfig};
use canopy_axum_http::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "canopy",
    version,
    about = "Nested CRUD resources over HTTP",
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        env = "CANOPY_ADDRESS",
        default_value = "http://127.0.0.1:8080",
        help = "Server address for client commands"
    )]
    address: String,
    #[arg(long, default_value_t = 30_000, help = "Request timeout in milliseconds")]
    timeout_ms: u64,
    #[arg(long, help = "Print JSON on one line")]
    compact: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Serve the example music API")]
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080", help = "Address to listen on")]
        bind: SocketAddr,
    },
    #[command(flatten)]
    Client(ClientCommand),
}

fn init_tracing(default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(cli: Cli) -> Result<()> {
    let tree = music::tree(BroadcastHub::new())?;
    match cli.command {
        Command::Serve { bind } => {
            init_tracing("info");
            let config = ServerConfig::default().with_bind(bind);
            serve(&tree, config, shutdown_signal()).await
        }
        Command::Client(command) => {
            init_tracing("warn");
            let config = CliConfig {
                address: cli.address,
                timeout_ms: cli.timeout_ms,
                pretty: !cli.compact,
            };
            let output = cli::run(&tree, &command, &config).await?;
            if !output.is_empty() {
                println!("{output}");
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(cli::exit_code(&err));
    }
}
