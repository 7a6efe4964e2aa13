use crate::commands::{run_afip, AfipCommand};
use crate::server;
use clap::{Args, Parser, Subcommand};
use cpe_billing::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "CPE Billing",
    about = "Run the freight billing back office and its AFIP maintenance tools",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Talk to the AFIP web services directly
    Afip {
        #[command(subcommand)]
        command: AfipCommand,
    },
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Add a demo client to the empty store
    #[arg(long)]
    pub(crate) seed_demo: bool,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Afip { command } => run_afip(command).await,
    }
}
