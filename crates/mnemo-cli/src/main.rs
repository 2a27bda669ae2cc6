use clap::{Parser, Subcommand};
use mnemo_cli::commands::{
    DistributionCommand, ItemCommand, OptimizeCommand, ProtectCommand, ProtectedCommand,
    StatsCommand, UnprotectCommand,
};
use mnemo_cli::error::CliResult;
use mnemo_cli::output::OutputFormat;
use mnemo_cli::{AdminClient, DEFAULT_URL};

#[derive(Parser)]
#[command(name = "mnemo-cli")]
#[command(about = "Mnemo CLI - Management tool for the mnemo retention daemon")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(
        long,
        short = 'u',
        global = true,
        default_value = DEFAULT_URL,
        help = "Base URL of the daemon's admin API"
    )]
    pub url: String,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Show engine metrics")]
    Stats(StatsCommand),

    #[clap(about = "Show how an owner's items are spread across tiers")]
    Distribution(DistributionCommand),

    #[clap(about = "Run an optimization pass now")]
    Optimize(OptimizeCommand),

    #[clap(about = "Exempt an item from decay and demotion")]
    Protect(ProtectCommand),

    #[clap(about = "Remove an item's protection")]
    Unprotect(UnprotectCommand),

    #[clap(about = "List an owner's protected items")]
    Protected(ProtectedCommand),

    #[clap(about = "Show an item's tier, score and access statistics")]
    Item(ItemCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let client = AdminClient::new(&cli.url)?;

    match &cli.command {
        Command::Stats(cmd) => cmd.execute(&client, format).await,
        Command::Distribution(cmd) => cmd.execute(&client, format).await,
        Command::Optimize(cmd) => cmd.execute(&client, format).await,
        Command::Protect(cmd) => cmd.execute(&client, format).await,
        Command::Unprotect(cmd) => cmd.execute(&client, format).await,
        Command::Protected(cmd) => cmd.execute(&client, format).await,
        Command::Item(cmd) => cmd.execute(&client, format).await,
    }
}
