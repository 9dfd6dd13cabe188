use crate::demo::{run_demo, run_scorecard, DemoArgs, ScorecardArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use product_pipeline::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Product Pipeline",
    about = "Run and demonstrate the product-candidate stage pipeline",
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
    /// Score a candidate snapshot exported as JSON
    Scorecard(ScorecardArgs),
    /// Walk seeded candidates through full evaluation and print the results
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Preload the demo candidates into the in-memory store
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
        Command::Scorecard(args) => run_scorecard(args),
        Command::Demo(args) => run_demo(args),
    }
}
