use clap::Parser;
use model_experiment_engine::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => cli::serve::run().await,
        Command::Bucket(args) => cli::bucket::run(args),
    }
}
