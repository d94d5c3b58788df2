use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use kubeslurm::SlurmJob;
use kubeslurm::kube::CustomResourceExt;
use tower_http::BoxError;
use tracing_subscriber::prelude::*;

use kubeslurm_controller::{Config, Context, Supervisor, health, reconcile, shutdown};

#[derive(Parser)]
#[command(version, about = "Runs SlurmJob resources on a Slurm cluster through slurmrestd")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Watch and reconcile SlurmJob resources (default)
    Run,
    /// Print the SlurmJob CustomResourceDefinition
    Crd,
}

async fn run() -> Result<(), BoxError> {
    let config = Config::load()?;
    let addr = SocketAddr::new(config.health_check_host, config.health_check_port);
    let ctx = Arc::new(Context::connect(config).await?);

    tracing::info!("Checking the slurmrestd signing key...");
    ctx.slurm.tokens().load_key().await?;

    let token = shutdown::install_shutdown_handler()?;
    let result = tokio::try_join!(
        health::serve(addr, token.clone()),
        Supervisor::new(ctx.clone()).run(token.clone()),
        reconcile::run(ctx.clone(), token.clone()),
    );
    token.cancel();
    result?;
    tracing::info!("Shut down cleanly");
    Ok(())
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    kubeslurm_controller::tracing::subscriber().init();
    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Run) {
        Command::Crd => {
            println!("{}", serde_json::to_string_pretty(&SlurmJob::crd()).unwrap());
            std::process::ExitCode::SUCCESS
        }
        Command::Run => match run().await {
            Ok(()) => std::process::ExitCode::SUCCESS,
            Err(err) => {
                tracing::error!("{err}");
                std::process::ExitCode::FAILURE
            }
        },
    }
}
