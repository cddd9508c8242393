//! fundme is a CLI tool to deploy, verify and exercise the FundMe contracts.

mod cli;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Command, Script};
use fundme_deploy::{Config, RuntimeBuilder, run_deploy_scripts, run_simple_storage, tasks};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = Config::load(cli.config.as_deref())?;

    let mut builder = RuntimeBuilder::new(config.clone()).redeploy(cli.redeploy);
    if let Some(network) = cli.network {
        builder = builder.network(network);
    }

    match cli.command {
        Command::Config => {
            print!("{}", config.to_toml()?);
        }
        Command::Deploy { tags } => {
            let runtime = builder.build().await?;
            let records = run_deploy_scripts(&runtime, &tags).await?;

            for record in &records {
                tracing::info!(
                    contract = %record.contract_name,
                    address = %record.address,
                    tx = %record.transaction_hash,
                    "Deployment"
                );
            }
            runtime.finish()?;
        }
        Command::Run { script } => {
            let runtime = builder.build().await?;
            match script {
                Script::SimpleStorage => {
                    let report = run_simple_storage(&runtime).await?;
                    tracing::info!(
                        address = %report.address,
                        initial = %report.initial_value,
                        updated = %report.updated_value,
                        "Interaction complete"
                    );
                }
            }
            runtime.finish()?;
        }
        Command::BlockNumber => {
            let chain = builder.connect_read_only().await?;
            tasks::block_number(&chain).await?;
        }
        Command::Verify { contract } => {
            let runtime = builder.build().await?;
            let outcome = tasks::verify_deployment(&runtime, &contract).await?;
            tracing::info!(%contract, ?outcome, "Verification finished");
        }
    }

    Ok(())
}
