use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

/// Interaction scripts runnable with `fundme run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Script {
    SimpleStorage,
}

#[derive(Parser)]
#[command(name = "fundme")]
#[command(
    author,
    version,
    about = "Deploy, verify and exercise the FundMe contracts"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "FUNDME_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// The network to run against.
    ///
    /// If not provided, the configured default network is used (`hardhat`, the
    /// in-process chain, unless overridden).
    #[arg(short, long, global = true, env = "FUNDME_NETWORK")]
    pub network: Option<String>,

    /// Path to a configuration file.
    ///
    /// If not provided, `fundme.toml` in the current directory is used when it exists.
    #[arg(long, alias = "conf", global = true, env = "FUNDME_CONFIG")]
    pub config: Option<PathBuf>,

    /// Redeploy contracts even when a matching deployment is recorded.
    #[arg(long, global = true, env = "FUNDME_REDEPLOY", default_value_t = false)]
    pub redeploy: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the deploy scripts.
    Deploy {
        /// Only run the scripts with one of these tags (`all`, `mocks`, `fundme`).
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Run an interaction script.
    Run {
        /// The script to run.
        script: Script,
    },

    /// Print the current block number.
    BlockNumber,

    /// Verify a recorded deployment on the block explorer.
    Verify {
        /// Name of the deployed contract.
        #[arg(long)]
        contract: String,
    },

    /// Print the effective configuration.
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["fundme", "deploy", "-v", "debug", "-n", "rinkeby"]).unwrap();
        assert_eq!(cli.verbosity, LevelFilter::DEBUG);
        assert_eq!(cli.network.as_deref(), Some("rinkeby"));
        assert!(matches!(cli.command, Command::Deploy { .. }));
    }

    #[test]
    fn test_script_names() {
        let cli = Cli::try_parse_from(["fundme", "run", "simple-storage"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Run {
                script: Script::SimpleStorage
            }
        ));
    }
}
