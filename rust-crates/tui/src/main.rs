use clap::{
    ArgGroup,
    Parser,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use deployments::DeploymentStore;
use random_winner_game::{
    config::{
        self,
        AppConfig,
        NetworkTarget,
    },
    wallets,
};
use std::{
    path::PathBuf,
    time::Duration,
};

mod client;
mod ui;

#[derive(Debug, Parser)]
#[command(
    name = "random-winner",
    version,
    about = "Terminal client for the RandomWinnerGame lottery",
    group(ArgGroup::new("network").args(["testnet", "local"]).required(true))
)]
struct Cli {
    /// Play on Polygon Mumbai (chain 80001)
    #[arg(long)]
    testnet: bool,
    /// Play against a local hardhat node (chain 31337)
    #[arg(long)]
    local: bool,
    /// Override the RPC URL for the selected network
    #[arg(long, env = "RANDOM_WINNER_RPC_URL")]
    rpc_url: Option<String>,
    /// Chain id the wallet must be connected to
    #[arg(long, env = "RANDOM_WINNER_CHAIN_ID")]
    chain_id: Option<u64>,
    /// Contract address; defaults to the latest recorded deployment
    #[arg(long, env = "RANDOM_WINNER_CONTRACT")]
    contract: Option<String>,
    /// GraphQL endpoint of the RandomWinnerGame subgraph
    #[arg(long, env = "RANDOM_WINNER_SUBGRAPH_URL")]
    subgraph_url: String,
    /// Keystore name to play with
    #[arg(long, env = "RANDOM_WINNER_WALLET")]
    wallet: String,
    /// Keystore directory (defaults to ~/.foundry/keystores)
    #[arg(long)]
    wallet_dir: Option<String>,
    #[arg(long, default_value_t = config::DEFAULT_POLL_INTERVAL_MS)]
    poll_interval_ms: u64,
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

impl Cli {
    fn network(&self) -> NetworkTarget {
        if self.local {
            NetworkTarget::Local
        } else {
            NetworkTarget::Mumbai
        }
    }

    fn into_config(self) -> Result<AppConfig> {
        let network = self.network();
        if self.poll_interval_ms == 0 {
            return Err(eyre!("--poll-interval-ms must be greater than zero"));
        }
        let store =
            DeploymentStore::new(network.deployment_env()).map_err(|e| eyre!("{e:#}"))?;
        let contract = config::resolve_contract(self.contract.as_deref(), &store)?;
        let dir = wallets::resolve_wallet_dir(self.wallet_dir.as_deref())?;
        let wallet = wallets::find_wallet(&dir, &self.wallet)?;
        Ok(AppConfig {
            network,
            rpc_url: self
                .rpc_url
                .unwrap_or_else(|| network.default_rpc_url().to_string()),
            chain_id: self.chain_id.unwrap_or_else(|| network.chain_id()),
            contract,
            subgraph_url: self.subgraph_url,
            wallet,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            log_dir: self.log_dir,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    deployments::ensure_structure().map_err(|e| eyre!("{e:#}"))?;
    let app_config = cli.into_config()?;
    let _guard = client::init_tracing(&app_config.log_dir)?;
    tracing::info!("starting random-winner client");
    client::run_app(app_config).await
}
