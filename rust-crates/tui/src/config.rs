use crate::{
    session::ConnectTarget,
    wallets::WalletDescriptor,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use deployments::{
    DeploymentEnv,
    DeploymentStore,
};
use ethers::types::Address;
use generated_abi::{
    LOCAL_CHAIN_ID,
    MUMBAI_CHAIN_ID,
};
use std::{
    path::PathBuf,
    time::Duration,
};

pub const DEFAULT_MUMBAI_RPC_URL: &str = "https://rpc-mumbai.maticvigil.com";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://127.0.0.1:8545";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkTarget {
    Mumbai,
    Local,
}

impl NetworkTarget {
    pub fn default_rpc_url(self) -> &'static str {
        match self {
            NetworkTarget::Mumbai => DEFAULT_MUMBAI_RPC_URL,
            NetworkTarget::Local => DEFAULT_LOCAL_RPC_URL,
        }
    }

    pub fn chain_id(self) -> u64 {
        match self {
            NetworkTarget::Mumbai => MUMBAI_CHAIN_ID,
            NetworkTarget::Local => LOCAL_CHAIN_ID,
        }
    }

    /// Used in "You are not on ..." alerts.
    pub fn display_name(self) -> &'static str {
        match self {
            NetworkTarget::Mumbai => "Mumbai testnet",
            NetworkTarget::Local => "the local network",
        }
    }

    pub fn deployment_env(self) -> DeploymentEnv {
        match self {
            NetworkTarget::Mumbai => DeploymentEnv::Testnet,
            NetworkTarget::Local => DeploymentEnv::Local,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub network: NetworkTarget,
    pub rpc_url: String,
    pub chain_id: u64,
    pub contract: Address,
    pub subgraph_url: String,
    pub wallet: WalletDescriptor,
    pub poll_interval: Duration,
    pub log_dir: PathBuf,
}

impl AppConfig {
    pub fn connect_target(&self) -> ConnectTarget {
        ConnectTarget {
            rpc_url: self.rpc_url.clone(),
            network_name: self.network.display_name().to_string(),
            expected_chain_id: self.chain_id,
            contract: self.contract,
            wallet: self.wallet.clone(),
        }
    }
}

/// An explicit address wins; otherwise the newest recorded deployment.
pub fn resolve_contract(explicit: Option<&str>, store: &DeploymentStore) -> Result<Address> {
    if let Some(raw) = explicit {
        return raw
            .parse()
            .map_err(|e| eyre!("invalid contract address {raw:?}: {e}"));
    }
    let record = store
        .load()
        .map_err(|e| eyre!("{e:#}"))?
        .ok_or_else(|| {
            eyre!(
                "No deployment recorded in {}; deploy first or pass --contract",
                store.path().display()
            )
        })?;
    record.contract_address.parse().map_err(|e| {
        eyre!(
            "deployment record has invalid address {}: {e}",
            record.contract_address
        )
    })
}
