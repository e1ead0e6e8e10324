use crate::{
    chain::{
        self,
        ContractReader,
        ContractWriter,
        NetworkProbe,
    },
    sync::GameReader,
    wallets::{
        self,
        WalletDescriptor,
    },
};
use color_eyre::eyre::{
    Report,
    Result,
    WrapErr,
};
use ethers::{
    middleware::SignerMiddleware,
    signers::Signer,
    types::Address,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Connection state shown by the UI. Everything except `connected` is only
/// meaningful once a wallet has been unlocked on the expected chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WalletSession {
    pub connected: bool,
    pub signer_address: Option<Address>,
    pub is_owner: bool,
}

impl WalletSession {
    pub fn connected(address: Address) -> Self {
        Self {
            connected: true,
            signer_address: Some(address),
            is_owner: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("wallet unlock cancelled")]
    Declined,
    #[error("You are not on {network}: expected chain {expected}, wallet is on chain {actual}")]
    WrongNetwork {
        network: String,
        expected: u64,
        actual: u64,
    },
    #[error("wallet error: {0:#}")]
    Wallet(Report),
    #[error("provider error: {0:#}")]
    Provider(Report),
}

impl ConnectError {
    /// Text for the blocking alert, for the failures that warrant one.
    pub fn alert(&self) -> Option<String> {
        match self {
            ConnectError::WrongNetwork { network, .. } => {
                Some(format!("You are not on {network}"))
            }
            _ => None,
        }
    }
}

/// Everything needed to unlock a wallet against a specific deployment.
#[derive(Clone, Debug)]
pub struct ConnectTarget {
    pub rpc_url: String,
    pub network_name: String,
    pub expected_chain_id: u64,
    pub contract: Address,
    pub wallet: WalletDescriptor,
}

pub struct Connection {
    pub session: WalletSession,
    pub reader: ContractReader,
    pub writer: ContractWriter,
}

pub async fn check_network<P: NetworkProbe>(
    probe: &P,
    network_name: &str,
    expected: u64,
) -> Result<u64, ConnectError> {
    let actual = probe.chain_id().await.map_err(ConnectError::Provider)?;
    if actual != expected {
        return Err(ConnectError::WrongNetwork {
            network: network_name.to_string(),
            expected,
            actual,
        });
    }
    Ok(actual)
}

/// Addresses compare by value, so checksum casing never matters.
pub async fn check_owner<R: GameReader>(reader: &R, signer: Address) -> Result<bool> {
    let owner = reader.owner().await.wrap_err("owner lookup failed")?;
    Ok(owner == signer)
}

/// Unlocks the keystore and binds reader and writer to the contract.
/// Nothing is returned unless the provider reports the expected chain.
pub async fn connect(target: ConnectTarget, password: String) -> Result<Connection, ConnectError> {
    let descriptor = target.wallet.clone();
    let wallet = tokio::task::spawn_blocking(move || {
        wallets::unlock_wallet(&descriptor, &password)
    })
    .await
    .map_err(|e| ConnectError::Wallet(Report::new(e)))?
    .map_err(ConnectError::Wallet)?;

    let provider = chain::connect_provider(&target.rpc_url).map_err(ConnectError::Provider)?;
    let chain_id =
        check_network(&provider, &target.network_name, target.expected_chain_id).await?;

    let wallet = wallet.with_chain_id(chain_id);
    let address = wallet.address();
    let provider = Arc::new(provider);
    let signer = Arc::new(SignerMiddleware::new((*provider).clone(), wallet));
    info!(address = ?address, chain_id, "wallet connected");

    Ok(Connection {
        session: WalletSession::connected(address),
        reader: ContractReader::new(target.contract, provider),
        writer: ContractWriter::new(target.contract, signer),
    })
}
