use crate::sync::GameReader;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use ethers::{
    middleware::SignerMiddleware,
    providers::{
        Http,
        Middleware,
        PendingTransaction,
        Provider,
    },
    signers::LocalWallet,
    types::{
        Address,
        TxHash,
        U256,
        U64,
    },
};
use generated_abi::RandomWinnerGame;
use std::{
    future::Future,
    sync::Arc,
};

pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Confirmed outcome of a mined transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
}

/// State-changing contract calls. Submission and confirmation are separate
/// so the caller can report the pending hash before the receipt arrives.
pub trait GameWriter: Send + Sync {
    fn start_game(
        &self,
        max_players: u8,
        entry_fee: U256,
    ) -> impl Future<Output = Result<TxHash>> + Send;
    fn join_game(&self, entry_fee: U256) -> impl Future<Output = Result<TxHash>> + Send;
    fn wait_mined(&self, tx_hash: TxHash) -> impl Future<Output = Result<TxReceipt>> + Send;
}

pub trait NetworkProbe: Send + Sync {
    fn chain_id(&self) -> impl Future<Output = Result<u64>> + Send;
}

impl NetworkProbe for Provider<Http> {
    async fn chain_id(&self) -> Result<u64> {
        let id = self
            .get_chainid()
            .await
            .wrap_err("failed to query chain id")?;
        Ok(id.as_u64())
    }
}

pub fn connect_provider(rpc_url: &str) -> Result<Provider<Http>> {
    Provider::<Http>::try_from(rpc_url).wrap_err_with(|| format!("invalid RPC URL {rpc_url}"))
}

/// Contract bound to a read-only provider.
#[derive(Clone)]
pub struct ContractReader {
    contract: RandomWinnerGame<Provider<Http>>,
}

impl ContractReader {
    pub fn new(address: Address, provider: Arc<Provider<Http>>) -> Self {
        Self {
            contract: RandomWinnerGame::new(address, provider),
        }
    }
}

impl GameReader for ContractReader {
    async fn game_started(&self) -> Result<bool> {
        self.contract
            .game_started()
            .call()
            .await
            .wrap_err("gameStarted() call failed")
    }

    async fn owner(&self) -> Result<Address> {
        self.contract
            .owner()
            .call()
            .await
            .wrap_err("owner() call failed")
    }
}

/// Contract bound to the unlocked wallet.
#[derive(Clone)]
pub struct ContractWriter {
    client: Arc<SignerClient>,
    contract: RandomWinnerGame<SignerClient>,
}

impl ContractWriter {
    pub fn new(address: Address, client: Arc<SignerClient>) -> Self {
        let contract = RandomWinnerGame::new(address, Arc::clone(&client));
        Self { client, contract }
    }

    pub fn signer_address(&self) -> Address {
        self.client.address()
    }
}

impl GameWriter for ContractWriter {
    async fn start_game(&self, max_players: u8, entry_fee: U256) -> Result<TxHash> {
        let call = self.contract.start_game(max_players, entry_fee);
        let pending = call.send().await.wrap_err("startGame submission failed")?;
        Ok(pending.tx_hash())
    }

    async fn join_game(&self, entry_fee: U256) -> Result<TxHash> {
        let call = self.contract.join_game().value(entry_fee);
        let pending = call.send().await.wrap_err("joinGame submission failed")?;
        Ok(pending.tx_hash())
    }

    async fn wait_mined(&self, tx_hash: TxHash) -> Result<TxReceipt> {
        let receipt = PendingTransaction::new(tx_hash, self.client.provider())
            .await
            .wrap_err_with(|| format!("waiting for {tx_hash:?} failed"))?
            .ok_or_else(|| eyre!("transaction {tx_hash:?} was dropped"))?;
        if receipt.status == Some(U64::zero()) {
            return Err(eyre!("transaction {tx_hash:?} reverted"));
        }
        Ok(TxReceipt {
            tx_hash,
            block_number: receipt.block_number.map(|n| n.as_u64()),
            gas_used: receipt.gas_used,
        })
    }
}
