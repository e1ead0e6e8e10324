use anyhow::{
    Context,
    Result,
};
use ethers::{
    abi::{
        Abi,
        Token,
    },
    contract::abigen,
    types::{
        Address,
        Bytes,
        H256,
        U256,
    },
};
use serde::Deserialize;
use std::{
    fs,
    path::Path,
};

abigen!(
    RandomWinnerGame,
    r#"[
        function gameStarted() external view returns (bool)
        function owner() external view returns (address)
        function startGame(uint8 _maxPlayers, uint256 _entryFee) external
        function joinGame() external payable
    ]"#
);

pub const MUMBAI_CHAIN_ID: u64 = 80001;
pub const LOCAL_CHAIN_ID: u64 = 31337;

/// Chainlink VRF v1 coordinator on Polygon Mumbai.
pub const MUMBAI_VRF_COORDINATOR: &str = "0x8C7382F9D8f56b33781fE506E897a4F1e2d17255";
/// LINK token on Polygon Mumbai.
pub const MUMBAI_LINK_TOKEN: &str = "0x326C977E6efc84E512bB9C30f76E30c160eD06FB";
pub const MUMBAI_KEY_HASH: &str =
    "0x6e75b569a01ef56d18cab6a8e71e6600d6ce853834d4a5748b720d06f878b3a4";
/// 0.0001 LINK, in the token's smallest unit.
pub const MUMBAI_VRF_FEE: &str = "100000000000000";

pub const CONTRACT_NAME: &str = "RandomWinnerGame";
pub const ARTIFACT_CANDIDATES: [&str; 2] = [
    "./hardhat-backend/artifacts/contracts/RandomWinnerGame.sol/RandomWinnerGame.json",
    "../hardhat-backend/artifacts/contracts/RandomWinnerGame.sol/RandomWinnerGame.json",
];

/// The subset of a hardhat compilation artifact needed to deploy a contract.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardhatArtifact {
    pub contract_name: String,
    pub abi: Abi,
    pub bytecode: Bytes,
}

pub fn load_artifact(path: impl AsRef<Path>) -> Result<HardhatArtifact> {
    let path = path.as_ref();
    let data = fs::read(path)
        .with_context(|| format!("Failed to read hardhat artifact {}", path.display()))?;
    let artifact: HardhatArtifact = serde_json::from_slice(&data)
        .with_context(|| format!("Invalid hardhat artifact JSON in {}", path.display()))?;
    anyhow::ensure!(
        !artifact.bytecode.is_empty(),
        "artifact {} has no bytecode; is {} an abstract contract?",
        path.display(),
        artifact.contract_name
    );
    Ok(artifact)
}

pub fn choose_artifact<'a>(paths: &'a [&str]) -> Result<&'a str> {
    paths
        .iter()
        .find(|p| Path::new(p).exists())
        .copied()
        .ok_or_else(|| anyhow::anyhow!("Contract artifact not found. Tried {:?}", paths))
}

/// Arguments of the RandomWinnerGame constructor, in declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstructorArgs {
    pub vrf_coordinator: Address,
    pub link_token: Address,
    pub key_hash: H256,
    pub fee: U256,
}

impl ConstructorArgs {
    pub fn mumbai() -> Result<Self> {
        Self::parse(
            MUMBAI_VRF_COORDINATOR,
            MUMBAI_LINK_TOKEN,
            MUMBAI_KEY_HASH,
            MUMBAI_VRF_FEE,
        )
    }

    pub fn parse(
        vrf_coordinator: &str,
        link_token: &str,
        key_hash: &str,
        fee: &str,
    ) -> Result<Self> {
        Ok(Self {
            vrf_coordinator: vrf_coordinator
                .parse()
                .with_context(|| format!("invalid VRF coordinator address {vrf_coordinator}"))?,
            link_token: link_token
                .parse()
                .with_context(|| format!("invalid LINK token address {link_token}"))?,
            key_hash: key_hash
                .parse()
                .with_context(|| format!("invalid key hash {key_hash}"))?,
            fee: U256::from_dec_str(fee)
                .with_context(|| format!("invalid VRF fee {fee}"))?,
        })
    }

    pub fn tokens(&self) -> Vec<Token> {
        vec![
            Token::Address(self.vrf_coordinator),
            Token::Address(self.link_token),
            Token::FixedBytes(self.key_hash.as_bytes().to_vec()),
            Token::Uint(self.fee),
        ]
    }

    /// ABI-encoded arguments as explorers expect them: hex without `0x`.
    pub fn encoded_hex(&self) -> String {
        ethers::utils::hex::encode(ethers::abi::encode(&self.tokens()))
    }
}
