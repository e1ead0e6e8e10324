mod wallets;

use anyhow::{
    Context,
    Result,
    bail,
};
use clap::{
    ArgGroup,
    Parser,
};
use deployments::{
    DeploymentEnv,
    DeploymentRecord,
    DeploymentStore,
    StoredConstructorArgs,
};
use ethers::{
    contract::ContractFactory,
    etherscan::{
        Client as ExplorerClient,
        verify::VerifyContract,
    },
    middleware::SignerMiddleware,
    providers::{
        Http,
        Middleware,
        Provider,
    },
    signers::Signer,
    types::{
        Address,
        Chain,
    },
    utils::to_checksum,
};
use generated_abi::{
    ARTIFACT_CANDIDATES,
    CONTRACT_NAME,
    ConstructorArgs,
    LOCAL_CHAIN_ID,
    MUMBAI_CHAIN_ID,
    MUMBAI_KEY_HASH,
    MUMBAI_LINK_TOKEN,
    MUMBAI_VRF_COORDINATOR,
    MUMBAI_VRF_FEE,
};
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
    sync::Arc,
    time::Duration,
};
use tracing::{
    info,
    warn,
};
use tracing_subscriber::EnvFilter;

use crate::wallets::{
    find_wallet,
    resolve_wallet_dir,
    unlock_wallet,
};

const DEFAULT_TESTNET_RPC_URL: &str = "https://rpc-mumbai.maticvigil.com";
const DEFAULT_LOCAL_RPC_URL: &str = "http://localhost:8545";
const DEFAULT_COMPILER_VERSION: &str = "v0.8.4+commit.c7dfd78e";

#[derive(Parser, Debug)]
#[command(
    name = "random-winner-deploy",
    about = "Deploy RandomWinnerGame and verify it on the block explorer",
    version,
    group(
        ArgGroup::new("network")
            .args(["testnet", "local"])
            .required(true)
    )
)]
struct Args {
    /// Deploy to Polygon Mumbai
    #[arg(long)]
    testnet: bool,

    /// Deploy to a local node (hardhat/anvil)
    #[arg(long)]
    local: bool,

    /// Override RPC URL
    #[arg(long, env = "RANDOM_WINNER_RPC_URL")]
    rpc_url: Option<String>,

    /// Keystore name (required for deploy)
    #[arg(long, env = "RANDOM_WINNER_WALLET")]
    wallet: Option<String>,

    /// Override keystore directory (defaults to ~/.foundry/keystores)
    #[arg(long)]
    wallet_dir: Option<String>,

    /// Which action to perform (defaults to deploy)
    #[arg(short, long, value_enum, default_value = "deploy")]
    action: Action,

    /// Hardhat artifact holding the contract ABI and bytecode
    #[arg(long)]
    artifact: Option<PathBuf>,

    #[arg(long, default_value = MUMBAI_VRF_COORDINATOR)]
    vrf_coordinator: String,

    #[arg(long, default_value = MUMBAI_LINK_TOKEN)]
    link_token: String,

    #[arg(long, default_value = MUMBAI_KEY_HASH)]
    key_hash: String,

    /// VRF fee in LINK base units
    #[arg(long, default_value = MUMBAI_VRF_FEE)]
    fee: String,

    /// Seconds to wait between deployment and verification
    #[arg(long, default_value_t = 60)]
    verify_delay_secs: u64,

    /// Deploy without submitting explorer verification
    #[arg(long)]
    skip_verify: bool,

    #[arg(long, env = "POLYGONSCAN_API_KEY", hide_env_values = true)]
    explorer_api_key: Option<String>,

    /// Flattened Solidity source submitted for verification
    #[arg(long)]
    source: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_COMPILER_VERSION)]
    compiler_version: String,

    /// Optimizer runs used at compile time; omit if the optimizer was disabled
    #[arg(long)]
    optimizer_runs: Option<u32>,

    #[arg(long, default_value = CONTRACT_NAME)]
    contract_name: String,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum Action {
    Deploy,
    Verify,
    Show,
}

/// Everything needed to submit a verification request.
struct VerificationPlan {
    api_key: String,
    chain: Chain,
    source: String,
    compiler_version: String,
    optimizer_runs: Option<u32>,
    contract_name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    deployments::ensure_structure().context("initializing deployment directories")?;

    let (env, default_url) = if args.testnet {
        (DeploymentEnv::Testnet, DEFAULT_TESTNET_RPC_URL)
    } else {
        (DeploymentEnv::Local, DEFAULT_LOCAL_RPC_URL)
    };
    let rpc_url = args
        .rpc_url
        .clone()
        .unwrap_or_else(|| default_url.to_string());
    let store = DeploymentStore::new(env).context("opening deployment store")?;

    match args.action {
        Action::Show => show(&store, env),
        Action::Verify => {
            let plan = verification_plan(&args, env)?
                .ok_or_else(|| anyhow::anyhow!("verification is not available for {env}"))?;
            verify_latest(&store, &plan).await
        }
        Action::Deploy => {
            let plan = if args.skip_verify {
                None
            } else {
                verification_plan(&args, env)?
            };
            deploy(&args, env, &rpc_url, &store, plan).await
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

async fn deploy(
    args: &Args,
    env: DeploymentEnv,
    rpc_url: &str,
    store: &DeploymentStore,
    plan: Option<VerificationPlan>,
) -> Result<()> {
    let constructor_args = ConstructorArgs::parse(
        &args.vrf_coordinator,
        &args.link_token,
        &args.key_hash,
        &args.fee,
    )?;
    let artifact_path = match args.artifact.as_deref() {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(
            generated_abi::choose_artifact(&ARTIFACT_CANDIDATES)
                .context("locating contract artifact; run `cargo xtask compile` first")?,
        ),
    };
    let artifact =
        generated_abi::load_artifact(&artifact_path).context("loading contract artifact")?;
    let bytecode_hash = deployments::compute_bytecode_hash(&artifact.bytecode);

    let wallet_name = args
        .wallet
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("--wallet <name> is required when deploying"))?;
    let wallet_dir = resolve_wallet_dir(args.wallet_dir.as_deref())
        .context("resolving wallet directory")?;
    let descriptor =
        find_wallet(&wallet_dir, wallet_name).context("locating requested wallet")?;
    let wallet = unlock_wallet(&descriptor).context("unlocking keystore")?;

    let provider = Provider::<Http>::try_from(rpc_url)
        .with_context(|| format!("invalid RPC URL {rpc_url}"))?;
    let chain_id = provider
        .get_chainid()
        .await
        .context("fetching chain id")?
        .as_u64();
    check_chain_id(env, chain_id)?;

    let wallet = wallet.with_chain_id(chain_id);
    info!(deployer = %to_checksum(&wallet.address(), None), chain_id, "deploying");
    let client = Arc::new(SignerMiddleware::new(provider, wallet));
    let factory = ContractFactory::new(artifact.abi, artifact.bytecode, client);
    let (contract, receipt) = factory
        .deploy_tokens(constructor_args.tokens())
        .context("encoding constructor arguments")?
        .send_with_receipt()
        .await
        .context("deploying RandomWinnerGame")?;
    let address = contract.address();

    println!(
        "RandomWinnerGame Contract Address: {}",
        to_checksum(&address, None)
    );

    let mut record = DeploymentRecord::new(
        to_checksum(&address, None),
        format!("{:?}", receipt.transaction_hash),
        chain_id,
        rpc_url,
        bytecode_hash,
        stored_args(&constructor_args),
    );
    record.block_number = receipt.block_number.map(|n| n.as_u64());
    store.append(record).context("recording deployment")?;
    println!("Deployment metadata written to {}", store.path().display());

    let Some(plan) = plan else {
        info!("skipping explorer verification");
        return Ok(());
    };

    println!("Sleeping...");
    tokio::time::sleep(Duration::from_secs(args.verify_delay_secs)).await;

    let guid = submit_verification(&plan, address, &constructor_args).await?;
    store
        .mark_verified(Some(guid.clone()))
        .context("recording verification")?;
    println!("Verification submitted (guid {guid})");
    Ok(())
}

async fn verify_latest(store: &DeploymentStore, plan: &VerificationPlan) -> Result<()> {
    let record = store
        .load()
        .context("loading deployment records")?
        .ok_or_else(|| anyhow::anyhow!("no deployments found for this environment"))?;
    let address: Address = record
        .contract_address
        .parse()
        .context("parsing stored contract address")?;
    let stored = &record.constructor_args;
    let constructor_args = ConstructorArgs::parse(
        &stored.vrf_coordinator,
        &stored.link_token,
        &stored.key_hash,
        &stored.fee,
    )
    .context("parsing stored constructor arguments")?;

    let guid = submit_verification(plan, address, &constructor_args).await?;
    store
        .mark_verified(Some(guid.clone()))
        .context("recording verification")?;
    println!(
        "Verification submitted for {} (guid {guid})",
        record.contract_address
    );
    Ok(())
}

fn show(store: &DeploymentStore, env: DeploymentEnv) -> Result<()> {
    match store.load().context("loading deployment records")? {
        Some(record) => {
            let json = serde_json::to_string_pretty(&record)
                .context("serializing deployment record")?;
            println!("{json}");
        }
        None => println!("No deployments recorded for {env}"),
    }
    Ok(())
}

/// Returns `None` when verification cannot run for this network, and an error
/// when it could run but required inputs are missing. Checked before deploying
/// so a deployment never fails halfway on a missing flag.
fn verification_plan(args: &Args, env: DeploymentEnv) -> Result<Option<VerificationPlan>> {
    let chain = match env {
        DeploymentEnv::Testnet => Chain::PolygonMumbai,
        DeploymentEnv::Local => {
            warn!("no block explorer for local deployments; verification disabled");
            return Ok(None);
        }
    };
    let Some(api_key) = args.explorer_api_key.clone() else {
        warn!("POLYGONSCAN_API_KEY not set; verification disabled");
        return Ok(None);
    };
    let source_path = args
        .source
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("--source <flattened.sol> is required for verification"))?;
    let source = read_source(source_path)?;
    Ok(Some(VerificationPlan {
        api_key,
        chain,
        source,
        compiler_version: args.compiler_version.clone(),
        optimizer_runs: args.optimizer_runs,
        contract_name: args.contract_name.clone(),
    }))
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("reading verification source {}", path.display()))
}

async fn submit_verification(
    plan: &VerificationPlan,
    address: Address,
    constructor_args: &ConstructorArgs,
) -> Result<String> {
    let client = ExplorerClient::builder()
        .with_api_key(plan.api_key.clone())
        .chain(plan.chain)
        .context("explorer does not support this chain")?
        .build()
        .context("building explorer client")?;
    let request = VerifyContract::new(
        address,
        plan.contract_name.clone(),
        plan.source.clone(),
        plan.compiler_version.clone(),
    )
    .constructor_arguments(Some(constructor_args.encoded_hex()))
    .optimization(plan.optimizer_runs.is_some())
    .runs(plan.optimizer_runs.unwrap_or(200));

    let response = client
        .submit_contract_verification(&request)
        .await
        .context("submitting contract verification")?;
    if response.status != "1" {
        bail!(
            "explorer rejected verification: {} ({})",
            response.message,
            response.result
        );
    }
    Ok(response.result)
}

fn check_chain_id(env: DeploymentEnv, chain_id: u64) -> Result<()> {
    let expected = match env {
        DeploymentEnv::Testnet => MUMBAI_CHAIN_ID,
        DeploymentEnv::Local => LOCAL_CHAIN_ID,
    };
    if chain_id != expected {
        bail!("connected to chain {chain_id}, but {env} is chain {expected}");
    }
    Ok(())
}

fn stored_args(args: &ConstructorArgs) -> StoredConstructorArgs {
    StoredConstructorArgs {
        vrf_coordinator: to_checksum(&args.vrf_coordinator, None),
        link_token: to_checksum(&args.link_token, None),
        key_hash: format!("{:?}", args.key_hash),
        fee: args.fee.to_string(),
    }
}
