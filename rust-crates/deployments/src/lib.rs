use anyhow::{
    Context,
    Result,
    anyhow,
};
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha256,
};
use std::{
    fmt,
    fs,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const DEPLOYMENTS_FILE: &str = "deployments.json";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeploymentEnv {
    Testnet,
    Local,
}

impl DeploymentEnv {
    pub fn dir_name(self) -> &'static str {
        match self {
            DeploymentEnv::Testnet => "mumbai",
            DeploymentEnv::Local => "local",
        }
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentEnv::Testnet => "Mumbai testnet",
            DeploymentEnv::Local => "Local",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConstructorArgs {
    pub vrf_coordinator: String,
    pub link_token: String,
    pub key_hash: String,
    pub fee: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub deployed_at: String,
    pub contract_address: String,
    pub tx_hash: String,
    pub chain_id: u64,
    pub network_url: String,
    pub bytecode_hash: String,
    pub constructor_args: StoredConstructorArgs,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub verification_guid: Option<String>,
}

impl DeploymentRecord {
    pub fn new(
        contract_address: impl Into<String>,
        tx_hash: impl Into<String>,
        chain_id: u64,
        network_url: impl Into<String>,
        bytecode_hash: impl Into<String>,
        constructor_args: StoredConstructorArgs,
    ) -> Self {
        Self {
            deployed_at: Utc::now().to_rfc3339(),
            contract_address: contract_address.into(),
            tx_hash: tx_hash.into(),
            chain_id,
            network_url: network_url.into(),
            bytecode_hash: bytecode_hash.into(),
            constructor_args,
            block_number: None,
            verified: false,
            verification_guid: None,
        }
    }

    pub fn is_compatible_with_hash(&self, hash: &str) -> bool {
        self.bytecode_hash == hash
    }
}

/// Deployment history for one environment, newest record last.
#[derive(Debug)]
pub struct DeploymentStore {
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(env: DeploymentEnv) -> Result<Self> {
        Self::new_in(DEPLOYMENTS_ROOT, env)
    }

    pub fn new_in(root: impl AsRef<Path>, env: DeploymentEnv) -> Result<Self> {
        let path = ensure_store(root.as_ref(), env)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<DeploymentRecord>> {
        Ok(read_records(&self.path)?.pop())
    }

    pub fn history(&self) -> Result<Vec<DeploymentRecord>> {
        read_records(&self.path)
    }

    pub fn append(&self, record: DeploymentRecord) -> Result<()> {
        let mut records = read_records(&self.path)?;
        records.push(record);
        write_records(&self.path, &records)
    }

    /// Marks the latest deployment as submitted for explorer verification.
    pub fn mark_verified(&self, guid: Option<String>) -> Result<DeploymentRecord> {
        let mut records = read_records(&self.path)?;
        let latest = records
            .last_mut()
            .ok_or_else(|| anyhow!("no deployments recorded in {}", self.path.display()))?;
        latest.verified = true;
        latest.verification_guid = guid;
        let updated = latest.clone();
        write_records(&self.path, &records)?;
        Ok(updated)
    }
}

pub fn compute_bytecode_hash(bytecode: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytecode.as_ref());
    format!("{:x}", hasher.finalize())
}

pub fn ensure_structure() -> Result<()> {
    for env in [DeploymentEnv::Testnet, DeploymentEnv::Local] {
        let _ = ensure_store(Path::new(DEPLOYMENTS_ROOT), env)?;
    }
    Ok(())
}

fn ensure_store(root: &Path, env: DeploymentEnv) -> Result<PathBuf> {
    let env_dir = root.join(env.dir_name());
    if !env_dir.exists() {
        fs::create_dir_all(&env_dir).with_context(|| {
            format!("Failed to create {} directory", env_dir.display())
        })?;
    }

    let file_path = env_dir.join(DEPLOYMENTS_FILE);
    if !file_path.exists() {
        fs::write(&file_path, b"[]").with_context(|| {
            format!(
                "Failed to create deployment record file for {} at {:?}",
                env, file_path
            )
        })?;
    }

    Ok(file_path)
}

fn read_records(path: impl AsRef<Path>) -> Result<Vec<DeploymentRecord>> {
    let data = fs::read(path.as_ref()).context("Failed to read deployment records")?;
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    if let Ok(records) = serde_json::from_slice::<Vec<DeploymentRecord>>(&data) {
        return Ok(records);
    }
    let record = serde_json::from_slice::<DeploymentRecord>(&data)
        .context("Failed to parse deployment records JSON")?;
    Ok(vec![record])
}

fn write_records(path: impl AsRef<Path>, records: &[DeploymentRecord]) -> Result<()> {
    let json = serde_json::to_vec_pretty(records)
        .context("Failed to serialize deployment records")?;
    fs::write(path.as_ref(), json).context("Failed to write deployment records")?;
    Ok(())
}
