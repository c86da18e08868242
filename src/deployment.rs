use chrono::Utc;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use ethers::types::Address;
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
    io::Write,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const DEPLOYMENTS_FILE: &str = "deployments.json";

/// Token contract the game was launched with.
pub const DEFAULT_TOKEN_ADDRESS: &str = "0x11160251d4283A48B7A8808aa0ED8EA5349B56e2";
/// Game manager contract the game was launched with.
pub const DEFAULT_GAME_MANAGER_ADDRESS: &str =
    "0x6F98A24C2e76286F15B285Ba73Cb764F8D504029";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContractAddresses {
    pub token: Address,
    pub game_manager: Address,
}

impl ContractAddresses {
    /// SHA-256 over the token address followed by the game manager address.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.token.as_bytes());
        hasher.update(self.game_manager.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl Default for ContractAddresses {
    fn default() -> Self {
        Self {
            token: parse_address(DEFAULT_TOKEN_ADDRESS)
                .expect("default token address is valid"),
            game_manager: parse_address(DEFAULT_GAME_MANAGER_ADDRESS)
                .expect("default game manager address is valid"),
        }
    }
}

pub fn parse_address(raw: &str) -> Result<Address> {
    raw.parse::<Address>()
        .map_err(|e| eyre!("invalid address {raw:?}: {e}"))
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeploymentEnv {
    Test,
    Local,
}

impl DeploymentEnv {
    pub fn dir_name(self) -> &'static str {
        match self {
            DeploymentEnv::Test => "test",
            DeploymentEnv::Local => "local",
        }
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentEnv::Test => "Testnet",
            DeploymentEnv::Local => "Local",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub recorded_at: String,
    pub token_address: Address,
    pub game_manager_address: Address,
    pub network_url: String,
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub fingerprint: Option<String>,
}

impl DeploymentRecord {
    pub fn contracts(&self) -> ContractAddresses {
        ContractAddresses {
            token: self.token_address,
            game_manager: self.game_manager_address,
        }
    }

    pub fn is_for_chain(&self, chain_id: u64) -> bool {
        self.chain_id.is_none_or(|id| id == chain_id)
    }

    /// False when the addresses were edited after the record was written.
    pub fn is_intact(&self) -> bool {
        self.fingerprint
            .as_deref()
            .is_none_or(|recorded| recorded == self.contracts().fingerprint())
    }
}

#[derive(Debug)]
pub struct DeploymentStore {
    env: DeploymentEnv,
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(env: DeploymentEnv) -> Result<Self> {
        Self::new_in(DEPLOYMENTS_ROOT, env)
    }

    pub fn new_in(root: impl AsRef<Path>, env: DeploymentEnv) -> Result<Self> {
        let path = ensure_store(root.as_ref(), env)?;
        Ok(Self { env, path })
    }

    pub fn load(&self) -> Result<Vec<DeploymentRecord>> {
        read_records(&self.path)
    }

    pub fn append(&self, record: DeploymentRecord) -> Result<()> {
        let mut records = self.load()?;
        records.push(record);
        write_records(&self.path, &records)
    }

    /// Most recent intact record usable on `chain_id`.
    pub fn latest_for_chain(&self, chain_id: u64) -> Result<Option<DeploymentRecord>> {
        Ok(self.load()?.into_iter().rev().find(|record| {
            if !record.is_for_chain(chain_id) {
                return false;
            }
            if !record.is_intact() {
                tracing::warn!(
                    recorded_at = %record.recorded_at,
                    "skipping deployment record with mismatched fingerprint"
                );
                return false;
            }
            true
        }))
    }

    pub fn env(&self) -> DeploymentEnv {
        self.env
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn record_deployment(
    store: &DeploymentStore,
    contracts: ContractAddresses,
    network_url: impl AsRef<str>,
    chain_id: Option<u64>,
) -> Result<DeploymentRecord> {
    let record = DeploymentRecord {
        recorded_at: Utc::now().to_rfc3339(),
        token_address: contracts.token,
        game_manager_address: contracts.game_manager,
        network_url: network_url.as_ref().to_string(),
        chain_id,
        fingerprint: Some(contracts.fingerprint()),
    };
    store.append(record.clone())?;
    Ok(record)
}

/// Picks the addresses to talk to: explicit overrides first, then the latest
/// record for the chain, then the built-in defaults.
pub fn resolve_contracts(
    store: &DeploymentStore,
    chain_id: u64,
    token_override: Option<Address>,
    game_manager_override: Option<Address>,
) -> Result<ContractAddresses> {
    let base = match store.latest_for_chain(chain_id)? {
        Some(record) => {
            tracing::info!(
                env = %store.env(),
                recorded_at = %record.recorded_at,
                "using recorded deployment"
            );
            record.contracts()
        }
        None => {
            tracing::info!(env = %store.env(), "no deployment record; using defaults");
            ContractAddresses::default()
        }
    };
    Ok(ContractAddresses {
        token: token_override.unwrap_or(base.token),
        game_manager: game_manager_override.unwrap_or(base.game_manager),
    })
}

fn ensure_store(root: &Path, env: DeploymentEnv) -> Result<PathBuf> {
    if !root.exists() {
        fs::create_dir_all(root).wrap_err("Failed to create .deployments directory")?;
    }

    let env_dir = root.join(env.dir_name());
    if !env_dir.exists() {
        fs::create_dir_all(&env_dir).wrap_err_with(|| {
            format!("Failed to create .deployments/{} directory", env.dir_name())
        })?;
    }

    let file_path = env_dir.join(DEPLOYMENTS_FILE);
    if !file_path.exists() {
        let mut file = fs::File::create(&file_path).wrap_err_with(|| {
            format!(
                "Failed to create deployment record file for {} at {:?}",
                env, file_path
            )
        })?;
        file.write_all(b"[]").wrap_err_with(|| {
            format!("Failed to initialize deployment record file for {}", env)
        })?;
    }

    Ok(file_path)
}

fn read_records(path: impl AsRef<Path>) -> Result<Vec<DeploymentRecord>> {
    let data = fs::read(path.as_ref()).wrap_err("Failed to read deployment records")?;
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let records = serde_json::from_slice::<Vec<DeploymentRecord>>(&data)
        .wrap_err("Failed to parse deployment records JSON")?;
    Ok(records)
}

fn write_records(path: impl AsRef<Path>, records: &[DeploymentRecord]) -> Result<()> {
    let json = serde_json::to_vec_pretty(records)
        .wrap_err("Failed to serialize deployment records")?;
    fs::write(path.as_ref(), json).wrap_err("Failed to write deployment records")?;
    Ok(())
}
