use crate::{
    abi::PayloadFormat,
    actions::Action,
    bet::{
        Bet,
        BetRequest,
        RoundId,
        SessionContext,
    },
    chain::EthersChain,
    deployment::{
        self,
        ContractAddresses,
        DeploymentEnv,
        DeploymentStore,
    },
    game::{
        BlockHeader,
        GameService,
    },
    store::ChannelDispatcher,
    wallets,
};
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
        Provider,
    },
    signers::Signer,
    types::Address,
};
use futures::StreamExt;
use std::{
    io::Write,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{
    info,
    warn,
};

pub const DEFAULT_TESTNET_RPC_URL: &str = "https://rpc.sepolia.org";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://localhost:8545";
const BLOCK_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub enum NetworkTarget {
    Testnet { url: String },
    LocalNode { url: String },
}

impl NetworkTarget {
    pub fn url(&self) -> &str {
        match self {
            NetworkTarget::Testnet { url } | NetworkTarget::LocalNode { url } => url,
        }
    }

    pub fn deployment_env(&self) -> DeploymentEnv {
        match self {
            NetworkTarget::Testnet { .. } => DeploymentEnv::Test,
            NetworkTarget::LocalNode { .. } => DeploymentEnv::Local,
        }
    }
}

#[derive(Clone, Debug)]
pub enum WalletConfig {
    Keystore { name: String, dir: PathBuf },
}

#[derive(Clone, Debug)]
pub enum Command {
    /// Print the payload a bet would carry without sending it.
    Encode {
        request: BetRequest,
        session: SessionContext,
    },
    Online(OnlineCommand),
}

/// Commands that need a connected node.
#[derive(Clone, Debug)]
pub enum OnlineCommand {
    /// Poll every new block for round lifecycle events.
    Watch,
    Bet {
        request: BetRequest,
        round_id: Option<RoundId>,
        wallet: WalletConfig,
    },
    Balance {
        address: Address,
    },
    RecordDeployment,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub network: NetworkTarget,
    pub token_address: Option<Address>,
    pub game_manager_address: Option<Address>,
    pub payload_format: PayloadFormat,
    pub command: Command,
}

/// Writes every dispatched action to stdout as one JSON line.
fn spawn_action_printer(mut actions: mpsc::UnboundedReceiver<Action>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(action) = actions.recv().await {
            match serde_json::to_string(&action) {
                Ok(line) => {
                    let mut stdout = std::io::stdout().lock();
                    if writeln!(stdout, "{line}").is_err() {
                        warn!("stdout closed; dropping remaining actions");
                        break;
                    }
                }
                Err(err) => warn!(?err, tag = action.tag(), "failed to serialize action"),
            }
        }
    })
}

struct Connection {
    provider: Provider<Http>,
    chain_id: u64,
    contracts: ContractAddresses,
    store: DeploymentStore,
}

async fn connect(
    network: &NetworkTarget,
    token_override: Option<Address>,
    game_manager_override: Option<Address>,
) -> Result<Connection> {
    let url = network.url();
    let env = network.deployment_env();
    info!(%env, %url, "connecting");
    let provider = Provider::<Http>::try_from(url)
        .wrap_err_with(|| format!("Invalid RPC URL {url}"))?
        .interval(BLOCK_POLL_INTERVAL);
    let chain_id = provider
        .get_chainid()
        .await
        .wrap_err_with(|| format!("Failed to connect to provider at {url}"))?
        .as_u64();
    let store = DeploymentStore::new(env)?;
    let contracts = deployment::resolve_contracts(
        &store,
        chain_id,
        token_override,
        game_manager_override,
    )?;
    info!(
        chain_id,
        token = ?contracts.token,
        game_manager = ?contracts.game_manager,
        "connected"
    );
    Ok(Connection {
        provider,
        chain_id,
        contracts,
        store,
    })
}

fn print_payload(
    payload_format: PayloadFormat,
    request: BetRequest,
    session: &SessionContext,
) -> Result<()> {
    let bet = Bet::complete(request, session)?;
    println!("{}", payload_format.encode(&bet));
    Ok(())
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let AppConfig {
        network,
        token_address,
        game_manager_address,
        payload_format,
        command,
    } = config;

    let command = match command {
        Command::Encode { request, session } => {
            return print_payload(payload_format, request, &session);
        }
        Command::Online(command) => command,
    };

    let connection = connect(&network, token_address, game_manager_address).await?;
    let (dispatcher, actions) = ChannelDispatcher::new();
    let printer = spawn_action_printer(actions);

    let result = match command {
        OnlineCommand::Watch => watch(connection, dispatcher).await,
        OnlineCommand::Bet {
            request,
            round_id,
            wallet,
        } => {
            place_bet(
                connection,
                dispatcher,
                payload_format,
                request,
                round_id,
                wallet,
            )
            .await
        }
        OnlineCommand::Balance { address } => {
            let chain = EthersChain::new(Arc::new(connection.provider));
            let service = GameService::new(chain, dispatcher, connection.contracts);
            service.refresh_balances(address).await.map(|_| ())
        }
        OnlineCommand::RecordDeployment => {
            drop(dispatcher);
            record(&connection, network.url())
        }
    };

    // The printer stops once the last dispatcher handle is gone.
    printer.await.wrap_err("action printer panicked")?;
    result
}

fn record(connection: &Connection, network_url: &str) -> Result<()> {
    let record = deployment::record_deployment(
        &connection.store,
        connection.contracts,
        network_url,
        Some(connection.chain_id),
    )?;
    info!(
        path = %connection.store.path().display(),
        recorded_at = %record.recorded_at,
        "deployment recorded"
    );
    Ok(())
}

async fn watch(connection: Connection, dispatcher: ChannelDispatcher) -> Result<()> {
    let client = Arc::new(connection.provider);
    let service = GameService::new(
        EthersChain::new(client.clone()),
        dispatcher,
        connection.contracts,
    );
    let mut blocks = client
        .watch_blocks()
        .await
        .wrap_err("Failed to install block filter")?;
    info!("watching for round events");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            next = blocks.next() => {
                let Some(block_hash) = next else {
                    warn!("block stream ended");
                    break;
                };
                let header = BlockHeader::from(block_hash);
                match service.poll_block(&header).await {
                    Ok(0) => {}
                    Ok(count) => info!(?block_hash, count, "dispatched round updates"),
                    Err(err) => warn!(?block_hash, error = %err, "round poll failed"),
                }
            }
        }
    }
    Ok(())
}

async fn place_bet(
    connection: Connection,
    dispatcher: ChannelDispatcher,
    payload_format: PayloadFormat,
    request: BetRequest,
    round_id: Option<RoundId>,
    wallet: WalletConfig,
) -> Result<()> {
    let WalletConfig::Keystore { name, dir } = wallet;
    let descriptor = wallets::find_wallet(&dir, &name).wrap_err("Unable to locate wallet")?;
    let signer = wallets::unlock_wallet(&descriptor, connection.chain_id)?;
    let address = signer.address();
    let client = Arc::new(SignerMiddleware::new(connection.provider, signer));

    let service = GameService::new(
        EthersChain::new(client),
        dispatcher,
        connection.contracts,
    )
    .with_payload_format(payload_format);
    service.connect_account(address);

    let session = SessionContext::new(round_id, Some(address));
    let receipt = service.submit_bet(request, &session).await?;
    let block = receipt
        .confirmation
        .block_number
        .ok_or_else(|| eyre!("confirmed receipt carries no block number"))?;
    eprintln!(
        "Bet of {} on round {} confirmed in block {} (tx {:#x})",
        receipt.bet.amount, receipt.bet.round_id, block, receipt.confirmation.tx_hash
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::error::GameError;
    use ethers::types::Bytes;

    fn encode_config(session: SessionContext) -> AppConfig {
        AppConfig {
            // Nothing listens here; connecting would fail.
            network: NetworkTarget::LocalNode {
                url: "http://127.0.0.1:1".to_string(),
            },
            token_address: None,
            game_manager_address: None,
            payload_format: PayloadFormat::default(),
            command: Command::Encode {
                request: BetRequest::new(1u64, Bytes::default()),
                session,
            },
        }
    }

    #[tokio::test]
    async fn run_app__encode_completes_without_a_node() {
        // given
        let session = SessionContext::new(
            Some(RoundId::from([2u8; 32])),
            Some(Address::repeat_byte(0x10)),
        );

        // when
        let result = run_app(encode_config(session)).await;

        // then
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn run_app__encode_without_round_reports_missing_round() {
        let session = SessionContext::new(None, Some(Address::repeat_byte(0x10)));

        let err = run_app(encode_config(session)).await.unwrap_err();

        assert_eq!(err.downcast_ref::<GameError>(), Some(&GameError::MissingRound));
    }
}
