use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use ethers::{
    types::{
        Address,
        Bytes,
        U256,
    },
    utils::parse_units,
};
use lab_rats_client::{
    abi::PayloadFormat,
    bet::{
        BetRequest,
        RoundId,
        SessionContext,
    },
    client,
    deployment,
    wallets,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::EnvFilter;

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "lab-rats.log";

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: lab-rats <command> [--testnet | --local] [--rpc-url <url>] [options]\n\
         \n\
         Commands:\n\
           watch               Follow new blocks and print round updates\n\
           bet                 Place a bet (needs --wallet and --amount)\n\
           balance             Print ETH and token balances for --address\n\
           encode              Print the bet payload without sending it\n\
           record-deployment   Save the resolved contract addresses for this network\n\
         \n\
         Flags:\n\
           --testnet                    Connect to the public testnet (default RPC {})\n\
           --local                      Connect to a local node (default RPC {})\n\
           --rpc-url <url>              Override the RPC URL (testnet unless --local is given)\n\
           --wallet <name>              Keystore to sign bets with\n\
           --wallet-dir <path>          Keystore directory (defaults to ~/.lab-rats/wallets)\n\
           --token-address <addr>       Override the token contract\n\
           --game-manager-address <addr> Override the game manager contract\n\
           --format <transfer-data|bet-call> Payload layout (default {})\n\
           --amount <tokens>            Bet amount in whole tokens (18 decimals)\n\
           --data <hex>                 Opaque per-game bet data\n\
           --round <bytes32>            Round to bet on\n\
           --address <addr>             Account for balance and encode",
        client::DEFAULT_TESTNET_RPC_URL,
        client::DEFAULT_LOCAL_RPC_URL,
        PayloadFormat::default(),
    );
    std::process::exit(0);
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .ok_or_else(|| eyre!("{flag} requires an argument"))
}

fn set_once<T>(slot: &mut Option<T>, value: T, flag: &str) -> Result<()> {
    if slot.is_some() {
        return Err(eyre!("{flag} may only be specified once"));
    }
    *slot = Some(value);
    Ok(())
}

fn parse_amount(raw: &str) -> Result<U256> {
    let amount = parse_units(raw, "ether")
        .map_err(|e| eyre!("invalid amount {raw:?}: {e}"))?;
    Ok(amount.into())
}

fn parse_data(raw: &str) -> Result<Bytes> {
    raw.parse::<Bytes>()
        .map_err(|e| eyre!("invalid bet data {raw:?}: {e}"))
}

fn parse_cli_args() -> Result<client::AppConfig> {
    parse_args(std::env::args().skip(1))
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<client::AppConfig> {
    #[derive(Clone, Copy)]
    enum NetworkFlag {
        Testnet,
        Local,
    }

    #[derive(Clone, Copy)]
    enum CommandName {
        Watch,
        Bet,
        Balance,
        Encode,
        RecordDeployment,
    }

    let mut args = args.into_iter();
    let mut command: Option<CommandName> = None;
    let mut network_flag: Option<NetworkFlag> = None;
    let mut custom_url: Option<String> = None;
    let mut wallet_dir: Option<String> = None;
    let mut wallet_name: Option<String> = None;
    let mut token_address: Option<Address> = None;
    let mut game_manager_address: Option<Address> = None;
    let mut payload_format: Option<PayloadFormat> = None;
    let mut amount: Option<U256> = None;
    let mut data: Option<Bytes> = None;
    let mut round_id: Option<RoundId> = None;
    let mut address: Option<Address> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "watch" | "bet" | "balance" | "encode" | "record-deployment" => {
                let name = match arg.as_str() {
                    "watch" => CommandName::Watch,
                    "bet" => CommandName::Bet,
                    "balance" => CommandName::Balance,
                    "encode" => CommandName::Encode,
                    _ => CommandName::RecordDeployment,
                };
                if command.is_some() {
                    return Err(eyre!("Multiple commands provided; choose one"));
                }
                command = Some(name);
            }
            "--testnet" | "--local" => {
                if network_flag.is_some() {
                    return Err(eyre!(
                        "Multiple network flags provided; choose one of --testnet/--local"
                    ));
                }
                network_flag = Some(if arg == "--testnet" {
                    NetworkFlag::Testnet
                } else {
                    NetworkFlag::Local
                });
            }
            "--rpc-url" => {
                let url = next_value(&mut args, "--rpc-url")?;
                set_once(&mut custom_url, url, "--rpc-url")?;
            }
            "--wallet-dir" => {
                let dir = next_value(&mut args, "--wallet-dir")?;
                set_once(&mut wallet_dir, dir, "--wallet-dir")?;
            }
            "--wallet" => {
                let name = next_value(&mut args, "--wallet")?;
                set_once(&mut wallet_name, name, "--wallet")?;
            }
            "--token-address" => {
                let raw = next_value(&mut args, "--token-address")?;
                let parsed = deployment::parse_address(&raw)?;
                set_once(&mut token_address, parsed, "--token-address")?;
            }
            "--game-manager-address" => {
                let raw = next_value(&mut args, "--game-manager-address")?;
                let parsed = deployment::parse_address(&raw)?;
                set_once(&mut game_manager_address, parsed, "--game-manager-address")?;
            }
            "--format" => {
                let raw = next_value(&mut args, "--format")?;
                let parsed = raw.parse::<PayloadFormat>()?;
                set_once(&mut payload_format, parsed, "--format")?;
            }
            "--amount" => {
                let raw = next_value(&mut args, "--amount")?;
                set_once(&mut amount, parse_amount(&raw)?, "--amount")?;
            }
            "--data" => {
                let raw = next_value(&mut args, "--data")?;
                set_once(&mut data, parse_data(&raw)?, "--data")?;
            }
            "--round" => {
                let raw = next_value(&mut args, "--round")?;
                let parsed = raw
                    .parse::<RoundId>()
                    .wrap_err_with(|| format!("invalid round id {raw:?}"))?;
                set_once(&mut round_id, parsed, "--round")?;
            }
            "--address" => {
                let raw = next_value(&mut args, "--address")?;
                set_once(&mut address, deployment::parse_address(&raw)?, "--address")?;
            }
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    let command = command.ok_or_else(|| {
        eyre!("Choose a command: watch, bet, balance, encode or record-deployment")
    })?;

    let network = match network_flag {
        Some(NetworkFlag::Testnet) | None => client::NetworkTarget::Testnet {
            url: custom_url
                .unwrap_or_else(|| client::DEFAULT_TESTNET_RPC_URL.to_string()),
        },
        Some(NetworkFlag::Local) => client::NetworkTarget::LocalNode {
            url: custom_url.unwrap_or_else(|| client::DEFAULT_LOCAL_RPC_URL.to_string()),
        },
    };

    let request = || -> Result<BetRequest> {
        let amount = amount.ok_or_else(|| eyre!("Specify --amount <tokens>"))?;
        Ok(BetRequest::new(amount, data.clone().unwrap_or_default()))
    };

    let command = match command {
        CommandName::Watch => client::Command::Online(client::OnlineCommand::Watch),
        CommandName::Bet => {
            let name = wallet_name
                .ok_or_else(|| eyre!("Specify --wallet <name> to sign the bet"))?;
            let dir = wallets::resolve_wallet_dir(wallet_dir.as_deref())?;
            client::Command::Online(client::OnlineCommand::Bet {
                request: request()?,
                round_id,
                wallet: client::WalletConfig::Keystore { name, dir },
            })
        }
        CommandName::Balance => client::Command::Online(client::OnlineCommand::Balance {
            address: address
                .ok_or_else(|| eyre!("Specify --address <addr> to read balances"))?,
        }),
        CommandName::Encode => client::Command::Encode {
            request: request()?,
            session: SessionContext::new(round_id, address),
        },
        CommandName::RecordDeployment => {
            client::Command::Online(client::OnlineCommand::RecordDeployment)
        }
    };

    Ok(client::AppConfig {
        network,
        token_address,
        game_manager_address,
        payload_format: payload_format.unwrap_or_default(),
        command,
    })
}

/// Logs go to a daily file; stdout is reserved for the action stream.
fn init_tracing() -> WorkerGuard {
    let appender = rolling::daily(LOG_DIR, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let _guard = init_tracing();
    tracing::info!("starting lab-rats client");
    let app_config = parse_cli_args()?;
    client::run_app(app_config).await
}
