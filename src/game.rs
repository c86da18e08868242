use crate::{
    abi::PayloadFormat,
    actions::{
        Action,
        GameAction,
        RoundResult,
        UserAction,
        UserError,
    },
    bet::{
        Bet,
        BetRequest,
        SessionContext,
    },
    broadcast::BetBroadcaster,
    chain::{
        GameChain,
        RoundEventKind,
        RoundLog,
        TxConfirmation,
    },
    deployment::ContractAddresses,
    store::Dispatch,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use ethers::{
    types::{
        Address,
        Bytes,
        H256,
        U256,
    },
    utils::format_units,
};
use tokio::sync::broadcast;
use tracing::{
    debug,
    error,
    info,
};

/// Confirmations awaited after a bet transaction is sent.
pub const CONFIRMATIONS: usize = 1;

/// Reference to the block a poll is scoped to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BlockHeader {
    pub block_hash: H256,
}

impl From<H256> for BlockHeader {
    fn from(block_hash: H256) -> Self {
        Self { block_hash }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BetReceipt {
    pub bet: Bet,
    pub confirmation: TxConfirmation,
}

pub struct GameService<C, D> {
    chain: C,
    dispatcher: D,
    contracts: ContractAddresses,
    payload_format: PayloadFormat,
    broadcaster: BetBroadcaster,
}

impl<C: GameChain, D: Dispatch> GameService<C, D> {
    pub fn new(chain: C, dispatcher: D, contracts: ContractAddresses) -> Self {
        Self {
            chain,
            dispatcher,
            contracts,
            payload_format: PayloadFormat::default(),
            broadcaster: BetBroadcaster::default(),
        }
    }

    pub fn with_payload_format(mut self, payload_format: PayloadFormat) -> Self {
        self.payload_format = payload_format;
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: BetBroadcaster) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    pub fn contracts(&self) -> &ContractAddresses {
        &self.contracts
    }

    /// Bets confirmed by this service from now on.
    pub fn subscribe_bets(&self) -> broadcast::Receiver<Bet> {
        self.broadcaster.subscribe()
    }

    fn dispatch(&self, action: impl Into<Action>) {
        self.dispatcher.dispatch(action.into());
    }

    /// Places `request` on the round in `session` through the token's
    /// `transferAndCall`, then waits for [`CONFIRMATIONS`] blocks.
    ///
    /// A session without an active round (or without an account) fails before
    /// the chain is touched; the reason is also dispatched as a user error.
    pub async fn submit_bet(
        &self,
        request: BetRequest,
        session: &SessionContext,
    ) -> Result<BetReceipt> {
        let bet = match Bet::complete(request, session) {
            Ok(bet) => bet,
            Err(err) => {
                self.dispatch(UserAction::SetUserError(Some(err.user_error())));
                return Err(err.into());
            }
        };
        let payload = self.payload_format.encode(&bet);
        info!(
            round_id = %bet.round_id,
            token = ?self.contracts.token,
            game_manager = ?self.contracts.game_manager,
            amount = %bet.amount,
            bet_data = %bet.data,
            payload = %payload,
            format = %self.payload_format,
            "sending transferAndCall"
        );

        self.dispatch(UserAction::SetLoading(true));
        let outcome = self.send_and_confirm(&bet, payload).await;
        self.dispatch(UserAction::SetLoading(false));

        match outcome {
            Ok(confirmation) => {
                info!(
                    tx_hash = ?confirmation.tx_hash,
                    block_number = ?confirmation.block_number,
                    "bet confirmed"
                );
                let subscribers = self.broadcaster.publish(bet.clone());
                debug!(subscribers, "bet broadcast");
                Ok(BetReceipt { bet, confirmation })
            }
            Err(err) => {
                error!(round_id = %bet.round_id, error = %err, "bet failed");
                self.dispatch(UserAction::SetUserError(Some(UserError::TransactionFailed)));
                Err(err)
            }
        }
    }

    async fn send_and_confirm(&self, bet: &Bet, payload: Bytes) -> Result<TxConfirmation> {
        let tx_hash = self
            .chain
            .transfer_and_call(
                self.contracts.token,
                self.contracts.game_manager,
                bet.amount,
                payload,
            )
            .await?;
        debug!(?tx_hash, "transferAndCall sent");
        self.chain
            .wait_for_confirmations(tx_hash, CONFIRMATIONS)
            .await
    }

    async fn round_logs(
        &self,
        kind: RoundEventKind,
        header: &BlockHeader,
    ) -> Result<Vec<RoundLog>> {
        let logs = self
            .chain
            .round_events(self.contracts.game_manager, kind, header.block_hash)
            .await?;
        debug!(
            event = %kind,
            block_hash = ?header.block_hash,
            count = logs.len(),
            "queried round logs"
        );
        Ok(logs)
    }

    /// Dispatches a round id update for every `StartGameRound` in the block.
    pub async fn poll_round_start(&self, header: &BlockHeader) -> Result<usize> {
        let logs = self.round_logs(RoundEventKind::Start, header).await?;
        for log in &logs {
            info!(round_id = %log.round_id, "round started");
            self.dispatch(GameAction::SetRoundId(log.round_id));
        }
        Ok(logs.len())
    }

    /// Dispatches a round result for every `EndGameRound` in the block.
    pub async fn poll_round_end(&self, header: &BlockHeader) -> Result<usize> {
        let logs = self.round_logs(RoundEventKind::End, header).await?;
        let count = logs.len();
        for log in logs {
            info!(round_id = %log.round_id, "round ended");
            self.dispatch(GameAction::SetResult(RoundResult {
                round_id: log.round_id,
                block_number: log.block_number,
                log_index: log.log_index,
                transaction_hash: log.transaction_hash,
                persistent_game_data: log.persistent_game_data,
            }));
        }
        Ok(count)
    }

    /// Runs both round polls against one block, starts first.
    pub async fn poll_block(&self, header: &BlockHeader) -> Result<usize> {
        let started = self.poll_round_start(header).await?;
        let ended = self.poll_round_end(header).await?;
        Ok(started + ended)
    }

    /// Records a freshly connected account in the store.
    pub fn connect_account(&self, address: Address) {
        self.dispatch(UserAction::SetAddress(format!("{address:#x}")));
        self.dispatch(UserAction::SetAuthenticated(true));
    }

    pub fn disconnect_account(&self) {
        self.dispatch(UserAction::ClearUserState);
    }

    /// Reads native and token balances of `address` into the store.
    ///
    /// Both balances are set while the display is frozen so the UI never
    /// shows one fresh balance next to a stale one. A failed read sets neither.
    pub async fn refresh_balances(&self, address: Address) -> Result<(f64, f64)> {
        self.dispatch(UserAction::FreezeDisplayBalance);
        let balances = self.read_balances(address).await;
        if let Ok((eth, token)) = &balances {
            self.dispatch(UserAction::SetEthBalance(*eth));
            self.dispatch(UserAction::SetTokenBalance(*token));
        }
        self.dispatch(UserAction::UnfreezeDisplayBalance);
        balances
    }

    async fn read_balances(&self, address: Address) -> Result<(f64, f64)> {
        let eth = self.chain.eth_balance(address).await?;
        let token = self
            .chain
            .token_balance(self.contracts.token, address)
            .await?;
        Ok((display_units(eth)?, display_units(token)?))
    }
}

/// Converts an 18-decimal amount into whole units for display.
pub fn display_units(amount: U256) -> Result<f64> {
    let formatted = format_units(amount, "ether").wrap_err("Failed to format amount")?;
    formatted
        .parse::<f64>()
        .wrap_err_with(|| format!("Failed to parse formatted amount {formatted}"))
}
