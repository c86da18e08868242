use crate::{
    abi::{
        LabRatsToken,
        MultiplayerGamesManager,
    },
    bet::RoundId,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use ethers::{
    contract::LogMeta,
    providers::{
        Middleware,
        PendingTransaction,
    },
    types::{
        Address,
        Bytes,
        H256,
        U64,
        U256,
    },
};
use std::{
    fmt,
    sync::Arc,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RoundEventKind {
    Start,
    End,
}

impl RoundEventKind {
    pub fn event_name(self) -> &'static str {
        match self {
            RoundEventKind::Start => "StartGameRound",
            RoundEventKind::End => "EndGameRound",
        }
    }
}

impl fmt::Display for RoundEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.event_name())
    }
}

/// One round lifecycle log emitted by the game manager.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RoundLog {
    pub round_id: RoundId,
    pub persistent_game_data: Option<Bytes>,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: H256,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxConfirmation {
    pub tx_hash: H256,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
}

/// Everything the game needs from the wallet and the contracts.
pub trait GameChain {
    /// Sends `transferAndCall(to, amount, data)` on `token`, returning the
    /// transaction hash once it has been accepted by the node.
    fn transfer_and_call(
        &self,
        token: Address,
        to: Address,
        amount: U256,
        data: Bytes,
    ) -> impl Future<Output = Result<H256>>;

    fn wait_for_confirmations(
        &self,
        tx_hash: H256,
        confirmations: usize,
    ) -> impl Future<Output = Result<TxConfirmation>>;

    /// Logs of `kind` emitted by `game_manager` in the block `block_hash`, in
    /// log order.
    fn round_events(
        &self,
        game_manager: Address,
        kind: RoundEventKind,
        block_hash: H256,
    ) -> impl Future<Output = Result<Vec<RoundLog>>>;

    fn eth_balance(&self, address: Address) -> impl Future<Output = Result<U256>>;

    fn token_balance(
        &self,
        token: Address,
        address: Address,
    ) -> impl Future<Output = Result<U256>>;
}

/// [`GameChain`] backed by an ethers middleware stack.
pub struct EthersChain<M> {
    client: Arc<M>,
}

impl<M> Clone for EthersChain<M> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
        }
    }
}

impl<M: Middleware + 'static> EthersChain<M> {
    pub fn new(client: Arc<M>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<M> {
        &self.client
    }
}

fn round_log(
    round_id: [u8; 32],
    persistent_game_data: Option<Bytes>,
    meta: LogMeta,
) -> RoundLog {
    RoundLog {
        round_id: RoundId::from(round_id),
        persistent_game_data,
        block_number: meta.block_number.as_u64(),
        log_index: meta.log_index.as_u64(),
        transaction_hash: meta.transaction_hash,
    }
}

impl<M: Middleware + 'static> GameChain for EthersChain<M> {
    async fn transfer_and_call(
        &self,
        token: Address,
        to: Address,
        amount: U256,
        data: Bytes,
    ) -> Result<H256> {
        let token = LabRatsToken::new(token, self.client.clone());
        let call = token.transfer_and_call(to, amount, data);
        let pending = call
            .send()
            .await
            .wrap_err("Failed to send transferAndCall")?;
        Ok(pending.tx_hash())
    }

    async fn wait_for_confirmations(
        &self,
        tx_hash: H256,
        confirmations: usize,
    ) -> Result<TxConfirmation> {
        let receipt = PendingTransaction::new(tx_hash, self.client.provider())
            .confirmations(confirmations)
            .await
            .wrap_err_with(|| format!("Failed waiting for transaction {tx_hash:#x}"))?
            .ok_or_else(|| eyre!("transaction {tx_hash:#x} was dropped"))?;
        if receipt.status == Some(U64::zero()) {
            return Err(eyre!("transaction {tx_hash:#x} reverted"));
        }
        Ok(TxConfirmation {
            tx_hash,
            block_number: receipt.block_number.map(|n| n.as_u64()),
            gas_used: receipt.gas_used,
        })
    }

    async fn round_events(
        &self,
        game_manager: Address,
        kind: RoundEventKind,
        block_hash: H256,
    ) -> Result<Vec<RoundLog>> {
        let manager = MultiplayerGamesManager::new(game_manager, self.client.clone());
        let mut logs: Vec<RoundLog> = match kind {
            RoundEventKind::Start => manager
                .start_game_round_filter()
                .at_block_hash(block_hash)
                .query_with_meta()
                .await
                .wrap_err_with(|| format!("Failed to query {kind} logs"))?
                .into_iter()
                .map(|(event, meta)| round_log(event.round_id, None, meta))
                .collect(),
            RoundEventKind::End => manager
                .end_game_round_filter()
                .at_block_hash(block_hash)
                .query_with_meta()
                .await
                .wrap_err_with(|| format!("Failed to query {kind} logs"))?
                .into_iter()
                .map(|(event, meta)| {
                    let data = Some(event.persistent_game_data)
                        .filter(|data| !data.is_empty());
                    round_log(event.round_id, data, meta)
                })
                .collect(),
        };
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs)
    }

    async fn eth_balance(&self, address: Address) -> Result<U256> {
        self.client
            .get_balance(address, None)
            .await
            .wrap_err("Failed to fetch native balance")
    }

    async fn token_balance(&self, token: Address, address: Address) -> Result<U256> {
        LabRatsToken::new(token, self.client.clone())
            .balance_of(address)
            .call()
            .await
            .wrap_err("Failed to fetch token balance")
    }
}
