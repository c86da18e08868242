//! In-memory stand-ins for the chain and the store.

use crate::{
    actions::Action,
    bet::RoundId,
    chain::{
        GameChain,
        RoundEventKind,
        RoundLog,
        TxConfirmation,
    },
    store::Dispatch,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use ethers::types::{
    Address,
    Bytes,
    H256,
    U256,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
};

pub const FAKE_BLOCK_NUMBER: u64 = 100;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChainCall {
    TransferAndCall {
        token: Address,
        to: Address,
        amount: U256,
        data: Bytes,
    },
    WaitForConfirmations {
        tx_hash: H256,
        confirmations: usize,
    },
    RoundEvents {
        game_manager: Address,
        kind: RoundEventKind,
        block_hash: H256,
    },
    EthBalance {
        address: Address,
    },
    TokenBalance {
        token: Address,
        address: Address,
    },
}

/// Records every call and answers from canned data.
#[derive(Clone, Default)]
pub struct FakeChain {
    calls: Arc<Mutex<Vec<ChainCall>>>,
    round_logs: HashMap<(RoundEventKind, H256), Vec<RoundLog>>,
    transfer_error: Option<String>,
    confirmation_error: Option<String>,
    query_error: Option<String>,
    eth_balance: U256,
    token_balance: U256,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_round_logs(
        mut self,
        kind: RoundEventKind,
        block_hash: H256,
        logs: Vec<RoundLog>,
    ) -> Self {
        self.round_logs.insert((kind, block_hash), logs);
        self
    }

    pub fn with_balances(mut self, eth: U256, token: U256) -> Self {
        self.eth_balance = eth;
        self.token_balance = token;
        self
    }

    pub fn failing_transfers(mut self, message: impl Into<String>) -> Self {
        self.transfer_error = Some(message.into());
        self
    }

    /// The transfer is sent but waiting for it fails, as for a revert.
    pub fn failing_confirmations(mut self, message: impl Into<String>) -> Self {
        self.confirmation_error = Some(message.into());
        self
    }

    pub fn failing_queries(mut self, message: impl Into<String>) -> Self {
        self.query_error = Some(message.into());
        self
    }

    pub fn calls(&self) -> Vec<ChainCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: ChainCall) -> usize {
        let mut guard = self.calls.lock().unwrap();
        guard.push(call);
        guard.len()
    }
}

impl GameChain for FakeChain {
    async fn transfer_and_call(
        &self,
        token: Address,
        to: Address,
        amount: U256,
        data: Bytes,
    ) -> Result<H256> {
        let nonce = self.record(ChainCall::TransferAndCall {
            token,
            to,
            amount,
            data,
        });
        match &self.transfer_error {
            Some(message) => Err(eyre!("{message}")),
            None => Ok(H256::from_low_u64_be(nonce as u64)),
        }
    }

    async fn wait_for_confirmations(
        &self,
        tx_hash: H256,
        confirmations: usize,
    ) -> Result<TxConfirmation> {
        self.record(ChainCall::WaitForConfirmations {
            tx_hash,
            confirmations,
        });
        if let Some(message) = &self.confirmation_error {
            return Err(eyre!("{message}"));
        }
        Ok(TxConfirmation {
            tx_hash,
            block_number: Some(FAKE_BLOCK_NUMBER),
            gas_used: Some(U256::from(21_000u64)),
        })
    }

    async fn round_events(
        &self,
        game_manager: Address,
        kind: RoundEventKind,
        block_hash: H256,
    ) -> Result<Vec<RoundLog>> {
        self.record(ChainCall::RoundEvents {
            game_manager,
            kind,
            block_hash,
        });
        if let Some(message) = &self.query_error {
            return Err(eyre!("{message}"));
        }
        Ok(self
            .round_logs
            .get(&(kind, block_hash))
            .cloned()
            .unwrap_or_default())
    }

    async fn eth_balance(&self, address: Address) -> Result<U256> {
        self.record(ChainCall::EthBalance { address });
        if let Some(message) = &self.query_error {
            return Err(eyre!("{message}"));
        }
        Ok(self.eth_balance)
    }

    async fn token_balance(&self, token: Address, address: Address) -> Result<U256> {
        self.record(ChainCall::TokenBalance { token, address });
        if let Some(message) = &self.query_error {
            return Err(eyre!("{message}"));
        }
        Ok(self.token_balance)
    }
}

/// Keeps every dispatched action for later inspection.
#[derive(Clone, Default)]
pub struct RecordingDispatcher {
    actions: Arc<Mutex<Vec<Action>>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().unwrap().clone()
    }
}

impl Dispatch for RecordingDispatcher {
    fn dispatch(&self, action: Action) {
        self.actions.lock().unwrap().push(action);
    }
}

/// A log in block [`FAKE_BLOCK_NUMBER`] with no game data.
pub fn round_log(round_id: RoundId, log_index: u64) -> RoundLog {
    RoundLog {
        round_id,
        persistent_game_data: None,
        block_number: FAKE_BLOCK_NUMBER,
        log_index,
        transaction_hash: H256::from_low_u64_be(log_index + 1),
    }
}
