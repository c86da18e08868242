use crate::error::GameError;
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
use serde::{
    Serialize,
    Serializer,
};
use std::{
    fmt,
    str::FromStr,
};

/// Identifier of a game round (`bytes32` on chain).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct RoundId(pub [u8; 32]);

impl RoundId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for RoundId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<H256> for RoundId {
    fn from(hash: H256) -> Self {
        Self(hash.0)
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for RoundId {
    type Err = color_eyre::eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim_start_matches("0x");
        let bytes = hex::decode(raw).map_err(|e| eyre!("invalid round id {s:?}: {e}"))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            eyre!("round id must be 32 bytes, got {} bytes", v.len())
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for RoundId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A wager as entered by the user, before session context is attached.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BetRequest {
    pub amount: U256,
    pub data: Bytes,
}

impl BetRequest {
    pub fn new(amount: impl Into<U256>, data: impl Into<Bytes>) -> Self {
        Self {
            amount: amount.into(),
            data: data.into(),
        }
    }
}

/// Round and account the caller is currently acting in.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SessionContext {
    pub round_id: Option<RoundId>,
    pub address: Option<Address>,
}

impl SessionContext {
    pub fn new(round_id: Option<RoundId>, address: Option<Address>) -> Self {
        Self { round_id, address }
    }
}

/// A bet ready for submission.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Bet {
    pub round_id: RoundId,
    pub address: Address,
    pub amount: U256,
    pub data: Bytes,
}

impl Bet {
    /// Attach the active round and account to `request`.
    pub fn complete(
        request: BetRequest,
        session: &SessionContext,
    ) -> Result<Self, GameError> {
        let round_id = session.round_id.ok_or(GameError::MissingRound)?;
        let address = session.address.ok_or(GameError::MissingAccount)?;
        Ok(Self {
            round_id,
            address,
            amount: request.amount,
            data: request.data,
        })
    }
}
