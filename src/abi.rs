//! Contract bindings and bet payload encoding.

use crate::bet::{
    Bet,
    RoundId,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use ethers::{
    abi::{
        self,
        ParamType,
        Token,
    },
    contract::abigen,
    types::{
        Address,
        Bytes,
        U256,
    },
    utils::id,
};
use std::{
    fmt,
    str::FromStr,
};

abigen!(
    LabRatsToken,
    r#"[
        function transferAndCall(address to, uint256 value, bytes data) external returns (bool)
        function balanceOf(address owner) external view returns (uint256)
    ]"#
);

abigen!(
    MultiplayerGamesManager,
    r#"[
        event StartGameRound(bytes32 indexed roundId)
        event EndGameRound(bytes32 indexed roundId, bytes persistentGameData)
    ]"#
);

/// Signature of the game manager's `bet` entry point.
pub const BET_SIGNATURE: &str = "bet(bytes32,(address,uint256,bytes)[])";

/// How the bet is laid out in the `transferAndCall` data field.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PayloadFormat {
    /// `abi.encode((bytes32 roundID, (address,uint256,bytes)[] bets))`
    #[default]
    TokenTransferData,
    /// Call data for [`BET_SIGNATURE`]: selector followed by the two arguments.
    BetCall,
}

impl PayloadFormat {
    pub fn encode(self, bet: &Bet) -> Bytes {
        match self {
            PayloadFormat::TokenTransferData => encode_token_transfer_data(bet),
            PayloadFormat::BetCall => encode_bet_call(bet),
        }
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PayloadFormat::TokenTransferData => "transfer-data",
            PayloadFormat::BetCall => "bet-call",
        };
        write!(f, "{name}")
    }
}

impl FromStr for PayloadFormat {
    type Err = color_eyre::eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "transfer-data" => Ok(PayloadFormat::TokenTransferData),
            "bet-call" => Ok(PayloadFormat::BetCall),
            other => Err(eyre!(
                "unknown payload format {other:?}; expected transfer-data or bet-call"
            )),
        }
    }
}

fn bet_entry_type() -> ParamType {
    ParamType::Tuple(vec![
        ParamType::Address,
        ParamType::Uint(256),
        ParamType::Bytes,
    ])
}

/// `(bytes32 roundID, (address playerAddress, uint256 betAmount, bytes betData)[] bets)`
pub fn token_transfer_data_type() -> ParamType {
    ParamType::Tuple(bet_params())
}

fn bet_params() -> Vec<ParamType> {
    vec![
        ParamType::FixedBytes(32),
        ParamType::Array(Box::new(bet_entry_type())),
    ]
}

fn bet_fields(bet: &Bet) -> Vec<Token> {
    vec![
        Token::FixedBytes(bet.round_id.as_bytes().to_vec()),
        Token::Array(vec![Token::Tuple(vec![
            Token::Address(bet.address),
            Token::Uint(bet.amount),
            Token::Bytes(bet.data.to_vec()),
        ])]),
    ]
}

pub fn encode_token_transfer_data(bet: &Bet) -> Bytes {
    abi::encode(&[Token::Tuple(bet_fields(bet))]).into()
}

pub fn encode_bet_call(bet: &Bet) -> Bytes {
    let mut call = id(BET_SIGNATURE).to_vec();
    call.extend(abi::encode(&bet_fields(bet)));
    call.into()
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncodedBet {
    pub player_address: Address,
    pub bet_amount: U256,
    pub bet_data: Bytes,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TokenTransferData {
    pub round_id: RoundId,
    pub bets: Vec<EncodedBet>,
}

/// Inverse of [`encode_token_transfer_data`].
pub fn decode_token_transfer_data(data: &[u8]) -> Result<TokenTransferData> {
    let mut tokens = abi::decode(&[token_transfer_data_type()], data)
        .map_err(|e| eyre!("malformed token transfer data: {e}"))?;
    let fields = tokens
        .pop()
        .and_then(Token::into_tuple)
        .ok_or_else(|| eyre!("token transfer data is not a tuple"))?;
    transfer_data_from_fields(fields)
}

/// Inverse of [`encode_bet_call`].
pub fn decode_bet_call(call: &[u8]) -> Result<TokenTransferData> {
    if call.len() < 4 || call[..4] != id(BET_SIGNATURE) {
        return Err(eyre!("call data does not target {BET_SIGNATURE}"));
    }
    let fields = abi::decode(&bet_params(), &call[4..])
        .map_err(|e| eyre!("malformed bet call arguments: {e}"))?;
    transfer_data_from_fields(fields)
}

fn transfer_data_from_fields(fields: Vec<Token>) -> Result<TokenTransferData> {
    let mut fields = fields.into_iter();
    let round_id = fields
        .next()
        .and_then(Token::into_fixed_bytes)
        .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
        .map(RoundId::from)
        .ok_or_else(|| eyre!("missing round id"))?;
    let entries = fields
        .next()
        .and_then(Token::into_array)
        .ok_or_else(|| eyre!("missing bets array"))?;
    let bets = entries
        .into_iter()
        .map(|entry| {
            let mut entry = entry
                .into_tuple()
                .ok_or_else(|| eyre!("bet entry is not a tuple"))?
                .into_iter();
            let player_address = entry
                .next()
                .and_then(Token::into_address)
                .ok_or_else(|| eyre!("bet entry is missing playerAddress"))?;
            let bet_amount = entry
                .next()
                .and_then(Token::into_uint)
                .ok_or_else(|| eyre!("bet entry is missing betAmount"))?;
            let bet_data = entry
                .next()
                .and_then(Token::into_bytes)
                .ok_or_else(|| eyre!("bet entry is missing betData"))?;
            Ok(EncodedBet {
                player_address,
                bet_amount,
                bet_data: bet_data.into(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(TokenTransferData { round_id, bets })
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use proptest::prelude::*;

    fn word(hex_word: &str) -> String {
        format!("{hex_word:0>64}")
    }

    fn sample_bet() -> Bet {
        Bet {
            round_id: RoundId::from([0xaa; 32]),
            address: Address::repeat_byte(0x11),
            amount: U256::from(1000u64),
            data: Bytes::from(vec![0x05u8]),
        }
    }

    #[test]
    fn encode_token_transfer_data__matches_abi_word_layout() {
        // given
        let bet = sample_bet();

        // when
        let actual = hex::encode(encode_token_transfer_data(&bet));

        // then
        let expected = [
            word("20"),              // offset of the outer tuple
            "aa".repeat(32),         // roundID
            word("40"),              // offset of bets, relative to the tuple
            word("1"),               // bets.length
            word("20"),              // offset of bets[0]
            word(&"11".repeat(20)),  // playerAddress
            word("3e8"),             // betAmount
            word("60"),              // offset of betData, relative to bets[0]
            word("1"),               // betData.length
            format!("{:0<64}", "05"), // betData, right padded
        ]
        .concat();
        assert_eq!(actual, expected);
    }

    #[test]
    fn encode_bet_call__shares_argument_layout_with_transfer_data() {
        // given
        let bet = sample_bet();

        // when
        let call = encode_bet_call(&bet);
        let transfer_data = encode_token_transfer_data(&bet);

        // then
        assert_eq!(&call[..4], &id(BET_SIGNATURE)[..]);
        assert_eq!(&call[4..], &transfer_data[32..]);
    }

    #[test]
    fn decode_token_transfer_data__recovers_bet_fields() {
        // given
        let bet = sample_bet();
        let encoded = encode_token_transfer_data(&bet);

        // when
        let decoded = decode_token_transfer_data(&encoded).unwrap();

        // then
        let expected = TokenTransferData {
            round_id: bet.round_id,
            bets: vec![EncodedBet {
                player_address: bet.address,
                bet_amount: bet.amount,
                bet_data: bet.data.clone(),
            }],
        };
        assert_eq!(decoded, expected);
    }

    #[test]
    fn decode_bet_call__rejects_foreign_selector() {
        let mut call = encode_bet_call(&sample_bet()).to_vec();
        call[0] ^= 0xff;
        assert!(decode_bet_call(&call).is_err());
    }

    #[test]
    fn payload_format__parses_its_display_name() {
        for format in [PayloadFormat::TokenTransferData, PayloadFormat::BetCall] {
            assert_eq!(format.to_string().parse::<PayloadFormat>().unwrap(), format);
        }
        assert!("hex".parse::<PayloadFormat>().is_err());
    }

    fn arb_bet() -> impl Strategy<Value = Bet> {
        (
            any::<[u8; 32]>(),
            any::<[u8; 20]>(),
            any::<u128>(),
            proptest::collection::vec(any::<u8>(), 0..100),
        )
            .prop_map(|(round, address, amount, data)| Bet {
                round_id: RoundId::from(round),
                address: Address::from(address),
                amount: U256::from(amount),
                data: Bytes::from(data),
            })
    }

    proptest! {
        #[test]
        fn encode__is_deterministic_and_decodes_to_the_same_fields(
            bet in arb_bet(),
            use_call in any::<bool>(),
        ) {
            let format = if use_call {
                PayloadFormat::BetCall
            } else {
                PayloadFormat::TokenTransferData
            };

            let first = format.encode(&bet);
            let second = format.encode(&bet);
            prop_assert_eq!(&first, &second);

            let decoded = match format {
                PayloadFormat::TokenTransferData => decode_token_transfer_data(&first),
                PayloadFormat::BetCall => decode_bet_call(&first),
            }
            .unwrap();
            prop_assert_eq!(decoded.round_id, bet.round_id);
            prop_assert_eq!(decoded.bets.len(), 1);
            prop_assert_eq!(decoded.bets[0].player_address, bet.address);
            prop_assert_eq!(decoded.bets[0].bet_amount, bet.amount);
            prop_assert_eq!(&decoded.bets[0].bet_data, &bet.data);
        }
    }
}
