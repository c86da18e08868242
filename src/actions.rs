//! Messages dispatched to the store.
//!
//! Every action serializes to `{"type": TAG, "payload": ...}`; variants without
//! a payload serialize to `{"type": TAG}`.

use crate::bet::RoundId;
use ethers::types::{
    Bytes,
    H256,
};
use serde::Serialize;
use std::fmt;

pub const SET_USER_ERROR: &str = "SET_USER_ERROR";
pub const SET_AUTHENTICATED: &str = "SET_AUTHENTICATED";
pub const SET_ETH_BALANCE: &str = "SET_ETH_BALANCE";
pub const SET_TOKEN_BALANCE: &str = "SET_TOKEN_BALANCE";
pub const SET_ADDRESS: &str = "SET_ADDRESS";
pub const SET_LOADING: &str = "SET_LOADING";
pub const CLEAR_USER_STATE: &str = "CLEAR_USER_STATE";
pub const FREEZE_DISPLAY_BALANCE: &str = "FREEZE_DISPLAY_BALANCE";
pub const UNFREEZE_DISPLAY_BALANCE: &str = "UNFREEZE_DISPLAY_BALANCE";

pub const SET_ROUND_ID: &str = "SET_ROUND_ID";
pub const SET_RESULT: &str = "SET_RESULT";

/// Error codes surfaced to the user.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserError {
    InvalidRoundId,
    AccountNotConnected,
    TransactionFailed,
    Unknown(String),
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserError::InvalidRoundId => write!(f, "Invalid round ID"),
            UserError::AccountNotConnected => write!(f, "Wallet not connected"),
            UserError::TransactionFailed => write!(f, "Transaction failed"),
            UserError::Unknown(message) => write!(f, "{message}"),
        }
    }
}

/// Mutations of the user-session slice of the store.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE"
)]
pub enum UserAction {
    SetUserError(Option<UserError>),
    SetAuthenticated(bool),
    SetEthBalance(f64),
    SetTokenBalance(f64),
    SetAddress(String),
    SetLoading(bool),
    ClearUserState,
    FreezeDisplayBalance,
    UnfreezeDisplayBalance,
}

impl UserAction {
    pub fn tag(&self) -> &'static str {
        match self {
            UserAction::SetUserError(_) => SET_USER_ERROR,
            UserAction::SetAuthenticated(_) => SET_AUTHENTICATED,
            UserAction::SetEthBalance(_) => SET_ETH_BALANCE,
            UserAction::SetTokenBalance(_) => SET_TOKEN_BALANCE,
            UserAction::SetAddress(_) => SET_ADDRESS,
            UserAction::SetLoading(_) => SET_LOADING,
            UserAction::ClearUserState => CLEAR_USER_STATE,
            UserAction::FreezeDisplayBalance => FREEZE_DISPLAY_BALANCE,
            UserAction::UnfreezeDisplayBalance => UNFREEZE_DISPLAY_BALANCE,
        }
    }
}

/// Outcome of a finished round, taken from an `EndGameRound` log.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RoundResult {
    pub round_id: RoundId,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: H256,
    pub persistent_game_data: Option<Bytes>,
}

/// Mutations of the game slice of the store.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE"
)]
pub enum GameAction {
    SetRoundId(RoundId),
    SetResult(RoundResult),
}

impl GameAction {
    pub fn tag(&self) -> &'static str {
        match self {
            GameAction::SetRoundId(_) => SET_ROUND_ID,
            GameAction::SetResult(_) => SET_RESULT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Action {
    User(UserAction),
    Game(GameAction),
}

impl Action {
    pub fn tag(&self) -> &'static str {
        match self {
            Action::User(action) => action.tag(),
            Action::Game(action) => action.tag(),
        }
    }
}

impl From<UserAction> for Action {
    fn from(action: UserAction) -> Self {
        Action::User(action)
    }
}

impl From<GameAction> for Action {
    fn from(action: GameAction) -> Self {
        Action::Game(action)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use serde_json::json;

    fn every_user_action() -> Vec<UserAction> {
        vec![
            UserAction::SetUserError(Some(UserError::InvalidRoundId)),
            UserAction::SetAuthenticated(true),
            UserAction::SetEthBalance(1.5),
            UserAction::SetTokenBalance(42.0),
            UserAction::SetAddress("0xabc".to_string()),
            UserAction::SetLoading(false),
            UserAction::ClearUserState,
            UserAction::FreezeDisplayBalance,
            UserAction::UnfreezeDisplayBalance,
        ]
    }

    #[test]
    fn tag__matches_serialized_type_for_every_user_action() {
        for action in every_user_action() {
            // when
            let value = serde_json::to_value(&action).unwrap();

            // then
            assert_eq!(value["type"], json!(action.tag()));
        }
    }

    #[test]
    fn tag__user_actions_are_distinct() {
        let mut tags: Vec<_> = every_user_action().iter().map(|a| a.tag()).collect();
        tags.sort();
        tags.dedup();
        assert_eq!(tags.len(), 9);
    }

    #[test]
    fn serialize__user_error_carries_code_payload() {
        // given
        let action = UserAction::SetUserError(Some(UserError::InvalidRoundId));

        // when
        let actual = serde_json::to_value(&action).unwrap();

        // then
        let expected = json!({ "type": "SET_USER_ERROR", "payload": "INVALID_ROUND_ID" });
        assert_eq!(actual, expected);
    }

    #[test]
    fn serialize__cleared_user_error_has_null_payload() {
        let actual = serde_json::to_value(UserAction::SetUserError(None)).unwrap();
        assert_eq!(actual, json!({ "type": "SET_USER_ERROR", "payload": null }));
    }

    #[test]
    fn serialize__unit_actions_have_no_payload() {
        // given
        let actions = [
            UserAction::ClearUserState,
            UserAction::FreezeDisplayBalance,
            UserAction::UnfreezeDisplayBalance,
        ];

        for action in actions {
            // when
            let actual = serde_json::to_value(&action).unwrap();

            // then
            assert_eq!(actual, json!({ "type": action.tag() }));
        }
    }

    #[test]
    fn serialize__scalar_payloads_keep_their_type() {
        assert_eq!(
            serde_json::to_value(UserAction::SetAuthenticated(true)).unwrap(),
            json!({ "type": "SET_AUTHENTICATED", "payload": true })
        );
        assert_eq!(
            serde_json::to_value(UserAction::SetTokenBalance(2.5)).unwrap(),
            json!({ "type": "SET_TOKEN_BALANCE", "payload": 2.5 })
        );
        assert_eq!(
            serde_json::to_value(UserAction::SetAddress("0x01".into())).unwrap(),
            json!({ "type": "SET_ADDRESS", "payload": "0x01" })
        );
    }

    #[test]
    fn serialize__game_action_is_untagged_inside_action() {
        // given
        let round_id = RoundId::from([0xab; 32]);
        let action: Action = GameAction::SetRoundId(round_id).into();

        // when
        let actual = serde_json::to_value(&action).unwrap();

        // then
        let expected = json!({
            "type": "SET_ROUND_ID",
            "payload": format!("0x{}", "ab".repeat(32)),
        });
        assert_eq!(actual, expected);
        assert_eq!(action.tag(), SET_ROUND_ID);
    }

    #[test]
    fn user_error__display_is_user_facing() {
        assert_eq!(UserError::InvalidRoundId.to_string(), "Invalid round ID");
        assert_eq!(UserError::Unknown("boom".into()).to_string(), "boom");
    }
}
