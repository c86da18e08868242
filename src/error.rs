use crate::actions::UserError;
use thiserror::Error;

/// Preconditions a bet must satisfy before anything is sent to the chain.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum GameError {
    #[error("Error placing bet. Round id not found")]
    MissingRound,
    #[error("Error placing bet. No account connected")]
    MissingAccount,
}

impl GameError {
    /// The error shown to the user for this failure.
    pub fn user_error(self) -> UserError {
        match self {
            GameError::MissingRound => UserError::InvalidRoundId,
            GameError::MissingAccount => UserError::AccountNotConnected,
        }
    }
}
