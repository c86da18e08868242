//! Client for the Lab Rats multiplayer betting game.
//!
//! [`game::GameService`] places bets through the token's `transferAndCall`
//! and turns round lifecycle logs into [`actions::Action`]s for a store.

pub mod abi;
pub mod actions;
pub mod bet;
pub mod broadcast;
pub mod chain;
pub mod client;
pub mod deployment;
pub mod error;
pub mod game;
pub mod store;
pub mod wallets;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use actions::{
    Action,
    GameAction,
    UserAction,
    UserError,
};
pub use bet::{
    Bet,
    BetRequest,
    RoundId,
    SessionContext,
};
pub use error::GameError;
pub use game::{
    BetReceipt,
    BlockHeader,
    GameService,
};
