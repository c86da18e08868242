#![allow(non_snake_case)]

use ethers::types::{
    Address,
    Bytes,
    U256,
};
use lab_rats_client::{
    Action,
    BetRequest,
    GameError,
    GameService,
    RoundId,
    SessionContext,
    UserAction,
    UserError,
    abi::decode_token_transfer_data,
    deployment::ContractAddresses,
    test_helpers::{
        ChainCall,
        FakeChain,
        RecordingDispatcher,
    },
};

fn contracts() -> ContractAddresses {
    ContractAddresses {
        token: Address::repeat_byte(0xaa),
        game_manager: Address::repeat_byte(0xbb),
    }
}

fn player() -> Address {
    Address::repeat_byte(0x42)
}

#[tokio::test]
async fn submit_bet__without_round_reports_error_and_never_calls_contract() {
    // given
    let chain = FakeChain::new();
    let dispatcher = RecordingDispatcher::new();
    let service = GameService::new(chain.clone(), dispatcher.clone(), contracts());
    let session = SessionContext::new(None, Some(player()));

    // when
    let err = service
        .submit_bet(BetRequest::new(10u64, Bytes::default()), &session)
        .await
        .unwrap_err();

    // then
    assert_eq!(err.downcast_ref::<GameError>(), Some(&GameError::MissingRound));
    assert!(chain.calls().is_empty());
    assert_eq!(
        dispatcher.actions(),
        vec![Action::from(UserAction::SetUserError(Some(
            UserError::InvalidRoundId
        )))]
    );
}

#[tokio::test]
async fn submit_bet__sends_encoded_bet_to_game_manager_and_broadcasts_it() {
    // given
    let chain = FakeChain::new();
    let dispatcher = RecordingDispatcher::new();
    let service = GameService::new(chain.clone(), dispatcher.clone(), contracts());
    let mut bets = service.subscribe_bets();
    let round_id = RoundId::from([3u8; 32]);
    let session = SessionContext::new(Some(round_id), Some(player()));
    let request = BetRequest::new(1_000u64, Bytes::from(vec![0x01, 0x02]));

    // when
    let receipt = service.submit_bet(request, &session).await.unwrap();

    // then
    let calls = chain.calls();
    assert_eq!(calls.len(), 2);
    let ChainCall::TransferAndCall {
        token,
        to,
        amount,
        data,
    } = &calls[0]
    else {
        panic!("expected transferAndCall first, got {:?}", calls[0]);
    };
    assert_eq!(*token, contracts().token);
    assert_eq!(*to, contracts().game_manager);
    assert_eq!(*amount, U256::from(1_000u64));
    let decoded = decode_token_transfer_data(data).unwrap();
    assert_eq!(decoded.round_id, round_id);
    assert_eq!(decoded.bets.len(), 1);
    assert_eq!(decoded.bets[0].player_address, player());
    assert_eq!(decoded.bets[0].bet_data, Bytes::from(vec![0x01, 0x02]));
    assert!(matches!(
        calls[1],
        ChainCall::WaitForConfirmations {
            confirmations: 1,
            ..
        }
    ));
    assert_eq!(bets.recv().await.unwrap(), receipt.bet);
    assert_eq!(
        dispatcher.actions(),
        vec![
            Action::from(UserAction::SetLoading(true)),
            Action::from(UserAction::SetLoading(false)),
        ]
    );
}

#[tokio::test]
async fn submit_bet__transport_failure_clears_loading_and_reports_error() {
    // given
    let chain = FakeChain::new().failing_transfers("insufficient funds");
    let dispatcher = RecordingDispatcher::new();
    let service = GameService::new(chain, dispatcher.clone(), contracts());
    let session = SessionContext::new(Some(RoundId::from([1u8; 32])), Some(player()));

    // when
    let err = service
        .submit_bet(BetRequest::new(5u64, Bytes::default()), &session)
        .await
        .unwrap_err();

    // then
    assert!(err.to_string().contains("insufficient funds"));
    assert_eq!(
        dispatcher.actions(),
        vec![
            Action::from(UserAction::SetLoading(true)),
            Action::from(UserAction::SetLoading(false)),
            Action::from(UserAction::SetUserError(Some(UserError::TransactionFailed))),
        ]
    );
}

#[tokio::test]
async fn refresh_balances__reports_whole_units() {
    // given
    let eth = U256::exp10(18) * 2;
    let token = U256::exp10(17) * 15;
    let chain = FakeChain::new().with_balances(eth, token);
    let dispatcher = RecordingDispatcher::new();
    let service = GameService::new(chain, dispatcher.clone(), contracts());

    // when
    let balances = service.refresh_balances(player()).await.unwrap();

    // then
    assert_eq!(balances, (2.0, 1.5));
    assert_eq!(
        dispatcher.actions(),
        vec![
            Action::from(UserAction::FreezeDisplayBalance),
            Action::from(UserAction::SetEthBalance(2.0)),
            Action::from(UserAction::SetTokenBalance(1.5)),
            Action::from(UserAction::UnfreezeDisplayBalance),
        ]
    );
}
