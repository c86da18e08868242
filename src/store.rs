use crate::actions::Action;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Sink for store mutations.
pub trait Dispatch {
    fn dispatch(&self, action: Action);
}

impl<T: Dispatch + ?Sized> Dispatch for &T {
    fn dispatch(&self, action: Action) {
        (**self).dispatch(action)
    }
}

impl<T: Dispatch + ?Sized> Dispatch for Arc<T> {
    fn dispatch(&self, action: Action) {
        (**self).dispatch(action)
    }
}

/// Forwards actions to whatever task owns the store.
#[derive(Clone, Debug)]
pub struct ChannelDispatcher {
    sender: mpsc::UnboundedSender<Action>,
}

impl ChannelDispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Action>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Dispatch for ChannelDispatcher {
    fn dispatch(&self, action: Action) {
        let tag = action.tag();
        if self.sender.send(action).is_err() {
            warn!(%tag, "store receiver dropped; action discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::actions::UserAction;

    #[tokio::test]
    async fn dispatch__forwards_actions_in_order() {
        // given
        let (dispatcher, mut receiver) = ChannelDispatcher::new();

        // when
        dispatcher.dispatch(UserAction::SetLoading(true).into());
        dispatcher.dispatch(UserAction::ClearUserState.into());

        // then
        assert_eq!(
            receiver.recv().await,
            Some(Action::User(UserAction::SetLoading(true)))
        );
        assert_eq!(
            receiver.recv().await,
            Some(Action::User(UserAction::ClearUserState))
        );
    }

    #[test]
    fn dispatch__after_receiver_dropped_does_not_panic() {
        let (dispatcher, receiver) = ChannelDispatcher::new();
        drop(receiver);
        dispatcher.dispatch(UserAction::FreezeDisplayBalance.into());
    }
}
