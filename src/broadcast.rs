use crate::bet::Bet;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 16;

/// Local fan-out of bets once they are confirmed on chain.
///
/// Delivery is at-most-once: nothing is stored for late subscribers, and a
/// subscriber that falls more than the channel capacity behind loses the
/// oldest bets.
#[derive(Clone, Debug)]
pub struct BetBroadcaster {
    sender: broadcast::Sender<Bet>,
}

impl Default for BetBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BetBroadcaster {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Bet> {
        self.sender.subscribe()
    }

    /// Returns how many subscribers the bet was handed to.
    pub fn publish(&self, bet: Bet) -> usize {
        self.sender.send(bet).unwrap_or(0)
    }
}
