//! In-process publish/subscribe for committed wheel changes.

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::warn;

use crate::types::{RedemptionStatus, SpinRecord, WonPrizeTicket};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WheelEvent {
    SpinCompleted { record: SpinRecord },
    TicketIssued { ticket: WonPrizeTicket },
    BalanceChanged { user_id: String, credits: i64 },
    RedemptionRequested { redemption_id: i64, ticket_id: String },
    RedemptionStatusChanged { redemption_id: i64, status: RedemptionStatus },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WheelEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns how many subscribers received the event.
    pub fn publish(&self, event: WheelEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: Some(self.sender.subscribe()),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Delivery stops on `cancel()` or drop.
#[derive(Debug)]
pub struct Subscription {
    receiver: Option<broadcast::Receiver<WheelEvent>>,
}

impl Subscription {
    pub async fn next(&mut self) -> Option<WheelEvent> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_next(&mut self) -> Option<WheelEvent> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagged, events dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    pub fn cancel(&mut self) {
        self.receiver = None;
    }

    pub fn is_cancelled(&self) -> bool {
        self.receiver.is_none()
    }
}
