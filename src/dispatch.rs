use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info};

use crate::notification::Notification;
use crate::platform::{MessageSender, SendError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Failed(SendError),
}

/// Per-recipient outcome of one fan-out, in recipient order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub outcomes: Vec<(i64, Delivery)>,
}

impl DispatchReport {
    pub fn delivered(&self) -> Vec<i64> {
        self.outcomes
            .iter()
            .filter(|(_, d)| *d == Delivery::Delivered)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn failed(&self) -> Vec<(i64, &SendError)> {
        self.outcomes
            .iter()
            .filter_map(|(id, d)| match d {
                Delivery::Failed(e) => Some((*id, e)),
                Delivery::Delivered => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Sends in flight at once. The Bot API allows about 30 messages per second.
pub const MAX_IN_FLIGHT_SENDS: usize = 20;

/// Sends one notification to many recipients. A failed recipient never
/// affects the others and is not retried.
#[derive(Clone)]
pub struct FanOut {
    sender: Arc<dyn MessageSender>,
    max_in_flight: usize,
}

impl FanOut {
    pub fn new(sender: Arc<dyn MessageSender>) -> Self {
        Self {
            sender,
            max_in_flight: MAX_IN_FLIGHT_SENDS,
        }
    }

    #[cfg(test)]
    pub fn with_concurrency(sender: Arc<dyn MessageSender>, max_in_flight: usize) -> Self {
        Self {
            sender,
            max_in_flight: max_in_flight.max(1),
        }
    }

    pub async fn dispatch<'a, I>(&self, notification: &Notification, recipients: I) -> DispatchReport
    where
        I: IntoIterator<Item = &'a i64>,
    {
        let recipients: Vec<i64> = recipients.into_iter().copied().collect();
        let attempts = recipients.into_iter().map(|recipient| async move {
            match self.sender.send(recipient, notification).await {
                Ok(()) => {
                    debug!("Delivered notification to {}", recipient);
                    (recipient, Delivery::Delivered)
                }
                Err(e) => {
                    error!("Failed to deliver notification to {}: {}", recipient, e);
                    (recipient, Delivery::Failed(e))
                }
            }
        });

        let report = DispatchReport {
            outcomes: stream::iter(attempts)
                .buffered(self.max_in_flight)
                .collect()
                .await,
        };

        if !report.is_empty() {
            info!(
                "Fan-out to {} recipients finished: {} delivered, {} failed",
                report.len(),
                report.delivered().len(),
                report.failed().len()
            );
        }
        report
    }
}
