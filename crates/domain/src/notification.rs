//! Status-change notifications.
//!
//! Delivery is best effort: the order service spawns each notification and
//! only logs a failure.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use common::{OrderId, OrderStatus};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Notification failed: {0}")]
pub struct NotificationError(pub String);

/// Receives order status changes.
#[async_trait]
pub trait NotificationSender: Send + Sync + 'static {
    async fn notify(
        &self,
        order_id: OrderId,
        old_status: OrderStatus,
        new_status: OrderStatus,
    ) -> Result<(), NotificationError>;
}

/// Emits each notification as a structured log event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotificationSender;

#[async_trait]
impl NotificationSender for LoggingNotificationSender {
    async fn notify(
        &self,
        order_id: OrderId,
        old_status: OrderStatus,
        new_status: OrderStatus,
    ) -> Result<(), NotificationError> {
        tracing::info!(
            order_id = %order_id,
            old_status = %old_status,
            new_status = %new_status,
            "order status changed"
        );
        Ok(())
    }
}

/// A delivered notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub order_id: OrderId,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
}

#[derive(Debug, Default)]
struct InMemoryNotificationState {
    delivered: Vec<Notification>,
    attempts: usize,
    fail: bool,
}

/// Notification sender that records deliveries, for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationSender {
    state: Arc<Mutex<InMemoryNotificationState>>,
}

impl InMemoryNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following delivery fail until reset.
    pub fn set_fail(&self, fail: bool) {
        self.state().fail = fail;
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.state().delivered.clone()
    }

    /// Number of deliveries attempted, failed ones included.
    pub fn attempts(&self) -> usize {
        self.state().attempts
    }

    /// Waits until at least `count` deliveries were attempted.
    pub async fn wait_for_attempts(&self, count: usize, timeout: Duration) -> bool {
        let poll = async {
            while self.attempts() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.is_ok()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, InMemoryNotificationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl NotificationSender for InMemoryNotificationSender {
    async fn notify(
        &self,
        order_id: OrderId,
        old_status: OrderStatus,
        new_status: OrderStatus,
    ) -> Result<(), NotificationError> {
        let mut state = self.state();
        state.attempts += 1;

        if state.fail {
            return Err(NotificationError("notification endpoint unavailable".to_string()));
        }

        state.delivered.push(Notification {
            order_id,
            old_status,
            new_status,
        });
        Ok(())
    }
}
