//! Delayed message deletion.
//!
//! The moderation core never owns timers. It sends a [`DeleteRequest`] over a
//! channel and this task performs the deletion once the delay has elapsed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::moderation::MessageHandle;

/// A request to delete `handle` after `delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteRequest {
    pub handle: MessageHandle,
    pub delay: Duration,
}

/// Sending side of the deletion scheduler. Cheap to clone.
#[derive(Clone)]
pub struct DeletionScheduler {
    tx: mpsc::UnboundedSender<DeleteRequest>,
}

impl DeletionScheduler {
    /// Spawn the scheduler task. `delete` performs one deletion.
    pub fn spawn<F, Fut>(delete: F) -> Self
    where
        F: Fn(MessageHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), GatewayError>> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<DeleteRequest>();
        let delete = Arc::new(delete);

        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let delete = Arc::clone(&delete);
                tokio::spawn(async move {
                    tokio::time::sleep(request.delay).await;
                    match delete(request.handle).await {
                        Ok(()) => debug!(
                            "Deleted expired message {} in chat {}",
                            request.handle.message_id, request.handle.chat_id
                        ),
                        // Already removed by a moderator, or the chat is gone.
                        Err(e) => debug!(
                            "Expired message {} in chat {} not deleted: {}",
                            request.handle.message_id, request.handle.chat_id, e
                        ),
                    }
                });
            }
            debug!("Deletion scheduler stopped");
        });

        Self { tx }
    }

    pub fn schedule(&self, handle: MessageHandle, delay: Duration) {
        if self.tx.send(DeleteRequest { handle, delay }).is_err() {
            warn!(
                "Deletion scheduler is gone, message {} in chat {} will stay",
                handle.message_id, handle.chat_id
            );
        }
    }
}
