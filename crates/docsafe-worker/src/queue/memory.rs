//! In-process queue backend for tests and single-node runs.

use super::{QueueBackend, QueueError, ReceivedMessage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

struct Entry {
    body: String,
    invisible_until: Option<Instant>,
    receipt_handle: Option<String>,
}

#[derive(Default)]
struct State {
    entries: VecDeque<Entry>,
    next_receipt: u64,
}

/// FIFO queue honouring the visibility window.
///
/// A received message that is not deleted becomes visible again once its
/// visibility timeout elapses; its old receipt handle stops working.
#[derive(Default)]
pub struct InMemoryQueueBackend {
    state: Mutex<State>,
    notify: Notify,
}

impl InMemoryQueueBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages held, visible or not.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Bodies of every held message, oldest first.
    pub async fn bodies(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .entries
            .iter()
            .map(|e| e.body.clone())
            .collect()
    }

    async fn take_visible(&self, max_messages: usize, visibility_timeout: Duration) -> Vec<ReceivedMessage> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let mut received = Vec::new();

        for i in 0..state.entries.len() {
            if received.len() >= max_messages {
                break;
            }
            let visible = state.entries[i]
                .invisible_until
                .map_or(true, |until| until <= now);
            if !visible {
                continue;
            }

            state.next_receipt += 1;
            let handle = format!("rcpt-{}", state.next_receipt);
            let entry = &mut state.entries[i];
            entry.invisible_until = Some(now + visibility_timeout);
            entry.receipt_handle = Some(handle.clone());
            received.push(ReceivedMessage {
                body: entry.body.clone(),
                receipt_handle: handle,
            });
        }

        received
    }
}

#[async_trait]
impl QueueBackend for InMemoryQueueBackend {
    async fn send(&self, body: &str) -> Result<(), QueueError> {
        self.state.lock().await.entries.push_back(Entry {
            body: body.to_string(),
            invisible_until: None,
            receipt_handle: None,
        });
        self.notify.notify_waiters();
        Ok(())
    }

    async fn receive(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.notify.notified();
            let received = self.take_visible(max_messages, visibility_timeout).await;
            if !received.is_empty() || Instant::now() >= deadline {
                return Ok(received);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(self.take_visible(max_messages, visibility_timeout).await);
            }
        }
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let position = state.entries.iter().position(|e| {
            e.receipt_handle.as_deref() == Some(receipt_handle)
                && e.invisible_until.map_or(false, |until| until > now)
        });
        match position {
            Some(index) => {
                state.entries.remove(index);
                Ok(())
            }
            None => Err(QueueError::DeleteFailed(format!(
                "receipt handle {} is not current",
                receipt_handle
            ))),
        }
    }

    async fn purge(&self) -> Result<(), QueueError> {
        self.state.lock().await.entries.clear();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
