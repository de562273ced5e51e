use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{channel::Channel, error::ChannelError, types::OutboundActivity};

/// Collects replies in memory so the HTTP edge can return them in the
/// response body ("expect replies" delivery).
pub struct BufferedChannel {
    name: String,
    buffer: Mutex<Buffer>,
}

#[derive(Default)]
struct Buffer {
    activities: Vec<OutboundActivity>,
    closed: bool,
}

impl BufferedChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buffer: Mutex::new(Buffer::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Buffer> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of everything sent so far, in send order.
    pub fn sent(&self) -> Vec<OutboundActivity> {
        self.lock().activities.clone()
    }

    /// Drain the buffer.
    pub fn take(&self) -> Vec<OutboundActivity> {
        std::mem::take(&mut self.lock().activities)
    }

    /// Drain the buffer and refuse further sends.
    pub fn close(&self) -> Vec<OutboundActivity> {
        let mut buffer = self.lock();
        buffer.closed = true;
        std::mem::take(&mut buffer.activities)
    }
}

#[async_trait]
impl Channel for BufferedChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, activity: &OutboundActivity) -> Result<(), ChannelError> {
        let mut buffer = self.lock();
        if buffer.closed {
            warn!(channel = %self.name, conversation = %activity.conversation_id, "reply after response was sent");
            return Err(ChannelError::Closed {
                channel: self.name.clone(),
            });
        }
        debug!(channel = %self.name, conversation = %activity.conversation_id, "buffering outbound activity");
        buffer.activities.push(activity.clone());
        Ok(())
    }
}
