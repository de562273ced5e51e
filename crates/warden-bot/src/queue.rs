use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes turns per conversation.
///
/// Turns in different conversations never wait on each other. A slot is
/// dropped from the map once nobody holds or waits for it.
#[derive(Default)]
pub struct ConversationQueue {
    slots: DashMap<String, Arc<Mutex<()>>>,
}

impl ConversationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the conversation's slot. Held until the returned slot drops.
    ///
    /// The map entry is pruned on drop, including when the waiting or
    /// holding future is cancelled.
    pub async fn acquire(&self, conversation_id: &str) -> ConversationSlot<'_> {
        let slot = self
            .slots
            .entry(conversation_id.to_string())
            .or_default()
            .clone();
        let mut held = ConversationSlot {
            queue: self,
            conversation_id: conversation_id.to_string(),
            guard: None,
        };
        held.guard = Some(slot.lock_owned().await);
        held
    }

    /// Remove the slot if no turn holds or awaits it.
    fn release_idle(&self, conversation_id: &str) {
        self.slots
            .remove_if(conversation_id, |_, slot| Arc::strong_count(slot) == 1);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Exclusive turn slot for one conversation.
pub struct ConversationSlot<'a> {
    queue: &'a ConversationQueue,
    conversation_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ConversationSlot<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.queue.release_idle(&self.conversation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_conversation_is_serialized() {
        let queue = Arc::new(ConversationQueue::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let queue = Arc::clone(&queue);
            let active = Arc::clone(&active);
            let max_seen = Arc::clone(&max_seen);
            tasks.push(tokio::spawn(async move {
                let _slot = queue.acquire("c1").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_conversations_do_not_block() {
        let queue = ConversationQueue::new();
        let _a = queue.acquire("c1").await;
        let b = tokio::time::timeout(Duration::from_millis(100), queue.acquire("c2")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn idle_slots_are_pruned() {
        let queue = ConversationQueue::new();
        let first = queue.acquire("c1").await;
        queue.release_idle("c1");
        assert_eq!(queue.len(), 1, "held slot must survive");
        drop(first);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn cancelled_holder_releases_slot() {
        let queue = ConversationQueue::new();
        let turn = async {
            let _slot = queue.acquire("c1").await;
            tokio::time::sleep(Duration::from_secs(60)).await;
        };
        assert!(tokio::time::timeout(Duration::from_millis(20), turn).await.is_err());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn cancelled_waiter_releases_slot() {
        let queue = ConversationQueue::new();
        let holder = queue.acquire("c1").await;
        let waiter = tokio::time::timeout(Duration::from_millis(20), queue.acquire("c1")).await;
        assert!(waiter.is_err());
        assert_eq!(queue.len(), 1);
        drop(holder);
        assert!(queue.is_empty());
    }
}
