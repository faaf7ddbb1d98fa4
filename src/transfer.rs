use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use tokio::{sync::Mutex, task::AbortHandle};
use tracing::debug;

use crate::types::ChatId;

#[derive(Debug, Clone, Default)]
pub struct TransferTimers {
    timers: Arc<Mutex<HashMap<ChatId, (u64, AbortHandle)>>>,
}

impl TransferTimers {
    /// Runs `on_expiry` after `delay` unless cancelled first. Arming a new
    /// request for the same chat aborts the previous timer.
    pub async fn arm<F>(&self, chat_id: ChatId, request_id: u64, delay: Duration, on_expiry: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_expiry.await;
        });

        let previous = self
            .timers
            .lock()
            .await
            .insert(chat_id, (request_id, task.abort_handle()));
        if let Some((previous_id, handle)) = previous {
            debug!(chat_id, previous_id, "replacing transfer timer");
            handle.abort();
        }
    }

    pub async fn cancel(&self, chat_id: ChatId, request_id: u64) -> bool {
        match self.take(chat_id, request_id).await {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub async fn disarm(&self, chat_id: ChatId, request_id: u64) {
        self.take(chat_id, request_id).await;
    }

    #[cfg(test)]
    pub async fn is_armed(&self, chat_id: ChatId) -> bool {
        self.timers.lock().await.contains_key(&chat_id)
    }

    async fn take(&self, chat_id: ChatId, request_id: u64) -> Option<AbortHandle> {
        let mut timers = self.timers.lock().await;
        match timers.get(&chat_id) {
            Some((armed_id, _)) if *armed_id == request_id => {
                timers.remove(&chat_id).map(|(_, handle)| handle)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicU32, Ordering},
        },
        time::Duration,
    };

    use super::TransferTimers;

    fn counter_future(counter: &Arc<AtomicU32>) -> impl Future<Output = ()> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_after_delay() {
        let timers = TransferTimers::default();
        let fired = Arc::new(AtomicU32::new(0));
        timers
            .arm(1, 7, Duration::from_secs(300), counter_future(&fired))
            .await;

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let timers = TransferTimers::default();
        let fired = Arc::new(AtomicU32::new(0));
        timers
            .arm(1, 7, Duration::from_secs(300), counter_future(&fired))
            .await;

        assert!(!timers.cancel(1, 8).await);
        assert!(timers.cancel(1, 7).await);
        assert!(!timers.is_armed(1).await);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_previous_request() {
        let timers = TransferTimers::default();
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));
        timers
            .arm(1, 1, Duration::from_secs(300), counter_future(&first))
            .await;
        timers
            .arm(1, 2, Duration::from_secs(300), counter_future(&second))
            .await;

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }
}
