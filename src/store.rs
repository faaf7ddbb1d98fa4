use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::types::{ChatId, ShiftState, UserActivity, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub saved_at: DateTime<Utc>,
    pub chats: Vec<ShiftState>,
}

/// Per-chat shift states behind one process-wide lock.
///
/// Every closure passed in runs with the lock held and must not block;
/// anything slow takes a copy, releases the lock and merges back later.
#[derive(Debug, Clone, Default)]
pub struct ShiftStore {
    chats: Arc<Mutex<HashMap<ChatId, ShiftState>>>,
}

impl ShiftStore {
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let chats = snapshot
            .chats
            .into_iter()
            .map(|state| (state.chat_id, state))
            .collect::<HashMap<_, _>>();
        Self {
            chats: Arc::new(Mutex::new(chats)),
        }
    }

    pub async fn contains(&self, chat_id: ChatId) -> bool {
        self.chats.lock().await.contains_key(&chat_id)
    }

    pub async fn insert_if_absent(&self, state: ShiftState) -> bool {
        let mut chats = self.chats.lock().await;
        if chats.contains_key(&state.chat_id) {
            return false;
        }
        chats.insert(state.chat_id, state);
        true
    }

    pub async fn with_chat<R>(
        &self,
        chat_id: ChatId,
        op: impl FnOnce(&mut ShiftState) -> R,
    ) -> Option<R> {
        let mut chats = self.chats.lock().await;
        chats.get_mut(&chat_id).map(op)
    }

    pub async fn with_each_chat<R>(&self, mut op: impl FnMut(&mut ShiftState) -> R) -> Vec<(ChatId, R)> {
        let mut chats = self.chats.lock().await;
        chats
            .iter_mut()
            .map(|(chat_id, state)| (*chat_id, op(state)))
            .collect()
    }

    pub async fn get(&self, chat_id: ChatId) -> Option<ShiftState> {
        self.chats.lock().await.get(&chat_id).cloned()
    }

    pub async fn user_copy(&self, chat_id: ChatId, user_id: UserId) -> Option<UserActivity> {
        self.chats
            .lock()
            .await
            .get(&chat_id)
            .and_then(|state| state.users.get(&user_id))
            .cloned()
    }

    pub async fn chat_ids(&self) -> Vec<ChatId> {
        let mut ids = self.chats.lock().await.keys().copied().collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }

    pub async fn snapshot(&self, saved_at: DateTime<Utc>) -> StoreSnapshot {
        let mut chats = self
            .chats
            .lock()
            .await
            .values()
            .cloned()
            .collect::<Vec<_>>();
        chats.sort_by_key(|state| state.chat_id);
        StoreSnapshot { saved_at, chats }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::types::{ChatConfig, Role, ShiftState, UserActivity};

    use super::ShiftStore;

    #[tokio::test]
    async fn insert_if_absent_keeps_existing_state() {
        let store = ShiftStore::default();
        let mut first = ShiftState::new(1, ChatConfig::default());
        first.goal = 18;
        assert!(store.insert_if_absent(first).await);
        assert!(
            !store
                .insert_if_absent(ShiftState::new(1, ChatConfig::default()))
                .await
        );

        let state = store.get(1).await.expect("chat should exist");
        assert_eq!(state.goal, 18);
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_from_snapshot() {
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 18, 0, 0).unwrap();
        let store = ShiftStore::default();
        store
            .insert_if_absent(ShiftState::new(2, ChatConfig::default()))
            .await;
        store
            .insert_if_absent(ShiftState::new(1, ChatConfig::default()))
            .await;
        store
            .with_chat(1, |state| {
                state
                    .users
                    .insert(7, UserActivity::new(7, "Anna", Role::Host, 18, now));
            })
            .await
            .expect("chat should exist");

        let snapshot = store.snapshot(now).await;
        assert_eq!(
            snapshot
                .chats
                .iter()
                .map(|state| state.chat_id)
                .collect::<Vec<_>>(),
            vec![1, 2]
        );

        let restored = ShiftStore::from_snapshot(snapshot);
        assert_eq!(restored.chat_ids().await, vec![1, 2]);
        let user = restored.user_copy(1, 7).await.expect("user should survive");
        assert_eq!(user.display_name, "Anna");
        assert!(restored.with_chat(3, |_| ()).await.is_none());
    }
}
