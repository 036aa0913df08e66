//! In-memory session store
//!
//! The map is guarded by a read-write lock, each session by its own mutex,
//! so mutations of one session are serialized while different sessions
//! never contend. Readers always receive a snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::types::{Session, SessionId, SessionSettings, SessionSummary, SessionUpdate};
use crate::errors::{ChatError, Result};
use crate::types::Message;

type Entry = Arc<Mutex<Session>>;

/// Cheaply cloneable handle to the shared session map
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, Entry>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, id: SessionId) -> Result<Entry> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| ChatError::SessionNotFound(id.to_string()))
    }

    /// Create a session and return its initial snapshot
    pub async fn create(&self, title: &str, system_prompt: &str, settings: SessionSettings) -> Session {
        let session = Session::new(title, system_prompt, settings);
        let snapshot = session.clone();
        self.sessions
            .write()
            .await
            .insert(session.id, Arc::new(Mutex::new(session)));

        tracing::debug!(session_id = %snapshot.id, "Session created");
        snapshot
    }

    /// Snapshot of one session
    pub async fn get(&self, id: SessionId) -> Result<Session> {
        let entry = self.entry(id).await?;
        let session = entry.lock().await;
        Ok(session.clone())
    }

    /// Most recently updated first
    pub async fn list(&self) -> Vec<SessionSummary> {
        let entries: Vec<Entry> = self.sessions.read().await.values().cloned().collect();

        let mut summaries = Vec::with_capacity(entries.len());
        for entry in entries {
            summaries.push(entry.lock().await.summary());
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }

    pub async fn update(&self, id: SessionId, update: SessionUpdate) -> Result<Session> {
        let entry = self.entry(id).await?;
        let mut session = entry.lock().await;
        update.apply(&mut session);
        Ok(session.clone())
    }

    pub async fn delete(&self, id: SessionId) -> Result<()> {
        match self.sessions.write().await.remove(&id) {
            Some(_) => {
                tracing::debug!(session_id = %id, "Session deleted");
                Ok(())
            }
            None => Err(ChatError::SessionNotFound(id.to_string())),
        }
    }

    pub async fn append_message(&self, id: SessionId, message: Message) -> Result<()> {
        self.append_messages(id, vec![message]).await
    }

    /// Append several messages as one serialized mutation
    pub async fn append_messages(&self, id: SessionId, messages: Vec<Message>) -> Result<()> {
        let entry = self.entry(id).await?;
        let mut session = entry.lock().await;
        for message in messages {
            session.push(message);
        }
        session.touch();
        Ok(())
    }

    /// Reset history; settings and system prompt are kept
    pub async fn clear_history(&self, id: SessionId) -> Result<()> {
        let entry = self.entry(id).await?;
        let mut session = entry.lock().await;
        session.messages.clear();
        session.touch();
        tracing::debug!(session_id = %id, "Session history cleared");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::session::types::DEFAULT_TITLE;

    fn settings() -> SessionSettings {
        SessionSettings::from_config(&Config::default())
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = SessionStore::new();
        let created = store.create(DEFAULT_TITLE, "You are helpful.", settings()).await;
        let fetched = store.get(created.id).await.unwrap();
        assert_eq!(fetched.system_prompt, "You are helpful.");
        assert!(fetched.messages.is_empty());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let store = SessionStore::new();
        let id = SessionId::new();
        assert!(matches!(store.get(id).await, Err(ChatError::SessionNotFound(_))));
        assert!(matches!(
            store.append_message(id, Message::user("hi")).await,
            Err(ChatError::SessionNotFound(_))
        ));
        assert!(store.delete(id).await.is_err());
    }

    #[tokio::test]
    async fn test_clear_history_keeps_settings() {
        let store = SessionStore::new();
        let session = store.create("Chat", "prompt", settings()).await;
        store
            .update(session.id, SessionUpdate::model("phi3:mini"))
            .await
            .unwrap();
        store
            .append_messages(session.id, vec![Message::user("q"), Message::assistant("a")])
            .await
            .unwrap();

        let before = store.get(session.id).await.unwrap();
        store.clear_history(session.id).await.unwrap();
        let after = store.get(session.id).await.unwrap();

        assert!(after.messages.is_empty());
        assert_eq!(after.settings, before.settings);
        assert_eq!(after.system_prompt, before.system_prompt);
        assert_eq!(after.title, "Chat");
    }

    #[tokio::test]
    async fn test_list_most_recent_first() {
        let store = SessionStore::new();
        let first = store.create("first", "p", settings()).await;
        let second = store.create("second", "p", settings()).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.append_message(first.id, Message::user("bump")).await.unwrap();

        let listed = store.list().await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[0].message_count, 1);
        assert_eq!(listed[1].id, second.id);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_serialized() {
        let store = SessionStore::new();
        let session = store.create(DEFAULT_TITLE, "p", settings()).await;

        let mut tasks = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .append_messages(
                        session.id,
                        vec![Message::user(format!("q{}", i)), Message::assistant(format!("a{}", i))],
                    )
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let messages = store.get(session.id).await.unwrap().messages;
        assert_eq!(messages.len(), 40);
        // Each pair stays adjacent
        for pair in messages.chunks(2) {
            assert_eq!(pair[0].content[1..], pair[1].content[1..]);
        }
    }

    #[tokio::test]
    async fn test_delete() {
        let store = SessionStore::new();
        let session = store.create("x", "p", settings()).await;
        store.delete(session.id).await.unwrap();
        assert!(store.is_empty().await);
        assert!(matches!(store.get(session.id).await, Err(ChatError::SessionNotFound(_))));
    }
}
