//! # Meeting Store
//!
//! Minimal meeting metadata needed by the orchestration layer: status flips
//! when viewers come and go, and the running transcript that webhook results
//! append to.
//!
//! ## Transcript Append Serialization:
//! Two webhook deliveries for the same meeting may land concurrently. The
//! append happens entirely under the store's write lock (read current text,
//! join, write back as one critical section) so concurrent read-modify-write
//! races cannot drop a chunk's text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// Meeting lifecycle status as viewers see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingStatus {
    /// No live viewers; recording not in progress
    Created,
    /// At least one live viewer connection
    Transcribing,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &str {
        match self {
            MeetingStatus::Created => "created",
            MeetingStatus::Transcribing => "transcribing",
        }
    }
}

/// Meeting metadata record.
#[derive(Debug, Clone, Serialize)]
pub struct Meeting {
    pub id: String,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub status: MeetingStatus,
    pub full_transcription: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// In-process meeting registry.
///
/// ## Thread Safety:
/// Same discipline as the rest of the shared state: short critical sections
/// behind a reader-writer lock, cloned snapshots handed out to callers.
pub struct MeetingStore {
    meetings: RwLock<HashMap<String, Meeting>>,
}

impl MeetingStore {
    pub fn new() -> Self {
        Self {
            meetings: RwLock::new(HashMap::new()),
        }
    }

    pub fn create(&self, title: &str, description: &str, keywords: Vec<String>) -> Meeting {
        let now = Utc::now();
        let meeting = Meeting {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: description.to_string(),
            keywords,
            status: MeetingStatus::Created,
            full_transcription: None,
            created_at: now,
            updated_at: now,
        };

        self.meetings
            .write()
            .unwrap()
            .insert(meeting.id.clone(), meeting.clone());

        info!("Created meeting {} ({})", meeting.id, meeting.title);
        meeting
    }

    pub fn get(&self, meeting_id: &str) -> Option<Meeting> {
        self.meetings.read().unwrap().get(meeting_id).cloned()
    }

    pub fn exists(&self, meeting_id: &str) -> bool {
        self.meetings.read().unwrap().contains_key(meeting_id)
    }

    /// All meetings, newest first.
    pub fn list(&self) -> Vec<Meeting> {
        let mut meetings: Vec<Meeting> = self.meetings.read().unwrap().values().cloned().collect();
        meetings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        meetings
    }

    pub fn delete(&self, meeting_id: &str) -> bool {
        self.meetings.write().unwrap().remove(meeting_id).is_some()
    }

    pub fn count(&self) -> usize {
        self.meetings.read().unwrap().len()
    }

    /// Flip a meeting's status. Returns false for unknown meetings.
    pub fn set_status(&self, meeting_id: &str, status: MeetingStatus) -> bool {
        let mut meetings = self.meetings.write().unwrap();
        match meetings.get_mut(meeting_id) {
            Some(meeting) => {
                meeting.status = status;
                meeting.updated_at = Utc::now();
                info!("Meeting {} status set to {}", meeting_id, status.as_str());
                true
            }
            None => false,
        }
    }

    /// Append one chunk's text to the running transcript, space-joined.
    ///
    /// The whole read-modify-write runs under the write lock, which is the
    /// per-meeting serialization the webhook path relies on. Returns the
    /// updated transcript, or `None` for unknown meetings.
    pub fn append_transcription(&self, meeting_id: &str, text: &str) -> Option<String> {
        let mut meetings = self.meetings.write().unwrap();
        let meeting = meetings.get_mut(meeting_id)?;

        let updated = match meeting.full_transcription.take() {
            Some(current) if !current.is_empty() => format!("{} {}", current, text),
            _ => text.to_string(),
        };
        meeting.full_transcription = Some(updated.clone());
        meeting.updated_at = Utc::now();

        Some(updated)
    }
}

impl Default for MeetingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_create_and_get() {
        let store = MeetingStore::new();
        let meeting = store.create("Standup", "daily sync", vec!["team".to_string()]);

        let fetched = store.get(&meeting.id).unwrap();
        assert_eq!(fetched.title, "Standup");
        assert_eq!(fetched.status, MeetingStatus::Created);
        assert!(fetched.full_transcription.is_none());
    }

    #[test]
    fn test_list_newest_first() {
        let store = MeetingStore::new();
        let first = store.create("first", "", vec![]);
        let second = store.create("second", "", vec![]);

        let listed = store.list();
        assert_eq!(listed.len(), 2);
        // created_at ties are possible at clock resolution; ids disambiguate
        let ids: Vec<_> = listed.iter().map(|m| m.id.as_str()).collect();
        assert!(ids.contains(&first.id.as_str()));
        assert!(ids.contains(&second.id.as_str()));
    }

    #[test]
    fn test_delete() {
        let store = MeetingStore::new();
        let meeting = store.create("gone", "", vec![]);
        assert!(store.delete(&meeting.id));
        assert!(!store.delete(&meeting.id));
        assert!(store.get(&meeting.id).is_none());
    }

    #[test]
    fn test_status_flip() {
        let store = MeetingStore::new();
        let meeting = store.create("m", "", vec![]);

        assert!(store.set_status(&meeting.id, MeetingStatus::Transcribing));
        assert_eq!(
            store.get(&meeting.id).unwrap().status,
            MeetingStatus::Transcribing
        );

        assert!(!store.set_status("ghost", MeetingStatus::Created));
    }

    #[test]
    fn test_append_transcription_space_joins() {
        let store = MeetingStore::new();
        let meeting = store.create("m", "", vec![]);

        assert_eq!(
            store.append_transcription(&meeting.id, "hello").as_deref(),
            Some("hello")
        );
        assert_eq!(
            store.append_transcription(&meeting.id, "world").as_deref(),
            Some("hello world")
        );
        assert!(store.append_transcription("ghost", "x").is_none());
    }

    /// Concurrent appends must not drop text: both chunks end up in the
    /// transcript regardless of interleaving.
    #[test]
    fn test_concurrent_appends_lose_nothing() {
        let store = Arc::new(MeetingStore::new());
        let meeting = store.create("m", "", vec![]);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                let id = meeting.id.clone();
                std::thread::spawn(move || {
                    store.append_transcription(&id, &format!("chunk{}", i));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let transcript = store.get(&meeting.id).unwrap().full_transcription.unwrap();
        for i in 0..8 {
            assert!(transcript.contains(&format!("chunk{}", i)));
        }
        assert_eq!(transcript.split(' ').count(), 8);
    }
}
