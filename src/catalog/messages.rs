//! Operational messages shown next to projects and groups
//!
//! Messages are tagged with project names, group names or `main` for the
//! landing page, and expire after their duration.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SourcedexError;
use crate::Result;

/// Tag of messages shown on the landing page
pub const MAIN_PAGE_TAG: &str = "main";

const DEFAULT_DURATION_SECS: u64 = 600;
const DEFAULT_MESSAGE_LIMIT: usize = 100;
const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 3600;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Success,
    #[default]
    Info,
    Warning,
    Error,
}

fn default_duration() -> u64 {
    DEFAULT_DURATION_SECS
}

/// A message as submitted
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub tags: BTreeSet<String>,
    pub text: String,
    #[serde(default)]
    pub message_level: MessageLevel,
    /// Seconds until the message expires
    #[serde(default = "default_duration")]
    pub duration: u64,
}

impl NewMessage {
    pub fn new<I, S>(tags: I, text: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            text: text.into(),
            message_level: MessageLevel::default(),
            duration: DEFAULT_DURATION_SECS,
        }
    }

    pub fn with_level(mut self, level: MessageLevel) -> Self {
        self.message_level = level;
        self
    }

    pub fn with_duration(mut self, secs: u64) -> Self {
        self.duration = secs;
        self
    }
}

/// A message accepted into the store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedMessage {
    #[serde(skip)]
    id: u64,
    pub text: String,
    pub message_level: MessageLevel,
    pub tags: BTreeSet<String>,
    pub created: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
}

impl AcceptedMessage {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration < now
    }

    pub fn has_any(&self, tags: &BTreeSet<String>) -> bool {
        !self.tags.is_disjoint(tags)
    }
}

/// Messages of one tag, for the messages endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedMessages {
    pub tag: String,
    pub messages: Vec<AcceptedMessage>,
}

/// Concurrent store of accepted messages
#[derive(Debug)]
pub struct MessageStore {
    messages: DashMap<u64, AcceptedMessage>,
    next_id: AtomicU64,
    limit: usize,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_LIMIT)
    }
}

impl MessageStore {
    pub fn new(limit: usize) -> Self {
        Self {
            messages: DashMap::new(),
            next_id: AtomicU64::new(0),
            limit,
        }
    }

    pub fn add(&self, message: NewMessage) -> Result<AcceptedMessage> {
        self.add_at(message, Utc::now())
    }

    /// Accept `message` as created at `now`
    pub fn add_at(&self, message: NewMessage, now: DateTime<Utc>) -> Result<AcceptedMessage> {
        if message.text.trim().is_empty() {
            return Err(SourcedexError::InvalidRequest(
                "message text cannot be empty".to_string(),
            ));
        }
        if message.tags.is_empty() {
            return Err(SourcedexError::InvalidRequest(
                "message needs at least one tag".to_string(),
            ));
        }
        self.expire_at(now);
        if self.messages.len() >= self.limit {
            warn!(limit = self.limit, "message limit reached");
            return Err(SourcedexError::InvalidRequest(format!(
                "message limit of {} exceeded",
                self.limit
            )));
        }

        let duration = Duration::seconds(message.duration.min(MAX_DURATION_SECS) as i64);
        let accepted = AcceptedMessage {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            text: message.text,
            message_level: message.message_level,
            tags: message.tags,
            created: now,
            expiration: now + duration,
        };
        debug!(tags = ?accepted.tags, level = ?accepted.message_level, "message added");
        self.messages.insert(accepted.id, accepted.clone());
        Ok(accepted)
    }

    /// Live messages carrying `tag`, oldest first
    pub fn messages(&self, tag: &str) -> Vec<AcceptedMessage> {
        self.collect(Utc::now(), |m| m.tags.contains(tag))
    }

    /// Every live message, oldest first
    pub fn all(&self) -> Vec<AcceptedMessage> {
        self.collect(Utc::now(), |_| true)
    }

    /// Live messages grouped by each of `tags`, skipping tags without any
    pub fn tagged<'t, I>(&self, tags: I) -> Vec<TaggedMessages>
    where
        I: IntoIterator<Item = &'t str>,
    {
        tags.into_iter()
            .map(|tag| TaggedMessages {
                tag: tag.to_string(),
                messages: self.messages(tag),
            })
            .filter(|t| !t.messages.is_empty())
            .collect()
    }

    /// Most severe level among live messages carrying any of `tags`
    pub fn highest_level(&self, tags: &BTreeSet<String>) -> Option<MessageLevel> {
        self.collect(Utc::now(), |m| m.has_any(tags))
            .into_iter()
            .map(|m| m.message_level)
            .max()
    }

    /// Remove messages carrying any of `tags`, and with `text` when given
    pub fn remove(&self, tags: &BTreeSet<String>, text: Option<&str>) -> usize {
        let before = self.messages.len();
        self.messages
            .retain(|_, m| !(m.has_any(tags) && text.map_or(true, |t| m.text == t)));
        before - self.messages.len()
    }

    /// Drop messages that expired before `now`
    pub fn expire_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.messages.len();
        self.messages.retain(|_, m| !m.is_expired_at(now));
        before - self.messages.len()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn collect<F>(&self, now: DateTime<Utc>, keep: F) -> Vec<AcceptedMessage>
    where
        F: Fn(&AcceptedMessage) -> bool,
    {
        let mut out: Vec<AcceptedMessage> = self
            .messages
            .iter()
            .filter(|m| !m.is_expired_at(now) && keep(m.value()))
            .map(|m| m.value().clone())
            .collect();
        out.sort_by(|a, b| a.created.cmp(&b.created).then(a.id.cmp(&b.id)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_add_and_query_by_tag() {
        let store = MessageStore::default();
        store.add(NewMessage::new(["main"], "maintenance at noon")).unwrap();
        store
            .add(NewMessage::new(["kernel", "main"], "reindexing").with_level(MessageLevel::Warning))
            .unwrap();

        let main = store.messages(MAIN_PAGE_TAG);
        assert_eq!(main.len(), 2);
        assert_eq!(main[0].text, "maintenance at noon");
        assert_eq!(store.messages("kernel").len(), 1);
        assert_eq!(
            store.highest_level(&tags(&["kernel"])),
            Some(MessageLevel::Warning)
        );
        assert_eq!(store.highest_level(&tags(&["other"])), None);

        let tagged = store.tagged(["kernel", "missing"]);
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].tag, "kernel");
    }

    #[test]
    fn test_expiration() {
        let store = MessageStore::default();
        let now = Utc::now();
        let message = store
            .add_at(NewMessage::new(["main"], "short").with_duration(10), now)
            .unwrap();
        assert_eq!(message.expiration - message.created, Duration::seconds(10));

        assert_eq!(store.expire_at(now + Duration::seconds(5)), 0);
        assert_eq!(store.expire_at(now + Duration::seconds(11)), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_by_tags_and_text() {
        let store = MessageStore::default();
        store.add(NewMessage::new(["a"], "one")).unwrap();
        store.add(NewMessage::new(["a", "b"], "two")).unwrap();
        store.add(NewMessage::new(["c"], "three")).unwrap();

        assert_eq!(store.remove(&tags(&["a"]), Some("two")), 1);
        assert_eq!(store.remove(&tags(&["a", "c"]), None), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_validation_and_limit() {
        let store = MessageStore::new(1);
        assert!(store.add(NewMessage::new(["main"], "  ")).is_err());
        assert!(store.add(NewMessage::new(Vec::<String>::new(), "text")).is_err());
        store.add(NewMessage::new(["main"], "first")).unwrap();
        assert!(matches!(
            store.add(NewMessage::new(["main"], "second")),
            Err(SourcedexError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_json_shape() {
        let message: NewMessage =
            serde_json::from_str(r#"{"tags": ["main"], "text": "hi", "messageLevel": "error"}"#)
                .unwrap();
        assert_eq!(message.duration, 600);
        let store = MessageStore::default();
        let accepted = store.add(message).unwrap();
        let json = serde_json::to_value(&accepted).unwrap();
        assert_eq!(json["messageLevel"], "error");
        assert!(json.get("expiration").is_some());
        assert!(json.get("id").is_none());
    }
}
