use std::collections::HashSet;

use chatlink_protocol::ChatMessage;

/// Append-only, clearable sequence of chat messages.
///
/// A message is discarded on append if its `messageId` has been seen, or if
/// another message with the same content, `sentAt` and sender id is
/// already present. Both checks are hash lookups.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Vec<ChatMessage>,
    ids: HashSet<String>,
    content_keys: HashSet<(String, String, String)>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `message` unless it duplicates one already in the log.
    /// Returns `true` if it was appended.
    pub fn append(&mut self, message: ChatMessage) -> bool {
        // An empty id carries no identity; only the content key applies.
        if !message.message_id.is_empty() && self.ids.contains(&message.message_id) {
            return false;
        }
        let key = message.content_key();
        if self.content_keys.contains(&key) {
            return false;
        }

        if !message.message_id.is_empty() {
            self.ids.insert(message.message_id.clone());
        }
        self.content_keys.insert(key);
        self.messages.push(message);
        true
    }

    /// Messages in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    /// Owned copy of the log, in arrival order.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Removes every message and forgets the dedup index.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
        self.content_keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatlink_protocol::Sender;

    fn msg(id: &str, content: &str, sent_at: &str, sender: &str) -> ChatMessage {
        ChatMessage {
            message_id: id.into(),
            room_id: "r1".into(),
            content: content.into(),
            sender: Sender {
                id: sender.into(),
                nickname: format!("{sender}-nick"),
            },
            sent_at: sent_at.into(),
            sequence: 0,
        }
    }

    #[test]
    fn appends_in_arrival_order() {
        let mut log = MessageLog::new();
        assert!(log.append(msg("m1", "hello", "t1", "u1")));
        assert!(log.append(msg("m2", "world", "t2", "u1")));

        let ids: Vec<_> = log.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[test]
    fn same_message_id_is_discarded() {
        let mut log = MessageLog::new();
        assert!(log.append(msg("m1", "hello", "t1", "u1")));
        assert!(!log.append(msg("m1", "edited", "t9", "u2")));
        assert_eq!(log.len(), 1);
        assert_eq!(log.snapshot()[0].content, "hello");
    }

    #[test]
    fn same_content_triple_is_discarded() {
        let mut log = MessageLog::new();
        assert!(log.append(msg("m1", "hello", "t1", "u1")));
        // Redelivered under a new id.
        assert!(!log.append(msg("m2", "hello", "t1", "u1")));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn differing_triple_is_kept() {
        let mut log = MessageLog::new();
        assert!(log.append(msg("m1", "hello", "t1", "u1")));
        assert!(log.append(msg("m2", "hello", "t1", "u2")));
        assert!(log.append(msg("m3", "hello", "t2", "u1")));
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn empty_ids_fall_back_to_content_key() {
        let mut log = MessageLog::new();
        assert!(log.append(msg("", "a", "t1", "u1")));
        assert!(log.append(msg("", "b", "t1", "u1")));
        assert!(!log.append(msg("", "a", "t1", "u1")));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn clear_forgets_dedup_index() {
        let mut log = MessageLog::new();
        log.append(msg("m1", "hello", "t1", "u1"));
        log.clear();

        assert!(log.is_empty());
        assert!(log.append(msg("m1", "hello", "t1", "u1")));
    }
}
