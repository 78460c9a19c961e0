//! Conversation context: bounded per-conversation history with TTL, and
//! pronoun/back-reference resolution against that history.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One completed turn of a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub resolved_question: String,
    pub sql: String,
    pub tables_used: Vec<String>,
    /// Seconds since the epoch
    pub created_at: u64,
}

/// Bounded, TTL-evicted conversation history keyed by conversation id.
/// The pipeline is stateless from the caller's perspective; this is the
/// one shared collaborator that remembers past turns.
pub struct ConversationStore {
    conversations: DashMap<String, Entry>,
    max_turns: usize,
    ttl_seconds: u64,
}

struct Entry {
    turns: VecDeque<ConversationTurn>,
    last_touched: u64,
}

impl ConversationStore {
    pub fn new(max_turns: usize, ttl_seconds: u64) -> Self {
        Self {
            conversations: DashMap::new(),
            max_turns,
            ttl_seconds,
        }
    }

    /// Snapshot of the turns for a conversation, oldest first.
    /// An expired conversation is evicted and reads as empty.
    pub fn get(&self, conversation_id: &str) -> Vec<ConversationTurn> {
        let now = now_secs();
        if let Some(entry) = self.conversations.get(conversation_id) {
            if now.saturating_sub(entry.last_touched) > self.ttl_seconds {
                drop(entry);
                self.conversations.remove(conversation_id);
                return Vec::new();
            }
            return entry.turns.iter().cloned().collect();
        }
        Vec::new()
    }

    /// Append a turn, trimming to the configured bound.
    pub fn append(&self, conversation_id: &str, turn: ConversationTurn) {
        let now = now_secs();
        let mut entry = self
            .conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| Entry {
                turns: VecDeque::new(),
                last_touched: now,
            });
        entry.last_touched = now;
        entry.turns.push_back(turn);
        while entry.turns.len() > self.max_turns {
            entry.turns.pop_front();
        }
    }

    pub fn clear(&self, conversation_id: &str) {
        self.conversations.remove(conversation_id);
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

static PRONOUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(their|those|them|it|this|that|these)\b").unwrap());
static CONNECTIVE_OPENERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(and|now|also)\b").unwrap());

/// Pure back-reference resolution: no I/O, no store access.
pub struct ContextResolver;

impl ContextResolver {
    /// Rewrite the question when it back-references the previous turn.
    /// Without markers (or without history) the input passes through
    /// unchanged.
    pub fn resolve(current: &str, history: &[ConversationTurn]) -> String {
        let last = match history.last() {
            Some(turn) => turn,
            None => return current.to_string(),
        };

        if !PRONOUNS.is_match(current) && !CONNECTIVE_OPENERS.is_match(current) {
            return current.to_string();
        }

        let mut preamble = format!("previous question: \"{}\"", last.resolved_question);
        if !last.tables_used.is_empty() {
            preamble.push_str(&format!(
                "; tables involved: {}",
                last.tables_used.join(", ")
            ));
        }
        format!("[Context: {}] {}", preamble, current)
    }

    /// Render the last `max_turns` turns as a prompt block.
    pub fn build_context_block(history: &[ConversationTurn], max_turns: usize) -> String {
        if history.is_empty() || max_turns == 0 {
            return String::new();
        }
        let start = history.len().saturating_sub(max_turns);
        let mut lines = vec!["Previous conversation:".to_string()];
        for (i, turn) in history[start..].iter().enumerate() {
            lines.push(format!("{}. User: {}", i + 1, turn.question));
            lines.push(format!("   SQL: {}", turn.sql));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(question: &str, sql: &str, tables: &[&str]) -> ConversationTurn {
        ConversationTurn {
            question: question.to_string(),
            resolved_question: question.to_string(),
            sql: sql.to_string(),
            tables_used: tables.iter().map(|s| s.to_string()).collect(),
            created_at: now_secs(),
        }
    }

    #[test]
    fn no_history_passes_through() {
        assert_eq!(
            ContextResolver::resolve("show their orders", &[]),
            "show their orders"
        );
    }

    #[test]
    fn no_markers_passes_through() {
        let history = vec![turn("show all customers", "SELECT ...", &["customers"])];
        assert_eq!(
            ContextResolver::resolve("list products under 10 euros", &history),
            "list products under 10 euros"
        );
    }

    #[test]
    fn pronoun_triggers_preamble_with_tables() {
        let history = vec![turn(
            "show all customers",
            "SELECT * FROM customers",
            &["customers"],
        )];
        let resolved = ContextResolver::resolve("show their orders", &history);
        assert!(resolved.starts_with("[Context:"));
        assert!(resolved.contains("show all customers"));
        assert!(resolved.contains("customers"));
        assert!(resolved.ends_with("show their orders"));
    }

    #[test]
    fn connective_opener_triggers_resolution() {
        let history = vec![turn("count orders", "SELECT COUNT(*) FROM orders", &["orders"])];
        let resolved = ContextResolver::resolve("and for last month?", &history);
        assert!(resolved.contains("count orders"));
    }

    #[test]
    fn context_block_renders_last_turns() {
        let history = vec![
            turn("q1", "SQL1", &[]),
            turn("q2", "SQL2", &[]),
            turn("q3", "SQL3", &[]),
        ];
        let block = ContextResolver::build_context_block(&history, 2);
        assert!(!block.contains("q1"));
        assert!(block.contains("q2"));
        assert!(block.contains("SQL3"));
    }

    #[test]
    fn store_bounds_turn_count() {
        let store = ConversationStore::new(2, 3600);
        for i in 0..4 {
            store.append("c1", turn(&format!("q{}", i), "sql", &[]));
        }
        let turns = store.get("c1");
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].question, "q2");
        assert_eq!(turns[1].question, "q3");
    }

    #[test]
    fn store_isolates_conversations() {
        let store = ConversationStore::new(5, 3600);
        store.append("a", turn("qa", "sql", &[]));
        store.append("b", turn("qb", "sql", &[]));
        assert_eq!(store.get("a").len(), 1);
        assert_eq!(store.get("b").len(), 1);
        store.clear("a");
        assert!(store.get("a").is_empty());
        assert_eq!(store.get("b").len(), 1);
    }

    #[test]
    fn expired_conversation_reads_empty() {
        let store = ConversationStore::new(5, 0);
        store.append("c", turn("q", "sql", &[]));
        // TTL of zero: anything older than "now" is expired; a fresh
        // append in the same second still reads back, so force-expire
        // by rewinding the touch time.
        if let Some(mut entry) = store.conversations.get_mut("c") {
            entry.last_touched = 0;
        }
        assert!(store.get("c").is_empty());
    }
}
