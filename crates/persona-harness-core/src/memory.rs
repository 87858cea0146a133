//! Bounded conversation transcript.

use std::collections::VecDeque;

use crate::models::Turn;

/// Default number of turns kept before the oldest are evicted.
pub const DEFAULT_MAX_TURNS: usize = 20;

/// Ordered transcript with FIFO eviction.
///
/// Turns leave only from the head (eviction) or all at once ([`clear`](Self::clear)).
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    turns: VecDeque<Turn>,
    max_turns: usize,
}

impl ConversationMemory {
    /// `max_turns` is clamped to at least 1.
    pub fn new(max_turns: usize) -> Self {
        let max_turns = max_turns.max(1);
        Self {
            turns: VecDeque::with_capacity(max_turns),
            max_turns,
        }
    }

    pub fn append(&mut self, turn: Turn) {
        while self.turns.len() >= self.max_turns {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub fn transcript(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn never_exceeds_max_len() {
        let mut memory = ConversationMemory::new(3);
        for i in 0..10 {
            memory.append(Turn::user(format!("turn {}", i)));
            assert!(memory.len() <= 3);
        }
        let texts: Vec<String> = memory.transcript().into_iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["turn 7", "turn 8", "turn 9"]);
    }

    #[test]
    fn clear_empties_transcript() {
        let mut memory = ConversationMemory::new(5);
        memory.append(Turn::user("hi"));
        memory.append(Turn::assistant("hello"));
        memory.clear();
        assert!(memory.transcript().is_empty());
        assert!(memory.is_empty());
    }

    #[test]
    fn order_and_roles_preserved() {
        let mut memory = ConversationMemory::default();
        memory.append(Turn::user("q"));
        memory.append(Turn::assistant("a"));
        let roles: Vec<Role> = memory.transcript().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut memory = ConversationMemory::new(0);
        memory.append(Turn::user("a"));
        memory.append(Turn::user("b"));
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.max_turns(), 1);
    }
}
