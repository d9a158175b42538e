//! Stale-result suppression for resolutions that finish out of order.
//!
//! Every change of episode, source or language begins a new selection and
//! gets a fresh ticket. A result is only applied if its ticket is still the
//! current one.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::Language;

/// What the user is currently watching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub title_id: u64,
    pub episode: u32,
    pub source_id: String,
    pub language: Language,
}

/// Proof that a result belongs to a specific selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SelectionTicket(u64);

impl SelectionTicket {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct SelectionTracker {
    current: AtomicU64,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new selection, invalidating all earlier tickets.
    pub fn begin(&self) -> SelectionTicket {
        SelectionTicket(self.current.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn current(&self) -> SelectionTicket {
        SelectionTicket(self.current.load(Ordering::Acquire))
    }

    pub fn is_current(&self, ticket: SelectionTicket) -> bool {
        self.current() == ticket
    }

    /// Hand `value` back only if `ticket` is still current.
    pub fn apply<T>(&self, ticket: SelectionTicket, value: T) -> Option<T> {
        if self.is_current(ticket) {
            Some(value)
        } else {
            tracing::debug!(
                ticket = ticket.value(),
                current = self.current().value(),
                "Dropping stale result"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_selection_invalidates_older() {
        let tracker = SelectionTracker::new();
        let ep1 = tracker.begin();
        let ep2 = tracker.begin();
        assert!(!tracker.is_current(ep1));
        assert!(tracker.is_current(ep2));
        assert!(ep2 > ep1);
    }

    #[test]
    fn test_late_result_is_dropped() {
        let tracker = SelectionTracker::new();
        let old = tracker.begin();
        let new = tracker.begin();
        // New resolution lands first, the old one straggles in afterwards.
        assert_eq!(tracker.apply(new, "episode 2"), Some("episode 2"));
        assert_eq!(tracker.apply(old, "episode 1"), None);
    }
}
