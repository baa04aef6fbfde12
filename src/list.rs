//! # Task Lists
//!
//! Bounded, allocation-free lists of task handles. The scheduler keeps
//! three of them: the ready queue (priority ordered), the periodic
//! registry and the reclaim queue (both plain FIFO).
//!
//! ## Ready-queue ordering
//!
//! The ready queue is sorted by non-increasing priority. A task is
//! inserted after every entry of greater *or equal* priority, so a task
//! re-inserted after running lands at the back of its priority band.
//! That single rule gives round-robin among equals and strict preemption
//! across priorities.

use crate::config::MAX_TASKS;
use crate::task::{Priority, TaskId};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Entry {
    id: TaskId,
    priority: Priority,
}

impl Entry {
    const EMPTY: Entry = Entry { id: TaskId::BOOT, priority: 0 };
}

/// Fixed-capacity list of tasks. A task appears at most once.
#[derive(Clone, Copy)]
pub struct TaskList {
    entries: [Entry; MAX_TASKS],
    len: usize,
}

impl TaskList {
    pub const fn new() -> Self {
        Self { entries: [Entry::EMPTY; MAX_TASKS], len: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert in priority order, after all entries whose priority is
    /// greater than or equal to `priority`.
    ///
    /// Returns `false` without modifying the list if `id` is already
    /// present or the list is full.
    pub fn insert(&mut self, id: TaskId, priority: Priority) -> bool {
        if self.contains(id) || self.len == MAX_TASKS {
            return false;
        }
        let pos = self.entries[..self.len]
            .iter()
            .position(|e| e.priority < priority)
            .unwrap_or(self.len);
        self.entries.copy_within(pos..self.len, pos + 1);
        self.entries[pos] = Entry { id, priority };
        self.len += 1;
        true
    }

    /// Append at the tail, ignoring priority.
    pub fn push_back(&mut self, id: TaskId) -> bool {
        if self.contains(id) || self.len == MAX_TASKS {
            return false;
        }
        self.entries[self.len] = Entry { id, priority: 0 };
        self.len += 1;
        true
    }

    pub fn front(&self) -> Option<TaskId> {
        self.entries[..self.len].first().map(|e| e.id)
    }

    pub fn pop_front(&mut self) -> Option<TaskId> {
        let head = self.front()?;
        self.remove_at(0);
        Some(head)
    }

    /// Remove `id`. Returns whether it was present.
    pub fn remove(&mut self, id: TaskId) -> bool {
        match self.position(id) {
            Some(pos) => {
                self.remove_at(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.position(id).is_some()
    }

    /// Task at position `i` from the head.
    pub fn at(&self, i: usize) -> Option<TaskId> {
        self.entries[..self.len].get(i).map(|e| e.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.entries[..self.len].iter().map(|e| e.id)
    }

    fn position(&self, id: TaskId) -> Option<usize> {
        self.entries[..self.len].iter().position(|e| e.id == id)
    }

    fn remove_at(&mut self, pos: usize) {
        self.entries.copy_within(pos + 1..self.len, pos);
        self.len -= 1;
        self.entries[self.len] = Entry::EMPTY;
    }
}

impl Default for TaskList {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    fn id(n: usize) -> TaskId {
        TaskId::new(n, 0)
    }

    fn ids(list: &TaskList) -> Vec<usize> {
        list.iter().map(TaskId::index).collect()
    }

    #[test]
    fn test_insert_orders_by_priority() {
        let mut list = TaskList::new();
        list.insert(id(0), 1);
        list.insert(id(1), 5);
        list.insert(id(2), 3);
        list.insert(id(3), 0);
        assert_eq!(ids(&list), [1, 2, 0, 3]);
    }

    #[test]
    fn test_equal_priority_is_fifo() {
        let mut list = TaskList::new();
        list.insert(id(0), 2);
        list.insert(id(1), 2);
        list.insert(id(2), 2);
        list.insert(id(3), 1);
        assert_eq!(ids(&list), [0, 1, 2, 3]);
    }

    #[test]
    fn test_rotation_moves_head_to_back_of_band() {
        let mut list = TaskList::new();
        list.insert(id(0), 2);
        list.insert(id(1), 2);
        list.insert(id(2), 0);

        let head = list.pop_front().unwrap();
        list.insert(head, 2);
        assert_eq!(ids(&list), [1, 0, 2]);
    }

    #[test]
    fn test_no_duplicates() {
        let mut list = TaskList::new();
        assert!(list.insert(id(4), 3));
        assert!(!list.insert(id(4), 3));
        assert!(!list.push_back(id(4)));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_remove_and_push_back() {
        let mut list = TaskList::new();
        list.push_back(id(0));
        list.push_back(id(1));
        list.push_back(id(2));
        assert!(list.remove(id(1)));
        assert!(!list.remove(id(1)));
        assert_eq!(ids(&list), [0, 2]);
        assert_eq!(list.at(1), Some(id(2)));
        assert_eq!(list.at(2), None);
    }

    #[test]
    fn test_capacity() {
        let mut list = TaskList::new();
        for n in 0..MAX_TASKS {
            assert!(list.push_back(id(n)));
        }
        assert!(!list.insert(id(MAX_TASKS), 9));
        assert_eq!(list.pop_front(), Some(id(0)));
        assert_eq!(list.len(), MAX_TASKS - 1);
    }
}
