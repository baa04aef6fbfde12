//! # Task Control Block
//!
//! Defines the task model for RmOS. A task is an independently scheduled
//! unit of execution with its own stack and a static priority. Tasks
//! created with a non-zero period are re-activated every `period` ticks,
//! reusing their control block and stack; aperiodic tasks run once and
//! are reclaimed when they end.
//!
//! Control blocks live in a fixed arena inside the scheduler and are
//! referred to by [`TaskId`], a slot index plus a generation counter, so
//! a handle to a reclaimed slot is detected instead of dangling.

use core::fmt;
use core::ptr;

use crate::arch::StackAddr;
use crate::config::HELD_LOCKS_MAX;
use crate::fault::{fatal, Fault};
use crate::mutex::Lock;
use crate::stack::StackRegion;

/// Task entry point. Returning from it ends the task.
pub type TaskEntry = extern "C" fn();

/// Static task priority. Higher value means more important.
pub type Priority = u8;

// ---------------------------------------------------------------------------
// Task handle
// ---------------------------------------------------------------------------

/// Handle to a task slot in the scheduler arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId {
    index: u16,
    generation: u32,
}

impl TaskId {
    /// Reserved owner for locks taken before the scheduler starts.
    pub const BOOT: TaskId = TaskId { index: u16::MAX, generation: u32::MAX };

    pub(crate) const fn new(index: usize, generation: u32) -> Self {
        Self { index: index as u16, generation }
    }

    /// Arena slot index.
    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Pack into 64 bits: generation in the high word, index in the low.
    pub const fn into_raw(self) -> u64 {
        (self.generation as u64) << 32 | self.index as u64
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self { index: raw as u16, generation: (raw >> 32) as u32 }
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == TaskId::BOOT {
            f.write_str("TaskId(boot)")
        } else {
            write!(f, "TaskId({}#{})", self.index, self.generation)
        }
    }
}

// ---------------------------------------------------------------------------
// Held-lock set
// ---------------------------------------------------------------------------

/// Fixed-capacity set of locks a task currently holds.
#[derive(Clone, Copy)]
pub struct HeldLocks {
    slots: [Option<&'static Lock>; HELD_LOCKS_MAX],
}

impl HeldLocks {
    pub const fn new() -> Self {
        Self { slots: [None; HELD_LOCKS_MAX] }
    }

    /// Record `lock` as held. Fatal when the set is already full.
    pub fn insert(&mut self, lock: &'static Lock, pid: u32) {
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => *slot = Some(lock),
            None => fatal(Fault::HeldLocksExhausted { pid }),
        }
    }

    /// Forget `lock`. Returns whether it was present; absence is fine,
    /// the reclaimer may already have released it on the owner's behalf.
    pub fn remove(&mut self, lock: &Lock) -> bool {
        for slot in self.slots.iter_mut() {
            if matches!(slot, Some(held) if ptr::eq(*held, lock)) {
                *slot = None;
                return true;
            }
        }
        false
    }

    pub fn contains(&self, lock: &Lock) -> bool {
        self.slots
            .iter()
            .any(|slot| matches!(slot, Some(held) if ptr::eq(*held, lock)))
    }

    /// Any one held lock.
    pub fn first(&self) -> Option<&'static Lock> {
        self.slots.iter().flatten().next().copied()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.first().is_none()
    }
}

impl Default for HeldLocks {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block (TCB).
///
/// The stack grows downward: `stack.limit <= top <= stack.base` must hold
/// whenever the scheduler inspects the task.
pub struct TaskControlBlock {
    /// Process id, unique for the lifetime of the system.
    pub pid: u32,

    /// Entry function, restarted from scratch on every activation.
    pub entry: TaskEntry,

    /// Stack memory owned by this task.
    pub stack: StackRegion,

    /// Saved stack pointer. Updated on every context save.
    pub top: StackAddr,

    pub priority: Priority,

    /// Period in ticks; `0` means aperiodic.
    pub period: u32,

    /// Ticks left until the next periodic activation.
    pub ticks_until_wake: u32,

    /// True once a context exists on the stack (dispatched at least once
    /// in the current activation).
    pub running: bool,

    /// Set by a periodic task that wants no further activations.
    pub abort: bool,

    /// Locks currently held.
    pub held: HeldLocks,

    /// Lock this task is blocked on, if any.
    pub waiting: Option<&'static Lock>,
}

impl TaskControlBlock {
    /// Build a control block for a fresh task. The countdown is primed so
    /// the first periodic re-activation lands exactly `period` ticks out.
    pub fn new(pid: u32, entry: TaskEntry, priority: Priority, period: u32, stack: StackRegion) -> Self {
        Self {
            pid,
            entry,
            top: stack.base,
            stack,
            priority,
            period,
            ticks_until_wake: period.saturating_sub(1),
            running: false,
            abort: false,
            held: HeldLocks::new(),
            waiting: None,
        }
    }

    #[inline]
    pub fn is_periodic(&self) -> bool {
        self.period != 0
    }

    /// Check the saved stack pointer against the stack bounds.
    pub fn check_stack(&self) {
        if self.stack.limit > self.top {
            fatal(Fault::StackOverflow { pid: self.pid, top: self.top, limit: self.stack.limit });
        }
        if self.top > self.stack.base {
            fatal(Fault::StackUnderflow { pid: self.pid, top: self.top, base: self.stack.base });
        }
    }

    /// Reset for the next period: the context is discarded and the stack
    /// rewound to its base.
    pub fn rewind(&mut self) {
        self.running = false;
        self.top = self.stack.base;
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
