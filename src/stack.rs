//! # Task Stacks
//!
//! Task stacks come from a [`StackAllocator`]. The default one is a
//! statically reserved pool of equally sized, 8-byte aligned stacks
//! (AAPCS requires 8-byte stack alignment at public interfaces).
//!
//! A stack is described by its [`StackRegion`]: the lowest usable address
//! (`limit`) and the address one past the top (`base`). Stacks grow down
//! from `base` towards `limit`.

use core::cell::UnsafeCell;

use crate::arch::StackAddr;
use crate::config::{MAX_TASKS, STACK_WORDS};

/// Bounds of one task stack.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct StackRegion {
    /// Lowest valid stack address.
    pub limit: StackAddr,
    /// Initial stack pointer (one past the highest word).
    pub base: StackAddr,
}

impl StackRegion {
    pub const fn new(limit: StackAddr, words: usize) -> Self {
        Self { limit, base: limit + words * core::mem::size_of::<u32>() }
    }

    pub const fn size_bytes(&self) -> usize {
        self.base - self.limit
    }
}

/// Source of task stacks.
pub trait StackAllocator {
    /// Reserve a stack of at least `words` 32-bit words.
    fn alloc(&mut self, words: usize) -> Option<StackRegion>;

    /// Return a stack previously handed out by `alloc`.
    fn free(&mut self, region: StackRegion);
}

#[repr(C, align(8))]
struct Stack([u32; STACK_WORDS]);

/// Fixed pool of `MAX_TASKS` stacks of `STACK_WORDS` words each.
pub struct StackPool {
    stacks: [UnsafeCell<Stack>; MAX_TASKS],
    used: [bool; MAX_TASKS],
}

// SAFETY: the pool never reads or writes stack memory itself, it only
// hands out addresses; each stack is then owned by exactly one task.
unsafe impl Send for StackPool {}

impl StackPool {
    #[allow(clippy::declare_interior_mutable_const)]
    const FREE_STACK: UnsafeCell<Stack> = UnsafeCell::new(Stack([0; STACK_WORDS]));

    pub const fn new() -> Self {
        Self { stacks: [Self::FREE_STACK; MAX_TASKS], used: [false; MAX_TASKS] }
    }

    /// Number of stacks not currently handed out.
    pub fn available(&self) -> usize {
        self.used.iter().filter(|u| !**u).count()
    }

    fn region(&self, i: usize) -> StackRegion {
        StackRegion::new(self.stacks[i].get() as StackAddr, STACK_WORDS)
    }
}

impl Default for StackPool {
    fn default() -> Self {
        Self::new()
    }
}

impl StackAllocator for StackPool {
    fn alloc(&mut self, words: usize) -> Option<StackRegion> {
        if words > STACK_WORDS {
            return None;
        }
        let i = self.used.iter().position(|u| !*u)?;
        self.used[i] = true;
        Some(self.region(i))
    }

    fn free(&mut self, region: StackRegion) {
        match (0..MAX_TASKS).find(|&i| self.region(i) == region) {
            Some(i) => self.used[i] = false,
            None => log::warn!("freeing unknown stack at {:#x}", region.limit),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
