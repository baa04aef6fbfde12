//! # Locks
//!
//! A single lock design serves as both mutex and semaphore. The lock
//! itself is a flag plus two task references:
//!
//! - `holder`: the owner, set exactly when the flag is set
//! - `waiter`: the highest priority task known to be waiting, if any
//!
//! Only one waiter is remembered. Other contenders are not queued; they
//! simply retry each time they are dispatched.
//!
//! ## Acquire and release
//!
//! Both run as privileged calls inside the scheduler. A failed acquire
//! runs the two-party deadlock check, claims the waiter slot if the caller
//! outranks its occupant, then gives the processor away: to the holder
//! when it is runnable and does not outrank the caller (so it can finish
//! and release), otherwise to whatever the ready queue says. The caller
//! retries when it next runs.
//!
//! Release clears the lock and, when the recorded waiter is at least as
//! important as the releaser, hands the processor straight to it.
//!
//! ## Flag primitives
//!
//! The flag is pluggable through [`LockFlag`]. [`AtomicFlag`] uses
//! compare-and-swap; [`InterruptFreeFlag`] does the read-modify-write with
//! interrupts masked, for cores without atomic RMW instructions. The
//! `interrupt-free-lock` feature selects the latter for [`Lock`].

use core::cell::{Cell, UnsafeCell};
use core::cmp::Ordering;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use crate::arch::Port;
use crate::fault::{fatal, Fault};
use crate::kernel;
use crate::scheduler::Scheduler;
use crate::sync;
use crate::task::TaskId;

// ---------------------------------------------------------------------------
// Flag primitives
// ---------------------------------------------------------------------------

/// The exclusive-ownership bit of a lock.
pub trait LockFlag: Sync {
    const UNLOCKED: Self;

    /// Set the flag if it is clear. Returns whether this call set it.
    fn try_lock(&self) -> bool;
    fn unlock(&self);
    fn is_locked(&self) -> bool;
    /// Set the flag regardless of its state.
    fn force_lock(&self);
}

pub struct AtomicFlag(AtomicBool);

impl LockFlag for AtomicFlag {
    #[allow(clippy::declare_interior_mutable_const)]
    const UNLOCKED: Self = AtomicFlag(AtomicBool::new(false));

    fn try_lock(&self) -> bool {
        self.0
            .compare_exchange(false, true, AtomicOrdering::Acquire, AtomicOrdering::Relaxed)
            .is_ok()
    }

    fn unlock(&self) {
        self.0.store(false, AtomicOrdering::Release);
    }

    fn is_locked(&self) -> bool {
        self.0.load(AtomicOrdering::Acquire)
    }

    fn force_lock(&self) {
        self.0.store(true, AtomicOrdering::Release);
    }
}

pub struct InterruptFreeFlag(Cell<bool>);

// SAFETY: the cell is only touched inside a critical section.
unsafe impl Sync for InterruptFreeFlag {}

impl LockFlag for InterruptFreeFlag {
    #[allow(clippy::declare_interior_mutable_const)]
    const UNLOCKED: Self = InterruptFreeFlag(Cell::new(false));

    fn try_lock(&self) -> bool {
        sync::critical_section(|_| !self.0.replace(true))
    }

    fn unlock(&self) {
        sync::critical_section(|_| self.0.set(false));
    }

    fn is_locked(&self) -> bool {
        sync::critical_section(|_| self.0.get())
    }

    fn force_lock(&self) {
        sync::critical_section(|_| self.0.set(true));
    }
}

#[cfg(not(feature = "interrupt-free-lock"))]
pub type DefaultFlag = AtomicFlag;
#[cfg(feature = "interrupt-free-lock")]
pub type DefaultFlag = InterruptFreeFlag;

// ---------------------------------------------------------------------------
// Lock
// ---------------------------------------------------------------------------

/// A lock generic over its flag primitive.
pub struct RawLock<F: LockFlag> {
    flag: F,
    holder: Cell<Option<TaskId>>,
    waiter: Cell<Option<TaskId>>,
}

// SAFETY: `holder` and `waiter` are written only by the scheduler, which
// runs inside a critical section, or by boot code before any task exists.
unsafe impl<F: LockFlag> Sync for RawLock<F> {}

/// The kernel lock.
pub type Lock = RawLock<DefaultFlag>;

/// Semaphores and mutexes share one implementation.
pub type Semaphore = Lock;

impl<F: LockFlag> RawLock<F> {
    pub const fn new() -> Self {
        Self { flag: F::UNLOCKED, holder: Cell::new(None), waiter: Cell::new(None) }
    }

    pub fn is_locked(&self) -> bool {
        self.flag.is_locked()
    }

    pub fn holder(&self) -> Option<TaskId> {
        self.holder.get()
    }

    pub fn waiter(&self) -> Option<TaskId> {
        self.waiter.get()
    }

    /// Take the lock unconditionally for `owner` (single-threaded boot).
    pub fn force_acquire(&self, owner: TaskId) {
        self.flag.force_lock();
        self.holder.set(Some(owner));
    }

    /// Drop the lock unconditionally (single-threaded boot).
    pub fn force_release(&self) {
        self.flag.unlock();
        self.holder.set(None);
        self.waiter.set(None);
    }
}

impl<F: LockFlag> Default for RawLock<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: LockFlag> core::fmt::Debug for RawLock<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Lock")
            .field("locked", &self.is_locked())
            .field("holder", &self.holder())
            .field("waiter", &self.waiter())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Privileged lock operations
// ---------------------------------------------------------------------------

impl<P: Port> Scheduler<P> {
    /// One acquire attempt by the current task. On failure another task
    /// has been dispatched and `false` is returned; the caller retries.
    pub fn acquire(&mut self, lock: &'static Lock) -> bool {
        let me = self.current_or_fatal();

        if lock.flag.try_lock() {
            lock.holder.set(Some(me));
            if lock.waiter.get() == Some(me) {
                lock.waiter.set(None);
            }
            let tcb = self.tcb_mut(me);
            tcb.held.insert(lock, tcb.pid);
            tcb.waiting = None;
            return true;
        }

        let holder = match lock.holder.get() {
            Some(holder) => holder,
            None => fatal(Fault::LockWithoutHolder),
        };
        self.deadlock_check(lock);

        let claims_slot = match lock.waiter.get() {
            Some(waiter) => self.compare(Some(waiter), Some(me)) == Ordering::Less,
            None => true,
        };
        if claims_slot {
            lock.waiter.set(Some(me));
            self.tcb_mut(me).waiting = Some(lock);
        }

        if self.is_runnable(holder) && self.compare(Some(holder), Some(me)) != Ordering::Greater {
            self.switch_task(Some(holder));
        } else {
            // Holder is dormant, dead, or will preempt us anyway. A dead
            // holder's locks are released by the reclaimer.
            self.switch_task(None);
        }
        false
    }

    /// Release `lock` held by the current task, handing the processor to
    /// the recorded waiter when it is at least as important.
    pub fn release(&mut self, lock: &'static Lock) {
        let me = self.current_or_fatal();
        if !self.unlock(lock, me) {
            return;
        }

        if let Some(waiter) = lock.waiter.get() {
            if self.compare(Some(waiter), Some(me)) != Ordering::Less && self.is_runnable(waiter) {
                lock.waiter.set(None);
                log::debug!("lock hand-off to {:?}", waiter);
                self.switch_task(Some(waiter));
            }
        }
    }

    /// Release `lock` on behalf of `owner`, which need not be running.
    ///
    /// The lock is dropped from `owner`'s held set in any case, but only
    /// unlocked while `owner` is still its holder. Returns whether it was
    /// unlocked.
    pub fn release_for(&mut self, lock: &'static Lock, owner: TaskId) -> bool {
        if lock.is_locked() && lock.holder.get() != Some(owner) {
            if let Some(tcb) = self.task_mut(owner) {
                tcb.held.remove(lock);
            }
            log::debug!("{:?} no longer holds lock, leaving it locked", owner);
            return false;
        }
        self.unlock(lock, owner)
    }

    /// Drop `lock` from `owner`'s held set and unlock it. Returns `false`
    /// when the lock was already free.
    fn unlock(&mut self, lock: &'static Lock, owner: TaskId) -> bool {
        if let Some(tcb) = self.task_mut(owner) {
            tcb.held.remove(lock);
        }
        if !lock.is_locked() {
            lock.holder.set(None);
            lock.waiter.set(None);
            return false;
        }
        lock.flag.unlock();
        lock.holder.set(None);
        true
    }

    /// Fatal if the current task already holds `lock`, or if the holder
    /// waits on a lock the current task holds.
    pub fn deadlock_check(&self, lock: &Lock) {
        let me = self.current_or_fatal();
        let Some(holder) = lock.holder.get() else {
            return;
        };
        let mine = self.tcb(me);

        if holder == me {
            fatal(Fault::DoubleAcquire { pid: mine.pid });
        }

        if let Some(other) = self.task(holder) {
            if let Some(wanted) = other.waiting {
                if mine.held.contains(wanted) {
                    fatal(Fault::Deadlock { holder: other.pid, waiter: mine.pid });
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Data-carrying mutex
// ---------------------------------------------------------------------------

/// A kernel lock protecting a value.
///
/// ```ignore
/// static COUNTER: Mutex<u32> = Mutex::new(0);
/// COUNTER.perform(|n| *n += 1);
/// ```
pub struct Mutex<T> {
    lock: Lock,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by `lock`.
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T: 'static> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Self { lock: Lock::new(), data: UnsafeCell::new(value) }
    }

    /// Block until the lock is taken.
    pub fn lock(&'static self) -> MutexGuard<T> {
        kernel::acquire(&self.lock);
        MutexGuard { mutex: self }
    }

    /// Run `f` with the lock held.
    pub fn perform<R>(&'static self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    pub fn raw(&self) -> &Lock {
        &self.lock
    }
}

pub struct MutexGuard<T: 'static> {
    mutex: &'static Mutex<T>,
}

impl<T: 'static> Deref for MutexGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves the lock is held.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: 'static> DerefMut for MutexGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves the lock is held.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: 'static> Drop for MutexGuard<T> {
    fn drop(&mut self) {
        kernel::release(&self.mutex.lock);
    }
}

// ---------------------------------------------------------------------------
// Reentrant lock
// ---------------------------------------------------------------------------

/// A lock its owner may take repeatedly. The kernel lock is released when
/// the owner's acquire count drops back to zero.
pub struct ReentrantLock {
    lock: Lock,
    owner: Cell<Option<TaskId>>,
    count: Cell<u32>,
}

// SAFETY: `owner` and `count` are written only by the task holding `lock`.
unsafe impl Sync for ReentrantLock {}

impl ReentrantLock {
    pub const fn new() -> Self {
        Self { lock: Lock::new(), owner: Cell::new(None), count: Cell::new(0) }
    }

    fn caller() -> TaskId {
        kernel::current_task().unwrap_or(TaskId::BOOT)
    }

    pub fn acquire(&'static self) {
        let me = Self::caller();
        if self.owner.get() == Some(me) {
            self.count.set(self.count.get() + 1);
            return;
        }
        kernel::acquire(&self.lock);
        self.owner.set(Some(me));
        self.count.set(1);
    }

    pub fn release(&'static self) {
        if self.owner.get() != Some(Self::caller()) {
            fatal(Fault::NotLockOwner);
        }
        let count = self.count.get() - 1;
        self.count.set(count);
        if count == 0 {
            self.owner.set(None);
            kernel::release(&self.lock);
        }
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// Current nesting depth.
    pub fn depth(&self) -> u32 {
        self.count.get()
    }
}

impl Default for ReentrantLock {
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
    use crate::scheduler::tests::{new_scheduler, spawn};
    use std::boxed::Box;

    fn leak_lock() -> &'static Lock {
        Box::leak(Box::new(Lock::new()))
    }

    #[test]
    fn test_flags() {
        let atomic = AtomicFlag::UNLOCKED;
        assert!(atomic.try_lock());
        assert!(!atomic.try_lock());
        atomic.unlock();
        assert!(!atomic.is_locked());

        let irq_free = InterruptFreeFlag::UNLOCKED;
        assert!(irq_free.try_lock());
        assert!(!irq_free.try_lock());
        assert!(irq_free.is_locked());
        irq_free.unlock();
        irq_free.force_lock();
        assert!(irq_free.is_locked());
    }

    #[test]
    fn test_raw_lock_with_either_flag() {
        let a: RawLock<AtomicFlag> = RawLock::new();
        let b: RawLock<InterruptFreeFlag> = RawLock::new();
        a.force_acquire(TaskId::BOOT);
        b.force_acquire(TaskId::BOOT);
        assert_eq!(a.holder(), Some(TaskId::BOOT));
        assert!(b.is_locked());
        a.force_release();
        b.force_release();
        assert!(!a.is_locked() && a.holder().is_none());
        assert!(!b.is_locked() && b.holder().is_none());
    }

    #[test]
    fn test_uncontended_acquire_release() {
        let lock = leak_lock();
        let mut s = new_scheduler();
        let a = spawn(&mut s, 3, 0);
        spawn(&mut s, 0, 0);
        s.start();

        assert!(s.acquire(lock));
        assert_eq!(lock.holder(), Some(a));
        assert!(s.tcb(a).held.contains(lock));

        s.release(lock);
        assert!(!lock.is_locked());
        assert!(lock.holder().is_none());
        assert!(s.tcb(a).held.is_empty());
        assert_eq!(s.current_task(), Some(a));
    }

    #[test]
    fn test_contention_runs_holder_then_hands_off() {
        let lock = leak_lock();
        let mut s = new_scheduler();
        let low = spawn(&mut s, 2, 0);
        spawn(&mut s, 0, 0);
        s.start();
        assert!(s.acquire(lock));

        let high = spawn(&mut s, 5, 0);
        s.deferred_switch();
        assert_eq!(s.current_task(), Some(high));

        // Blocked: the lower-priority holder gets the processor.
        assert!(!s.acquire(lock));
        assert_eq!(lock.waiter(), Some(high));
        assert_eq!(s.current_task(), Some(low));
        assert_eq!(lock.holder(), Some(low));

        // Release hands straight over to the waiter.
        s.release(lock);
        assert_eq!(s.current_task(), Some(high));
        assert!(lock.waiter().is_none());
        assert!(s.acquire(lock));
        assert_eq!(lock.holder(), Some(high));
        assert!(s.tcb(high).waiting.is_none());
    }

    #[test]
    fn test_no_hand_off_to_lower_priority_waiter() {
        let lock = leak_lock();
        let mut s = new_scheduler();
        let high = spawn(&mut s, 5, 0);
        let low = spawn(&mut s, 2, 0);
        spawn(&mut s, 0, 0);
        s.start();
        assert!(s.acquire(lock));

        s.task_switch(low).unwrap();
        assert!(!s.acquire(lock));
        assert_eq!(lock.waiter(), Some(low));
        // Holder outranks the waiter, so the ready queue decides.
        assert_eq!(s.current_task(), Some(high));

        s.release(lock);
        assert_eq!(s.current_task(), Some(high));
        assert_eq!(lock.waiter(), Some(low));
    }

    #[test]
    fn test_waiter_slot_keeps_highest_priority() {
        let lock = leak_lock();
        let mut s = new_scheduler();
        let low = spawn(&mut s, 1, 0);
        let mid = spawn(&mut s, 3, 0);
        let high = spawn(&mut s, 5, 0);
        spawn(&mut s, 0, 0);
        s.start();

        s.task_switch(low).unwrap();
        assert!(s.acquire(lock));

        s.task_switch(mid).unwrap();
        assert!(!s.acquire(lock));
        assert_eq!(lock.waiter(), Some(mid));

        s.task_switch(high).unwrap();
        assert!(!s.acquire(lock));
        assert_eq!(lock.waiter(), Some(high));

        s.task_switch(mid).unwrap();
        assert!(!s.acquire(lock));
        assert_eq!(lock.waiter(), Some(high));
    }

    #[test]
    #[should_panic(expected = "double acquire")]
    fn test_double_acquire_is_fatal() {
        let lock = leak_lock();
        let mut s = new_scheduler();
        spawn(&mut s, 3, 0);
        spawn(&mut s, 0, 0);
        s.start();
        s.acquire(lock);
        s.acquire(lock);
    }

    #[test]
    #[should_panic(expected = "deadlock")]
    fn test_two_party_deadlock_is_fatal() {
        let x = leak_lock();
        let y = leak_lock();
        let mut s = new_scheduler();
        let a = spawn(&mut s, 3, 0);
        let b = spawn(&mut s, 3, 0);
        spawn(&mut s, 0, 0);
        s.start();

        s.task_switch(a).unwrap();
        assert!(s.acquire(x));
        s.task_switch(b).unwrap();
        assert!(s.acquire(y));

        // B blocks on X; A runs and blocks on Y.
        assert!(!s.acquire(x));
        assert_eq!(s.current_task(), Some(a));
        s.acquire(y);
    }

    #[test]
    fn test_release_of_free_lock_is_noop() {
        let lock = leak_lock();
        let mut s = new_scheduler();
        let a = spawn(&mut s, 3, 0);
        spawn(&mut s, 0, 0);
        s.start();
        s.release(lock);
        assert!(!lock.is_locked());
        assert_eq!(s.current_task(), Some(a));
    }

    #[test]
    fn test_abandoned_lock_freed_by_reclamation() {
        let lock = leak_lock();
        let mut s = new_scheduler();
        let dead = spawn(&mut s, 3, 0);
        let survivor = spawn(&mut s, 2, 0);
        spawn(&mut s, 0, 0);
        s.start();
        assert!(s.acquire(lock));
        s.end_task(false);
        assert_eq!(s.current_task(), Some(survivor));

        // Holder is gone: the ready queue picks the survivor again.
        assert!(!s.acquire(lock));
        assert_eq!(s.current_task(), Some(survivor));

        while let Some(task) = s.pop_reclaimable() {
            while let Some(held) = s.held_lock(task) {
                assert!(s.release_for(held, task));
            }
            assert!(s.free_task(task).is_some());
        }
        assert!(s.task(dead).is_none());
        assert!(s.acquire(lock));
        assert_eq!(lock.holder(), Some(survivor));
    }

    #[test]
    fn test_reclaim_leaves_relocked_lock_alone() {
        let lock = leak_lock();
        let mut s = new_scheduler();
        let dead = spawn(&mut s, 3, 0);
        let survivor = spawn(&mut s, 2, 0);
        spawn(&mut s, 0, 0);
        s.start();
        assert!(s.acquire(lock));
        s.end_task(false);
        assert_eq!(s.current_task(), Some(survivor));

        // Released by someone other than its holder, then taken again.
        s.release(lock);
        assert!(s.acquire(lock));

        let task = s.pop_reclaimable().unwrap();
        assert_eq!(task, dead);
        assert!(core::ptr::eq(s.held_lock(task).unwrap(), lock));
        assert!(!s.release_for(lock, task));
        assert!(s.held_lock(task).is_none());
        assert!(s.free_task(task).is_some());

        assert!(lock.is_locked());
        assert_eq!(lock.holder(), Some(survivor));
    }

    #[test]
    #[should_panic(expected = "holder unset")]
    fn test_lock_without_holder_is_fatal() {
        let lock = leak_lock();
        let mut s = new_scheduler();
        spawn(&mut s, 3, 0);
        spawn(&mut s, 0, 0);
        s.start();
        lock.flag.force_lock();
        s.acquire(lock);
    }

    static COUNTER: Mutex<u32> = Mutex::new(0);

    #[test]
    fn test_mutex_before_start_is_owned_by_boot() {
        {
            let mut guard = COUNTER.lock();
            *guard += 1;
            assert_eq!(COUNTER.raw().holder(), Some(TaskId::BOOT));
        }
        assert!(!COUNTER.raw().is_locked());
        assert_eq!(COUNTER.perform(|n| *n), 1);
    }

    static NESTED: ReentrantLock = ReentrantLock::new();

    #[test]
    fn test_reentrant_lock_nests() {
        NESTED.acquire();
        NESTED.acquire();
        assert_eq!(NESTED.depth(), 2);
        NESTED.release();
        assert!(NESTED.is_locked());
        NESTED.release();
        assert!(!NESTED.is_locked());
        assert_eq!(NESTED.depth(), 0);
    }

    #[test]
    #[should_panic(expected = "non-owner")]
    fn test_reentrant_release_by_non_owner_is_fatal() {
        let lock: &'static ReentrantLock = Box::leak(Box::new(ReentrantLock::new()));
        lock.release();
    }
}
