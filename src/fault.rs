//! # Faults
//!
//! Every invariant violation inside the kernel is unrecoverable. This
//! module names them and provides the single path that halts the system.

use core::fmt;

/// An unrecoverable kernel condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// A task's stack pointer crossed below its allocated limit.
    StackOverflow { pid: u32, top: usize, limit: usize },
    /// A task's stack pointer sits above its stack base.
    StackUnderflow { pid: u32, top: usize, base: usize },
    /// Dispatch found no runnable task.
    EmptyReadyQueue,
    /// A task tried to acquire a lock it already holds.
    DoubleAcquire { pid: u32 },
    /// Two tasks each hold the lock the other is waiting for.
    Deadlock { holder: u32, waiter: u32 },
    /// A task tried to hold more than `HELD_LOCKS_MAX` locks.
    HeldLocksExhausted { pid: u32 },
    /// A lock is marked taken but records no holder.
    LockWithoutHolder,
    /// A reentrant lock was released by a task that does not own it.
    NotLockOwner,
    /// An unrecognized privileged-call number.
    UnknownServiceCall(u32),
    /// A privileged call that may switch tasks, made from an exception
    /// handler.
    ServiceCallFromInterrupt,
    /// The stack allocator could not provide a stack.
    AllocationFailed,
    /// Every task slot is in use.
    TaskTableFull,
    /// A handle referring to a reclaimed or never-created task.
    StaleTask,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Fault::StackOverflow { pid, top, limit } => write!(
                f,
                "task {} has overflowed its stack (top: {:#x}, limit: {:#x})",
                pid, top, limit
            ),
            Fault::StackUnderflow { pid, top, base } => write!(
                f,
                "task {} stack pointer above its base (top: {:#x}, base: {:#x})",
                pid, top, base
            ),
            Fault::EmptyReadyQueue => f.write_str("no tasks to run"),
            Fault::DoubleAcquire { pid } => {
                write!(f, "task {} attempted to double acquire a lock", pid)
            }
            Fault::Deadlock { holder, waiter } => write!(
                f,
                "deadlock: task {} waits on a lock held by task {}, which waits on it",
                waiter, holder
            ),
            Fault::HeldLocksExhausted { pid } => {
                write!(f, "task {} holds too many locks", pid)
            }
            Fault::LockWithoutHolder => f.write_str("lock taken but holder unset"),
            Fault::NotLockOwner => f.write_str("reentrant lock released by non-owner"),
            Fault::UnknownServiceCall(n) => write!(f, "unknown service call: {}", n),
            Fault::ServiceCallFromInterrupt => {
                f.write_str("task-switching service call made from interrupt context")
            }
            Fault::AllocationFailed => f.write_str("could not allocate task stack"),
            Fault::TaskTableFull => f.write_str("task table full"),
            Fault::StaleTask => f.write_str("stale task handle"),
        }
    }
}

/// Halt the system on an unrecoverable fault.
///
/// Interrupts are masked first on Cortex-M so nothing else gets
/// scheduled while the panic handler runs.
#[cold]
pub fn fatal(fault: Fault) -> ! {
    #[cfg(rmos_cortex_m)]
    cortex_m::interrupt::disable();

    log::error!("panic: {}", fault);
    panic!("{}", fault)
}
