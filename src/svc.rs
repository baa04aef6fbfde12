//! # Service Calls
//!
//! Every operation that edits scheduler state on behalf of a task is
//! expressed as a [`ServiceCall`]. Tasks never touch the scheduler
//! directly: the kernel traps into privileged mode (the `SVC` exception
//! on Cortex-M) and the handler performs the call with the caller's
//! context already saved, so it is free to switch away.
//!
//! ## Register encoding
//!
//! ```text
//! r0  call number        (result on return)
//! r1  lock address, or low word of a TaskId
//! r2  next argument word
//! r3  next argument word
//! ```
//!
//! A [`TaskId`] takes two words: index, then generation.

use crate::fault::{fatal, Fault};
use crate::mutex::Lock;
use crate::task::TaskId;

/// A privileged scheduler operation.
#[derive(Clone, Copy)]
pub enum ServiceCall {
    /// Give up the processor to the next ready task.
    Yield,
    /// End the current task normally.
    EndTask,
    /// End the current task and stop any future periodic activations.
    Abort,
    /// Try to take a lock. Result `1` when taken, `0` when the caller
    /// must retry.
    Acquire(&'static Lock),
    Release(&'static Lock),
    /// Release a lock on behalf of a (dead) task.
    ReleaseFor(&'static Lock, TaskId),
    /// Make a newly created task schedulable.
    RegisterTask(TaskId),
    /// Run a specific ready task now. Result `0`, or `-1` when the task
    /// is not ready.
    TaskSwitch(TaskId),
}

const YIELD: u32 = 0;
const END_TASK: u32 = 1;
const ABORT: u32 = 2;
const ACQUIRE: u32 = 3;
const RELEASE: u32 = 4;
const RELEASE_FOR: u32 = 5;
const REGISTER_TASK: u32 = 6;
const TASK_SWITCH: u32 = 7;

impl ServiceCall {
    /// Call number and argument registers.
    pub fn encode(self) -> (u32, [usize; 3]) {
        match self {
            ServiceCall::Yield => (YIELD, [0, 0, 0]),
            ServiceCall::EndTask => (END_TASK, [0, 0, 0]),
            ServiceCall::Abort => (ABORT, [0, 0, 0]),
            ServiceCall::Acquire(lock) => (ACQUIRE, [lock_addr(lock), 0, 0]),
            ServiceCall::Release(lock) => (RELEASE, [lock_addr(lock), 0, 0]),
            ServiceCall::ReleaseFor(lock, task) => {
                let [lo, hi] = task_words(task);
                (RELEASE_FOR, [lock_addr(lock), lo, hi])
            }
            ServiceCall::RegisterTask(task) => {
                let [lo, hi] = task_words(task);
                (REGISTER_TASK, [lo, hi, 0])
            }
            ServiceCall::TaskSwitch(task) => {
                let [lo, hi] = task_words(task);
                (TASK_SWITCH, [lo, hi, 0])
            }
        }
    }

    /// Rebuild a call from its registers. An unknown number is fatal.
    ///
    /// # Safety
    /// For lock-carrying calls, `args[0]` must be the address of a
    /// `'static` [`Lock`], as produced by [`ServiceCall::encode`].
    pub unsafe fn decode(number: u32, args: [usize; 3]) -> ServiceCall {
        let task = |lo: usize, hi: usize| TaskId::from_raw((hi as u32 as u64) << 32 | lo as u32 as u64);
        match number {
            YIELD => ServiceCall::Yield,
            END_TASK => ServiceCall::EndTask,
            ABORT => ServiceCall::Abort,
            ACQUIRE => ServiceCall::Acquire(&*(args[0] as *const Lock)),
            RELEASE => ServiceCall::Release(&*(args[0] as *const Lock)),
            RELEASE_FOR => ServiceCall::ReleaseFor(&*(args[0] as *const Lock), task(args[1], args[2])),
            REGISTER_TASK => ServiceCall::RegisterTask(task(args[0], args[1])),
            TASK_SWITCH => ServiceCall::TaskSwitch(task(args[0], args[1])),
            n => fatal(Fault::UnknownServiceCall(n)),
        }
    }

    /// Whether the call can run from an exception handler. Only calls
    /// that never select another task qualify.
    pub fn allowed_in_interrupt(self) -> bool {
        matches!(self, ServiceCall::RegisterTask(_) | ServiceCall::ReleaseFor(..))
    }
}

fn lock_addr(lock: &'static Lock) -> usize {
    lock as *const Lock as usize
}

fn task_words(task: TaskId) -> [usize; 2] {
    let raw = task.into_raw();
    [raw as u32 as usize, (raw >> 32) as u32 as usize]
}
