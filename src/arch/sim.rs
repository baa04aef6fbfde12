//! # Simulation Port
//!
//! A port with no hardware behind it. The "process stack pointer" is a
//! plain field and a deferred switch is just a flag, so tests can drive
//! the scheduler step by step and inspect what it asked for.
//!
//! Context frames are never written: the new top is computed as if the
//! 16-word frame of the Cortex-M port had been pushed, keeping stack
//! bookkeeping identical across ports.

use super::{Port, StackAddr};
use crate::stack::StackRegion;
use crate::svc::ServiceCall;
use crate::task::TaskEntry;

/// Words in an initial context frame (8 software + 8 hardware stacked).
pub const FRAME_WORDS: usize = 16;

#[derive(Debug, Default)]
pub struct SimPort {
    psp: StackAddr,
    switch_pending: bool,
    contexts_created: u32,
    in_interrupt: bool,
}

impl SimPort {
    pub const fn new() -> Self {
        Self { psp: 0, switch_pending: false, contexts_created: 0, in_interrupt: false }
    }

    /// Whether a deferred switch has been armed and not yet taken.
    pub fn switch_pending(&self) -> bool {
        self.switch_pending
    }

    /// Clear the pending flag, as taking the PendSV exception would.
    pub fn take_pending(&mut self) -> bool {
        core::mem::replace(&mut self.switch_pending, false)
    }

    pub fn contexts_created(&self) -> u32 {
        self.contexts_created
    }

    /// Pretend to enter (or leave) an exception handler.
    pub fn set_in_interrupt(&mut self, active: bool) {
        self.in_interrupt = active;
    }
}

impl Port for SimPort {
    fn create_context(&mut self, stack: &StackRegion, _entry: TaskEntry, _exit: TaskEntry) -> StackAddr {
        self.contexts_created += 1;
        stack.base - FRAME_WORDS * core::mem::size_of::<u32>()
    }

    fn active_stack_pointer(&self) -> StackAddr {
        self.psp
    }

    fn set_active_stack_pointer(&mut self, sp: StackAddr) {
        self.psp = sp;
    }

    fn arm_deferred_switch(&mut self) {
        self.switch_pending = true;
    }

    fn in_interrupt(&self) -> bool {
        self.in_interrupt
    }

    fn trap(_call: ServiceCall) -> Option<i32> {
        None
    }
}
