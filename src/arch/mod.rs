//! # Architecture Abstraction Layer
//!
//! The scheduler never touches processor registers directly. Everything
//! it needs from the CPU goes through the [`Port`] trait:
//!
//! - building the first context frame of a task,
//! - reading and replacing the active task stack pointer,
//! - arming the deferred (lowest priority) context switch,
//! - trapping into privileged mode for a kernel service call.
//!
//! Two ports exist. [`cortex_m4::CortexM4`] is the real one, compiled
//! for Armv7-M targets (see `build.rs`). [`sim::SimPort`] models the same
//! state in plain memory so the scheduler and lock logic run on the host
//! under `cargo test`.

use crate::stack::StackRegion;
use crate::svc::ServiceCall;
use crate::task::TaskEntry;

#[cfg(rmos_cortex_m)]
pub mod cortex_m4;
pub mod sim;

/// An address inside a task stack.
pub type StackAddr = usize;

/// Processor services required by the scheduler.
pub trait Port {
    /// Lay out an initial context on `stack` so that restoring it starts
    /// `entry` with `exit` as its return address. Returns the new top.
    fn create_context(&mut self, stack: &StackRegion, entry: TaskEntry, exit: TaskEntry) -> StackAddr;

    /// Stack pointer of the interrupted task, after its registers were
    /// pushed by the exception entry sequence.
    fn active_stack_pointer(&self) -> StackAddr;

    /// Make `sp` the stack the exception return will restore from.
    fn set_active_stack_pointer(&mut self, sp: StackAddr);

    /// Request a context switch once no other interrupt is active.
    fn arm_deferred_switch(&mut self);

    /// True while an exception handler, not a task, is executing.
    fn in_interrupt(&self) -> bool;

    /// Enter privileged mode to perform `call`.
    ///
    /// Returns `None` if the port cannot trap from the current context;
    /// the caller then runs the call inline.
    fn trap(call: ServiceCall) -> Option<i32>;
}

/// The port used by the global kernel instance.
#[cfg(rmos_cortex_m)]
pub type SystemPort = cortex_m4::CortexM4;
#[cfg(not(rmos_cortex_m))]
pub type SystemPort = sim::SimPort;

/// True when executing an exception handler rather than a task.
#[inline]
pub fn in_interrupt() -> bool {
    #[cfg(rmos_cortex_m)]
    {
        use cortex_m::peripheral::scb::VectActive;
        cortex_m::peripheral::SCB::vect_active() != VectActive::ThreadMode
    }
    #[cfg(not(rmos_cortex_m))]
    {
        false
    }
}

/// Sleep until the next interrupt.
#[inline]
pub fn wait_for_interrupt() {
    #[cfg(rmos_cortex_m)]
    cortex_m::asm::wfi();
    #[cfg(not(rmos_cortex_m))]
    core::hint::spin_loop();
}
