//! # Kernel
//!
//! Top-level kernel object and the public, thread-mode API of RmOS.
//!
//! [`Kernel`] owns the scheduler and the stack allocator, each behind a
//! `critical_section::Mutex<RefCell<_>>`. Operations that change the task
//! lists go through [`Kernel::privileged`]: once tasks are running they
//! trap into the SVCall handler, before that (or on a port that cannot
//! trap) they run inline inside a critical section.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         └─► kernel::start(cp, startup)     ← never returns
//!               ├─► spawn reclaimer and idle tasks
//!               ├─► startup()                ← application spawns tasks
//!               ├─► dispatch first task
//!               ├─► configure SysTick and handler priorities
//!               └─► arch::start_first_task()
//! ```
//!
//! ## Built-in tasks
//!
//! - **reclaimer**: periodic, above application priorities. Frees the
//!   stacks of terminated tasks and releases locks they still held.
//! - **idle**: priority 0, never ends, so the ready queue is never empty.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;

use crate::arch::{self, Port, StackAddr, SystemPort};
use crate::config::{IDLE_PRIORITY, RECLAIMER_PERIOD_US, RECLAIMER_PRIORITY, STACK_WORDS};
use crate::fault::{fatal, Fault};
use crate::mutex::Lock;
use crate::scheduler::{period_to_ticks, NotRunnable, Scheduler};
use crate::stack::{StackAllocator, StackPool};
use crate::svc::ServiceCall;
use crate::sync;
use crate::task::{Priority, TaskEntry, TaskId};

pub struct Kernel<P: Port, A: StackAllocator> {
    sched: Mutex<RefCell<Scheduler<P>>>,
    stacks: Mutex<RefCell<A>>,
    started: AtomicBool,
}

impl<P: Port, A: StackAllocator> Kernel<P, A> {
    pub const fn new(port: P, stacks: A) -> Self {
        Self {
            sched: Mutex::new(RefCell::new(Scheduler::new(port, task_exit))),
            stacks: Mutex::new(RefCell::new(stacks)),
            started: AtomicBool::new(false),
        }
    }

    /// Run `f` on the scheduler inside a critical section.
    pub fn with<R>(&self, f: impl FnOnce(&mut Scheduler<P>) -> R) -> R {
        sync::critical_section(|cs| f(&mut self.sched.borrow_ref_mut(cs)))
    }

    /// Run `f` on the stack allocator inside a critical section.
    pub fn with_stacks<R>(&self, f: impl FnOnce(&mut A) -> R) -> R {
        sync::critical_section(|cs| f(&mut self.stacks.borrow_ref_mut(cs)))
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    fn in_interrupt(&self) -> bool {
        self.with(|s| s.port().in_interrupt())
    }

    /// Perform `call` in privileged mode.
    ///
    /// From an exception handler the call runs inline, and only calls
    /// that never switch tasks are allowed. The interrupted task's
    /// registers are not saved there, so a switch would resume another
    /// task on a broken frame.
    pub fn privileged(&self, call: ServiceCall) -> i32 {
        if self.in_interrupt() {
            if !call.allowed_in_interrupt() {
                fatal(Fault::ServiceCallFromInterrupt);
            }
            return self.with(|s| s.service_call_inline(call));
        }
        if self.is_started() {
            if let Some(ret) = P::trap(call) {
                return ret;
            }
        }
        self.service_call(call)
    }

    /// Privileged-call body. Entered from the SVCall handler, or inline.
    pub fn service_call(&self, call: ServiceCall) -> i32 {
        self.with(|s| s.service_call(call))
    }

    // -----------------------------------------------------------------------
    // Task lifecycle
    // -----------------------------------------------------------------------

    /// Create a task and make it schedulable. `period_us == 0` makes it
    /// aperiodic; any other period is rounded up to whole ticks.
    ///
    /// Running out of stacks or task slots is fatal.
    pub fn spawn(&self, entry: TaskEntry, priority: Priority, period_us: u32) -> TaskId {
        let stack = match self.with_stacks(|a| a.alloc(STACK_WORDS)) {
            Some(stack) => stack,
            None => fatal(Fault::AllocationFailed),
        };
        let period = period_to_ticks(period_us);
        let id = match self.with(|s| s.create_task(entry, priority, period, stack)) {
            Some(id) => id,
            None => {
                self.with_stacks(|a| a.free(stack));
                fatal(Fault::TaskTableFull)
            }
        };
        self.privileged(ServiceCall::RegisterTask(id));
        id
    }

    /// Install the built-in tasks, run `startup`, and dispatch the first
    /// task. Returns the first task's stack pointer.
    pub fn boot(&self, startup: impl FnOnce()) -> StackAddr {
        log::info!("RmOS booting");
        self.spawn(reclaimer_task, RECLAIMER_PRIORITY, RECLAIMER_PERIOD_US);
        self.spawn(idle_task, IDLE_PRIORITY, 0);

        startup();

        let top = self.with(|s| s.start());
        self.started.store(true, Ordering::Release);
        log::info!("scheduler started with {} tasks", self.task_count());
        top
    }

    /// End the calling task. On hardware this does not return.
    pub fn end_task(&self) {
        self.privileged(ServiceCall::EndTask);
    }

    /// End the calling task and cancel its future periodic activations.
    pub fn abort(&self) {
        self.privileged(ServiceCall::Abort);
    }

    /// Give the processor to the next ready task. A no-op before the
    /// scheduler starts and in interrupt context.
    pub fn yield_task(&self) {
        if !self.is_started() || self.in_interrupt() {
            return;
        }
        self.privileged(ServiceCall::Yield);
    }

    /// Run `id` immediately.
    pub fn task_switch(&self, id: TaskId) -> Result<(), NotRunnable> {
        if !self.is_started() {
            return Err(NotRunnable);
        }
        match self.privileged(ServiceCall::TaskSwitch(id)) {
            0 => Ok(()),
            _ => Err(NotRunnable),
        }
    }

    // -----------------------------------------------------------------------
    // Locks
    // -----------------------------------------------------------------------

    /// Block until `lock` is held by the calling task. Before the
    /// scheduler starts the lock is simply taken for the boot owner.
    pub fn acquire(&self, lock: &'static Lock) {
        if !self.is_started() {
            lock.force_acquire(TaskId::BOOT);
            return;
        }
        while self.privileged(ServiceCall::Acquire(lock)) == 0 {}
    }

    pub fn release(&self, lock: &'static Lock) {
        if !self.is_started() || !lock.is_locked() {
            lock.force_release();
            return;
        }
        self.privileged(ServiceCall::Release(lock));
    }

    /// Reclaimer body: free every terminated task, releasing the locks it
    /// still held first. Returns how many tasks were freed.
    pub fn reclaim(&self) -> usize {
        let mut freed = 0;
        while let Some(task) = self.with(|s| s.pop_reclaimable()) {
            while let Some(lock) = self.with(|s| s.held_lock(task)) {
                log::debug!("releasing lock abandoned by {:?}", task);
                self.privileged(ServiceCall::ReleaseFor(lock, task));
            }
            if let Some(stack) = self.with(|s| s.free_task(task)) {
                self.with_stacks(|a| a.free(stack));
                freed += 1;
            }
        }
        freed
    }

    // -----------------------------------------------------------------------
    // Interrupt entry points
    // -----------------------------------------------------------------------

    /// Timer tick.
    pub fn systick(&self) {
        self.with(|s| s.on_tick());
    }

    /// Deferred context switch.
    pub fn deferred_switch(&self) {
        self.with(|s| s.deferred_switch());
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn current_task(&self) -> Option<TaskId> {
        self.with(|s| s.current_task())
    }

    pub fn task_count(&self) -> usize {
        self.with(|s| s.task_count())
    }

    pub fn approx_num_tasks(&self) -> usize {
        self.with(|s| s.approx_num_tasks())
    }

    /// Whether `id` is in the ready queue.
    pub fn task_exists(&self, id: TaskId) -> bool {
        self.with(|s| s.is_runnable(id))
    }

    pub fn ticks(&self) -> u64 {
        self.with(|s| s.ticks())
    }
}

// ---------------------------------------------------------------------------
// Global kernel instance
// ---------------------------------------------------------------------------

/// The kernel used by the exception handlers and the free functions below.
pub static KERNEL: Kernel<SystemPort, StackPool> = Kernel::new(SystemPort::new(), StackPool::new());

extern "C" fn reclaimer_task() {
    KERNEL.reclaim();
}

extern "C" fn idle_task() {
    loop {
        arch::wait_for_interrupt();
    }
}

/// Return address of every task.
extern "C" fn task_exit() {
    end_task();
}

/// Boot the kernel and start multitasking. **Does not return.**
///
/// `startup` runs before the first dispatch and is where the application
/// spawns its tasks and initializes its locks.
#[cfg(rmos_cortex_m)]
pub fn start(mut core_peripherals: cortex_m::Peripherals, startup: impl FnOnce()) -> ! {
    use crate::arch::cortex_m4;

    cortex_m::interrupt::disable();
    let top = KERNEL.boot(startup);

    cortex_m4::configure_systick(&mut core_peripherals.SYST);
    cortex_m4::set_interrupt_priorities(&mut core_peripherals.SCB);

    // SAFETY: called once, in Thread mode on MSP, with the dispatched
    // task's initial frame.
    unsafe { cortex_m4::start_first_task(top) }
}

/// Create a task. See [`Kernel::spawn`].
pub fn spawn(entry: TaskEntry, priority: Priority, period_us: u32) -> TaskId {
    KERNEL.spawn(entry, priority, period_us)
}

/// End the calling task.
pub fn end_task() -> ! {
    KERNEL.end_task();
    loop {
        arch::wait_for_interrupt();
    }
}

/// End the calling periodic task for good.
pub fn abort() -> ! {
    KERNEL.abort();
    loop {
        arch::wait_for_interrupt();
    }
}

pub fn yield_task() {
    KERNEL.yield_task();
}

pub fn task_switch(id: TaskId) -> Result<(), NotRunnable> {
    KERNEL.task_switch(id)
}

pub fn acquire(lock: &'static Lock) {
    KERNEL.acquire(lock);
}

pub fn release(lock: &'static Lock) {
    KERNEL.release(lock);
}

pub fn current_task() -> Option<TaskId> {
    KERNEL.current_task()
}

pub fn task_count() -> usize {
    KERNEL.task_count()
}

pub fn approx_num_tasks() -> usize {
    KERNEL.approx_num_tasks()
}

pub fn task_exists(id: TaskId) -> bool {
    KERNEL.task_exists(id)
}

/// Timer ticks since boot.
pub fn ticks() -> u64 {
    KERNEL.ticks()
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
