//! # Scheduler
//!
//! Priority-preemptive scheduler with periodic re-activation.
//!
//! ## Algorithm
//!
//! The ready queue is kept sorted by priority, highest first. Every
//! dispatch without an explicit target pops the head and puts it straight
//! back at the end of its priority band, then runs it:
//!
//! ```text
//! ready: [A5 B5 C5 I0]   dispatch -> A   ready: [B5 C5 A5 I0]
//! ready: [B5 C5 A5 I0]   dispatch -> B   ready: [C5 A5 B5 I0]
//! ```
//!
//! A task alone at the top of the queue re-inserts at the head and keeps
//! running, which is strict preemption; equal priorities cycle, which is
//! round robin with a one-tick quantum.
//!
//! Periodic tasks also sit in the periodic registry. Each tick counts
//! down their wake counter and puts them back into the ready queue when it
//! expires. A periodic task that ends is rewound and waits for its next
//! activation; an aperiodic (or aborted) task moves to the reclaim queue
//! where the reclaimer task frees it.
//!
//! The scheduler itself never runs concurrently with itself: callers hold
//! it inside a critical section (see `kernel`).

use core::cmp::Ordering;
use core::fmt;

use crate::arch::{Port, StackAddr};
use crate::config::{MAX_TASKS, TICK_HZ};
use crate::fault::{fatal, Fault};
use crate::list::TaskList;
use crate::mutex::Lock;
use crate::stack::StackRegion;
use crate::svc::ServiceCall;
use crate::task::{Priority, TaskControlBlock, TaskEntry, TaskId};

/// Returned by a direct switch to a task that is not in the ready queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotRunnable;

impl fmt::Display for NotRunnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("task is not in the ready queue")
    }
}

/// Convert a period in microseconds to whole ticks, rounding up.
///
/// Any non-zero period is at least one tick; `0` stays `0` (aperiodic).
pub fn period_to_ticks(period_us: u32) -> u32 {
    if period_us == 0 {
        return 0;
    }
    let ticks = (period_us as u64 * TICK_HZ as u64).div_ceil(1_000_000);
    ticks.clamp(1, u32::MAX as u64) as u32
}

struct Slot {
    generation: u32,
    tcb: Option<TaskControlBlock>,
}

impl Slot {
    const EMPTY: Slot = Slot { generation: 0, tcb: None };
}

// ---------------------------------------------------------------------------
// Scheduler state
// ---------------------------------------------------------------------------

pub struct Scheduler<P: Port> {
    port: P,

    /// Where every task returns to when its entry function returns.
    exit: TaskEntry,

    slots: [Slot; MAX_TASKS],

    /// Runnable tasks, highest priority first. Includes the running task.
    ready: TaskList,

    /// Every live periodic task, whether ready or dormant.
    periodic: TaskList,

    /// Terminated tasks waiting for the reclaimer.
    reclaim: TaskList,

    current: Option<TaskId>,

    /// Registered tasks that have not terminated for good.
    total_tasks: usize,

    next_pid: u32,

    /// Set once the first task has been dispatched.
    switching: bool,

    ticks: u64,
}

impl<P: Port> Scheduler<P> {
    pub const fn new(port: P, exit: TaskEntry) -> Self {
        Self {
            port,
            exit,
            slots: [Slot::EMPTY; MAX_TASKS],
            ready: TaskList::new(),
            periodic: TaskList::new(),
            reclaim: TaskList::new(),
            current: None,
            total_tasks: 0,
            next_pid: 1,
            switching: false,
            ticks: 0,
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Whether the first task has been dispatched.
    #[inline]
    pub fn is_started(&self) -> bool {
        self.switching
    }

    pub fn current_task(&self) -> Option<TaskId> {
        self.current
    }

    /// Number of live tasks (registered and not terminated for good).
    pub fn task_count(&self) -> usize {
        self.total_tasks
    }

    /// Ready tasks plus dormant periodic tasks. Only a snapshot.
    pub fn approx_num_tasks(&self) -> usize {
        let dormant = self
            .periodic
            .iter()
            .filter(|id| self.task(*id).is_some_and(|t| !t.running) && !self.ready.contains(*id))
            .count();
        self.ready.len() + dormant
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn ready_queue(&self) -> &TaskList {
        &self.ready
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskControlBlock> {
        let slot = self.slots.get(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.tcb.as_ref()
    }

    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut TaskControlBlock> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.tcb.as_mut()
    }

    pub(crate) fn tcb(&self, id: TaskId) -> &TaskControlBlock {
        match self.task(id) {
            Some(tcb) => tcb,
            None => fatal(Fault::StaleTask),
        }
    }

    pub(crate) fn tcb_mut(&mut self, id: TaskId) -> &mut TaskControlBlock {
        match self.task_mut(id) {
            Some(tcb) => tcb,
            None => fatal(Fault::StaleTask),
        }
    }

    pub(crate) fn current_or_fatal(&self) -> TaskId {
        match self.current {
            Some(id) => id,
            None => fatal(Fault::StaleTask),
        }
    }

    /// Priority order of two optional tasks. A missing task loses to any
    /// existing one.
    pub fn compare(&self, a: Option<TaskId>, b: Option<TaskId>) -> Ordering {
        let prio = |id: Option<TaskId>| id.and_then(|id| self.task(id)).map(|t| t.priority);
        match (prio(a), prio(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        }
    }

    /// Whether `id` is in the ready queue.
    pub fn is_runnable(&self, id: TaskId) -> bool {
        self.ready.contains(id)
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Build a control block in a free slot. The task is not schedulable
    /// until [`register_task`](Self::register_task). `None` when the arena
    /// is full.
    pub fn create_task(
        &mut self,
        entry: TaskEntry,
        priority: Priority,
        period_ticks: u32,
        stack: StackRegion,
    ) -> Option<TaskId> {
        let index = self.slots.iter().position(|s| s.tcb.is_none())?;
        let pid = self.next_pid;
        self.next_pid += 1;

        let slot = &mut self.slots[index];
        slot.tcb = Some(TaskControlBlock::new(pid, entry, priority, period_ticks, stack));
        Some(TaskId::new(index, slot.generation))
    }

    /// Put a created task in the ready queue and, when periodic, the
    /// periodic registry.
    pub fn register_task(&mut self, id: TaskId) {
        let (priority, periodic, pid) = {
            let tcb = self.tcb(id);
            (tcb.priority, tcb.is_periodic(), tcb.pid)
        };
        if !self.ready.insert(id, priority) {
            return;
        }
        if periodic {
            self.periodic.insert(id, priority);
        }
        self.total_tasks += 1;
        log::trace!("registered task {} (priority {}, periodic: {})", pid, priority, periodic);
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Dispatch the first task. Returns its initial stack pointer.
    pub fn start(&mut self) -> StackAddr {
        self.switching = true;
        self.switch_task(None);
        self.port.active_stack_pointer()
    }

    /// Select and dispatch a task.
    ///
    /// With `None`, the head of the ready queue is rotated to the back of
    /// its priority band and dispatched. With `Some`, the target is
    /// dispatched directly and the ready queue is left alone.
    pub fn switch_task(&mut self, target: Option<TaskId>) {
        let next = match target {
            Some(id) => id,
            None => {
                if let Some(tcb) = self.current.and_then(|id| self.task(id)) {
                    tcb.check_stack();
                }
                let head = match self.ready.pop_front() {
                    Some(head) => head,
                    None => fatal(Fault::EmptyReadyQueue),
                };
                let priority = self.tcb(head).priority;
                self.ready.insert(head, priority);
                head
            }
        };
        self.dispatch(next);
    }

    fn dispatch(&mut self, id: TaskId) {
        let exit = self.exit;
        let tcb = match self.slots.get_mut(id.index()) {
            Some(Slot { generation, tcb: Some(tcb) }) if *generation == id.generation() => tcb,
            _ => fatal(Fault::StaleTask),
        };
        if tcb.running {
            tcb.check_stack();
        } else {
            tcb.top = self.port.create_context(&tcb.stack, tcb.entry, exit);
            tcb.running = true;
        }
        self.port.set_active_stack_pointer(tcb.top);
        self.current = Some(id);
    }

    /// Dispatch `id` now if it is runnable.
    pub fn task_switch(&mut self, id: TaskId) -> Result<(), NotRunnable> {
        if !self.is_runnable(id) {
            return Err(NotRunnable);
        }
        self.switch_task(Some(id));
        Ok(())
    }

    /// Record the interrupted task's stack pointer.
    pub fn save_current_context(&mut self) {
        if !self.switching {
            return;
        }
        let sp = self.port.active_stack_pointer();
        if let Some(tcb) = self.current.and_then(|id| self.task_mut(id)) {
            tcb.top = sp;
        }
    }

    // -----------------------------------------------------------------------
    // Time
    // -----------------------------------------------------------------------

    /// Advance periodic countdowns, waking tasks whose countdown expired.
    pub fn rtos_tick(&mut self) {
        let periodic = self.periodic;
        for id in periodic.iter() {
            let in_ready = self.ready.contains(id);
            let tcb = self.tcb_mut(id);
            if tcb.ticks_until_wake == 0 {
                let wake = !tcb.running && !in_ready;
                let priority = tcb.priority;
                tcb.ticks_until_wake = tcb.period - 1;
                if wake {
                    log::trace!("periodic task {} activated", tcb.pid);
                    self.ready.insert(id, priority);
                }
            } else {
                tcb.ticks_until_wake -= 1;
            }
        }
    }

    /// Timer interrupt body: count the tick and arm the deferred switch.
    pub fn on_tick(&mut self) {
        self.ticks += 1;
        if self.switching {
            self.port.arm_deferred_switch();
        }
    }

    /// Deferred switch body: save, tick periodic tasks, dispatch.
    pub fn deferred_switch(&mut self) {
        if !self.switching {
            return;
        }
        self.save_current_context();
        self.rtos_tick();
        self.switch_task(None);
    }

    // -----------------------------------------------------------------------
    // Termination and reclamation
    // -----------------------------------------------------------------------

    /// Terminate the current task, then dispatch another.
    ///
    /// A periodic task is rewound for its next activation unless `abort`
    /// is set; anything else goes to the reclaim queue.
    pub fn end_task(&mut self, abort: bool) {
        let id = self.current_or_fatal();
        let tcb = self.tcb_mut(id);
        tcb.check_stack();
        tcb.abort = abort;
        let periodic = tcb.is_periodic();
        let pid = tcb.pid;

        if periodic && !abort {
            tcb.rewind();
            self.ready.remove(id);
            log::trace!("periodic task {} done for this period", pid);
        } else {
            self.ready.remove(id);
            if periodic {
                self.periodic.remove(id);
            }
            self.reclaim.push_back(id);
            self.total_tasks -= 1;
            log::trace!("task {} ended (abort: {})", pid, abort);
        }

        self.switch_task(None);
    }

    /// Next terminated task awaiting reclamation.
    pub fn pop_reclaimable(&mut self) -> Option<TaskId> {
        self.reclaim.pop_front()
    }

    /// Any lock still recorded as held by `id`.
    pub fn held_lock(&self, id: TaskId) -> Option<&'static Lock> {
        self.task(id)?.held.first()
    }

    /// Destroy a terminated task's control block, returning its stack for
    /// the allocator. The slot's generation moves on so old handles go
    /// stale.
    pub fn free_task(&mut self, id: TaskId) -> Option<StackRegion> {
        if self.ready.contains(id) || self.periodic.contains(id) {
            return None;
        }
        self.task(id)?;
        let slot = &mut self.slots[id.index()];
        let tcb = slot.tcb.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        if self.current == Some(id) {
            self.current = None;
        }
        log::debug!("freed task {}", tcb.pid);
        Some(tcb.stack)
    }

    // -----------------------------------------------------------------------
    // Privileged entry
    // -----------------------------------------------------------------------

    /// Perform a privileged call on behalf of the current task.
    pub fn service_call(&mut self, call: ServiceCall) -> i32 {
        self.save_current_context();
        self.service_call_inline(call)
    }

    /// Perform `call` without saving the caller's context first. Used
    /// from exception handlers, where the interrupted task's registers
    /// were never pushed.
    pub fn service_call_inline(&mut self, call: ServiceCall) -> i32 {
        match call {
            ServiceCall::Yield => {
                self.switch_task(None);
                0
            }
            ServiceCall::EndTask => {
                self.end_task(false);
                0
            }
            ServiceCall::Abort => {
                self.end_task(true);
                0
            }
            ServiceCall::Acquire(lock) => self.acquire(lock) as i32,
            ServiceCall::Release(lock) => {
                self.release(lock);
                0
            }
            ServiceCall::ReleaseFor(lock, owner) => {
                self.release_for(lock, owner);
                0
            }
            ServiceCall::RegisterTask(id) => {
                self.register_task(id);
                0
            }
            ServiceCall::TaskSwitch(id) => match self.task_switch(id) {
                Ok(()) => 0,
                Err(NotRunnable) => -1,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::arch::sim::SimPort;
    use crate::config::STACK_WORDS;
    use std::vec::Vec;

    pub(crate) extern "C" fn noop() {}

    pub(crate) fn new_scheduler() -> Scheduler<SimPort> {
        Scheduler::new(SimPort::new(), noop)
    }

    /// Create and register a task on its own fake stack.
    pub(crate) fn spawn(s: &mut Scheduler<SimPort>, priority: Priority, period: u32) -> TaskId {
        let n = s.slots.iter().filter(|slot| slot.tcb.is_some()).count();
        let stack = StackRegion::new(0x2000_0000 + n * 0x1000, STACK_WORDS);
        let id = s.create_task(noop, priority, period, stack).unwrap();
        s.register_task(id);
        id
    }

    fn priorities(s: &Scheduler<SimPort>) -> Vec<Priority> {
        s.ready_queue().iter().map(|id| s.tcb(id).priority).collect()
    }

    #[test]
    fn test_ready_queue_sorted_without_duplicates() {
        let mut s = new_scheduler();
        let ids: Vec<TaskId> = [3, 7, 1, 7, 0, 5].iter().map(|p| spawn(&mut s, *p, 0)).collect();
        s.register_task(ids[2]);
        assert_eq!(priorities(&s), [7, 7, 5, 3, 1, 0]);
        assert_eq!(s.ready_queue().at(0), Some(ids[1]));
        assert_eq!(s.ready_queue().at(1), Some(ids[3]));
        assert_eq!(s.task_count(), 6);
    }

    #[test]
    fn test_round_robin_equal_priority() {
        let mut s = new_scheduler();
        let tasks = [spawn(&mut s, 2, 0), spawn(&mut s, 2, 0), spawn(&mut s, 2, 0)];
        spawn(&mut s, 0, 0);

        let mut counts = [0usize; 3];
        s.start();
        for _ in 0..30 {
            let cur = s.current_task().unwrap();
            let i = tasks.iter().position(|t| *t == cur).unwrap();
            counts[i] += 1;
            s.on_tick();
            s.deferred_switch();
        }
        for c in counts {
            assert!((9..=11).contains(&c), "unfair share: {:?}", counts);
        }
    }

    #[test]
    fn test_strict_preemption() {
        let mut s = new_scheduler();
        for _ in 0..3 {
            spawn(&mut s, 5, 0);
        }
        let high = spawn(&mut s, 8, 0);
        spawn(&mut s, 0, 0);

        s.start();
        for _ in 0..10 {
            assert_eq!(s.current_task(), Some(high));
            s.deferred_switch();
        }

        s.end_task(false);
        let next = s.current_task().unwrap();
        assert_eq!(s.tcb(next).priority, 5);
        assert!(!s.is_runnable(high));
    }

    #[test]
    fn test_start_creates_first_context() {
        let mut s = new_scheduler();
        let a = spawn(&mut s, 1, 0);
        let sp = s.start();
        assert!(s.is_started());
        assert_eq!(s.current_task(), Some(a));
        assert_eq!(sp, s.tcb(a).stack.base - 64);
        assert!(s.tcb(a).running);
        assert_eq!(s.port().contexts_created(), 1);
    }

    #[test]
    fn test_periodic_activation_on_period_boundaries() {
        let mut s = new_scheduler();
        let p = spawn(&mut s, 5, 3);
        spawn(&mut s, 0, 0);

        s.start();
        assert_eq!(s.current_task(), Some(p));
        s.service_call(ServiceCall::EndTask);
        assert!(!s.is_runnable(p));
        assert_eq!(s.tcb(p).top, s.tcb(p).stack.base);
        assert_eq!(s.task_count(), 2);

        let mut woken = Vec::new();
        for tick in 1..=9 {
            s.deferred_switch();
            if s.current_task() == Some(p) {
                woken.push(tick);
                s.service_call(ServiceCall::EndTask);
            }
        }
        assert_eq!(woken, [3, 6, 9]);
    }

    #[test]
    fn test_periodic_never_enqueued_twice() {
        let mut s = new_scheduler();
        let p = spawn(&mut s, 5, 2);
        spawn(&mut s, 0, 0);

        s.start();
        // Task keeps running across several of its periods.
        for _ in 0..7 {
            s.deferred_switch();
            assert_eq!(s.ready_queue().iter().filter(|id| *id == p).count(), 1);
            assert_eq!(s.ready_queue().len(), 2);
        }
    }

    #[test]
    fn test_end_aperiodic_goes_to_reclaim_queue() {
        let mut s = new_scheduler();
        let a = spawn(&mut s, 3, 0);
        spawn(&mut s, 0, 0);

        s.start();
        s.end_task(false);
        assert_eq!(s.task_count(), 1);
        assert_eq!(s.pop_reclaimable(), Some(a));
        assert_eq!(s.pop_reclaimable(), None);

        let stack = s.free_task(a).unwrap();
        assert_eq!(stack.size_bytes(), STACK_WORDS * 4);
        assert!(s.task(a).is_none());

        // The slot is reused under a new generation.
        let b = spawn(&mut s, 3, 0);
        assert_eq!(b.index(), a.index());
        assert_ne!(b, a);
    }

    #[test]
    fn test_generation_does_not_alias_after_many_reuses() {
        let mut s = new_scheduler();
        let first = s.create_task(noop, 1, 0, StackRegion::new(0x2000_0000, STACK_WORDS)).unwrap();
        s.free_task(first).unwrap();
        s.slots[first.index()].generation = u16::MAX as u32;

        let stale = TaskId::new(first.index(), u16::MAX as u32);
        assert!(s.create_task(noop, 1, 0, StackRegion::new(0x2000_0000, STACK_WORDS)).is_some());
        s.free_task(stale).unwrap();

        let fresh = s.create_task(noop, 1, 0, StackRegion::new(0x2000_0000, STACK_WORDS)).unwrap();
        assert_eq!(fresh.index(), first.index());
        assert_eq!(fresh.generation(), u16::MAX as u32 + 1);
        assert!(s.task(stale).is_none());
        assert!(s.task(first).is_none());
    }

    #[test]
    fn test_abort_stops_periodic_activation() {
        let mut s = new_scheduler();
        let p = spawn(&mut s, 5, 2);
        spawn(&mut s, 0, 0);

        s.start();
        s.service_call(ServiceCall::Abort);
        assert!(s.tcb(p).abort);
        assert_eq!(s.pop_reclaimable(), Some(p));
        for _ in 0..10 {
            s.deferred_switch();
            assert_ne!(s.current_task(), Some(p));
        }
        assert_eq!(s.approx_num_tasks(), 1);
    }

    #[test]
    fn test_approx_num_tasks_counts_dormant_periodic() {
        let mut s = new_scheduler();
        spawn(&mut s, 5, 10);
        spawn(&mut s, 0, 0);
        s.start();
        assert_eq!(s.approx_num_tasks(), 2);
        s.end_task(false);
        assert_eq!(s.ready_queue().len(), 1);
        assert_eq!(s.approx_num_tasks(), 2);
    }

    #[test]
    #[should_panic(expected = "no tasks to run")]
    fn test_empty_ready_queue_is_fatal() {
        let mut s = new_scheduler();
        spawn(&mut s, 1, 0);
        s.start();
        s.end_task(false);
    }

    #[test]
    #[should_panic(expected = "overflowed its stack")]
    fn test_stack_overflow_caught_at_dispatch() {
        let mut s = new_scheduler();
        let a = spawn(&mut s, 1, 0);
        spawn(&mut s, 1, 0);
        s.start();
        let limit = s.tcb(a).stack.limit;
        s.port_mut().set_active_stack_pointer(limit - 4);
        s.deferred_switch();
    }

    #[test]
    #[should_panic(expected = "overflowed its stack")]
    fn test_stack_overflow_caught_at_termination() {
        let mut s = new_scheduler();
        let a = spawn(&mut s, 1, 0);
        spawn(&mut s, 0, 0);
        s.start();
        let limit = s.tcb(a).stack.limit;
        s.port_mut().set_active_stack_pointer(limit - 4);
        s.service_call(ServiceCall::EndTask);
    }

    #[test]
    fn test_task_switch_requires_runnable_target() {
        let mut s = new_scheduler();
        let a = spawn(&mut s, 4, 0);
        let b = spawn(&mut s, 2, 0);
        let p = spawn(&mut s, 1, 5);
        spawn(&mut s, 0, 0);
        s.start();
        assert_eq!(s.current_task(), Some(a));

        assert_eq!(s.task_switch(b), Ok(()));
        assert_eq!(s.current_task(), Some(b));
        // Direct switches leave the queue order alone.
        assert_eq!(s.ready_queue().at(0), Some(a));

        s.end_task(false);
        assert_eq!(s.service_call(ServiceCall::TaskSwitch(b)), -1);
        assert_eq!(s.service_call(ServiceCall::TaskSwitch(p)), 0);
        assert_eq!(s.current_task(), Some(p));
    }

    #[test]
    fn test_yield_rotates_equal_priorities() {
        let mut s = new_scheduler();
        let a = spawn(&mut s, 3, 0);
        let b = spawn(&mut s, 3, 0);
        spawn(&mut s, 0, 0);
        s.start();
        assert_eq!(s.current_task(), Some(a));
        s.service_call(ServiceCall::Yield);
        assert_eq!(s.current_task(), Some(b));
        s.service_call(ServiceCall::Yield);
        assert_eq!(s.current_task(), Some(a));
    }

    #[test]
    fn test_context_saved_and_restored() {
        let mut s = new_scheduler();
        let a = spawn(&mut s, 3, 0);
        let b = spawn(&mut s, 3, 0);
        spawn(&mut s, 0, 0);
        s.start();

        let a_sp = s.tcb(a).stack.base - 200;
        s.port_mut().set_active_stack_pointer(a_sp);
        s.deferred_switch();
        assert_eq!(s.current_task(), Some(b));
        assert_eq!(s.tcb(a).top, a_sp);

        s.deferred_switch();
        assert_eq!(s.current_task(), Some(a));
        assert_eq!(s.port().active_stack_pointer(), a_sp);
        assert_eq!(s.port().contexts_created(), 2);
    }

    #[test]
    fn test_on_tick_arms_switch_only_after_start() {
        let mut s = new_scheduler();
        spawn(&mut s, 0, 0);
        s.on_tick();
        assert!(!s.port().switch_pending());
        s.start();
        s.on_tick();
        assert!(s.port_mut().take_pending());
        assert_eq!(s.ticks(), 2);
    }

    #[test]
    fn test_compare_missing_task_loses() {
        let mut s = new_scheduler();
        let low = spawn(&mut s, 1, 0);
        let high = spawn(&mut s, 6, 0);
        assert_eq!(s.compare(Some(high), Some(low)), Ordering::Greater);
        assert_eq!(s.compare(None, Some(low)), Ordering::Less);
        assert_eq!(s.compare(Some(low), None), Ordering::Greater);
        assert_eq!(s.compare(None, None), Ordering::Equal);
    }

    #[test]
    fn test_period_to_ticks_rounds_up() {
        assert_eq!(period_to_ticks(0), 0);
        assert_eq!(period_to_ticks(1), 1);
        assert_eq!(period_to_ticks(1_000), 1);
        assert_eq!(period_to_ticks(1_001), 2);
        assert_eq!(period_to_ticks(4_000), 4);
    }

    #[test]
    fn test_free_task_refuses_live_task() {
        let mut s = new_scheduler();
        let a = spawn(&mut s, 1, 0);
        assert!(s.free_task(a).is_none());
        assert!(s.task(a).is_some());
    }
}
