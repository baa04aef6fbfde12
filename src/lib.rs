//! # RmOS: Rate-Monotonic Operating System
//!
//! A priority-preemptive Real-Time Operating System (RTOS) scheduler core
//! for single-core ARM Cortex-M microcontrollers, with periodic task
//! re-activation and mutex/semaphore locks.
//!
//! ## Overview
//!
//! - The highest-priority ready task always runs; equal priorities share
//!   the processor round robin with a one-tick quantum.
//! - A task created with a period is re-activated every period, reusing
//!   its control block and stack. Aperiodic tasks run once.
//! - Locks have a single owner and remember one (the most important)
//!   waiter. Release hands the processor directly to that waiter.
//! - A two-party deadlock, a stack overflow, or any other broken kernel
//!   invariant halts the system.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                   │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                 │
//! │  start() · spawn() · end_task() · acquire() · release()│
//! ├──────────────────┬────────────────────┬────────────────┤
//! │  Service calls   │  Scheduler         │  Locks         │
//! │  svc.rs          │  scheduler.rs      │  mutex.rs      │
//! │  ─ encode/decode │  ─ switch_task()   │  ─ acquire()   │
//! │                  │  ─ rtos_tick()     │  ─ release()   │
//! │                  │  ─ end_task()      │  ─ deadlock    │
//! ├──────────────────┴────────────────────┴────────────────┤
//! │  Tasks (task.rs) · Task lists (list.rs) · Stacks       │
//! │  TaskId · TCB · held locks · ready/periodic/reclaim    │
//! ├────────────────────────────────────────────────────────┤
//! │         Port (arch/mod.rs): sim.rs | cortex_m4.rs      │
//! │    SVCall · PendSV · SysTick · Context frames          │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)               │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Control flow
//!
//! SysTick counts the tick and pends PendSV. PendSV saves the running
//! task, advances periodic countdowns (waking tasks whose countdown
//! expired) and dispatches the head of the ready queue. Tasks reach the
//! scheduler through `SVC` for yield, termination and lock operations.
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically allocated
//! - **Fixed task arena**: `MAX_TASKS` slots addressed by generational ids
//! - **Stack pool**: `MAX_TASKS` stacks of `STACK_WORDS` words
//! - **Critical sections**: `critical-section`, backed by `cortex-m`
//!
//! On the host, the crate builds against a simulation port so the
//! scheduler and locks are unit tested with plain `cargo test`.

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod config;
pub mod fault;
pub mod kernel;
pub mod list;
pub mod mutex;
pub mod scheduler;
pub mod stack;
pub mod svc;
pub mod sync;
pub mod task;
