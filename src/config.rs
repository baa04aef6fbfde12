//! # RmOS Configuration
//!
//! Compile-time constants governing the scheduler and system behavior.
//! All limits are fixed at compile time; nothing is allocated dynamically.

/// Maximum number of tasks the system can manage simultaneously,
/// including the two built-in tasks (reclaimer and idle). This bounds
/// the task arena and every task list.
pub const MAX_TASKS: usize = 16;

/// Per-task stack size in 32-bit words. Must be large enough for the
/// deepest call chain plus the initial context frame (16 words).
pub const STACK_WORDS: usize = 256;

/// Maximum number of locks a single task may hold at the same time.
/// Exceeding it is fatal.
pub const HELD_LOCKS_MAX: usize = 4;

/// SysTick frequency in Hz. One tick is the scheduling quantum.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Priority of the reclaimer task. It must sit above ordinary
/// application tasks, or a task spinning on a lock abandoned by a dead
/// holder would keep the reclaimer from ever freeing it.
pub const RECLAIMER_PRIORITY: u8 = 10;

/// Reclaimer period in microseconds.
pub const RECLAIMER_PERIOD_US: u32 = 4_000;

/// Priority of the always-ready idle task. Nothing may sit below it.
pub const IDLE_PRIORITY: u8 = 0;
