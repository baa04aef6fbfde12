//! # Synchronization Primitives
//!
//! Interrupt-safe critical section abstraction. All shared kernel state
//! is accessed within a critical section so that list manipulation is
//! never observed half-done by the tick handler.
//!
//! On Cortex-M the implementation comes from `cortex-m`'s
//! `critical-section-single-core` feature (PRIMASK save/restore). Host
//! test builds link the `std` implementation of `critical-section`.

pub use critical_section::CriticalSection;

/// Execute a closure within a critical section (interrupts disabled).
///
/// Nested calls are fine; the outermost one restores the interrupt state.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|cs| {
///     // Access shared state safely
/// });
/// ```
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}
