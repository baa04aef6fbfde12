//! # RmOS Example Firmware
//!
//! Demonstrates periodic and aperiodic tasks sharing a lock:
//!
//! | Task | Type | Priority | Period | Behavior |
//! |------|------|----------|--------|----------|
//! | `sampler_task` | Periodic | 5 | 10 ms | Reads a "sensor", publishes it under the lock |
//! | `logger_task` | Periodic | 3 | 100 ms | Takes the lock, folds samples into a running sum |
//! | `calibration_task` | Aperiodic | 4 | - | Runs once at boot, seeds the shared state, ends |
//! | `background_task` | Aperiodic | 1 | - | Busy loop, time-sliced by the tick |
//!
//! ## Expected behavior
//!
//! 1. `calibration_task` runs first among application tasks, holds the
//!    lock for a while, then ends; the reclaimer frees its stack.
//! 2. Every 10 ms `sampler_task` preempts everything below it. If the
//!    logger holds the lock, the sampler blocks and the logger is run
//!    directly so it can finish; its release hands the lock straight back.
//! 3. `background_task` soaks up the remaining time and never starves
//!    the others, since every tick re-runs the dispatcher.

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use panic_halt as _;

use rmos::kernel;
use rmos::mutex::Mutex;

#[derive(Clone, Copy)]
struct Shared {
    latest: u32,
    sum: u32,
    samples: u32,
}

static SHARED: Mutex<Shared> = Mutex::new(Shared { latest: 0, sum: 0, samples: 0 });

// ---------------------------------------------------------------------------
// Task entry points
// ---------------------------------------------------------------------------

/// **Sampler** (periodic, priority 5)
///
/// One activation per period: take a sample, publish it, return. Returning
/// ends this activation; the task is re-activated on the next period.
extern "C" fn sampler_task() {
    let mut reading: u32 = 0;
    for i in 0..200 {
        reading = reading.wrapping_mul(31).wrapping_add(i);
    }
    SHARED.perform(|s| {
        s.latest = reading;
        s.samples = s.samples.wrapping_add(1);
    });
}

/// **Logger** (periodic, priority 3)
///
/// Holds the lock across a longer computation, so the sampler regularly
/// finds it taken.
extern "C" fn logger_task() {
    let mut shared = SHARED.lock();
    let mut acc = shared.sum;
    for _ in 0..5_000 {
        acc = acc.wrapping_add(shared.latest);
    }
    shared.sum = acc;
}

/// **Calibration** (aperiodic, priority 4)
///
/// Seeds the shared state once, then ends for good.
extern "C" fn calibration_task() {
    SHARED.perform(|s| {
        let mut offset: u32 = 0;
        for i in 0..10_000 {
            offset ^= i;
        }
        s.sum = offset;
    });
}

/// **Background** (aperiodic, priority 1)
///
/// Never returns. Yields now and then, but relies on the tick to preempt it.
extern "C" fn background_task() {
    let mut counter: u32 = 0;
    loop {
        counter = counter.wrapping_add(1);
        if counter % 1_000_000 == 0 {
            kernel::yield_task();
        }
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();

    kernel::start(cp, || {
        kernel::spawn(sampler_task, 5, 10_000);
        kernel::spawn(logger_task, 3, 100_000);
        kernel::spawn(calibration_task, 4, 0);
        kernel::spawn(background_task, 1, 0);
    })
}
