//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor.
//! Implements context switching via SVCall and PendSV, SysTick timer
//! configuration, and interrupt priority setup.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): used by the kernel and interrupt handlers
//! - **PSP** (Process Stack Pointer): used by tasks in Thread mode
//!
//! On exception entry, the hardware stacks R0-R3, R12, LR, PC and xPSR
//! onto the process stack. SVCall and PendSV push R4-R11 below that, then
//! publish the result as PSP, so the scheduler sees one complete frame per
//! task:
//!
//! ```text
//! top + 0x00  r4 .. r11     (software saved)
//! top + 0x20  r0 r1 r2 r3   (hardware saved)
//! top + 0x30  r12 lr pc xpsr
//! ```
//!
//! After the kernel has run, the handlers pop R4-R11 from whatever PSP the
//! scheduler selected and return to Thread mode on the process stack.
//!
//! ## Interrupt Priorities
//!
//! - SVCall: priority 0 (highest), so a trap is taken immediately
//! - SysTick, PendSV: priority 0xFF (lowest); the deferred switch only
//!   runs when no other handler is active

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};
use cortex_m::register::psp;

use super::{Port, StackAddr};
use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::kernel::KERNEL;
use crate::stack::StackRegion;
use crate::svc::ServiceCall;
use crate::task::TaskEntry;

/// Initial xPSR: only the Thumb bit set.
const INITIAL_XPSR: u32 = 0x0100_0000;

/// Words in an initial context frame.
const FRAME_WORDS: usize = 16;

/// The Armv7-M port. Stateless: all state lives in core registers.
pub struct CortexM4;

impl CortexM4 {
    pub const fn new() -> Self {
        CortexM4
    }
}

impl Port for CortexM4 {
    fn create_context(&mut self, stack: &StackRegion, entry: TaskEntry, exit: TaskEntry) -> StackAddr {
        let top = stack.base - FRAME_WORDS * core::mem::size_of::<u32>();
        let frame = top as *mut u32;
        // SAFETY: the frame lies inside the task's own stack, which no one
        // else is using while it has no context.
        unsafe {
            for i in 0..8 {
                frame.add(i).write_volatile(0); // r4-r11
            }
            for i in 8..13 {
                frame.add(i).write_volatile(0); // r0-r3, r12
            }
            frame.add(13).write_volatile(exit as usize as u32); // lr
            frame.add(14).write_volatile(entry as usize as u32 & !1); // pc
            frame.add(15).write_volatile(INITIAL_XPSR);
        }
        top
    }

    fn active_stack_pointer(&self) -> StackAddr {
        psp::read() as StackAddr
    }

    fn set_active_stack_pointer(&mut self, sp: StackAddr) {
        // SAFETY: only called from handler mode, PSP is not in use there.
        unsafe { psp::write(sp as u32) }
    }

    fn arm_deferred_switch(&mut self) {
        SCB::set_pendsv();
    }

    fn in_interrupt(&self) -> bool {
        super::in_interrupt()
    }

    fn trap(call: ServiceCall) -> Option<i32> {
        // SVC from handler mode escalates to HardFault.
        if super::in_interrupt() {
            return None;
        }
        let (number, [a0, a1, a2]) = call.encode();
        let ret: u32;
        // SAFETY: the SVCall handler preserves every register except r0,
        // which carries the result back.
        unsafe {
            asm!(
                "svc 0",
                inout("r0") number => ret,
                in("r1") a0,
                in("r2") a1,
                in("r3") a2,
            );
        }
        Some(ret as i32)
    }
}

// ---------------------------------------------------------------------------
// SysTick and priority configuration
// ---------------------------------------------------------------------------

/// Configure SysTick to fire at `TICK_HZ` from the core clock.
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Put PendSV and SysTick at the lowest priority. SVCall stays at 0.
pub fn set_interrupt_priorities(scb: &mut SCB) {
    // SAFETY: changing system handler priorities before the scheduler
    // starts cannot break a priority-based critical section.
    unsafe {
        scb.set_priority(SystemHandler::PendSV, 0xFF);
        scb.set_priority(SystemHandler::SysTick, 0xFF);
        scb.set_priority(SystemHandler::SVCall, 0x00);
    }
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Switch Thread mode onto the process stack at `top` and jump into the
/// task whose initial frame sits there. Never returns.
///
/// # Safety
/// Must be called once, from Thread mode on the main stack, with `top`
/// produced by `create_context` for the task the scheduler selected.
pub unsafe fn start_first_task(top: StackAddr) -> ! {
    asm!(
        // Skip the software-saved R4-R11 words
        "adds r0, #32",
        "msr psp, r0",

        // CONTROL.SPSEL = 1: Thread mode uses PSP
        "movs r0, #2",
        "msr control, r0",
        "isb",

        // Unstack the hardware frame by hand
        "pop {{r0-r3, r12}}",
        "pop {{r4}}",
        "pop {{r5}}",
        "pop {{r6}}",

        "mov lr, r4",
        "orr r5, r5, #1",
        "cpsie i",
        "bx r5",

        in("r0") top,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// Exception handlers
// ---------------------------------------------------------------------------

/// SVCall handler: privileged entry for [`ServiceCall`]s.
///
/// Saves R4-R11 of the caller, runs the call (which may select another
/// task), then restores R4-R11 of whichever task is now current.
#[unsafe(no_mangle)]
#[unsafe(naked)]
unsafe extern "C" fn SVCall() {
    naked_asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "msr psp, r0",

        "bl {entry}",

        "mrs r0, psp",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",

        // EXC_RETURN: Thread mode, process stack
        "mov lr, #0xFFFFFFFD",
        "bx lr",
        entry = sym svc_entry,
    );
}

/// Decode the caller's registers from its stacked frame, perform the
/// call and write the result into the caller's stacked r0.
unsafe extern "C" fn svc_entry(top: *mut u32) {
    let frame = top.add(8);
    let number = frame.read_volatile();
    let args = [
        frame.add(1).read_volatile() as usize,
        frame.add(2).read_volatile() as usize,
        frame.add(3).read_volatile() as usize,
    ];
    let call = ServiceCall::decode(number, args);
    let ret = KERNEL.service_call(call);
    frame.write_volatile(ret as u32);
}

/// PendSV handler: the deferred context switch armed by SysTick.
#[unsafe(no_mangle)]
#[unsafe(naked)]
unsafe extern "C" fn PendSV() {
    naked_asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "msr psp, r0",

        "bl {entry}",

        "mrs r0, psp",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",

        "mov lr, #0xFFFFFFFD",
        "bx lr",
        entry = sym pendsv_entry,
    );
}

extern "C" fn pendsv_entry() {
    KERNEL.deferred_switch();
}

/// SysTick handler: advance time and arm the deferred switch.
#[unsafe(no_mangle)]
extern "C" fn SysTick() {
    KERNEL.systick();
}
