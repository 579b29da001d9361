//! Exception entry.

use crate::{Address, Cpu, cp0::Interrupt};
use bitos::integer::u5;

/// Vector through which general exceptions and interrupts are delivered.
pub const GENERAL_VECTOR: Address = Address(0x8000_0180);

/// Address execution restarts from after a reset, once the boot ROM has run.
pub const RESET_VECTOR: Address = Address(0xA400_0040);

impl Cpu {
    /// Whether the enable triple holds: interrupts enabled, exception level
    /// clear, error level clear.
    #[inline(always)]
    pub fn interrupts_enabled(&self) -> bool {
        self.cp0.status.interrupt_enable()
            && !self.cp0.status.exception_level()
            && !self.cp0.status.error_level()
    }

    /// Redirects execution to the general exception vector.
    ///
    /// Saves the current program address into EPC, adjusted by one
    /// instruction if execution sits in a branch delay slot, and records the
    /// delay slot state in the cause register.
    pub fn exception_general(&mut self) {
        self.cp0.status.set_exception_level(true);
        self.cp0.epc = self.pc;

        if self.delay_slot {
            self.cp0.epc -= 4;
            self.cp0.cause.set_branch_delay(true);
        } else {
            self.cp0.cause.set_branch_delay(false);
        }

        self.pc = GENERAL_VECTOR;
        self.last_addr = self.pc;
    }

    /// Marks `int` as pending and, if the status/cause gates allow delivery,
    /// takes a general exception.
    ///
    /// Safe to call whenever hardware state changes: it does nothing beyond
    /// updating the pending bits if the gates fail.
    pub fn raise_maskable_interrupt(&mut self, int: Interrupt) {
        let pending = self.cp0.cause.interrupt_pending() | int.mask();
        self.cp0.cause.set_interrupt_pending(pending);
        self.cp0.cause.set_exception_code(u5::new(0));

        if self.cp0.status.interrupt_mask() & self.cp0.cause.interrupt_pending() == 0 {
            return;
        }

        if !self.interrupts_enabled() {
            return;
        }

        self.exception_general();
    }
}
