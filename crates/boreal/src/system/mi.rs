//! RCP interrupt controller (MI).

use crate::system::{Event, System};
use bitos::{
    bitos,
    integer::{u5, u6},
};
use vr4300::cp0::Interrupt;

/// An interrupt source line of the RCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RcpInterrupt {
    SignalProcessor,
    Serial,
    Audio,
    Video,
    Parallel,
    DisplayProcessor,
}

#[bitos(6)]
#[derive(Default, Debug, Clone, Copy)]
pub struct Sources {
    #[bits(0)]
    pub signal_processor: bool,
    #[bits(1)]
    pub serial: bool,
    #[bits(2)]
    pub audio: bool,
    #[bits(3)]
    pub video: bool,
    #[bits(4)]
    pub parallel: bool,
    #[bits(5)]
    pub display_processor: bool,
}

#[bitos(32)]
#[derive(Default, Debug, Clone, Copy)]
pub struct InterruptCause {
    #[bits(0..6)]
    pub sources: Sources,
}

#[bitos(32)]
#[derive(Default, Debug, Clone, Copy)]
pub struct InterruptMask {
    #[bits(0..6)]
    pub sources: Sources,
}

#[derive(Default)]
pub struct Interface {
    pub cause: InterruptCause,
    pub mask: InterruptMask,
}

impl Interface {
    /// Pending sources which are not masked off.
    pub fn allowed(&self) -> Sources {
        Sources::from_bits(self.cause.sources().to_bits() & self.mask.sources().to_bits())
    }

    pub fn raise(&mut self, int: RcpInterrupt) {
        let sources = self.cause.sources().to_bits().value() | (1 << int as usize);
        self.cause.set_sources(Sources::from_bits(u6::new(sources)));
    }

    pub fn lower(&mut self, int: RcpInterrupt) {
        let sources = self.cause.sources().to_bits().value() & !(1 << int as usize);
        self.cause.set_sources(Sources::from_bits(u6::new(sources)));
    }
}

impl System {
    /// Recomputes the RCP line of the CP0 cause register from the controller
    /// state and, if an interrupt just became eligible, queues its delivery
    /// at the next checkpoint.
    pub fn check_interrupts(&mut self) {
        if self.mi.allowed().to_bits().value() != 0 {
            let pending = self.cpu.cp0.cause.interrupt_pending() | Interrupt::Rcp.mask();
            self.cpu.cp0.cause.set_interrupt_pending(pending);
            self.cpu.cp0.cause.set_exception_code(u5::new(0));
        } else {
            let pending = self.cpu.cp0.cause.interrupt_pending() & !Interrupt::Rcp.mask();
            self.cpu.cp0.cause.set_interrupt_pending(pending);
        }

        if !self.cpu.interrupts_enabled() {
            return;
        }

        if self.cpu.cp0.status.interrupt_mask() & self.cpu.cp0.cause.interrupt_pending() != 0 {
            self.scheduler.push_front(Event::Check, self.cpu.cp0.count);
        }
    }

    /// Signals an RCP interrupt line and checks whether it can be delivered.
    pub fn signal_rcp_interrupt(&mut self, int: RcpInterrupt) {
        self.mi.raise(int);
        self.check_interrupts();
    }

    /// Clears an RCP interrupt line.
    pub fn clear_rcp_interrupt(&mut self, int: RcpInterrupt) {
        self.mi.lower(int);
        self.check_interrupts();
    }
}
