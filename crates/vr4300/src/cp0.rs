//! The system control coprocessor (CP0).

use crate::Address;
use bitos::{bitos, integer::u5};

/// The status register (SR) gates interrupt delivery and records the
/// processor's privilege and reset state.
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Status {
    /// Whether maskable interrupts are enabled at all.
    #[bits(0)]
    pub interrupt_enable: bool,
    /// Set while handling a general exception.
    #[bits(1)]
    pub exception_level: bool,
    /// Set while handling a reset, soft reset or NMI.
    #[bits(2)]
    pub error_level: bool,
    /// Per-line interrupt mask. A pending line only causes an interrupt if
    /// its mask bit is set.
    #[bits(8..16)]
    pub interrupt_mask: u8,
    /// Whether a non-maskable interrupt has occurred.
    #[bits(19)]
    pub nmi: bool,
    /// Whether a soft reset or NMI has occurred.
    #[bits(20)]
    pub soft_reset: bool,
    /// TLB shutdown.
    #[bits(21)]
    pub tlb_shutdown: bool,
    /// Whether exception vectors are at their bootstrap locations.
    #[bits(22)]
    pub boot_exception_vectors: bool,
}

/// The cause register describes the most recent exception.
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Cause {
    /// What kind of exception occurred. Zero for interrupts.
    #[bits(2..7)]
    pub exception_code: u5,
    /// Per-line interrupt pending bits.
    #[bits(8..16)]
    pub interrupt_pending: u8,
    /// Whether the exception was taken in a branch delay slot.
    #[bits(31)]
    pub branch_delay: bool,
}

/// An interrupt line of the [`Cause`] register IP field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Interrupt {
    Software0 = 0,
    Software1 = 1,
    /// External interrupt driven by the RCP interrupt controller.
    Rcp = 2,
    Cartridge = 3,
    /// Raised by the reset button before the NMI fires.
    PreNmi = 4,
    /// Raised when the cycle counter reaches the compare register.
    Timer = 7,
}

impl Interrupt {
    /// Mask of this line in the IP/IM fields.
    #[inline(always)]
    pub fn mask(self) -> u8 {
        1 << self as u8
    }
}

/// The CP0 registers involved in interrupt delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Registers {
    /// Cycle counter, incremented as instructions retire.
    pub count: u32,
    /// Cycle count at which the timer interrupt fires.
    pub compare: u32,
    /// Status Register
    pub status: Status,
    /// Cause Register
    pub cause: Cause,
    /// Exception Program Counter
    pub epc: Address,
    /// Error Exception Program Counter
    pub error_epc: Address,
    /// Cycles charged to the counter per retired instruction.
    pub count_per_op: u32,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            count: 0,
            compare: 0,
            status: Status::from_bits(0x3400_0000),
            cause: Cause::from_bits(0),
            epc: Address(0),
            error_epc: Address(0),
            count_per_op: 2,
        }
    }
}
