pub mod cp0;
pub mod exception;

/// A memory address. This is a thin wrapper around a [`u32`].
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Address(pub u32);

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "0x{:04X}_{:04X}",
            (self.0 & 0xFFFF_0000) >> 16,
            self.0 & 0xFFFF
        )
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl Address {
    /// Returns the value of this address. Equivalent to `self.0`.
    #[inline(always)]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl std::ops::Add<u32> for Address {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0.wrapping_add(rhs))
    }
}

impl std::ops::AddAssign<u32> for Address {
    fn add_assign(&mut self, rhs: u32) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub<u32> for Address {
    type Output = Self;

    fn sub(self, rhs: u32) -> Self::Output {
        Self(self.0.wrapping_sub(rhs))
    }
}

impl std::ops::SubAssign<u32> for Address {
    fn sub_assign(&mut self, rhs: u32) {
        *self = *self - rhs;
    }
}

/// Execution state of the VR4300 core, as seen by the interrupt machinery.
///
/// The general purpose register file and the memory pipeline belong to the
/// driving core and are not represented here.
#[derive(Debug, Clone, PartialEq)]
pub struct Cpu {
    /// Program Counter
    pub pc: Address,
    /// Target of the last taken jump.
    pub last_addr: Address,
    /// Whether the current instruction sits in a branch delay slot.
    pub delay_slot: bool,
    /// Deferred jump target, set by operations that cannot safely redirect
    /// execution mid-dispatch. Consumed by the dispatch loop.
    pub skip_jump: Option<Address>,
    /// Set while executing an instruction group that must not be re-entered
    /// by snapshot or reset handling.
    pub interrupt_unsafe: bool,
    /// System control coprocessor registers.
    pub cp0: cp0::Registers,
}

impl Default for Cpu {
    fn default() -> Self {
        Self {
            pc: exception::RESET_VECTOR,
            last_addr: exception::RESET_VECTOR,
            delay_slot: false,
            skip_jump: None,
            interrupt_unsafe: false,
            cp0: cp0::Registers::default(),
        }
    }
}
