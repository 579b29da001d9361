//! Serial interface (SI).

use crate::system::{System, mi::RcpInterrupt};
use bitos::bitos;

#[bitos(32)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Status {
    #[bits(0)]
    pub dma_busy: bool,
    #[bits(1)]
    pub io_busy: bool,
    #[bits(3)]
    pub dma_error: bool,
    #[bits(12)]
    pub interrupt: bool,
}

#[derive(Default)]
pub struct Interface {
    pub status: Status,
}

impl System {
    /// Handles completion of a serial DMA transfer.
    pub fn serial_dma_finished(&mut self) {
        self.serial.status.set_dma_busy(false);
        self.serial.status.set_interrupt(true);
        self.signal_rcp_interrupt(RcpInterrupt::Serial);
    }
}
