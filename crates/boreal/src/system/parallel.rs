//! Parallel interface (PI).

use crate::system::{System, mi::RcpInterrupt};
use bitos::bitos;

#[bitos(32)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Status {
    #[bits(0)]
    pub dma_busy: bool,
    #[bits(1)]
    pub io_busy: bool,
    #[bits(2)]
    pub dma_error: bool,
}

#[derive(Default)]
pub struct Interface {
    pub status: Status,
}

impl System {
    /// Handles completion of a parallel DMA transfer.
    pub fn parallel_dma_finished(&mut self) {
        self.parallel.status.set_dma_busy(false);
        self.parallel.status.set_io_busy(false);
        self.signal_rcp_interrupt(RcpInterrupt::Parallel);
    }
}
