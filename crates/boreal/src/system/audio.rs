//! Audio interface (AI).

use crate::system::{System, mi::RcpInterrupt};
use bitos::bitos;

#[bitos(32)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Status {
    #[bits(30)]
    pub dma_busy: bool,
    #[bits(31)]
    pub dma_full: bool,
}

#[derive(Default)]
pub struct Interface {
    pub status: Status,
}

impl System {
    /// Handles completion of an audio DMA transfer.
    pub fn audio_dma_finished(&mut self) {
        self.audio.status.set_dma_full(false);
        self.audio.status.set_dma_busy(false);
        self.signal_rcp_interrupt(RcpInterrupt::Audio);
    }
}
