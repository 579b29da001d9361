//! Display processor (RDP).

use crate::system::{System, mi::RcpInterrupt};
use bitos::bitos;

#[bitos(32)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Status {
    #[bits(0)]
    pub xbus_dma: bool,
    #[bits(1)]
    pub freeze: bool,
    #[bits(2)]
    pub flush: bool,
    #[bits(6)]
    pub pipe_busy: bool,
}

#[derive(Default)]
pub struct Interface {
    pub status: Status,
}

impl System {
    /// Handles the display processor finishing a full sync.
    pub fn rdp_interrupt(&mut self) {
        self.rdp.status.set_pipe_busy(false);
        self.signal_rcp_interrupt(RcpInterrupt::DisplayProcessor);
    }
}
