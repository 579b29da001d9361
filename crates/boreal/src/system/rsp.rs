//! Signal processor (RSP).

use crate::system::{System, mi::RcpInterrupt};
use bitos::bitos;

#[bitos(32)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Status {
    #[bits(0)]
    pub halted: bool,
    #[bits(1)]
    pub broke: bool,
    #[bits(6)]
    pub interrupt_on_break: bool,
}

#[derive(Default)]
pub struct Interface {
    pub status: Status,
}

impl System {
    /// Handles the signal processor breaking out of its task.
    pub fn rsp_interrupt(&mut self) {
        self.rsp.status.set_halted(true);
        self.rsp.status.set_broke(true);
        self.signal_rcp_interrupt(RcpInterrupt::SignalProcessor);
    }
}
