//! Video interface (VI).

use crate::system::{Event, System, mi::RcpInterrupt};

/// Cycles until the first vertical retrace after a reset.
pub const STARTUP_DELAY: u32 = 5000;

#[derive(Debug)]
pub struct Interface {
    /// Cycles between two vertical retraces.
    pub delay: u32,
    /// Absolute cycle count of the next retrace.
    pub next_vi: u32,
    /// Retraces since the last reset.
    pub counter: u32,
    /// Current field of an interlaced frame.
    pub field: bool,
}

impl Default for Interface {
    fn default() -> Self {
        Self {
            delay: STARTUP_DELAY,
            next_vi: STARTUP_DELAY,
            counter: 0,
            field: false,
        }
    }
}

impl System {
    /// Handles a vertical retrace: schedules the next one and signals the
    /// video interrupt line.
    pub fn vertical_retrace(&mut self) {
        self.video.field = !self.video.field;
        self.video.counter = self.video.counter.wrapping_add(1);

        self.video.next_vi = self.video.next_vi.wrapping_add(self.video.delay);
        self.schedule_absolute(Event::VerticalRetrace, self.video.next_vi);

        if let Some(callback) = &mut self.config.vsync_callback {
            callback();
        }

        self.signal_rcp_interrupt(RcpInterrupt::Video);
    }
}
