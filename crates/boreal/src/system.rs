//! State of the emulator core.

pub mod audio;
pub mod mi;
pub mod parallel;
pub mod rdp;
pub mod rsp;
pub mod scheduler;
pub mod serial;
pub mod video;

use crate::system::scheduler::{RECENT_PAST, Scheduler};
use bitos::integer::u5;
use strum::{FromRepr, VariantArray};
use vr4300::{
    Cpu,
    cp0::{Cause, Interrupt},
};

pub type Callback = Box<dyn FnMut() + Send + Sync + 'static>;

/// An event which can be scheduled to fire at a specific cycle count.
///
/// Discriminants are the identifiers used by the serialized queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromRepr, VariantArray)]
#[repr(u32)]
pub enum Event {
    /// Vertical retrace of the video interface.
    VerticalRetrace = 0x001,
    /// The cycle counter has reached the compare register.
    Compare = 0x002,
    /// Deliver an already-pending interrupt at the next checkpoint.
    Check = 0x004,
    /// Serial interface DMA has finished.
    SerialDma = 0x008,
    /// Parallel interface DMA has finished.
    ParallelDma = 0x010,
    /// Marker which re-synchronizes event ordering as the cycle counter
    /// approaches overflow.
    #[default]
    CountWrap = 0x020,
    /// Audio interface DMA has finished.
    AudioDma = 0x040,
    /// The signal processor has finished its task.
    SignalProcessor = 0x080,
    /// The display processor has finished rendering.
    DisplayProcessor = 0x100,
    /// The reset button has been pushed.
    ResetButton = 0x200,
    /// Non-maskable interrupt. A full soft reset follows.
    Nmi = 0x400,
}

/// How the driving core executes instructions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Pure interpretation. No compiled blocks exist.
    #[default]
    Interpreter,
    /// Execution through a cache of compiled blocks.
    Cached,
}

/// System configuration.
#[derive(Default)]
pub struct Config {
    pub mode: ExecMode,
    /// Invoked on every vertical retrace.
    pub vsync_callback: Option<Callback>,
}

/// Externally requested jobs, observed by the dispatch loop at checkpoints.
#[derive(Debug, Default, Clone, Copy)]
pub struct Requests {
    /// Halt emulation.
    pub stop: bool,
    /// Perform a power-on reset.
    pub hard_reset: bool,
}

/// System state.
pub struct System {
    /// System configuration.
    pub config: Config,
    /// Scheduler for timed interrupt events.
    pub scheduler: Scheduler,
    /// The CPU state.
    pub cpu: Cpu,
    /// The RCP interrupt controller.
    pub mi: mi::Interface,
    /// The video interface.
    pub video: video::Interface,
    /// The audio interface.
    pub audio: audio::Interface,
    /// The serial interface.
    pub serial: serial::Interface,
    /// The parallel interface.
    pub parallel: parallel::Interface,
    /// The signal processor.
    pub rsp: rsp::Interface,
    /// The display processor.
    pub rdp: rdp::Interface,
    /// Pending external requests.
    pub requests: Requests,
}

impl System {
    pub fn new(config: Config) -> Self {
        let mut system = System {
            config,
            scheduler: Scheduler::new(),
            cpu: Cpu::default(),
            mi: mi::Interface::default(),
            video: video::Interface::default(),
            audio: audio::Interface::default(),
            serial: serial::Interface::default(),
            parallel: parallel::Interface::default(),
            rsp: rsp::Interface::default(),
            rdp: rdp::Interface::default(),
            requests: Requests::default(),
        };

        system.init_events();
        system
    }

    /// Reseeds the queue with its startup composition: the wraparound marker
    /// at trigger 0 and the first vertical retrace after the startup delay.
    pub fn init_events(&mut self) {
        self.scheduler.set_special_done(true);
        self.video.delay = video::STARTUP_DELAY;
        self.video.next_vi = video::STARTUP_DELAY;

        self.scheduler.clear();
        let count = self.cpu.cp0.count;
        self.scheduler.insert(Event::CountWrap, 0, count);
        self.scheduler
            .insert(Event::VerticalRetrace, self.video.next_vi, count);
    }

    /// Schedules an event `delay` cycles from now.
    pub fn schedule(&mut self, event: Event, delay: u32) {
        let count = self.cpu.cp0.count;
        self.scheduler.insert(event, count.wrapping_add(delay), count);
    }

    /// Schedules an event at an absolute cycle count.
    pub fn schedule_absolute(&mut self, event: Event, trigger: u32) {
        self.scheduler.insert(event, trigger, self.cpu.cp0.count);
    }

    /// Removes the pending event of the given type, if any.
    pub fn unschedule(&mut self, event: Event) {
        self.scheduler.remove(event);
    }

    /// Pops the event at the head of the queue.
    pub fn pop_event(&mut self) {
        self.scheduler.remove_next(self.cpu.cp0.count);
    }

    /// Shifts every pending trigger so that timing relative to the counter is
    /// preserved when the counter itself is redefined to `base`.
    ///
    /// The timer compare and wraparound marker events are not shifted: they
    /// are rescheduled relative to the new origin instead.
    pub fn rebase_events(&mut self, base: u32) {
        self.scheduler.remove(Event::Compare);
        self.scheduler.remove(Event::CountWrap);
        self.scheduler.shift(self.cpu.cp0.count, base);
        self.schedule_absolute(Event::Compare, self.cpu.cp0.compare);
        self.schedule_absolute(Event::CountWrap, 0);
    }

    /// Requests a soft reset: the reset button interrupt fires immediately
    /// and the non-maskable interrupt follows `nmi_delay` cycles later.
    pub fn request_soft_reset(&mut self, nmi_delay: u32) {
        self.schedule(Event::ResetButton, 0);
        self.schedule(Event::Nmi, nmi_delay);
    }

    /// Requests a power-on reset at the next safe checkpoint.
    pub fn request_hard_reset(&mut self) {
        self.requests.hard_reset = true;
    }

    /// Requests emulation to halt at the next checkpoint.
    pub fn request_stop(&mut self) {
        self.requests.stop = true;
    }

    /// Handles the wraparound marker event.
    ///
    /// Only does anything once the counter has wrapped back below the guard
    /// threshold; until then the marker stays at the head untouched.
    pub(crate) fn count_wrap(&mut self) {
        if self.cpu.cp0.count > RECENT_PAST {
            return;
        }

        self.scheduler.set_special_done(true);
        self.pop_event();
        self.schedule_absolute(Event::CountWrap, 0);
    }

    /// Handles the timer compare event: reschedules it at the compare
    /// register and raises the timer interrupt line.
    pub(crate) fn compare_interrupt(&mut self) {
        self.pop_event();

        // reschedule as if the triggering instruction had already retired
        let per_op = self.cpu.cp0.count_per_op;
        self.cpu.cp0.count = self.cpu.cp0.count.wrapping_add(per_op);
        self.schedule_absolute(Event::Compare, self.cpu.cp0.compare);
        self.cpu.cp0.count = self.cpu.cp0.count.wrapping_sub(per_op);

        self.cpu.raise_maskable_interrupt(Interrupt::Timer);
    }

    /// Handles the reset button interrupt: reconfigures the status and cause
    /// registers for the pre-NMI line and takes a general exception.
    pub(crate) fn reset_button_interrupt(&mut self) {
        self.pop_event();

        let status = &mut self.cpu.cp0.status;
        status.set_nmi(false);
        status.set_soft_reset(false);
        status.set_tlb_shutdown(false);
        let mask = status.interrupt_mask() | Interrupt::PreNmi.mask();
        status.set_interrupt_mask(mask);

        let cause = &mut self.cpu.cp0.cause;
        let pending = cause.interrupt_pending() | Interrupt::PreNmi.mask();
        cause.set_interrupt_pending(pending);
        cause.set_exception_code(u5::new(0));

        self.cpu.exception_general();
    }

    pub(crate) fn clear_cause(&mut self) {
        self.cpu.cp0.cause = Cause::from_bits(0);
    }
}
