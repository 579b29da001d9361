//! Interrupt and event scheduling core of the Boreal emulator.
//!
//! The driving loop advances the CPU cycle counter and re-enters
//! [`Boreal::process_events`] whenever the counter reaches the cached
//! next-interrupt value. Queue maintenance, exception delivery and reset
//! sequencing all happen inside that dispatch entry point.

pub mod modules;
pub mod system;

use crate::{
    modules::{Modules, SnapshotJob},
    system::{Config, Event, ExecMode, System},
};
use vr4300::exception::RESET_VECTOR;

pub use vr4300::{self, Address};

/// The Boreal emulator core.
pub struct Boreal {
    /// System state.
    pub system: System,
    /// Modules of the emulator.
    pub modules: Modules,
}

impl Boreal {
    pub fn new(modules: Modules, config: Config) -> Self {
        Self {
            system: System::new(config),
            modules,
        }
    }

    /// Advances the cycle counter by `cycles` and re-enters the dispatch loop
    /// if the counter has reached the next scheduled event or an external
    /// request is pending.
    ///
    /// Intended to be called by the driving loop at instruction-group
    /// boundaries.
    pub fn advance(&mut self, cycles: u32) {
        let cp0 = &mut self.system.cpu.cp0;
        cp0.count = cp0.count.wrapping_add(cycles);

        if self.pending() {
            self.process_events();
        }
    }

    fn pending(&self) -> bool {
        self.system.requests.stop
            || self.system.requests.hard_reset
            || self.modules.snapshots.pending().is_some()
            || self.system.cpu.cp0.count >= self.system.scheduler.next_interrupt()
    }

    /// The dispatch loop: executes the handler of the event at the head of
    /// the queue, after serving any deferred stop, snapshot, reset or jump
    /// requests.
    pub fn process_events(&mut self) {
        if self.system.requests.stop {
            return;
        }

        if !self.system.cpu.interrupt_unsafe {
            if self.modules.snapshots.pending() == Some(SnapshotJob::Load) {
                // the loaded snapshot carries a valid queue of its own
                self.modules.snapshots.load(&mut self.system);
                if self.system.config.mode == ExecMode::Cached {
                    self.modules.code.invalidate_all();
                }
                return;
            }

            if self.system.requests.hard_reset {
                self.hard_reset();
                return;
            }
        }

        if let Some(target) = self.system.cpu.skip_jump.take() {
            let count = self.system.cpu.cp0.count;
            self.system.scheduler.refresh_next_interrupt(count);
            self.system.cpu.last_addr = target;
            self.system.cpu.pc = target;
            return;
        }

        match self.system.scheduler.next_event() {
            Some(Event::CountWrap) => self.system.count_wrap(),
            Some(Event::VerticalRetrace) => {
                self.system.pop_event();
                self.system.vertical_retrace();
            }
            Some(Event::Compare) => self.system.compare_interrupt(),
            Some(Event::Check) => {
                self.system.pop_event();
                self.system.cpu.exception_general();
            }
            Some(Event::SerialDma) => {
                self.system.pop_event();
                self.system.serial_dma_finished();
            }
            Some(Event::ParallelDma) => {
                self.system.pop_event();
                self.system.parallel_dma_finished();
            }
            Some(Event::AudioDma) => {
                self.system.pop_event();
                self.system.audio_dma_finished();
            }
            Some(Event::SignalProcessor) => {
                self.system.pop_event();
                self.system.rsp_interrupt();
            }
            Some(Event::DisplayProcessor) => {
                self.system.pop_event();
                self.system.rdp_interrupt();
            }
            Some(Event::ResetButton) => self.system.reset_button_interrupt(),
            Some(Event::Nmi) => self.soft_reset(),
            None => {
                // an empty queue at dispatch means scheduling state has been
                // corrupted; recover with a generic exception
                tracing::error!("interrupt dispatched with an empty event queue");
                self.system.cpu.exception_general();
            }
        }

        if !self.system.cpu.interrupt_unsafe
            && self.modules.snapshots.pending() == Some(SnapshotJob::Save)
        {
            self.modules.snapshots.save(&mut self.system);
        }
    }

    /// Performs the full non-maskable interrupt reset sequence.
    fn soft_reset(&mut self) {
        let sys = &mut self.system;
        sys.pop_event();

        // Status after an NMI: TS and the reset flags cleared, then
        // ERL + BEV + SR set
        let status = &mut sys.cpu.cp0.status;
        status.set_nmi(false);
        status.set_tlb_shutdown(false);
        status.set_soft_reset(true);
        status.set_error_level(true);
        status.set_boot_exception_vectors(true);
        sys.clear_cause();

        // run the boot ROM, as the real reset sequence would
        self.modules.bootrom.execute(sys);

        // restart all counters from zero and reseed the queue
        sys.cpu.cp0.count = 0;
        sys.video.counter = 0;
        sys.init_events();

        // clear the audio status register so subsequent writes work
        sys.audio.status = system::audio::Status::from_bits(0);

        // ErrorEPC holds the last executed address, adjusted for delay slots
        sys.cpu.cp0.error_epc = sys.cpu.pc;

        if sys.config.mode == ExecMode::Cached {
            self.modules.code.discard_all();
            self.modules.code.reinitialize();
        }

        if sys.cpu.delay_slot {
            sys.cpu.cp0.error_epc -= 4;
        }
        sys.cpu.delay_slot = false;

        sys.cpu.last_addr = RESET_VECTOR;
        sys.cpu.pc = RESET_VECTOR;
    }

    /// Performs the power-on reset sequence. Lighter than the NMI sequence:
    /// registers are assumed to already be in their power-on state.
    fn hard_reset(&mut self) {
        let sys = &mut self.system;
        sys.requests.hard_reset = false;

        self.modules.bootrom.execute(sys);
        sys.cpu.last_addr = RESET_VECTOR;
        sys.scheduler.set_next_interrupt(624_999);
        sys.init_events();

        if sys.config.mode == ExecMode::Cached {
            self.modules.code.discard_all();
            self.modules.code.reinitialize();
        }

        sys.cpu.pc = sys.cpu.last_addr;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        modules::SnapshotModule,
        system::{mi::Sources, video::STARTUP_DELAY},
    };
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };
    use vr4300::{cp0::Interrupt, exception::GENERAL_VECTOR};

    fn boreal() -> Boreal {
        Boreal::new(Modules::default(), Config::default())
    }

    struct TestSnapshots {
        job: Option<SnapshotJob>,
    }

    impl SnapshotModule for TestSnapshots {
        fn pending(&self) -> Option<SnapshotJob> {
            self.job
        }

        fn load(&mut self, sys: &mut System) {
            self.job = None;
            sys.cpu.cp0.error_epc = Address(0x1234_5678);
        }

        fn save(&mut self, sys: &mut System) {
            self.job = None;
            sys.cpu.cp0.error_epc = Address(0x8765_4321);
        }
    }

    #[test]
    fn startup_queue_composition() {
        let b = boreal();
        assert_eq!(b.system.scheduler.len(), 2);
        assert_eq!(b.system.scheduler.next_event(), Some(Event::CountWrap));
        assert_eq!(b.system.scheduler.find(Event::CountWrap), Some(0));
        assert_eq!(
            b.system.scheduler.find(Event::VerticalRetrace),
            Some(STARTUP_DELAY)
        );
        assert_eq!(b.system.scheduler.next_interrupt(), 0);
    }

    #[test]
    fn timer_compare_reschedules_and_raises_line_7() {
        let mut b = boreal();
        b.system.cpu.cp0.count_per_op = 100;
        b.system.cpu.cp0.compare = 0x0002_0000;
        b.system.cpu.cp0.status.set_interrupt_enable(true);
        b.system
            .cpu
            .cp0
            .status
            .set_interrupt_mask(Interrupt::Timer.mask());
        b.system.schedule_absolute(Event::Compare, 100);

        // first dispatch serves the wraparound marker
        b.advance(100);
        assert_eq!(b.system.scheduler.next_event(), Some(Event::Compare));
        assert_eq!(b.system.scheduler.next_interrupt(), 100);

        let pc = b.system.cpu.pc;
        b.advance(0);

        assert_eq!(b.system.scheduler.find(Event::Compare), Some(0x0002_0000));
        assert_eq!(b.system.cpu.cp0.count, 100);
        assert_eq!(b.system.cpu.pc, GENERAL_VECTOR);
        assert_eq!(b.system.cpu.cp0.epc, pc);
        assert!(b.system.cpu.cp0.status.exception_level());
        assert_ne!(
            b.system.cpu.cp0.cause.interrupt_pending() & Interrupt::Timer.mask(),
            0
        );
    }

    #[test]
    fn rcp_interrupt_is_delivered_through_a_check_event() {
        let mut b = boreal();
        b.system.cpu.cp0.status.set_interrupt_enable(true);
        b.system
            .cpu
            .cp0
            .status
            .set_interrupt_mask(Interrupt::Rcp.mask());
        b.system
            .mi
            .mask
            .set_sources(Sources::default().with_serial(true));
        b.system.schedule(Event::SerialDma, 0);

        b.advance(0); // wraparound marker
        b.advance(0); // serial DMA completion

        assert!(b.system.serial.status.interrupt());
        assert!(b.system.mi.cause.sources().serial());
        assert_eq!(b.system.scheduler.next_event(), Some(Event::Check));

        b.advance(0); // check event delivers the exception

        assert_eq!(b.system.cpu.pc, GENERAL_VECTOR);
        assert!(b.system.cpu.cp0.status.exception_level());
        assert_eq!(b.system.scheduler.find(Event::Check), None);
    }

    #[test]
    fn masked_rcp_interrupt_is_not_delivered() {
        let mut b = boreal();
        b.system.cpu.cp0.status.set_interrupt_enable(true);
        b.system
            .cpu
            .cp0
            .status
            .set_interrupt_mask(Interrupt::Rcp.mask());
        b.system.schedule(Event::SerialDma, 0);

        b.advance(0);
        b.advance(0);

        // line raised in the controller, but masked off there
        assert!(b.system.mi.cause.sources().serial());
        assert_ne!(b.system.scheduler.next_event(), Some(Event::Check));
        assert_ne!(b.system.cpu.pc, GENERAL_VECTOR);
    }

    #[test]
    fn vertical_retrace_reschedules_itself() {
        let retraces = Arc::new(AtomicU32::new(0));
        let counter = retraces.clone();

        let config = Config {
            mode: ExecMode::Interpreter,
            vsync_callback: Some(Box::new(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            })),
        };
        let mut b = Boreal::new(Modules::default(), config);

        b.advance(1); // wraparound marker
        b.advance(STARTUP_DELAY - 1);

        assert_eq!(b.system.video.counter, 1);
        assert_eq!(retraces.load(Ordering::Relaxed), 1);
        assert!(b.system.mi.cause.sources().video());
        assert_eq!(
            b.system.scheduler.find(Event::VerticalRetrace),
            Some(2 * STARTUP_DELAY)
        );
    }

    #[test]
    fn nmi_reset_reseeds_the_queue() {
        let mut b = boreal();
        b.system.cpu.cp0.count = 12_345;
        b.system.cpu.pc = Address(0x8020_0000);
        b.system.cpu.delay_slot = true;
        b.system.schedule(Event::Nmi, 0);

        b.advance(0);

        assert_eq!(b.system.cpu.cp0.count, 0);
        assert_eq!(b.system.cpu.pc, RESET_VECTOR);
        assert_eq!(b.system.cpu.last_addr, RESET_VECTOR);
        assert!(!b.system.cpu.delay_slot);

        // ErrorEPC holds the interrupted address, backed up by one
        // instruction for the delay slot
        assert_eq!(b.system.cpu.cp0.error_epc, Address(0x801F_FFFC));

        assert!(b.system.cpu.cp0.status.error_level());
        assert!(b.system.cpu.cp0.status.soft_reset());
        assert!(b.system.cpu.cp0.status.boot_exception_vectors());
        assert_eq!(b.system.cpu.cp0.cause.to_bits(), 0);
        assert_eq!(b.system.audio.status.to_bits(), 0);
        assert_eq!(b.system.video.counter, 0);

        // startup composition, wraparound marker first
        assert_eq!(b.system.scheduler.len(), 2);
        assert_eq!(b.system.scheduler.next_event(), Some(Event::CountWrap));
        assert_eq!(b.system.scheduler.find(Event::CountWrap), Some(0));
        assert_eq!(
            b.system.scheduler.find(Event::VerticalRetrace),
            Some(STARTUP_DELAY)
        );
        assert_eq!(b.system.scheduler.next_interrupt(), 0);
    }

    #[test]
    fn reset_button_then_nmi() {
        let mut b = boreal();
        b.system.request_soft_reset(200);

        b.advance(0); // wraparound marker
        b.advance(0); // reset button

        assert_eq!(b.system.cpu.pc, GENERAL_VECTOR);
        assert_ne!(
            b.system.cpu.cp0.status.interrupt_mask() & Interrupt::PreNmi.mask(),
            0
        );
        assert_ne!(
            b.system.cpu.cp0.cause.interrupt_pending() & Interrupt::PreNmi.mask(),
            0
        );

        b.advance(200); // the NMI lands

        assert_eq!(b.system.cpu.pc, RESET_VECTOR);
        assert_eq!(b.system.cpu.cp0.count, 0);
        assert_eq!(b.system.scheduler.len(), 2);
    }

    #[test]
    fn hard_reset_runs_at_checkpoint() {
        let mut b = boreal();
        b.system.cpu.pc = Address(0x8030_0000);
        b.system.request_hard_reset();

        b.process_events();

        assert!(!b.system.requests.hard_reset);
        assert_eq!(b.system.cpu.pc, RESET_VECTOR);
        assert_eq!(b.system.cpu.last_addr, RESET_VECTOR);
        assert_eq!(b.system.scheduler.len(), 2);
        assert_eq!(b.system.scheduler.next_event(), Some(Event::CountWrap));
    }

    #[test]
    fn snapshot_load_takes_priority_over_dispatch() {
        let modules = Modules {
            snapshots: Box::new(TestSnapshots {
                job: Some(SnapshotJob::Load),
            }),
            ..Modules::default()
        };
        let mut b = Boreal::new(modules, Config::default());

        b.process_events();

        // the queue was not touched: the snapshot owns it now
        assert_eq!(b.system.cpu.cp0.error_epc, Address(0x1234_5678));
        assert_eq!(b.system.scheduler.len(), 2);
        assert_eq!(b.system.scheduler.next_event(), Some(Event::CountWrap));
    }

    #[test]
    fn snapshot_save_runs_after_dispatch() {
        let modules = Modules {
            snapshots: Box::new(TestSnapshots {
                job: Some(SnapshotJob::Save),
            }),
            ..Modules::default()
        };
        let mut b = Boreal::new(modules, Config::default());

        b.process_events();

        // the head event was dispatched first, then the save ran
        assert_eq!(b.system.cpu.cp0.error_epc, Address(0x8765_4321));
        assert_eq!(b.system.scheduler.find(Event::CountWrap), Some(0));
    }

    #[test]
    fn interrupt_unsafe_defers_snapshot_and_reset() {
        let modules = Modules {
            snapshots: Box::new(TestSnapshots {
                job: Some(SnapshotJob::Load),
            }),
            ..Modules::default()
        };
        let mut b = Boreal::new(modules, Config::default());
        b.system.cpu.interrupt_unsafe = true;
        b.system.request_hard_reset();

        b.process_events();

        // neither ran; normal dispatch proceeded instead
        assert!(b.system.requests.hard_reset);
        assert_ne!(b.system.cpu.cp0.error_epc, Address(0x1234_5678));
        assert_eq!(b.system.scheduler.next_event(), Some(Event::VerticalRetrace));
    }

    #[test]
    fn skip_jump_is_consumed_before_dispatch() {
        let mut b = boreal();
        b.system.cpu.skip_jump = Some(Address(0x8000_1000));

        b.process_events();

        assert_eq!(b.system.cpu.skip_jump, None);
        assert_eq!(b.system.cpu.pc, Address(0x8000_1000));
        assert_eq!(b.system.cpu.last_addr, Address(0x8000_1000));

        // the queue was left alone
        assert_eq!(b.system.scheduler.len(), 2);
        assert_eq!(b.system.scheduler.next_event(), Some(Event::CountWrap));
    }

    #[test]
    fn stop_request_halts_dispatch() {
        let mut b = boreal();
        b.system.request_stop();

        b.advance(10_000);

        assert_eq!(b.system.scheduler.len(), 2);
        assert_eq!(b.system.scheduler.next_event(), Some(Event::CountWrap));
    }
}
