//! Scheduling of timed interrupt events.
//!
//! Events live in a fixed arena of nodes chained into a queue ordered by
//! effective trigger time, where "effective" means relative to the current
//! value of the 32-bit cycle counter: an event whose raw trigger is smaller
//! than the counter may still be the furthest away once wraparound is taken
//! into account.

use crate::system::Event;
use easyerr::Error;
use tinyvec::ArrayVec;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, little_endian::U32};

/// Hard upper bound on simultaneously pending events.
pub const CAPACITY: usize = 16;

/// Terminates the serialized form of the queue.
const SENTINEL: u32 = 0xFFFF_FFFF;

/// Triggers this far behind the counter are treated as recently passed
/// rather than far in the future.
pub(crate) const RECENT_PAST: u32 = 0x1000_0000;

#[derive(Debug, Clone, Copy, Default)]
struct Node {
    event: Event,
    trigger: u32,
    next: Option<u8>,
}

/// Fixed pool of queue nodes, referenced by index into an arena.
#[derive(Debug, Clone)]
struct Pool {
    nodes: [Node; CAPACITY],
    free: ArrayVec<[u8; CAPACITY]>,
}

impl Pool {
    fn new() -> Self {
        let mut pool = Self {
            nodes: [Node::default(); CAPACITY],
            free: ArrayVec::new(),
        };

        pool.reset();
        pool
    }

    /// Makes every node available again. Node contents are left as is, so a
    /// re-acquired node must be overwritten before use.
    fn reset(&mut self) {
        self.free.clear();
        for index in 0..CAPACITY as u8 {
            self.free.push(index);
        }
    }

    /// Takes a node out of the pool, or `None` if all are checked out.
    fn acquire(&mut self) -> Option<u8> {
        self.free.pop()
    }

    /// Returns a node to the pool. No-op if nothing is checked out.
    fn release(&mut self, index: u8) {
        if self.free.len() == CAPACITY {
            return;
        }

        self.free.push(index);
    }
}

/// The pending event queue: a chain of pool nodes ordered by effective
/// trigger time.
#[derive(Debug, Clone)]
pub struct Scheduler {
    pool: Pool,
    head: Option<u8>,
    /// Trigger of the queue head, mirrored for the driving loop. Zero when
    /// nothing is pending.
    next: u32,
    /// Whether the wraparound marker has fired since the counter last crossed
    /// into the upper half of its range.
    special_done: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            pool: Pool::new(),
            head: None,
            next: 0,
            special_done: true,
        }
    }

    #[inline(always)]
    fn node(&self, index: u8) -> &Node {
        &self.pool.nodes[index as usize]
    }

    #[inline(always)]
    fn node_mut(&mut self, index: u8) -> &mut Node {
        &mut self.pool.nodes[index as usize]
    }

    /// The cached trigger of the next pending event. The driving loop
    /// re-enters the dispatch loop once the cycle counter reaches this value.
    #[inline(always)]
    pub fn next_interrupt(&self) -> u32 {
        self.next
    }

    pub(crate) fn set_next_interrupt(&mut self, next: u32) {
        self.next = next;
    }

    pub(crate) fn set_special_done(&mut self, done: bool) {
        self.special_done = done;
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        let mut len = 0;
        let mut cursor = self.head;
        while let Some(index) = cursor {
            len += 1;
            cursor = self.node(index).next;
        }

        len
    }

    /// Type of the event at the head of the queue.
    pub fn next_event(&self) -> Option<Event> {
        self.head.map(|index| self.node(index).event)
    }

    /// Trigger of the pending event of the given type, if queued.
    pub fn find(&self, event: Event) -> Option<u32> {
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let node = self.node(index);
            if node.event == event {
                return Some(node.trigger);
            }

            cursor = node.next;
        }

        None
    }

    /// Whether an event triggering at `trigger` fires before `other`,
    /// relative to the current counter value.
    fn before(&self, count: u32, trigger: u32, other: &Node) -> bool {
        if trigger.wrapping_sub(count) >= 0x8000_0000 {
            return false;
        }

        if other.trigger.wrapping_sub(count) < 0x8000_0000 {
            trigger.wrapping_sub(count) < other.trigger.wrapping_sub(count)
        } else if count.wrapping_sub(other.trigger) < RECENT_PAST {
            // `other` just passed: it is already due, unless it is the
            // wraparound marker and has fired for this lap already
            match other.event {
                Event::CountWrap => self.special_done,
                _ => false,
            }
        } else {
            true
        }
    }

    /// Inserts an event into its ordered position in the queue.
    ///
    /// Rejected if an event of the same type is already queued or if the pool
    /// is exhausted; both leave the queue unmodified.
    pub fn insert(&mut self, event: Event, trigger: u32, count: u32) {
        let special = event == Event::CountWrap;

        if count > 0x8000_0000 {
            self.special_done = false;
        }

        if self.find(event).is_some() {
            // dropping the duplicate instead of queueing it twice matters:
            // the timing code of some titles schedules the same interrupt
            // again and freezes if both copies fire
            tracing::warn!("two events of type {event:?} in interrupt queue");
            return;
        }

        let Some(new) = self.pool.acquire() else {
            tracing::error!("failed to allocate node for new interrupt event");
            return;
        };

        self.node_mut(new).event = event;
        self.node_mut(new).trigger = trigger;

        let Some(head) = self.head else {
            self.node_mut(new).next = None;
            self.head = Some(new);
            self.next = trigger;
            return;
        };

        // the wraparound marker always sorts after everything already queued
        if !special && self.before(count, trigger, self.node(head)) {
            self.node_mut(new).next = Some(head);
            self.head = Some(new);
            self.next = trigger;
            return;
        }

        let mut cursor = head;
        while let Some(next) = self.node(cursor).next {
            if !special && self.before(count, trigger, self.node(next)) {
                break;
            }

            cursor = next;
        }

        if !special && self.node(cursor).next.is_some() {
            // FIFO among events sharing a trigger value
            while let Some(next) = self.node(cursor).next {
                if self.node(next).trigger != trigger {
                    break;
                }

                cursor = next;
            }
        }

        self.node_mut(new).next = self.node(cursor).next;
        self.node_mut(cursor).next = Some(new);
    }

    /// Pushes an event at the front of the queue with trigger equal to the
    /// current counter value, bypassing ordered insertion.
    pub(crate) fn push_front(&mut self, event: Event, count: u32) {
        let Some(new) = self.pool.acquire() else {
            tracing::error!("failed to allocate node for new interrupt event");
            return;
        };

        let head = self.head;
        let node = self.node_mut(new);
        node.event = event;
        node.trigger = count;
        node.next = head;

        self.head = Some(new);
        self.next = count;
    }

    /// Pops the head of the queue and recomputes the cached next-interrupt
    /// value from the new head.
    pub fn remove_next(&mut self, count: u32) {
        let Some(head) = self.head else {
            return;
        };

        self.head = self.node(head).next;
        self.pool.release(head);
        self.refresh_next_interrupt(count);
    }

    /// Recomputes the cached next-interrupt value from the queue head. An
    /// empty queue and a head stranded in the distant past both yield zero,
    /// which the driving loop treats as "dispatch immediately".
    pub(crate) fn refresh_next_interrupt(&mut self, count: u32) {
        self.next = match self.head {
            Some(head) => {
                let node = self.node(head);
                if node.trigger > count || count.wrapping_sub(node.trigger) < 0x8000_0000 {
                    node.trigger
                } else {
                    0
                }
            }
            None => 0,
        };
    }

    /// Unlinks the first queued event of the given type. No-op if absent.
    pub fn remove(&mut self, event: Event) {
        let Some(head) = self.head else {
            return;
        };

        if self.node(head).event == event {
            self.head = self.node(head).next;
            self.pool.release(head);
            return;
        }

        let mut cursor = head;
        while let Some(next) = self.node(cursor).next {
            if self.node(next).event == event {
                self.node_mut(cursor).next = self.node(next).next;
                self.pool.release(next);
                return;
            }

            cursor = next;
        }
    }

    /// Discards every pending event.
    pub fn clear(&mut self) {
        self.head = None;
        self.pool.reset();
    }

    /// Shifts every queued trigger by the distance from `count` to `base`,
    /// preserving timing relative to a counter which is being redefined.
    pub(crate) fn shift(&mut self, count: u32, base: u32) {
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let node = self.node_mut(index);
            node.trigger = node.trigger.wrapping_sub(count).wrapping_add(base);
            cursor = node.next;
        }
    }
}

/// Serialized form of a queued event.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
struct Record {
    kind: U32,
    trigger: U32,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("serialized event queue ends before the sentinel")]
    Truncated,
}

impl Scheduler {
    /// Appends the serialized queue to `buf`: one record per event in queue
    /// order, head first, terminated by the sentinel.
    pub fn serialize(&self, buf: &mut Vec<u8>) {
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let node = self.node(index);
            let record = Record {
                kind: U32::new(node.event as u32),
                trigger: U32::new(node.trigger),
            };

            buf.extend_from_slice(record.as_bytes());
            cursor = node.next;
        }

        buf.extend_from_slice(U32::new(SENTINEL).as_bytes());
    }

    /// Clears the queue and reloads it from `buf` through the normal
    /// scheduling path, so the duplicate and capacity rules apply.
    ///
    /// Records with an unknown type identifier are dropped.
    pub fn deserialize(&mut self, mut buf: &[u8], count: u32) -> Result<(), LoadError> {
        self.clear();

        loop {
            let Ok((kind, _)) = U32::read_from_prefix(buf) else {
                return Err(LoadError::Truncated);
            };

            if kind.get() == SENTINEL {
                return Ok(());
            }

            let Ok((record, rest)) = Record::read_from_prefix(buf) else {
                return Err(LoadError::Truncated);
            };
            buf = rest;

            match Event::from_repr(record.kind.get()) {
                Some(event) => self.insert(event, record.trigger.get(), count),
                None => tracing::error!(
                    "unknown event type {:#010X} in serialized queue, dropping",
                    record.kind.get()
                ),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn drain(scheduler: &mut Scheduler, count: u32) -> Vec<Event> {
        let mut order = Vec::new();
        while let Some(event) = scheduler.next_event() {
            order.push(event);
            scheduler.remove_next(count);
        }

        order
    }

    #[test]
    fn dispatch_order_follows_trigger_distance() {
        let mut scheduler = Scheduler::new();
        scheduler.insert(Event::AudioDma, 300, 0);
        scheduler.insert(Event::SerialDma, 100, 0);
        scheduler.insert(Event::ParallelDma, 200, 0);

        assert_eq!(scheduler.next_interrupt(), 100);
        assert_eq!(
            drain(&mut scheduler, 0),
            vec![Event::SerialDma, Event::ParallelDma, Event::AudioDma]
        );
    }

    #[test]
    fn wraparound_orders_by_modular_distance() {
        let count = 0xFFFF_FFF0;
        let mut scheduler = Scheduler::new();
        scheduler.insert(Event::SerialDma, 0xFFFF_FFF8, count);
        scheduler.insert(Event::ParallelDma, 0x0000_0008, count);

        // both are "soon": 8 and 24 cycles away despite the raw values
        assert_eq!(scheduler.next_event(), Some(Event::SerialDma));
        assert_eq!(scheduler.next_interrupt(), 0xFFFF_FFF8);

        scheduler.remove_next(count);
        assert_eq!(scheduler.next_event(), Some(Event::ParallelDma));
    }

    #[test]
    fn duplicate_types_are_rejected() {
        let mut scheduler = Scheduler::new();
        scheduler.insert(Event::Compare, 100, 0);
        scheduler.insert(Event::SerialDma, 200, 0);

        scheduler.insert(Event::Compare, 50, 0);

        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.find(Event::Compare), Some(100));
        assert_eq!(scheduler.next_event(), Some(Event::Compare));
        assert_eq!(scheduler.next_interrupt(), 100);
    }

    #[test]
    fn fifo_among_equal_triggers() {
        let mut scheduler = Scheduler::new();
        scheduler.insert(Event::SerialDma, 100, 0);
        scheduler.insert(Event::ParallelDma, 100, 0);
        scheduler.insert(Event::AudioDma, 100, 0);

        assert_eq!(
            drain(&mut scheduler, 0),
            vec![Event::SerialDma, Event::ParallelDma, Event::AudioDma]
        );
    }

    #[test]
    fn wraparound_marker_sorts_after_pending_events() {
        let mut scheduler = Scheduler::new();
        scheduler.insert(Event::VerticalRetrace, 5000, 0);
        scheduler.insert(Event::CountWrap, 0, 0);

        assert_eq!(scheduler.next_event(), Some(Event::VerticalRetrace));
        assert_eq!(scheduler.next_interrupt(), 5000);
        assert_eq!(scheduler.find(Event::CountWrap), Some(0));
    }

    #[test]
    fn pool_exhaustion_drops_the_event() {
        let mut scheduler = Scheduler::new();

        let types = [
            Event::VerticalRetrace,
            Event::Compare,
            Event::SerialDma,
            Event::ParallelDma,
            Event::AudioDma,
            Event::SignalProcessor,
            Event::DisplayProcessor,
            Event::ResetButton,
            Event::Nmi,
            Event::CountWrap,
        ];
        for (i, event) in types.into_iter().enumerate() {
            scheduler.insert(event, 100 * (i as u32 + 1), 0);
        }
        while scheduler.len() < CAPACITY {
            scheduler.push_front(Event::Check, 0);
        }
        assert_eq!(scheduler.len(), CAPACITY);

        // make room for exactly one node, then take it back
        scheduler.remove(Event::Compare);
        scheduler.insert(Event::Compare, 123, 0);
        assert_eq!(scheduler.len(), CAPACITY);

        // no nodes left: the insert is dropped and the queue is unchanged
        scheduler.remove(Event::Compare);
        scheduler.push_front(Event::Check, 0);
        scheduler.insert(Event::Compare, 456, 0);
        assert_eq!(scheduler.len(), CAPACITY);
        assert_eq!(scheduler.find(Event::Compare), None);
    }

    #[test]
    fn remove_unlinks_mid_queue() {
        let mut scheduler = Scheduler::new();
        scheduler.insert(Event::SerialDma, 100, 0);
        scheduler.insert(Event::ParallelDma, 200, 0);
        scheduler.insert(Event::AudioDma, 300, 0);

        scheduler.remove(Event::ParallelDma);

        assert_eq!(scheduler.find(Event::ParallelDma), None);
        assert_eq!(
            drain(&mut scheduler, 0),
            vec![Event::SerialDma, Event::AudioDma]
        );
    }

    #[test]
    fn remove_next_refreshes_cached_trigger() {
        let mut scheduler = Scheduler::new();
        scheduler.insert(Event::SerialDma, 100, 0);
        scheduler.insert(Event::ParallelDma, 200, 0);

        scheduler.remove_next(100);
        assert_eq!(scheduler.next_interrupt(), 200);

        scheduler.remove_next(200);
        assert_eq!(scheduler.next_interrupt(), 0);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn serialization_round_trips() {
        let mut scheduler = Scheduler::new();
        scheduler.insert(Event::SerialDma, 100, 0);
        scheduler.insert(Event::ParallelDma, 200, 0);
        scheduler.insert(Event::VerticalRetrace, 300, 0);

        let mut buf = Vec::new();
        scheduler.serialize(&mut buf);
        assert_eq!(buf.len(), 3 * 8 + 4);

        let mut loaded = Scheduler::new();
        loaded.deserialize(&buf, 0).unwrap();

        assert_eq!(loaded.find(Event::SerialDma), Some(100));
        assert_eq!(loaded.find(Event::ParallelDma), Some(200));
        assert_eq!(loaded.find(Event::VerticalRetrace), Some(300));
        assert_eq!(
            drain(&mut loaded, 0),
            vec![Event::SerialDma, Event::ParallelDma, Event::VerticalRetrace]
        );
    }

    #[test]
    fn deserialize_rejects_missing_sentinel() {
        let mut scheduler = Scheduler::new();
        scheduler.insert(Event::SerialDma, 100, 0);

        let mut buf = Vec::new();
        scheduler.serialize(&mut buf);
        buf.truncate(buf.len() - 4);

        let mut loaded = Scheduler::new();
        assert!(loaded.deserialize(&buf, 0).is_err());
    }

    #[test]
    fn deserialize_drops_unknown_types() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0x0000_0008u32.to_le_bytes());
        buf.extend_from_slice(&100u32.to_le_bytes());
        buf.extend_from_slice(&0x0000_4000u32.to_le_bytes());
        buf.extend_from_slice(&150u32.to_le_bytes());
        buf.extend_from_slice(&0x0000_0010u32.to_le_bytes());
        buf.extend_from_slice(&200u32.to_le_bytes());
        buf.extend_from_slice(&SENTINEL.to_le_bytes());

        let mut scheduler = Scheduler::new();
        scheduler.deserialize(&buf, 0).unwrap();

        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.find(Event::SerialDma), Some(100));
        assert_eq!(scheduler.find(Event::ParallelDma), Some(200));
    }

    #[test]
    fn recently_passed_events_stay_ahead_of_future_ones() {
        // the parallel DMA trigger is 16 cycles in the past: it must fire
        // before an event scheduled for the future
        let count = 0x0000_1000;
        let mut scheduler = Scheduler::new();
        scheduler.insert(Event::ParallelDma, 0x0000_0FF0, 0);
        scheduler.insert(Event::SerialDma, 0x0000_2000, count);

        assert_eq!(scheduler.next_event(), Some(Event::ParallelDma));
    }
}
