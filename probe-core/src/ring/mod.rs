#![allow(clippy::module_name_repetitions)]

//! The rotating capture ring and its transfer-engine seam.
//!
//! Sampled words land in [`BUFFER_COUNT`] equal buffers driven by a
//! [`CommandList`](list::CommandList). The engine notifies progress through
//! two listeners registered at arm time; everything shared with notification
//! context is a plain atomic behind a reference-counted handle, so the probe
//! never blocks and holds no lock.

pub mod list;

use core::fmt;

use alloc::vec::Vec;
use portable_atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use portable_atomic_util::Arc;

use crate::controls::{CaptureConfig, SampleEndMode};
use list::{ChainMode, CommandList};

/// Buffers in the ring. Power of two, so wrap arithmetic is a mask.
pub const BUFFER_COUNT: usize = 4;

/// Highest value the advance counter reaches: two past the buffer count,
/// one past the count that already proves the ring rotated.
const ADVANCE_CEILING: u32 = 6;

/// Failure while preparing or running a capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureError {
    /// The sample buffers did not fit in memory.
    OutOfMemory,
    /// No aligned command span was found for ring chaining.
    RingAlignment,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => f.write_str("sample memory exhausted"),
            Self::RingAlignment => f.write_str("no aligned span for the buffer ring"),
        }
    }
}

/// Observes every command-slot consumption, the stop sentinel included.
pub trait AdvanceListener {
    fn on_advance(&self);
}

/// Observes the sentinel consumption that ends the transfer, carrying the
/// read offset after that consumption.
pub trait CompletionListener {
    fn on_complete(&self, read_offset: usize);
}

/// Counters the notification side writes and the poll side reads.
pub struct RingProgress {
    advances: AtomicU32,
    done: AtomicBool,
    final_offset: AtomicUsize,
}

impl RingProgress {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            advances: AtomicU32::new(0),
            done: AtomicBool::new(false),
            final_offset: AtomicUsize::new(0),
        }
    }

    /// Counts one slot consumption, saturating once rotation is proven.
    pub fn note_advance(&self) {
        let _ = self
            .advances
            .fetch_update(Ordering::Release, Ordering::Relaxed, |count| {
                (count < ADVANCE_CEILING).then_some(count + 1)
            });
    }

    /// Records the final read offset, then publishes completion.
    pub fn note_complete(&self, read_offset: usize) {
        self.final_offset.store(read_offset, Ordering::Release);
        self.done.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn advances(&self) -> u32 {
        self.advances.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn final_offset(&self) -> usize {
        self.final_offset.load(Ordering::Acquire)
    }
}

impl Default for RingProgress {
    fn default() -> Self {
        Self::new()
    }
}

struct AdvanceNotifier(Arc<RingProgress>);

impl AdvanceListener for AdvanceNotifier {
    fn on_advance(&self) {
        self.0.note_advance();
    }
}

struct CompletionNotifier(Arc<RingProgress>);

impl CompletionListener for CompletionNotifier {
    fn on_complete(&self, read_offset: usize) {
        self.0.note_complete(read_offset);
    }
}

/// Flat backing store for all ring buffers.
///
/// Words are relaxed atomics: the engine stores them before its completion
/// notification, and the probe reads them only after observing the done
/// flag, so the flag's release/acquire edge orders the data.
#[derive(Debug)]
pub struct SampleMemory {
    words: Vec<AtomicU32>,
    words_per_buffer: usize,
}

impl SampleMemory {
    pub fn allocate(words_per_buffer: usize) -> Result<Self, CaptureError> {
        let total = words_per_buffer
            .checked_mul(BUFFER_COUNT)
            .ok_or(CaptureError::OutOfMemory)?;
        let mut words = Vec::new();
        words
            .try_reserve_exact(total)
            .map_err(|_| CaptureError::OutOfMemory)?;
        words.resize_with(total, || AtomicU32::new(0));
        Ok(Self {
            words,
            words_per_buffer,
        })
    }

    #[must_use]
    pub fn words_per_buffer(&self) -> usize {
        self.words_per_buffer
    }

    pub fn write(&self, buffer: usize, index: usize, value: u32) {
        self.words[buffer * self.words_per_buffer + index].store(value, Ordering::Relaxed);
    }

    #[must_use]
    pub fn read(&self, buffer: usize, index: usize) -> u32 {
        self.words[buffer * self.words_per_buffer + index].load(Ordering::Relaxed)
    }
}

/// Everything the transfer engine needs for one capture.
pub struct TransferPlan<S> {
    /// Where sampled words come from.
    pub source: S,
    pub list: Arc<CommandList>,
    pub memory: Arc<SampleMemory>,
}

/// The word-moving engine as the probe sees it.
pub trait TransferEngine {
    /// Source of sampled words, matched to the sampling peripheral's tap.
    type Source;

    /// Takes a plan and the two progress listeners. Transfers must not move
    /// until [`start`](Self::start).
    fn arm<A, C>(&mut self, plan: TransferPlan<Self::Source>, advance: A, complete: C)
    where
        A: AdvanceListener + 'static,
        C: CompletionListener + 'static;

    fn start(&mut self);

    /// Releases the plan and listeners.
    fn disarm(&mut self);
}

/// Cloneable capability to stop the capture from notification context.
#[derive(Clone)]
pub struct StopHandle {
    list: Arc<CommandList>,
}

impl StopHandle {
    /// Ends the capture so the `window` most recent buffers are retained.
    pub fn stop_in_window(&self, window: u32) {
        self.list.halt_in_window(window);
    }
}

/// The valid portion of a finished capture.
pub struct CaptureBuffers {
    memory: Arc<SampleMemory>,
    earliest: usize,
    valid: usize,
}

impl CaptureBuffers {
    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.valid
    }

    #[must_use]
    pub fn earliest(&self) -> usize {
        self.earliest
    }

    #[must_use]
    pub fn words_per_buffer(&self) -> usize {
        self.memory.words_per_buffer()
    }

    /// Valid buffer indices, oldest data first.
    pub fn chronological(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.valid).map(move |step| (self.earliest + step) % BUFFER_COUNT)
    }

    #[must_use]
    pub fn read(&self, buffer: usize, index: usize) -> u32 {
        self.memory.read(buffer, index)
    }
}

/// One capture's buffers, command list, and progress state.
pub struct CaptureRing {
    list: Arc<CommandList>,
    memory: Arc<SampleMemory>,
    progress: Arc<RingProgress>,
}

impl CaptureRing {
    /// Sizes and seeds the ring for a parsed configuration.
    pub fn prepare(config: &CaptureConfig) -> Result<Self, CaptureError> {
        let per_buffer =
            config.sample_size as usize / (config.samples_per_word() as usize * BUFFER_COUNT);
        let memory = SampleMemory::allocate(per_buffer)?;
        let mode = match config.end_mode {
            SampleEndMode::BufferFull => ChainMode::Linear,
            _ => ChainMode::Ring,
        };
        let list = Arc::new(CommandList::new(mode));
        list.seed()?;
        Ok(Self {
            list,
            memory: Arc::new(memory),
            progress: Arc::new(RingProgress::new()),
        })
    }

    /// Hands the engine its plan and registers both progress listeners.
    pub fn arm<E: TransferEngine>(&self, engine: &mut E, source: E::Source) {
        let plan = TransferPlan {
            source,
            list: Arc::clone(&self.list),
            memory: Arc::clone(&self.memory),
        };
        engine.arm(
            plan,
            AdvanceNotifier(Arc::clone(&self.progress)),
            CompletionNotifier(Arc::clone(&self.progress)),
        );
    }

    /// Manual stop: the engine halts at the very next slot.
    pub fn stop(&self) {
        self.list.halt_everywhere();
    }

    /// Event stop retaining the `window` most recent buffers.
    pub fn stop_in_window(&self, window: u32) {
        self.list.halt_in_window(window);
    }

    #[must_use]
    pub fn stopper(&self) -> StopHandle {
        StopHandle {
            list: Arc::clone(&self.list),
        }
    }

    /// Whether the engine has consumed a stop sentinel.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.progress.is_done()
    }

    #[must_use]
    pub fn advances(&self) -> u32 {
        self.progress.advances()
    }

    /// Resolves which buffers hold valid data and in what order.
    ///
    /// More advances than live slots proves the ring rotated: all buffers
    /// are valid and the oldest sits just behind the final read position.
    /// Otherwise only the buffers filled before the sentinel count, oldest
    /// first from buffer zero.
    #[must_use]
    pub fn finish(&self) -> CaptureBuffers {
        let advances = self.progress.advances();
        let (earliest, valid) = if advances as usize > BUFFER_COUNT + 1 {
            (
                (self.progress.final_offset() + BUFFER_COUNT - 1) % BUFFER_COUNT,
                BUFFER_COUNT,
            )
        } else {
            (0, advances.saturating_sub(1) as usize)
        };
        CaptureBuffers {
            memory: Arc::clone(&self.memory),
            earliest,
            valid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::list::SlotCommand;
    use alloc::vec::Vec;

    fn config(end_mode: SampleEndMode) -> CaptureConfig {
        CaptureConfig {
            pin_base: 16,
            pin_width: 1,
            frequency_hz: 19_200,
            start_trigger: None,
            event_trigger: None,
            end_mode,
            sample_size: 3200,
        }
    }

    /// One transfer-engine step against the ring's own list and progress.
    fn pump(ring: &CaptureRing) -> bool {
        match ring.list.next_command() {
            SlotCommand::Fill(_) => {
                ring.progress.note_advance();
                false
            }
            SlotCommand::Stop => {
                ring.progress.note_advance();
                ring.progress.note_complete(ring.list.read_offset());
                true
            }
        }
    }

    fn pump_until_done(ring: &CaptureRing) {
        while !pump(ring) {}
    }

    #[test]
    fn sizes_buffers_by_flooring_word_capacity() {
        let ring = CaptureRing::prepare(&config(SampleEndMode::Manual)).expect("prepares");
        assert_eq!(ring.memory.words_per_buffer(), 25);

        let mut odd = config(SampleEndMode::Manual);
        odd.pin_width = 3;
        odd.sample_size = 1001;
        let ring = CaptureRing::prepare(&odd).expect("prepares");
        assert_eq!(ring.memory.words_per_buffer(), 25);
    }

    #[test]
    fn oversized_allocation_reports_out_of_memory() {
        assert_eq!(
            SampleMemory::allocate(usize::MAX / 8).unwrap_err(),
            CaptureError::OutOfMemory
        );
    }

    #[test]
    fn buffer_full_capture_ends_after_one_pass() {
        let ring = CaptureRing::prepare(&config(SampleEndMode::BufferFull)).expect("prepares");
        for _ in 0..BUFFER_COUNT {
            assert!(!pump(&ring));
        }
        assert!(!ring.is_done());
        assert!(pump(&ring));
        assert!(ring.is_done());
        assert_eq!(ring.advances(), 5);
        let capture = ring.finish();
        assert_eq!(capture.valid_count(), 4);
        assert_eq!(capture.earliest(), 0);
    }

    #[test]
    fn manual_stop_before_rotation_keeps_filled_buffers_only() {
        let ring = CaptureRing::prepare(&config(SampleEndMode::Manual)).expect("prepares");
        assert!(!pump(&ring));
        assert!(!pump(&ring));
        ring.stop();
        pump_until_done(&ring);
        let capture = ring.finish();
        assert_eq!(capture.valid_count(), 2);
        assert_eq!(capture.earliest(), 0);
        assert_eq!(capture.chronological().collect::<Vec<_>>(), [0, 1]);
    }

    #[test]
    fn immediate_stop_leaves_nothing_valid() {
        let ring = CaptureRing::prepare(&config(SampleEndMode::Manual)).expect("prepares");
        ring.stop();
        pump_until_done(&ring);
        let capture = ring.finish();
        assert_eq!(capture.valid_count(), 0);
        assert_eq!(capture.chronological().count(), 0);
    }

    #[test]
    fn manual_stop_after_rotation_orders_from_the_final_offset() {
        let ring = CaptureRing::prepare(&config(SampleEndMode::Manual)).expect("prepares");
        for _ in 0..7 {
            assert!(!pump(&ring));
        }
        ring.stop();
        pump_until_done(&ring);
        let capture = ring.finish();
        assert_eq!(capture.valid_count(), 4);
        assert_eq!(capture.earliest(), 3);
        assert_eq!(capture.chronological().collect::<Vec<_>>(), [3, 0, 1, 2]);
    }

    #[test]
    fn advance_counter_saturates_once_rotation_is_proven() {
        let ring = CaptureRing::prepare(&config(SampleEndMode::Manual)).expect("prepares");
        for _ in 0..20 {
            pump(&ring);
        }
        assert_eq!(ring.advances(), ADVANCE_CEILING);
    }

    #[test]
    fn window_stops_retain_the_requested_most_recent_buffers() {
        for (window, earliest) in [(1, 2), (2, 1), (3, 0), (4, 3)] {
            let ring =
                CaptureRing::prepare(&config(SampleEndMode::EventWindow1)).expect("prepares");
            for _ in 0..7 {
                assert!(!pump(&ring));
            }
            ring.stop_in_window(window);
            pump_until_done(&ring);
            let capture = ring.finish();
            assert_eq!(capture.valid_count(), 4, "window {window}");
            assert_eq!(capture.earliest(), earliest, "window {window}");
        }
    }

    #[test]
    fn window_stop_before_rotation_keeps_the_early_fills() {
        let ring = CaptureRing::prepare(&config(SampleEndMode::EventWindow2)).expect("prepares");
        assert!(!pump(&ring));
        ring.stop_in_window(2);
        pump_until_done(&ring);
        // One fill before the stop, two more while draining toward the
        // sentinel.
        let capture = ring.finish();
        assert_eq!(capture.valid_count(), 3);
        assert_eq!(capture.earliest(), 0);
    }

    #[test]
    fn stop_handle_reaches_the_live_list() {
        let ring = CaptureRing::prepare(&config(SampleEndMode::EventWindow4)).expect("prepares");
        let stopper = ring.stopper();
        for _ in 0..7 {
            pump(&ring);
        }
        stopper.stop_in_window(4);
        pump_until_done(&ring);
        assert_eq!(ring.finish().earliest(), 3);
    }
}
