#![allow(clippy::module_name_repetitions)]

//! The command list consumed by the transfer engine.
//!
//! Each slot is one atomic word telling the engine what to do next: `0` is
//! the stop sentinel, `k + 1` means "fill buffer `k`". Stops are injected by
//! overwriting slots the engine has not reached yet, so arbitration is a
//! single atomic store.

use portable_atomic::{AtomicU32, AtomicUsize, Ordering};

use super::{BUFFER_COUNT, CaptureError};

/// Twice the live span, so an aligned ring always fits.
pub const SLOT_COUNT: usize = 2 * BUFFER_COUNT;

const STOP: u32 = 0;

fn fill_payload(buffer: usize) -> u32 {
    match u32::try_from(buffer) {
        Ok(index) => index + 1,
        Err(_) => u32::MAX,
    }
}

/// How the engine walks the list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainMode {
    /// Wrap within the live span until a sentinel is written in.
    Ring,
    /// Walk once into a pre-seeded sentinel.
    Linear,
}

/// A decoded command slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotCommand {
    Fill(usize),
    Stop,
}

/// Oversized slot array plus the consumption cursor.
///
/// The cursor counts consumed slots monotonically; the live-span offset of
/// the next consumption is always `consumed % BUFFER_COUNT`.
pub struct CommandList {
    slots: [AtomicU32; SLOT_COUNT],
    cursor: AtomicUsize,
    base: AtomicUsize,
    mode: ChainMode,
}

impl CommandList {
    #[must_use]
    pub const fn new(mode: ChainMode) -> Self {
        Self {
            slots: [const { AtomicU32::new(STOP) }; SLOT_COUNT],
            cursor: AtomicUsize::new(0),
            base: AtomicUsize::new(0),
            mode,
        }
    }

    /// Writes the initial commands for the chosen mode.
    ///
    /// Call only once the list sits at its final address: the ring span is
    /// chosen by slot address, and it must hold for the list's whole life.
    pub fn seed(&self) -> Result<(), CaptureError> {
        match self.mode {
            ChainMode::Ring => {
                let base = self.aligned_base().ok_or(CaptureError::RingAlignment)?;
                self.base.store(base, Ordering::Relaxed);
                for buffer in 0..BUFFER_COUNT {
                    self.slots[base + buffer].store(fill_payload(buffer), Ordering::Release);
                }
            }
            ChainMode::Linear => {
                self.base.store(0, Ordering::Relaxed);
                for buffer in 0..BUFFER_COUNT {
                    self.slots[buffer].store(fill_payload(buffer), Ordering::Release);
                }
                self.slots[BUFFER_COUNT].store(STOP, Ordering::Release);
            }
        }
        Ok(())
    }

    /// First slot index whose address starts an aligned `BUFFER_COUNT` span.
    ///
    /// A span-sized alignment lets ring-wrap hardware mask addresses instead
    /// of comparing bounds; the search mirrors that constraint.
    fn aligned_base(&self) -> Option<usize> {
        let stride = size_of::<AtomicU32>();
        let span = BUFFER_COUNT * stride;
        let start = self.slots.as_ptr() as usize;
        (0..BUFFER_COUNT).find(|index| (start + index * stride) % span == 0)
    }

    /// Count of slots consumed so far.
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Live-span offset of the next slot to be consumed.
    #[must_use]
    pub fn read_offset(&self) -> usize {
        self.consumed() % BUFFER_COUNT
    }

    /// Consumes the next slot and decodes it.
    pub fn next_command(&self) -> SlotCommand {
        let consumed = self.cursor.fetch_add(1, Ordering::AcqRel);
        let index = match self.mode {
            ChainMode::Ring => self.base.load(Ordering::Relaxed) + consumed % BUFFER_COUNT,
            // Past the sentinel the linear walk just re-reads it.
            ChainMode::Linear => consumed.min(BUFFER_COUNT),
        };
        match self.slots[index].load(Ordering::Acquire) {
            STOP => SlotCommand::Stop,
            payload => SlotCommand::Fill(payload as usize - 1),
        }
    }

    /// Overwrites every live slot with the sentinel.
    pub fn halt_everywhere(&self) {
        let base = self.base.load(Ordering::Relaxed);
        let live = match self.mode {
            ChainMode::Ring => BUFFER_COUNT,
            ChainMode::Linear => BUFFER_COUNT + 1,
        };
        for index in base..base + live {
            self.slots[index].store(STOP, Ordering::Release);
        }
    }

    /// Writes one sentinel so that, once reached, the `window` most recent
    /// buffers sit behind the final read position.
    pub fn halt_in_window(&self, window: u32) {
        let offset = (self.read_offset() + (BUFFER_COUNT - window as usize)) % BUFFER_COUNT;
        let base = self.base.load(Ordering::Relaxed);
        self.slots[base + offset].store(STOP, Ordering::Release);
    }
}
