#![allow(clippy::module_name_repetitions)]

//! Single-shot event trigger that truncates a capture.
//!
//! Arming registers a pin watch with an [`EventSource`]. The first signal
//! injects a window stop into the live command list from signal context and
//! latches a fired flag the probe polls; further signals do nothing.

use portable_atomic::{AtomicBool, Ordering};
use portable_atomic_util::Arc;

use crate::controls::PinTrigger;
use crate::ring::StopHandle;

/// Callback an event source invokes from signal context.
pub trait EventListener {
    /// Handles one event. Returning `true` tells the source the watch is
    /// finished and can be released.
    fn on_event(&self) -> bool;
}

/// Edge/level watch provider for one pin.
pub trait EventSource {
    /// Registers a listener for the given pin condition, replacing any
    /// previous watch.
    fn watch<L: EventListener + 'static>(&mut self, condition: PinTrigger, listener: L);

    /// Drops the current watch, if any.
    fn disarm(&mut self);
}

struct TriggerShared {
    armed: AtomicBool,
    fired: AtomicBool,
}

struct WindowStopListener {
    shared: Arc<TriggerShared>,
    stopper: StopHandle,
    window: u32,
}

impl EventListener for WindowStopListener {
    fn on_event(&self) -> bool {
        // The swap makes the stop single-shot even if the source delivers
        // a burst before releasing the watch.
        if self.shared.armed.swap(false, Ordering::AcqRel) {
            self.stopper.stop_in_window(self.window);
            self.shared.fired.store(true, Ordering::Release);
        }
        true
    }
}

/// An armed event-window stop.
pub struct EventWindowTrigger {
    shared: Arc<TriggerShared>,
}

impl EventWindowTrigger {
    /// Arms the watch; on the first matching event the capture is stopped
    /// so its `window` most recent buffers are retained.
    pub fn arm<V: EventSource>(
        source: &mut V,
        condition: PinTrigger,
        window: u32,
        stopper: StopHandle,
    ) -> Self {
        let shared = Arc::new(TriggerShared {
            armed: AtomicBool::new(true),
            fired: AtomicBool::new(false),
        });
        source.watch(
            condition,
            WindowStopListener {
                shared: Arc::clone(&shared),
                stopper,
                window,
            },
        );
        Self { shared }
    }

    /// Whether the stop has been injected.
    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.shared.fired.load(Ordering::Acquire)
    }
}
