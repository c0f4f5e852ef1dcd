#![allow(clippy::module_name_repetitions)]

//! The probe device context and capture lifecycle.
//!
//! One [`Probe`] owns the hardware-facing collaborators and the lifecycle
//! state; nothing lives in statics. Capture progress is poll-driven: the
//! surrounding loop calls [`Probe::is_stop_complete`] between commands and
//! nothing here blocks.

pub mod commands;

use core::fmt;

use crate::controls::{CaptureConfig, ControlsError};
use crate::program::capture::assemble_sampler;
use crate::program::{InstallError, ProgramOverflow, SamplingPeripheral};
use crate::ring::{CaptureError, CaptureRing, TransferEngine};
use crate::rle::{self, LineSink};
use crate::trigger::{EventSource, EventWindowTrigger};

/// Identity line reported for the `p` command.
pub const PROBE_IDENTITY: &str = "LOGICPROBE-1";

/// Lifecycle states; the numeric codes are part of the wire protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeState {
    Idle = 0,
    Sampling = 1,
    StoppingSampling = 2,
    SamplingDone = 3,
}

impl ProbeState {
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Sampling => "Sampling",
            Self::StoppingSampling => "StoppingSampling",
            Self::SamplingDone => "SamplingDone",
        }
    }
}

impl fmt::Display for ProbeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.code())
    }
}

/// Anything a probe operation can refuse with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeError {
    BadState {
        expected: ProbeState,
        actual: ProbeState,
    },
    Parse(ControlsError),
    Capture(CaptureError),
    Program(ProgramOverflow),
    Install(InstallError),
}

impl From<ControlsError> for ProbeError {
    fn from(error: ControlsError) -> Self {
        Self::Parse(error)
    }
}

impl From<CaptureError> for ProbeError {
    fn from(error: CaptureError) -> Self {
        Self::Capture(error)
    }
}

impl From<ProgramOverflow> for ProbeError {
    fn from(error: ProgramOverflow) -> Self {
        Self::Program(error)
    }
}

impl From<InstallError> for ProbeError {
    fn from(error: InstallError) -> Self {
        Self::Install(error)
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadState { expected, actual } => {
                write!(f, "Bad state - expecting {expected} - was {actual}")
            }
            Self::Parse(error) => write!(f, "Command parse failure - {error}"),
            Self::Capture(error) => write!(f, "Failure initiating sampling - {error}"),
            Self::Program(error) => write!(f, "Failure initiating sampling - {error}"),
            Self::Install(error) => write!(f, "Failure initiating sampling - {error}"),
        }
    }
}

struct ActiveCapture {
    config: CaptureConfig,
    ring: CaptureRing,
    trigger: Option<EventWindowTrigger>,
}

/// The probe: transfer engine, sampling peripheral, event source, state.
pub struct Probe<E, P, V> {
    engine: E,
    sampler: P,
    events: V,
    state: ProbeState,
    capture: Option<ActiveCapture>,
}

impl<E, P, V> Probe<E, P, V>
where
    P: SamplingPeripheral,
    E: TransferEngine<Source = P::Tap>,
    V: EventSource,
{
    #[must_use]
    pub fn new(engine: E, sampler: P, events: V) -> Self {
        Self {
            engine,
            sampler,
            events,
            state: ProbeState::Idle,
            capture: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> ProbeState {
        self.state
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn sampler_mut(&mut self) -> &mut P {
        &mut self.sampler
    }

    pub fn events_mut(&mut self) -> &mut V {
        &mut self.events
    }

    /// Starts a capture. On any failure nothing keeps running and the
    /// probe stays `Idle`.
    pub fn go(&mut self, config: CaptureConfig) -> Result<(), ProbeError> {
        self.expect_state(ProbeState::Idle)?;
        let ring = CaptureRing::prepare(&config)?;
        let plan = assemble_sampler(&config)?;
        let divider = plan.divider(self.sampler.system_clock_hz());
        plan.program
            .clear_and_load(&mut self.sampler, plan.binding, divider)?;
        let tap = self.sampler.tap();
        ring.arm(&mut self.engine, tap);
        self.sampler.start();
        self.engine.start();
        // The event stop arms last, once transfers are live, and only for
        // the end modes that define a window.
        let trigger = match (config.event_trigger, config.end_mode.event_window()) {
            (Some(condition), Some(window)) => Some(EventWindowTrigger::arm(
                &mut self.events,
                condition,
                window,
                ring.stopper(),
            )),
            _ => None,
        };
        self.capture = Some(ActiveCapture {
            config,
            ring,
            trigger,
        });
        self.state = ProbeState::Sampling;
        Ok(())
    }

    /// Requests a manual stop; the engine halts at its next slot.
    pub fn stop(&mut self) -> Result<(), ProbeError> {
        self.expect_state(ProbeState::Sampling)?;
        if let Some(capture) = &self.capture {
            capture.ring.stop();
        }
        self.state = ProbeState::StoppingSampling;
        Ok(())
    }

    /// Polls capture progress, advancing the state machine. Returns whether
    /// sampling has fully drained.
    pub fn is_stop_complete(&mut self) -> bool {
        if let Some(capture) = &self.capture {
            if self.state == ProbeState::Sampling
                && capture
                    .trigger
                    .as_ref()
                    .is_some_and(EventWindowTrigger::has_fired)
            {
                self.state = ProbeState::StoppingSampling;
            }
            if matches!(
                self.state,
                ProbeState::Sampling | ProbeState::StoppingSampling
            ) && capture.ring.is_done()
            {
                self.state = ProbeState::SamplingDone;
            }
        }
        self.state == ProbeState::SamplingDone
    }

    /// Encodes the finished capture through `sink` and releases everything.
    pub fn take_sample<S: LineSink>(&mut self, sink: &mut S) -> Result<(), ProbeError> {
        self.expect_state(ProbeState::SamplingDone)?;
        let Some(capture) = self.capture.take() else {
            return Err(ProbeError::BadState {
                expected: ProbeState::SamplingDone,
                actual: self.state,
            });
        };
        let buffers = capture.ring.finish();
        rle::encode_capture(&capture.config, &buffers, sink);
        self.engine.disarm();
        self.sampler.stop();
        self.events.disarm();
        self.state = ProbeState::Idle;
        Ok(())
    }

    fn expect_state(&self, expected: ProbeState) -> Result<(), ProbeError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ProbeError::BadState {
                expected,
                actual: self.state,
            })
        }
    }
}
