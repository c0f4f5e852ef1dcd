//! Line-oriented command dispatch.
//!
//! One command per line. Successful commands emit their data or state lines
//! first and close with the `Y` acknowledgement; refusals are a single
//! `N <reason>` line. Lines containing `!` are transcript commentary and get
//! no response at all.

use core::fmt::Display;
use core::fmt::Write as _;

use heapless::String;

use crate::controls::CaptureConfig;
use crate::program::SamplingPeripheral;
use crate::ring::TransferEngine;
use crate::rle::LineSink;
use crate::trigger::EventSource;

use super::{PROBE_IDENTITY, Probe, ProbeError};

const RESPONSE_CAPACITY: usize = 160;

fn ack<S: LineSink>(sink: &mut S) {
    sink.line("Y");
}

fn nak<S: LineSink>(sink: &mut S, reason: impl Display) {
    let mut line: String<RESPONSE_CAPACITY> = String::new();
    let _ = write!(line, "N {reason}");
    sink.line(&line);
}

impl<E, P, V> Probe<E, P, V>
where
    P: SamplingPeripheral,
    E: TransferEngine<Source = P::Tap>,
    V: EventSource,
{
    /// Dispatches one assembled command line, writing responses to `sink`.
    pub fn handle_line<S: LineSink>(&mut self, line: &str, sink: &mut S) {
        if line.is_empty() || line.contains('!') {
            return;
        }
        match line {
            "p" => {
                sink.line(PROBE_IDENTITY);
                ack(sink);
            }
            "?" => {
                let mut state: String<4> = String::new();
                let _ = write!(state, "{}", self.state().code());
                sink.line(&state);
                ack(sink);
            }
            "s" => match self.stop() {
                Ok(()) => ack(sink),
                Err(error) => nak(sink, error),
            },
            "d" => match self.take_sample(sink) {
                Ok(()) => ack(sink),
                Err(error) => nak(sink, error),
            },
            _ if line.starts_with('g') => {
                let started = CaptureConfig::parse(line)
                    .map_err(ProbeError::from)
                    .and_then(|config| self.go(config));
                match started {
                    Ok(()) => ack(sink),
                    Err(error) => nak(sink, error),
                }
            }
            _ => {
                let mut reason: String<RESPONSE_CAPACITY> = String::new();
                let _ = write!(reason, "Unknown command {line}");
                nak(sink, reason);
            }
        }
    }
}
