//! Event-window captures: which buffers survive relative to the event.
//!
//! Each generated word carries a distinct high-run marker, so the dumped
//! lines say exactly which fills were retained and in what order.

use probe_core::rle::LineSink;
use probe_core::sim::{SimProbe, WordPattern, sim_probe};

#[derive(Default)]
struct Transcript {
    lines: Vec<String>,
}

impl LineSink for Transcript {
    fn line(&mut self, text: &str) {
        self.lines.push(text.to_owned());
    }
}

fn respond(probe: &mut SimProbe, line: &str) -> Vec<String> {
    let mut sink = Transcript::default();
    probe.handle_line(line, &mut sink);
    sink.lines
}

/// Word whose top `high` bits are set; its pin stream encodes as
/// `<high>H<32-high>L`.
fn marker(high: u32) -> u32 {
    u32::MAX << (32 - high)
}

fn token(high: u32) -> String {
    let high_part = if high == 1 {
        "H".to_owned()
    } else {
        format!("{high}H")
    };
    format!("{high_part}{}L", 32 - high)
}

/// Runs one event-window capture: seven fills, then the event, then the
/// drain to the injected sentinel. Returns the dumped data line.
fn run_window(end_mode_code: u32) -> String {
    let mut probe = sim_probe();
    let markers: Vec<u32> = (1..=10).map(marker).collect();
    probe
        .sampler_mut()
        .set_pattern(WordPattern::cycle(&markers));

    let line = format!("g-16-1-19200-0-0-0-1-17-3-{end_mode_code}-128");
    assert_eq!(respond(&mut probe, &line), ["Y"]);
    assert!(probe.events_mut().is_watching());

    assert_eq!(probe.engine_mut().run_buffers(7), 7);
    probe.events_mut().raise();
    assert!(!probe.events_mut().is_watching());
    while probe.engine_mut().step_buffer() {}
    assert!(probe.is_stop_complete());

    let mut dumped = respond(&mut probe, "d");
    assert_eq!(dumped.len(), 3, "header, data, ack");
    assert_eq!(dumped[0], "# 16");
    assert_eq!(dumped[2], "Y");
    dumped.swap_remove(1)
}

fn expected(fills: [u32; 4]) -> String {
    fills.iter().map(|&fill| token(fill)).collect()
}

#[test]
fn window_one_keeps_the_event_buffer_and_three_after() {
    // Event lands during the seventh fill; capture runs three more buffers.
    assert_eq!(run_window(2), expected([7, 8, 9, 10]));
}

#[test]
fn window_two_keeps_one_before_and_two_after() {
    assert_eq!(run_window(3), expected([6, 7, 8, 9]));
}

#[test]
fn window_three_keeps_two_before_and_one_after() {
    assert_eq!(run_window(4), expected([5, 6, 7, 8]));
}

#[test]
fn window_four_keeps_the_four_buffers_up_to_the_event() {
    assert_eq!(run_window(5), expected([4, 5, 6, 7]));
}

#[test]
fn event_before_rotation_keeps_the_early_fills() {
    let mut probe = sim_probe();
    let markers: Vec<u32> = (1..=10).map(marker).collect();
    probe
        .sampler_mut()
        .set_pattern(WordPattern::cycle(&markers));

    assert_eq!(respond(&mut probe, "g-16-1-19200-0-0-0-1-17-3-5-128"), ["Y"]);
    probe.engine_mut().run_buffers(1);
    probe.events_mut().raise();
    while probe.engine_mut().step_buffer() {}
    assert!(probe.is_stop_complete());

    let dumped = respond(&mut probe, "d");
    assert_eq!(dumped, ["# 16".to_owned(), token(1), "Y".to_owned()]);
}

#[test]
fn event_watch_survives_until_the_dump_releases_it() {
    let mut probe = sim_probe();
    assert_eq!(respond(&mut probe, "g-16-1-19200-0-0-0-1-17-3-2-128"), ["Y"]);
    // Manual stop without any event: the watch stays armed until release.
    assert_eq!(respond(&mut probe, "s"), ["Y"]);
    while probe.engine_mut().step_buffer() {}
    assert!(probe.is_stop_complete());
    assert!(probe.events_mut().is_watching());
    respond(&mut probe, "d");
    assert!(!probe.events_mut().is_watching());
}
