//! Replays three canned capture sessions against the simulated probe and
//! prints each exchange the way the interactive emulator would.

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::Session;

fn main() {
    replay("buffer-full capture", &buffer_full_script());
    replay("manual stop", &manual_stop_script());
    replay("event-window stop", &event_window_script());
}

fn replay(title: &str, script: &[&str]) {
    println!("=== {title} ===");
    let mut session = Session::new();
    for line in script {
        println!("> {line}");
        for response in session.handle_command(line) {
            println!("{response}");
        }
    }
    println!();
}

fn buffer_full_script() -> Vec<&'static str> {
    vec![
        "p",
        "!pattern 0xFFFF0000",
        "g-16-1-19200-0-0-0-0-0-0-1-128",
        "!step 5",
        "?",
        "d",
        "?",
    ]
}

fn manual_stop_script() -> Vec<&'static str> {
    vec![
        "!pattern 0xF0F0F0F0",
        "g-16-1-19200-0-0-0-0-0-0-0-256",
        "!step 3",
        "s",
        "!step 1",
        "d",
    ]
}

fn event_window_script() -> Vec<&'static str> {
    vec![
        "!pattern 0x80000000 0xC0000000 0xE0000000 0xF0000000 0xF8000000 \
         0xFC000000 0xFE000000 0xFF000000 0xFF800000 0xFFC00000",
        "g-16-1-19200-0-0-0-1-17-3-3-128",
        "!step 7",
        "!event",
        "!step 4",
        "d",
    ]
}
