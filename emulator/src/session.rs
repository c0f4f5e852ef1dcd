use probe_core::rle::LineSink;
use probe_core::sim::{SimProbe, WordPattern, sim_probe};

/// One help line per host command and simulator directive.
pub const HELP_TOPICS: &[(&str, &str)] = &[
    ("p", "p                  - report the probe identity"),
    ("?", "?                  - report the numeric capture state"),
    ("g", "g-<fields>         - configure and start a capture"),
    ("s", "s                  - request a manual stop"),
    ("d", "d                  - dump the capture as run-length text"),
    (
        "!step",
        "!step [n]          - move up to n buffers through the transfer engine",
    ),
    (
        "!event",
        "!event             - raise the simulated trigger pin",
    ),
    (
        "!pattern",
        "!pattern <word..>  - cycle the sampler through the given 32-bit words",
    ),
    ("!help", "!help              - show this summary"),
];

/// An interactive probe session: a simulated probe plus the `!` directives
/// that stand in for the hardware the real device reacts to.
pub struct Session {
    probe: SimProbe,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self {
            probe: sim_probe(),
        }
    }

    /// Feeds one host line to the probe and returns the lines to print.
    ///
    /// Lines starting with `!` are emulator directives and never reach the
    /// probe. Everything else follows the serial protocol, so the responses
    /// are exactly what the device would write back.
    pub fn handle_command(&mut self, line: &str) -> Vec<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        // The device polls transfer completion from its main loop; the
        // emulator polls once per host line instead.
        self.probe.is_stop_complete();

        if let Some(directive) = trimmed.strip_prefix('!') {
            return self.handle_directive(directive);
        }

        let mut sink = ResponseSink::default();
        self.probe.handle_line(trimmed, &mut sink);
        sink.lines
    }

    fn handle_directive(&mut self, directive: &str) -> Vec<String> {
        let mut parts = directive.split_ascii_whitespace();
        match parts.next() {
            Some("step") => {
                let count = match parts.next() {
                    None => 1,
                    Some(raw) => match raw.parse::<usize>() {
                        Ok(count) => count,
                        Err(_) => {
                            return vec![format!("step wants a buffer count, got `{raw}`")];
                        }
                    },
                };
                let stepped = self.probe.engine_mut().run_buffers(count);
                vec![format!("stepped {stepped} buffer(s)")]
            }
            Some("event") => {
                self.probe.events_mut().raise();
                vec!["event pin raised".to_string()]
            }
            Some("pattern") => {
                let mut words = Vec::new();
                for raw in parts {
                    let Some(word) = parse_word(raw) else {
                        return vec![format!("pattern wants 32-bit words, got `{raw}`")];
                    };
                    words.push(word);
                }
                if words.is_empty() {
                    return vec!["pattern wants at least one word".to_string()];
                }
                let count = words.len();
                self.probe
                    .sampler_mut()
                    .set_pattern(WordPattern::cycle(&words));
                vec![format!("sampling a {count} word cycle")]
            }
            Some("help") => HELP_TOPICS
                .iter()
                .map(|(_, detail)| (*detail).to_string())
                .collect(),
            Some(other) => vec![format!("Unknown directive `!{other}`")],
            None => vec!["Unknown directive `!`".to_string()],
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct ResponseSink {
    lines: Vec<String>,
}

impl LineSink for ResponseSink {
    fn line(&mut self, text: &str) {
        self.lines.push(text.to_string());
    }
}

/// Accepts decimal words or hex words with a `0x` prefix.
fn parse_word(raw: &str) -> Option<u32> {
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        raw.parse().ok()
    }
}
