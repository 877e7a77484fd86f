//! RFC 2812-flavoured line parsing.
//!
//! Best-effort by contract: malformed lines still produce a message (the
//! first word becomes the command), since grammar validation belongs to the
//! server, not the client engine.

use parley_core::message::{Message, MessageParser};

/// Parser for `[:prefix] COMMAND params [:trailing]` lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rfc2812Parser;

impl Rfc2812Parser {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl MessageParser for Rfc2812Parser {
    fn parse(&self, line: &str) -> Message {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        let prefix = match rest.strip_prefix(':') {
            Some(stripped) => {
                let (prefix, tail) = stripped.split_once(' ').unwrap_or((stripped, ""));
                rest = tail.trim_start_matches(' ');
                Some(prefix.to_string())
            }
            None => None,
        };

        let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            let (word, tail) = rest.split_once(' ').unwrap_or((rest, ""));
            params.push(word.to_string());
            rest = tail;
        }

        Message::new(line, prefix, command, params)
    }
}
