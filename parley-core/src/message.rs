//! The message value handed to plugins, and the parser seam.
//!
//! The engine does not own a wire grammar. It requires only a message shape
//! (command, ordered parameters, optional source prefix) and a
//! [`MessageParser`] strategy supplied at network construction, so a
//! different protocol dialect can be substituted without touching the
//! engine.

use std::fmt;

/// An immutable, parsed protocol message.
///
/// The trailing text of a line, when present, is folded into `params` as the
/// final parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    raw: String,
    prefix: Option<String>,
    command: String,
    params: Vec<String>,
}

impl Message {
    /// Build a message. The command is normalized to uppercase.
    pub fn new(
        raw: impl Into<String>,
        prefix: Option<String>,
        command: impl Into<String>,
        params: Vec<String>,
    ) -> Self {
        Self {
            raw: raw.into(),
            prefix,
            command: command.into().to_ascii_uppercase(),
            params,
        }
    }

    /// The raw wire line this message was parsed from.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The source prefix, without its leading `:`.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// The uppercased command identifier.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The ordered parameter list, trailing text included as the last entry.
    #[must_use]
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// A single parameter by position.
    #[must_use]
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// The last parameter, which carries the trailing text when present.
    #[must_use]
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// The nickname portion of the source prefix (`nick!user@host`).
    #[must_use]
    pub fn source_nick(&self) -> Option<&str> {
        let prefix = self.prefix()?;
        Some(prefix.split(['!', '@']).next().unwrap_or(prefix))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw.trim_end_matches(['\r', '\n']))
    }
}

/// Strategy turning one wire line into a [`Message`].
///
/// Implementations must accept arbitrary input; a line that does not match
/// the dialect's grammar still yields a best-effort message rather than an
/// error, since full grammar validation is the codec collaborator's job.
pub trait MessageParser: Send + Sync {
    fn parse(&self, line: &str) -> Message;
}

impl<F> MessageParser for F
where
    F: Fn(&str) -> Message + Send + Sync,
{
    fn parse(&self, line: &str) -> Message {
        self(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_trailing_into_params() {
        let msg = Message::new(
            ":n!u@h PRIVMSG #chan :hello there\r\n",
            Some("n!u@h".to_string()),
            "privmsg",
            vec!["#chan".to_string(), "hello there".to_string()],
        );

        assert_eq!(msg.command(), "PRIVMSG");
        assert_eq!(msg.param(0), Some("#chan"));
        assert_eq!(msg.trailing(), Some("hello there"));
        assert_eq!(msg.source_nick(), Some("n"));
    }

    #[test]
    fn display_strips_line_terminators() {
        let msg = Message::new("PING :x\r\n", None, "PING", vec!["x".to_string()]);
        assert_eq!(msg.to_string(), "PING :x");
    }
}
