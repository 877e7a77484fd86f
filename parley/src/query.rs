//! Request/reply correlation over the asynchronous event stream.
//!
//! A [`Query`] is a transient plugin: registered before the triggering
//! request goes out, it accumulates the bounded reply sequence the request
//! produces, then is unregistered. Queries are never reused.
//!
//! Two termination modes exist and are deliberately kept distinct:
//! - With end markers configured, accumulation stops at an end marker once
//!   at least one reply has been collected.
//! - With no end markers, accumulation stops as soon as the first non-empty
//!   batch of replies has arrived (implicit single-batch mode).

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use parley_core::message::Message;
use thiserror::Error;
use tracing::trace;

use crate::plugin::{Event, Plugin, PluginContext, PluginError};

/// Default bound on how long [`Query::messages`] waits.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors a query can capture. Once captured, every later `messages` call
/// re-raises the same error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The server answered with a configured error marker.
    #[error("error reply {code}: {text}")]
    ErrorReply { code: String, text: String },

    /// No terminal condition fired within the wait bound.
    #[error("query timed out after {0:?}")]
    TimedOut(Duration),
}

impl QueryError {
    /// The offending marker of an error reply.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::ErrorReply { code, .. } => Some(code),
            Self::TimedOut(_) => None,
        }
    }
}

#[derive(Default)]
struct QueryState {
    started: bool,
    run: bool,
    messages: Vec<Message>,
    error: Option<QueryError>,
}

/// A transient plugin correlating one request with its reply sequence.
pub struct Query {
    start: Option<String>,
    replies: Vec<String>,
    ends: Vec<String>,
    errors: Vec<String>,
    timeout: Duration,
    tx: flume::Sender<Message>,
    rx: flume::Receiver<Message>,
    state: Mutex<QueryState>,
}

impl Query {
    /// Create a query with no markers configured.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            start: None,
            replies: Vec::new(),
            ends: Vec::new(),
            errors: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            tx,
            rx,
            state: Mutex::new(QueryState::default()),
        }
    }

    /// Gate accumulation behind a start marker.
    #[must_use]
    pub fn with_start(mut self, marker: impl Into<String>) -> Self {
        self.start = Some(marker.into());
        self
    }

    /// Set the reply markers to accumulate.
    #[must_use]
    pub fn with_replies<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.replies = markers.into_iter().map(Into::into).collect();
        self
    }

    /// Set the end markers terminating accumulation.
    #[must_use]
    pub fn with_ends<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ends = markers.into_iter().map(Into::into).collect();
        self
    }

    /// Set the error markers aborting the query.
    #[must_use]
    pub fn with_errors<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.errors = markers.into_iter().map(Into::into).collect();
        self
    }

    /// Bound the wait. The default is [`DEFAULT_TIMEOUT`].
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Feed a message to the query directly.
    ///
    /// Dispatch does this through the plugin implementation; tests and
    /// out-of-band callers can use it as well.
    pub fn push(&self, message: Message) {
        let _ = self.tx.send(message);
    }

    /// The accumulated replies, waiting for the terminal condition first if
    /// the query has not run yet.
    ///
    /// # Errors
    ///
    /// Re-raises a captured [`QueryError`] on this and every later call;
    /// no partial results are returned after an error.
    pub fn messages(&self) -> Result<Vec<Message>, QueryError> {
        let mut state = self.state.lock();

        if !state.run {
            self.wait(&mut state);
            state.run = true;
        }

        match &state.error {
            Some(error) => Err(error.clone()),
            None => Ok(state.messages.clone()),
        }
    }

    fn wait(&self, state: &mut QueryState) {
        let deadline = Instant::now() + self.timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let message = match self.rx.recv_timeout(remaining) {
                Ok(message) => message,
                Err(_) => {
                    state.messages.clear();
                    state.error = Some(QueryError::TimedOut(self.timeout));
                    return;
                }
            };

            if self.classify(state, &message) {
                return;
            }

            // Implicit single-batch mode: with no end marker configured,
            // stop once the currently available batch yielded any reply.
            if self.ends.is_empty() {
                while let Ok(message) = self.rx.try_recv() {
                    if self.classify(state, &message) {
                        return;
                    }
                }
                if !state.messages.is_empty() {
                    return;
                }
            }
        }
    }

    /// Apply one message to the accumulation state. Returns `true` when a
    /// terminal condition fired.
    fn classify(&self, state: &mut QueryState, message: &Message) -> bool {
        let command = message.command();

        if self.replies.iter().any(|m| m == command) {
            if self.started(state) {
                state.messages.push(message.clone());
            }
        } else if self.start.as_deref() == Some(command) {
            state.started = true;
        } else if self.ends.iter().any(|m| m == command) {
            if !state.messages.is_empty() {
                trace!(marker = command, "query complete");
                return true;
            }
        } else if self.errors.iter().any(|m| m == command) {
            state.messages.clear();
            state.error = Some(QueryError::ErrorReply {
                code: command.to_string(),
                text: message.to_string(),
            });
            return true;
        }

        false
    }

    fn started(&self, state: &QueryState) -> bool {
        self.start.is_none() || state.started
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for Query {
    fn call(&self, event: &Event, _ctx: &PluginContext) -> Result<(), PluginError> {
        if let Event::Receive(message) = event {
            self.push(message.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(command: &str) -> Message {
        Message::new(format!("{command} x\r\n"), None, command, vec!["x".to_string()])
    }

    fn whois_style_query() -> Query {
        Query::new()
            .with_start("START")
            .with_replies(["ONE", "TWO"])
            .with_ends(["END"])
            .with_errors(["ERR"])
            .with_timeout(Duration::from_secs(2))
    }

    #[test]
    fn accumulates_replies_between_start_and_end() {
        let query = whois_style_query();
        for command in ["START", "ONE", "IGNORE", "TWO", "END"] {
            query.push(message(command));
        }

        let messages = query.messages().unwrap();
        let commands: Vec<&str> = messages.iter().map(Message::command).collect();
        assert_eq!(commands, vec!["ONE", "TWO"]);
    }

    #[test]
    fn replies_before_start_are_ignored() {
        let query = whois_style_query();
        for command in ["ONE", "START", "TWO", "END"] {
            query.push(message(command));
        }

        let messages = query.messages().unwrap();
        let commands: Vec<&str> = messages.iter().map(Message::command).collect();
        assert_eq!(commands, vec!["TWO"]);
    }

    #[test]
    fn end_marker_requires_a_collected_reply() {
        let query = whois_style_query();
        for command in ["START", "END", "ONE", "END"] {
            query.push(message(command));
        }

        let messages = query.messages().unwrap();
        let commands: Vec<&str> = messages.iter().map(Message::command).collect();
        assert_eq!(commands, vec!["ONE"]);
    }

    #[test]
    fn error_marker_aborts_and_memoizes() {
        let query = whois_style_query();
        for command in ["START", "ONE", "ERR"] {
            query.push(message(command));
        }

        let first = query.messages().unwrap_err();
        assert_eq!(first.code(), Some("ERR"));

        // Every later access re-raises the same captured error.
        let second = query.messages().unwrap_err();
        assert_eq!(first, second);
    }

    #[test]
    fn single_batch_mode_stops_after_first_non_empty_batch() {
        let query = Query::new()
            .with_replies(["ONE"])
            .with_timeout(Duration::from_secs(2));
        query.push(message("IGNORE"));
        query.push(message("ONE"));

        let messages = query.messages().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].command(), "ONE");
    }

    #[test]
    fn times_out_without_a_terminal_condition() {
        let query = Query::new()
            .with_replies(["ONE"])
            .with_ends(["END"])
            .with_timeout(Duration::from_millis(50));

        let error = query.messages().unwrap_err();
        assert!(matches!(error, QueryError::TimedOut(_)));
    }
}
