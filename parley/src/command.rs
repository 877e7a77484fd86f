//! Chat-command matching for `Receive` payloads.
//!
//! Matches PRIVMSG text of the form `"!name argument argument"` against a
//! declared prefix, name, and argument arity, and reports the outcome as an
//! explicit sum type — the dispatcher short-circuits on the first
//! [`CommandOutcome::Invoke`] or [`CommandOutcome::Reply`].

use parley_core::message::Message;

/// Outcome of matching a message against a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command matched; invoke the handler with these arguments.
    Invoke(Vec<String>),
    /// The command matched but needs a usage or help reply instead.
    Reply(String),
    /// The message is not this command.
    NotMatched,
}

/// A declared chat command: trigger, description, and argument arity.
#[derive(Debug, Clone)]
pub struct Command {
    trigger: String,
    description: String,
    required: Vec<String>,
    optional: Vec<String>,
}

impl Command {
    /// Declare a command. The trigger is `prefix + name`, matched
    /// case-insensitively.
    pub fn new(prefix: &str, name: &str, description: impl Into<String>) -> Self {
        Self {
            trigger: format!("{prefix}{}", name.to_lowercase()),
            description: description.into(),
            required: Vec::new(),
            optional: Vec::new(),
        }
    }

    /// Declare a required argument.
    #[must_use]
    pub fn arg(mut self, name: &str) -> Self {
        self.required.push(name.to_string());
        self
    }

    /// Declare an optional argument. Excess trailing words collapse into the
    /// final optional argument.
    #[must_use]
    pub fn opt_arg(mut self, name: &str) -> Self {
        self.optional.push(name.to_string());
        self
    }

    /// Usage line: required arguments in `<>`, optional in `[]`.
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::command::Command;
    ///
    /// let cmd = Command::new("!", "g", "Searches the web")
    ///     .arg("search_term")
    ///     .opt_arg("max_results");
    /// assert_eq!(cmd.usage(), "!g <search_term> [max_results]");
    /// ```
    #[must_use]
    pub fn usage(&self) -> String {
        let mut usage = self.trigger.clone();
        for name in &self.required {
            usage.push_str(&format!(" <{name}>"));
        }
        for name in &self.optional {
            usage.push_str(&format!(" [{name}]"));
        }
        usage
    }

    /// Help line: description plus usage.
    #[must_use]
    pub fn help(&self) -> String {
        format!("{}: {}", self.description, self.usage())
    }

    /// Match a message against this command.
    ///
    /// Only PRIVMSG text is considered. `--help` or `-h` as the sole
    /// argument yields the help reply; fewer words than required arguments
    /// yields the usage reply.
    #[must_use]
    pub fn evaluate(&self, message: &Message) -> CommandOutcome {
        if message.command() != "PRIVMSG" {
            return CommandOutcome::NotMatched;
        }
        let Some(text) = message.param(1) else {
            return CommandOutcome::NotMatched;
        };

        let text = text.trim();
        let (first, rest) = text.split_once(' ').unwrap_or((text, ""));
        if !first.eq_ignore_ascii_case(&self.trigger) {
            return CommandOutcome::NotMatched;
        }

        let args = self.split_args(rest);

        if args.len() == 1 && (args[0] == "--help" || args[0] == "-h") {
            return CommandOutcome::Reply(self.help());
        }
        if args.len() < self.required.len() {
            return CommandOutcome::Reply(format!("Usage: {}", self.usage()));
        }
        if self.max_args() == 0 && !args.is_empty() {
            return CommandOutcome::Reply(format!("Usage: {}", self.usage()));
        }

        CommandOutcome::Invoke(args)
    }

    fn max_args(&self) -> usize {
        self.required.len() + self.optional.len()
    }

    /// Split on whitespace into at most `max_args` words; the final word
    /// absorbs any excess.
    fn split_args(&self, text: &str) -> Vec<String> {
        let max = self.max_args();
        let mut args = Vec::new();
        let mut rest = text.trim();

        while !rest.is_empty() {
            if max > 0 && args.len() + 1 == max {
                args.push(rest.to_string());
                break;
            }
            match rest.split_once(char::is_whitespace) {
                Some((word, tail)) => {
                    args.push(word.to_string());
                    rest = tail.trim_start();
                }
                None => {
                    args.push(rest.to_string());
                    break;
                }
            }
        }

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::message::MessageParser;
    use parley_proto::Rfc2812Parser;

    fn privmsg(text: &str) -> Message {
        Rfc2812Parser::new().parse(&format!(":n!u@h PRIVMSG #chan :{text}\r\n"))
    }

    fn slap() -> Command {
        Command::new("!", "slap", "Slaps a user")
            .arg("nickname")
            .opt_arg("object")
    }

    #[test]
    fn invokes_with_parsed_arguments() {
        let outcome = slap().evaluate(&privmsg("!slap alice"));
        assert_eq!(outcome, CommandOutcome::Invoke(vec!["alice".to_string()]));
    }

    #[test]
    fn excess_words_collapse_into_final_optional() {
        let outcome = slap().evaluate(&privmsg("!slap alice a large trout"));
        assert_eq!(
            outcome,
            CommandOutcome::Invoke(vec!["alice".to_string(), "a large trout".to_string()])
        );
    }

    #[test]
    fn missing_required_argument_yields_usage() {
        let outcome = slap().evaluate(&privmsg("!slap"));
        assert_eq!(
            outcome,
            CommandOutcome::Reply("Usage: !slap <nickname> [object]".to_string())
        );
    }

    #[test]
    fn help_request_yields_help() {
        let outcome = slap().evaluate(&privmsg("!slap --help"));
        assert_eq!(
            outcome,
            CommandOutcome::Reply("Slaps a user: !slap <nickname> [object]".to_string())
        );
    }

    #[test]
    fn matches_case_insensitively() {
        let outcome = slap().evaluate(&privmsg("!SLAP alice"));
        assert_eq!(outcome, CommandOutcome::Invoke(vec!["alice".to_string()]));
    }

    #[test]
    fn other_commands_do_not_match() {
        assert_eq!(slap().evaluate(&privmsg("!slapx y")), CommandOutcome::NotMatched);
        assert_eq!(slap().evaluate(&privmsg("hello")), CommandOutcome::NotMatched);

        let topic = Rfc2812Parser::new().parse(":n TOPIC #chan :!slap x\r\n");
        assert_eq!(slap().evaluate(&topic), CommandOutcome::NotMatched);
    }
}
