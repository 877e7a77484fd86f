//! Command builders: structured requests to outbound wire lines.
//!
//! Every builder returns one complete `\r\n`-terminated line ready for the
//! outbound queue.

/// NICK command.
#[must_use]
pub fn nick(nickname: &str) -> String {
    format!("NICK {nickname}\r\n")
}

/// USER command.
#[must_use]
pub fn user(username: &str, realname: &str) -> String {
    format!("USER {username} 0 * :{realname}\r\n")
}

/// JOIN command, with an optional channel key.
#[must_use]
pub fn join(channel: &str, key: Option<&str>) -> String {
    match key {
        Some(key) => format!("JOIN {channel} {key}\r\n"),
        None => format!("JOIN {channel}\r\n"),
    }
}

/// PART command, with an optional reason.
#[must_use]
pub fn part(channel: &str, reason: Option<&str>) -> String {
    match reason {
        Some(reason) => format!("PART {channel} :{reason}\r\n"),
        None => format!("PART {channel}\r\n"),
    }
}

/// PRIVMSG command.
#[must_use]
pub fn privmsg(target: &str, text: &str) -> String {
    format!("PRIVMSG {target} :{text}\r\n")
}

/// NOTICE command.
#[must_use]
pub fn notice(target: &str, text: &str) -> String {
    format!("NOTICE {target} :{text}\r\n")
}

/// PING command.
#[must_use]
pub fn ping(token: &str) -> String {
    format!("PING :{token}\r\n")
}

/// PONG command answering a PING.
#[must_use]
pub fn pong(token: &str) -> String {
    format!("PONG :{token}\r\n")
}

/// QUIT command, with an optional reason.
#[must_use]
pub fn quit(reason: Option<&str>) -> String {
    match reason {
        Some(reason) => format!("QUIT :{reason}\r\n"),
        None => "QUIT\r\n".to_string(),
    }
}

/// MODE command.
#[must_use]
pub fn mode(target: &str, modes: &str) -> String {
    format!("MODE {target} {modes}\r\n")
}

/// TOPIC command; omit `topic` to query.
#[must_use]
pub fn topic(channel: &str, topic: Option<&str>) -> String {
    match topic {
        Some(topic) => format!("TOPIC {channel} :{topic}\r\n"),
        None => format!("TOPIC {channel}\r\n"),
    }
}

/// NAMES command.
#[must_use]
pub fn names(channel: &str) -> String {
    format!("NAMES {channel}\r\n")
}

/// WHOIS command.
#[must_use]
pub fn whois(nickname: &str) -> String {
    format!("WHOIS {nickname}\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_terminate_lines() {
        assert_eq!(nick("parley"), "NICK parley\r\n");
        assert_eq!(user("parley", "Parley Bot"), "USER parley 0 * :Parley Bot\r\n");
        assert_eq!(privmsg("#chan", "hi"), "PRIVMSG #chan :hi\r\n");
        assert_eq!(pong("abc"), "PONG :abc\r\n");
    }

    #[test]
    fn optional_arguments() {
        assert_eq!(join("#chan", None), "JOIN #chan\r\n");
        assert_eq!(join("#chan", Some("sekrit")), "JOIN #chan sekrit\r\n");
        assert_eq!(quit(None), "QUIT\r\n");
        assert_eq!(quit(Some("bye")), "QUIT :bye\r\n");
        assert_eq!(topic("#chan", None), "TOPIC #chan\r\n");
    }
}
