use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Longest chat message Twitch accepts, in characters
pub const MAX_MESSAGE_CHARS: usize = 500;

/// A single IRC line as sent by Twitch chat, tags included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    pub tags: HashMap<String, String>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Parse one IRC line (without the trailing CRLF). Returns `None` for blank lines.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        if rest.trim().is_empty() {
            return None;
        }

        let mut tags = HashMap::new();
        if let Some(tagged) = rest.strip_prefix('@') {
            let (raw_tags, remainder) = tagged.split_once(' ')?;
            for tag in raw_tags.split(';') {
                match tag.split_once('=') {
                    Some((key, value)) => tags.insert(key.to_string(), unescape_tag_value(value)),
                    None => tags.insert(tag.to_string(), String::new()),
                };
            }
            rest = remainder.trim_start();
        }

        let mut prefix = None;
        if let Some(prefixed) = rest.strip_prefix(':') {
            let (raw_prefix, remainder) = prefixed.split_once(' ')?;
            prefix = Some(raw_prefix.to_string());
            rest = remainder.trim_start();
        }

        let (command, mut rest) = match rest.split_once(' ') {
            Some((command, remainder)) => (command.to_string(), remainder),
            None => (rest.to_string(), ""),
        };

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
            match rest.split_once(' ') {
                Some((middle, remainder)) => {
                    params.push(middle.to_string());
                    rest = remainder;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Some(Self {
            tags,
            prefix,
            command,
            params,
        })
    }

    /// Nickname part of the prefix (`nick!user@host`)
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split(['!', '@']).next().unwrap_or(prefix))
    }

    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Inbound chat message relayed to listeners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub channel: String,
    pub user: String,
    pub message: String,
}

impl ChatMessage {
    /// Build a chat message from a PRIVMSG line; `/me` actions and other commands yield `None`
    pub fn from_privmsg(msg: &IrcMessage) -> Option<Self> {
        if msg.command != "PRIVMSG" || msg.params.len() < 2 {
            return None;
        }

        let text = msg.trailing()?;
        if text.starts_with("\u{1}ACTION ") {
            return None;
        }

        let user = msg.nick()?;

        Some(Self {
            channel: normalize_channel(&msg.params[0]),
            user: user.to_string(),
            message: text.to_string(),
        })
    }
}

/// Lower-case a channel name and strip any leading `#`
pub fn normalize_channel(name: &str) -> String {
    name.trim().trim_start_matches('#').to_lowercase()
}

/// Split text into chunks of at most `max_chars` characters, preferring whitespace boundaries
///
/// Each line of `text` is chunked on its own, so no chunk ever holds a CR or LF.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    text.split(['\r', '\n'])
        .flat_map(|line| split_line(line, max_chars))
        .collect()
}

fn split_line(line: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = line.trim();

    while rest.chars().count() > max_chars {
        let hard_cut = rest
            .char_indices()
            .nth(max_chars)
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        let cut = if rest[hard_cut..].starts_with(char::is_whitespace) {
            hard_cut
        } else {
            rest[..hard_cut]
                .rfind(char::is_whitespace)
                .filter(|&idx| idx > 0)
                .unwrap_or(hard_cut)
        };

        chunks.push(rest[..cut].trim_end().to_string());
        rest = rest[cut..].trim_start();
    }

    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

/// Format a PRIVMSG line for a channel; stray line breaks in `text` become spaces
pub fn privmsg_line(channel: &str, text: &str) -> String {
    let text = text.replace(['\r', '\n'], " ");
    format!("PRIVMSG #{} :{}", normalize_channel(channel), text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tagged_privmsg() {
        let line = "@badge-info=;color=#FF0000;display-name=Some\\sUser;mod=0 :someuser!someuser@someuser.tmi.twitch.tv PRIVMSG #testchan :hello there\r\n";
        let msg = IrcMessage::parse(line).unwrap();

        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#testchan", "hello there"]);
        assert_eq!(msg.nick(), Some("someuser"));
        assert_eq!(msg.tag("display-name"), Some("Some User"));
        assert_eq!(msg.tag("badge-info"), Some(""));

        let chat = ChatMessage::from_privmsg(&msg).unwrap();
        assert_eq!(
            chat,
            ChatMessage {
                channel: "testchan".to_string(),
                user: "someuser".to_string(),
                message: "hello there".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_ping_and_numeric() {
        let ping = IrcMessage::parse("PING :tmi.twitch.tv").unwrap();
        assert_eq!(ping.command, "PING");
        assert_eq!(ping.trailing(), Some("tmi.twitch.tv"));
        assert!(ping.prefix.is_none());

        let welcome = IrcMessage::parse(":tmi.twitch.tv 001 botname :Welcome, GLHF!").unwrap();
        assert_eq!(welcome.command, "001");
        assert_eq!(welcome.params, vec!["botname", "Welcome, GLHF!"]);

        assert!(IrcMessage::parse("\r\n").is_none());
    }

    #[test]
    fn test_action_and_other_commands_are_not_chat() {
        let action =
            IrcMessage::parse(":u!u@u.tmi.twitch.tv PRIVMSG #c :\u{1}ACTION waves\u{1}").unwrap();
        assert!(ChatMessage::from_privmsg(&action).is_none());

        let join = IrcMessage::parse(":u!u@u.tmi.twitch.tv JOIN #c").unwrap();
        assert!(ChatMessage::from_privmsg(&join).is_none());
    }

    #[test]
    fn test_split_message() {
        assert_eq!(split_message("short", 10), vec!["short"]);
        assert_eq!(split_message("aaaa bbbb cccc", 9), vec!["aaaa bbbb", "cccc"]);
        assert_eq!(split_message("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert!(split_message("   ", 4).is_empty());
        // multi-byte characters are never cut in half
        assert_eq!(split_message("ééééé", 2), vec!["éé", "éé", "é"]);
    }

    #[test]
    fn test_split_message_breaks_on_newlines() {
        let chunks = split_message("hi\r\nPRIVMSG #otherchan :injected", MAX_MESSAGE_CHARS);
        assert_eq!(chunks, vec!["hi", "PRIVMSG #otherchan :injected"]);

        assert_eq!(split_message("one\n\n\rtwo\n", 10), vec!["one", "two"]);
        assert!(split_message("\r\n \n", 10).is_empty());
        for chunk in split_message("aaaa\nbbbb cccc dddd", 9) {
            assert!(!chunk.contains(['\r', '\n']));
            assert!(chunk.chars().count() <= 9);
        }
    }

    #[test]
    fn test_privmsg_line() {
        assert_eq!(privmsg_line("#TestChan", "hi"), "PRIVMSG #testchan :hi");
        assert_eq!(
            privmsg_line("testchan", "hi\r\nQUIT"),
            "PRIVMSG #testchan :hi  QUIT"
        );
    }
}
