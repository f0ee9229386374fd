//! Stdin command parsing for headless mode

use chatlink_core::UserId;

/// One line of stdin input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadlessCommand {
    /// `open <peer>`: select a thread and load its newest page.
    Open(UserId),
    /// `send <peer> <text...>`
    Send { peer: UserId, text: String },
    /// `history`: print the open thread.
    History,
    /// `more`: load the next older page of the open thread.
    More,
    /// `retry`: resend failed messages of the open thread.
    Retry,
    /// `friends`: refetch and print friend records.
    Friends,
    /// `search <query>`
    Search(String),
    /// `accept <request id>`
    Accept(i64),
    /// `reject <request id>`
    Reject(i64),
    /// `add <user id>`: send a friend request.
    Add(UserId),
    Quit,
}

impl HeadlessCommand {
    /// Parse one line. Empty lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word {
            "open" => Self::Open(parse_user(rest)?),
            "send" => {
                let (peer, text) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| "usage: send <peer> <text>".to_string())?;
                let text = text.trim();
                if text.is_empty() {
                    return Err("usage: send <peer> <text>".to_string());
                }
                Self::Send {
                    peer: parse_user(peer)?,
                    text: text.to_string(),
                }
            }
            "history" => Self::History,
            "more" => Self::More,
            "retry" => Self::Retry,
            "friends" => Self::Friends,
            "search" => Self::Search(rest.to_string()),
            "accept" => Self::Accept(parse_id(rest)?),
            "reject" => Self::Reject(parse_id(rest)?),
            "add" => Self::Add(parse_user(rest)?),
            "q" | "quit" => Self::Quit,
            other => return Err(format!("unknown command: {other}")),
        };
        Ok(Some(command))
    }
}

fn parse_id(raw: &str) -> Result<i64, String> {
    raw.parse()
        .map_err(|_| format!("expected a numeric id, got `{raw}`"))
}

fn parse_user(raw: &str) -> Result<UserId, String> {
    parse_id(raw).map(UserId)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send_keeps_spaces_in_text() {
        assert_eq!(
            HeadlessCommand::parse("send 7 hello  there").unwrap(),
            Some(HeadlessCommand::Send {
                peer: UserId(7),
                text: "hello  there".into()
            })
        );
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(
            HeadlessCommand::parse("open 3").unwrap(),
            Some(HeadlessCommand::Open(UserId(3)))
        );
        assert_eq!(
            HeadlessCommand::parse(" more ").unwrap(),
            Some(HeadlessCommand::More)
        );
        assert_eq!(
            HeadlessCommand::parse("q").unwrap(),
            Some(HeadlessCommand::Quit)
        );
        assert_eq!(HeadlessCommand::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(HeadlessCommand::parse("send 7").is_err());
        assert!(HeadlessCommand::parse("open bob").is_err());
        assert!(HeadlessCommand::parse("dance").is_err());
    }
}
