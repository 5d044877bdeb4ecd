//! Chat messages as the bot sees them, and the command grammar.

/// One incoming chat message, already stripped of transport details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub user_id: String,
    pub display_name: String,
    pub content: String,
    /// Cheered bits attached to the message; 0 when none.
    pub bits: u32,
    /// Message authored by the bot itself.
    pub echo: bool,
}

impl ChatEvent {
    pub fn new(user_id: &str, display_name: &str, content: &str) -> Self {
        ChatEvent {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            content: content.to_string(),
            bits: 0,
            echo: false,
        }
    }

    pub fn with_bits(mut self, bits: u32) -> Self {
        self.bits = bits;
        self
    }
}

/// Bits tag value; missing or malformed counts as no bits.
pub fn parse_bits(tag: Option<&str>) -> u32 {
    tag.and_then(|v| v.trim().parse::<u32>().ok()).unwrap_or(0)
}

/// Chat command parser for the configured prefix
pub struct ChatCommandParser {
    prefix: String,
}

impl ChatCommandParser {
    pub fn new(prefix: &str) -> Self { Self { prefix: prefix.to_string() } }

    pub fn parse(&self, raw: &str) -> ChatCommand {
        let trimmed = raw.trim();
        let Some(body) = trimmed.strip_prefix(self.prefix.as_str()) else { return ChatCommand::Unknown };
        let word = body.split_whitespace().next().unwrap_or("");
        if word.eq_ignore_ascii_case("test") || word.eq_ignore_ascii_case("draw") {
            return ChatCommand::Draw;
        }
        if word.eq_ignore_ascii_case("tokens") || word.eq_ignore_ascii_case("balance") {
            return ChatCommand::Tokens;
        }
        ChatCommand::Unknown
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ChatCommand {
    /// Manual draw trigger
    Draw,
    /// Report the caller's balance
    Tokens,
    /// Anything else, including plain chat
    Unknown,
}
