//! Twitch chat transport
//!
//! Plain IRC over TCP with the IRCv3 tags capability. Only what the bot
//! needs is handled: login, join, PING/PONG, PRIVMSG in and out.

use anyhow::{Result, anyhow};
use log::{info, debug, trace, warn};
use std::collections::HashMap;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::config::Config;
use crate::gacha::chat::{parse_bits, ChatEvent};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TwitchError {
    #[error("Twitch rejected the bot token")]
    AuthFailed,
}

/// A parsed IRC line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IrcMessage {
    pub tags: HashMap<String, String>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

fn unescape_tag_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' { out.push(c); continue; }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Parse one IRC line (without the trailing CRLF).
pub fn parse_line(line: &str) -> Option<IrcMessage> {
    let mut rest = line.trim_end_matches(['\r', '\n']);
    let mut msg = IrcMessage::default();

    if let Some(stripped) = rest.strip_prefix('@') {
        let (tags, tail) = stripped.split_once(' ')?;
        for tag in tags.split(';') {
            let (k, v) = tag.split_once('=').unwrap_or((tag, ""));
            msg.tags.insert(k.to_string(), unescape_tag_value(v));
        }
        rest = tail.trim_start();
    }

    if let Some(stripped) = rest.strip_prefix(':') {
        let (prefix, tail) = stripped.split_once(' ')?;
        msg.prefix = Some(prefix.to_string());
        rest = tail.trim_start();
    }

    let (head, trailing) = match rest.split_once(" :") {
        Some((h, t)) => (h, Some(t)),
        None => (rest, None),
    };
    let mut words = head.split_whitespace();
    msg.command = words.next()?.to_string();
    msg.params = words.map(str::to_string).collect();
    if let Some(t) = trailing { msg.params.push(t.to_string()); }
    Some(msg)
}

impl IrcMessage {
    /// Login name from a `nick!user@host` prefix.
    pub fn login(&self) -> Option<&str> {
        self.prefix.as_deref().map(|p| p.split('!').next().unwrap_or(p))
    }

    /// Convert a PRIVMSG into a chat event; other commands yield `None`.
    pub fn to_chat_event(&self, own_nick: &str) -> Option<ChatEvent> {
        if self.command != "PRIVMSG" { return None; }
        let content = self.params.get(1)?;
        let login = self.login().unwrap_or("");
        let user_id = self.tags.get("user-id").cloned().unwrap_or_else(|| login.to_string());
        if user_id.is_empty() { return None; }
        let display_name = self.tags.get("display-name")
            .filter(|n| !n.is_empty())
            .cloned()
            .unwrap_or_else(|| login.to_string());
        Some(ChatEvent {
            user_id,
            display_name,
            content: content.clone(),
            bits: parse_bits(self.tags.get("bits").map(String::as_str)),
            echo: login.eq_ignore_ascii_case(own_nick),
        })
    }
}

/// Live connection to Twitch chat
pub struct TwitchConnection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    channel: String,
    nick: String,
}

impl TwitchConnection {
    pub async fn connect(config: &Config) -> Result<Self> {
        let addr = format!("{}:{}", config.twitch.server, config.twitch.port);
        info!("Connecting to Twitch chat at {}", addr);
        let stream = TcpStream::connect(&addr).await
            .map_err(|e| anyhow!("Failed to connect to {}: {}", addr, e))?;
        let (read, writer) = stream.into_split();
        let channel = config.bot.channel.trim_start_matches('#').to_lowercase();
        let nick = config.bot.nick.to_lowercase();
        let mut conn = TwitchConnection { lines: BufReader::new(read).lines(), writer, channel, nick };

        let token = config.bot.token.trim();
        let pass = if token.starts_with("oauth:") { token.to_string() } else { format!("oauth:{}", token) };
        conn.send_raw(&format!("PASS {}", pass)).await?;
        conn.send_raw(&format!("NICK {}", conn.nick)).await?;
        conn.send_raw("CAP REQ :twitch.tv/tags twitch.tv/commands").await?;
        conn.send_raw(&format!("JOIN #{}", conn.channel)).await?;
        Ok(conn)
    }

    async fn send_raw(&mut self, line: &str) -> Result<()> {
        if line.starts_with("PASS ") { trace!("> PASS ***"); } else { trace!("> {}", line); }
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Send a chat message to the joined channel.
    pub async fn send_message(&mut self, text: &str) -> Result<()> {
        // a newline would end the IRC line early
        let single_line = text.replace(['\r', '\n'], " ");
        self.send_raw(&format!("PRIVMSG #{} :{}", self.channel, single_line)).await?;
        debug!("Sent chat message: {}", single_line);
        Ok(())
    }

    /// Wait for the next chat message. `Ok(None)` means the server closed
    /// the connection or asked for a reconnect.
    pub async fn next_event(&mut self) -> Result<Option<ChatEvent>> {
        while let Some(line) = self.lines.next_line().await? {
            trace!("< {}", line);
            let Some(msg) = parse_line(&line) else { continue };
            match msg.command.as_str() {
                "PING" => {
                    let token = msg.params.first().cloned().unwrap_or_default();
                    self.send_raw(&format!("PONG :{}", token)).await?;
                }
                "001" => info!("Logged in to Twitch as {}", self.nick),
                "JOIN" if msg.login().map(|l| l.eq_ignore_ascii_case(&self.nick)).unwrap_or(false) => {
                    info!("Joined #{}", self.channel);
                }
                "NOTICE" => {
                    let text = msg.params.last().cloned().unwrap_or_default();
                    warn!("Twitch NOTICE: {}", text);
                    if text.contains("Login authentication failed") {
                        return Err(TwitchError::AuthFailed.into());
                    }
                }
                "RECONNECT" => {
                    warn!("Twitch asked us to reconnect");
                    return Ok(None);
                }
                _ => {
                    if let Some(ev) = msg.to_chat_event(&self.nick) { return Ok(Some(ev)); }
                }
            }
        }
        Ok(None)
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        let _ = self.send_raw(&format!("PART #{}", self.channel)).await;
        self.writer.shutdown().await?;
        Ok(())
    }
}
