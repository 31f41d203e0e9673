//! Minimal STOMP 1.2 text frame codec.
//!
//! Covers the client/server commands the chat transport uses. Header values
//! are escaped per the 1.2 rules except on CONNECT/CONNECTED frames.

use std::fmt;

use crate::constants::STOMP_ACCEPT_VERSION;

/// Errors from decoding a STOMP frame.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("frame is missing its NUL terminator")]
    Unterminated,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("malformed header line: {0}")]
    MalformedHeader(String),

    #[error("invalid escape sequence in header: {0}")]
    InvalidEscape(String),
}

/// STOMP frame command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    // Client frames
    Connect,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,

    // Server frames
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    fn parse(s: &str) -> Result<Self, FrameError> {
        Ok(match s {
            "CONNECT" | "STOMP" => Command::Connect,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "DISCONNECT" => Command::Disconnect,
            "CONNECTED" => Command::Connected,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        })
    }

    /// CONNECT and CONNECTED headers are never escaped.
    fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Appends a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the first value of a header. Repeated headers keep the first
    /// occurrence, as STOMP 1.2 requires.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// CONNECT frame carrying the bearer token.
    pub fn connect(host: &str, token: &str) -> Self {
        Frame::new(Command::Connect)
            .with_header("accept-version", STOMP_ACCEPT_VERSION)
            .with_header("host", host)
            .with_header("Authorization", format!("Bearer {token}"))
    }

    /// SEND frame with a JSON body.
    pub fn send(destination: &str, body: impl Into<String>, extra: &[(String, String)]) -> Self {
        let mut frame = Frame::new(Command::Send)
            .with_header("destination", destination)
            .with_header("content-type", "application/json");
        for (k, v) in extra {
            frame.headers.push((k.clone(), v.clone()));
        }
        frame.with_body(body)
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).with_header("id", id)
    }

    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    /// Serializes the frame to its wire text, including the NUL terminator.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(32 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (k, v) in &self.headers {
            if escape {
                out.push_str(&escape_header(k));
                out.push(':');
                out.push_str(&escape_header(v));
            } else {
                out.push_str(k);
                out.push(':');
                out.push_str(v);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.header("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parses one frame from wire text.
    ///
    /// Returns `Ok(None)` for heart-beats (text consisting only of EOLs).
    pub fn decode(text: &str) -> Result<Option<Self>, FrameError> {
        let trimmed = text.trim_start_matches(['\r', '\n']);
        if trimmed.is_empty() {
            return Ok(None);
        }

        // Headers end at the first empty line; every EOL may be CRLF or LF.
        let mut head = Vec::new();
        let mut pos = 0;
        let body_start = loop {
            let Some(nl) = trimmed[pos..].find('\n') else {
                return Err(FrameError::Unterminated);
            };
            let line = trimmed[pos..pos + nl].trim_end_matches('\r');
            pos += nl + 1;
            if line.is_empty() {
                break pos;
            }
            head.push(line);
        };
        let rest = &trimmed[body_start..];

        let mut lines = head.into_iter();
        let command = Command::parse(lines.next().unwrap_or_default())?;
        let unescape_values = command.escapes_headers();

        let mut headers = Vec::new();
        for line in lines {
            let (k, v) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if unescape_values {
                headers.push((unescape_header(k)?, unescape_header(v)?));
            } else {
                headers.push((k.to_string(), v.to_string()));
            }
        }

        let nul = rest.find('\0').ok_or(FrameError::Unterminated)?;
        let body = rest[..nul].to_string();

        Ok(Some(Self {
            command,
            headers,
            body,
        }))
    }
}

fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(s: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(s.to_string())),
        }
    }
    Ok(out)
}
