//! Server-to-client messages.

use std::fmt::Write as _;

/// A reply to one command, before encryption.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Pong,
    Ok,
    /// `ERR|<code>`.
    Error(&'static str),
    /// Successful login: spawn position, access level and appearance.
    LoginOk {
        x: f32,
        y: f32,
        access_level: i32,
        appearance: String,
    },
    /// A raw JSON chunk snapshot, sent without a prefix.
    Json(String),
}

impl Reply {
    /// Plaintext wire form.
    pub fn to_wire(&self) -> String {
        match self {
            Self::Pong => "PONG".to_string(),
            Self::Ok => "OK".to_string(),
            Self::Error(code) => format!("ERR|{code}"),
            Self::LoginOk {
                x,
                y,
                access_level,
                appearance,
            } => {
                let mut out = format!("OK|{}|{}|{access_level}", format_coord(*x), format_coord(*y));
                if !appearance.is_empty() {
                    out.push('|');
                    out.push_str(appearance);
                }
                out
            }
            Self::Json(body) => body.clone(),
        }
    }
}

/// Formats a coordinate with at most three decimals and no trailing zeros.
///
/// `1.5` → `"1.5"`, `2.0` → `"2"`, `-0.0001` → `"0"`.
pub fn format_coord(value: f32) -> String {
    let mut text = format!("{value:.3}");
    if text.contains('.') {
        let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(trimmed);
    }
    if text == "-0" {
        text = "0".to_string();
    }
    text
}

/// One live player as it appears in the position broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub id: String,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub appearance: String,
}

/// Renders the broadcast body: one `id|name|x|y|appearance` line per player.
pub fn render_broadcast(players: &[PlayerSnapshot]) -> String {
    let mut out = String::new();
    for (i, p) in players.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        // Writing to a String cannot fail.
        let _ = write!(
            out,
            "{}|{}|{}|{}|{}",
            p.id,
            p.name,
            format_coord(p.x),
            format_coord(p.y),
            p.appearance
        );
    }
    out
}
