//! Plaintext command grammar.
//!
//! Commands are pipe-delimited and matched by prefix in a fixed order.
//! Anything that matches no prefix is read as a bare position update
//! `id|name|x|y[|appearance]`.

use std::fmt;

use serde::de::DeserializeOwned;

use crate::{
    BlockingChange, ChunkId, Codec, EditBody, JsonCodec, Layer, ObjectChange, ProtocolError,
    ResourceChange, SurfaceChange, TileChange,
};

/// Which command a datagram was recognised as, before field validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Ping,
    Register,
    Login,
    Chunk(Layer),
    Edit(Layer),
    Position,
}

impl CommandKind {
    /// Prefix including the trailing pipe, or `None` for the bare forms.
    pub fn prefix(self) -> Option<&'static str> {
        let prefix = match self {
            Self::Ping | Self::Position => return None,
            Self::Register => "REGISTER|",
            Self::Login => "LOGIN|",
            Self::Chunk(Layer::Tiles) => "CHUNK|",
            Self::Chunk(Layer::Objects) => "OBJECTS|",
            Self::Chunk(Layer::Resources) => "RESOURCES|",
            Self::Chunk(Layer::Blocking) => "BLOCKING|",
            Self::Chunk(Layer::Surfaces) => "SURFACE|",
            Self::Edit(Layer::Tiles) => "EDIT|",
            Self::Edit(Layer::Objects) => "OBJECT_EDIT|",
            Self::Edit(Layer::Resources) => "RESOURCE_EDIT|",
            Self::Edit(Layer::Blocking) => "BLOCKING_EDIT|",
            Self::Edit(Layer::Surfaces) => "SURFACE_EDIT|",
        };
        Some(prefix)
    }

    /// Error code reported (or logged) when this command is malformed.
    pub fn error_code(self) -> &'static str {
        match self {
            Self::Ping => "bad_ping",
            Self::Register => "bad_register",
            Self::Login => "bad_login",
            Self::Chunk(Layer::Tiles) => "bad_chunk",
            Self::Chunk(Layer::Objects) => "bad_objects",
            Self::Chunk(Layer::Resources) => "bad_resources",
            Self::Chunk(Layer::Blocking) => "bad_blocking",
            Self::Chunk(Layer::Surfaces) => "bad_surface",
            Self::Edit(Layer::Tiles) => "bad_edit",
            Self::Edit(Layer::Objects) => "bad_object_edit",
            Self::Edit(Layer::Resources) => "bad_resource_edit",
            Self::Edit(Layer::Blocking) => "bad_blocking_edit",
            Self::Edit(Layer::Surfaces) => "bad_surface_edit",
            Self::Position => "bad_position",
        }
    }

    /// Edits are unacknowledged and position updates carry no prefix,
    /// so neither gets an error reply.
    pub fn replies_on_error(self) -> bool {
        !matches!(self, Self::Edit(_) | Self::Position)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ping => f.write_str("PING"),
            Self::Position => f.write_str("position"),
            other => {
                let prefix = other.prefix().unwrap_or_default();
                f.write_str(prefix.trim_end_matches('|'))
            }
        }
    }
}

/// A validated edit batch for one layer. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub enum EditBatch {
    Tiles(Vec<TileChange>),
    Objects(Vec<ObjectChange>),
    Resources(Vec<ResourceChange>),
    Blocking(Vec<BlockingChange>),
    Surfaces(Vec<SurfaceChange>),
}

impl EditBatch {
    pub fn layer(&self) -> Layer {
        match self {
            Self::Tiles(_) => Layer::Tiles,
            Self::Objects(_) => Layer::Objects,
            Self::Resources(_) => Layer::Resources,
            Self::Blocking(_) => Layer::Blocking,
            Self::Surfaces(_) => Layer::Surfaces,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Tiles(c) => c.len(),
            Self::Objects(c) => c.len(),
            Self::Resources(c) => c.len(),
            Self::Blocking(c) => c.len(),
            Self::Surfaces(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A client's self-reported position.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionUpdate {
    pub id: String,
    pub name: String,
    pub x: f32,
    pub y: f32,
    /// Empty when the client sent none.
    pub appearance: String,
}

/// A fully validated command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping,
    Register {
        name: String,
        password: String,
        appearance: String,
    },
    Login {
        name: String,
        password: String,
    },
    ChunkRequest {
        layer: Layer,
        chunk: ChunkId,
        /// `-1` means "send whatever you have".
        last_known_version: i64,
    },
    Edit(EditBatch),
    Position(PositionUpdate),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Ping => CommandKind::Ping,
            Self::Register { .. } => CommandKind::Register,
            Self::Login { .. } => CommandKind::Login,
            Self::ChunkRequest { layer, .. } => CommandKind::Chunk(*layer),
            Self::Edit(batch) => CommandKind::Edit(batch.layer()),
            Self::Position(_) => CommandKind::Position,
        }
    }
}

/// Parses one decrypted datagram.
///
/// Trailing line terminators are ignored. Every field check happens here,
/// so a returned [`Command`] can be applied without further validation.
///
/// # Errors
/// Returns [`ProtocolError::Malformed`] tagged with the recognised
/// [`CommandKind`]; the kind decides the error code and whether the
/// client gets a reply.
pub fn parse_command(message: &str) -> Result<Command, ProtocolError> {
    let message = message.trim_end_matches(['\r', '\n']);
    if message == "PING" {
        return Ok(Command::Ping);
    }

    if let Some(rest) = message.strip_prefix("REGISTER|") {
        return parse_register(rest);
    }
    if let Some(rest) = message.strip_prefix("LOGIN|") {
        return parse_login(rest);
    }
    for layer in Layer::ALL {
        if let Some(rest) = strip_kind(message, CommandKind::Chunk(layer)) {
            return parse_chunk_request(layer, rest);
        }
    }
    for layer in Layer::ALL {
        if let Some(rest) = strip_kind(message, CommandKind::Edit(layer)) {
            return parse_edit(layer, rest);
        }
    }

    parse_position(message)
}

fn strip_kind(message: &str, kind: CommandKind) -> Option<&str> {
    message.strip_prefix(kind.prefix()?)
}

fn parse_register(rest: &str) -> Result<Command, ProtocolError> {
    let kind = CommandKind::Register;
    let parts: Vec<&str> = rest.split('|').collect();
    if parts.len() < 2 {
        return Err(ProtocolError::malformed(kind, "expected name|password"));
    }
    let (name, password) = credentials(kind, parts[0], parts[1])?;
    let appearance = parts.get(2).map(|a| a.trim()).unwrap_or_default();
    Ok(Command::Register {
        name,
        password,
        appearance: appearance.to_string(),
    })
}

fn parse_login(rest: &str) -> Result<Command, ProtocolError> {
    let kind = CommandKind::Login;
    let parts: Vec<&str> = rest.split('|').collect();
    if parts.len() < 2 {
        return Err(ProtocolError::malformed(kind, "expected name|password"));
    }
    let (name, password) = credentials(kind, parts[0], parts[1])?;
    Ok(Command::Login { name, password })
}

/// Names are trimmed; passwords are taken verbatim.
fn credentials(
    kind: CommandKind,
    name: &str,
    password: &str,
) -> Result<(String, String), ProtocolError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ProtocolError::malformed(kind, "empty name"));
    }
    if password.is_empty() {
        return Err(ProtocolError::malformed(kind, "empty password"));
    }
    Ok((name.to_string(), password.to_string()))
}

fn parse_chunk_request(layer: Layer, rest: &str) -> Result<Command, ProtocolError> {
    let kind = CommandKind::Chunk(layer);
    let parts: Vec<&str> = rest.split('|').collect();
    if parts.len() < 2 {
        return Err(ProtocolError::malformed(kind, "expected cx|cy[|version]"));
    }
    let cx = parse_int::<i32>(kind, "cx", parts[0])?;
    let cy = parse_int::<i32>(kind, "cy", parts[1])?;
    let last_known_version = match parts.get(2) {
        Some(v) => parse_int::<i64>(kind, "version", v)?,
        None => -1,
    };
    Ok(Command::ChunkRequest {
        layer,
        chunk: ChunkId::new(cx, cy),
        last_known_version,
    })
}

fn parse_int<T: std::str::FromStr>(
    kind: CommandKind,
    field: &str,
    raw: &str,
) -> Result<T, ProtocolError> {
    raw.trim()
        .parse()
        .map_err(|_| ProtocolError::malformed(kind, format!("{field} is not an integer: {raw:?}")))
}

fn parse_edit(layer: Layer, body: &str) -> Result<Command, ProtocolError> {
    let kind = CommandKind::Edit(layer);
    if body.trim().is_empty() {
        return Err(ProtocolError::malformed(kind, "empty body"));
    }

    fn changes<C: DeserializeOwned>(kind: CommandKind, body: &str) -> Result<Vec<C>, ProtocolError> {
        let parsed: EditBody<C> = JsonCodec
            .decode(body)
            .map_err(|e| ProtocolError::malformed(kind, e.to_string()))?;
        Ok(parsed.changes)
    }

    let batch = match layer {
        Layer::Tiles => EditBatch::Tiles(changes(kind, body)?),
        Layer::Objects => EditBatch::Objects(changes(kind, body)?),
        Layer::Resources => EditBatch::Resources(changes(kind, body)?),
        Layer::Blocking => EditBatch::Blocking(changes(kind, body)?),
        Layer::Surfaces => EditBatch::Surfaces(changes(kind, body)?),
    };
    if batch.is_empty() {
        return Err(ProtocolError::malformed(kind, "no changes"));
    }
    Ok(Command::Edit(batch))
}

fn parse_position(message: &str) -> Result<Command, ProtocolError> {
    let kind = CommandKind::Position;
    let parts: Vec<&str> = message.split('|').collect();
    if parts.len() != 4 && parts.len() != 5 {
        return Err(ProtocolError::malformed(
            kind,
            format!("expected id|name|x|y[|appearance], got {} fields", parts.len()),
        ));
    }

    let id = parts[0].trim();
    let name = parts[1].trim();
    if id.is_empty() || name.is_empty() {
        return Err(ProtocolError::malformed(kind, "id and name must be non-empty"));
    }

    let coord = |raw: &str| -> Result<f32, ProtocolError> {
        match raw.trim().parse::<f32>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(ProtocolError::malformed(kind, format!("bad coordinate {raw:?}"))),
        }
    };
    let x = coord(parts[2])?;
    let y = coord(parts[3])?;

    Ok(Command::Position(PositionUpdate {
        id: id.to_string(),
        name: name.to_string(),
        x,
        y,
        appearance: parts.get(4).map(|a| a.trim()).unwrap_or_default().to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn malformed_kind(message: &str) -> CommandKind {
        match parse_command(message) {
            Err(ProtocolError::Malformed { kind, .. }) => kind,
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_command_ping_exact_only() {
        assert_eq!(parse_command("PING").unwrap(), Command::Ping);
        assert_eq!(parse_command("PING\r\n").unwrap(), Command::Ping);
        // "PINGX" is no command; it falls through to a (bad) position update.
        assert_eq!(malformed_kind("PINGX"), CommandKind::Position);
    }

    #[test]
    fn test_parse_command_register_with_and_without_appearance() {
        assert_eq!(
            parse_command("REGISTER| alice |secret").unwrap(),
            Command::Register {
                name: "alice".into(),
                password: "secret".into(),
                appearance: String::new(),
            }
        );
        assert_eq!(
            parse_command("REGISTER|bob| pw |red_hat").unwrap(),
            Command::Register {
                name: "bob".into(),
                password: " pw ".into(),
                appearance: "red_hat".into(),
            }
        );
    }

    #[test]
    fn test_parse_command_register_rejects_missing_or_empty_fields() {
        for msg in ["REGISTER|alice", "REGISTER||secret", "REGISTER|  |secret", "REGISTER|alice|"] {
            let err = parse_command(msg).unwrap_err();
            assert_eq!(err.code(), "bad_register", "{msg}");
            assert!(err.replies());
        }
    }

    #[test]
    fn test_parse_command_login_rejects_empty_password() {
        let err = parse_command("LOGIN|alice|").unwrap_err();
        assert_eq!(err.code(), "bad_login");
        assert_eq!(
            parse_command("LOGIN|alice|secret").unwrap(),
            Command::Login {
                name: "alice".into(),
                password: "secret".into(),
            }
        );
    }

    #[test]
    fn test_parse_command_chunk_requests_per_layer() {
        let cases = [
            ("CHUNK|0|0|-1", Layer::Tiles),
            ("OBJECTS|0|0|-1", Layer::Objects),
            ("RESOURCES|0|0|-1", Layer::Resources),
            ("BLOCKING|0|0|-1", Layer::Blocking),
            ("SURFACE|0|0|-1", Layer::Surfaces),
        ];
        for (msg, layer) in cases {
            assert_eq!(
                parse_command(msg).unwrap(),
                Command::ChunkRequest {
                    layer,
                    chunk: ChunkId::new(0, 0),
                    last_known_version: -1,
                },
                "{msg}"
            );
        }
    }

    #[test]
    fn test_parse_command_chunk_version_defaults_to_minus_one() {
        assert_eq!(
            parse_command("CHUNK|-2|7").unwrap(),
            Command::ChunkRequest {
                layer: Layer::Tiles,
                chunk: ChunkId::new(-2, 7),
                last_known_version: -1,
            }
        );
    }

    #[test]
    fn test_parse_command_chunk_bad_numbers_use_layer_code() {
        assert_eq!(parse_command("CHUNK|x|0").unwrap_err().code(), "bad_chunk");
        assert_eq!(parse_command("OBJECTS|0").unwrap_err().code(), "bad_objects");
        assert_eq!(parse_command("SURFACE|0|0|v").unwrap_err().code(), "bad_surface");
        assert_eq!(parse_command("BLOCKING||0").unwrap_err().code(), "bad_blocking");
    }

    #[test]
    fn test_parse_command_edit_prefixes_do_not_shadow_each_other() {
        let msg = r#"OBJECT_EDIT|{"changes":[{"x":10,"y":10,"typeId":"wall_wood"}]}"#;
        match parse_command(msg).unwrap() {
            Command::Edit(EditBatch::Objects(changes)) => {
                assert_eq!(changes.len(), 1);
                assert_eq!(changes[0].type_id, "wall_wood");
            }
            other => panic!("unexpected {other:?}"),
        }

        let msg = r#"EDIT|{"changes":[{"x":5,"y":5,"tile":3}]}"#;
        assert_eq!(
            parse_command(msg).unwrap(),
            Command::Edit(EditBatch::Tiles(vec![TileChange { x: 5, y: 5, tile: 3 }]))
        );
    }

    #[test]
    fn test_parse_command_edit_rejects_empty_and_invalid_bodies_without_reply() {
        for msg in [
            "EDIT|",
            "EDIT|   ",
            r#"EDIT|{"changes":[]}"#,
            "EDIT|{}",
            "SURFACE_EDIT|not json",
        ] {
            let err = parse_command(msg).unwrap_err();
            assert!(!err.replies(), "{msg}");
        }
        assert_eq!(parse_command("RESOURCE_EDIT|[").unwrap_err().code(), "bad_resource_edit");
    }

    #[test]
    fn test_parse_command_position_update() {
        assert_eq!(
            parse_command("c1|alice|1.5|-2").unwrap(),
            Command::Position(PositionUpdate {
                id: "c1".into(),
                name: "alice".into(),
                x: 1.5,
                y: -2.0,
                appearance: String::new(),
            })
        );
        match parse_command("c1|alice|0|0|blue").unwrap() {
            Command::Position(update) => assert_eq!(update.appearance, "blue"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_command_position_rejects_bad_fields() {
        for msg in ["", "a|b|c", "c1|alice|x|0", "c1||0|0", "c1|alice|NaN|0", "a|b|1|2|3|4"] {
            assert_eq!(malformed_kind(msg), CommandKind::Position, "{msg:?}");
        }
        assert!(!parse_command("c1|alice|inf|0").unwrap_err().replies());
    }

    #[test]
    fn test_command_kind_display() {
        assert_eq!(CommandKind::Edit(Layer::Objects).to_string(), "OBJECT_EDIT");
        assert_eq!(CommandKind::Chunk(Layer::Surfaces).to_string(), "SURFACE");
        assert_eq!(CommandKind::Ping.to_string(), "PING");
    }
}
