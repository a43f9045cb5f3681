//! Typed client/server messages carried inside frame payloads.

use crate::error::FailCode;
use crate::game::PILE_COUNT;

/// A message sent by a client: either an `OPEN` or a `MOVE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Open { name: String },
    Move { pile: i64, qty: i64 },
}

impl ClientMessage {
    /// Parse a frame payload (verb through trailing `|`) into a typed message.
    ///
    /// The number of `|` characters in the payload must match the verb's
    /// expected count (`OPEN` ⇒ 2, `MOVE` ⇒ 3); any other verb, or a field
    /// count that disagrees with the bar count, is `FailCode::Invalid`.
    pub fn parse(payload: &[u8]) -> Result<Self, FailCode> {
        if payload.len() < 5 || payload[4] != b'|' {
            return Err(FailCode::Invalid);
        }
        let verb = &payload[..4];
        let bars = payload.iter().filter(|&&b| b == b'|').count();
        let body = &payload[5..];

        match verb {
            b"OPEN" => {
                if bars != 2 {
                    return Err(FailCode::Invalid);
                }
                let fields = split_fields(body);
                if fields.len() != 1 {
                    return Err(FailCode::Invalid);
                }
                let name = std::str::from_utf8(fields[0]).map_err(|_| FailCode::Invalid)?;
                Ok(ClientMessage::Open { name: name.to_string() })
            }
            b"MOVE" => {
                if bars != 3 {
                    return Err(FailCode::Invalid);
                }
                let fields = split_fields(body);
                if fields.len() != 2 {
                    return Err(FailCode::Invalid);
                }
                let pile = parse_i64(fields[0])?;
                let qty = parse_i64(fields[1])?;
                Ok(ClientMessage::Move { pile, qty })
            }
            _ => Err(FailCode::Invalid),
        }
    }
}

fn parse_i64(field: &[u8]) -> Result<i64, FailCode> {
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(FailCode::Invalid)
}

/// Split on `|`, dropping empty tokens — mirrors `strtok_r`'s behavior of
/// collapsing consecutive delimiters, which the original protocol relies on.
fn split_fields(body: &[u8]) -> Vec<&[u8]> {
    body.split(|&b| b == b'|').filter(|s| !s.is_empty()).collect()
}

/// A message sent by the server, ready to be serialized to a frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Wait,
    Name { player_num: u8, opponent_name: String },
    Play { whose_turn: u8, board: [u32; PILE_COUNT] },
    Over { winner: u8, board: [u32; PILE_COUNT], forfeit: bool },
    Fail(FailCode),
}

impl ServerMessage {
    /// Render to the payload bytes (verb through trailing `|`), ready for
    /// [`crate::codec::write_frame`].
    pub fn to_payload(&self) -> Vec<u8> {
        match self {
            ServerMessage::Wait => b"WAIT|".to_vec(),
            ServerMessage::Name { player_num, opponent_name } => {
                format!("NAME|{player_num}|{opponent_name}|").into_bytes()
            }
            ServerMessage::Play { whose_turn, board } => {
                format!("PLAY|{whose_turn}|{}|", format_board(board)).into_bytes()
            }
            ServerMessage::Over { winner, board, forfeit } => {
                let reason = if *forfeit { "Forfeit" } else { "" };
                format!("OVER|{winner}|{}|{reason}|", format_board(board)).into_bytes()
            }
            ServerMessage::Fail(code) => format!("FAIL|{code}|").into_bytes(),
        }
    }
}

fn format_board(board: &[u32; PILE_COUNT]) -> String {
    board.iter().map(u32::to_string).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_open_with_a_name() {
        let msg = ClientMessage::parse(b"OPEN|R|").unwrap();
        assert_eq!(msg, ClientMessage::Open { name: "R".to_string() });
    }

    #[test]
    fn parses_move_with_pile_and_qty() {
        let msg = ClientMessage::parse(b"MOVE|1|9|").unwrap();
        assert_eq!(msg, ClientMessage::Move { pile: 1, qty: 9 });
    }

    #[test]
    fn rejects_unknown_verb() {
        assert_eq!(ClientMessage::parse(b"PING|").unwrap_err(), FailCode::Invalid);
    }

    #[test]
    fn rejects_wrong_field_count_for_open() {
        assert_eq!(ClientMessage::parse(b"OPEN|a|b|").unwrap_err(), FailCode::Invalid);
    }

    #[test]
    fn rejects_non_integer_move_operands() {
        assert_eq!(ClientMessage::parse(b"MOVE|one|2|").unwrap_err(), FailCode::Invalid);
    }

    #[test]
    fn rejects_empty_open_name_as_invalid() {
        // "OPEN||" collapses to zero fields once the empty token is dropped,
        // matching the original's strtok-based tokenizer.
        assert_eq!(ClientMessage::parse(b"OPEN||").unwrap_err(), FailCode::Invalid);
    }

    #[test]
    fn play_renders_with_a_single_trailing_bar() {
        let msg = ServerMessage::Play { whose_turn: 2, board: [0, 3, 5, 7, 9] };
        assert_eq!(msg.to_payload(), b"PLAY|2|0 3 5 7 9|");
    }

    #[test]
    fn over_normal_win_renders_an_empty_reason_field() {
        let msg = ServerMessage::Over { winner: 1, board: [0; PILE_COUNT], forfeit: false };
        assert_eq!(msg.to_payload(), b"OVER|1|0 0 0 0 0||");
    }

    #[test]
    fn over_forfeit_renders_the_forfeit_reason() {
        let msg = ServerMessage::Over { winner: 2, board: [1, 3, 5, 7, 9], forfeit: true };
        assert_eq!(msg.to_payload(), b"OVER|2|1 3 5 7 9|Forfeit|");
    }

    #[test]
    fn fail_renders_code_and_token() {
        let msg = ServerMessage::Fail(FailCode::Invalid);
        assert_eq!(msg.to_payload(), b"FAIL|10 Invalid|");
    }
}
