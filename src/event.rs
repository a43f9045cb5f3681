//! Loggable occurrences, one variant per line the original implementation
//! would have `printf`'d. Each event knows how to render itself so call
//! sites stay free of ad hoc format strings.

use std::fmt;
use std::net::SocketAddr;

use crate::game::SessionState;

pub enum Event<'a> {
    Listening { addr: SocketAddr },
    Accepted { game: usize, peer: Option<SocketAddr> },
    PlayerAttached { game: usize, slot: u8, state: SessionState },
    RegistryReused { game: usize, state: SessionState },
    RegistryReset { game: usize },
    RegistrySwapped { from: usize, to: usize },
    RegistryCreated { game: usize, total: usize },
    FrontBusy { game: usize, state: SessionState },
    GameStarting { game: usize, p1: &'a str, p2: &'a str },
    Move { game: usize, slot: u8, pile: i64, qty: i64, state: SessionState },
    Fail { game: usize, slot: u8, code: u32, token: &'a str },
    NormalWin { game: usize, winner: u8 },
    Forfeit { game: usize, winner: u8 },
    Disconnected { game: usize, slot: u8 },
    ReadError { game: usize, slot: u8, reason: String },
    SpawnFailed { reason: String },
    Shutdown { freed: usize },
}

impl fmt::Display for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Listening { addr } => write!(f, "listening on {addr}"),
            Event::Accepted { game, peer } => match peer {
                Some(p) => write!(f, "[game {game}] accepted connection from {p}"),
                None => write!(f, "[game {game}] accepted connection (peer address unavailable)"),
            },
            Event::PlayerAttached { game, slot, state } => {
                write!(f, "[game {game}] attached as player {slot} (state={state:?})")
            }
            Event::RegistryReused { game, state } => {
                write!(f, "[registry] reusing game {game} in state {state:?}")
            }
            Event::RegistryReset { game } => write!(f, "[registry] resetting game {game} (was GAME_OVER)"),
            Event::RegistrySwapped { from, to } => write!(f, "[registry] swapped game {from} to front {to}"),
            Event::RegistryCreated { game, total } => {
                write!(f, "[registry] created game {game}; total games now {total}")
            }
            Event::FrontBusy { game, state } => {
                write!(f, "[registry] front game {game} busy (state={state:?}), selecting another")
            }
            Event::GameStarting { game, p1, p2 } => {
                write!(f, "[game {game}] starting: P1={p1:?} P2={p2:?}")
            }
            Event::Move { game, slot, pile, qty, state } => {
                write!(f, "[game {game}][P{slot}] MOVE pile={pile} qty={qty} (state={state:?})")
            }
            Event::Fail { game, slot, code, token } => {
                write!(f, "[game {game}][P{slot}] -> FAIL {code} ({token})")
            }
            Event::NormalWin { game, winner } => {
                write!(f, "[game {game}] normal win by P{winner}")
            }
            Event::Forfeit { game, winner } => {
                write!(f, "[game {game}] forfeit; P{winner} wins")
            }
            Event::Disconnected { game, slot } => write!(f, "[game {game}] player {slot} disconnected"),
            Event::ReadError { game, slot, reason } => {
                write!(f, "[game {game}] read error on player {slot}: {reason}")
            }
            Event::SpawnFailed { reason } => write!(f, "failed to spawn worker thread: {reason}"),
            Event::Shutdown { freed } => write!(f, "shutdown complete; freed {freed} session(s)"),
        }
    }
}
