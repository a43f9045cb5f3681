//! The per-connection worker: one blocking thread per accepted socket.
//!
//! Each worker owns its own read handle (the original accepted stream) and
//! reads frames from it outside any lock. Writes that are part of a state
//! transition go through the stream clone the session stores for that slot,
//! under the session lock, so a paired broadcast (e.g. `PLAY` to both
//! players) is never observed half-done. Routine `FAIL` replies that don't
//! change state are written directly to the worker's own handle, unlocked.

use std::net::{Shutdown, TcpStream};
use std::ops::ControlFlow;
use std::sync::Arc;

use crate::codec;
use crate::error::{FailCode, FrameError};
use crate::event::Event;
use crate::game::{self, MoveOutcome, SessionState, Slot};
use crate::logger::Logger;
use crate::message::{ClientMessage, ServerMessage};
use crate::session::{ConnId, Registry, Session, SessionInner};

pub fn run_worker(
    mut stream: TcpStream,
    conn_id: ConnId,
    session: Arc<Session>,
    registry: Arc<Registry>,
    log: Arc<Logger>,
) {
    let game_id = session.index();
    let mut have_open = false;

    loop {
        let frame = match codec::read_frame(&mut stream) {
            Ok(frame) => frame,
            Err(FrameError::Eof) => break,
            Err(FrameError::Io(e)) => {
                log.debug(Event::ReadError { game: game_id, slot: 0, reason: e.to_string() });
                break;
            }
            Err(FrameError::BadFrame) => {
                fail_and_maybe_forfeit(&session, &mut stream, conn_id, FailCode::Invalid, &log, game_id);
                break;
            }
        };

        let my_slot = {
            let inner = session.inner.lock().unwrap();
            inner.slot_of(conn_id)
        };
        let Some(my_slot) = my_slot else {
            // This socket no longer occupies a slot in this session (the
            // session was reused and reset out from under a stale worker).
            break;
        };

        let control = match ClientMessage::parse(&frame.payload) {
            Err(code) => {
                fail_and_maybe_forfeit(&session, &mut stream, conn_id, code, &log, game_id);
                ControlFlow::Break(())
            }
            Ok(msg) if !have_open => {
                handle_pre_open(&session, &mut stream, conn_id, my_slot, msg, &registry, &log, game_id, &mut have_open)
            }
            Ok(msg) => handle_post_open(&session, &mut stream, conn_id, my_slot, msg, &log, game_id),
        };

        if control.is_break() {
            break;
        }
    }

    cleanup(&session, &mut stream, conn_id, &log, game_id);
}

fn handle_pre_open(
    session: &Session,
    stream: &mut TcpStream,
    conn_id: ConnId,
    my_slot: Slot,
    msg: ClientMessage,
    registry: &Registry,
    log: &Logger,
    game_id: usize,
    have_open: &mut bool,
) -> ControlFlow<()> {
    let name = match msg {
        ClientMessage::Open { name } => name,
        ClientMessage::Move { .. } => {
            fail_and_maybe_forfeit(session, stream, conn_id, FailCode::NotPlaying, log, game_id);
            return ControlFlow::Break(());
        }
    };

    if name.len() > 72 {
        fail_and_maybe_forfeit(session, stream, conn_id, FailCode::LongName, log, game_id);
        return ControlFlow::Break(());
    }
    if registry.name_in_use(&name) {
        fail_and_maybe_forfeit(session, stream, conn_id, FailCode::AlreadyPlaying, log, game_id);
        return ControlFlow::Break(());
    }

    {
        let mut inner = session.inner.lock().unwrap();
        if let Some(p) = inner.slot_mut(my_slot) {
            p.name = name;
        }
    }

    let _ = codec::write_frame(stream, &ServerMessage::Wait.to_payload());
    *have_open = true;
    log.info(Event::PlayerAttached { game: game_id, slot: my_slot.number(), state: SessionState::GameStart });

    try_start_game(session, log, game_id);

    ControlFlow::Continue(())
}

fn handle_post_open(
    session: &Session,
    stream: &mut TcpStream,
    conn_id: ConnId,
    my_slot: Slot,
    msg: ClientMessage,
    log: &Logger,
    game_id: usize,
) -> ControlFlow<()> {
    let (pile, qty) = match msg {
        ClientMessage::Open { .. } => {
            fail_and_maybe_forfeit(session, stream, conn_id, FailCode::AlreadyOpen, log, game_id);
            return ControlFlow::Break(());
        }
        ClientMessage::Move { pile, qty } => (pile, qty),
    };

    let mut inner = session.inner.lock().unwrap();
    let state = inner.state;

    let Some(expected_slot) = state.turn_slot() else {
        drop(inner);
        fail_and_maybe_forfeit(session, stream, conn_id, FailCode::NotPlaying, log, game_id);
        return ControlFlow::Break(());
    };

    log.verbose(Event::Move { game: game_id, slot: my_slot.number(), pile, qty, state });

    if my_slot != expected_slot {
        drop(inner);
        let _ = codec::write_frame(stream, &ServerMessage::Fail(FailCode::Impatient).to_payload());
        log.verbose(Event::Fail { game: game_id, slot: my_slot.number(), code: FailCode::Impatient.code(), token: FailCode::Impatient.token() });
        return ControlFlow::Continue(());
    }

    let mut board = inner.board;
    match game::apply_move(&mut board, my_slot, pile, qty) {
        Err(code) => {
            drop(inner);
            let _ = codec::write_frame(stream, &ServerMessage::Fail(code).to_payload());
            log.verbose(Event::Fail { game: game_id, slot: my_slot.number(), code: code.code(), token: code.token() });
            ControlFlow::Continue(())
        }
        Ok(MoveOutcome::Continue { next }) => {
            inner.board = board;
            inner.state = SessionState::for_slot(next);
            let payload = ServerMessage::Play { whose_turn: next.number(), board }.to_payload();
            broadcast(&mut inner, &payload);
            ControlFlow::Continue(())
        }
        Ok(MoveOutcome::Win { winner }) => {
            inner.board = board;
            inner.state = SessionState::GameOver;
            let payload = ServerMessage::Over { winner: winner.number(), board, forfeit: false }.to_payload();
            broadcast(&mut inner, &payload);
            shutdown_both(&mut inner);
            drop(inner);
            log.info(Event::NormalWin { game: game_id, winner: winner.number() });
            ControlFlow::Break(())
        }
    }
}

/// Start the game once both slots have sent `OPEN`. A no-op if only one has,
/// or if the session has moved past `GAME_START` already.
fn try_start_game(session: &Session, log: &Logger, game_id: usize) {
    let mut inner = session.inner.lock().unwrap();
    if inner.state != SessionState::GameStart {
        return;
    }

    let p1_name = inner.player1.as_ref().map(|p| p.name.clone()).filter(|n| !n.is_empty());
    let p2_name = inner.player2.as_ref().map(|p| p.name.clone()).filter(|n| !n.is_empty());
    let (Some(p1_name), Some(p2_name)) = (p1_name, p2_name) else {
        return;
    };

    inner.board = game::INITIAL_BOARD;
    inner.state = SessionState::P1Turn;
    log.info(Event::GameStarting { game: game_id, p1: &p1_name, p2: &p2_name });

    let name1 = ServerMessage::Name { player_num: 1, opponent_name: p2_name }.to_payload();
    let name2 = ServerMessage::Name { player_num: 2, opponent_name: p1_name }.to_payload();
    let play = ServerMessage::Play { whose_turn: 1, board: inner.board }.to_payload();

    if let Some(p) = inner.slot_mut(Slot::One) {
        let _ = codec::write_frame(&mut p.stream, &name1);
        let _ = codec::write_frame(&mut p.stream, &play);
    }
    if let Some(p) = inner.slot_mut(Slot::Two) {
        let _ = codec::write_frame(&mut p.stream, &name2);
        let _ = codec::write_frame(&mut p.stream, &play);
    }
}

fn broadcast(inner: &mut SessionInner, payload: &[u8]) {
    for slot in [Slot::One, Slot::Two] {
        if let Some(p) = inner.slot_mut(slot) {
            let _ = codec::write_frame(&mut p.stream, payload);
        }
    }
}

fn shutdown_both(inner: &mut SessionInner) {
    for slot in [Slot::One, Slot::Two] {
        if let Some(p) = inner.slot(slot) {
            let _ = p.stream.shutdown(Shutdown::Both);
        }
    }
}

/// Write a fatal `FAIL` to the caller's own socket, then forfeit the game to
/// the opponent if one was in progress. The self-write happens unlocked
/// (it depends on nothing shared); the forfeit check and broadcast happen
/// under the session lock so a racing opponent never sees a half transition.
fn fail_and_maybe_forfeit(
    session: &Session,
    stream: &mut TcpStream,
    conn_id: ConnId,
    code: FailCode,
    log: &Logger,
    game_id: usize,
) {
    let _ = codec::write_frame(stream, &ServerMessage::Fail(code).to_payload());
    log.verbose(Event::Fail { game: game_id, slot: 0, code: code.code(), token: code.token() });

    let mut inner = session.inner.lock().unwrap();
    if matches!(inner.state, SessionState::P1Turn | SessionState::P2Turn) {
        if let Some(my_slot) = inner.slot_of(conn_id) {
            let winner = my_slot.other();
            let board = inner.board;
            let payload = ServerMessage::Over { winner: winner.number(), board, forfeit: true }.to_payload();
            if let Some(opponent) = inner.slot_mut(winner) {
                let _ = codec::write_frame(&mut opponent.stream, &payload);
                let _ = opponent.stream.shutdown(Shutdown::Both);
            }
            inner.state = SessionState::GameOver;
            log.info(Event::Forfeit { game: game_id, winner: winner.number() });
        }
    }
    drop(inner);
    let _ = stream.shutdown(Shutdown::Both);
}

/// Every exit path from the read loop ends up here. The only thing that
/// matters is the session's current state: a game already over needs
/// nothing but this socket's slot cleared; a game still waiting for a
/// second `OPEN` reverts or remaps; a live game forfeits to the opponent.
fn cleanup(session: &Session, stream: &mut TcpStream, conn_id: ConnId, log: &Logger, game_id: usize) {
    let mut inner = session.inner.lock().unwrap();
    let my_slot = inner.slot_of(conn_id);

    match inner.state {
        SessionState::GameOver | SessionState::AwaitingFirstPlayer => {}

        SessionState::AwaitingSecondPlayer => {
            if my_slot == Some(Slot::One) {
                inner.player1 = None;
                inner.state = SessionState::AwaitingFirstPlayer;
                log.info(Event::Disconnected { game: game_id, slot: 1 });
            }
        }

        SessionState::GameStart => match my_slot {
            Some(Slot::One) => {
                inner.player1 = inner.player2.take();
                inner.state = SessionState::AwaitingSecondPlayer;
                log.info(Event::Disconnected { game: game_id, slot: 1 });
            }
            Some(Slot::Two) => {
                inner.player2 = None;
                inner.state = SessionState::AwaitingSecondPlayer;
                log.info(Event::Disconnected { game: game_id, slot: 2 });
            }
            None => {}
        },

        SessionState::P1Turn | SessionState::P2Turn => {
            if let Some(my_slot) = my_slot {
                let winner = my_slot.other();
                let board = inner.board;
                let payload = ServerMessage::Over { winner: winner.number(), board, forfeit: true }.to_payload();
                if let Some(opponent) = inner.slot_mut(winner) {
                    let _ = codec::write_frame(&mut opponent.stream, &payload);
                    let _ = opponent.stream.shutdown(Shutdown::Both);
                }
                inner.state = SessionState::GameOver;
                log.info(Event::Forfeit { game: game_id, winner: winner.number() });
            }
        }
    }

    // Re-derive rather than reuse `my_slot`: the GAME_START remap above may
    // have already moved this connection's data out of its original slot
    // (or removed it entirely), and clearing the stale slot would wipe out
    // the remapped occupant instead of this connection's own leftovers.
    if let Some(slot) = inner.slot_of(conn_id) {
        *inner.slot_mut(slot) = None;
    }
    drop(inner);
    let _ = stream.shutdown(Shutdown::Both);
}
