//! Session state and the registry of in-flight games.
//!
//! A `Session` is the slab slot the original called a "game": two optional
//! player slots, a board, and a state. The `Registry` owns the growable list
//! of sessions and the admission policy that decides which session a newly
//! accepted connection joins. Lock order is always registry, then session —
//! never the reverse.

use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::event::Event;
use crate::game::{Board, SessionState, Slot, INITIAL_BOARD};
use crate::logger::Logger;

pub type ConnId = u64;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a connection identity, used to recognize "this socket" across
/// registry swaps and the slot-1/slot-2 remap on early disconnect.
pub fn next_conn_id() -> ConnId {
    NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)
}

/// One occupied half of a session: the socket to write to, the player's
/// name (empty until `OPEN` is processed), and the identity of the worker
/// thread that owns it.
pub struct PlayerSlot {
    pub stream: TcpStream,
    pub name: String,
    pub id: ConnId,
}

pub struct SessionInner {
    pub board: Board,
    pub state: SessionState,
    pub player1: Option<PlayerSlot>,
    pub player2: Option<PlayerSlot>,
}

impl SessionInner {
    fn new() -> Self {
        Self {
            board: INITIAL_BOARD,
            state: SessionState::AwaitingFirstPlayer,
            player1: None,
            player2: None,
        }
    }

    fn reset(&mut self) {
        self.board = INITIAL_BOARD;
        self.state = SessionState::AwaitingFirstPlayer;
        self.player1 = None;
        self.player2 = None;
    }

    pub fn slot(&self, slot: Slot) -> &Option<PlayerSlot> {
        match slot {
            Slot::One => &self.player1,
            Slot::Two => &self.player2,
        }
    }

    pub fn slot_mut(&mut self, slot: Slot) -> &mut Option<PlayerSlot> {
        match slot {
            Slot::One => &mut self.player1,
            Slot::Two => &mut self.player2,
        }
    }

    /// Which slot, if any, `id` currently occupies. A worker re-derives this
    /// every iteration rather than caching it, since the slot-1/slot-2 remap
    /// on early disconnect can change a worker's slot out from under it.
    pub fn slot_of(&self, id: ConnId) -> Option<Slot> {
        if self.player1.as_ref().is_some_and(|p| p.id == id) {
            Some(Slot::One)
        } else if self.player2.as_ref().is_some_and(|p| p.id == id) {
            Some(Slot::Two)
        } else {
            None
        }
    }
}

pub struct Session {
    index: AtomicUsize,
    pub inner: Mutex<SessionInner>,
}

impl Session {
    fn new(index: usize) -> Self {
        Self {
            index: AtomicUsize::new(index),
            inner: Mutex::new(SessionInner::new()),
        }
    }

    pub fn index(&self) -> usize {
        self.index.load(Ordering::Relaxed)
    }

    fn set_index(&self, index: usize) {
        self.index.store(index, Ordering::Relaxed);
    }

    /// Occupy the first open slot, advancing the session's state. Returns
    /// `None` if neither slot is open (the caller must not have reached
    /// here with a busy session).
    pub fn attach_player(&self, stream: TcpStream, id: ConnId) -> Option<Slot> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            SessionState::AwaitingFirstPlayer => {
                inner.player1 = Some(PlayerSlot { stream, name: String::new(), id });
                inner.state = SessionState::AwaitingSecondPlayer;
                Some(Slot::One)
            }
            SessionState::AwaitingSecondPlayer => {
                inner.player2 = Some(PlayerSlot { stream, name: String::new(), id });
                inner.state = SessionState::GameStart;
                Some(Slot::Two)
            }
            _ => None,
        }
    }
}

/// Error returned when every slab slot is occupied by a live game and the
/// configured ceiling forbids growing further.
#[derive(Debug)]
pub struct RegistryFull;

pub struct Registry {
    sessions: Mutex<Vec<Arc<Session>>>,
    max_sessions: usize,
}

impl Registry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(vec![Arc::new(Session::new(0))]),
            max_sessions,
        }
    }

    /// The current front session, without admitting or reusing anything.
    /// The supervisor inspects its state under its own lock before deciding
    /// whether to call [`Registry::admit`].
    pub fn front(&self) -> Arc<Session> {
        let sessions = self.sessions.lock().unwrap();
        Arc::clone(sessions.last().expect("registry is never empty"))
    }

    /// Find a reusable session (idle or finished) and move it to the front,
    /// or grow the slab with a fresh one. Mirrors the scan-then-append
    /// admission policy: earlier idle slots are preferred over growing.
    pub fn admit(&self, log: &Logger) -> Result<Arc<Session>, RegistryFull> {
        let mut sessions = self.sessions.lock().unwrap();
        let front = sessions.len() - 1;

        for i in 0..=front {
            let state = sessions[i].inner.lock().unwrap().state;
            if !state.is_reusable() {
                continue;
            }

            log.verbose(Event::RegistryReused { game: sessions[i].index(), state });

            if i != front {
                sessions.swap(i, front);
                sessions[i].set_index(i);
                sessions[front].set_index(front);
                log.verbose(Event::RegistrySwapped { from: i, to: front });
            }

            let session = Arc::clone(&sessions[front]);
            let mut inner = session.inner.lock().unwrap();
            if inner.state == SessionState::GameOver {
                inner.reset();
                log.verbose(Event::RegistryReset { game: session.index() });
            }
            drop(inner);
            return Ok(session);
        }

        if sessions.len() >= self.max_sessions {
            return Err(RegistryFull);
        }

        let index = sessions.len();
        let session = Arc::new(Session::new(index));
        sessions.push(Arc::clone(&session));
        log.verbose(Event::RegistryCreated { game: index, total: sessions.len() });
        Ok(session)
    }

    /// Whether `name` is already claimed by a non-idle session. An idle
    /// (`AWAITING_FIRST_PLAYER`) session never holds a name worth colliding
    /// with, so it is skipped outright.
    pub fn name_in_use(&self, name: &str) -> bool {
        let sessions = self.sessions.lock().unwrap();
        sessions.iter().any(|session| {
            let inner = session.inner.lock().unwrap();
            if inner.state == SessionState::AwaitingFirstPlayer {
                return false;
            }
            let matches = |slot: &Option<PlayerSlot>| slot.as_ref().is_some_and(|p| p.name == name);
            matches(&inner.player1) || matches(&inner.player2)
        })
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}
