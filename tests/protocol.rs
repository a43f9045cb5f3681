//! End-to-end protocol tests driven over real loopback TCP connections
//! against an in-process server.

mod common;

use std::io::{Read, Write};

use nimd::codec;
use nimd::message::ClientMessage;

use common::{recv, send_move, send_open, TestServer};

#[test]
fn malformed_frame_gets_fail_invalid_and_closes() {
    let server = TestServer::start();
    let mut client = server.connect();

    // Wrong protocol id in the header: not recoverable, fatal.
    client.write_all(b"1|05|WAIT|").unwrap();

    let reply = recv(&mut client);
    assert_eq!(reply, b"FAIL|10 Invalid|");

    // The server closes its end after a fatal FAIL.
    let mut buf = [0u8; 1];
    assert_eq!(client.read(&mut buf).unwrap(), 0);
}

#[test]
fn name_over_72_bytes_is_rejected() {
    let server = TestServer::start();
    let mut client = server.connect();

    let long_name = "a".repeat(80);
    send_open(&mut client, &long_name);

    let reply = recv(&mut client);
    assert_eq!(reply, b"FAIL|21 Long Name|");
}

#[test]
fn a_second_open_on_the_same_connection_is_rejected() {
    let server = TestServer::start();
    let mut client = server.connect();

    send_open(&mut client, "Solo");
    assert_eq!(recv(&mut client), b"WAIT|");

    send_open(&mut client, "Solo Again");
    assert_eq!(recv(&mut client), b"FAIL|23 Already Open|");
}

#[test]
fn a_move_before_opening_is_rejected() {
    let server = TestServer::start();
    let mut client = server.connect();

    send_move(&mut client, 1, 1);
    assert_eq!(recv(&mut client), b"FAIL|24 Not Playing|");
}

#[test]
fn a_name_already_in_play_elsewhere_is_rejected() {
    let server = TestServer::start();

    // Pair up a full game in the front session so its sessions is "busy"
    // for any new arrival.
    let mut p1 = server.connect();
    let mut p2 = server.connect();
    send_open(&mut p1, "Alice");
    send_open(&mut p2, "Bob");
    assert_eq!(recv(&mut p1), b"WAIT|");
    assert_eq!(recv(&mut p2), b"WAIT|");
    assert_eq!(recv(&mut p1), b"NAME|1|Bob|");
    assert_eq!(recv(&mut p2), b"NAME|2|Alice|");
    assert_eq!(recv(&mut p1), b"PLAY|1|1 3 5 7 9|");
    assert_eq!(recv(&mut p2), b"PLAY|1|1 3 5 7 9|");

    // A third connection lands in a fresh session (the first one is busy)
    // and tries to reuse a name already claimed by the live game.
    let mut p3 = server.connect();
    send_open(&mut p3, "Alice");
    assert_eq!(recv(&mut p3), b"FAIL|22 Already Playing|");
}

#[test]
fn a_full_game_with_some_rejected_moves_ends_in_a_normal_win() {
    let server = TestServer::start();
    let mut p1 = server.connect();
    let mut p2 = server.connect();

    send_open(&mut p1, "A");
    send_open(&mut p2, "B");
    assert_eq!(recv(&mut p1), b"WAIT|");
    assert_eq!(recv(&mut p2), b"WAIT|");
    assert_eq!(recv(&mut p1), b"NAME|1|B|");
    assert_eq!(recv(&mut p2), b"NAME|2|A|");
    assert_eq!(recv(&mut p1), b"PLAY|1|1 3 5 7 9|");
    assert_eq!(recv(&mut p2), b"PLAY|1|1 3 5 7 9|");

    // P2 moves out of turn.
    send_move(&mut p2, 1, 1);
    assert_eq!(recv(&mut p2), b"FAIL|31 Impatient|");

    // P1 picks an invalid pile, then an invalid quantity.
    send_move(&mut p1, 0, 1);
    assert_eq!(recv(&mut p1), b"FAIL|32 Pile Index|");
    send_move(&mut p1, 1, 5);
    assert_eq!(recv(&mut p1), b"FAIL|33 Quantity|");

    // Clear every pile in turn order, ending with P1 taking the last stones.
    send_move(&mut p1, 1, 1);
    assert_eq!(recv(&mut p1), b"PLAY|2|0 3 5 7 9|");
    assert_eq!(recv(&mut p2), b"PLAY|2|0 3 5 7 9|");

    send_move(&mut p2, 2, 3);
    assert_eq!(recv(&mut p1), b"PLAY|1|0 0 5 7 9|");
    assert_eq!(recv(&mut p2), b"PLAY|1|0 0 5 7 9|");

    send_move(&mut p1, 3, 5);
    assert_eq!(recv(&mut p1), b"PLAY|2|0 0 0 7 9|");
    assert_eq!(recv(&mut p2), b"PLAY|2|0 0 0 7 9|");

    send_move(&mut p2, 4, 7);
    assert_eq!(recv(&mut p1), b"PLAY|1|0 0 0 0 9|");
    assert_eq!(recv(&mut p2), b"PLAY|1|0 0 0 0 9|");

    send_move(&mut p1, 5, 9);
    assert_eq!(recv(&mut p1), b"OVER|1|0 0 0 0 0||");
    assert_eq!(recv(&mut p2), b"OVER|1|0 0 0 0 0||");
}

#[test]
fn disconnecting_mid_game_forfeits_to_the_opponent() {
    let server = TestServer::start();
    let mut p1 = server.connect();
    let mut p2 = server.connect();

    send_open(&mut p1, "A");
    send_open(&mut p2, "B");
    assert_eq!(recv(&mut p1), b"WAIT|");
    assert_eq!(recv(&mut p2), b"WAIT|");
    assert_eq!(recv(&mut p1), b"NAME|1|B|");
    assert_eq!(recv(&mut p2), b"NAME|2|A|");
    assert_eq!(recv(&mut p1), b"PLAY|1|1 3 5 7 9|");
    assert_eq!(recv(&mut p2), b"PLAY|1|1 3 5 7 9|");

    drop(p1);

    assert_eq!(recv(&mut p2), b"OVER|2|1 3 5 7 9|Forfeit|");
}

/// A connection that arrives once the registry is saturated with live games
/// gets a well-formed failure frame rather than being wedged into a busy
/// session or dropped silently.
#[test]
fn a_connection_arriving_at_a_saturated_registry_gets_an_unavailable_notice() {
    let server = TestServer::with_max_sessions(1);
    let mut p1 = server.connect();
    let mut p2 = server.connect();

    send_open(&mut p1, "A");
    send_open(&mut p2, "B");
    assert_eq!(recv(&mut p1), b"WAIT|");
    assert_eq!(recv(&mut p2), b"WAIT|");
    assert_eq!(recv(&mut p1), b"NAME|1|B|");
    assert_eq!(recv(&mut p2), b"NAME|2|A|");
    assert_eq!(recv(&mut p1), b"PLAY|1|1 3 5 7 9|");
    assert_eq!(recv(&mut p2), b"PLAY|1|1 3 5 7 9|");

    let mut p3 = server.connect();
    assert_eq!(recv(&mut p3), b"FAIL|90 Unavailable|");

    let mut buf = [0u8; 1];
    assert_eq!(p3.read(&mut buf).unwrap(), 0);
}

/// Sanity check that the parser this suite leans on for crafting raw frames
/// agrees with the server's own reader.
#[test]
fn open_parses_back_through_the_shared_codec() {
    let mut buf = Vec::new();
    codec::write_frame(&mut buf, b"OPEN|X|").unwrap();
    let frame = codec::read_frame(&mut std::io::Cursor::new(buf)).unwrap();
    assert_eq!(ClientMessage::parse(&frame.payload).unwrap(), ClientMessage::Open { name: "X".to_string() });
}
