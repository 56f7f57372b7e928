//! Integration tests for the Gridcast server, handler, and broadcast flow.
//!
//! The clients here are raw tokio sockets speaking the wire protocol
//! through the codec, so every assertion is about bytes the server
//! actually put on the wire.

use std::net::SocketAddr;
use std::time::Duration;

use gridcast::prelude::*;
use gridcast::protocol::{HEADER_SIZE, Header, MessageType, decode_frame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

// =========================================================================
// Helpers
// =========================================================================

fn pid(id: u32) -> ParticipantId {
    ParticipantId(id)
}

fn pos(x: i32, y: i32) -> Position {
    Position::new(x, y)
}

/// Starts a server on an ephemeral port with the default 40×20 grid.
async fn start_server() -> SocketAddr {
    let server = GridcastServer::builder()
        .host("127.0.0.1")
        .port(0)
        .build()
        .await
        .expect("server should bind");
    let addr = server.local_addr().expect("local addr");
    tokio::spawn(server.run());
    addr
}

/// A bare socket that speaks the protocol by hand.
struct RawClient {
    stream: TcpStream,
}

impl RawClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = timeout(WAIT, TcpStream::connect(addr))
            .await
            .expect("connect in time")
            .expect("connect");
        Self { stream }
    }

    /// Reads one complete frame, header included, as raw bytes.
    async fn read_frame(&mut self) -> Vec<u8> {
        let mut frame = vec![0u8; HEADER_SIZE];
        timeout(WAIT, self.stream.read_exact(&mut frame))
            .await
            .expect("frame header in time")
            .expect("read header");
        let header = Header::decode(&frame).expect("valid header");

        let mut payload = vec![0u8; header.payload_len as usize];
        timeout(WAIT, self.stream.read_exact(&mut payload))
            .await
            .expect("payload in time")
            .expect("read payload");
        frame.extend(payload);
        frame
    }

    async fn read_message(&mut self) -> Message {
        let frame = self.read_frame().await;
        decode_frame(&frame).expect("valid frame")
    }

    async fn read_snapshot(&mut self) -> StateSnapshot {
        match self.read_message().await {
            Message::StateSnapshot(snapshot) => snapshot,
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    /// Reads snapshots until one matches, skipping everything else.
    async fn snapshot_until(
        &mut self,
        mut pred: impl FnMut(&StateSnapshot) -> bool,
    ) -> StateSnapshot {
        loop {
            if let Message::StateSnapshot(snapshot) = self.read_message().await {
                if pred(&snapshot) {
                    return snapshot;
                }
            }
        }
    }

    async fn send(&mut self, message: impl Into<Message>) {
        let frame = message.into().encode();
        self.send_raw(&frame).await;
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write");
    }

    /// Waits for the server to close the connection.
    async fn expect_eof(&mut self) {
        let mut buf = [0u8; 64];
        loop {
            let n = timeout(WAIT, self.stream.read(&mut buf))
                .await
                .expect("eof in time")
                .unwrap_or(0);
            if n == 0 {
                return;
            }
        }
    }
}

/// Connects and consumes the welcome snapshot plus the join broadcast.
async fn join(addr: SocketAddr) -> (RawClient, ParticipantId) {
    let mut client = RawClient::connect(addr).await;
    let welcome = client.read_snapshot().await;
    assert!(!welcome.focus.is_none(), "welcome must be focused");
    let id = welcome.focus;
    let announce = client.read_snapshot().await;
    assert!(announce.focus.is_none(), "join broadcast must be unfocused");
    assert!(announce.contains(id));
    (client, id)
}

/// Two joined clients with nothing left in flight for either.
async fn joined_pair(addr: SocketAddr) -> (RawClient, RawClient) {
    let (mut a, _) = join(addr).await;
    let (b, b_id) = join(addr).await;
    // `a` also receives `b`'s join broadcast.
    a.snapshot_until(|s| s.contains(b_id)).await;
    (a, b)
}

fn movement(participant: ParticipantId, direction: Direction) -> Movement {
    Movement {
        participant,
        direction,
    }
}

// =========================================================================
// Joining
// =========================================================================

#[tokio::test]
async fn test_first_client_gets_focused_snapshot_at_origin() {
    let addr = start_server().await;
    let mut client = RawClient::connect(addr).await;

    let welcome = client.read_snapshot().await;
    assert_eq!(welcome.focus, pid(1));
    assert_eq!(welcome.participants.len(), 1);
    assert_eq!(welcome.position_of(pid(1)), Some(pos(0, 0)));

    let announce = client.read_snapshot().await;
    assert_eq!(announce.focus, ParticipantId::NONE);
    assert_eq!(announce.participants, welcome.participants);
}

#[tokio::test]
async fn test_second_client_spawns_next_cell_and_both_see_two() {
    let addr = start_server().await;
    let (mut first, first_id) = join(addr).await;

    let mut second = RawClient::connect(addr).await;
    let welcome = second.read_snapshot().await;
    assert_eq!(welcome.focus, pid(2));
    assert_eq!(welcome.position_of(pid(2)), Some(pos(1, 0)));
    assert_eq!(welcome.position_of(first_id), Some(pos(0, 0)));

    let seen = first.snapshot_until(|s| s.participants.len() == 2).await;
    assert_eq!(seen.position_of(pid(2)), Some(pos(1, 0)));
}

#[tokio::test]
async fn test_ids_increase_in_connect_order() {
    let addr = start_server().await;
    let mut ids = Vec::new();
    let mut clients = Vec::new();
    for _ in 0..4 {
        let (client, id) = join(addr).await;
        ids.push(id);
        clients.push(client);
    }
    assert_eq!(ids, vec![pid(1), pid(2), pid(3), pid(4)]);
}

// =========================================================================
// Movement
// =========================================================================

#[tokio::test]
async fn test_movement_right_broadcasts_new_position() {
    let addr = start_server().await;
    let (mut client, id) = join(addr).await;

    client.send(movement(id, Direction::Right)).await;
    let snapshot = client.read_snapshot().await;
    assert_eq!(snapshot.focus, ParticipantId::NONE);
    assert_eq!(snapshot.position_of(id), Some(pos(1, 0)));
}

#[tokio::test]
async fn test_movement_reaches_other_clients() {
    let addr = start_server().await;
    let (mut a, mut b) = joined_pair(addr).await;

    b.send(movement(pid(2), Direction::Down)).await;
    let seen_by_a = a.read_snapshot().await;
    assert_eq!(seen_by_a.position_of(pid(2)), Some(pos(1, 1)));
    let seen_by_b = b.read_snapshot().await;
    assert_eq!(seen_by_b, seen_by_a);
}

#[tokio::test]
async fn test_movement_into_wall_sends_nothing() {
    let addr = start_server().await;
    let (mut client, id) = join(addr).await;

    client.send(movement(id, Direction::Left)).await;
    client.send(movement(id, Direction::Up)).await;
    client.send(Chat::new(id, "marker")).await;

    // The chat comes first: neither blocked move produced a snapshot.
    match client.read_message().await {
        Message::Chat(chat) => assert_eq!(chat.text, b"marker"),
        other => panic!("expected chat, got {other:?}"),
    }
}

#[tokio::test]
async fn test_spoofed_movement_is_ignored() {
    let addr = start_server().await;
    let (mut client, id) = join(addr).await;

    client.send(movement(pid(99), Direction::Down)).await;
    client.send(Chat::new(id, "marker")).await;
    assert!(matches!(client.read_message().await, Message::Chat(_)));

    // The connection is still up and its own moves still work.
    client.send(movement(id, Direction::Down)).await;
    let snapshot = client.read_snapshot().await;
    assert_eq!(snapshot.position_of(id), Some(pos(0, 1)));
}

#[tokio::test]
async fn test_movement_for_other_participant_does_not_move_them() {
    let addr = start_server().await;
    let (mut a, mut b) = joined_pair(addr).await;

    b.send(movement(pid(1), Direction::Right)).await;
    b.send(Chat::new(pid(2), "marker")).await;

    assert!(matches!(a.read_message().await, Message::Chat(_)));
    assert!(matches!(b.read_message().await, Message::Chat(_)));

    a.send(movement(pid(1), Direction::Down)).await;
    let snapshot = a.read_snapshot().await;
    assert_eq!(snapshot.position_of(pid(1)), Some(pos(0, 1)));
}

#[tokio::test]
async fn test_snapshot_from_client_is_ignored() {
    let addr = start_server().await;
    let (mut client, id) = join(addr).await;

    let forged = StateSnapshot {
        focus: id,
        participants: Vec::new(),
    };
    client.send(forged).await;
    client.send(Chat::new(id, "marker")).await;

    assert!(matches!(client.read_message().await, Message::Chat(_)));
    client.send(movement(id, Direction::Right)).await;
    let snapshot = client.read_snapshot().await;
    assert_eq!(snapshot.participants.len(), 1);
    assert_eq!(snapshot.position_of(id), Some(pos(1, 0)));
}

// =========================================================================
// Chat
// =========================================================================

#[tokio::test]
async fn test_chat_rebroadcast_byte_identical_to_everyone() {
    let addr = start_server().await;
    let (mut a, mut b) = joined_pair(addr).await;

    let frame = Message::Chat(Chat::new(pid(7), "hi")).encode();
    a.send_raw(&frame).await;

    assert_eq!(a.read_frame().await, frame);
    assert_eq!(b.read_frame().await, frame);
}

#[tokio::test]
async fn test_chat_non_utf8_passes_through() {
    let addr = start_server().await;
    let (mut client, id) = join(addr).await;

    let frame = Message::Chat(Chat::new(id, vec![0xff, 0x00, 0xfe])).encode();
    client.send_raw(&frame).await;
    assert_eq!(client.read_frame().await, frame);
}

// =========================================================================
// Disconnects and malformed input
// =========================================================================

#[tokio::test]
async fn test_departure_is_broadcast_to_remaining_clients() {
    let addr = start_server().await;
    let (mut a, b) = joined_pair(addr).await;

    drop(b);
    let snapshot = a.snapshot_until(|s| !s.contains(pid(2))).await;
    assert_eq!(snapshot.participants.len(), 1);
    assert!(snapshot.contains(pid(1)));
}

#[tokio::test]
async fn test_bad_version_drops_only_that_connection() {
    let addr = start_server().await;
    let (mut a, mut b) = joined_pair(addr).await;

    let mut header = Header::new(MessageType::Chat, 4).encode();
    header[1] = 2;
    b.send_raw(&header).await;
    b.expect_eof().await;

    let snapshot = a.snapshot_until(|s| !s.contains(pid(2))).await;
    assert!(snapshot.contains(pid(1)));

    // The server keeps serving, and ids are never reused.
    let (_c, c_id) = join(addr).await;
    assert_eq!(c_id, pid(3));
}

#[tokio::test]
async fn test_unknown_type_drops_connection() {
    let addr = start_server().await;
    let (mut client, _) = join(addr).await;

    let mut header = Header::new(MessageType::Chat, 0).encode();
    header[3] = 9;
    client.send_raw(&header).await;
    client.expect_eof().await;
}

#[tokio::test]
async fn test_oversized_payload_drops_connection_without_reading_it() {
    let addr = start_server().await;
    let (mut client, _) = join(addr).await;

    // Declares 16 MiB; nothing follows.
    let mut header = Header::new(MessageType::Chat, 0).encode();
    header[4..8].copy_from_slice(&(16u32 << 20).to_be_bytes());
    client.send_raw(&header).await;
    client.expect_eof().await;
}

#[tokio::test]
async fn test_invalid_direction_drops_connection() {
    let addr = start_server().await;
    let (mut client, id) = join(addr).await;

    let mut bytes = Message::Movement(movement(id, Direction::Up)).encode().to_vec();
    // Direction code sits right after the participant id.
    bytes[HEADER_SIZE + 4] = 4;
    client.send_raw(&bytes).await;
    client.expect_eof().await;
}

// =========================================================================
// Shutdown
// =========================================================================

#[tokio::test]
async fn test_run_until_stops_and_disconnects_clients() {
    let server = GridcastServer::builder()
        .host("127.0.0.1")
        .port(0)
        .build()
        .await
        .expect("server should bind");
    let addr = server.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(server.run_until(async move {
        let _ = stop_rx.await;
    }));

    let (mut client, _) = join(addr).await;
    stop_tx.send(()).unwrap();

    let result = timeout(WAIT, running)
        .await
        .expect("server stops in time")
        .expect("task completes");
    assert!(result.is_ok());
    client.expect_eof().await;
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_small_grid_clamps_at_edges() {
    let server = GridcastServer::builder()
        .host("127.0.0.1")
        .port(0)
        .grid(GridConfig::new(2, 2))
        .build()
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    let (mut client, id) = join(addr).await;
    client.send(movement(id, Direction::Right)).await;
    assert_eq!(client.read_snapshot().await.position_of(id), Some(pos(1, 0)));

    client.send(movement(id, Direction::Right)).await;
    client.send(movement(id, Direction::Down)).await;
    let snapshot = client.read_snapshot().await;
    assert_eq!(snapshot.position_of(id), Some(pos(1, 1)));
}
