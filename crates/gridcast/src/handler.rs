//! Per-connection handler: welcome, receive loop, and teardown.
//!
//! Each registered connection gets its own Tokio task running this
//! handler. The flow is:
//!   1. Send the newcomer a snapshot focused on itself
//!   2. Broadcast an unfocused snapshot so everyone sees the newcomer
//!   3. Loop: read frames → dispatch by message variant
//!   4. Teardown: close, remove from the registry, broadcast the departure
//!
//! A participant never re-enters the receive loop once teardown starts.

use std::sync::Arc;

use futures_util::future::join_all;
use gridcast_protocol::{Chat, Message, Movement, ParticipantId};
use gridcast_transport::{Connection, TransportError};

use crate::framing::{read_message, write_message};
use crate::server::ServerState;
use crate::GridcastError;

/// Handles a single participant from registration to removal.
pub(crate) async fn handle_connection<C>(
    participant: ParticipantId,
    conn: Arc<C>,
    state: Arc<ServerState<C>>,
) where
    C: Connection<Error = TransportError>,
{
    let conn_id = conn.id();

    // --- Step 1: Welcome ---
    let welcome = Message::StateSnapshot(state.registry.snapshot(participant));
    if let Err(e) = write_message(&*conn, &welcome).await {
        // Nobody has been told about this participant yet; drop it quietly.
        tracing::debug!(%participant, %conn_id, error = %e, "welcome failed");
        let _ = conn.close().await;
        state.registry.remove(participant);
        return;
    }
    tracing::info!(%participant, %conn_id, "participant joined");

    // --- Step 2: Announce ---
    broadcast_snapshot(&state).await;

    // --- Step 3: Receive loop ---
    let reason = receive_loop(participant, &*conn, &state).await;
    if ended_quietly(&reason, conn.is_closed()) {
        tracing::debug!(%participant, reason = %reason, "receive loop ended");
    } else {
        tracing::warn!(%participant, error = %reason, "dropping participant");
    }

    // --- Step 4: Teardown ---
    let _ = conn.close().await;
    state.registry.remove(participant);
    tracing::info!(%participant, %conn_id, "participant left");
    broadcast_snapshot(&state).await;
}

/// Whether a receive loop ended routinely: the peer hung up, or we closed
/// the connection ourselves and the next read found it closed.
fn ended_quietly(reason: &GridcastError, closed_locally: bool) -> bool {
    reason.is_disconnect() || closed_locally
}

/// Reads and dispatches messages until something goes wrong. Returns the
/// error that ended the loop; there is no other way out.
async fn receive_loop<C>(
    participant: ParticipantId,
    conn: &C,
    state: &ServerState<C>,
) -> GridcastError
where
    C: Connection<Error = TransportError>,
{
    loop {
        let message = match read_message(conn).await {
            Ok(message) => message,
            Err(e) => return e,
        };

        match message {
            Message::Movement(movement) => {
                handle_movement(participant, movement, state).await;
            }
            Message::Chat(chat) => handle_chat(participant, chat, state).await,
            Message::StateSnapshot(_) => {
                tracing::debug!(%participant, "ignoring snapshot from client");
            }
        }
    }
}

/// Applies a movement and broadcasts if anything changed.
///
/// A connection may only move the participant it registered as. Anything
/// else is logged and dropped; the connection stays up.
async fn handle_movement<C>(
    participant: ParticipantId,
    movement: Movement,
    state: &ServerState<C>,
) where
    C: Connection<Error = TransportError>,
{
    if movement.participant != participant {
        tracing::warn!(
            %participant,
            claimed = %movement.participant,
            "ignoring movement for another participant"
        );
        return;
    }

    if state.registry.apply_movement(participant, movement.direction) {
        tracing::debug!(
            %participant,
            direction = %movement.direction,
            "participant moved"
        );
        broadcast_snapshot(state).await;
    }
}

/// Relays a chat line to everyone, sender included. The server keeps no
/// history.
async fn handle_chat<C>(
    participant: ParticipantId,
    chat: Chat,
    state: &ServerState<C>,
) where
    C: Connection<Error = TransportError>,
{
    tracing::debug!(
        %participant,
        author = %chat.participant,
        len = chat.text.len(),
        "relaying chat"
    );
    let frame = Message::Chat(chat).encode();
    deliver(state, &frame, state.registry.recipients()).await;
}

/// Sends one unfocused snapshot of the registry to every participant.
async fn broadcast_snapshot<C>(state: &ServerState<C>)
where
    C: Connection<Error = TransportError>,
{
    let fan = state.registry.fan_out(ParticipantId::NONE);
    let frame = Message::StateSnapshot(fan.snapshot).encode();
    deliver(state, &frame, fan.recipients).await;
}

/// Writes `frame` to every recipient concurrently.
///
/// Best effort: a recipient whose send fails is removed and closed, and
/// the others are unaffected. Closing wakes that recipient's own task,
/// which then runs its normal teardown.
async fn deliver<C>(
    state: &ServerState<C>,
    frame: &[u8],
    recipients: Vec<(ParticipantId, Arc<C>)>,
) where
    C: Connection<Error = TransportError>,
{
    let sends = recipients.into_iter().map(|(participant, conn)| async move {
        let result = conn.send_all(frame).await;
        (participant, conn, result)
    });

    for (participant, conn, result) in join_all(sends).await {
        let Err(e) = result else { continue };
        if e.is_closed() || conn.is_closed() {
            tracing::debug!(%participant, error = %e, "recipient already closed");
        } else {
            tracing::warn!(%participant, error = %e, "broadcast send failed");
        }
        state.registry.remove(participant);
        let _ = conn.close().await;
    }
}
