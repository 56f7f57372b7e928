//! Client session: a live local mirror of the server's grid.
//!
//! [`GridcastClient`] owns one connection and a background task that reads
//! every frame the server sends. The task folds snapshots and chat lines
//! into a [`ClientView`], which callers read with [`GridcastClient::view`]
//! or watch with [`GridcastClient::subscribe`]. Outgoing requests go
//! through the same codec as the server's broadcasts; nothing here builds
//! wire bytes by hand.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use gridcast_protocol::{
    Chat, Direction, Message, Movement, ParticipantId, Position, StateSnapshot,
};
use gridcast_transport::{Connection, TcpConnection};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::GridcastError;
use crate::framing::{read_message, write_message};

/// How many chat lines the view keeps. Older lines fall off the front.
pub const MAX_CHAT_LOG: usize = 8;

/// Longest chat line, in bytes, that [`GridcastClient::send_chat`] sends.
pub const MAX_CHAT_INPUT_LEN: usize = 200;

/// One received chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub participant: ParticipantId,
    pub text: String,
}

/// Everything the client currently knows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientView {
    /// Learned from the first snapshot focused on us.
    pub self_id: Option<ParticipantId>,
    /// Replaced wholesale by every snapshot.
    pub participants: BTreeMap<ParticipantId, Position>,
    /// The most recent [`MAX_CHAT_LOG`] lines, oldest first.
    pub chat_log: VecDeque<ChatEntry>,
    /// `false` once the receiver task has stopped.
    pub connected: bool,
    /// Why the session ended, unless it was closed locally.
    pub last_error: Option<String>,
}

impl ClientView {
    /// Where our own entity stands, once we know who we are.
    pub fn own_position(&self) -> Option<Position> {
        self.self_id
            .and_then(|id| self.participants.get(&id).copied())
    }

    fn apply_snapshot(&mut self, snapshot: StateSnapshot) {
        if !snapshot.focus.is_none() {
            self.self_id = Some(snapshot.focus);
        }
        self.participants = snapshot
            .participants
            .into_iter()
            .map(|entry| (entry.participant, entry.position))
            .collect();
    }

    fn push_chat(&mut self, chat: Chat) {
        if self.chat_log.len() == MAX_CHAT_LOG {
            self.chat_log.pop_front();
        }
        self.chat_log.push_back(ChatEntry {
            participant: chat.participant,
            text: chat.text_lossy(),
        });
    }
}

/// A connected client session.
///
/// Dropping the client stops its receiver task and closes the socket.
pub struct GridcastClient {
    conn: Arc<TcpConnection>,
    view: Arc<watch::Sender<ClientView>>,
    receiver: JoinHandle<()>,
}

impl GridcastClient {
    /// Connects to a server and starts receiving.
    ///
    /// # Errors
    /// [`TransportError::ResolveFailed`] or [`TransportError::ConnectFailed`]
    /// wrapped in [`GridcastError::Transport`].
    ///
    /// [`TransportError::ResolveFailed`]: gridcast_transport::TransportError::ResolveFailed
    /// [`TransportError::ConnectFailed`]: gridcast_transport::TransportError::ConnectFailed
    pub async fn connect(host: &str, port: u16) -> Result<Self, GridcastError> {
        let conn = Arc::new(TcpConnection::connect(host, port).await?);
        tracing::info!(conn_id = %conn.id(), peer = %conn.peer_addr(), "connected");

        let (view, _) = watch::channel(ClientView {
            connected: true,
            ..ClientView::default()
        });
        let view = Arc::new(view);
        let receiver =
            tokio::spawn(receive_loop(Arc::clone(&conn), Arc::clone(&view)));

        Ok(Self {
            conn,
            view,
            receiver,
        })
    }

    /// A copy of the current view.
    pub fn view(&self) -> ClientView {
        self.view.borrow().clone()
    }

    /// Watches the view. The receiver is marked changed on every update.
    pub fn subscribe(&self) -> watch::Receiver<ClientView> {
        self.view.subscribe()
    }

    /// Our participant id, once the server has told us.
    pub fn self_id(&self) -> Option<ParticipantId> {
        self.view.borrow().self_id
    }

    /// Asks the server to move our entity one cell.
    ///
    /// Returns `Ok(false)` without sending anything while our id is still
    /// unknown.
    pub async fn send_movement(
        &self,
        direction: Direction,
    ) -> Result<bool, GridcastError> {
        let Some(participant) = self.self_id() else {
            return Ok(false);
        };
        let movement = Movement {
            participant,
            direction,
        };
        write_message(&*self.conn, &Message::Movement(movement)).await?;
        Ok(true)
    }

    /// Sends a chat line, cut to [`MAX_CHAT_INPUT_LEN`] bytes.
    ///
    /// Returns `Ok(false)` without sending for empty text or while our id
    /// is still unknown.
    pub async fn send_chat(&self, text: &str) -> Result<bool, GridcastError> {
        if text.is_empty() {
            return Ok(false);
        }
        let Some(participant) = self.self_id() else {
            return Ok(false);
        };
        let text = truncate_at_char_boundary(text, MAX_CHAT_INPUT_LEN);
        let chat = Chat::new(participant, text.as_bytes());
        write_message(&*self.conn, &Message::Chat(chat)).await?;
        Ok(true)
    }

    /// Closes the connection. The receiver task notices and stops. Safe to
    /// call more than once.
    pub async fn close(&self) -> Result<(), GridcastError> {
        self.conn.close().await?;
        Ok(())
    }

    /// Waits until the session has ended, for whatever reason.
    pub async fn disconnected(&self) {
        let mut view = self.view.subscribe();
        // The sender lives in `self`, so the channel cannot close first.
        let _ = view.wait_for(|view| !view.connected).await;
    }
}

impl Drop for GridcastClient {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

/// Folds incoming frames into the view until the connection fails.
async fn receive_loop(
    conn: Arc<TcpConnection>,
    view: Arc<watch::Sender<ClientView>>,
) {
    let error = loop {
        match read_message(&*conn).await {
            Ok(Message::StateSnapshot(snapshot)) => {
                view.send_modify(|view| view.apply_snapshot(snapshot));
            }
            Ok(Message::Chat(chat)) => {
                view.send_modify(|view| view.push_chat(chat));
            }
            Ok(Message::Movement(_)) => {
                tracing::debug!("ignoring movement from server");
            }
            Err(e) => break e,
        }
    };

    let closed_locally = conn.is_closed();
    let _ = conn.close().await;
    if closed_locally {
        tracing::debug!("session closed");
    } else {
        tracing::info!(error = %error, "session ended");
    }

    view.send_modify(|view| {
        view.connected = false;
        if !closed_locally {
            view.last_error = Some(error.to_string());
        }
    });
}

/// Cuts `text` to at most `max` bytes without splitting a character.
fn truncate_at_char_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
