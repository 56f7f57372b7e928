//! Core protocol types for Gridcast's wire format.
//!
//! Every type here travels on the wire. The message set is closed: a
//! [`Message`] is exactly one of [`Movement`], [`StateSnapshot`], or
//! [`Chat`], and both ends dispatch on it with a plain `match`.

use std::fmt;

/// The protocol version written into every header.
pub const PROTOCOL_VERSION: u16 = 1;

// ---------------------------------------------------------------------------
// Identity and geometry
// ---------------------------------------------------------------------------

/// A server-assigned participant identifier.
///
/// Ids are allocated by the server starting at 1 and never reused within a
/// process lifetime. The value 0 is reserved: in a snapshot's focus field it
/// means "not addressed to anyone in particular".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ParticipantId(pub u32);

impl ParticipantId {
    /// The "no focus" sentinel.
    pub const NONE: ParticipantId = ParticipantId(0);

    /// Returns `true` for the reserved sentinel id.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A cell on the shared grid.
///
/// Signed on the wire so that out-of-range arithmetic can be expressed
/// before clamping; the server never publishes a negative coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One step on the grid. No diagonals, no "stay".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// All directions in wire-code order.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// The one-byte wire code.
    pub fn code(self) -> u8 {
        match self {
            Direction::Up => 0,
            Direction::Down => 1,
            Direction::Left => 2,
            Direction::Right => 3,
        }
    }

    /// Parses a wire code. Returns `None` for anything above 3.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    /// The unit step `(dx, dy)`. `y` grows downwards, so `Up` is `-1`.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Message payloads
// ---------------------------------------------------------------------------

/// Client → Server: "move my entity one step".
///
/// `participant` must be the sender's own id; the server drops movements
/// that name anyone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Movement {
    pub participant: ParticipantId,
    pub direction: Direction,
}

/// One row of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticipantState {
    pub participant: ParticipantId,
    pub position: Position,
}

/// Server → Client: the full, authoritative position list.
///
/// Built fresh for every send and never mutated afterwards. The order of
/// `participants` carries no meaning.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateSnapshot {
    /// The participant this snapshot is addressed to, or
    /// [`ParticipantId::NONE`] for a plain broadcast.
    pub focus: ParticipantId,
    pub participants: Vec<ParticipantState>,
}

impl StateSnapshot {
    /// Looks up one participant's position.
    pub fn position_of(&self, participant: ParticipantId) -> Option<Position> {
        self.participants
            .iter()
            .find(|entry| entry.participant == participant)
            .map(|entry| entry.position)
    }

    /// Returns `true` if `participant` appears in the snapshot.
    pub fn contains(&self, participant: ParticipantId) -> bool {
        self.position_of(participant).is_some()
    }
}

/// Either direction: a line of chat.
///
/// `text` is raw bytes passed through untouched; nothing checks that it is
/// UTF-8. Use [`Chat::text_lossy`] for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    pub participant: ParticipantId,
    pub text: Vec<u8>,
}

impl Chat {
    pub fn new(participant: ParticipantId, text: impl Into<Vec<u8>>) -> Self {
        Self {
            participant,
            text: text.into(),
        }
    }

    /// The text as UTF-8, with invalid sequences replaced.
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.text).into_owned()
    }
}

// ---------------------------------------------------------------------------
// Message: the closed set of everything on the wire
// ---------------------------------------------------------------------------

/// The header's type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Movement,
    StateSnapshot,
    Chat,
}

impl MessageType {
    /// The 16-bit wire tag.
    pub fn tag(self) -> u16 {
        match self {
            MessageType::Movement => 1,
            MessageType::StateSnapshot => 2,
            MessageType::Chat => 3,
        }
    }

    /// Parses a wire tag. Returns `None` for unknown tags.
    pub fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            1 => Some(MessageType::Movement),
            2 => Some(MessageType::StateSnapshot),
            3 => Some(MessageType::Chat),
            _ => None,
        }
    }
}

/// A decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Movement(Movement),
    StateSnapshot(StateSnapshot),
    Chat(Chat),
}

impl Message {
    /// The tag this message is framed with.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Movement(_) => MessageType::Movement,
            Message::StateSnapshot(_) => MessageType::StateSnapshot,
            Message::Chat(_) => MessageType::Chat,
        }
    }
}

impl From<Movement> for Message {
    fn from(value: Movement) -> Self {
        Message::Movement(value)
    }
}

impl From<StateSnapshot> for Message {
    fn from(value: StateSnapshot) -> Self {
        Message::StateSnapshot(value)
    }
}

impl From<Chat> for Message {
    fn from(value: Chat) -> Self {
        Message::Chat(value)
    }
}
