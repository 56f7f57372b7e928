//! Whole-message reads and writes over a [`Connection`].
//!
//! A frame is read in two steps: the fixed-size header first, then exactly
//! the number of payload bytes it declares. A bad header is rejected before
//! any payload is read.

use gridcast_protocol::{HEADER_SIZE, Header, Message, decode_payload};
use gridcast_transport::{Connection, TransportError};

use crate::GridcastError;

/// Reads and decodes the next message.
///
/// # Errors
/// Transport errors from either read, or a [`ProtocolError`] from the
/// header or payload. Both are terminal for the connection.
///
/// [`ProtocolError`]: gridcast_protocol::ProtocolError
pub async fn read_message<C>(conn: &C) -> Result<Message, GridcastError>
where
    C: Connection<Error = TransportError>,
{
    let header_bytes = conn.receive_exact(HEADER_SIZE).await?;
    let header = Header::decode(&header_bytes)?;
    let payload = conn.receive_exact(header.payload_len as usize).await?;
    Ok(decode_payload(&header, &payload)?)
}

/// Encodes `message` and writes the whole frame.
pub async fn write_message<C>(
    conn: &C,
    message: &Message,
) -> Result<(), GridcastError>
where
    C: Connection<Error = TransportError>,
{
    conn.send_all(&message.encode()).await?;
    Ok(())
}
