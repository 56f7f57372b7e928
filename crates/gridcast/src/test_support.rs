//! In-memory connection for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use gridcast_transport::{Connection, ConnectionId, TransportError};

/// Reads drain `inbound`, writes append to `outbound`. Running out of
/// inbound bytes looks like a peer close. With `fail_sends` set, every
/// send fails as if the peer had reset the connection.
#[derive(Default)]
pub(crate) struct MemoryConnection {
    pub(crate) inbound: Mutex<VecDeque<u8>>,
    pub(crate) outbound: Mutex<Vec<u8>>,
    pub(crate) reads: Mutex<Vec<usize>>,
    pub(crate) fail_sends: AtomicBool,
    closed: AtomicBool,
}

impl MemoryConnection {
    pub(crate) fn with_inbound(bytes: &[u8]) -> Self {
        let conn = Self::default();
        conn.inbound.lock().unwrap().extend(bytes);
        conn
    }

    pub(crate) fn failing() -> Self {
        let conn = Self::default();
        conn.fail_sends.store(true, Ordering::SeqCst);
        conn
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.outbound.lock().unwrap().clone()
    }
}

impl Connection for MemoryConnection {
    type Error = TransportError;

    async fn send_all(&self, data: &[u8]) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed(std::io::Error::from(
                std::io::ErrorKind::ConnectionReset,
            )));
        }
        self.outbound.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    async fn receive_exact(&self, len: usize) -> Result<Vec<u8>, TransportError> {
        if self.is_closed() {
            return Err(TransportError::InvalidState(
                "receive on closed connection",
            ));
        }
        self.reads.lock().unwrap().push(len);
        let mut inbound = self.inbound.lock().unwrap();
        if inbound.len() < len {
            return Err(TransportError::ConnectionClosed("eof".into()));
        }
        Ok(inbound.drain(..len).collect())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn id(&self) -> ConnectionId {
        ConnectionId::new(0)
    }
}
