//! The message types exchanged between peers.
//!
//! The [`Message`] enum combines the routing operations defined in the
//! [`p2p`] module and provides the framing used on the wire: a `u16` frame
//! size, a `u16` message type and the typed payload, all big-endian. Frames
//! are written and read through the [`Connection`] struct.
//!
//! [`Message`]: enum.Message.html
//! [`p2p`]: p2p/index.html
//! [`Connection`]: ../network/struct.Connection.html

use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{self, Cursor};

pub mod p2p;

/// A routing operation in transit between two peers
///
/// Every variant carries the `origin` of the operation, so each message is
/// self-contained: replies travel on fresh connections addressed at the
/// origin instead of reusing the inbound one.
#[derive(Debug)]
pub enum Message {
    /// Find the peer responsible for a key, forwarded along the ring.
    Lookup(p2p::Lookup),
    /// A responsible peer has been found for a previous `LOOKUP`.
    LookupResult(p2p::LookupResult),
    /// Query the predecessor of some other peer.
    RequestPredecessor(p2p::RequestPredecessor),
    /// Reply to `REQUEST PREDECESSOR` with the current predecessor.
    PredecessorResponse(p2p::PredecessorResponse),
    /// Tell some peer about a potentially new predecessor.
    Notify(p2p::Notify),
}

impl Message {
    pub const MAX_LENGTH: usize = 64000;

    const LOOKUP: u16 = 1000;
    const LOOKUP_RESULT: u16 = 1001;
    const REQUEST_PREDECESSOR: u16 = 1002;
    const PREDECESSOR_RESPONSE: u16 = 1003;
    const NOTIFY: u16 = 1004;

    pub fn parse(buffer: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(buffer);
        let size = cursor.read_u16::<NetworkEndian>()? as usize;
        let msg_type = cursor.read_u16::<NetworkEndian>()?;

        if buffer.len() != size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Non-matching message size",
            ));
        }

        let msg = match msg_type {
            Self::LOOKUP => Message::Lookup(p2p::Lookup::parse(cursor)?),
            Self::LOOKUP_RESULT => Message::LookupResult(p2p::LookupResult::parse(cursor)?),
            Self::REQUEST_PREDECESSOR => {
                Message::RequestPredecessor(p2p::RequestPredecessor::parse(cursor)?)
            }
            Self::PREDECESSOR_RESPONSE => {
                Message::PredecessorResponse(p2p::PredecessorResponse::parse(cursor)?)
            }
            Self::NOTIFY => Message::Notify(p2p::Notify::parse(cursor)?),
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "Invalid message type",
                ))
            }
        };

        Ok(msg)
    }

    pub fn write_bytes(&self, buffer: &mut Vec<u8>) -> io::Result<()> {
        buffer.clear();

        // reserve two bytes for the size
        buffer.write_u16::<NetworkEndian>(0)?;

        match self {
            Message::Lookup(lookup) => {
                buffer.write_u16::<NetworkEndian>(Self::LOOKUP)?;
                lookup.write_bytes(buffer)?;
            }
            Message::LookupResult(lookup_result) => {
                buffer.write_u16::<NetworkEndian>(Self::LOOKUP_RESULT)?;
                lookup_result.write_bytes(buffer)?;
            }
            Message::RequestPredecessor(request_predecessor) => {
                buffer.write_u16::<NetworkEndian>(Self::REQUEST_PREDECESSOR)?;
                request_predecessor.write_bytes(buffer)?;
            }
            Message::PredecessorResponse(predecessor_response) => {
                buffer.write_u16::<NetworkEndian>(Self::PREDECESSOR_RESPONSE)?;
                predecessor_response.write_bytes(buffer)?;
            }
            Message::Notify(notify) => {
                buffer.write_u16::<NetworkEndian>(Self::NOTIFY)?;
                notify.write_bytes(buffer)?;
            }
        }

        // write size at beginning of buffer
        let size = buffer.len();

        if size > Self::MAX_LENGTH {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Message exceeded maximum length",
            ));
        }

        buffer
            .as_mut_slice()
            .write_u16::<NetworkEndian>(size as u16)?;

        Ok(())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Message::Lookup(_) => write!(f, "LOOKUP"),
            Message::LookupResult(_) => write!(f, "LOOKUP RESULT"),
            Message::RequestPredecessor(_) => write!(f, "REQUEST PREDECESSOR"),
            Message::PredecessorResponse(_) => write!(f, "PREDECESSOR RESPONSE"),
            Message::Notify(_) => write!(f, "NOTIFY"),
        }
    }
}
