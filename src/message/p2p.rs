//! Peer-to-peer routing operations and their wire encodings.
//!
//! Every operation carries the [`NodeInfo`] of its origin so that replies
//! can be addressed without any connection state. Socket addresses are
//! encoded as the 16 IPv6-mapped octets followed by the port; identifiers
//! travel as big-endian 64 bit integers.
//!
//! [`NodeInfo`]: ../../routing/identifier/struct.NodeInfo.html

use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use crate::routing::identifier::{Identifier, NodeInfo, RING_BITS};
use std::io;
use std::io::prelude::*;
use std::io::Cursor;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

/// Hop budget of a freshly issued [`Lookup`].
///
/// Generous enough for any consistent routing path; a lookup that exceeds it
/// is circling through a transiently inconsistent ring and is dropped.
///
/// [`Lookup`]: struct.Lookup.html
pub const MAXIMUM_HOPS: u8 = 4 * RING_BITS as u8;

/// Request to find the peer responsible for a key, forwarded hop by hop
#[derive(Debug, Clone)]
pub struct Lookup {
    pub origin: NodeInfo,
    pub key: Identifier,
    pub last_node: NodeInfo,
    pub time_to_live: u8,
    pub reached_destination: bool,
}

/// Reply to a [`Lookup`], sent directly to the origin
///
/// [`Lookup`]: struct.Lookup.html
#[derive(Debug, Clone)]
pub struct LookupResult {
    pub origin: NodeInfo,
    pub responder: NodeInfo,
    pub key: Identifier,
}

/// Ask a peer for its current predecessor
#[derive(Debug, Clone)]
pub struct RequestPredecessor {
    pub origin: NodeInfo,
}

/// Reply to a [`RequestPredecessor`]
///
/// [`RequestPredecessor`]: struct.RequestPredecessor.html
#[derive(Debug, Clone)]
pub struct PredecessorResponse {
    pub origin: NodeInfo,
    pub predecessor: Option<NodeInfo>,
}

/// Tell a peer that the origin might be its predecessor
#[derive(Debug, Clone)]
pub struct Notify {
    pub origin: NodeInfo,
}

fn read_node_info(cursor: &mut Cursor<&[u8]>) -> io::Result<NodeInfo> {
    let mut ip_arr = [0; 16];
    cursor.read_exact(&mut ip_arr)?;

    let ipv6 = Ipv6Addr::from(ip_arr);

    let ip_address = match ipv6.to_ipv4() {
        Some(ipv4) => IpAddr::V4(ipv4),
        None => IpAddr::V6(ipv6),
    };

    let port = cursor.read_u16::<NetworkEndian>()?;
    let identifier = Identifier::new(cursor.read_u64::<NetworkEndian>()?);

    Ok(NodeInfo::with_identifier(
        SocketAddr::new(ip_address, port),
        identifier,
    ))
}

fn write_node_info(node: &NodeInfo, buffer: &mut Vec<u8>) -> io::Result<()> {
    let ip_address = match node.addr().ip() {
        IpAddr::V4(ipv4) => ipv4.to_ipv6_mapped(),
        IpAddr::V6(ipv6) => ipv6,
    };

    buffer.write_all(&ip_address.octets())?;
    buffer.write_u16::<NetworkEndian>(node.addr().port())?;
    buffer.write_u64::<NetworkEndian>(node.identifier().value())?;

    Ok(())
}

impl Lookup {
    pub fn parse(mut cursor: Cursor<&[u8]>) -> io::Result<Self> {
        let origin = read_node_info(&mut cursor)?;
        let key = Identifier::new(cursor.read_u64::<NetworkEndian>()?);
        let last_node = read_node_info(&mut cursor)?;
        let time_to_live = cursor.read_u8()?;
        let reached_destination = cursor.read_u8()? != 0;

        Ok(Lookup {
            origin,
            key,
            last_node,
            time_to_live,
            reached_destination,
        })
    }

    pub fn write_bytes(&self, buffer: &mut Vec<u8>) -> io::Result<()> {
        write_node_info(&self.origin, buffer)?;
        buffer.write_u64::<NetworkEndian>(self.key.value())?;
        write_node_info(&self.last_node, buffer)?;
        buffer.write_u8(self.time_to_live)?;
        buffer.write_u8(self.reached_destination as u8)?;

        Ok(())
    }
}

impl LookupResult {
    pub fn parse(mut cursor: Cursor<&[u8]>) -> io::Result<Self> {
        let origin = read_node_info(&mut cursor)?;
        let responder = read_node_info(&mut cursor)?;
        let key = Identifier::new(cursor.read_u64::<NetworkEndian>()?);

        Ok(LookupResult {
            origin,
            responder,
            key,
        })
    }

    pub fn write_bytes(&self, buffer: &mut Vec<u8>) -> io::Result<()> {
        write_node_info(&self.origin, buffer)?;
        write_node_info(&self.responder, buffer)?;
        buffer.write_u64::<NetworkEndian>(self.key.value())?;

        Ok(())
    }
}

impl RequestPredecessor {
    pub fn parse(mut cursor: Cursor<&[u8]>) -> io::Result<Self> {
        let origin = read_node_info(&mut cursor)?;

        Ok(RequestPredecessor { origin })
    }

    pub fn write_bytes(&self, buffer: &mut Vec<u8>) -> io::Result<()> {
        write_node_info(&self.origin, buffer)
    }
}

impl PredecessorResponse {
    pub fn parse(mut cursor: Cursor<&[u8]>) -> io::Result<Self> {
        let origin = read_node_info(&mut cursor)?;

        let predecessor = if cursor.read_u8()? != 0 {
            Some(read_node_info(&mut cursor)?)
        } else {
            None
        };

        Ok(PredecessorResponse {
            origin,
            predecessor,
        })
    }

    pub fn write_bytes(&self, buffer: &mut Vec<u8>) -> io::Result<()> {
        write_node_info(&self.origin, buffer)?;

        match &self.predecessor {
            Some(predecessor) => {
                buffer.write_u8(1)?;
                write_node_info(predecessor, buffer)
            }
            None => buffer.write_u8(0),
        }
    }
}

impl Notify {
    pub fn parse(mut cursor: Cursor<&[u8]>) -> io::Result<Self> {
        let origin = read_node_info(&mut cursor)?;

        Ok(Notify { origin })
    }

    pub fn write_bytes(&self, buffer: &mut Vec<u8>) -> io::Result<()> {
        write_node_info(&self.origin, buffer)
    }
}
