//! Identifiers on the ring and the arithmetic defined on them.
//!
//! An [`Identifier`] is a point on the identifier circle consisting of all
//! non-negative integers modulo `RING_SIZE = 2^RING_BITS`. Peers derive their
//! identifier from their socket address using the [`Identify`] trait, which
//! hashes the address with SHA-256 and reduces it modulo the ring size.
//!
//! The central predicate is [`is_between`], which decides whether an
//! identifier lies on the open clockwise arc between two others. The
//! half-open variants [`is_within`] and [`is_at_or_between`] include the
//! upper respectively the lower endpoint.
//!
//! [`Identifier`]: struct.Identifier.html
//! [`Identify`]: trait.Identify.html
//! [`is_between`]: struct.Identifier.html#method.is_between
//! [`is_within`]: struct.Identifier.html#method.is_within
//! [`is_at_or_between`]: struct.Identifier.html#method.is_at_or_between

use ring::digest;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Number of bits of an identifier; the finger table has one row per bit.
pub const RING_BITS: usize = 7;

/// Size of the identifier circle.
pub const RING_SIZE: u64 = 1 << RING_BITS;

const RING_MASK: u64 = RING_SIZE - 1;

/// A point on the identifier circle
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Identifier(u64);

impl Identifier {
    /// Creates an identifier from a raw integer, reduced modulo the ring
    /// size.
    ///
    /// # Examples
    ///
    /// ```
    /// # use overlay::routing::identifier::{Identifier, RING_SIZE};
    /// #
    /// assert_eq!(Identifier::new(3), Identifier::new(RING_SIZE + 3));
    /// ```
    pub fn new(value: u64) -> Self {
        Identifier(value & RING_MASK)
    }

    fn generate(bytes: &[u8]) -> Self {
        let dig = digest::digest(&digest::SHA256, bytes);
        let mut value = 0;

        for &byte in &dig.as_ref()[..8] {
            value = value << 8 | u64::from(byte);
        }

        Self::new(value)
    }

    /// Returns the raw value of this identifier.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns the length of the clockwise arc from `base` to this
    /// identifier.
    ///
    /// # Examples
    ///
    /// ```
    /// # use overlay::routing::identifier::{Identifier, RING_SIZE};
    /// #
    /// let distance = Identifier::new(2).distance_from(&Identifier::new(RING_SIZE - 2));
    ///
    /// assert_eq!(4, distance);
    /// ```
    pub fn distance_from(&self, base: &Identifier) -> u64 {
        self.0.wrapping_sub(base.0) & RING_MASK
    }

    /// Returns whether this identifier lies on the open clockwise arc from
    /// `lower` to `upper`.
    ///
    /// When `lower == upper` the arc is the entire circle excluding that
    /// point.
    ///
    /// # Examples
    ///
    /// ```
    /// # use overlay::routing::identifier::Identifier;
    /// #
    /// let id = Identifier::new(4);
    ///
    /// assert!(id.is_between(&Identifier::new(2), &Identifier::new(6)));
    /// assert!(!id.is_between(&Identifier::new(6), &Identifier::new(2)));
    /// ```
    pub fn is_between(&self, lower: &Identifier, upper: &Identifier) -> bool {
        let offset = self.distance_from(lower);
        let span = upper.distance_from(lower);

        if span == 0 {
            return offset != 0;
        }

        offset > 0 && offset < span
    }

    /// Like [`is_between`] but includes the upper endpoint.
    ///
    /// When `lower == upper` the arc wraps all the way around and ends at
    /// that point, so it covers the entire circle.
    ///
    /// [`is_between`]: #method.is_between
    pub fn is_within(&self, lower: &Identifier, upper: &Identifier) -> bool {
        let offset = self.distance_from(lower);
        let span = upper.distance_from(lower);

        if span == 0 {
            return true;
        }

        offset > 0 && offset <= span
    }

    /// Like [`is_between`] but includes the lower endpoint.
    ///
    /// [`is_between`]: #method.is_between
    pub fn is_at_or_between(&self, lower: &Identifier, upper: &Identifier) -> bool {
        *self == *lower || self.is_between(lower, upper)
    }

    /// Moves this identifier by `delta` positions along the circle.
    ///
    /// A negative `delta` moves counter-clockwise; the result is always a
    /// valid identifier.
    ///
    /// # Examples
    ///
    /// ```
    /// # use overlay::routing::identifier::{Identifier, RING_SIZE};
    /// #
    /// assert_eq!(Identifier::new(0), Identifier::new(RING_SIZE - 1).offset_by(1));
    /// assert_eq!(Identifier::new(RING_SIZE - 1), Identifier::new(0).offset_by(-1));
    /// ```
    pub fn offset_by(&self, delta: i64) -> Identifier {
        let value = (self.0 as i64 + delta).rem_euclid(RING_SIZE as i64);

        Identifier(value as u64)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Trait to obtain an identifier from a data structure
pub trait Identify {
    /// Generates an identifier for this object.
    fn identifier(&self) -> Identifier;
}

/// Hashes the IPv6-mapped octets of the ip address together with the port.
impl Identify for SocketAddr {
    fn identifier(&self) -> Identifier {
        let ip = match self.ip() {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => v6,
        };

        let mut bytes = [0; 18];
        bytes[..16].copy_from_slice(&ip.octets());
        bytes[16..].copy_from_slice(&self.port().to_be_bytes());

        Identifier::generate(&bytes)
    }
}

/// A peer on the ring, described by its socket address and its identifier
///
/// Two `NodeInfo` values are considered equal exactly when their identifiers
/// are equal. The value is never mutated after creation.
#[derive(Copy, Clone, Debug)]
pub struct NodeInfo {
    addr: SocketAddr,
    identifier: Identifier,
}

impl NodeInfo {
    /// Creates the node description for the given address, deriving the
    /// identifier from the address.
    pub fn new(addr: SocketAddr) -> Self {
        let identifier = addr.identifier();

        Self { addr, identifier }
    }

    /// Creates a node description with a fixed identifier instead of the
    /// derived one.
    pub fn with_identifier(addr: SocketAddr, identifier: Identifier) -> Self {
        Self { addr, identifier }
    }

    /// Returns the socket address of this peer.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the identifier of this peer on the ring.
    pub fn identifier(&self) -> Identifier {
        self.identifier
    }
}

impl PartialEq for NodeInfo {
    fn eq(&self, other: &NodeInfo) -> bool {
        self.identifier == other.identifier
    }
}

impl Eq for NodeInfo {}

impl std::hash::Hash for NodeInfo {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.identifier.hash(state)
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} at {}", self.identifier, self.addr)
    }
}
