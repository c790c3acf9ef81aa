//! This crate contains the routing core of a peer-to-peer distributed hash
//! table based on the [Chord protocol][w:chord] using
//! [consistent hashing][w:cons].
//!
//! # Introduction
//!
//! Chord arranges peers on an identifier circle and gives every peer a
//! small amount of routing state: a predecessor, a list of successors and
//! one finger per identifier bit. With this state any peer can find the
//! peer responsible for an arbitrary key in a logarithmic number of
//! forwarding steps, while peers may join and fail at any time.
//!
//! This crate implements exactly that core: the per-node routing state, a
//! key-lookup engine that deduplicates concurrent requests, the periodic
//! stabilization protocol that keeps the ring consistent under churn and
//! the message dispatcher carrying routing operations between peers.
//! Storage layers, payload encryption and user-facing interfaces are
//! expected to be built on top; they only need [`route`] to find the peer
//! responsible for a key and [`send`] to deliver an operation to it.
//!
//! # Process Architecture
//!
//! A node is a single long-lived process. Peer communication uses TCP with
//! one message per connection; each message carries the origin peer so
//! replies can be addressed without connection state. Incoming operations
//! are handled by a thread pool such that requests are processed in
//! parallel while the shared routing state sits behind a single mutex that
//! is never held across network I/O. A dedicated timer thread runs the
//! stabilization pass with a fixed delay.
//!
//! [w:chord]: https://en.wikipedia.org/wiki/Chord_(peer-to-peer)
//! [w:cons]: https://en.wikipedia.org/wiki/Consistent_hashing
//! [`route`]: node/struct.Node.html#method.route
//! [`send`]: node/struct.Node.html#method.send

use crate::config::Config;
use crate::handler::P2PHandler;
use crate::network::Server;
use crate::node::Node;
use crate::routing::identifier::NodeInfo;
use crate::stabilization::{Bootstrap, Stabilization};
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

pub mod config;
pub mod error;
pub mod handler;
pub mod lookup;
pub mod message;
pub mod network;
pub mod node;
pub mod routing;
pub mod stabilization;

type Result<T> = std::result::Result<T, Box<dyn Error>>;

/// Runs an overlay node until its server terminates.
///
/// Starts listening for peer operations, joins the ring via the bootstrap
/// peer if one is given and schedules the periodic stabilization.
pub fn run(config: Config, bootstrap_addr: Option<SocketAddr>) -> Result<()> {
    let info = NodeInfo::new(config.listen_address);

    log::info!("Starting overlay node {}", info);

    let node = Arc::new(Node::new(info, config.timeout_ms));

    let handler = P2PHandler::new(Arc::clone(&node));
    let server = Server::new(handler);
    let server_handle = server.listen(config.listen_address, config.workers)?;

    if let Some(boot_addr) = bootstrap_addr {
        let bootstrap = Bootstrap::new(Arc::clone(&node), boot_addr);

        if !bootstrap.join() {
            return Err("could not join the ring via the bootstrap peer".into());
        }
    }

    Stabilization::new(node).start(config.stabilization_period);

    server_handle
        .join()
        .map_err(|_| "server thread panicked")?;

    Ok(())
}
