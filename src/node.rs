//! The local overlay state machine.
//!
//! A [`Node`] ties the routing state, the in-flight lookup bookkeeping and
//! the outbound networking together. Inbound operations parsed by the
//! [`handler`] are executed against the node on the server's worker pool;
//! the [`stabilization`] task drives the periodic maintenance against the
//! same node.
//!
//! Operations arriving off the wire never carry a reference back to the
//! node; they are plain values and receive the node as the execution
//! context.
//!
//! [`Node`]: struct.Node.html
//! [`handler`]: ../handler/index.html
//! [`stabilization`]: ../stabilization/index.html

use crate::error::LookupError;
use crate::lookup::{LookupEngine, LookupFuture, Promise};
use crate::message::p2p::{
    Lookup, LookupResult, Notify, PredecessorResponse, RequestPredecessor, MAXIMUM_HOPS,
};
use crate::message::Message;
use crate::network::Connection;
use crate::routing::identifier::{Identifier, NodeInfo};
use crate::routing::FingerTable;
use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// Deadline for a single lookup; also bounds the predecessor liveness
/// probe during stabilization.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_millis(400);

/// The local peer with all of its mutable overlay state
///
/// The routing table is the only state shared between the server workers
/// and the stabilizer; no operation holds its lock while talking to the
/// network.
pub struct Node {
    info: NodeInfo,
    routing: Mutex<FingerTable>,
    lookups: LookupEngine,
    pending_predecessor: Mutex<Option<Promise<Option<NodeInfo>>>>,
    timeout_ms: u64,
}

impl Node {
    /// Creates the state of a fresh peer that knows nobody but itself.
    ///
    /// `timeout_ms` bounds connecting to and writing at remote peers.
    pub fn new(info: NodeInfo, timeout_ms: u64) -> Self {
        Self {
            info,
            routing: Mutex::new(FingerTable::new(info)),
            lookups: LookupEngine::new(),
            pending_predecessor: Mutex::new(None),
            timeout_ms,
        }
    }

    /// Returns the description of the local peer.
    pub fn info(&self) -> NodeInfo {
        self.info
    }

    /// Returns the routing state of this peer.
    pub fn routing(&self) -> &Mutex<FingerTable> {
        &self.routing
    }

    /// Delivers a message to the given peer.
    ///
    /// A failure to deliver declares the peer failed before it is returned
    /// to the caller; it is never fatal.
    pub fn send(&self, target: &NodeInfo, msg: &Message) -> io::Result<()> {
        let result = Connection::open(target.addr(), self.timeout_ms)
            .and_then(|mut con| con.send(msg));

        if let Err(ref err) = result {
            log::warn!("Could not deliver {} to peer {}: {}", msg, target, err);
            self.fail_peer(target);
        }

        result
    }

    /// Starts or joins a lookup for the peer responsible for `key`.
    ///
    /// A lookup for the key that is already in flight is shared; otherwise
    /// a lookup operation leaves towards the best known peer. The returned
    /// future completes once a responsible peer reports back or the lookup
    /// is abandoned.
    pub fn lookup(&self, key: Identifier) -> LookupFuture {
        let (future, created) = self.lookups.begin(key);

        if !created {
            return future;
        }

        let (reached_destination, next) = {
            let routing = self.routing.lock();

            if routing.key_belongs_to_successor(&key) {
                (true, routing.successor())
            } else {
                (false, routing.next_best_node(&key))
            }
        };

        log::debug!("Starting lookup for key {} via peer {}", key, next);

        let op = Lookup {
            origin: self.info,
            key,
            last_node: self.info,
            time_to_live: MAXIMUM_HOPS,
            reached_destination,
        };

        // a send failure surfaces to the caller as a timeout on the future
        let _ = self.send(&next, &Message::Lookup(op));

        future
    }

    /// Dispatches a lookup through an explicit peer instead of the own
    /// routing state; used while joining, when the table knows nobody.
    pub fn lookup_via(&self, key: Identifier, via: SocketAddr) -> LookupFuture {
        let (future, created) = self.lookups.begin(key);

        if !created {
            return future;
        }

        let op = Lookup {
            origin: self.info,
            key,
            last_node: self.info,
            time_to_live: MAXIMUM_HOPS,
            reached_destination: false,
        };

        let result = Connection::open(via, self.timeout_ms)
            .and_then(|mut con| con.send(&Message::Lookup(op)));

        if let Err(err) = result {
            log::warn!("Could not reach peer {} for a lookup: {}", via, err);
            self.lookups.fail(&key);
        }

        future
    }

    /// Resolves the peer responsible for `key` on the current ring view.
    ///
    /// Blocks for at most [`LOOKUP_TIMEOUT`]; an expired deadline abandons
    /// the lookup for all waiters.
    ///
    /// [`LOOKUP_TIMEOUT`]: constant.LOOKUP_TIMEOUT.html
    pub fn route(&self, key: u64) -> Result<NodeInfo, LookupError> {
        let key = Identifier::new(key);

        match self.lookup(key).wait_for(LOOKUP_TIMEOUT) {
            Some(outcome) => outcome,
            None => {
                self.abandon_lookup(&key);

                Err(LookupError::Timeout)
            }
        }
    }

    /// Abandons the lookup for `key`.
    ///
    /// The handle is removed and every waiter sees a failure; a result
    /// arriving later is ignored.
    pub fn abandon_lookup(&self, key: &Identifier) {
        self.lookups.fail(key);
    }

    /// Records that a peer has been observed alive.
    pub fn observe_peer(&self, peer: &NodeInfo) {
        if *peer == self.info {
            return;
        }

        self.routing.lock().inform_existence(*peer);
    }

    /// Evicts a failed peer from the routing state and issues the lookups
    /// that repair the table.
    pub fn fail_peer(&self, peer: &NodeInfo) {
        if *peer == self.info {
            return;
        }

        let repair = self.routing.lock().inform_failure(peer);

        if let Some(key) = repair.replenish_successor {
            self.lookup(key);
        }

        for key in repair.refresh {
            self.lookup(key);
        }
    }

    /// Executes a routing lookup that arrived from a peer.
    ///
    /// The hop budget protects against cycles through a transiently
    /// inconsistent ring; an exhausted operation is dropped without a
    /// reply and the origin runs into its deadline.
    pub fn handle_lookup(&self, mut op: Lookup) {
        if op.time_to_live == 0 {
            log::debug!("Dropping lookup for key {} that ran out of hops", op.key);
            return;
        }

        op.time_to_live -= 1;

        let origin = op.origin;
        let previous = op.last_node;
        op.last_node = self.info;

        if op.reached_destination {
            let result = LookupResult {
                origin: self.info,
                responder: self.info,
                key: op.key,
            };

            log::debug!("Answering lookup for key {} towards peer {}", op.key, origin);

            let _ = self.send(&origin, &Message::LookupResult(result));
            self.observe_peer(&origin);

            return;
        }

        let (reached_destination, next) = {
            let routing = self.routing.lock();
            let next = routing.next_best_node(&op.key);

            // a node whose fingers all point at itself forwards to its
            // successor instead
            let next = if next == self.info {
                routing.successor()
            } else {
                next
            };

            (routing.key_belongs_to_successor(&op.key), next)
        };

        op.reached_destination = reached_destination;

        log::debug!("Forwarding lookup for key {} to peer {}", op.key, next);

        let _ = self.send(&next, &Message::Lookup(op));

        self.observe_peer(&origin);
        self.observe_peer(&previous);
    }

    /// Completes the local lookup a peer has answered.
    pub fn handle_lookup_result(&self, result: LookupResult) {
        match self.lookups.take(&result.key) {
            Some(future) => {
                log::debug!(
                    "Lookup for key {} answered by peer {}",
                    result.key,
                    result.responder
                );

                self.observe_peer(&result.responder);
                future.complete(Ok(result.responder));
            }
            None => log::debug!(
                "Ignoring answer for key {} with no lookup in flight",
                result.key
            ),
        }
    }

    /// Replies to a predecessor query with the current predecessor.
    pub fn handle_request_predecessor(&self, request: RequestPredecessor) {
        let response = PredecessorResponse {
            origin: self.info,
            predecessor: self.routing.lock().predecessor(),
        };

        let _ = self.send(&request.origin, &Message::PredecessorResponse(response));
    }

    /// Completes the pending predecessor query, if one is outstanding.
    pub fn handle_predecessor_response(&self, response: PredecessorResponse) {
        match self.pending_predecessor.lock().take() {
            Some(promise) => {
                promise.complete(response.predecessor);
            }
            None => log::debug!("Ignoring predecessor response from peer {}", response.origin),
        }

        self.observe_peer(&response.origin);
    }

    /// Considers the origin of a notify message as a new predecessor.
    pub fn handle_notify(&self, notify: Notify) {
        let updated = self.routing.lock().update_predecessor(notify.origin);

        if updated {
            log::info!("Adopted peer {} as predecessor", notify.origin);
        }
    }

    /// Queries a peer for its predecessor.
    ///
    /// At most one query is outstanding at a time; a caller arriving while
    /// one is in flight shares its promise. The promise completes with
    /// `None` when the peer reports no predecessor or cannot be reached.
    pub fn query_predecessor_of(&self, peer: &NodeInfo) -> Promise<Option<NodeInfo>> {
        let promise = {
            let mut pending = self.pending_predecessor.lock();

            if let Some(existing) = pending.as_ref() {
                return existing.clone();
            }

            let promise = Promise::new();
            *pending = Some(promise.clone());

            promise
        };

        let request = RequestPredecessor { origin: self.info };

        if self.send(peer, &Message::RequestPredecessor(request)).is_err() {
            self.abandon_predecessor_query();
        }

        promise
    }

    /// Gives up on the outstanding predecessor query.
    ///
    /// Waiters observe an empty reply; a response racing in at the same
    /// moment wins.
    pub fn abandon_predecessor_query(&self) {
        if let Some(promise) = self.pending_predecessor.lock().take() {
            promise.complete(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn peer(id: u64, port: u16) -> NodeInfo {
        let addr = format!("127.0.0.1:{}", port).parse().unwrap();

        NodeInfo::with_identifier(addr, Identifier::new(id))
    }

    #[test]
    fn exhausted_lookups_are_dropped_silently() {
        let node = Node::new(peer(3, 41001), 50);
        let origin = peer(6, 41002);

        node.observe_peer(&origin);
        assert!(node.routing().lock().has_successors());

        let op = Lookup {
            origin,
            key: Identifier::new(5),
            last_node: origin,
            time_to_live: 0,
            reached_destination: true,
        };

        // a dropped operation never answers, so no send can fail and the
        // origin stays in the successor list
        node.handle_lookup(op);

        assert!(node.routing().lock().has_successors());
    }

    #[test]
    fn undeliverable_sends_evict_the_peer() {
        let node = Node::new(peer(3, 41011), 50);
        let unreachable = peer(6, 41012);

        node.observe_peer(&unreachable);
        assert!(node.routing().lock().has_successors());

        let notify = Message::Notify(Notify { origin: node.info() });

        assert!(node.send(&unreachable, &notify).is_err());
        assert!(!node.routing().lock().has_successors());
    }

    #[test]
    fn predecessor_queries_share_one_outstanding_promise() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let successor = NodeInfo::with_identifier(listener.local_addr().unwrap(), Identifier::new(6));

        let node = Node::new(peer(3, 41021), 400);
        node.observe_peer(&successor);

        let first = node.query_predecessor_of(&successor);
        let second = node.query_predecessor_of(&successor);

        let reply = PredecessorResponse {
            origin: successor,
            predecessor: Some(peer(1, 41022)),
        };
        node.handle_predecessor_response(reply);

        let timeout = Duration::from_millis(10);
        assert_eq!(Some(Some(peer(1, 41022))), first.wait_for(timeout));
        assert_eq!(Some(Some(peer(1, 41022))), second.wait_for(timeout));
    }
}
