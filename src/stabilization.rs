//! Joining the ring and keeping the routing state consistent under churn.
//!
//! The [`Bootstrap`] struct contacts an existing ring member once to learn
//! the own successor, fill the finger table and adopt a predecessor. The
//! [`Stabilization`] struct should run in regular intervals afterwards to
//! make sure that peers joining and leaving the network are recognized and
//! the finger table keeps pointing at live peers.
//!
//! [`Bootstrap`]: struct.Bootstrap.html
//! [`Stabilization`]: struct.Stabilization.html

use crate::message::p2p::Notify;
use crate::message::Message;
use crate::node::{Node, LOOKUP_TIMEOUT};
use crate::routing::identifier::{NodeInfo, RING_BITS};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Default delay between two stabilization passes.
pub const STABILIZATION_PERIOD: Duration = Duration::from_secs(5);

/// Basic information needed to join the ring via a bootstrap peer
pub struct Bootstrap {
    node: Arc<Node>,
    boot_addr: SocketAddr,
}

impl Bootstrap {
    /// Prepares joining the ring known to the peer at `boot_addr`.
    pub fn new(node: Arc<Node>, boot_addr: SocketAddr) -> Self {
        Self { node, boot_addr }
    }

    /// Joins the ring.
    ///
    /// Looks up the identifier right after our own, starting at the
    /// bootstrap peer; the answering peer is responsible for our identifier
    /// range and becomes our successor. After that the finger table is
    /// filled and the successor's predecessor is adopted as our own.
    ///
    /// Returns whether the ring was joined.
    pub fn join(&self) -> bool {
        let info = self.node.info();
        let key = info.identifier().offset_by(1);

        log::info!("Joining the ring via bootstrap peer {}", self.boot_addr);

        let successor = match self.node.lookup_via(key, self.boot_addr).wait_for(LOOKUP_TIMEOUT) {
            Some(Ok(successor)) => successor,
            Some(Err(err)) => {
                log::error!("Bootstrap peer {} yielded no successor: {}", self.boot_addr, err);
                return false;
            }
            None => {
                log::error!("Bootstrap peer {} did not answer", self.boot_addr);
                self.node.abandon_lookup(&key);
                return false;
            }
        };

        log::info!("Joined the ring with successor {}", successor);

        let stabilization = Stabilization::new(Arc::clone(&self.node));
        stabilization.fill_finger_table();

        match self.node.query_predecessor_of(&successor).wait_for(LOOKUP_TIMEOUT) {
            Some(Some(predecessor)) => {
                log::info!("Adopting peer {} as initial predecessor", predecessor);
                self.node.observe_peer(&predecessor);
            }
            Some(None) => {}
            None => self.node.abandon_predecessor_query(),
        }

        true
    }
}

/// Periodic maintenance of the routing state
///
/// One pass runs three sub-protocols in order; a failure in one of them
/// does not keep the others from running. The pass is driven by a single
/// thread, so two passes never overlap.
pub struct Stabilization {
    node: Arc<Node>,
}

impl Stabilization {
    /// Creates the maintenance task for the given node.
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }

    /// Runs one full stabilization pass.
    pub fn stabilize(&self) {
        log::debug!("Stabilizing routing information");

        self.stabilize_successor();
        self.stabilize_predecessor();
        self.fill_finger_table();

        log::debug!(
            "Current routing information:\n\n{:#?}",
            *self.node.routing().lock()
        );
    }

    /// Reconciles the successor pointer with the successor's own view.
    ///
    /// The successor is asked for its predecessor. A reply strictly between
    /// us and the successor is a peer that joined in between and becomes
    /// the new successor. Either way the successor is notified that we
    /// consider ourselves its predecessor.
    pub fn stabilize_successor(&self) {
        let info = self.node.info();
        let successor = self.node.routing().lock().successor();

        if successor == info {
            return;
        }

        let reply = match self.node.query_predecessor_of(&successor).wait_for(LOOKUP_TIMEOUT) {
            Some(reply) => reply,
            None => {
                self.node.abandon_predecessor_query();
                None
            }
        };

        if let Some(predecessor) = reply {
            let closes_the_ring = predecessor
                .identifier()
                .is_between(&info.identifier(), &successor.identifier());

            if closes_the_ring {
                log::info!("Updating successor to peer {}", predecessor);
                self.node.observe_peer(&predecessor);
            }
        }

        let successor = self.node.routing().lock().successor();

        if successor != info {
            let notify = Notify { origin: info };
            let _ = self.node.send(&successor, &Message::Notify(notify));
        }
    }

    /// Probes the predecessor for liveness.
    ///
    /// The predecessor is looked up on the ring with a bounded deadline. A
    /// completed lookup refreshes the reference; an expired one presumes
    /// the predecessor failed and evicts it everywhere.
    pub fn stabilize_predecessor(&self) {
        let info = self.node.info();

        let predecessor = match self.node.routing().lock().predecessor() {
            Some(predecessor) if predecessor != info => predecessor,
            _ => return,
        };

        let key = predecessor.identifier();

        match self.node.lookup(key).wait_for(LOOKUP_TIMEOUT) {
            Some(Ok(found)) => {
                self.node.routing().lock().set_predecessor(Some(found));
            }
            Some(Err(_)) => self.evict_predecessor(predecessor),
            None => {
                self.node.abandon_lookup(&key);
                self.evict_predecessor(predecessor);
            }
        }
    }

    fn evict_predecessor(&self, predecessor: NodeInfo) {
        log::info!("Predecessor {} presumed failed", predecessor);
        self.node.fail_peer(&predecessor);
    }

    /// Refreshes the fingers that shortcut across the ring.
    ///
    /// A finger start covered by a known successor or by the first finger
    /// is served from the table; everything else is looked up with a
    /// bounded deadline. A finger whose lookup expires falls back to the
    /// local peer until the next pass.
    pub fn fill_finger_table(&self) {
        let info = self.node.info();

        for index in 1..RING_BITS {
            let start;

            {
                let mut routing = self.node.routing().lock();
                start = routing.finger_start(index);

                if let Some(successor) = routing.successor_covering(&start) {
                    routing.set_finger(index, successor);
                    continue;
                }

                let first = routing.finger(0);

                if start.is_within(&info.identifier(), &first.identifier()) {
                    routing.set_finger(index, first);
                    continue;
                }
            }

            match self.node.lookup(start).wait_for(LOOKUP_TIMEOUT) {
                Some(Ok(peer)) => {
                    self.node.routing().lock().set_finger(index, peer);
                }
                _ => {
                    self.node.abandon_lookup(&start);
                    self.node.routing().lock().set_finger(index, info);
                }
            }
        }
    }

    /// Schedules the maintenance task.
    ///
    /// The pass repeats with a fixed delay, so a slow pass postpones the
    /// next one instead of letting ticks pile up.
    pub fn start(self, period: Duration) -> thread::JoinHandle<()> {
        thread::spawn(move || loop {
            self.stabilize();
            thread::sleep(period);
        })
    }
}
