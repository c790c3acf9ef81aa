//! Execution of inbound peer operations against the local node.
//!
//! The [`P2PHandler`] implements the [`MessageHandler`] trait and is the
//! dispatch point of the [`Server`]: every operation a peer sends is
//! matched to the [`Node`] method that carries its behavior and runs on
//! the worker thread the server assigned to it.
//!
//! [`P2PHandler`]: struct.P2PHandler.html
//! [`MessageHandler`]: ../network/trait.MessageHandler.html
//! [`Server`]: ../network/struct.Server.html
//! [`Node`]: ../node/struct.Node.html

use crate::message::Message;
use crate::network::MessageHandler;
use crate::node::Node;
use std::sync::Arc;

/// Handler for peer-to-peer requests
pub struct P2PHandler {
    node: Arc<Node>,
}

impl P2PHandler {
    /// Creates a new `P2PHandler` instance for the given node.
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }
}

impl MessageHandler for P2PHandler {
    fn handle_message(&self, msg: Message) {
        log::debug!("P2P handler received message of type {}", msg);

        match msg {
            Message::Lookup(lookup) => self.node.handle_lookup(lookup),
            Message::LookupResult(result) => self.node.handle_lookup_result(result),
            Message::RequestPredecessor(request) => {
                self.node.handle_request_predecessor(request)
            }
            Message::PredecessorResponse(response) => {
                self.node.handle_predecessor_response(response)
            }
            Message::Notify(notify) => self.node.handle_notify(notify),
        }
    }
}
