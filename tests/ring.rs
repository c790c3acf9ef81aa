//! End-to-end scenarios on real loopback rings.
//!
//! Every test boots its nodes on dedicated ports and drives stabilization
//! by calling the pass directly, so convergence does not depend on timer
//! wall-clock behavior.

use overlay::handler::P2PHandler;
use overlay::network::Server;
use overlay::node::Node;
use overlay::routing::identifier::{Identifier, NodeInfo, RING_BITS};
use overlay::stabilization::{Bootstrap, Stabilization};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn start_node(id: u64, port: u16) -> Arc<Node> {
    let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
    let info = NodeInfo::with_identifier(addr, Identifier::new(id));

    let node = Arc::new(Node::new(info, 400));
    let server = Server::new(P2PHandler::new(Arc::clone(&node)));
    server.listen(addr, 4).expect("could not bind test node");

    node
}

fn join(node: &Arc<Node>, seed: &Arc<Node>) {
    let bootstrap = Bootstrap::new(Arc::clone(node), seed.info().addr());

    assert!(bootstrap.join(), "node {} could not join", node.info());
}

fn stabilize_round(nodes: &[&Arc<Node>]) {
    for &node in nodes {
        Stabilization::new(Arc::clone(node)).stabilize();
    }

    // let fire-and-forget notifications drain before the next round
    thread::sleep(Duration::from_millis(150));
}

#[test]
fn lonely_node_answers_its_own_lookups() {
    let a = start_node(3, 39110);

    assert_eq!(a.info(), a.route(5).expect("lookup failed"));
    assert_eq!(a.info(), a.route(3).expect("lookup failed"));

    let routing = a.routing().lock();

    assert_eq!(Some(a.info()), routing.predecessor());

    for index in 0..RING_BITS {
        assert_eq!(a.info(), routing.finger(index));
    }
}

#[test]
fn two_nodes_form_a_ring() {
    let a = start_node(3, 39120);
    let b = start_node(6, 39121);

    join(&b, &a);

    stabilize_round(&[&b, &a]);
    stabilize_round(&[&b, &a]);

    {
        let routing = a.routing().lock();
        assert_eq!(b.info(), routing.successor());
        assert_eq!(Some(b.info()), routing.predecessor());
    }

    {
        let routing = b.routing().lock();
        assert_eq!(a.info(), routing.successor());
        assert_eq!(Some(a.info()), routing.predecessor());
    }
}

#[test]
fn lookups_route_to_the_responsible_peer() {
    let a = start_node(16, 39130);
    let b = start_node(48, 39131);
    let c = start_node(80, 39132);
    let d = start_node(112, 39133);

    join(&b, &a);
    join(&c, &b);
    join(&d, &c);

    for _ in 0..3 {
        stabilize_round(&[&a, &b, &c, &d]);
    }

    // 100 lies between 80 and 112, so peer 112 is responsible
    assert_eq!(d.info(), a.route(100).expect("lookup failed"));

    // 0 wraps around past 112, so peer 16 is responsible
    assert_eq!(a.info(), c.route(0).expect("lookup failed"));

    // a peer id is owned by the peer itself
    assert_eq!(b.info(), d.route(48).expect("lookup failed"));
}

#[test]
fn a_node_joining_between_two_peers_is_linked_in() {
    let a = start_node(16, 39140);
    let b = start_node(80, 39141);

    join(&b, &a);
    stabilize_round(&[&b, &a]);

    let c = start_node(48, 39142);
    join(&c, &a);

    for _ in 0..3 {
        stabilize_round(&[&a, &b, &c]);
    }

    {
        let routing = a.routing().lock();
        assert_eq!(c.info(), routing.successor());
        assert_eq!(Some(b.info()), routing.predecessor());
    }

    {
        let routing = c.routing().lock();
        assert_eq!(b.info(), routing.successor());
        assert_eq!(Some(a.info()), routing.predecessor());
    }

    {
        let routing = b.routing().lock();
        assert_eq!(a.info(), routing.successor());
        assert_eq!(Some(c.info()), routing.predecessor());
    }

    // the fresh peer is found from everywhere
    assert_eq!(c.info(), a.route(48).expect("lookup failed"));
    assert_eq!(c.info(), b.route(48).expect("lookup failed"));
    assert_eq!(c.info(), c.route(48).expect("lookup failed"));
}

#[test]
fn concurrent_routes_for_one_key_agree() {
    let a = start_node(3, 39150);

    let mut workers = Vec::new();

    for _ in 0..10 {
        let node = Arc::clone(&a);
        workers.push(thread::spawn(move || node.route(6)));
    }

    for worker in workers {
        assert_eq!(a.info(), worker.join().unwrap().expect("lookup failed"));
    }
}
