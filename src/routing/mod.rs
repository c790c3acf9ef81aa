//! Identifier-based routing state of a single peer.
//!
//! The [`FingerTable`] holds everything a peer believes about the ring: its
//! predecessor, one finger per identifier bit and a bounded list of
//! successors in clockwise order. Fingers are shortcuts to the peers
//! responsible for every `2^i`-th identifier after our own, which lets a
//! lookup reach the responsible peer in `O(log(N))` forwarding steps where
//! `N` is the size of the whole network.
//!
//! The table is plain state: it never performs network I/O on its own.
//! Observations about other peers arrive through [`inform_existence`] and
//! [`inform_failure`]; the latter reports which lookups the owning node
//! should issue to repair the table.
//!
//! [`FingerTable`]: struct.FingerTable.html
//! [`inform_existence`]: struct.FingerTable.html#method.inform_existence
//! [`inform_failure`]: struct.FingerTable.html#method.inform_failure

use self::identifier::{Identifier, NodeInfo, RING_BITS};

pub mod identifier;

/// Maximum number of successors remembered by a peer.
pub const SUCCESSOR_LIST_LEN: usize = 5;

/// Routing state of the local peer
#[derive(Debug)]
pub struct FingerTable {
    current: NodeInfo,
    predecessor: Option<NodeInfo>,
    fingers: Vec<NodeInfo>,
    successors: Vec<NodeInfo>,
}

/// Lookups a node should issue after a peer has been declared failed
///
/// Returned by [`inform_failure`]; the finger table itself never issues
/// lookups.
///
/// [`inform_failure`]: struct.FingerTable.html#method.inform_failure
#[derive(Debug, Default, PartialEq)]
pub struct FailureRepair {
    /// Finger start identifiers whose slots pointed at the failed peer.
    pub refresh: Vec<Identifier>,
    /// Identifier to look up to replenish the successor list, if the failed
    /// peer was one of the successors.
    pub replenish_successor: Option<Identifier>,
}

impl FingerTable {
    /// Creates the routing state of a peer that has not met anybody yet.
    ///
    /// All fingers point to the peer itself, the successor list is empty and
    /// the predecessor is the peer itself. A predecessor equal to the peer
    /// means "never learned one"; an absent predecessor means "declared
    /// failed".
    pub fn new(current: NodeInfo) -> Self {
        Self {
            current,
            predecessor: Some(current),
            fingers: vec![current; RING_BITS],
            successors: Vec::with_capacity(SUCCESSOR_LIST_LEN),
        }
    }

    /// Returns the local peer.
    pub fn current(&self) -> NodeInfo {
        self.current
    }

    /// Returns the current predecessor, if one is known.
    pub fn predecessor(&self) -> Option<NodeInfo> {
        self.predecessor
    }

    /// Overwrites the predecessor without the plausibility check of
    /// [`update_predecessor`].
    ///
    /// [`update_predecessor`]: #method.update_predecessor
    pub fn set_predecessor(&mut self, predecessor: Option<NodeInfo>) {
        self.predecessor = predecessor;
    }

    /// Returns the authoritative successor.
    ///
    /// The head of the successor list shadows the first finger; the first
    /// finger is only consulted while no successor is known.
    pub fn successor(&self) -> NodeInfo {
        self.successors.first().copied().unwrap_or(self.fingers[0])
    }

    /// Returns whether at least one successor is known.
    pub fn has_successors(&self) -> bool {
        !self.successors.is_empty()
    }

    /// Returns the successor list in clockwise order.
    pub fn successors(&self) -> &[NodeInfo] {
        &self.successors
    }

    /// Returns the finger at the given index.
    pub fn finger(&self, index: usize) -> NodeInfo {
        self.fingers[index]
    }

    /// Returns the identifier the finger at `index` is responsible for.
    pub fn finger_start(&self, index: usize) -> Identifier {
        self.current.identifier().offset_by(1 << index)
    }

    /// Points the finger at `index` to the given peer.
    pub fn set_finger(&mut self, index: usize, node: NodeInfo) {
        self.fingers[index] = node;
    }

    /// Returns whether the key is in the range owned by our successor.
    ///
    /// The range is the clockwise arc from the local identifier, exclusive,
    /// up to and including the successor.
    pub fn key_belongs_to_successor(&self, key: &Identifier) -> bool {
        key.is_within(&self.current.identifier(), &self.successor().identifier())
    }

    /// Returns the peer to forward a lookup for `key` to.
    ///
    /// Scans the fingers from the most distant one down and picks the first
    /// one strictly between the local identifier and the key. When no finger
    /// qualifies the first successor is used, and only a peer that knows
    /// nobody at all returns itself.
    pub fn next_best_node(&self, key: &Identifier) -> NodeInfo {
        let current_id = self.current.identifier();

        for finger in self.fingers.iter().rev() {
            if *finger != self.current && finger.identifier().is_between(&current_id, key) {
                return *finger;
            }
        }

        self.successors.first().copied().unwrap_or(self.current)
    }

    /// Returns the first successor whose range covers the given key.
    pub fn successor_covering(&self, key: &Identifier) -> Option<NodeInfo> {
        let current_id = self.current.identifier();

        self.successors
            .iter()
            .find(|s| key.is_within(&current_id, &s.identifier()))
            .copied()
    }

    /// Offers a new predecessor candidate.
    ///
    /// The candidate is rejected if it is the local peer or if a closer
    /// predecessor is already known. Returns whether the predecessor changed,
    /// so a repeated offer of the same peer returns `false`.
    pub fn update_predecessor(&mut self, node: NodeInfo) -> bool {
        if node == self.current {
            return false;
        }

        match self.predecessor {
            None => {
                self.predecessor = Some(node);
                true
            }
            Some(predecessor) => {
                let closer = node.identifier().is_between(
                    &predecessor.identifier(),
                    &self.current.identifier(),
                );

                if closer {
                    self.predecessor = Some(node);
                }

                closer
            }
        }
    }

    /// Inserts a peer into the successor list at its clockwise position.
    ///
    /// The local peer is never inserted, a peer already present is left
    /// alone and the list is truncated to [`SUCCESSOR_LIST_LEN`] entries by
    /// dropping the farthest one.
    ///
    /// [`SUCCESSOR_LIST_LEN`]: constant.SUCCESSOR_LIST_LEN.html
    pub fn update_successors(&mut self, node: NodeInfo) {
        if node == self.current || self.successors.contains(&node) {
            return;
        }

        let current_id = self.current.identifier();
        let distance = node.identifier().distance_from(&current_id);

        let position = self
            .successors
            .iter()
            .position(|s| s.identifier().distance_from(&current_id) > distance)
            .unwrap_or_else(|| self.successors.len());

        self.successors.insert(position, node);
        self.successors.truncate(SUCCESSOR_LIST_LEN);

        assert!(self.successors_consistent(), "successor list corrupted");
    }

    /// Offers a peer as a replacement for every finger it improves on.
    ///
    /// A peer improves finger `i` if it lies between the finger's start and
    /// the currently stored peer. A replacement of the first finger also
    /// inserts the peer into the successor list.
    pub fn update_finger_table(&mut self, node: NodeInfo) {
        if node == self.current {
            return;
        }

        let mut replaced_first = false;

        for index in 0..RING_BITS {
            let start = self.finger_start(index);

            if node
                .identifier()
                .is_within(&start, &self.fingers[index].identifier())
            {
                self.fingers[index] = node;
                replaced_first |= index == 0;
            }
        }

        if replaced_first {
            self.update_successors(node);
        }
    }

    /// Records that a peer has been observed alive.
    pub fn inform_existence(&mut self, node: NodeInfo) {
        self.update_successors(node);
        self.update_finger_table(node);
        self.update_predecessor(node);
    }

    /// Removes every reference to a peer that has been declared failed.
    ///
    /// Fingers that pointed at the peer fall back to the local peer until
    /// they are refreshed. The returned value lists the lookups the owning
    /// node should issue to repair the table.
    pub fn inform_failure(&mut self, node: &NodeInfo) -> FailureRepair {
        let mut repair = FailureRepair::default();

        if let Some(position) = self.successors.iter().position(|s| s == node) {
            self.successors.remove(position);

            let base = self
                .successors
                .last()
                .map(|s| s.identifier())
                .unwrap_or_else(|| self.current.identifier());

            repair.replenish_successor = Some(base.offset_by(1));
        }

        if self.predecessor.map_or(false, |p| p == *node) {
            self.predecessor = None;
        }

        for index in 0..RING_BITS {
            if self.fingers[index] == *node {
                self.fingers[index] = self.current;
                repair.refresh.push(self.finger_start(index));
            }
        }

        repair
    }

    fn successors_consistent(&self) -> bool {
        let current_id = self.current.identifier();

        self.successors.len() <= SUCCESSOR_LIST_LEN
            && self.successors.iter().all(|s| *s != self.current)
            && self.successors.windows(2).all(|pair| {
                pair[0].identifier().distance_from(&current_id)
                    < pair[1].identifier().distance_from(&current_id)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::identifier::{Identifier, NodeInfo};
    use super::*;

    fn node(id: u64) -> NodeInfo {
        let addr = format!("127.0.0.1:{}", 42000 + id).parse().unwrap();

        NodeInfo::with_identifier(addr, Identifier::new(id))
    }

    #[test]
    fn successor_list_stays_ordered_and_bounded() {
        let mut table = FingerTable::new(node(10));

        for id in &[40, 20, 90, 10, 20, 120, 5, 60] {
            table.update_successors(node(*id));
        }

        let ids: Vec<u64> = table
            .successors()
            .iter()
            .map(|s| s.identifier().value())
            .collect();

        assert_eq!(vec![20, 40, 60, 90, 120], ids);
    }

    #[test]
    fn successor_shadowing_falls_back_to_first_finger() {
        let mut table = FingerTable::new(node(10));

        assert_eq!(node(10), table.successor());

        table.set_finger(0, node(30));
        assert_eq!(node(30), table.successor());

        table.update_successors(node(20));
        assert_eq!(node(20), table.successor());
    }

    #[test]
    fn next_best_node_picks_the_farthest_preceding_finger() {
        let mut table = FingerTable::new(node(0));

        for id in &[16, 32, 64] {
            table.inform_existence(node(*id));
        }

        assert_eq!(node(64), table.next_best_node(&Identifier::new(100)));
        assert_eq!(node(16), table.next_best_node(&Identifier::new(20)));
    }

    #[test]
    fn next_best_node_never_returns_self_once_a_peer_is_known() {
        let mut table = FingerTable::new(node(0));
        table.inform_existence(node(16));

        // no finger strictly precedes the key, so the successor is used
        assert_ne!(table.current(), table.next_best_node(&Identifier::new(1)));
    }

    #[test]
    fn predecessor_updates_are_idempotent() {
        let mut table = FingerTable::new(node(10));

        assert!(table.update_predecessor(node(5)));
        assert!(!table.update_predecessor(node(5)));

        assert!(table.update_predecessor(node(7)));
        assert!(!table.update_predecessor(node(3)));
        assert!(!table.update_predecessor(node(10)));

        assert_eq!(Some(node(7)), table.predecessor());
    }

    #[test]
    fn absent_predecessor_accepts_the_next_candidate() {
        let mut table = FingerTable::new(node(10));
        table.update_predecessor(node(7));

        table.inform_failure(&node(7));
        assert_eq!(None, table.predecessor());

        assert!(table.update_predecessor(node(3)));
        assert_eq!(Some(node(3)), table.predecessor());
    }

    #[test]
    fn fingers_are_replaced_by_closer_peers() {
        let mut table = FingerTable::new(node(0));

        table.update_finger_table(node(3));
        assert_eq!(node(3), table.finger(0));
        assert_eq!(node(3), table.finger(1));
        assert_eq!(node(0), table.finger(2));

        // 2 is closer to both finger starts 1 and 2, but start 2 is excluded
        table.update_finger_table(node(2));
        assert_eq!(node(2), table.finger(0));
        assert_eq!(node(3), table.finger(1));
    }

    #[test]
    fn first_finger_replacement_inserts_a_successor() {
        let mut table = FingerTable::new(node(0));

        table.update_finger_table(node(3));

        assert!(table.has_successors());
        assert_eq!(node(3), table.successor());
    }

    #[test]
    fn key_ownership_follows_the_successor() {
        let mut table = FingerTable::new(node(10));
        table.update_successors(node(20));

        assert!(table.key_belongs_to_successor(&Identifier::new(15)));
        assert!(table.key_belongs_to_successor(&Identifier::new(20)));
        assert!(!table.key_belongs_to_successor(&Identifier::new(25)));
        assert!(!table.key_belongs_to_successor(&Identifier::new(10)));
    }

    #[test]
    fn lonely_peer_owns_every_key() {
        let table = FingerTable::new(node(10));

        assert!(table.key_belongs_to_successor(&Identifier::new(10)));
        assert!(table.key_belongs_to_successor(&Identifier::new(77)));
    }

    #[test]
    fn successor_covering_respects_list_order() {
        let mut table = FingerTable::new(node(0));
        table.update_successors(node(16));
        table.update_successors(node(32));

        assert_eq!(Some(node(16)), table.successor_covering(&Identifier::new(10)));
        assert_eq!(Some(node(16)), table.successor_covering(&Identifier::new(16)));
        assert_eq!(Some(node(32)), table.successor_covering(&Identifier::new(20)));
        assert_eq!(None, table.successor_covering(&Identifier::new(40)));
    }

    #[test]
    fn failure_eviction_reports_the_repair_lookups() {
        let mut table = FingerTable::new(node(0));
        table.inform_existence(node(16));
        table.inform_existence(node(32));

        let repair = table.inform_failure(&node(16));

        let refresh: Vec<u64> = repair.refresh.iter().map(Identifier::value).collect();
        assert_eq!(vec![1, 2, 4, 8], refresh);
        assert_eq!(Some(Identifier::new(33)), repair.replenish_successor);

        assert_eq!(vec![node(32)], table.successors().to_vec());
        assert_eq!(node(0), table.finger(0));
        assert_eq!(node(32), table.finger(4));
    }

    #[test]
    fn failure_of_the_predecessor_clears_it() {
        let mut table = FingerTable::new(node(10));
        table.update_predecessor(node(5));

        table.inform_failure(&node(5));

        assert_eq!(None, table.predecessor());
    }

    #[test]
    fn failure_of_an_unknown_peer_is_a_no_op() {
        let mut table = FingerTable::new(node(0));
        table.inform_existence(node(16));

        let repair = table.inform_failure(&node(99));

        assert_eq!(FailureRepair::default(), repair);
        assert_eq!(vec![node(16)], table.successors().to_vec());
    }
}
